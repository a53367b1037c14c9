use log::{debug, warn};

use super::attr::entry_attr;
use super::prelude::*;

/// Create inserts the mapper entry, uploads the zero-byte object and hands
/// back a handle whose first operation populates the scratch copy.
pub(super) fn create(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    flags: i32,
    reply: ReplyCreate,
) {
    let Some(parent_path) = fs.path_of(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(path) = ObjectFs::full_path(&parent_path, name) else {
        reply.error(ENOENT);
        return;
    };
    debug!("create: \"{path}\" flags {flags:#o}");

    if let Err(err) = fs.mapper.create(&path) {
        warn!("create \"{path}\": {err}");
        reply.error(err.errno());
        return;
    }

    let file = match fs.mapper.open(&path, flags | libc::O_CREAT) {
        Ok(file) => file,
        Err(err) => {
            warn!("create \"{path}\": open scratch: {err}");
            reply.error(err.errno());
            return;
        }
    };

    let ino = fs.inode_for(&path);
    let fh = fs.register_handle(FileHandle::new(&path, file));
    let entry = fs.mapper.get(&path).unwrap();
    reply.created(&TTL, &entry_attr(fs, ino, entry), 0, fh, 0);
}

pub(super) fn mkdir(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    reply: ReplyEntry,
) {
    let Some(parent_path) = fs.path_of(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(path) = ObjectFs::full_path(&parent_path, name) else {
        reply.error(ENOENT);
        return;
    };
    debug!("mkdir: \"{path}\"");

    if let Err(err) = fs.mapper.mkdir(&path) {
        warn!("mkdir \"{path}\": {err}");
        reply.error(err.errno());
        return;
    }

    let ino = fs.inode_for(&path);
    let entry = fs.mapper.get(&path).unwrap();
    reply.entry(&TTL, &entry_attr(fs, ino, entry), 0);
}
