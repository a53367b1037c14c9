use log::{debug, warn};

use super::prelude::*;

pub(super) fn unlink(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    reply: ReplyEmpty,
) {
    let Some(parent_path) = fs.path_of(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(path) = ObjectFs::full_path(&parent_path, name) else {
        reply.error(ENOENT);
        return;
    };
    debug!("unlink: \"{path}\"");

    match fs.mapper.delete(&path) {
        Ok(()) => {
            fs.drop_path(&path);
            reply.ok();
        }
        Err(err) => {
            warn!("unlink \"{path}\": {err}");
            reply.error(err.errno());
        }
    }
}

/// Recursive removal: the mapper walks the subtree depth-first, so a
/// directory does not need to be empty first.
pub(super) fn rmdir(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    reply: ReplyEmpty,
) {
    let Some(parent_path) = fs.path_of(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(path) = ObjectFs::full_path(&parent_path, name) else {
        reply.error(ENOENT);
        return;
    };
    debug!("rmdir: \"{path}\"");

    match fs.mapper.rmdir(&path) {
        Ok(()) => {
            fs.drop_tree(&path);
            reply.ok();
        }
        Err(err) => {
            warn!("rmdir \"{path}\": {err}");
            reply.error(err.errno());
        }
    }
}
