use log::{debug, warn};

use super::prelude::*;

/// Rename translates to a staged local copy plus a server-side COPY and a
/// DELETE of the source object; the mapper owns that sequence and its
/// rollback. The adapter only resolves the two paths and keeps the inode
/// table pointing at the surviving name.
pub(super) fn rename(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let Some(old_parent) = fs.path_of(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(new_parent) = fs.path_of(newparent) else {
        reply.error(ENOENT);
        return;
    };
    let (Some(old_path), Some(new_path)) = (
        ObjectFs::full_path(&old_parent, name),
        ObjectFs::full_path(&new_parent, newname),
    ) else {
        reply.error(ENOENT);
        return;
    };
    debug!("rename: \"{old_path}\" to \"{new_path}\"");

    match fs.mapper.rename(&old_path, &new_path) {
        Ok(()) => {
            fs.remap_path(&old_path, &new_path);
            reply.ok();
        }
        Err(err) => {
            warn!("rename \"{old_path}\" -> \"{new_path}\": {err}");
            reply.error(err.errno());
        }
    }
}
