use log::{debug, warn};

use super::prelude::*;

pub(super) fn write(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let Some(handle) = fs.handles.get(&fh) else {
        reply.error(EBADF);
        return;
    };
    match handle.write(offset.max(0) as u64, data) {
        Ok(written) => {
            let path = handle.path().to_string();
            fs.mapper.mark_dirty(&path);
            reply.written(written);
        }
        Err(err) => {
            warn!("write {} offset {offset}: {err}", handle.path());
            reply.error(EIO);
        }
    }
}

/// Flush re-stats the scratch copy into the entry metadata. It does not
/// upload; that is release's (or fsync's) job.
pub(super) fn flush(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _lock_owner: u64,
    reply: ReplyEmpty,
) {
    let Some(handle) = fs.handles.get(&fh) else {
        reply.ok();
        return;
    };
    let path = handle.path().to_string();
    match fs.mapper.flush_entry(&path) {
        Ok(()) => reply.ok(),
        Err(err) => {
            warn!("flush \"{path}\": {err}");
            reply.error(err.errno());
        }
    }
}

/// Durability barrier: fsync the scratch descriptor, then push the current
/// contents to the backend. Unlike release, failures surface to the caller.
pub(super) fn fsync(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    datasync: bool,
    reply: ReplyEmpty,
) {
    let Some(handle) = fs.handles.get(&fh) else {
        reply.error(EBADF);
        return;
    };
    let path = handle.path().to_string();
    if let Err(err) = handle.fsync(datasync) {
        warn!("fsync \"{path}\": {err}");
        reply.error(EIO);
        return;
    }
    match fs.mapper.upload_entry(&path) {
        Ok(()) => reply.ok(),
        Err(err) => {
            warn!("fsync upload \"{path}\": {err}");
            reply.error(err.errno());
        }
    }
}

/// Close the handle, uploading first when the entry is dirty. The upload is
/// best-effort: on failure the entry stays dirty and the handle still
/// closes, so release never reports an error for it. Releasing an unknown
/// fh is a no-op, which makes the operation idempotent.
pub(super) fn release(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let Some(handle) = fs.handles.remove(&fh) else {
        reply.ok();
        return;
    };
    let path = handle.path().to_string();
    debug!("release: \"{path}\" fh {fh}");

    // The entry may have been unlinked while the handle was open; in that
    // case there is nothing to upload and the descriptor just closes.
    let dirty = fs.mapper.get(&path).is_some_and(|e| e.dirty);
    if dirty {
        if let Err(err) = fs.mapper.upload_entry(&path) {
            warn!("release upload \"{path}\": {err}");
        }
    }
    drop(handle);
    reply.ok();
}

pub(super) fn fallocate(
    _fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    _fh: u64,
    _offset: i64,
    _length: i64,
    _mode: i32,
    reply: ReplyEmpty,
) {
    reply.ok();
}
