use log::{debug, warn};

use super::prelude::*;
use crate::mapper::ObjectEntry;

/// Attributes synthesised from a mapper entry.
///
/// Ownership is always the mounting process; modes are fixed at 0755 for
/// directories and 0644 for files since the store has no mode to persist.
pub(super) fn entry_attr(fs: &ObjectFs, ino: u64, entry: &ObjectEntry) -> FileAttr {
    let (kind, perm, nlink) = match entry.kind {
        EntryKind::Directory => (FileType::Directory, 0o755, 2),
        EntryKind::File => (FileType::RegularFile, 0o644, 1),
    };
    FileAttr {
        ino,
        size: entry.size,
        blocks: entry.size / BLOCK_SIZE,
        atime: entry.mtime,
        mtime: entry.mtime,
        ctime: entry.mtime,
        crtime: entry.mtime,
        kind,
        perm,
        nlink,
        uid: fs.uid,
        gid: fs.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// The synthesised mount root: a 4 KiB directory owned by the caller.
pub(super) fn root_attr(fs: &ObjectFs) -> FileAttr {
    FileAttr {
        ino: ROOT_INO,
        size: 4096,
        blocks: 4096 / BLOCK_SIZE,
        atime: std::time::UNIX_EPOCH,
        mtime: std::time::UNIX_EPOCH,
        ctime: std::time::UNIX_EPOCH,
        crtime: std::time::UNIX_EPOCH,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid: fs.uid,
        gid: fs.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

/// Attributes taken from an open handle's fstat, so a file being written
/// reports its in-flight size before any flush lands in the mapper.
fn handle_attr(fs: &ObjectFs, ino: u64, handle: &FileHandle) -> Option<FileAttr> {
    let meta = handle.metadata().ok()?;
    let mtime = meta.modified().ok()?;
    Some(FileAttr {
        ino,
        size: meta.len(),
        blocks: meta.len() / BLOCK_SIZE,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: FileType::RegularFile,
        perm: 0o644,
        nlink: 1,
        uid: fs.uid,
        gid: fs.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    })
}

pub(super) fn current_attr(fs: &ObjectFs, ino: u64, path: &str) -> Option<FileAttr> {
    if let Some(handle) = fs.handle_for_path(path) {
        if let Some(attr) = handle_attr(fs, ino, handle) {
            return Some(attr);
        }
    }
    fs.mapper.get(path).map(|entry| entry_attr(fs, ino, entry))
}

pub(super) fn getattr(fs: &mut ObjectFs, _req: &Request, ino: u64, reply: ReplyAttr) {
    if ino == ROOT_INO {
        reply.attr(&TTL, &root_attr(fs));
        return;
    }
    let Some(path) = fs.path_of(ino) else {
        reply.error(ENOENT);
        return;
    };
    match current_attr(fs, ino, &path) {
        Some(attr) => {
            debug!("getattr: {} size:{}", path, attr.size);
            reply.attr(&TTL, &attr);
        }
        None => reply.error(ENOENT),
    }
}

/// Mode, ownership and timestamp changes are accepted without remote effect;
/// only a size change has real work behind it.
pub(super) fn setattr(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    ino: u64,
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    _atime: Option<TimeOrNow>,
    _mtime: Option<TimeOrNow>,
    _ctime: Option<SystemTime>,
    fh: Option<u64>,
    _crtime: Option<SystemTime>,
    _chgtime: Option<SystemTime>,
    _bkuptime: Option<SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    if ino == ROOT_INO {
        reply.attr(&TTL, &root_attr(fs));
        return;
    }
    let Some(path) = fs.path_of(ino) else {
        reply.error(ENOENT);
        return;
    };

    let open_handle = fh.filter(|fh| fs.handles.contains_key(fh));

    // chmod/chown land on the scratch copy when a handle is open, and are
    // otherwise accepted without effect.
    if let Some(fh) = open_handle {
        let handle = &fs.handles[&fh];
        if let Some(mode) = mode {
            if let Err(err) = handle.chmod(mode) {
                warn!("chmod {path}: {err}");
            }
        }
        if (uid.is_some() || gid.is_some()) && handle.chown(uid, gid).is_err() {
            debug!("chown {path}: ignored");
        }
    }

    if let Some(new_size) = size {
        debug!("setattr: truncate {path} to {new_size}");
        if let Some(fh) = open_handle {
            if let Err(err) = fs.handles[&fh].truncate(new_size) {
                warn!("truncate {path}: {err}");
                reply.error(EIO);
                return;
            }
            fs.mapper.mark_dirty(&path);
        } else {
            // No open handle: stage, truncate and converge the backend
            // immediately, since no release will follow.
            if let Err(err) = truncate_unopened(fs, &path, new_size) {
                warn!("truncate {path}: {err}");
                reply.error(err.errno());
                return;
            }
        }
    }

    match current_attr(fs, ino, &path) {
        Some(attr) => reply.attr(&TTL, &attr),
        None => reply.error(ENOENT),
    }
}

fn truncate_unopened(fs: &mut ObjectFs, path: &str, size: u64) -> Result<(), FsError> {
    let file = fs.mapper.open(path, libc::O_RDWR)?;
    file.set_len(size)?;
    drop(file);
    fs.mapper.mark_dirty(path);
    fs.mapper.upload_entry(path)
}

pub(super) fn statfs(fs: &mut ObjectFs, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
    match fs.mapper.stat() {
        Ok(stats) => {
            let free = stats.quota.saturating_sub(stats.used);
            reply.statfs(stats.quota, free, free, stats.count, 0, 1, 255, 0);
        }
        Err(err) => {
            warn!("statfs: {err}");
            reply.error(EIO);
        }
    }
}

/// Hard links have no representation in an object namespace.
pub(super) fn link(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    ino: u64,
    _newparent: u64,
    _newname: &OsStr,
    reply: ReplyEntry,
) {
    let err = FsError::Unsupported;
    debug!("link: {:?} {err}", fs.path_of(ino));
    reply.error(err.errno());
}
