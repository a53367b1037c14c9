use log::{debug, warn};

use super::attr::entry_attr;
use super::prelude::*;

pub(super) fn lookup(
    fs: &mut ObjectFs,
    _req: &Request,
    parent: u64,
    name: &OsStr,
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

    if fs.mapper.contains(&path) {
        let ino = fs.inode_for(&path);
        let entry = fs.mapper.get(&path).unwrap();
        reply.entry(&TTL, &entry_attr(fs, ino, entry), 0);
    } else {
        reply.error(ENOENT);
    }
}

/// Point-in-time view of one directory level: `.` and `..` plus every entry
/// whose parent prefix matches exactly. The kernel re-calls with an offset
/// when its buffer fills, so the snapshot is sorted for stable pagination.
pub(super) fn readdir(
    fs: &mut ObjectFs,
    _req: &Request,
    ino: u64,
    _fh: u64,
    offset: i64,
    mut reply: ReplyDirectory,
) {
    let Some(dir_path) = fs.path_of(ino) else {
        reply.error(ENOENT);
        return;
    };
    debug!("readdir: \"{dir_path}\" offset {offset}");

    let parent_ino = if ino == ROOT_INO {
        ROOT_INO
    } else {
        let parent = dir_path.rsplit_once('/').map_or("", |(dir, _)| dir);
        *fs.path_to_inode.get(parent).unwrap_or(&ROOT_INO)
    };

    let mut children: Vec<(String, EntryKind)> = fs
        .mapper
        .open_dir(&dir_path)
        .into_iter()
        .map(|e| (e.name.clone(), e.kind))
        .collect();
    children.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut entries: Vec<(u64, FileType, String)> = vec![
        (ino, FileType::Directory, ".".to_string()),
        (parent_ino, FileType::Directory, "..".to_string()),
    ];
    for (name, kind) in children {
        let path = if dir_path.is_empty() {
            name.clone()
        } else {
            format!("{dir_path}/{name}")
        };
        let child_ino = fs.inode_for(&path);
        let file_type = match kind {
            EntryKind::Directory => FileType::Directory,
            EntryKind::File => FileType::RegularFile,
        };
        entries.push((child_ino, file_type, name));
    }

    for (i, (entry_ino, file_type, name)) in
        entries.into_iter().enumerate().skip(offset as usize)
    {
        if reply.add(entry_ino, (i + 1) as i64, file_type, &name) {
            break;
        }
    }
    reply.ok();
}

pub(super) fn open(fs: &mut ObjectFs, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.path_of(ino) else {
        reply.error(ENOENT);
        return;
    };
    match fs.mapper.get(&path) {
        None => {
            reply.error(ENOENT);
            return;
        }
        Some(entry) if entry.kind == EntryKind::Directory => {
            warn!("open: \"{path}\" is a directory");
            reply.error(ENOENT);
            return;
        }
        Some(_) => {}
    }

    match fs.mapper.open(&path, flags) {
        Ok(file) => {
            let fh = fs.register_handle(FileHandle::new(&path, file));
            debug!("open: \"{path}\" flags {flags:#o} fh {fh}");
            reply.opened(fh, 0);
        }
        Err(err) => {
            warn!("open \"{path}\": {err}");
            reply.error(err.errno());
        }
    }
}

pub(super) fn read(
    fs: &mut ObjectFs,
    _req: &Request<'_>,
    _ino: u64,
    fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    let Some(handle) = fs.handles.get(&fh) else {
        reply.error(EBADF);
        return;
    };
    match handle.read(offset.max(0) as u64, size) {
        Ok(data) => reply.data(&data),
        Err(err) => {
            warn!("read {} offset {offset}: {err}", handle.path());
            reply.error(EIO);
        }
    }
}
