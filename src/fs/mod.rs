//! The kernel-facing filesystem adapter.
//!
//! `ObjectFs` holds the mapper, the open-handle table and the inode↔path
//! tables the inode-addressed FUSE bridge needs on top of the path-addressed
//! mapper. `FsWrapper` is the `fuser::Filesystem` implementation: every
//! callback locks the single state mutex for its whole duration (the coarse
//! lock the concurrency model is built on) and forwards to a function in the
//! matching sub-module.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuser::{
    Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::mapper::ObjectMapper;
use handle::FileHandle;

pub mod handle;
pub mod prelude;

mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;

/// TTL handed to the kernel for attribute and entry caches.
pub const TTL: Duration = Duration::from_secs(1);

/// Block unit used for the block-count attribute.
pub const BLOCK_SIZE: u64 = 512;

/// Inode of the synthesised mount root (path `""`).
pub const ROOT_INO: u64 = 1;

pub struct ObjectFs {
    pub(crate) mapper: ObjectMapper,

    /// Maps an inode number to its canonical path (1 -> "").
    pub(crate) inode_to_path: HashMap<u64, String>,
    /// Maps a canonical path to its inode number ("" -> 1).
    pub(crate) path_to_inode: HashMap<String, u64>,
    pub(crate) next_inode: u64,

    /// Open file handles, keyed by the fh given to the kernel.
    pub(crate) handles: HashMap<u64, FileHandle>,
    pub(crate) next_fh: u64,

    /// Owner reported in every attribute reply.
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

impl ObjectFs {
    pub fn new(mapper: ObjectMapper) -> Self {
        let mut fs = ObjectFs {
            mapper,
            inode_to_path: HashMap::new(),
            path_to_inode: HashMap::new(),
            next_inode: ROOT_INO + 1,
            handles: HashMap::new(),
            next_fh: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        };
        fs.inode_to_path.insert(ROOT_INO, String::new());
        fs.path_to_inode.insert(String::new(), ROOT_INO);
        fs
    }

    pub(crate) fn path_of(&self, ino: u64) -> Option<String> {
        self.inode_to_path.get(&ino).cloned()
    }

    /// Inode for a path, allocating one on first sight.
    pub(crate) fn inode_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        ino
    }

    pub(crate) fn drop_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_inode.remove(path) {
            self.inode_to_path.remove(&ino);
        }
    }

    /// Drop the inode mappings of a directory and everything below it.
    pub(crate) fn drop_tree(&mut self, dir: &str) {
        let prefix = format!("{dir}/");
        let doomed: Vec<String> = self
            .path_to_inode
            .keys()
            .filter(|p| *p == dir || p.starts_with(&prefix))
            .cloned()
            .collect();
        for path in doomed {
            self.drop_path(&path);
        }
    }

    /// Move an inode mapping from `old` to `new`, displacing whatever inode
    /// the new path may have had.
    pub(crate) fn remap_path(&mut self, old: &str, new: &str) {
        self.drop_path(new);
        if let Some(ino) = self.path_to_inode.remove(old) {
            self.path_to_inode.insert(new.to_string(), ino);
            self.inode_to_path.insert(ino, new.to_string());
        }
    }

    /// Join a parent directory path and a dentry name into a canonical path.
    /// `None` for names that are not valid UTF-8.
    pub(crate) fn full_path(parent: &str, name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        if parent.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{parent}/{name}"))
        }
    }

    /// Any open handle against the given path, if one exists.
    pub(crate) fn handle_for_path(&self, path: &str) -> Option<&FileHandle> {
        self.handles.values().find(|h| h.path() == path)
    }

    pub(crate) fn register_handle(&mut self, handle: FileHandle) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, handle);
        fh
    }
}

/// The mountable filesystem: the shared state behind the coarse lock.
#[derive(Clone)]
pub struct FsWrapper(pub Arc<Mutex<ObjectFs>>);

impl FsWrapper {
    pub fn new(fs: ObjectFs) -> Self {
        FsWrapper(Arc::new(Mutex::new(fs)))
    }
}

impl Filesystem for FsWrapper {
    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut fs = self.0.lock().unwrap();
        read::lookup(&mut fs, req, parent, name, reply);
    }

    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        let mut fs = self.0.lock().unwrap();
        attr::getattr(&mut fs, req, ino, reply);
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mut fs = self.0.lock().unwrap();
        attr::setattr(
            &mut fs, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        let mut fs = self.0.lock().unwrap();
        read::readdir(&mut fs, req, ino, fh, offset, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let mut fs = self.0.lock().unwrap();
        read::open(&mut fs, req, ino, flags, reply);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut fs = self.0.lock().unwrap();
        read::read(&mut fs, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let mut fs = self.0.lock().unwrap();
        create::create(&mut fs, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let mut fs = self.0.lock().unwrap();
        create::mkdir(&mut fs, req, parent, name, mode, umask, reply);
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut fs = self.0.lock().unwrap();
        write::write(&mut fs, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        write::flush(&mut fs, req, ino, fh, lock_owner, reply);
    }

    fn fsync(&mut self, req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        write::fsync(&mut fs, req, ino, fh, datasync, reply);
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        write::release(&mut fs, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn fallocate(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        write::fallocate(&mut fs, req, ino, fh, offset, length, mode, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::unlink(&mut fs, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::rmdir(&mut fs, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let mut fs = self.0.lock().unwrap();
        rename::rename(&mut fs, req, parent, name, newparent, newname, flags, reply);
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let mut fs = self.0.lock().unwrap();
        attr::statfs(&mut fs, req, ino, reply);
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let mut fs = self.0.lock().unwrap();
        attr::link(&mut fs, req, ino, newparent, newname, reply);
    }
}
