//! Shared imports for the operation sub-modules of `fs`.
//!
//! One place to manage the FUSE reply types, errno constants and crate
//! types every callback file needs.

pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};

pub use libc::{EBADF, EIO, ENOENT};

pub use std::ffi::OsStr;
pub use std::time::SystemTime;

pub use crate::errors::FsError;
pub use crate::mapper::EntryKind;

pub use super::handle::FileHandle;
pub use super::{BLOCK_SIZE, ObjectFs, ROOT_INO, TTL};
