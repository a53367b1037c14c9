//! One in-memory record per known object path.

use std::fs::{self, File};
use std::time::SystemTime;

use bytes::Bytes;
use log::debug;

use crate::backend::{DIRECTORY_CONTENT_TYPE, ObjectBackend};
use crate::errors::FsError;
use crate::scratch::{ScratchStore, open_options};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// The mapper's record for one path: identity, metadata and the state of
/// the staged local copy.
#[derive(Debug)]
pub struct ObjectEntry {
    /// Canonical container-relative path, e.g. `foo/bar/buz.txt`.
    pub path: String,
    /// Last path component, e.g. `buz.txt`.
    pub name: String,
    /// Path prefix, e.g. `foo/bar`; empty for root-level entries.
    pub dir: String,

    pub kind: EntryKind,
    pub size: u64,
    pub mtime: SystemTime,

    /// True once the remote bytes have been copied into scratch.
    pub downloaded: bool,
    /// True while the scratch copy differs from the remote object.
    pub dirty: bool,
}

impl ObjectEntry {
    pub fn new(path: &str, kind: EntryKind) -> Self {
        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), path.to_string()),
        };
        ObjectEntry {
            path: path.to_string(),
            name,
            dir,
            kind,
            size: 0,
            mtime: SystemTime::now(),
            downloaded: false,
            dirty: false,
        }
    }

    /// Open the scratch copy with the caller's open(2) flags.
    ///
    /// When the scratch file does not exist yet and the flags ask for the
    /// existing content (neither `O_TRUNC` nor `O_CREAT`), the remote object
    /// is downloaded into scratch first, exactly once. A truncating open of
    /// a never-staged object skips the download and starts from an empty
    /// scratch file.
    pub fn open(
        &mut self,
        scratch: &ScratchStore,
        backend: &dyn ObjectBackend,
        flags: i32,
    ) -> Result<File, FsError> {
        let local = scratch.local_path(&self.path);
        let staged = local.exists();
        let wants_fresh = flags & (libc::O_TRUNC | libc::O_CREAT) != 0;

        if !staged && !wants_fresh {
            debug!("[entry] open {} with download, flags {:#o}", self.path, flags);
            self.download(scratch, backend)?;
            self.downloaded = true;
        }

        let mut opts = open_options(flags);
        if !staged && wants_fresh {
            opts.create(true);
            opts.write(true);
        }
        Ok(opts.open(&local)?)
    }

    fn download(&self, scratch: &ScratchStore, backend: &dyn ObjectBackend) -> Result<(), FsError> {
        let local = scratch.local_path(&self.path);
        let mut file = File::create(&local)?;
        if let Err(err) = backend.get(&self.path, &mut file) {
            // A partial scratch file must not masquerade as a staged copy.
            drop(file);
            let _ = fs::remove_file(&local);
            return Err(err);
        }
        Ok(())
    }

    /// Re-stat the scratch copy into `size`/`mtime`.
    pub fn flush(&mut self, scratch: &ScratchStore) -> Result<(), FsError> {
        let meta = fs::metadata(scratch.local_path(&self.path))?;
        self.size = meta.len();
        self.mtime = meta.modified()?;
        Ok(())
    }

    /// Upload the scratch copy to the backend; clears `dirty` on success.
    pub fn upload(
        &mut self,
        scratch: &ScratchStore,
        backend: &dyn ObjectBackend,
    ) -> Result<(), FsError> {
        self.flush(scratch)?;
        let data = fs::read(scratch.local_path(&self.path))?;
        let content_type = match self.kind {
            EntryKind::Directory => Some(DIRECTORY_CONTENT_TYPE),
            EntryKind::File => None,
        };
        backend.put(&self.path, Bytes::from(data), content_type)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mem::MemBackend;
    use std::io::{Read, Seek, SeekFrom, Write};

    fn store() -> (tempfile::TempDir, ScratchStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::init(&dir.path().join("scratch")).unwrap();
        (dir, store)
    }

    #[test]
    fn derives_name_and_dir() {
        let entry = ObjectEntry::new("foo/bar/buz.txt", EntryKind::File);
        assert_eq!(entry.name, "buz.txt");
        assert_eq!(entry.dir, "foo/bar");

        let entry = ObjectEntry::new("top.txt", EntryKind::File);
        assert_eq!(entry.name, "top.txt");
        assert_eq!(entry.dir, "");
    }

    #[test]
    fn read_open_downloads_once() {
        let (_tmp, store) = store();
        let backend = MemBackend::new();
        backend.preload("f", b"remote-bytes", "text/plain", "2015-01-01T00:00:00");

        let mut entry = ObjectEntry::new("f", EntryKind::File);
        assert!(!entry.downloaded);

        let mut file = entry.open(&store, &backend, libc::O_RDONLY).unwrap();
        assert!(entry.downloaded);
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "remote-bytes");

        // Second open must reuse the staged copy, not re-fetch.
        backend.delete("f").unwrap();
        let mut file = entry.open(&store, &backend, libc::O_RDONLY).unwrap();
        content.clear();
        file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "remote-bytes");
    }

    #[test]
    fn truncating_open_skips_download() {
        let (_tmp, store) = store();
        // No remote object at all; a download attempt would fail with 404.
        let backend = MemBackend::new();

        let mut entry = ObjectEntry::new("new", EntryKind::File);
        let file = entry
            .open(&store, &backend, libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC)
            .unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);
        assert!(!entry.downloaded);
    }

    #[test]
    fn failed_download_leaves_no_partial_scratch() {
        let (_tmp, store) = store();
        let backend = MemBackend::new();

        let mut entry = ObjectEntry::new("ghost", EntryKind::File);
        assert!(entry.open(&store, &backend, libc::O_RDONLY).is_err());
        assert!(!store.exists("ghost"));
        assert!(!entry.downloaded);
    }

    #[test]
    fn flush_tracks_scratch_stat() {
        let (_tmp, store) = store();
        let backend = MemBackend::new();

        let mut entry = ObjectEntry::new("f", EntryKind::File);
        let mut file = entry
            .open(&store, &backend, libc::O_CREAT | libc::O_WRONLY)
            .unwrap();
        file.write_all(b"0123456789").unwrap();
        file.sync_all().unwrap();
        drop(file);

        entry.flush(&store).unwrap();
        assert_eq!(entry.size, 10);
    }

    #[test]
    fn upload_clears_dirty_and_stores_bytes() {
        let (_tmp, store) = store();
        let backend = MemBackend::new();

        let mut entry = ObjectEntry::new("f", EntryKind::File);
        let mut file = entry
            .open(&store, &backend, libc::O_CREAT | libc::O_RDWR)
            .unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(b"payload").unwrap();
        file.sync_all().unwrap();
        drop(file);
        entry.dirty = true;

        entry.upload(&store, &backend).unwrap();
        assert!(!entry.dirty);
        assert_eq!(entry.size, 7);
        assert_eq!(backend.object("f").unwrap().data, b"payload");
    }
}
