//! Per-open file handle over a staged scratch copy.
//!
//! A handle owns the OS file descriptor obtained from the entry's scratch
//! open. All data movement is positional so concurrent kernel requests on
//! the same handle never race on a shared cursor. Dirtiness is tracked on
//! the mapper entry; the adapter marks it on every write/truncate and the
//! release path decides whether an upload is due.

use std::fs::{File, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{FileExt, PermissionsExt, fchown};

pub struct FileHandle {
    path: String,
    file: File,
}

impl FileHandle {
    pub fn new(path: &str, file: File) -> Self {
        FileHandle { path: path.to_string(), file }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Positional read of up to `size` bytes at `offset`.
    pub fn read(&self, offset: u64, size: u32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64)? {
                0 => break,
                n => filled += n,
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Positional write; returns the number of bytes written.
    pub fn write(&self, offset: u64, data: &[u8]) -> io::Result<u32> {
        self.file.write_all_at(data, offset)?;
        Ok(data.len() as u32)
    }

    pub fn truncate(&self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    /// Flush OS buffers for the scratch descriptor.
    pub fn fsync(&self, datasync: bool) -> io::Result<()> {
        if datasync {
            self.file.sync_data()
        } else {
            self.file.sync_all()
        }
    }

    pub fn metadata(&self) -> io::Result<Metadata> {
        self.file.metadata()
    }

    /// Mode change applied to the scratch copy so in-process tooling sees
    /// reasonable values; nothing is persisted remotely.
    pub fn chmod(&self, mode: u32) -> io::Result<()> {
        self.file.set_permissions(Permissions::from_mode(mode))
    }

    /// Same local-only treatment for ownership.
    pub fn chown(&self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        fchown(&self.file, uid, gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn handle() -> (tempfile::TempDir, FileHandle) {
        let dir = tempfile::tempdir().unwrap();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(dir.path().join("scratch-f"))
            .unwrap();
        (dir, FileHandle::new("f", file))
    }

    #[test]
    fn positional_read_write() {
        let (_tmp, h) = handle();
        assert_eq!(h.write(0, b"hello world").unwrap(), 11);
        assert_eq!(h.read(6, 5).unwrap(), b"world");
        // Reads past EOF come back short, not as an error.
        assert_eq!(h.read(6, 100).unwrap(), b"world");
        assert!(h.read(100, 10).unwrap().is_empty());
    }

    #[test]
    fn sparse_write_zero_fills() {
        let (_tmp, h) = handle();
        h.write(4, b"data").unwrap();
        assert_eq!(h.read(0, 8).unwrap(), b"\0\0\0\0data");
    }

    #[test]
    fn truncate_shrinks() {
        let (_tmp, h) = handle();
        h.write(0, b"0123456789").unwrap();
        h.truncate(4).unwrap();
        assert_eq!(h.metadata().unwrap().len(), 4);
        assert_eq!(h.read(0, 10).unwrap(), b"0123");
    }

    #[test]
    fn fsync_both_modes() {
        let (_tmp, h) = handle();
        h.write(0, b"x").unwrap();
        h.fsync(true).unwrap();
        h.fsync(false).unwrap();
    }

    #[test]
    fn chmod_applies_to_scratch_file() {
        let (_tmp, h) = handle();
        h.chmod(0o600).unwrap();
        assert_eq!(h.metadata().unwrap().permissions().mode() & 0o777, 0o600);
    }
}
