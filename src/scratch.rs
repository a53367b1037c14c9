//! Local scratch staging area.
//!
//! Every known object may have one staged copy under the scratch root. The
//! local file name is a pure, reversible function of the canonical path:
//! `%` is escaped as `%25`, then every `/` becomes `%2F`, so `a/b` and `a-b`
//! can never collide and the original path is recoverable from a directory
//! listing of the scratch root.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub struct ScratchStore {
    root: PathBuf,
}

impl ScratchStore {
    /// Purge and re-create the scratch root with mode 0755.
    pub fn init(root: &Path) -> io::Result<Self> {
        match fs::remove_dir_all(root) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        fs::create_dir_all(root)?;
        fs::set_permissions(root, fs::Permissions::from_mode(0o755))?;
        Ok(ScratchStore { root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path staged for the given canonical object path.
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.root.join(encode_name(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.local_path(path).exists()
    }

    /// Remove the staged copy; absence is not an error.
    pub fn remove(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.local_path(path)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Encode a canonical object path into a flat scratch file name.
pub fn encode_name(path: &str) -> String {
    path.replace('%', "%25").replace('/', "%2F")
}

/// Inverse of [`encode_name`].
pub fn decode_name(name: &str) -> String {
    name.replace("%2F", "/").replace("%25", "%")
}

/// Map kernel open(2) flags onto [`OpenOptions`].
pub fn open_options(flags: i32) -> OpenOptions {
    let access = flags & libc::O_ACCMODE;
    let truncate = flags & libc::O_TRUNC != 0;
    let append = flags & libc::O_APPEND != 0;

    let mut opts = OpenOptions::new();
    opts.read(access == libc::O_RDONLY || access == libc::O_RDWR);
    opts.write(access == libc::O_WRONLY || access == libc::O_RDWR || truncate || append);
    opts.append(append);
    opts.truncate(truncate);
    opts.create(flags & libc::O_CREAT != 0);
    opts
}
