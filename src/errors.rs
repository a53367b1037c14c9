//! Error kinds shared by the backend, the mapper and the FUSE adapter.
//!
//! Every failure that can reach the kernel carries an errno mapping; the
//! adapter replies with `err.errno()` and logs the original cause.

use libc::{EEXIST, EIO, ENOENT, ENOSYS, c_int};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    /// Lookup miss in the mapper index.
    #[error("no entry for \"{0}\"")]
    NotFound(String),

    /// Create/Mkdir on an occupied path.
    #[error("entry already exists for \"{0}\"")]
    Exists(String),

    /// Operation the filesystem does not implement (e.g. hard links).
    #[error("operation not supported")]
    Unsupported,

    /// Authentication against the object store failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure talking to the object store.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// The object store answered with an unexpected HTTP status.
    #[error("backend returned {status} for {path}")]
    BackendStatus { status: u16, path: String },

    /// Rename staged fewer/more bytes than the source holds.
    #[error("copy incomplete for \"{0}\": {1} of {2} bytes")]
    CopyIncomplete(String, u64, u64),

    /// Local scratch-file I/O failure.
    #[error("scratch i/o: {0}")]
    Scratch(#[from] std::io::Error),
}

impl FsError {
    /// Errno the kernel reply should carry for this error.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound(_) => ENOENT,
            FsError::Exists(_) => EEXIST,
            FsError::Unsupported => ENOSYS,
            FsError::Auth(_)
            | FsError::Backend(_)
            | FsError::BackendStatus { .. }
            | FsError::CopyIncomplete(..)
            | FsError::Scratch(_) => EIO,
        }
    }

    /// A missing remote object, reported by HTTP status.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FsError::NotFound(_) | FsError::BackendStatus { status: 404, .. }
        )
    }
}

impl From<reqwest::Error> for FsError {
    fn from(err: reqwest::Error) -> Self {
        FsError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound("a".into()).errno(), ENOENT);
        assert_eq!(FsError::Exists("a".into()).errno(), EEXIST);
        assert_eq!(FsError::Unsupported.errno(), ENOSYS);
        assert_eq!(FsError::Backend("down".into()).errno(), EIO);
        assert_eq!(FsError::CopyIncomplete("a".into(), 1, 2).errno(), EIO);
    }

    #[test]
    fn backend_404_counts_as_missing() {
        let err = FsError::BackendStatus { status: 404, path: "x".into() };
        assert!(err.is_not_found());
        let err = FsError::BackendStatus { status: 500, path: "x".into() };
        assert!(!err.is_not_found());
    }
}
