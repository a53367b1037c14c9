//! In-memory [`ObjectBackend`] used by the test suite.
//!
//! Behaves like a tiny single-container store: a sorted name→object table,
//! header-style stat overrides and per-operation failure switches so tests
//! can exercise the rollback paths.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::SystemTime;

use bytes::Bytes;

use super::{
    ContainerStats, DEFAULT_QUOTA_BYTES, DIRECTORY_CONTENT_TYPE, ListEvent, ObjectBackend,
    ObjectMeta, RemoteObject,
};
use crate::errors::FsError;

#[derive(Clone)]
pub struct MemObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub last_modified: String,
    pub mtime: SystemTime,
}

#[derive(Default)]
pub struct FailureSwitches {
    pub put: AtomicBool,
    pub copy: AtomicBool,
    pub delete: AtomicBool,
    pub stat: AtomicBool,
}

#[derive(Default, Clone, Copy)]
pub struct StatOverrides {
    pub quota: Option<u64>,
    pub used: Option<u64>,
    pub count: Option<u64>,
}

pub struct MemBackend {
    objects: Mutex<BTreeMap<String, MemObject>>,
    stats: Mutex<StatOverrides>,
    container_present: AtomicBool,
    pub fail: FailureSwitches,
}

impl MemBackend {
    pub fn new() -> Self {
        MemBackend {
            objects: Mutex::new(BTreeMap::new()),
            stats: Mutex::new(StatOverrides::default()),
            container_present: AtomicBool::new(true),
            fail: FailureSwitches::default(),
        }
    }

    /// Preload an object as if it had been uploaded earlier.
    pub fn preload(&self, name: &str, data: &[u8], content_type: &str, last_modified: &str) {
        self.objects.lock().unwrap().insert(
            name.to_string(),
            MemObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
                last_modified: last_modified.to_string(),
                mtime: SystemTime::now(),
            },
        );
    }

    pub fn object(&self, name: &str) -> Option<MemObject> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn set_stats(&self, overrides: StatOverrides) {
        *self.stats.lock().unwrap() = overrides;
    }

    fn missing(&self, path: &str) -> FsError {
        FsError::BackendStatus { status: 404, path: path.to_string() }
    }
}

impl ObjectBackend for MemBackend {
    fn authenticate(&self) -> Result<(), FsError> {
        Ok(())
    }

    fn container_stat(&self) -> Result<ContainerStats, FsError> {
        if self.fail.stat.load(Ordering::SeqCst) {
            return Err(FsError::Backend("injected stat failure".into()));
        }
        let objects = self.objects.lock().unwrap();
        let overrides = *self.stats.lock().unwrap();
        Ok(ContainerStats {
            quota: overrides.quota.unwrap_or(DEFAULT_QUOTA_BYTES),
            used: overrides
                .used
                .unwrap_or_else(|| objects.values().map(|o| o.data.len() as u64).sum()),
            count: overrides.count.unwrap_or(objects.len() as u64),
        })
    }

    fn container_exists(&self) -> Result<bool, FsError> {
        Ok(self.container_present.load(Ordering::SeqCst))
    }

    fn container_create(&self) -> Result<(), FsError> {
        self.container_present.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn container_delete(&self) -> Result<(), FsError> {
        self.container_present.store(false, Ordering::SeqCst);
        self.objects.lock().unwrap().clear();
        Ok(())
    }

    fn list(&self) -> Result<Receiver<ListEvent>, FsError> {
        let (tx, rx) = mpsc::channel();
        let objects = self.objects.lock().unwrap();
        let mut total = 0usize;
        for (name, obj) in objects.iter() {
            total += 1;
            let _ = tx.send(ListEvent::Object(RemoteObject {
                name: name.clone(),
                bytes: obj.data.len() as u64,
                content_type: obj.content_type.clone(),
                last_modified: obj.last_modified.clone(),
            }));
        }
        let _ = tx.send(ListEvent::Done(total));
        Ok(rx)
    }

    fn get(&self, path: &str, sink: &mut dyn Write) -> Result<ObjectMeta, FsError> {
        let objects = self.objects.lock().unwrap();
        let obj = objects.get(path).ok_or_else(|| self.missing(path))?;
        sink.write_all(&obj.data)?;
        Ok(ObjectMeta { size: obj.data.len() as u64, mtime: obj.mtime })
    }

    fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<(), FsError> {
        if self.fail.put.load(Ordering::SeqCst) {
            return Err(FsError::Backend("injected put failure".into()));
        }
        self.objects.lock().unwrap().insert(
            path.to_string(),
            MemObject {
                data: data.to_vec(),
                content_type: content_type.unwrap_or("application/octet-stream").to_string(),
                last_modified: String::new(),
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), FsError> {
        if self.fail.delete.load(Ordering::SeqCst) {
            return Err(FsError::Backend("injected delete failure".into()));
        }
        match self.objects.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(self.missing(path)),
        }
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), FsError> {
        if self.fail.copy.load(Ordering::SeqCst) {
            return Err(FsError::Backend("injected copy failure".into()));
        }
        let mut objects = self.objects.lock().unwrap();
        let src = objects.get(from).ok_or_else(|| self.missing(from))?.clone();
        objects.insert(to.to_string(), src);
        Ok(())
    }

    fn mkdir_marker(&self, path: &str) -> Result<(), FsError> {
        self.put(path, Bytes::new(), Some(DIRECTORY_CONTENT_TYPE))
    }

    fn rmdir_marker(&self, path: &str) -> Result<(), FsError> {
        self.delete(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_terminates_with_count() {
        let backend = MemBackend::new();
        backend.preload("a", b"xy", "text/plain", "2015-01-01T00:00:00");
        backend.preload("d", b"", DIRECTORY_CONTENT_TYPE, "2015-01-01T00:00:00");

        let rx = backend.list().unwrap();
        let mut names = Vec::new();
        let count = loop {
            match rx.recv().unwrap() {
                ListEvent::Object(obj) => names.push(obj.name),
                ListEvent::Done(n) => break n,
                ListEvent::Failed(err) => panic!("unexpected failure: {err}"),
            }
        };
        assert_eq!(count, 2);
        assert_eq!(names, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn put_get_roundtrip() {
        let backend = MemBackend::new();
        backend.put("f", Bytes::from_static(b"data"), None).unwrap();

        let mut sink = Vec::new();
        let meta = backend.get("f", &mut sink).unwrap();
        assert_eq!(sink, b"data");
        assert_eq!(meta.size, 4);
    }

    #[test]
    fn copy_clones_bytes() {
        let backend = MemBackend::new();
        backend.put("src", Bytes::from_static(b"data"), None).unwrap();
        backend.copy("src", "dst").unwrap();
        assert_eq!(backend.object("dst").unwrap().data, b"data");
    }

    #[test]
    fn injected_put_failure() {
        let backend = MemBackend::new();
        backend.fail.put.store(true, Ordering::SeqCst);
        assert!(backend.put("f", Bytes::new(), None).is_err());
    }
}
