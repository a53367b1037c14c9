//! The authoritative name→entry index.
//!
//! The mapper mediates every filesystem operation against the backend:
//! it is populated once from the container listing at mount time and stays
//! the single source of truth afterwards. Callers (the FUSE adapter)
//! serialise access through one coarse lock, so the mapper itself is free
//! of interior locking; network I/O simply happens on the calling thread.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::debug;

use crate::backend::{
    ContainerStats, DIRECTORY_CONTENT_TYPE, ListEvent, ObjectBackend, object_time_or_now,
};
use crate::errors::FsError;
use crate::scratch::ScratchStore;

pub mod entry;

pub use entry::{EntryKind, ObjectEntry};

pub struct ObjectMapper {
    backend: Arc<dyn ObjectBackend>,
    scratch: ScratchStore,
    entries: HashMap<String, ObjectEntry>,

    /// TTL for the statfs numbers; `None` disables caching.
    stats_ttl: Option<Duration>,
    stats_cache: Option<(Instant, ContainerStats)>,
}

impl ObjectMapper {
    pub fn new(
        backend: Arc<dyn ObjectBackend>,
        scratch: ScratchStore,
        stats_ttl: Option<Duration>,
    ) -> Self {
        ObjectMapper {
            backend,
            scratch,
            entries: HashMap::new(),
            stats_ttl,
            stats_cache: None,
        }
    }

    pub fn scratch(&self) -> &ScratchStore {
        &self.scratch
    }

    /// Populate the index from the container listing. Called once at mount;
    /// blocks until the listing stream reports its final count.
    pub fn sync(&mut self) -> Result<(), FsError> {
        debug!("[mapper] sync begin");

        let stream = self.backend.list()?;
        loop {
            match stream.recv() {
                Ok(ListEvent::Object(obj)) => {
                    let kind = if obj.content_type == DIRECTORY_CONTENT_TYPE {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    };
                    debug!("[mapper] sync append {} {}", obj.name, obj.content_type);

                    let mut entry = ObjectEntry::new(&obj.name, kind);
                    entry.size = obj.bytes;
                    entry.mtime = object_time_or_now(&obj.last_modified);
                    self.entries.insert(obj.name, entry);
                }
                Ok(ListEvent::Done(count)) => {
                    debug!("[mapper] sync complete, {count} objects");
                    return Ok(());
                }
                Ok(ListEvent::Failed(err)) => return Err(err),
                Err(_) => return Err(FsError::Backend("listing stream ended early".into())),
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&ObjectEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Every entry whose `dir` field equals `dirname` exactly. A snapshot of
    /// the current index; no recursion, no backend round-trip.
    pub fn open_dir(&self, dirname: &str) -> Vec<&ObjectEntry> {
        self.entries.values().filter(|e| e.dir == dirname).collect()
    }

    /// Insert a fresh file entry and create the zero-byte remote object.
    /// The entry is not retained if the upload fails.
    pub fn create(&mut self, path: &str) -> Result<(), FsError> {
        debug!("[mapper] create {path}");

        if self.entries.contains_key(path) {
            return Err(FsError::Exists(path.to_string()));
        }
        self.entries
            .insert(path.to_string(), ObjectEntry::new(path, EntryKind::File));

        if let Err(err) = self.backend.put(path, Bytes::new(), None) {
            self.entries.remove(path);
            return Err(err);
        }
        Ok(())
    }

    /// Insert a directory entry and create its remote marker object.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        debug!("[mapper] mkdir {path}");

        if self.entries.contains_key(path) {
            return Err(FsError::Exists(path.to_string()));
        }
        self.entries
            .insert(path.to_string(), ObjectEntry::new(path, EntryKind::Directory));

        if let Err(err) = self.backend.mkdir_marker(path) {
            self.entries.remove(path);
            return Err(err);
        }
        Ok(())
    }

    /// Remove one entry: backend object first, then the staged copy and the
    /// index record. Open descriptors against the scratch file keep working
    /// after the unlink; a later release on the vanished entry skips its
    /// upload.
    pub fn delete(&mut self, path: &str) -> Result<(), FsError> {
        debug!("[mapper] delete {path}");

        if !self.entries.contains_key(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        match self.backend.delete(path) {
            Ok(()) => {}
            // An object that vanished out of band is already in the state
            // the unlink asks for; failing would leave a ghost entry that
            // could never be removed.
            Err(err) if err.is_not_found() => {
                debug!("[mapper] delete {path}: already gone remotely");
            }
            Err(err) => return Err(err),
        }
        self.scratch.remove(path)?;
        self.entries.remove(path);
        Ok(())
    }

    /// Depth-first recursive removal of a directory and everything below it.
    /// Best-effort: a failure aborts mid-walk and leaves already-deleted
    /// children deleted.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        debug!("[mapper] rmdir {path}");

        if !self.entries.contains_key(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        let children: Vec<(String, EntryKind)> = self
            .entries
            .values()
            .filter(|e| e.dir == path)
            .map(|e| (e.path.clone(), e.kind))
            .collect();
        for (child, kind) in children {
            match kind {
                EntryKind::Directory => self.rmdir(&child)?,
                EntryKind::File => self.delete(&child)?,
            }
        }
        self.delete(path)
    }

    /// Rename via staged copy plus server-side COPY and DELETE.
    ///
    /// The scratch copy is propagated to the new name so a subsequent open
    /// finds the bytes already staged. The map insertion and the remote copy
    /// are not atomic; the index is rebuilt from the listing on the next
    /// mount, which bounds the damage of a crash in between.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), FsError> {
        debug!("[mapper] rename {old} to {new}");

        let kind = self
            .entries
            .get(old)
            .ok_or_else(|| FsError::NotFound(old.to_string()))?
            .kind;

        // Stage the source (downloads once when not staged yet).
        let mut from = {
            let entry = self.entries.get_mut(old).unwrap();
            entry.open(&self.scratch, self.backend.as_ref(), libc::O_RDONLY)?
        };

        let mut to_entry = ObjectEntry::new(new, kind);
        let mut to = to_entry.open(
            &self.scratch,
            self.backend.as_ref(),
            libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC,
        )?;

        let copied = match io::copy(&mut from, &mut to) {
            Ok(n) => n,
            Err(err) => {
                let _ = self.scratch.remove(new);
                return Err(err.into());
            }
        };
        drop(to);
        drop(from);

        let source_len = fs::metadata(self.scratch.local_path(old))?.len();
        if copied != source_len {
            let _ = self.scratch.remove(new);
            return Err(FsError::CopyIncomplete(new.to_string(), copied, source_len));
        }

        to_entry.flush(&self.scratch)?;
        to_entry.downloaded = true;
        self.entries.insert(new.to_string(), to_entry);

        if let Err(err) = self.backend.copy(old, new) {
            let _ = self.scratch.remove(new);
            self.entries.remove(new);
            return Err(err);
        }

        self.delete(old)
    }

    /// Container-level numbers for statfs, cached for the configured TTL.
    pub fn stat(&mut self) -> Result<ContainerStats, FsError> {
        if let (Some(ttl), Some((fetched, stats))) = (self.stats_ttl, self.stats_cache) {
            if fetched.elapsed() < ttl {
                return Ok(stats);
            }
        }
        let stats = self.backend.container_stat()?;
        self.stats_cache = Some((Instant::now(), stats));
        Ok(stats)
    }

    /// Open the staged copy of `path` for a file handle.
    pub fn open(&mut self, path: &str, flags: i32) -> Result<File, FsError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        entry.open(&self.scratch, self.backend.as_ref(), flags)
    }

    pub fn mark_dirty(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.dirty = true;
        }
    }

    /// Re-stat the staged copy of `path` into the entry metadata.
    pub fn flush_entry(&mut self, path: &str) -> Result<(), FsError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        entry.flush(&self.scratch)
    }

    /// Upload the staged copy of `path`; clears the dirty flag on success.
    pub fn upload_entry(&mut self, path: &str) -> Result<(), FsError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        entry.upload(&self.scratch, self.backend.as_ref())
    }
}
