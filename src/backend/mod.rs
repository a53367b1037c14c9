//! The object-storage port.
//!
//! `ObjectBackend` is the capability set the mapper drives: listing, whole
//! object GET/PUT/DELETE, server-side COPY, container metadata and the
//! directory-marker shortcuts. Exactly one backend is active per mount, so
//! the mapper holds it as `Arc<dyn ObjectBackend>` rather than going through
//! any driver registry.

use std::io::Write;
use std::sync::mpsc::Receiver;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use log::debug;

use crate::errors::FsError;

pub mod swift;

#[cfg(test)]
pub mod mem;

/// Content type that marks a zero-byte object as an explicit directory.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Quota assumed when the account carries no `X-Account-Meta-Quota-Bytes`.
pub const DEFAULT_QUOTA_BYTES: u64 = 1024 * 1024 * 1024 * 1024 * 100; // 100 TiB

/// One row of the container listing, as the store reports it.
///
/// `last_modified` is kept as the raw string; the consumer applies the
/// timezone-append rule via [`object_time_or_now`].
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub name: String,
    pub bytes: u64,
    pub content_type: String,
    pub last_modified: String,
}

/// Metadata returned alongside a downloaded object body.
#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub size: u64,
    pub mtime: SystemTime,
}

/// Container-level numbers surfaced to `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    pub quota: u64,
    pub used: u64,
    pub count: u64,
}

/// Messages of the listing stream. The producer pushes every object and
/// finishes with `Done(count)` so the consumer knows it has seen all pages;
/// a transport failure mid-stream surfaces as `Failed`.
pub enum ListEvent {
    Object(RemoteObject),
    Done(usize),
    Failed(FsError),
}

/// Blocking contract over the remote container. Implementations are
/// thread-safe; concurrent callers are permitted.
pub trait ObjectBackend: Send + Sync {
    /// Establish credentials and a service endpoint. Called once at mount;
    /// implementations re-authenticate transparently when a token expires.
    fn authenticate(&self) -> Result<(), FsError>;

    /// Account quota plus container usage/count, fetched concurrently.
    /// Fails with a backend error if either side fails.
    fn container_stat(&self) -> Result<ContainerStats, FsError>;

    fn container_exists(&self) -> Result<bool, FsError>;
    fn container_create(&self) -> Result<(), FsError>;
    fn container_delete(&self) -> Result<(), FsError>;

    /// Lazy listing of the whole container. The receiver must be drained
    /// until [`ListEvent::Done`] (or `Failed`) arrives.
    fn list(&self) -> Result<Receiver<ListEvent>, FsError>;

    /// Download the object body into `sink`, returning its metadata.
    fn get(&self, path: &str, sink: &mut dyn Write) -> Result<ObjectMeta, FsError>;

    /// Upload a whole object. On success the remote object exists.
    fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<(), FsError>;

    fn delete(&self, path: &str) -> Result<(), FsError>;

    /// Server-side copy within the container.
    fn copy(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Create the zero-byte `application/directory` marker object.
    fn mkdir_marker(&self, path: &str) -> Result<(), FsError>;

    /// Remove a directory marker object.
    fn rmdir_marker(&self, path: &str) -> Result<(), FsError>;
}

/// Parse an object timestamp as reported by the store.
///
/// The store returns ISO-8601 without a timezone designator, so a `Z` is
/// appended before parsing as RFC 3339. Returns `None` on any malformed
/// component.
pub fn parse_object_time(raw: &str) -> Option<SystemTime> {
    let s = raw.strip_suffix('Z').unwrap_or(raw);
    let (date, time) = s.split_once('T')?;

    let mut parts = date.splitn(3, '-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let (hms, frac) = match time.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (time, None),
    };
    let mut parts = hms.splitn(3, ':');
    let hour: u64 = parts.next()?.parse().ok()?;
    let minute: u64 = parts.next()?.parse().ok()?;
    let second: u64 = parts.next()?.parse().ok()?;
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    let nanos: u32 = match frac {
        Some(frac) => {
            let digits: String = frac.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() || digits.len() != frac.len() {
                return None;
            }
            let padded = format!("{digits:0<9}");
            padded[..9].parse().ok()?
        }
        None => 0,
    };

    let days = days_from_civil(year, month, day);
    let secs = days.checked_mul(86_400)?
        .checked_add((hour * 3600 + minute * 60 + second) as i64)?;
    if secs < 0 {
        // Pre-epoch timestamps never come out of the store.
        return None;
    }
    Some(UNIX_EPOCH + Duration::new(secs as u64, nanos))
}

/// Timestamp parse with the fallback rule: malformed input yields "now".
pub fn object_time_or_now(raw: &str) -> SystemTime {
    match parse_object_time(raw) {
        Some(t) => t,
        None => {
            debug!("invalid time format [{raw}], falling back to now");
            SystemTime::now()
        }
    }
}

/// Days between 1970-01-01 and the given civil date (proleptic Gregorian).
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + (d as i64 - 1);
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
