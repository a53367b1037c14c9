//! OpenStack Swift driver for the [`ObjectBackend`] port.
//!
//! All HTTP goes through one `reqwest` client driven by a dedicated Tokio
//! runtime; the blocking trait methods wrap the async calls with
//! `Runtime::block_on`. Authentication is the v1 token handshake: a GET on
//! the auth endpoint with `X-Auth-User`/`X-Auth-Key` yields `X-Storage-Url`
//! and `X-Auth-Token`. A 401 on any later request drops the session and
//! retries once after re-authenticating.

use std::io::Write;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use tokio::runtime::Runtime;
use url::Url;

use super::{
    ContainerStats, DEFAULT_QUOTA_BYTES, DIRECTORY_CONTENT_TYPE, ListEvent, ObjectBackend,
    ObjectMeta, RemoteObject,
};
use crate::config::SwiftCredentials;
use crate::errors::FsError;

const AUTH_TOKEN: &str = "X-Auth-Token";
const ACCOUNT_QUOTA: &str = "X-Account-Meta-Quota-Bytes";
const CONTAINER_USED: &str = "X-Container-Bytes-Used";
const CONTAINER_COUNT: &str = "X-Container-Object-Count";

#[derive(Clone)]
struct Session {
    token: String,
    storage_url: String,
}

pub struct SwiftBackend {
    runtime: Runtime,
    client: Client,
    creds: SwiftCredentials,
    container: String,
    list_page_size: usize,
    session: Mutex<Option<Session>>,
}

/// One row of the `?format=json` container listing.
#[derive(Deserialize)]
struct ListRow {
    name: String,
    bytes: u64,
    content_type: String,
    last_modified: String,
}

impl SwiftBackend {
    /// `debug_transport` turns on reqwest's connection tracing so every
    /// request/response shows up in the debug log.
    pub fn new(
        creds: SwiftCredentials,
        container: &str,
        list_page_size: usize,
        debug_transport: bool,
    ) -> Result<Self, FsError> {
        Url::parse(&creds.auth_url)
            .map_err(|e| FsError::Auth(format!("invalid auth url \"{}\": {e}", creds.auth_url)))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let client = Client::builder().connection_verbose(debug_transport).build()?;

        Ok(SwiftBackend {
            runtime,
            client,
            creds,
            container: container.to_string(),
            list_page_size,
            session: Mutex::new(None),
        })
    }

    fn session(&self) -> Result<Session, FsError> {
        if let Some(s) = self.session.lock().unwrap().clone() {
            return Ok(s);
        }
        self.authenticate()?;
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FsError::Auth("no session after authenticate".into()))
    }

    fn invalidate_session(&self) {
        *self.session.lock().unwrap() = None;
    }

    fn container_url(&self, sess: &Session) -> String {
        format!("{}/{}", sess.storage_url.trim_end_matches('/'), self.container)
    }

    fn object_url(&self, sess: &Session, path: &str) -> String {
        format!("{}/{}", self.container_url(sess), path)
    }

    /// Send a request built by `build`, re-authenticating once on 401.
    fn send<F>(&self, build: F) -> Result<Response, FsError>
    where
        F: Fn(&Client, &Session) -> reqwest::RequestBuilder,
    {
        let mut reauthed = false;
        loop {
            let sess = self.session()?;
            let resp = self
                .runtime
                .block_on(build(&self.client, &sess).header(AUTH_TOKEN, &sess.token).send())?;
            if resp.status() == StatusCode::UNAUTHORIZED && !reauthed {
                debug!("(swift) token rejected, re-authenticating");
                self.invalidate_session();
                reauthed = true;
                continue;
            }
            return Ok(resp);
        }
    }
}

fn expect_success(resp: Response, path: &str) -> Result<Response, FsError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(FsError::BackendStatus { status: resp.status().as_u16(), path: path.to_string() })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// Combine the account and container HEAD replies into [`ContainerStats`],
/// applying the 100 TiB quota assumption when the account header is absent.
fn stats_from_headers(account: &HeaderMap, container: &HeaderMap) -> ContainerStats {
    let quota = match header_u64(account, ACCOUNT_QUOTA) {
        Some(q) => q,
        None => {
            debug!("(swift) no account quota header, assuming {DEFAULT_QUOTA_BYTES} bytes");
            DEFAULT_QUOTA_BYTES
        }
    };
    ContainerStats {
        quota,
        used: header_u64(container, CONTAINER_USED).unwrap_or(0),
        count: header_u64(container, CONTAINER_COUNT).unwrap_or(0),
    }
}

/// Object mtime from the `X-Timestamp` header (epoch seconds, fractional).
fn mtime_from_headers(headers: &HeaderMap) -> SystemTime {
    headers
        .get("X-Timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0 && *secs < 1e15)
        .map(|secs| UNIX_EPOCH + Duration::from_secs_f64(secs))
        .unwrap_or_else(SystemTime::now)
}

impl ObjectBackend for SwiftBackend {
    fn authenticate(&self) -> Result<(), FsError> {
        debug!("(swift) authenticating user \"{}\"", self.creds.username);

        let resp = self.runtime.block_on(
            self.client
                .get(&self.creds.auth_url)
                .header("X-Auth-User", &self.creds.username)
                .header("X-Auth-Key", &self.creds.password)
                .send(),
        )?;
        if !resp.status().is_success() {
            return Err(FsError::Auth(format!("auth endpoint returned {}", resp.status())));
        }

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let storage_url = header("X-Storage-Url")
            .ok_or_else(|| FsError::Auth("auth reply carries no X-Storage-Url".into()))?;
        let token = header(AUTH_TOKEN)
            .ok_or_else(|| FsError::Auth("auth reply carries no X-Auth-Token".into()))?;

        *self.session.lock().unwrap() = Some(Session { token, storage_url });
        Ok(())
    }

    fn container_stat(&self) -> Result<ContainerStats, FsError> {
        let mut reauthed = false;
        loop {
            let sess = self.session()?;
            let account = self
                .client
                .head(&sess.storage_url)
                .header(AUTH_TOKEN, &sess.token);
            let container = self
                .client
                .head(self.container_url(&sess))
                .header(AUTH_TOKEN, &sess.token);

            // Both metadata requests run concurrently; either failure fails
            // the whole call.
            let (aresp, cresp) = self
                .runtime
                .block_on(async { tokio::try_join!(account.send(), container.send()) })?;

            if (aresp.status() == StatusCode::UNAUTHORIZED
                || cresp.status() == StatusCode::UNAUTHORIZED)
                && !reauthed
            {
                self.invalidate_session();
                reauthed = true;
                continue;
            }
            let aresp = expect_success(aresp, "(account)")?;
            let cresp = expect_success(cresp, &self.container)?;
            return Ok(stats_from_headers(aresp.headers(), cresp.headers()));
        }
    }

    fn container_exists(&self) -> Result<bool, FsError> {
        let resp = self.send(|client, sess| client.head(self.container_url(sess)))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(resp, &self.container).map(|_| true)
    }

    fn container_create(&self) -> Result<(), FsError> {
        let resp = self.send(|client, sess| client.put(self.container_url(sess)))?;
        expect_success(resp, &self.container).map(|_| ())
    }

    fn container_delete(&self) -> Result<(), FsError> {
        let resp = self.send(|client, sess| client.delete(self.container_url(sess)))?;
        expect_success(resp, &self.container).map(|_| ())
    }

    fn list(&self) -> Result<Receiver<ListEvent>, FsError> {
        let sess = self.session()?;
        let client = self.client.clone();
        let base = self.container_url(&sess);
        let token = sess.token;
        let page_size = self.list_page_size;
        let container = self.container.clone();

        let (tx, rx) = mpsc::channel();
        self.runtime.spawn(async move {
            let limit = page_size.to_string();
            let mut marker: Option<String> = None;
            let mut total = 0usize;
            loop {
                let mut req = client
                    .get(&base)
                    .header(AUTH_TOKEN, &token)
                    .query(&[("format", "json"), ("limit", limit.as_str())]);
                if let Some(m) = &marker {
                    req = req.query(&[("marker", m.as_str())]);
                }

                let resp = match req.send().await {
                    Ok(resp) => resp,
                    Err(err) => {
                        let _ = tx.send(ListEvent::Failed(err.into()));
                        return;
                    }
                };
                if !resp.status().is_success() {
                    let _ = tx.send(ListEvent::Failed(FsError::BackendStatus {
                        status: resp.status().as_u16(),
                        path: container.clone(),
                    }));
                    return;
                }
                let rows: Vec<ListRow> = match resp.json().await {
                    Ok(rows) => rows,
                    Err(err) => {
                        let _ = tx.send(ListEvent::Failed(err.into()));
                        return;
                    }
                };

                let fetched = rows.len();
                for row in rows {
                    marker = Some(row.name.clone());
                    total += 1;
                    let _ = tx.send(ListEvent::Object(RemoteObject {
                        name: row.name,
                        bytes: row.bytes,
                        content_type: row.content_type,
                        last_modified: row.last_modified,
                    }));
                }
                if fetched < page_size {
                    break;
                }
            }
            debug!("(swift) listed {total} objects");
            let _ = tx.send(ListEvent::Done(total));
        });

        Ok(rx)
    }

    fn get(&self, path: &str, sink: &mut dyn Write) -> Result<ObjectMeta, FsError> {
        debug!("(swift) download object \"{path}\"");

        let resp = self.send(|client, sess| client.get(self.object_url(sess, path)))?;
        let resp = expect_success(resp, path)?;
        let mtime = mtime_from_headers(resp.headers());

        let mut written: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = self.runtime.block_on(stream.next()) {
            let chunk = chunk?;
            sink.write_all(&chunk)?;
            written += chunk.len() as u64;
        }

        Ok(ObjectMeta { size: written, mtime })
    }

    fn put(&self, path: &str, data: Bytes, content_type: Option<&str>) -> Result<(), FsError> {
        debug!("(swift) upload object \"{path}\" ({} bytes)", data.len());

        let resp = self.send(|client, sess| {
            let mut req = client.put(self.object_url(sess, path)).body(data.clone());
            if let Some(ct) = content_type {
                req = req.header(CONTENT_TYPE, ct);
            }
            req
        })?;
        expect_success(resp, path).map(|_| ())
    }

    fn delete(&self, path: &str) -> Result<(), FsError> {
        let resp = self.send(|client, sess| client.delete(self.object_url(sess, path)))?;
        expect_success(resp, path).map(|_| ())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), FsError> {
        debug!("(swift) copy object \"{from}\" to \"{to}\"");

        let destination = format!("{}/{}", self.container, to);
        let resp = self.send(|client, sess| {
            client
                .request(Method::from_bytes(b"COPY").unwrap(), self.object_url(sess, from))
                .header("Destination", &destination)
        })?;
        expect_success(resp, from).map(|_| ())
    }

    fn mkdir_marker(&self, path: &str) -> Result<(), FsError> {
        self.put(path, Bytes::new(), Some(DIRECTORY_CONTENT_TYPE))
    }

    fn rmdir_marker(&self, path: &str) -> Result<(), FsError> {
        if let Err(err) = self.delete(path) {
            warn!("(swift) remove directory marker \"{path}\": {err}");
            return Err(err);
        }
        Ok(())
    }
}
