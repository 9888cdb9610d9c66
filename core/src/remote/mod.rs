//! Browsing a second server over FTP or SFTP, proxied by the backend.
//!
//! Works like [`ListingStore`](crate::files::ListingStore) with a few
//! differences:
//!
//! - entries are sorted locally, directories first and then by name,
//! - hidden files are never filtered,
//! - selected files feed a server-side download rather than a local action,
//! - every request carries the full connection, because the backend does not
//!   keep the remote login open between calls.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backends::RemoteBackend;
use crate::errors::{ListingError, OpenError, TransferError};
use crate::files::{LoadOutcome, RemotePath};
use crate::transfer::BatchReport;

/// Protocol spoken by the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    Ftp,
    Sftp,
}

impl RemoteProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            RemoteProtocol::Ftp => 21,
            RemoteProtocol::Sftp => 22,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteProtocol::Ftp => "ftp",
            RemoteProtocol::Sftp => "sftp",
        }
    }
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RemoteProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ftp" => Ok(RemoteProtocol::Ftp),
            "sftp" => Ok(RemoteProtocol::Sftp),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// Everything needed to reach the remote server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnection {
    pub protocol: RemoteProtocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl RemoteConnection {
    /// Connection on the protocol's default port.
    pub fn new(
        protocol: RemoteProtocol,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: protocol.default_port(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(skip)]
    pub selected: bool,
}

/// List a remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteListRequest {
    #[serde(flatten)]
    pub connection: RemoteConnection,
    pub path: RemotePath,
}

/// Copy a remote file into the user's own storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDownloadRequest {
    #[serde(flatten)]
    pub connection: RemoteConnection,
    /// File on the remote server.
    pub path: RemotePath,
    /// Destination directory in the user's storage.
    pub local_path: RemotePath,
    pub local_user: String,
}

struct BrowserInner {
    current_path: RemotePath,
    entries: Arc<Vec<RemoteEntry>>,
    is_loading: bool,
    issued: u64,
}

/// Path and listing state for one remote server.
pub struct RemoteBrowser {
    backend: Arc<dyn RemoteBackend>,
    connection: RemoteConnection,
    inner: Mutex<BrowserInner>,
}

impl RemoteBrowser {
    pub fn new(backend: Arc<dyn RemoteBackend>, connection: RemoteConnection) -> Self {
        Self {
            backend,
            connection,
            inner: Mutex::new(BrowserInner {
                current_path: RemotePath::root(),
                entries: Arc::new(Vec::new()),
                is_loading: false,
                issued: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrowserInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connection(&self) -> &RemoteConnection {
        &self.connection
    }

    /// List `path` on the remote server; last request wins.
    pub async fn load(&self, path: &RemotePath) -> Result<LoadOutcome, ListingError> {
        let seq = {
            let mut inner = self.lock();
            inner.issued += 1;
            inner.is_loading = true;
            inner.issued
        };
        let request = RemoteListRequest {
            connection: self.connection.clone(),
            path: path.clone(),
        };
        debug!(
            protocol = %self.connection.protocol,
            host = %self.connection.host,
            %path,
            seq,
            "Listing remote directory"
        );

        let pending = PendingList {
            browser: self,
            seq,
            armed: true,
        };
        let result = self.backend.list_remote(&request).await;
        pending.disarm();

        let mut inner = self.lock();
        if seq != inner.issued {
            debug!(%path, seq, latest = inner.issued, "Discarding superseded remote listing");
            return Ok(LoadOutcome::Superseded);
        }
        inner.is_loading = false;

        let fresh = match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!(host = %self.connection.host, %path, "Remote listing failed: {e}");
                return Err(e.into());
            }
        };

        let keep: HashSet<String> = if *path == inner.current_path {
            inner
                .entries
                .iter()
                .filter(|e| e.selected)
                .map(|e| e.name.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let mut entries: Vec<RemoteEntry> = fresh
            .into_iter()
            .map(|mut entry| {
                entry.selected = !entry.is_directory && keep.contains(&entry.name);
                entry
            })
            .collect();
        sort_entries(&mut entries);

        inner.entries = Arc::new(entries);
        inner.current_path = path.clone();
        Ok(LoadOutcome::Applied(path.clone()))
    }

    /// Descend into the named directory. Files are ignored (`Ok(None)`).
    pub async fn open(&self, name: &str) -> Result<Option<LoadOutcome>, OpenError> {
        let (current, is_directory) = {
            let inner = self.lock();
            let is_directory = inner
                .entries
                .iter()
                .any(|e| e.name == name && e.is_directory);
            (inner.current_path.clone(), is_directory)
        };
        if !is_directory {
            return Ok(None);
        }
        let target = current.join(name)?;
        Ok(Some(self.load(&target).await?))
    }

    /// Load the parent directory; at the root this reloads the root.
    pub async fn go_up(&self) -> Result<LoadOutcome, ListingError> {
        let parent = self.current_path().parent();
        self.load(&parent).await
    }

    pub async fn refresh(&self) -> Result<LoadOutcome, ListingError> {
        let current = self.current_path();
        self.load(&current).await
    }

    /// Flip selection of a file. Directories and unknown names are ignored.
    pub fn toggle_selection(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner
            .entries
            .iter()
            .position(|e| e.name == name && !e.is_directory)
        else {
            return false;
        };
        let mut entries = inner.entries.as_ref().clone();
        entries[index].selected = !entries[index].selected;
        inner.entries = Arc::new(entries);
        true
    }

    pub fn clear_selection(&self) {
        let mut inner = self.lock();
        if inner.entries.iter().any(|e| e.selected) {
            let entries = inner
                .entries
                .iter()
                .cloned()
                .map(|mut e| {
                    e.selected = false;
                    e
                })
                .collect();
            inner.entries = Arc::new(entries);
        }
    }

    pub fn selected_files(&self) -> Vec<RemoteEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.selected)
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> Arc<Vec<RemoteEntry>> {
        self.lock().entries.clone()
    }

    pub fn current_path(&self) -> RemotePath {
        self.lock().current_path.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    /// Start a server-side copy of every selected file into `local_path`.
    ///
    /// One request per file; progress is tracked as sessions.
    pub async fn download_selected(
        &self,
        local_path: &RemotePath,
        local_user: &str,
    ) -> Result<BatchReport, TransferError> {
        let current = self.current_path();
        let selected = self.selected_files();
        if selected.is_empty() {
            return Err(TransferError::NothingToDo("no remote files selected".into()));
        }

        let mut report = BatchReport::default();
        for entry in selected {
            let result = match current.join(&entry.name) {
                Ok(path) => {
                    let request = RemoteDownloadRequest {
                        connection: self.connection.clone(),
                        path,
                        local_path: local_path.clone(),
                        local_user: local_user.to_string(),
                    };
                    self.backend.download_remote(&request).await
                }
                Err(e) => {
                    report.failed.push((entry.name, e.to_string()));
                    continue;
                }
            };
            report.record(entry.name, result)?;
        }

        info!(
            host = %self.connection.host,
            started = report.succeeded.len(),
            failed = report.failed.len(),
            "Remote downloads requested"
        );
        Ok(report)
    }
}

/// Directories first, then by name.
fn sort_entries(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Resets `is_loading` when a listing is dropped before it resolves, unless
/// a newer listing has taken over.
struct PendingList<'a> {
    browser: &'a RemoteBrowser,
    seq: u64,
    armed: bool,
}

impl PendingList<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingList<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.browser.lock();
        if inner.issued == self.seq {
            inner.is_loading = false;
        }
    }
}
