//! Shared test utilities for flexport-core integration tests.
//!
//! [`MockStorage`] implements every backend trait over an in-memory tree,
//! with call logs, a switch that makes every call fail with 401, and gates
//! that hold a listing response pending until the test releases it.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flexport_core::auth::Credentials;
use flexport_core::backends::{
    AuthBackend, AuthStatus, ListingBackend, ListingResponse, RemoteBackend, SessionBackend,
    TransferBackend,
};
use flexport_core::config::ClientConfig;
use flexport_core::errors::BackendError;
use flexport_core::events::{Notice, NoticeReceiver};
use flexport_core::files::{DirectoryEntry, PermissionTriad, RemotePath, SpaceUsage};
use flexport_core::remote::{RemoteDownloadRequest, RemoteEntry, RemoteListRequest};
use flexport_core::session::{SessionKind, SessionStatus, UploadSession};
use flexport_core::SessionOrchestrator;
use tokio::sync::oneshot;

pub const PASSWORD: &str = "secret";

pub fn p(raw: &str) -> RemotePath {
    RemotePath::normalize(raw).unwrap()
}

pub fn file(name: &str) -> DirectoryEntry {
    DirectoryEntry {
        name: name.to_string(),
        is_directory: false,
        size: 1024,
        owner: "alice".into(),
        group: "staff".into(),
        permissions: PermissionTriad::parse("644").unwrap(),
        modified_at: 1_700_000_000,
        selected: false,
    }
}

pub fn dir(name: &str) -> DirectoryEntry {
    DirectoryEntry {
        is_directory: true,
        size: 4096,
        permissions: PermissionTriad::parse("755").unwrap(),
        ..file(name)
    }
}

pub fn session(id: &str, status: SessionStatus) -> UploadSession {
    UploadSession {
        id: id.to_string(),
        kind: SessionKind::LinksUpload,
        status,
        progress_percent: 50,
        detail_text: format!("session {id}"),
        started_at: "2024-05-20 17:05:24".into(),
        completed_at: None,
        expanded: false,
    }
}

/// In-memory storage service.
pub struct MockStorage {
    pub tree: Mutex<HashMap<String, Vec<DirectoryEntry>>>,
    /// Path the backend echoes for a requested path; defaults to the
    /// request with a trailing slash.
    pub echo: Mutex<HashMap<String, String>>,
    pub gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    /// Every call fails with 401 while set.
    pub unauthorized: AtomicBool,
    pub space: Mutex<Result<SpaceUsage, BackendError>>,
    pub listing_calls: Mutex<Vec<String>>,
    pub space_calls: AtomicUsize,
    pub sessions: Mutex<Vec<UploadSession>>,
    pub session_calls: AtomicUsize,
    pub session_actions: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub link_batches: Mutex<Vec<(Vec<String>, String)>>,
    pub remote: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    pub remote_downloads: Mutex<Vec<RemoteDownloadRequest>>,
}

impl MockStorage {
    /// ```text
    /// /            docs/ photos/ .bashrc readme.md
    /// /docs        a.txt b.txt drafts/
    /// /docs/drafts
    /// /photos      cat.jpg
    /// ```
    pub fn new() -> Arc<Self> {
        let mut tree = HashMap::new();
        tree.insert(
            "/".to_string(),
            vec![dir("docs"), dir("photos"), file(".bashrc"), file("readme.md")],
        );
        tree.insert(
            "/docs".to_string(),
            vec![file("a.txt"), file("b.txt"), dir("drafts")],
        );
        tree.insert("/docs/drafts".to_string(), vec![]);
        tree.insert("/photos".to_string(), vec![file("cat.jpg")]);

        let mut remote = HashMap::new();
        remote.insert(
            "/".to_string(),
            vec![
                RemoteEntry {
                    name: "report.pdf".into(),
                    is_directory: false,
                    size: 10,
                    modified_time: None,
                    selected: false,
                },
                RemoteEntry {
                    name: "archive".into(),
                    is_directory: true,
                    size: 0,
                    modified_time: None,
                    selected: false,
                },
            ],
        );

        Arc::new(Self {
            tree: Mutex::new(tree),
            echo: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            unauthorized: AtomicBool::new(false),
            space: Mutex::new(Ok(SpaceUsage {
                used: 25,
                total: 100,
                available: 75,
            })),
            listing_calls: Mutex::new(Vec::new()),
            space_calls: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
            session_calls: AtomicUsize::new(0),
            session_actions: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            link_batches: Mutex::new(Vec::new()),
            remote: Mutex::new(remote),
            remote_downloads: Mutex::new(Vec::new()),
        })
    }

    /// Hold the next listing of `path` until the returned sender fires.
    pub fn hold(&self, path: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(path.to_string(), rx);
        tx
    }

    pub fn expire(&self) {
        self.unauthorized.store(true, Ordering::SeqCst);
    }

    pub fn listing_calls(&self) -> Vec<String> {
        self.listing_calls.lock().unwrap().clone()
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    fn gatekeep(&self) -> Result<(), BackendError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            Err(BackendError::Unauthorized)
        } else {
            Ok(())
        }
    }

    fn not_found() -> BackendError {
        BackendError::Status {
            status: 404,
            message: "Directory not found".into(),
        }
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockStorage {
    async fn login(&self, credentials: &Credentials) -> Result<(), BackendError> {
        if credentials.password == PASSWORD {
            self.unauthorized.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(BackendError::Unauthorized)
        }
    }

    async fn logout(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn check_auth(&self) -> Result<AuthStatus, BackendError> {
        self.gatekeep()?;
        Ok(AuthStatus {
            authenticated: true,
            username: Some("alice".into()),
        })
    }
}

#[async_trait::async_trait]
impl ListingBackend for MockStorage {
    async fn fetch_listing(&self, path: &RemotePath) -> Result<ListingResponse, BackendError> {
        self.listing_calls.lock().unwrap().push(path.to_string());
        let gate = self.gates.lock().unwrap().remove(path.as_str());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.gatekeep()?;

        let entries = self
            .tree
            .lock()
            .unwrap()
            .get(path.as_str())
            .cloned()
            .ok_or_else(Self::not_found)?;
        let current_path = self
            .echo
            .lock()
            .unwrap()
            .get(path.as_str())
            .cloned()
            .unwrap_or_else(|| format!("{path}/"));
        Ok(ListingResponse {
            entries,
            current_path,
        })
    }

    async fn fetch_space_usage(&self) -> Result<SpaceUsage, BackendError> {
        self.space_calls.fetch_add(1, Ordering::SeqCst);
        self.gatekeep()?;
        self.space.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransferBackend for MockStorage {
    async fn upload_file(
        &self,
        dir: &RemotePath,
        name: &str,
        _data: &[u8],
    ) -> Result<(), BackendError> {
        self.gatekeep()?;
        let mut tree = self.tree.lock().unwrap();
        let entries = tree.get_mut(dir.as_str()).ok_or_else(Self::not_found)?;
        entries.push(file(name));
        self.uploads.lock().unwrap().push(format!("{dir}/{name}"));
        Ok(())
    }

    async fn submit_link_batch(
        &self,
        links: &[String],
        dir: &RemotePath,
    ) -> Result<(), BackendError> {
        self.gatekeep()?;
        self.link_batches
            .lock()
            .unwrap()
            .push((links.to_vec(), dir.to_string()));
        self.sessions
            .lock()
            .unwrap()
            .push(session("links-1", SessionStatus::Pending));
        Ok(())
    }

    async fn download_file(&self, path: &RemotePath) -> Result<Vec<u8>, BackendError> {
        self.gatekeep()?;
        Ok(format!("contents of {path}").into_bytes())
    }

    async fn delete_file(&self, path: &RemotePath) -> Result<(), BackendError> {
        self.gatekeep()?;
        let parent = path.parent();
        let name = path.file_name().unwrap_or_default().to_string();
        let mut tree = self.tree.lock().unwrap();
        let entries = tree.get_mut(parent.as_str()).ok_or_else(Self::not_found)?;
        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() == before {
            return Err(Self::not_found());
        }
        self.deletes.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteBackend for MockStorage {
    async fn list_remote(
        &self,
        request: &RemoteListRequest,
    ) -> Result<Vec<RemoteEntry>, BackendError> {
        self.gatekeep()?;
        self.remote
            .lock()
            .unwrap()
            .get(request.path.as_str())
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn download_remote(&self, request: &RemoteDownloadRequest) -> Result<(), BackendError> {
        self.gatekeep()?;
        self.remote_downloads.lock().unwrap().push(request.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionBackend for MockStorage {
    async fn list_sessions(&self, _username: &str) -> Result<Vec<UploadSession>, BackendError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.gatekeep()?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn cancel_session(&self, id: &str) -> Result<(), BackendError> {
        self.gatekeep()?;
        self.session_actions.lock().unwrap().push(format!("cancel:{id}"));
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), BackendError> {
        self.gatekeep()?;
        self.session_actions.lock().unwrap().push(format!("delete:{id}"));
        self.sessions.lock().unwrap().retain(|s| s.id != id);
        Ok(())
    }
}

/// Orchestrator over `storage`, already logged in as alice.
pub async fn logged_in(
    storage: &Arc<MockStorage>,
) -> (SessionOrchestrator<MockStorage>, NoticeReceiver) {
    let (orchestrator, notices) = SessionOrchestrator::new(storage.clone(), ClientConfig::default());
    orchestrator
        .login(Credentials::new("alice", PASSWORD))
        .await
        .unwrap();
    (orchestrator, notices)
}

/// Let spawned tasks run without moving a paused clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Everything currently queued on the notice channel.
pub fn drain(notices: &mut NoticeReceiver) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}
