//! Collaborator contract for the storage service.
//!
//! The core crate defines *what* it needs from the backend; consumers inject
//! *how* by implementing these traits. [`http::HttpBackend`] (feature
//! `http`) talks to the REST service; tests use in-memory fakes.
//!
//! Each trait covers one concern so a component only sees the calls it is
//! allowed to make. [`StorageBackend`] is the union, implemented
//! automatically for any type that provides all of them.

#[cfg(feature = "http")]
pub mod http;

use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::errors::BackendError;
use crate::files::{DirectoryEntry, RemotePath, SpaceUsage};
use crate::remote::{RemoteDownloadRequest, RemoteEntry, RemoteListRequest};
use crate::session::UploadSession;

/// One directory listing as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub entries: Vec<DirectoryEntry>,
    /// The path as the backend resolved it; not necessarily canonical.
    pub current_path: String,
}

/// Result of asking the backend whether a login is still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub username: Option<String>,
}

/// Login lifecycle calls.
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// Log in. A rejected pair is [`BackendError::Unauthorized`].
    async fn login(&self, credentials: &Credentials) -> Result<(), BackendError>;

    async fn logout(&self) -> Result<(), BackendError>;

    /// Ask whether an existing login (e.g. a session cookie) is still valid.
    async fn check_auth(&self) -> Result<AuthStatus, BackendError>;
}

/// Directory listing calls against the user's own storage.
#[async_trait::async_trait]
pub trait ListingBackend: Send + Sync {
    async fn fetch_listing(&self, path: &RemotePath) -> Result<ListingResponse, BackendError>;

    async fn fetch_space_usage(&self) -> Result<SpaceUsage, BackendError>;
}

/// Upload, download and delete calls against the user's own storage.
#[async_trait::async_trait]
pub trait TransferBackend: Send + Sync {
    /// Upload a single file into `dir`.
    async fn upload_file(
        &self,
        dir: &RemotePath,
        name: &str,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Ask the backend to fetch `links` into `dir`; tracked as a session.
    async fn submit_link_batch(&self, links: &[String], dir: &RemotePath)
        -> Result<(), BackendError>;

    async fn download_file(&self, path: &RemotePath) -> Result<Vec<u8>, BackendError>;

    async fn delete_file(&self, path: &RemotePath) -> Result<(), BackendError>;
}

/// Calls proxied by the backend to a second FTP/SFTP server.
///
/// Every request carries the full connection parameters; the backend does
/// not keep the remote login alive between calls.
#[async_trait::async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn list_remote(&self, request: &RemoteListRequest)
        -> Result<Vec<RemoteEntry>, BackendError>;

    /// Start a server-side transfer; progress is observed through sessions.
    async fn download_remote(&self, request: &RemoteDownloadRequest) -> Result<(), BackendError>;
}

/// Upload/transfer session calls.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    async fn list_sessions(&self, username: &str) -> Result<Vec<UploadSession>, BackendError>;

    async fn cancel_session(&self, id: &str) -> Result<(), BackendError>;

    async fn delete_session(&self, id: &str) -> Result<(), BackendError>;
}

/// Everything the orchestrator needs from one backend value.
pub trait StorageBackend:
    AuthBackend + ListingBackend + TransferBackend + RemoteBackend + SessionBackend
{
}

impl<T> StorageBackend for T where
    T: AuthBackend + ListingBackend + TransferBackend + RemoteBackend + SessionBackend
{
}
