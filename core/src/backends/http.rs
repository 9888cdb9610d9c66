//! REST implementation of the backend traits.
//!
//! Speaks the storage service's JSON API. The bearer token returned by
//! `/login` is kept in memory (zeroized when replaced) and attached to every
//! later request; the cookie store carries any session cookie the service
//! sets as well.

use std::sync::{Mutex, MutexGuard};

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::errors::BackendError;
use crate::files::{DirectoryEntry, PermissionTriad, RemotePath, SpaceUsage};
use crate::remote::{RemoteConnection, RemoteDownloadRequest, RemoteEntry, RemoteListRequest};
use crate::session::{SessionKind, SessionStatus, UploadSession};

use super::{
    AuthBackend, AuthStatus, ListingBackend, ListingResponse, RemoteBackend, SessionBackend,
    TransferBackend,
};

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Mutex<Option<Zeroizing<String>>>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn lock_token(&self) -> MutexGuard<'_, Option<Zeroizing<String>>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.lock_token().as_ref() {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(map_transport)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn map_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// 401 is a lapsed login; any other failure carries the service's
/// `detail` message when there is one.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        message: error_detail(&body),
    })
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// The service resolves paths against the user's home; the root is sent as
/// an empty path.
fn wire_path(path: &RemotePath) -> &str {
    if path.is_root() {
        ""
    } else {
        path.as_str()
    }
}

// -- Wire types ----------------------------------------------------------

#[derive(Deserialize)]
struct WireLogin {
    access_token: String,
}

#[derive(Deserialize)]
struct WireCheck {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct WireListing {
    items: Vec<WireItem>,
    current_path: String,
}

#[derive(Deserialize)]
struct WireItem {
    name: String,
    is_dir: bool,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    group: String,
    #[serde(default)]
    date_modified: f64,
    #[serde(default)]
    permissions: String,
}

impl WireItem {
    fn into_entry(self) -> DirectoryEntry {
        let permissions = PermissionTriad::parse(&self.permissions).unwrap_or_else(|| {
            debug!(name = %self.name, raw = %self.permissions, "Unparseable permissions");
            PermissionTriad::from_mode(0)
        });
        DirectoryEntry {
            name: self.name,
            is_directory: self.is_dir,
            size: self.size,
            owner: self.owner,
            group: self.group,
            permissions,
            modified_at: self.date_modified.trunc() as i64,
            selected: false,
        }
    }
}

#[derive(Deserialize)]
struct WireSpace {
    used_space: u64,
    total_space: u64,
    available_space: u64,
}

#[derive(Deserialize)]
struct WireRemoteFiles {
    files: Vec<WireRemoteFile>,
}

#[derive(Deserialize)]
struct WireRemoteFile {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    modified_time: Option<String>,
}

#[derive(Serialize)]
struct WireRemoteRequest<'a> {
    protocol: &'static str,
    host: &'a str,
    port: u16,
    username: &'a str,
    password: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_user_id: Option<&'a str>,
}

impl<'a> WireRemoteRequest<'a> {
    fn new(connection: &'a RemoteConnection, path: &'a RemotePath) -> Self {
        Self {
            protocol: match connection.protocol {
                crate::remote::RemoteProtocol::Ftp => "FTP",
                crate::remote::RemoteProtocol::Sftp => "SFTP",
            },
            host: &connection.host,
            port: connection.port,
            username: &connection.username,
            password: &connection.password,
            path: path.as_str(),
            local_path: None,
            local_user_id: None,
        }
    }
}

#[derive(Deserialize)]
struct WireSessions {
    sessions: Vec<WireSession>,
}

#[derive(Deserialize)]
struct WireSession {
    #[serde(deserialize_with = "string_or_number")]
    session_id: String,
    #[serde(rename = "type")]
    kind: String,
    status: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
}

impl WireSession {
    fn into_session(self) -> Result<UploadSession, BackendError> {
        let kind = SessionKind::parse(&self.kind)
            .ok_or_else(|| BackendError::Decode(format!("unknown session type {:?}", self.kind)))?;
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            BackendError::Decode(format!("unknown session status {:?}", self.status))
        })?;
        Ok(UploadSession {
            id: self.session_id,
            kind,
            status,
            progress_percent: self.progress.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8,
            detail_text: self.details.unwrap_or_default(),
            started_at: self.started_at.unwrap_or_default(),
            completed_at: self.completed_at.filter(|c| !c.is_empty()),
            expanded: false,
        })
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

// -- Trait impls ---------------------------------------------------------

#[async_trait::async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<(), BackendError> {
        let login: WireLogin = self
            .send_json(self.client.post(self.url("login")).json(credentials))
            .await?;
        *self.lock_token() = Some(Zeroizing::new(login.access_token));
        info!(username = %credentials.username, "Login accepted");
        Ok(())
    }

    async fn logout(&self) -> Result<(), BackendError> {
        let result = self.send(self.client.post(self.url("logout"))).await;
        *self.lock_token() = None;
        result.map(|_| ())
    }

    async fn check_auth(&self) -> Result<AuthStatus, BackendError> {
        let check: WireCheck = self.send_json(self.client.get(self.url("check_token"))).await?;
        Ok(AuthStatus {
            authenticated: check.username.is_some(),
            username: check.username,
        })
    }
}

#[async_trait::async_trait]
impl ListingBackend for HttpBackend {
    async fn fetch_listing(&self, path: &RemotePath) -> Result<ListingResponse, BackendError> {
        let listing: WireListing = self
            .send_json(
                self.client
                    .get(self.url("list_files"))
                    .query(&[("path", wire_path(path))]),
            )
            .await?;
        Ok(ListingResponse {
            entries: listing.items.into_iter().map(WireItem::into_entry).collect(),
            current_path: listing.current_path,
        })
    }

    async fn fetch_space_usage(&self) -> Result<SpaceUsage, BackendError> {
        let space: WireSpace = self.send_json(self.client.get(self.url("space_info"))).await?;
        Ok(SpaceUsage {
            used: space.used_space,
            total: space.total_space,
            available: space.available_space,
        })
    }
}

#[async_trait::async_trait]
impl TransferBackend for HttpBackend {
    async fn upload_file(
        &self,
        dir: &RemotePath,
        name: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let form = Form::new()
            .part("file", Part::bytes(data.to_vec()).file_name(name.to_string()))
            .text("current_path", dir.to_string());
        self.send(self.client.post(self.url("direct_upload")).multipart(form))
            .await?;
        debug!(%dir, name, bytes = data.len(), "Uploaded file");
        Ok(())
    }

    async fn submit_link_batch(
        &self,
        links: &[String],
        dir: &RemotePath,
    ) -> Result<(), BackendError> {
        let body = serde_json::json!({ "links": links, "path": dir.as_str() });
        self.send(self.client.post(self.url("links_upload")).json(&body))
            .await?;
        Ok(())
    }

    async fn download_file(&self, path: &RemotePath) -> Result<Vec<u8>, BackendError> {
        let form = Form::new().text("path", path.to_string());
        let response = self
            .send(self.client.post(self.url("direct_download")).multipart(form))
            .await?;
        let bytes = response.bytes().await.map_err(map_transport)?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, path: &RemotePath) -> Result<(), BackendError> {
        let form = Form::new().text("path", path.to_string());
        self.send(self.client.delete(self.url("delete_file")).multipart(form))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteBackend for HttpBackend {
    async fn list_remote(
        &self,
        request: &RemoteListRequest,
    ) -> Result<Vec<RemoteEntry>, BackendError> {
        let endpoint = format!("{}/list-files", request.connection.protocol);
        let body = WireRemoteRequest::new(&request.connection, &request.path);
        let files: WireRemoteFiles = self
            .send_json(self.client.post(self.url(&endpoint)).json(&body))
            .await?;
        Ok(files
            .files
            .into_iter()
            .map(|f| RemoteEntry {
                is_directory: f.kind.eq_ignore_ascii_case("directory"),
                name: f.name,
                size: f.size,
                modified_time: f.modified_time,
                selected: false,
            })
            .collect())
    }

    async fn download_remote(&self, request: &RemoteDownloadRequest) -> Result<(), BackendError> {
        let endpoint = format!("{}/download", request.connection.protocol);
        let body = WireRemoteRequest {
            local_path: Some(request.local_path.as_str()),
            local_user_id: Some(&request.local_user),
            ..WireRemoteRequest::new(&request.connection, &request.path)
        };
        self.send(self.client.post(self.url(&endpoint)).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionBackend for HttpBackend {
    async fn list_sessions(&self, username: &str) -> Result<Vec<UploadSession>, BackendError> {
        let sessions: WireSessions = self
            .send_json(self.client.get(self.url(&format!("sessions/{username}"))))
            .await?;
        sessions
            .sessions
            .into_iter()
            .map(WireSession::into_session)
            .collect()
    }

    async fn cancel_session(&self, id: &str) -> Result<(), BackendError> {
        self.send(self.client.post(self.url(&format!("sessions/{id}/cancel"))))
            .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), BackendError> {
        self.send(self.client.delete(self.url(&format!("sessions/{id}"))))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_item_maps_to_entry() {
        let listing: WireListing = serde_json::from_value(serde_json::json!({
            "items": [{
                "name": "notes.txt",
                "is_file": true,
                "is_dir": false,
                "size": 1536,
                "owner": "alice",
                "group": "staff",
                "date_created": 1700000000.5,
                "date_modified": 1700000123.9,
                "permissions": "644"
            }],
            "current_path": "/home/alice/"
        }))
        .unwrap();
        let entry = listing.items.into_iter().next().unwrap().into_entry();
        assert_eq!(entry.name, "notes.txt");
        assert!(!entry.is_directory);
        assert_eq!(entry.modified_at, 1_700_000_123);
        assert_eq!(entry.permission_string(), "-rw-r--r--");
        assert!(!entry.selected);
    }

    #[test]
    fn session_wire_format() {
        let wire: WireSessions = serde_json::from_value(serde_json::json!({
            "sessions": [
                {
                    "session_id": 17,
                    "type": "SFTP Upload",
                    "status": "Processing",
                    "details": "copying",
                    "progress": 42.6,
                    "started_at": "2024-05-20 17:05:24",
                    "completed_at": null
                },
                {
                    "session_id": "abc",
                    "type": "Link Upload",
                    "status": "completed",
                    "progress": 100,
                    "started_at": "2024-05-20 17:00:00",
                    "completed_at": "2024-05-20 17:01:00"
                }
            ]
        }))
        .unwrap();
        let sessions: Vec<UploadSession> = wire
            .sessions
            .into_iter()
            .map(|s| s.into_session().unwrap())
            .collect();
        assert_eq!(sessions[0].id, "17");
        assert_eq!(sessions[0].kind, SessionKind::FtpTransfer);
        assert_eq!(sessions[0].status, SessionStatus::InProgress);
        assert_eq!(sessions[0].progress_percent, 43);
        assert!(sessions[0].completed_at.is_none());
        assert_eq!(sessions[1].status, SessionStatus::Completed);
        assert_eq!(sessions[1].detail_text, "");
    }

    #[test]
    fn unknown_session_status_is_a_decode_error() {
        let wire: WireSession = serde_json::from_value(serde_json::json!({
            "session_id": "x",
            "type": "Link Upload",
            "status": "teleporting"
        }))
        .unwrap();
        assert!(matches!(wire.into_session(), Err(BackendError::Decode(_))));
    }

    #[test]
    fn remote_request_body() {
        let connection = crate::remote::RemoteConnection::new(
            crate::remote::RemoteProtocol::Ftp,
            "ftp.example",
            "bob",
            "pw",
        );
        let path = RemotePath::normalize("/pub").unwrap();
        let local = RemotePath::normalize("/home/alice").unwrap();
        let body = serde_json::to_value(WireRemoteRequest {
            local_path: Some(local.as_str()),
            local_user_id: Some("alice"),
            ..WireRemoteRequest::new(&connection, &path)
        })
        .unwrap();
        assert_eq!(body["protocol"], "FTP");
        assert_eq!(body["port"], 21);
        assert_eq!(body["path"], "/pub");
        assert_eq!(body["local_user_id"], "alice");

        let list = serde_json::to_value(WireRemoteRequest::new(&connection, &path)).unwrap();
        assert!(list.get("local_path").is_none());
    }

    #[test]
    fn error_detail_prefers_json_detail() {
        assert_eq!(error_detail(r#"{"detail":"Directory not found"}"#), "Directory not found");
        assert_eq!(error_detail("  plain text "), "plain text");
    }

    #[test]
    fn root_is_sent_as_home() {
        assert_eq!(wire_path(&RemotePath::root()), "");
        assert_eq!(wire_path(&RemotePath::normalize("/a").unwrap()), "/a");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let config = ClientConfig {
            base_url: "http://localhost:8009/".into(),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.url("/login"), "http://localhost:8009/login");
        assert_eq!(backend.url("sessions/alice"), "http://localhost:8009/sessions/alice");
    }
}
