use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;
use crate::files::RemotePath;

/// Client settings.
///
/// Every field has a default, so a partial (or empty) JSON object is valid.
/// - `base_url`: root of the storage service REST API.
/// - `poll_interval_secs`: session refresh interval while the view is open.
/// - `request_timeout_secs`: per-request timeout at the backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub initial_path: RemotePath,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub show_finished_sessions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            initial_path: RemotePath::root(),
            show_hidden: false,
            show_finished_sessions: false,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| CoreError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(CoreError::Config("baseUrl must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "baseUrl must start with http:// or https://, got {url:?}"
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::Config(
                "pollIntervalSecs must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "requestTimeoutSecs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `base_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }
}

fn default_base_url() -> String {
    "http://localhost:8009".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}
