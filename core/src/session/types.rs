use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of background operation a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SessionKind {
    DirectUpload,
    LinksUpload,
    FtpTransfer,
}

impl SessionKind {
    /// Parse the backend's label, ignoring case and separators.
    ///
    /// `"Link Upload"`, `"links_upload"`, `"FTP Upload"` and `"SFTP Upload"`
    /// are all understood; both FTP flavours are transfers.
    pub fn parse(raw: &str) -> Option<Self> {
        match squash(raw).as_str() {
            "directupload" | "upload" | "direct" => Some(SessionKind::DirectUpload),
            "linkupload" | "linksupload" | "link" | "links" => Some(SessionKind::LinksUpload),
            "ftpupload" | "sftpupload" | "ftptransfer" | "sftptransfer" | "ftp" | "sftp" => {
                Some(SessionKind::FtpTransfer)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::DirectUpload => "DirectUpload",
            SessionKind::LinksUpload => "LinksUpload",
            SessionKind::FtpTransfer => "FtpTransfer",
        }
    }
}

/// Lifecycle state of a session, normalized from any backend casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Parse `"Queued"`, `"processing"`, `"IN_PROGRESS"`, `"completed"`, ...
    pub fn parse(raw: &str) -> Option<Self> {
        match squash(raw).as_str() {
            "pending" | "queued" => Some(SessionStatus::Pending),
            "inprogress" | "processing" | "running" => Some(SessionStatus::InProgress),
            "completed" | "complete" | "done" => Some(SessionStatus::Completed),
            "failed" | "error" | "cancelled" | "canceled" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    /// Completed or failed; nothing left to cancel.
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "Pending",
            SessionStatus::InProgress => "InProgress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        }
    }
}

fn squash(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

macro_rules! string_enum_serde {
    ($ty:ident, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $ty {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $ty::parse(&value).ok_or_else(|| format!("unknown {}: {value:?}", $label))
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

string_enum_serde!(SessionKind, "session type");
string_enum_serde!(SessionStatus, "session status");

/// A backend-tracked upload or transfer.
///
/// Replaced wholesale on every poll; only `expanded` is carried across polls
/// (by `id`) because the backend knows nothing about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub status: SessionStatus,
    /// `0..=100`.
    pub progress_percent: u8,
    pub detail_text: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Whether the detail panel is open.
    #[serde(skip)]
    pub expanded: bool,
}

impl UploadSession {
    pub fn is_cancellable(&self) -> bool {
        !self.status.is_finished()
    }
}
