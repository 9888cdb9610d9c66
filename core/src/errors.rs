//! Error taxonomy for the flexport client core.
//!
//! Every collaborator call fails with a [`BackendError`]. The component that
//! issued the call turns it into its own error (listing, sessions, auth,
//! transfer) so the UI layer can tell a lapsed login apart from a transient
//! failure without inspecting transport details.

use thiserror::Error;

/// Top-level error type encompassing all core error categories.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A malformed path was constructed locally.
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Loading a directory listing failed.
    #[error("Listing error: {0}")]
    Listing(#[from] ListingError),

    /// Reading or mutating upload sessions failed.
    #[error("Sessions error: {0}")]
    Sessions(#[from] SessionsError),

    /// Logging in, out, or restoring a login failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// An upload, download or delete batch failed in whole or in part.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// A configuration error (invalid values, parse failures).
    #[error("Config error: {0}")]
    Config(String),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the failure means the login lapsed and the user must
    /// re-authenticate instead of retrying.
    pub fn is_session_expired(&self) -> bool {
        match self {
            CoreError::Listing(e) => matches!(e, ListingError::SessionExpired),
            CoreError::Sessions(e) => matches!(e, SessionsError::SessionExpired),
            CoreError::Auth(AuthError::Backend(BackendError::Unauthorized)) => true,
            CoreError::Transfer(e) => matches!(e, TransferError::SessionExpired),
            _ => false,
        }
    }
}

/// A path string that cannot be turned into a canonical remote path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path contains a NUL byte.
    #[error("Invalid path: contains a NUL byte")]
    NulByte,

    /// A child segment was empty after trimming.
    #[error("Invalid path: empty segment")]
    Empty,
}

/// Failure to descend into a child entry by name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Listing(#[from] ListingError),
}

impl From<OpenError> for CoreError {
    fn from(err: OpenError) -> Self {
        match err {
            OpenError::Path(e) => CoreError::Path(e),
            OpenError::Listing(e) => CoreError::Listing(e),
        }
    }
}

/// Failure reported by a collaborator call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend rejected the session (HTTP 401 or equivalent).
    #[error("Unauthorized")]
    Unauthorized,

    /// The backend answered with a non-success status.
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,
}

/// Errors from loading a directory listing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// The login lapsed; previous entries are kept visible.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Transient network or server failure.
    #[error("Failed to fetch listing: {0}")]
    FetchFailed(String),
}

impl From<BackendError> for ListingError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => ListingError::SessionExpired,
            other => ListingError::FetchFailed(other.to_string()),
        }
    }
}

/// Errors from polling or acting on upload/transfer sessions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionsError {
    /// The login lapsed while talking to the sessions endpoint.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Transient failure while fetching the session collection.
    #[error("Failed to fetch sessions: {0}")]
    FetchFailed(String),

    /// A cancel or delete request was rejected.
    #[error("Action on session {id} failed: {message}")]
    ActionFailed { id: String, message: String },

    /// The sessions view is not active, so no request was issued.
    #[error("Sessions view is not active")]
    Inactive,
}

impl From<BackendError> for SessionsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => SessionsError::SessionExpired,
            other => SessionsError::FetchFailed(other.to_string()),
        }
    }
}

/// Errors from the login lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The backend refused the username/password pair.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An operation requiring a login was attempted without one.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The auth endpoint failed for another reason.
    #[error("Auth request failed: {0}")]
    Backend(BackendError),
}

/// Errors from multi-item upload, download and delete workflows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The batch was empty after filtering.
    #[error("Nothing to transfer: {0}")]
    NothingToDo(String),

    /// Some items succeeded and some failed.
    #[error("{succeeded} succeeded, {failed} failed")]
    PartialBatchFailure {
        succeeded: usize,
        failed: usize,
        /// `(item, reason)` for every failed item.
        failures: Vec<(String, String)>,
    },

    /// A single-request workflow (e.g. a link batch) was rejected.
    #[error("Transfer failed: {0}")]
    Failed(String),

    /// The login lapsed during the batch.
    #[error("Session expired, please log in again")]
    SessionExpired,
}

impl From<BackendError> for TransferError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => TransferError::SessionExpired,
            other => TransferError::Failed(other.to_string()),
        }
    }
}
