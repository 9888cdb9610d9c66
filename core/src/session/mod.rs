//! Upload/transfer sessions tracked by the backend and observed by polling.

pub mod poller;
pub mod types;

pub use poller::{SessionPoller, DEFAULT_POLL_INTERVAL};
pub use types::{SessionKind, SessionStatus, UploadSession};
