//! Non-modal notifications for the UI layer.
//!
//! Background work (session polling, space-usage refresh) has no caller to
//! return an error to, so it reports through this channel instead.

use tracing::debug;

/// Something the UI should surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Informational toast, e.g. "links are processing".
    Info(String),
    /// Non-blocking failure; prior state was kept.
    Error(String),
    /// The login lapsed; the UI must return to the login flow.
    SessionExpired,
}

/// Sender half handed to components that report notices.
pub type NoticeSender = tokio::sync::mpsc::UnboundedSender<Notice>;

/// Receiver half owned by the UI layer.
pub type NoticeReceiver = tokio::sync::mpsc::UnboundedReceiver<Notice>;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Send a notice, ignoring a closed channel (the UI went away).
pub(crate) fn emit(tx: &NoticeSender, notice: Notice) {
    if tx.send(notice).is_err() {
        debug!("Notice channel closed, dropping notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_delivers_and_tolerates_closed_channel() {
        let (tx, mut rx) = notice_channel();
        emit(&tx, Notice::Info("hello".into()));
        assert_eq!(rx.try_recv().unwrap(), Notice::Info("hello".into()));

        drop(rx);
        emit(&tx, Notice::SessionExpired);
    }
}
