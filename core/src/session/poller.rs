//! Periodic refresh of the user's upload/transfer sessions.
//!
//! The poller is an explicit two-state machine. It is **Polling** while the
//! sessions view is visible *and* a user is logged in, and **Idle**
//! otherwise. While Polling, one background task owns the loop:
//!
//! 1. fetch all sessions and replace the collection wholesale,
//! 2. wait for the interval, an out-of-band refresh request, or
//!    cancellation,
//! 3. repeat.
//!
//! Because the loop awaits each fetch before waiting again, at most one
//! request is in flight. Every activation gets a new epoch; a response is
//! applied only if its epoch is still current, so a request that was in
//! flight when the view closed is dropped on arrival.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::SessionBackend;
use crate::errors::{BackendError, SessionsError};
use crate::events::{emit, Notice, NoticeSender};

use super::types::UploadSession;

/// Refresh interval while the sessions view is open.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to the running poll loop.
struct PollTask {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    join_handle: JoinHandle<()>,
}

struct PollerState {
    visible: bool,
    user: Option<String>,
    /// Bumped on every start and stop; responses carry the epoch they were
    /// issued under.
    epoch: u64,
    sessions: Arc<Vec<UploadSession>>,
    task: Option<PollTask>,
    /// Loop of the previous activation, possibly still finishing a request.
    retiring: Option<JoinHandle<()>>,
}

struct Shared {
    backend: Arc<dyn SessionBackend>,
    interval: Duration,
    notices: NoticeSender,
    state: Mutex<PollerState>,
}

#[derive(Debug, Clone, Copy)]
enum SessionAction {
    Cancel,
    Delete,
}

/// Owner of the session collection.
///
/// State-changing methods spawn onto the current tokio runtime and must be
/// called from within one.
pub struct SessionPoller {
    shared: Arc<Shared>,
}

impl SessionPoller {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        interval: Duration,
        notices: NoticeSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                interval,
                notices,
                state: Mutex::new(PollerState {
                    visible: false,
                    user: None,
                    epoch: 0,
                    sessions: Arc::new(Vec::new()),
                    task: None,
                    retiring: None,
                }),
            }),
        }
    }

    /// The sessions view was shown or hidden.
    pub fn set_visible(&self, visible: bool) {
        let mut state = self.shared.lock();
        state.visible = visible;
        self.shared.reconcile(&mut state);
    }

    /// The logged-in user changed; `None` means logged out.
    ///
    /// Switching to a different user drops the previous user's sessions.
    pub fn set_user(&self, user: Option<String>) {
        let mut state = self.shared.lock();
        if state.user != user {
            state.sessions = Arc::new(Vec::new());
            Shared::stop(&mut state);
        }
        state.user = user;
        self.shared.reconcile(&mut state);
    }

    /// Stop polling and forget the user and their sessions.
    pub fn teardown(&self) {
        self.set_user(None);
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().task.is_some()
    }

    /// Latest collection, in backend order.
    pub fn sessions(&self) -> Arc<Vec<UploadSession>> {
        self.shared.lock().sessions.clone()
    }

    /// Sessions to display; completed ones only when `show_finished`.
    pub fn visible_sessions(&self, show_finished: bool) -> Vec<UploadSession> {
        self.shared
            .lock()
            .sessions
            .iter()
            .filter(|s| show_finished || s.status != super::SessionStatus::Completed)
            .cloned()
            .collect()
    }

    /// Open or close the detail panel of a session. Unknown ids are ignored.
    pub fn toggle_expanded(&self, id: &str) -> bool {
        let mut state = self.shared.lock();
        let Some(index) = state.sessions.iter().position(|s| s.id == id) else {
            return false;
        };
        let mut sessions = state.sessions.as_ref().clone();
        sessions[index].expanded = !sessions[index].expanded;
        state.sessions = Arc::new(sessions);
        true
    }

    /// Poll again without waiting for the next tick.
    ///
    /// If a poll is in flight the refresh runs right after it resolves.
    /// Returns `false` while Idle, when nothing is requested.
    pub fn refresh_now(&self) -> bool {
        let state = self.shared.lock();
        match &state.task {
            Some(task) => {
                task.wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Ask the backend to cancel a session, then refresh.
    pub async fn cancel(&self, id: &str) -> Result<(), SessionsError> {
        self.act(id, SessionAction::Cancel).await
    }

    /// Ask the backend to delete a session, then refresh.
    pub async fn delete(&self, id: &str) -> Result<(), SessionsError> {
        self.act(id, SessionAction::Delete).await
    }

    /// Local state is never changed speculatively; the follow-up refresh is
    /// the only source of truth.
    async fn act(&self, id: &str, action: SessionAction) -> Result<(), SessionsError> {
        if !self.is_polling() {
            return Err(SessionsError::Inactive);
        }

        let result = match action {
            SessionAction::Cancel => self.shared.backend.cancel_session(id).await,
            SessionAction::Delete => self.shared.backend.delete_session(id).await,
        };

        match result {
            Ok(()) => {
                info!(id, ?action, "Session action accepted");
                self.refresh_now();
                Ok(())
            }
            Err(BackendError::Unauthorized) => Err(SessionsError::SessionExpired),
            Err(e) => {
                warn!(id, ?action, "Session action failed: {e}");
                self.refresh_now();
                Err(SessionsError::ActionFailed {
                    id: id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl Drop for SessionPoller {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        Shared::stop(&mut state);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reconcile(self: &Arc<Self>, state: &mut PollerState) {
        let should_poll = state.visible && state.user.is_some();
        match (should_poll, state.task.is_some()) {
            (true, false) => self.start(state),
            (false, true) => Self::stop(state),
            _ => {}
        }
    }

    fn start(self: &Arc<Self>, state: &mut PollerState) {
        state.epoch += 1;
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let join_handle = tokio::spawn(poll_loop(
            self.clone(),
            state.epoch,
            cancel.clone(),
            wake.clone(),
            state.retiring.take(),
        ));
        state.task = Some(PollTask {
            cancel,
            wake,
            join_handle,
        });
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Session polling started"
        );
    }

    fn stop(state: &mut PollerState) {
        if let Some(task) = state.task.take() {
            task.cancel.cancel();
            state.epoch += 1;
            state.retiring = Some(task.join_handle);
            info!("Session polling stopped");
        }
    }

    async fn poll_once(&self, epoch: u64) {
        let username = {
            let state = self.lock();
            match &state.user {
                Some(user) if state.epoch == epoch => user.clone(),
                _ => return,
            }
        };

        let result = self.backend.list_sessions(&username).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(epoch, current = state.epoch, "Discarding stale session poll");
            return;
        }

        match result {
            Ok(fresh) => {
                debug!(count = fresh.len(), "Sessions refreshed");
                state.sessions = Arc::new(merge_expanded(&state.sessions, fresh));
            }
            Err(BackendError::Unauthorized) => {
                warn!("Session poll rejected, login expired");
                state.user = None;
                state.sessions = Arc::new(Vec::new());
                Self::stop(&mut state);
                emit(&self.notices, Notice::SessionExpired);
            }
            Err(e) => {
                warn!("Session poll failed: {e}");
                emit(&self.notices, Notice::Error(SessionsError::from(e).to_string()));
            }
        }
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    epoch: u64,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    retiring: Option<JoinHandle<()>>,
) {
    if let Some(previous) = retiring {
        // Keep at most one request in flight across activations.
        let _ = previous.await;
    }

    while !cancel.is_cancelled() {
        shared.poll_once(epoch).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.interval) => {}
            _ = wake.notified() => debug!("Out-of-band session refresh"),
        }
    }
    debug!(epoch, "Session poll loop exited");
}

/// Carry `expanded` from `previous` onto `fresh` by id.
fn merge_expanded(previous: &[UploadSession], fresh: Vec<UploadSession>) -> Vec<UploadSession> {
    let expanded: HashSet<&str> = previous
        .iter()
        .filter(|s| s.expanded)
        .map(|s| s.id.as_str())
        .collect();

    fresh
        .into_iter()
        .map(|mut session| {
            session.expanded = expanded.contains(session.id.as_str());
            session
        })
        .collect()
}
