//! Facade over navigation, selection, transfers and sessions.
//!
//! The orchestrator keeps [`HistoryStack`] in step with the
//! [`ListingStore`]: a forward navigation pushes the path the backend echoed
//! once the load is applied, while back/forward replay the stored entry
//! without pushing. Superseded loads touch neither.
//!
//! Every operation funnels its failure through one check: a lapsed login
//! tears down the auth context, stops session polling and emits
//! [`Notice::SessionExpired`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::auth::{AuthContext, Credentials};
use crate::backends::{AuthStatus, ListingBackend, RemoteBackend, SessionBackend, StorageBackend};
use crate::config::ClientConfig;
use crate::errors::{BackendError, CoreError, ListingError};
use crate::events::{emit, notice_channel, Notice, NoticeReceiver, NoticeSender};
use crate::files::{
    DirectoryEntry, FolderPicker, HistoryStack, HistoryState, ListingStore, LoadOutcome,
    NavigationState, RemotePath, SpaceUsage,
};
use crate::remote::{RemoteBrowser, RemoteConnection};
use crate::session::{SessionPoller, UploadSession};
use crate::transfer::{self, BatchReport, DownloadedFile, LocalFile, UploadProgress};

type SharedAuth = Arc<tokio::sync::Mutex<AuthContext>>;

pub struct SessionOrchestrator<B: StorageBackend + 'static> {
    backend: Arc<B>,
    config: ClientConfig,
    auth: SharedAuth,
    listing: ListingStore,
    history: Mutex<HistoryStack>,
    poller: SessionPoller,
    space: Mutex<Option<SpaceUsage>>,
    show_hidden: AtomicBool,
    show_finished_sessions: AtomicBool,
    notices: NoticeSender,
}

impl<B: StorageBackend + 'static> SessionOrchestrator<B> {
    /// Build the orchestrator and the notice stream for the UI.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<B>, config: ClientConfig) -> (Self, NoticeReceiver) {
        let (notices, receiver) = notice_channel();
        let (poller_tx, poller_rx) = notice_channel();
        let auth: SharedAuth = Arc::new(tokio::sync::Mutex::new(AuthContext::new()));

        let listing_backend: Arc<dyn ListingBackend> = backend.clone();
        let session_backend: Arc<dyn SessionBackend> = backend.clone();
        let initial = config.initial_path.clone();

        tokio::spawn(forward_poller_notices(
            poller_rx,
            auth.clone(),
            notices.clone(),
        ));

        let orchestrator = Self {
            listing: ListingStore::new(listing_backend, initial.clone()),
            history: Mutex::new(HistoryStack::new(initial)),
            poller: SessionPoller::new(session_backend, config.poll_interval(), poller_tx),
            space: Mutex::new(None),
            show_hidden: AtomicBool::new(config.show_hidden),
            show_finished_sessions: AtomicBool::new(config.show_finished_sessions),
            backend,
            config,
            auth,
            notices,
        };
        (orchestrator, receiver)
    }

    // -- Auth --------------------------------------------------------------

    /// Restore an existing backend login. Returns whether one was found.
    pub async fn init(&self) -> Result<bool, CoreError> {
        let restored = {
            let mut auth = self.auth.lock().await;
            let restored = auth.init(&*self.backend).await?;
            restored.then(|| auth.username().map(str::to_string)).flatten()
        };
        match restored {
            Some(username) => {
                info!(%username, "Restored existing login");
                self.poller.set_user(Some(username));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn login(&self, credentials: Credentials) -> Result<(), CoreError> {
        let username = credentials.username.clone();
        self.auth
            .lock()
            .await
            .login(&*self.backend, credentials)
            .await?;
        info!(%username, "Logged in");
        self.poller.set_user(Some(username));
        Ok(())
    }

    /// Log out and reset all per-user state, even if the backend call fails.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.poller.teardown();
        let result = self.auth.lock().await.logout(&*self.backend).await;
        self.reset_navigation();
        info!("Logged out");
        result.map_err(CoreError::from)
    }

    pub async fn auth(&self) -> AuthStatus {
        let auth = self.auth.lock().await;
        AuthStatus {
            authenticated: auth.is_authenticated(),
            username: auth.username().map(str::to_string),
        }
    }

    // -- Navigation --------------------------------------------------------

    /// Forward-navigate to `path`.
    ///
    /// History gets the echoed canonical path. Landing on the entry already
    /// under the cursor (e.g. navigating to the current directory) drops the
    /// forward entries like a push would, but does not add a duplicate.
    pub async fn navigate_to(&self, path: &RemotePath) -> Result<LoadOutcome, CoreError> {
        let outcome = self.check(self.listing.load(path).await).await?;
        if let LoadOutcome::Applied(echoed) = &outcome {
            {
                let mut history = self.lock_history();
                if history.current() == echoed {
                    history.truncate_forward();
                } else {
                    history.push(echoed.clone());
                }
            }
            self.after_load().await;
        }
        Ok(outcome)
    }

    /// Descend into the named directory. Files and unknown names are
    /// ignored (`Ok(None)`).
    pub async fn open_entry(&self, name: &str) -> Result<Option<LoadOutcome>, CoreError> {
        match self.listing.entry(name) {
            Some(entry) if entry.is_directory => {
                let target = self.listing.current_path().join(name)?;
                Ok(Some(self.navigate_to(&target).await?))
            }
            _ => Ok(None),
        }
    }

    pub async fn go_up(&self) -> Result<LoadOutcome, CoreError> {
        let parent = self.listing.current_path().parent();
        self.navigate_to(&parent).await
    }

    /// Replay the previous history entry. `Ok(None)` at the oldest one.
    pub async fn go_back(&self) -> Result<Option<LoadOutcome>, CoreError> {
        let target = self.lock_history().back();
        match target {
            Some(target) => self.replay(target, HistoryStack::forward).await.map(Some),
            None => Ok(None),
        }
    }

    /// Replay the next history entry. `Ok(None)` at the newest one.
    pub async fn go_forward(&self) -> Result<Option<LoadOutcome>, CoreError> {
        let target = self.lock_history().forward();
        match target {
            Some(target) => self.replay(target, HistoryStack::back).await.map(Some),
            None => Ok(None),
        }
    }

    /// Navigate to breadcrumb `index` of the current path; `None` is the
    /// root. An index past the last segment does nothing.
    pub async fn go_to_breadcrumb(
        &self,
        index: Option<usize>,
    ) -> Result<Option<LoadOutcome>, CoreError> {
        let target = match index {
            None => RemotePath::root(),
            Some(i) => match self.listing.current_path().breadcrumb(i) {
                Some(target) => target,
                None => return Ok(None),
            },
        };
        self.navigate_to(&target).await.map(Some)
    }

    /// Re-list the current path without touching history order.
    pub async fn refresh(&self) -> Result<LoadOutcome, CoreError> {
        let current = self.listing.current_path();
        let outcome = self.check(self.listing.load(&current).await).await?;
        if let LoadOutcome::Applied(echoed) = &outcome {
            let mut history = self.lock_history();
            if history.current() != echoed {
                history.replace_current(echoed.clone());
            }
        }
        Ok(outcome)
    }

    /// Load a history entry the cursor already moved to. On failure the
    /// cursor is moved back with `revert`.
    async fn replay(
        &self,
        target: RemotePath,
        revert: fn(&mut HistoryStack) -> Option<RemotePath>,
    ) -> Result<LoadOutcome, CoreError> {
        match self.listing.load(&target).await {
            Ok(outcome) => {
                if let LoadOutcome::Applied(echoed) = &outcome {
                    if *echoed != target {
                        debug!(%target, %echoed, "Correcting replayed history entry");
                        self.lock_history().replace_current(echoed.clone());
                    }
                    self.after_load().await;
                }
                Ok(outcome)
            }
            Err(e) => {
                revert(&mut self.lock_history());
                self.check::<LoadOutcome, _>(Err(e)).await
            }
        }
    }

    pub fn navigation(&self) -> NavigationState {
        self.listing.snapshot()
    }

    pub fn history(&self) -> HistoryState {
        self.lock_history().state()
    }

    // -- Selection ---------------------------------------------------------

    pub fn toggle_selection(&self, name: &str) -> bool {
        self.listing.toggle_selection(name)
    }

    pub fn clear_selection(&self) {
        self.listing.clear_selection();
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.show_hidden.store(show, Ordering::Relaxed);
    }

    pub fn visible_entries(&self) -> Vec<DirectoryEntry> {
        self.listing
            .visible_entries(self.show_hidden.load(Ordering::Relaxed))
    }

    // -- Transfers ---------------------------------------------------------

    /// Download every selected file.
    pub async fn download_selected(
        &self,
    ) -> Result<(BatchReport, Vec<DownloadedFile>), CoreError> {
        let paths = self.selected_paths()?;
        self.check(transfer::download_batch(&*self.backend, &paths).await)
            .await
    }

    /// Delete every selected file, then re-list.
    pub async fn delete_selected(&self) -> Result<BatchReport, CoreError> {
        let paths = self.selected_paths()?;
        let report = self
            .check(transfer::delete_batch(&*self.backend, &paths).await)
            .await?;
        self.refresh_quietly().await;
        Ok(report)
    }

    /// Upload into the current directory.
    pub async fn upload_files<F>(
        &self,
        files: Vec<LocalFile>,
        on_progress: F,
    ) -> Result<BatchReport, CoreError>
    where
        F: FnMut(UploadProgress) + Send,
    {
        let dir = self.listing.current_path();
        self.upload_files_to(&dir, files, on_progress).await
    }

    /// Upload into `dir`, e.g. a folder chosen with [`FolderPicker`].
    pub async fn upload_files_to<F>(
        &self,
        dir: &RemotePath,
        files: Vec<LocalFile>,
        on_progress: F,
    ) -> Result<BatchReport, CoreError>
    where
        F: FnMut(UploadProgress) + Send,
    {
        let report = self
            .check(transfer::upload_files(&*self.backend, dir, files, on_progress).await)
            .await?;
        self.refresh_quietly().await;
        Ok(report)
    }

    /// Hand links to the backend for fetching into the current directory.
    pub async fn submit_links<S: AsRef<str> + Sync>(&self, links: &[S]) -> Result<usize, CoreError> {
        let dir = self.listing.current_path();
        let count = self
            .check(transfer::submit_links(&*self.backend, &dir, links).await)
            .await?;
        self.poller.refresh_now();
        emit(
            &self.notices,
            Notice::Info(format!(
                "{count} link(s) submitted, progress is shown under Sessions"
            )),
        );
        Ok(count)
    }

    /// Browser for a second server reached through the backend.
    pub fn remote_browser(&self, connection: RemoteConnection) -> RemoteBrowser {
        let backend: Arc<dyn RemoteBackend> = self.backend.clone();
        RemoteBrowser::new(backend, connection)
    }

    /// Copy the files selected in `browser` into `local_path` (default: the
    /// current directory) on the user's storage.
    pub async fn download_remote_selected(
        &self,
        browser: &RemoteBrowser,
        local_path: Option<RemotePath>,
    ) -> Result<BatchReport, CoreError> {
        let username = self
            .auth
            .lock()
            .await
            .require_user()
            .map(str::to_string)?;
        let local_path = local_path.unwrap_or_else(|| self.listing.current_path());
        let report = self
            .check(browser.download_selected(&local_path, &username).await)
            .await?;
        self.poller.refresh_now();
        emit(
            &self.notices,
            Notice::Info(format!(
                "{} transfer(s) started, progress is shown under Sessions",
                report.succeeded.len()
            )),
        );
        Ok(report)
    }

    /// Destination picker starting at the current directory.
    pub fn folder_picker(&self) -> FolderPicker {
        let backend: Arc<dyn ListingBackend> = self.backend.clone();
        FolderPicker::new(backend, self.listing.current_path())
    }

    // -- Space usage -------------------------------------------------------

    /// Last fetched usage, if any.
    pub fn space_usage(&self) -> Option<SpaceUsage> {
        *self.lock_space()
    }

    pub async fn refresh_space_usage(&self) -> Result<SpaceUsage, CoreError> {
        let result = self.backend.fetch_space_usage().await;
        let usage = self.check(result.map_err(ListingError::from)).await?;
        self.set_space(Some(usage));
        Ok(usage)
    }

    // -- Sessions ----------------------------------------------------------

    pub fn set_sessions_visible(&self, visible: bool) {
        self.poller.set_visible(visible);
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    pub fn sessions(&self) -> Arc<Vec<UploadSession>> {
        self.poller.sessions()
    }

    pub fn set_show_finished_sessions(&self, show: bool) {
        self.show_finished_sessions.store(show, Ordering::Relaxed);
    }

    pub fn visible_sessions(&self) -> Vec<UploadSession> {
        self.poller
            .visible_sessions(self.show_finished_sessions.load(Ordering::Relaxed))
    }

    pub fn toggle_session_expanded(&self, id: &str) -> bool {
        self.poller.toggle_expanded(id)
    }

    pub async fn cancel_session(&self, id: &str) -> Result<(), CoreError> {
        self.check(self.poller.cancel(id).await).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), CoreError> {
        self.check(self.poller.delete(id).await).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- Internals ---------------------------------------------------------

    fn lock_history(&self) -> MutexGuard<'_, HistoryStack> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_space(&self) -> MutexGuard<'_, Option<SpaceUsage>> {
        self.space.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_space(&self, usage: Option<SpaceUsage>) {
        *self.lock_space() = usage;
    }

    fn reset_navigation(&self) {
        let initial = self.config.initial_path.clone();
        self.listing.reset(initial.clone());
        *self.lock_history() = HistoryStack::new(initial);
        self.set_space(None);
    }

    fn selected_paths(&self) -> Result<Vec<RemotePath>, CoreError> {
        let current = self.listing.current_path();
        let paths = self
            .listing
            .selected_files()
            .iter()
            .map(|entry| current.join(&entry.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Space usage follows every applied load; its failure is only a notice.
    async fn after_load(&self) {
        match self.backend.fetch_space_usage().await {
            Ok(usage) => {
                self.set_space(Some(usage));
            }
            Err(BackendError::Unauthorized) => {
                self.expire().await;
            }
            Err(e) => {
                warn!("Space usage fetch failed: {e}");
                emit(
                    &self.notices,
                    Notice::Error(format!("Failed to fetch space usage: {e}")),
                );
            }
        }
    }

    /// Re-list after a mutation; a failure is reported as a notice.
    async fn refresh_quietly(&self) {
        if let Err(e) = self.refresh().await {
            if !e.is_session_expired() {
                emit(&self.notices, Notice::Error(e.to_string()));
            }
        }
    }

    /// Convert a failure and react to a lapsed login.
    async fn check<T, E: Into<CoreError>>(&self, result: Result<T, E>) -> Result<T, CoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let e = e.into();
                if e.is_session_expired() {
                    self.expire().await;
                }
                Err(e)
            }
        }
    }

    async fn expire(&self) {
        warn!("Login expired");
        self.auth.lock().await.teardown();
        self.poller.teardown();
        emit(&self.notices, Notice::SessionExpired);
    }
}

/// Relay poller notices to the UI; a lapsed login also drops local auth.
async fn forward_poller_notices(
    mut rx: NoticeReceiver,
    auth: SharedAuth,
    out: NoticeSender,
) {
    while let Some(notice) = rx.recv().await {
        if notice == Notice::SessionExpired {
            auth.lock().await.teardown();
        }
        emit(&out, notice);
    }
    debug!("Poller notice stream closed");
}
