//! Current-directory listing with selection that survives re-fetches.
//!
//! Every request gets a sequence number; a response is applied only if no
//! newer request has been issued since, so a slow earlier load can never
//! clobber a faster later one. Entries are replaced on write (a new `Arc`
//! per change) so callers can detect changes by pointer identity.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::backends::ListingBackend;
use crate::errors::ListingError;

use super::path::RemotePath;
use super::DirectoryEntry;

/// Snapshot of what the browser currently shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub current_path: RemotePath,
    /// Backend order, stable for a given fetch.
    pub entries: Arc<Vec<DirectoryEntry>>,
    pub is_loading: bool,
}

/// What happened to the response of a [`ListingStore::load`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response was applied; carries the canonical echoed path.
    Applied(RemotePath),
    /// A newer load was issued before this one resolved; nothing changed.
    Superseded,
}

struct ListingInner {
    nav: NavigationState,
    /// Sequence number of the most recently issued request.
    issued: u64,
}

/// Owner of [`NavigationState`].
pub struct ListingStore {
    backend: Arc<dyn ListingBackend>,
    inner: Mutex<ListingInner>,
}

impl ListingStore {
    pub fn new(backend: Arc<dyn ListingBackend>, initial: RemotePath) -> Self {
        Self {
            backend,
            inner: Mutex::new(ListingInner {
                nav: NavigationState {
                    current_path: initial,
                    entries: Arc::new(Vec::new()),
                    is_loading: false,
                },
                issued: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListingInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch `path` and apply the result unless a newer load was issued.
    ///
    /// On success `currentPath` becomes the backend-echoed path in canonical
    /// form. Selection is carried forward by name only when that path equals
    /// the previous one. On failure the previous entries stay visible.
    pub async fn load(&self, path: &RemotePath) -> Result<LoadOutcome, ListingError> {
        let seq = {
            let mut inner = self.lock();
            inner.issued += 1;
            inner.nav.is_loading = true;
            inner.issued
        };
        debug!(%path, seq, "Loading listing");

        let pending = PendingLoad {
            store: self,
            seq,
            armed: true,
        };
        let result = self.backend.fetch_listing(path).await;
        pending.disarm();

        let mut inner = self.lock();
        if seq != inner.issued {
            debug!(%path, seq, latest = inner.issued, "Discarding superseded listing response");
            return Ok(LoadOutcome::Superseded);
        }
        inner.nav.is_loading = false;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(%path, "Listing fetch failed: {e}");
                return Err(e.into());
            }
        };

        let echoed = match RemotePath::normalize(&response.current_path) {
            Ok(echoed) => echoed,
            Err(e) => {
                debug!(%path, "Backend echoed an unusable path ({e}), keeping the requested one");
                path.clone()
            }
        };

        let entries = if echoed == inner.nav.current_path {
            merge_selection(&inner.nav.entries, response.entries)
        } else {
            clear_flags(response.entries)
        };

        debug!(path = %echoed, count = entries.len(), "Listing applied");
        inner.nav.entries = Arc::new(entries);
        inner.nav.current_path = echoed.clone();
        Ok(LoadOutcome::Applied(echoed))
    }

    /// Flip `selected` on the named file.
    ///
    /// Directories and unknown names are ignored. Returns whether anything
    /// changed.
    pub fn toggle_selection(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner
            .nav
            .entries
            .iter()
            .position(|e| e.name == name && !e.is_directory)
        else {
            return false;
        };

        let mut entries = inner.nav.entries.as_ref().clone();
        entries[index].selected = !entries[index].selected;
        inner.nav.entries = Arc::new(entries);
        true
    }

    /// Unselect everything. A no-op (same `Arc`) when nothing is selected.
    pub fn clear_selection(&self) {
        let mut inner = self.lock();
        if !inner.nav.entries.iter().any(|e| e.selected) {
            return;
        }
        inner.nav.entries = Arc::new(clear_flags(inner.nav.entries.as_ref().clone()));
    }

    /// Entries to display, dropping dot-files unless `show_hidden`.
    ///
    /// Backend order is preserved.
    pub fn visible_entries(&self, show_hidden: bool) -> Vec<DirectoryEntry> {
        self.lock()
            .nav
            .entries
            .iter()
            .filter(|e| show_hidden || !e.is_hidden())
            .cloned()
            .collect()
    }

    pub fn selected_files(&self) -> Vec<DirectoryEntry> {
        self.lock()
            .nav
            .entries
            .iter()
            .filter(|e| e.selected)
            .cloned()
            .collect()
    }

    pub fn entry(&self, name: &str) -> Option<DirectoryEntry> {
        self.lock().nav.entries.iter().find(|e| e.name == name).cloned()
    }

    pub fn entries(&self) -> Arc<Vec<DirectoryEntry>> {
        self.lock().nav.entries.clone()
    }

    pub fn current_path(&self) -> RemotePath {
        self.lock().nav.current_path.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().nav.is_loading
    }

    pub fn snapshot(&self) -> NavigationState {
        self.lock().nav.clone()
    }

    /// Drop all entries and return to `path`; in-flight loads are discarded.
    pub fn reset(&self, path: RemotePath) {
        let mut inner = self.lock();
        inner.issued += 1;
        inner.nav = NavigationState {
            current_path: path,
            entries: Arc::new(Vec::new()),
            is_loading: false,
        };
    }
}

/// Clears `is_loading` if a load is dropped mid-fetch while it is still the
/// newest request.
struct PendingLoad<'a> {
    store: &'a ListingStore,
    seq: u64,
    armed: bool,
}

impl PendingLoad<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.store.lock();
        if inner.issued == self.seq {
            debug!(seq = self.seq, "Listing load cancelled");
            inner.nav.is_loading = false;
        }
    }
}

/// Carry `selected` from `previous` onto `fresh` by name, files only.
fn merge_selection(previous: &[DirectoryEntry], fresh: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
    let selected: HashSet<&str> = previous
        .iter()
        .filter(|e| e.selected)
        .map(|e| e.name.as_str())
        .collect();

    fresh
        .into_iter()
        .map(|mut entry| {
            entry.selected = !entry.is_directory && selected.contains(entry.name.as_str());
            entry
        })
        .collect()
}

fn clear_flags(entries: Vec<DirectoryEntry>) -> Vec<DirectoryEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.selected = false;
            entry
        })
        .collect()
}
