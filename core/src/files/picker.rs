//! Destination-folder picker shown inside the upload dialog.
//!
//! Keeps its own path and history, independent of the main browser, and
//! lists directories only.

use std::sync::Arc;

use tracing::debug;

use crate::backends::ListingBackend;
use crate::errors::{ListingError, OpenError};

use super::history::{HistoryStack, HistoryState};
use super::path::RemotePath;
use super::DirectoryEntry;

pub struct FolderPicker {
    backend: Arc<dyn ListingBackend>,
    history: HistoryStack,
    current: RemotePath,
    folders: Vec<DirectoryEntry>,
    is_loading: bool,
}

impl FolderPicker {
    pub fn new(backend: Arc<dyn ListingBackend>, initial: RemotePath) -> Self {
        Self {
            backend,
            history: HistoryStack::new(initial.clone()),
            current: initial,
            folders: Vec::new(),
            is_loading: false,
        }
    }

    /// Re-list the current folder.
    pub async fn refresh(&mut self) -> Result<(), ListingError> {
        let path = self.current.clone();
        let echoed = self.fetch(&path).await?;
        if echoed != *self.history.current() {
            self.history.replace_current(echoed);
        }
        Ok(())
    }

    /// Forward-navigate to `path` and record it in history.
    ///
    /// Landing on the folder already under the cursor drops the forward
    /// entries without adding a duplicate.
    pub async fn navigate_to(&mut self, path: RemotePath) -> Result<(), ListingError> {
        let echoed = self.fetch(&path).await?;
        if echoed == *self.history.current() {
            self.history.truncate_forward();
        } else {
            self.history.push(echoed);
        }
        Ok(())
    }

    /// Descend into the named sub-folder.
    pub async fn open(&mut self, name: &str) -> Result<(), OpenError> {
        let target = self.current.join(name)?;
        self.navigate_to(target).await?;
        Ok(())
    }

    /// Go to the parent folder. A no-op at the root.
    pub async fn go_up(&mut self) -> Result<(), ListingError> {
        if self.current.is_root() {
            return Ok(());
        }
        let parent = self.current.parent();
        self.navigate_to(parent).await
    }

    pub async fn go_back(&mut self) -> Result<(), ListingError> {
        let Some(target) = self.history.back() else {
            return Ok(());
        };
        if let Err(e) = self.replay(target).await {
            self.history.forward();
            return Err(e);
        }
        Ok(())
    }

    pub async fn go_forward(&mut self) -> Result<(), ListingError> {
        let Some(target) = self.history.forward() else {
            return Ok(());
        };
        if let Err(e) = self.replay(target).await {
            self.history.back();
            return Err(e);
        }
        Ok(())
    }

    /// Jump to the breadcrumb at `index`; index `None` is the root.
    pub async fn go_to_breadcrumb(&mut self, index: Option<usize>) -> Result<(), ListingError> {
        let target = match index {
            None => RemotePath::root(),
            Some(i) => match self.current.breadcrumb(i) {
                Some(target) => target,
                None => return Ok(()),
            },
        };
        self.navigate_to(target).await
    }

    /// Confirm the current folder as the destination.
    pub fn select(&self) -> RemotePath {
        self.current.clone()
    }

    pub fn folders(&self) -> &[DirectoryEntry] {
        &self.folders
    }

    pub fn current_path(&self) -> &RemotePath {
        &self.current
    }

    pub fn can_go_up(&self) -> bool {
        !self.current.is_root()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn history(&self) -> HistoryState {
        self.history.state()
    }

    async fn replay(&mut self, target: RemotePath) -> Result<(), ListingError> {
        let echoed = self.fetch(&target).await?;
        if echoed != target {
            self.history.replace_current(echoed);
        }
        Ok(())
    }

    /// List `path`, keep directories, and adopt the echoed canonical path.
    async fn fetch(&mut self, path: &RemotePath) -> Result<RemotePath, ListingError> {
        let backend = self.backend.clone();
        let result = {
            let _loading = LoadingFlag::raise(&mut self.is_loading);
            backend.fetch_listing(path).await
        };

        let response = result?;
        let echoed = RemotePath::normalize(&response.current_path).unwrap_or_else(|_| path.clone());
        if echoed != *path {
            debug!(requested = %path, echoed = %echoed, "Picker path corrected by backend");
        }

        self.folders = response
            .entries
            .into_iter()
            .filter(|e| e.is_directory)
            .collect();
        self.current = echoed.clone();
        Ok(echoed)
    }
}

/// Keeps `is_loading` raised for the lifetime of a fetch, including one that
/// is dropped before it resolves.
struct LoadingFlag<'a>(&'a mut bool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ListingResponse;
    use crate::errors::BackendError;
    use crate::files::{PermissionTriad, SpaceUsage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn dir(name: &str) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            is_directory: true,
            size: 4096,
            owner: "alice".into(),
            group: "staff".into(),
            permissions: PermissionTriad::parse("755").unwrap(),
            modified_at: 0,
            selected: false,
        }
    }

    fn file(name: &str) -> DirectoryEntry {
        DirectoryEntry {
            is_directory: false,
            ..dir(name)
        }
    }

    /// Serves a fixed tree; unknown paths fail. Echoes the path with a
    /// trailing slash to exercise canonical comparison.
    struct Tree {
        dirs: HashMap<String, Vec<DirectoryEntry>>,
        /// Listings of these paths never resolve.
        stalled: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ListingBackend for Tree {
        async fn fetch_listing(&self, path: &RemotePath) -> Result<ListingResponse, BackendError> {
            self.calls.lock().unwrap().push(path.to_string());
            if self.stalled.iter().any(|s| s == path.as_str()) {
                std::future::pending::<()>().await;
            }
            match self.dirs.get(path.as_str()) {
                Some(entries) => Ok(ListingResponse {
                    entries: entries.clone(),
                    current_path: format!("{path}/"),
                }),
                None => Err(BackendError::Status {
                    status: 404,
                    message: "Directory not found".into(),
                }),
            }
        }

        async fn fetch_space_usage(&self) -> Result<SpaceUsage, BackendError> {
            Ok(SpaceUsage::default())
        }
    }

    fn picker() -> FolderPicker {
        stalled_picker(&[])
    }

    fn stalled_picker(stalled: &[&str]) -> FolderPicker {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), vec![dir("a"), file("readme.md")]);
        dirs.insert("/a".to_string(), vec![dir("b")]);
        dirs.insert("/a/b".to_string(), vec![]);
        let tree = Arc::new(Tree {
            dirs,
            stalled: stalled.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        });
        FolderPicker::new(tree, RemotePath::root())
    }

    fn p(raw: &str) -> RemotePath {
        RemotePath::normalize(raw).unwrap()
    }

    #[tokio::test]
    async fn lists_directories_only() {
        let mut picker = picker();
        picker.refresh().await.unwrap();
        let names: Vec<&str> = picker.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert!(!picker.can_go_up());
    }

    #[tokio::test]
    async fn open_up_back_forward() {
        let mut picker = picker();
        picker.refresh().await.unwrap();

        picker.open("a").await.unwrap();
        picker.open("b").await.unwrap();
        assert_eq!(picker.select(), p("/a/b"));
        assert_eq!(picker.history().stack, vec![p("/"), p("/a"), p("/a/b")]);

        picker.go_up().await.unwrap();
        assert_eq!(picker.current_path(), &p("/a"));
        assert_eq!(picker.history().cursor, 3);

        picker.go_back().await.unwrap();
        assert_eq!(picker.current_path(), &p("/a/b"));
        picker.go_forward().await.unwrap();
        assert_eq!(picker.current_path(), &p("/a"));
        assert_eq!(picker.history().stack.len(), 4);
    }

    #[tokio::test]
    async fn breadcrumb_and_root() {
        let mut picker = picker();
        picker.navigate_to(p("/a/b")).await.unwrap();

        picker.go_to_breadcrumb(Some(0)).await.unwrap();
        assert_eq!(picker.current_path(), &p("/a"));

        picker.go_to_breadcrumb(Some(5)).await.unwrap();
        assert_eq!(picker.current_path(), &p("/a"));

        picker.go_to_breadcrumb(None).await.unwrap();
        assert!(picker.current_path().is_root());
    }

    #[tokio::test]
    async fn failed_navigation_leaves_history_untouched() {
        let mut picker = picker();
        picker.refresh().await.unwrap();

        assert!(picker.open("missing").await.is_err());
        assert_eq!(picker.history().stack, vec![p("/")]);
        assert!(picker.current_path().is_root());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_clears_loading_flag() {
        let mut picker = stalled_picker(&["/a"]);
        picker.refresh().await.unwrap();

        let opened =
            tokio::time::timeout(std::time::Duration::from_millis(50), picker.open("a")).await;
        assert!(opened.is_err());
        assert!(!picker.is_loading());
        assert!(picker.current_path().is_root());
        assert_eq!(picker.history().stack, vec![p("/")]);
    }

    #[tokio::test]
    async fn reopening_current_folder_drops_forward_entries() {
        let mut picker = picker();
        picker.refresh().await.unwrap();
        picker.open("a").await.unwrap();
        picker.go_back().await.unwrap();

        picker.navigate_to(p("/")).await.unwrap();
        let history = picker.history();
        assert_eq!(history.stack, vec![p("/")]);
        assert_eq!(history.cursor, 0);
    }
}
