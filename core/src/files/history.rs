//! Back/forward navigation over visited paths.
//!
//! Shared by the main browser and the folder picker. Forward navigation
//! (folder clicks, breadcrumbs, "go up") pushes; back/forward only move the
//! cursor.

use serde::Serialize;

use super::path::RemotePath;

/// Read-only snapshot used to enable or disable navigation controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub stack: Vec<RemotePath>,
    pub cursor: usize,
}

impl HistoryState {
    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.stack.len()
    }
}

/// Visited-path stack with a cursor.
///
/// Invariant: the stack is never empty and `cursor < stack.len()`.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    stack: Vec<RemotePath>,
    cursor: usize,
}

impl HistoryStack {
    /// Seed the history with exactly one entry.
    pub fn new(initial: RemotePath) -> Self {
        Self {
            stack: vec![initial],
            cursor: 0,
        }
    }

    /// Drop everything after the cursor, append `path`, and move onto it.
    pub fn push(&mut self, path: RemotePath) {
        self.stack.truncate(self.cursor + 1);
        self.stack.push(path);
        self.cursor = self.stack.len() - 1;
    }

    /// Drop everything after the cursor, keeping the current entry.
    pub fn truncate_forward(&mut self) {
        self.stack.truncate(self.cursor + 1);
    }

    /// Step back. Returns `None` at the oldest entry.
    pub fn back(&mut self) -> Option<RemotePath> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.stack[self.cursor].clone())
    }

    /// Step forward. Returns `None` at the newest entry.
    pub fn forward(&mut self) -> Option<RemotePath> {
        if self.cursor + 1 >= self.stack.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.stack[self.cursor].clone())
    }

    /// Overwrite the entry under the cursor without touching the rest.
    ///
    /// Used when the backend echoes a different canonical form for a path
    /// that was replayed through back/forward.
    pub fn replace_current(&mut self, path: RemotePath) {
        self.stack[self.cursor] = path;
    }

    pub fn current(&self) -> &RemotePath {
        &self.stack[self.cursor]
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.stack.len()
    }

    pub fn entries(&self) -> &[RemotePath] {
        &self.stack
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> HistoryState {
        HistoryState {
            stack: self.stack.clone(),
            cursor: self.cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> RemotePath {
        RemotePath::normalize(raw).unwrap()
    }

    #[test]
    fn new_seeds_single_entry() {
        let history = HistoryStack::new(p("/start"));
        assert_eq!(history.entries(), &[p("/start")]);
        assert_eq!(history.cursor(), 0);
        assert!(!history.can_go_back());
        assert!(!history.can_go_forward());
    }

    #[test]
    fn push_back_push_discards_forward_history() {
        let mut history = HistoryStack::new(RemotePath::root());

        history.push(p("/x"));
        assert_eq!(history.entries(), &[p("/"), p("/x")]);
        assert_eq!(history.cursor(), 1);

        assert_eq!(history.back(), Some(p("/")));
        assert_eq!(history.cursor(), 0);

        history.push(p("/y"));
        assert_eq!(history.entries(), &[p("/"), p("/y")]);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn truncate_forward_keeps_current_entry() {
        let mut history = HistoryStack::new(p("/"));
        history.push(p("/a"));
        history.push(p("/a/b"));
        history.back();

        history.truncate_forward();
        assert_eq!(history.entries(), &[p("/"), p("/a")]);
        assert_eq!(history.cursor(), 1);
        assert!(!history.can_go_forward());
    }

    #[test]
    fn back_and_forward_stop_at_boundaries() {
        let mut history = HistoryStack::new(p("/"));
        assert_eq!(history.back(), None);
        assert_eq!(history.forward(), None);

        history.push(p("/a"));
        history.push(p("/a/b"));
        assert_eq!(history.forward(), None);
        assert_eq!(history.back(), Some(p("/a")));
        assert_eq!(history.back(), Some(p("/")));
        assert_eq!(history.back(), None);
        assert_eq!(history.cursor(), 0);

        assert_eq!(history.forward(), Some(p("/a")));
        assert_eq!(history.forward(), Some(p("/a/b")));
        assert_eq!(history.forward(), None);
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn replace_current_keeps_cursor_and_neighbours() {
        let mut history = HistoryStack::new(p("/"));
        history.push(p("/a"));
        history.push(p("/b"));
        history.back();
        history.replace_current(p("/home/a"));
        assert_eq!(history.entries(), &[p("/"), p("/home/a"), p("/b")]);
        assert_eq!(history.current(), &p("/home/a"));
        assert!(history.can_go_forward());
    }

    #[test]
    fn state_snapshot_mirrors_controls() {
        let mut history = HistoryStack::new(p("/"));
        history.push(p("/a"));
        let state = history.state();
        assert!(state.can_go_back());
        assert!(!state.can_go_forward());
        assert_eq!(state.cursor, 1);
    }
}
