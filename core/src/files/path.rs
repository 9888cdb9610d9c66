//! Canonical remote paths.
//!
//! The backend may echo back a different spelling of the path it was asked
//! for (trailing slash, doubled separators, an absolute home prefix). Both
//! sides are run through [`RemotePath::normalize`] and compared in canonical
//! form, so cosmetic differences never trigger a second navigation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PathError;

/// A normalized, absolute remote path.
///
/// The canonical form always starts with `/`, never contains `//`, and has
/// no trailing separator except for the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// The root path `/`.
    pub fn root() -> Self {
        RemotePath("/".to_string())
    }

    /// Normalize a raw path string.
    ///
    /// A leading `/` is added when missing, repeated separators collapse and
    /// `.` segments are dropped. `..` is kept as-is for the backend to
    /// resolve. Fails on a NUL byte or on input that is empty after trimming.
    pub fn normalize(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::NulByte);
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let segments: Vec<&str> = trimmed
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        Ok(RemotePath(format!("/{}", segments.join("/"))))
    }

    /// The parent directory; the root is its own parent.
    pub fn parent(&self) -> Self {
        match self.0.rfind('/') {
            Some(0) | None => Self::root(),
            Some(idx) => RemotePath(self.0[..idx].to_string()),
        }
    }

    /// Descend into `child`, equivalent to normalizing `self + "/" + child`.
    pub fn join(&self, child: &str) -> Result<Self, PathError> {
        Self::normalize(&format!("{}/{}", self.0, child))
    }

    /// Path segments, root first. The root has none.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Path formed by segments `0..=index`, as targeted by a breadcrumb click.
    ///
    /// Returns `None` when `index` is past the last segment.
    pub fn breadcrumb(&self, index: usize) -> Option<Self> {
        let segments = self.segments();
        if index >= segments.len() {
            return None;
        }
        Some(RemotePath(format!("/{}", segments[..=index].join("/"))))
    }

    /// Last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last().copied()
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RemotePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RemotePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for RemotePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> RemotePath {
        RemotePath::normalize(raw).unwrap()
    }

    #[test]
    fn normalize_adds_leading_slash_and_collapses_separators() {
        assert_eq!(p("docs").as_str(), "/docs");
        assert_eq!(p("//docs///reports//").as_str(), "/docs/reports");
        assert_eq!(p("/a/./b/").as_str(), "/a/b");
        assert_eq!(p("  /a/b  ").as_str(), "/a/b");
    }

    #[test]
    fn normalize_root_forms() {
        assert_eq!(p("/").as_str(), "/");
        assert_eq!(p("///").as_str(), "/");
        assert_eq!(p("/./").as_str(), "/");
        assert!(p("/").is_root());
    }

    #[test]
    fn normalize_rejects_nul_and_empty() {
        assert_eq!(RemotePath::normalize("a\0b"), Err(PathError::NulByte));
        assert_eq!(RemotePath::normalize(""), Err(PathError::Empty));
        assert_eq!(RemotePath::normalize("   "), Err(PathError::Empty));
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["a", "/a/", "//a//b//", "/", "x/./y", "/a/../b", "a b/c"] {
            let once = p(raw);
            let twice = p(once.as_str());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
            assert!(once.as_str().starts_with('/'));
            assert!(!once.as_str().contains("//"));
        }
    }

    #[test]
    fn trailing_slash_is_cosmetic() {
        assert_eq!(p("/home/user/"), p("/home/user"));
    }

    #[test]
    fn parent_drops_last_segment() {
        assert_eq!(p("/a/b/c").parent(), p("/a/b"));
        assert_eq!(p("/a").parent(), RemotePath::root());
        assert_eq!(RemotePath::root().parent(), RemotePath::root());
        assert_eq!(RemotePath::root().parent().parent(), RemotePath::root());
    }

    #[test]
    fn parent_shortens_segments_by_one() {
        let path = p("/one/two/three");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.parent().segments().len(), 2);
    }

    #[test]
    fn join_descends() {
        assert_eq!(RemotePath::root().join("photos").unwrap(), p("/photos"));
        assert_eq!(p("/a").join("b/").unwrap(), p("/a/b"));
        assert_eq!(p("/a").join("/b").unwrap(), p("/a/b"));
        assert!(p("/a").join("b\0").is_err());
    }

    #[test]
    fn breadcrumb_targets_prefix() {
        let path = p("/a/b/c");
        assert_eq!(path.segments(), vec!["a", "b", "c"]);
        assert_eq!(path.breadcrumb(0).unwrap(), p("/a"));
        assert_eq!(path.breadcrumb(1).unwrap(), p("/a/b"));
        assert_eq!(path.breadcrumb(2).unwrap(), path);
        assert!(path.breadcrumb(3).is_none());
        assert!(RemotePath::root().breadcrumb(0).is_none());
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(p("/a/report.pdf").file_name(), Some("report.pdf"));
        assert_eq!(RemotePath::root().file_name(), None);
    }

    #[test]
    fn serde_normalizes_on_deserialize() {
        let path: RemotePath = serde_json::from_str("\"//a//b/\"").unwrap();
        assert_eq!(path.as_str(), "/a/b");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"/a/b\"");
        assert!(serde_json::from_str::<RemotePath>("\"\"").is_err());
    }
}
