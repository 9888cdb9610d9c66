pub mod format;
pub mod history;
pub mod listing;
pub mod path;
pub mod picker;

pub use format::{human_readable_size, PermissionTriad};
pub use history::{HistoryStack, HistoryState};
pub use listing::{ListingStore, LoadOutcome, NavigationState};
pub use path::RemotePath;
pub use picker::FolderPicker;

use serde::{Deserialize, Serialize};

/// One child of the current directory.
///
/// Created fresh on every listing fetch. `selected` is client-only: it is
/// never serialized and survives a re-fetch only through merge-by-name in
/// [`ListingStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Unique within its parent directory.
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub owner: String,
    pub group: String,
    pub permissions: PermissionTriad,
    /// Unix timestamp, seconds.
    pub modified_at: i64,
    #[serde(skip)]
    pub selected: bool,
}

impl DirectoryEntry {
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// `ls -l` style permission column.
    pub fn permission_string(&self) -> String {
        self.permissions.symbolic(self.is_directory)
    }
}

/// Disk usage of the user's storage, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceUsage {
    pub used: u64,
    pub total: u64,
    pub available: u64,
}

impl SpaceUsage {
    /// Fraction of the total that is used, `0.0` when the total is unknown.
    pub fn used_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_is_never_serialized() {
        let entry = DirectoryEntry {
            name: "a.txt".into(),
            is_directory: false,
            size: 3,
            owner: "u".into(),
            group: "g".into(),
            permissions: PermissionTriad::parse("644").unwrap(),
            modified_at: 1_700_000_000,
            selected: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("selected").is_none());
        assert_eq!(json["permissions"], "644");
        assert_eq!(json["isDirectory"], false);

        let back: DirectoryEntry = serde_json::from_value(json).unwrap();
        assert!(!back.selected);
        assert_eq!(back.permission_string(), "-rw-r--r--");
    }

    #[test]
    fn space_usage_fraction() {
        let usage = SpaceUsage {
            used: 25,
            total: 100,
            available: 75,
        };
        assert!((usage.used_fraction() - 0.25).abs() < f64::EPSILON);
        assert_eq!(SpaceUsage::default().used_fraction(), 0.0);
    }
}
