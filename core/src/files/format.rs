//! Display helpers for listing entries.

use std::fmt;

use serde::{Deserialize, Serialize};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary multiples and two decimals, e.g. `1.50 KB`.
pub fn human_readable_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, SIZE_UNITS[unit])
}

/// Unix permission bits as three octal digits (owner, group, other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionTriad([u8; 3]);

impl PermissionTriad {
    /// Build from raw digits; each must be `0..=7`.
    pub fn new(owner: u8, group: u8, other: u8) -> Option<Self> {
        if owner > 7 || group > 7 || other > 7 {
            return None;
        }
        Some(Self([owner, group, other]))
    }

    /// Build from the low nine bits of a Unix mode.
    pub fn from_mode(mode: u32) -> Self {
        Self([
            ((mode >> 6) & 0o7) as u8,
            ((mode >> 3) & 0o7) as u8,
            (mode & 0o7) as u8,
        ])
    }

    /// Parse an octal string such as `"755"`.
    ///
    /// Shorter strings are left-padded (`"7"` is `007`), matching how the
    /// backend prints modes without leading zeros.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 3 {
            return None;
        }
        let mut digits = [0u8; 3];
        let offset = 3 - raw.len();
        for (i, c) in raw.chars().enumerate() {
            let d = c.to_digit(8)?;
            digits[offset + i] = d as u8;
        }
        Some(Self(digits))
    }

    pub fn digits(&self) -> [u8; 3] {
        self.0
    }

    /// Render as `ls -l` style, e.g. `drwxr-xr-x`.
    pub fn symbolic(&self, is_directory: bool) -> String {
        let mut out = String::with_capacity(10);
        out.push(if is_directory { 'd' } else { '-' });
        for digit in self.0 {
            out.push(if digit & 0o4 != 0 { 'r' } else { '-' });
            out.push(if digit & 0o2 != 0 { 'w' } else { '-' });
            out.push(if digit & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

impl fmt::Display for PermissionTriad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0[0], self.0[1], self.0[2])
    }
}

impl TryFrom<String> for PermissionTriad {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid permission triad: {value:?}"))
    }
}

impl From<PermissionTriad> for String {
    fn from(triad: PermissionTriad) -> Self {
        triad.to_string()
    }
}
