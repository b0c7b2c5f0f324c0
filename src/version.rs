//! Product version handling
//!
//! Product releases follow a 5.x.0 numbering scheme. Transformers declare the
//! release at which they take effect, so versions are reduced to an ordinal
//! (5.0.0 -> 0, 5.11.0 -> 11) and compared as plain integers.

use crate::error::{Result, SyncError};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductVersion {
    ordinal: u32,
}

impl ProductVersion {
    pub fn from_ordinal(ordinal: u32) -> Self {
        Self { ordinal }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(SyncError::Configuration(format!(
                "invalid product version '{}': expected major.minor.patch",
                value
            )));
        }
        if parts[0] != "5" {
            return Err(SyncError::Configuration(format!(
                "unsupported product version '{}': only the 5.x line is synced",
                value
            )));
        }
        let minor: u32 = parts[1].parse().map_err(|_| {
            SyncError::Configuration(format!("invalid minor version in '{}'", value))
        })?;
        Ok(Self { ordinal: minor })
    }
}

impl FromStr for ProductVersion {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "5.{}.0", self.ordinal)
    }
}

/// A transformer declared at `ordinal` applies to a sync from `source` to
/// `target` when source <= ordinal <= target.
pub fn in_version_bracket(source: ProductVersion, target: ProductVersion, ordinal: u32) -> bool {
    source.ordinal() <= ordinal && ordinal <= target.ordinal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let v = ProductVersion::parse("5.8.0").unwrap();
        assert_eq!(v.ordinal(), 8);
        assert_eq!(v.to_string(), "5.8.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ProductVersion::parse("5.8").is_err());
        assert!(ProductVersion::parse("6.0.0").is_err());
        assert!(ProductVersion::parse("5.x.0").is_err());
    }

    #[test]
    fn test_version_bracket() {
        let source = ProductVersion::from_ordinal(3);
        let target = ProductVersion::from_ordinal(7);

        assert!(in_version_bracket(source, target, 3));
        assert!(in_version_bracket(source, target, 5));
        assert!(in_version_bracket(source, target, 7));
        assert!(!in_version_bracket(source, target, 2));
        assert!(!in_version_bracket(source, target, 8));
    }
}
