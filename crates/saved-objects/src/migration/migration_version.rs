//! Dotted numeric schema versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// A `major.minor.patch` schema version.
///
/// Missing trailing components default to zero, so `"2"` and `"2.0"` both
/// parse as `2.0.0`. Ordering is numeric per component.
///
/// ```
/// use helios_saved_objects::migration::MigrationVersion;
///
/// let v: MigrationVersion = "7.10".parse().unwrap();
/// assert_eq!(v, MigrationVersion::new(7, 10, 0));
/// assert!(v > "7.9.1".parse::<MigrationVersion>().unwrap());
/// assert_eq!(v.to_string(), "7.10.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MigrationVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl MigrationVersion {
    /// The version every unversioned document implicitly starts from.
    pub const ZERO: MigrationVersion = MigrationVersion::new(0, 0, 0);

    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns the major component.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor component.
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the patch component.
    pub fn patch(&self) -> u32 {
        self.patch
    }
}

impl FromStr for MigrationVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidVersion {
            value: s.to_string(),
            message: message.to_string(),
        };

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid("expected at most three dot-separated components"));
        }

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("components must be non-negative integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("component out of range"))?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_and_partial() {
        assert_eq!(
            "1.2.3".parse::<MigrationVersion>().unwrap(),
            MigrationVersion::new(1, 2, 3)
        );
        assert_eq!(
            "2".parse::<MigrationVersion>().unwrap(),
            MigrationVersion::new(2, 0, 0)
        );
        assert_eq!(
            "8.4".parse::<MigrationVersion>().unwrap(),
            MigrationVersion::new(8, 4, 0)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "1..2", "1.2.3.4", "a.b", "-1.0.0", "1.0.0-beta", "v1"] {
            assert!(
                input.parse::<MigrationVersion>().is_err(),
                "{:?} should not parse",
                input
            );
        }
    }

    #[test]
    fn test_ordering_is_numeric() {
        let v = |s: &str| s.parse::<MigrationVersion>().unwrap();
        assert!(v("7.9.0") < v("7.10.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("10") > v("9.99.99"));
        assert_eq!(MigrationVersion::ZERO, v("0"));
    }

    #[test]
    fn test_serde_as_string() {
        let v = MigrationVersion::new(8, 8, 0);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"8.8.0\"");
        let back: MigrationVersion = serde_json::from_str("\"8.8\"").unwrap();
        assert_eq!(back, v);
    }
}
