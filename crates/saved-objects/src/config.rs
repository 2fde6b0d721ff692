//! Repository configuration.

use serde::{Deserialize, Serialize};

use crate::client::RefreshPolicy;
use crate::migration::MigrationVersion;

/// Configuration for a [`SavedObjectsRepository`](crate::repository::SavedObjectsRepository).
///
/// Every field has a default, so an empty JSON object is a valid config:
///
/// ```
/// use helios_saved_objects::config::SavedObjectsConfig;
///
/// let config: SavedObjectsConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.index, ".kibana");
/// assert_eq!(config.software_version.to_string(), "8.0.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedObjectsConfig {
    /// Index holding saved objects of types without a dedicated index
    /// (default: `".kibana"`).
    #[serde(default = "default_index")]
    pub index: String,

    /// Version stamped as `coreMigrationVersion` on migrated documents
    /// (default: `"8.0.0"`).
    #[serde(default = "default_software_version")]
    pub software_version: MigrationVersion,

    /// Refresh policy used when a call does not specify one (default: `wait_for`).
    #[serde(default)]
    pub default_refresh: RefreshPolicy,

    /// Retries of the update read-merge-write cycle when no version token was
    /// supplied (default: 0).
    #[serde(default)]
    pub retry_on_conflict: u32,

    /// Maximum number of objects in one bulk call (default: 10000).
    #[serde(default = "default_max_bulk_size")]
    pub max_bulk_size: usize,

    /// Hidden types this repository exposes in addition to the visible ones.
    #[serde(default)]
    pub included_hidden_types: Vec<String>,
}

fn default_index() -> String {
    ".kibana".to_string()
}

fn default_software_version() -> MigrationVersion {
    MigrationVersion::new(8, 0, 0)
}

fn default_max_bulk_size() -> usize {
    10000
}

impl Default for SavedObjectsConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            software_version: default_software_version(),
            default_refresh: RefreshPolicy::default(),
            retry_on_conflict: 0,
            max_bulk_size: default_max_bulk_size(),
            included_hidden_types: Vec::new(),
        }
    }
}
