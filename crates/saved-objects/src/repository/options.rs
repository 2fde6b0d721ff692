//! Option and response types for repository calls.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::client::RefreshPolicy;
use crate::error::{SavedObjectsError, StorageResult};
use crate::migration::MigrationVersion;
use crate::serialization::MigrationVersionCompatibility;
use crate::types::{SavedObject, SavedObjectReference};

/// Options for [`create`](super::SavedObjectsRepository::create).
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Id to create; a UUID v4 is generated when absent.
    pub id: Option<String>,
    /// Target namespace (`None` or `"default"` is the default namespace).
    pub namespace: Option<String>,
    /// Outbound references.
    pub references: Vec<SavedObjectReference>,
    /// Replace an existing object instead of failing with a conflict.
    pub overwrite: bool,
    /// Only overwrite this exact revision.
    pub version: Option<String>,
    /// Legacy migration versions of the supplied attributes.
    pub migration_version: BTreeMap<String, MigrationVersion>,
    /// Schema version of the supplied attributes; absent means current.
    pub type_migration_version: Option<MigrationVersion>,
    /// Namespaces a multi-namespace object is created in.
    pub initial_namespaces: Option<Vec<String>>,
    /// Id of the object this one was copied from.
    pub origin_id: Option<String>,
    /// Visibility of the write; the repository default when absent.
    pub refresh: Option<RefreshPolicy>,
}

/// Options for [`get`](super::SavedObjectsRepository::get).
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Namespace to read from.
    pub namespace: Option<String>,
    /// Presentation of the legacy migration map.
    pub migration_version_compatibility: MigrationVersionCompatibility,
}

/// Options for [`update`](super::SavedObjectsRepository::update).
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Namespace of the object.
    pub namespace: Option<String>,
    /// Replacement references; existing references are kept when absent.
    pub references: Option<Vec<SavedObjectReference>>,
    /// Only update this exact revision; disables conflict retries.
    pub version: Option<String>,
    /// Attributes to create the object with if it does not exist.
    pub upsert: Option<Value>,
    /// Read-merge-write retries on conflict; the repository default when absent.
    pub retry_on_conflict: Option<u32>,
    /// Visibility of the write; the repository default when absent.
    pub refresh: Option<RefreshPolicy>,
}

/// Options for [`delete`](super::SavedObjectsRepository::delete).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Namespace of the object.
    pub namespace: Option<String>,
    /// Delete a multi-namespace object even if it is shared.
    pub force: bool,
    /// Visibility of the delete; the repository default when absent.
    pub refresh: Option<RefreshPolicy>,
}

/// One object of a bulk get or bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkObjectRef {
    /// Saved object type.
    pub type_name: String,
    /// Logical id.
    pub id: String,
}

impl BulkObjectRef {
    /// Creates a reference.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

/// Options for [`bulk_delete`](super::SavedObjectsRepository::bulk_delete).
#[derive(Debug, Clone, Default)]
pub struct BulkDeleteOptions {
    /// Namespace of the objects.
    pub namespace: Option<String>,
    /// Delete shared multi-namespace objects too.
    pub force: bool,
    /// Visibility of the batch; the repository default when absent.
    pub refresh: Option<RefreshPolicy>,
}

/// Outcome of deleting one object in a bulk call.
#[derive(Debug)]
pub struct BulkDeleteStatus {
    /// Saved object type.
    pub type_name: String,
    /// Logical id.
    pub id: String,
    /// Whether the object was deleted.
    pub success: bool,
    /// Why it was not.
    pub error: Option<SavedObjectsError>,
}

/// Result of a bulk delete, one status per input in input order.
#[derive(Debug, Default)]
pub struct BulkDeleteResponse {
    /// Per-object statuses.
    pub statuses: Vec<BulkDeleteStatus>,
}

/// Options for [`bulk_get`](super::SavedObjectsRepository::bulk_get).
#[derive(Debug, Clone, Default)]
pub struct BulkGetOptions {
    /// Namespace to read from.
    pub namespace: Option<String>,
    /// Presentation of the legacy migration map.
    pub migration_version_compatibility: MigrationVersionCompatibility,
}

/// Result of a bulk get, one entry per input in input order.
#[derive(Debug, Default)]
pub struct BulkGetResponse {
    /// Per-object results.
    pub saved_objects: Vec<StorageResult<SavedObject>>,
}

/// One object of a bulk create.
#[derive(Debug, Clone)]
pub struct BulkCreateObject {
    /// Saved object type.
    pub type_name: String,
    /// Id to create; a UUID v4 is generated when absent.
    pub id: Option<String>,
    /// Attributes (must be a JSON object).
    pub attributes: Value,
    /// Outbound references.
    pub references: Vec<SavedObjectReference>,
    /// Only overwrite this exact revision.
    pub version: Option<String>,
    /// Legacy migration versions of the supplied attributes.
    pub migration_version: BTreeMap<String, MigrationVersion>,
    /// Schema version of the supplied attributes; absent means current.
    pub type_migration_version: Option<MigrationVersion>,
    /// Namespaces a multi-namespace object is created in.
    pub initial_namespaces: Option<Vec<String>>,
    /// Id of the object this one was copied from.
    pub origin_id: Option<String>,
}

impl BulkCreateObject {
    /// Creates an item with just a type and attributes.
    pub fn new(type_name: impl Into<String>, attributes: Value) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            attributes,
            references: Vec::new(),
            version: None,
            migration_version: BTreeMap::new(),
            type_migration_version: None,
            initial_namespaces: None,
            origin_id: None,
        }
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Options for [`bulk_create`](super::SavedObjectsRepository::bulk_create).
#[derive(Debug, Clone, Default)]
pub struct BulkCreateOptions {
    /// Target namespace.
    pub namespace: Option<String>,
    /// Replace existing objects instead of failing them with a conflict.
    pub overwrite: bool,
    /// Visibility of the batch; the repository default when absent.
    pub refresh: Option<RefreshPolicy>,
}

/// Result of a bulk create, one entry per input in input order.
#[derive(Debug, Default)]
pub struct BulkCreateResponse {
    /// Per-object results.
    pub saved_objects: Vec<StorageResult<SavedObject>>,
}
