//! Saved object types.
//!
//! This module defines [`SavedObject`], the typed view of a stored document,
//! and [`SavedObjectReference`], the typed link between two saved objects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::migration::MigrationVersion;
use crate::namespace::Namespace;
use crate::version::VersionToken;

/// A reference from one saved object to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavedObjectReference {
    /// Name of the reference within the referencing object.
    pub name: String,

    /// Type of the referenced object.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Id of the referenced object.
    pub id: String,
}

impl SavedObjectReference {
    /// Creates a reference.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

/// A typed saved object with persistence metadata.
///
/// `type_name` and `id` form the logical identity. For single-namespace types
/// `namespace` names the owning namespace (`None` is the default namespace).
/// For multi-namespace types `namespaces` lists every namespace the object is
/// shared into. Namespace-agnostic objects carry neither.
///
/// # Examples
///
/// ```
/// use helios_saved_objects::types::SavedObject;
/// use serde_json::json;
///
/// let object = SavedObject::new("dashboard", "sales", json!({"title": "Sales"}));
/// assert_eq!(object.type_name, "dashboard");
/// assert_eq!(object.attribute("title"), Some(&json!("Sales")));
/// assert!(object.version.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedObject {
    /// The saved object type.
    #[serde(rename = "type")]
    pub type_name: String,

    /// The logical id, unique per type and namespace.
    pub id: String,

    /// Owning namespace of a single-namespace object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,

    /// Namespace membership of a multi-namespace object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,

    /// Type-specific attributes (always a JSON object once persisted).
    pub attributes: Value,

    /// Outbound references.
    #[serde(default)]
    pub references: Vec<SavedObjectReference>,

    /// Legacy per-plugin migration versions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub migration_version: BTreeMap<String, MigrationVersion>,

    /// Schema version of the attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_migration_version: Option<MigrationVersion>,

    /// Software version that last migrated the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_migration_version: Option<MigrationVersion>,

    /// When the object was created.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "created_at")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the object was last written.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "updated_at")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Concurrency token of the revision this object was read or written as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,

    /// Id of the object this one was copied from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
}

impl SavedObject {
    /// Creates an unversioned object in the default namespace.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>, attributes: Value) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            namespace: None,
            namespaces: None,
            attributes,
            references: Vec::new(),
            migration_version: BTreeMap::new(),
            type_migration_version: None,
            core_migration_version: None,
            created_at: None,
            updated_at: None,
            version: None,
            origin_id: None,
        }
    }

    /// Returns `"{type}/{id}"`, the form used in error messages and logs.
    pub fn url(&self) -> String {
        format!("{}/{}", self.type_name, self.id)
    }

    /// Returns the attributes as a JSON object, if they are one.
    pub fn attributes_object(&self) -> Option<&Map<String, Value>> {
        self.attributes.as_object()
    }

    /// Returns a single top-level attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns the version token as a string slice.
    pub fn version_str(&self) -> Option<&str> {
        self.version.as_ref().map(VersionToken::as_str)
    }
}
