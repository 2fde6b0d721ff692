//! The store-level document representation.

use serde_json::{Map, Value};

use crate::version::{SequenceVersion, VersionToken, encode_version};

/// Source field holding the saved object type name.
pub const TYPE_FIELD: &str = "type";
/// Source field holding the owning namespace of single-namespace documents.
pub const NAMESPACE_FIELD: &str = "namespace";
/// Source field holding the namespace membership of multi-namespace documents.
pub const NAMESPACES_FIELD: &str = "namespaces";
/// Source field holding outbound references.
pub const REFERENCES_FIELD: &str = "references";
/// Source field holding the legacy per-plugin migration version map.
pub const MIGRATION_VERSION_FIELD: &str = "migrationVersion";
/// Source field holding the type schema version.
pub const TYPE_MIGRATION_VERSION_FIELD: &str = "typeMigrationVersion";
/// Source field holding the software version that last migrated the document.
pub const CORE_MIGRATION_VERSION_FIELD: &str = "coreMigrationVersion";
/// Source field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Source field holding the last update timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Source field holding the id of the object this one was copied from.
pub const ORIGIN_ID_FIELD: &str = "originId";

/// A document as the backing store sees it.
///
/// `id` is the composite raw id. `source` is the flat JSON body, with the
/// attributes stored under a key equal to the type name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// Composite id (`[namespace:]type:id`).
    pub id: String,
    /// Flat JSON source.
    pub source: Map<String, Value>,
    /// Store sequence number, if the document was read from the store.
    pub seq_no: Option<u64>,
    /// Store primary term, if the document was read from the store.
    pub primary_term: Option<u64>,
}

impl RawDocument {
    /// Creates an unversioned raw document.
    pub fn new(id: impl Into<String>, source: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            source,
            seq_no: None,
            primary_term: None,
        }
    }

    /// Returns the type name recorded in the source.
    pub fn type_name(&self) -> Option<&str> {
        self.source.get(TYPE_FIELD).and_then(Value::as_str)
    }

    /// Returns the attributes object, if present.
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.type_name()
            .and_then(|t| self.source.get(t))
            .and_then(Value::as_object)
    }

    /// Returns the attributes object mutably, creating an empty one if absent.
    ///
    /// Returns `None` when the source carries no type, or when the attributes
    /// slot holds something other than an object.
    pub fn attributes_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let type_name = self.type_name()?.to_string();
        self.source
            .entry(type_name)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// Returns a source field as a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.source.get(field).and_then(Value::as_str)
    }

    /// Returns the schema version string recorded for this document.
    ///
    /// `typeMigrationVersion` wins; older documents only carry the legacy
    /// `migrationVersion` map keyed by type name.
    pub fn recorded_type_version(&self) -> Option<&str> {
        self.str_field(TYPE_MIGRATION_VERSION_FIELD).or_else(|| {
            let type_name = self.type_name()?;
            self.source
                .get(MIGRATION_VERSION_FIELD)
                .and_then(|m| m.get(type_name))
                .and_then(Value::as_str)
        })
    }

    /// Returns the revision pair when both halves are present.
    pub fn sequence_version(&self) -> Option<SequenceVersion> {
        match (self.seq_no, self.primary_term) {
            (Some(seq_no), Some(primary_term)) => Some(SequenceVersion::new(seq_no, primary_term)),
            _ => None,
        }
    }

    /// Returns the version token when both halves are present.
    pub fn version_token(&self) -> Option<VersionToken> {
        self.sequence_version()
            .map(|v| encode_version(v.seq_no, v.primary_term))
    }

    /// Returns the namespaces array of a multi-namespace document.
    pub fn namespaces(&self) -> Vec<String> {
        self.source
            .get(NAMESPACES_FIELD)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(source: Value) -> RawDocument {
        RawDocument::new("dashboard:1", source.as_object().cloned().unwrap())
    }

    #[test]
    fn test_attributes_keyed_by_type() {
        let raw = doc(json!({"type": "dashboard", "dashboard": {"title": "a"}}));
        assert_eq!(raw.type_name(), Some("dashboard"));
        assert_eq!(raw.attributes().unwrap()["title"], "a");
    }

    #[test]
    fn test_attributes_mut_creates_object() {
        let mut raw = doc(json!({"type": "dashboard"}));
        raw.attributes_mut()
            .unwrap()
            .insert("title".to_string(), json!("b"));
        assert_eq!(raw.source["dashboard"]["title"], "b");

        let mut untyped = doc(json!({}));
        assert!(untyped.attributes_mut().is_none());
    }

    #[test]
    fn test_attributes_mut_keeps_non_object_attributes() {
        let mut raw = doc(json!({"type": "dashboard", "dashboard": "corrupt"}));
        assert!(raw.attributes_mut().is_none());
        assert_eq!(raw.source["dashboard"], json!("corrupt"));
    }

    #[test]
    fn test_recorded_type_version_prefers_type_migration_version() {
        let raw = doc(json!({
            "type": "dashboard",
            "typeMigrationVersion": "2.0.0",
            "migrationVersion": {"dashboard": "1.0.0"}
        }));
        assert_eq!(raw.recorded_type_version(), Some("2.0.0"));

        let legacy = doc(json!({
            "type": "dashboard",
            "migrationVersion": {"dashboard": "1.0.0"}
        }));
        assert_eq!(legacy.recorded_type_version(), Some("1.0.0"));

        let none = doc(json!({"type": "dashboard"}));
        assert_eq!(none.recorded_type_version(), None);
    }

    #[test]
    fn test_version_token_requires_both_halves() {
        let mut raw = doc(json!({"type": "dashboard"}));
        assert!(raw.version_token().is_none());
        raw.seq_no = Some(5);
        assert!(raw.version_token().is_none());
        raw.primary_term = Some(1);
        assert_eq!(raw.version_token().unwrap().as_str(), "WzUsMV0=");
    }
}
