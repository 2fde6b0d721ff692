//! Conversion between [`SavedObject`] and the store's [`RawDocument`] shape.
//!
//! The raw id is a pure, reversible function of `(namespace, type, id)`:
//!
//! | Type | Namespace | Raw id |
//! |------|-----------|--------|
//! | single-namespace | non-default | `{namespace}:{type}:{id}` |
//! | single-namespace | default | `{type}:{id}` |
//! | multi-namespace / agnostic | any | `{type}:{id}` |
//!
//! The source is flat: attributes live under a key equal to the type name,
//! next to `type`, `references`, the namespace fields and the migration
//! metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::SerializationError;
use crate::migration::MigrationVersion;
use crate::namespace::{Namespace, namespace_id_to_string};
use crate::registry::TypeRegistry;
use crate::types::{
    CORE_MIGRATION_VERSION_FIELD, CREATED_AT_FIELD, MIGRATION_VERSION_FIELD, NAMESPACE_FIELD,
    NAMESPACES_FIELD, ORIGIN_ID_FIELD, REFERENCES_FIELD, RawDocument, SavedObject,
    SavedObjectReference, TYPE_FIELD, TYPE_MIGRATION_VERSION_FIELD, UPDATED_AT_FIELD,
};
use crate::version::encode_hit_version;

/// How the legacy `migrationVersion` map is presented on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationVersionCompatibility {
    /// Rebuild `migrationVersion` from `typeMigrationVersion` when only the
    /// latter is stored, for callers that still read the legacy map.
    Compatible,
    /// Return the fields exactly as stored.
    #[default]
    Raw,
}

/// How strictly the raw id prefix is checked against the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespaceTreatment {
    /// The raw id must carry exactly the prefix implied by the source.
    #[default]
    Strict,
    /// Also accept ids written with a different namespace prefix than the
    /// source records.
    Lax,
}

/// Options for [`SavedObjectsSerializer::raw_to_saved_object`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDocParseOptions {
    /// Raw id prefix checking.
    pub namespace_treatment: NamespaceTreatment,
    /// Legacy migration map presentation.
    pub migration_version_compatibility: MigrationVersionCompatibility,
}

/// The decoded parts of a raw id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIdParts {
    /// Namespace prefix, for single-namespace types outside the default namespace.
    pub namespace: Option<Namespace>,
    /// Saved object type.
    pub type_name: String,
    /// Logical id.
    pub id: String,
}

/// Converts saved objects to and from raw store documents.
#[derive(Debug, Clone)]
pub struct SavedObjectsSerializer {
    registry: Arc<TypeRegistry>,
}

impl SavedObjectsSerializer {
    /// Creates a serializer over the given registry.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Builds the composite raw id for `(namespace, type, id)`.
    ///
    /// The namespace only contributes to the id of single-namespace types.
    pub fn generate_raw_id(&self, namespace: Option<&Namespace>, type_name: &str, id: &str) -> String {
        match namespace {
            Some(ns) if self.registry.is_single_namespace(type_name) => {
                format!("{}:{}:{}", ns, type_name, id)
            }
            _ => format!("{}:{}", type_name, id),
        }
    }

    /// Decodes a composite raw id into `(namespace, type, id)`.
    ///
    /// When the first segment is a registered type name the id is read as
    /// `{type}:{id}`. Otherwise it must be `{namespace}:{type}:{id}` for a
    /// registered single-namespace type. The repository never accepts a
    /// namespace named after a registered type, so every id it writes decodes
    /// back to the parts it was generated from.
    pub fn parse_raw_id(&self, raw_id: &str) -> Result<RawIdParts, SerializationError> {
        let invalid = |message: &str| SerializationError::InvalidRawId {
            raw_id: raw_id.to_string(),
            message: message.to_string(),
        };

        let (first, rest) = raw_id
            .split_once(':')
            .ok_or_else(|| invalid("expected at least one ':' separator"))?;

        if self.registry.has_type(first) {
            if rest.is_empty() {
                return Err(invalid("id segment is empty"));
            }
            return Ok(RawIdParts {
                namespace: None,
                type_name: first.to_string(),
                id: rest.to_string(),
            });
        }

        let namespace = Namespace::new(first).map_err(|e| invalid(&e.to_string()))?;
        let (type_name, id) = rest
            .split_once(':')
            .ok_or_else(|| invalid("unknown type and no namespace prefix"))?;
        if !self.registry.has_type(type_name) {
            return Err(invalid("unknown saved object type"));
        }
        if !self.registry.is_single_namespace(type_name) {
            return Err(invalid("only single-namespace types carry a namespace prefix"));
        }
        if id.is_empty() {
            return Err(invalid("id segment is empty"));
        }

        Ok(RawIdParts {
            namespace: Some(namespace),
            type_name: type_name.to_string(),
            id: id.to_string(),
        })
    }

    /// Returns `true` if `raw` can be decoded into a saved object.
    pub fn is_raw_saved_object(&self, raw: &RawDocument, options: RawDocParseOptions) -> bool {
        match raw.type_name() {
            Some(type_name) if !type_name.is_empty() => self
                .trim_id_prefix(raw, type_name, options.namespace_treatment)
                .is_ok(),
            _ => false,
        }
    }

    /// Decodes a raw store document into a saved object.
    pub fn raw_to_saved_object(
        &self,
        raw: &RawDocument,
        options: RawDocParseOptions,
    ) -> Result<SavedObject, SerializationError> {
        let type_name = match raw.type_name() {
            Some(t) if !t.is_empty() => t,
            Some(_) => return Err(invalid_field(raw, TYPE_FIELD, "type cannot be empty")),
            None => {
                return Err(SerializationError::MissingField {
                    raw_id: raw.id.clone(),
                    field: TYPE_FIELD.to_string(),
                });
            }
        };

        let (namespace, id) = self.trim_id_prefix(raw, type_name, options.namespace_treatment)?;

        let attributes = match raw.source.get(type_name) {
            None => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => return Err(invalid_field(raw, type_name, "attributes must be an object")),
        };

        let references: Vec<SavedObjectReference> = match raw.source.get(REFERENCES_FIELD) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| invalid_field(raw, REFERENCES_FIELD, &e.to_string()))?,
        };

        let mut migration_version: BTreeMap<String, MigrationVersion> =
            match raw.source.get(MIGRATION_VERSION_FIELD) {
                None | Some(Value::Null) => BTreeMap::new(),
                Some(value) => serde_json::from_value(value.clone())
                    .map_err(|e| invalid_field(raw, MIGRATION_VERSION_FIELD, &e.to_string()))?,
            };
        let type_migration_version = parse_version_field(raw, TYPE_MIGRATION_VERSION_FIELD)?;
        let core_migration_version = parse_version_field(raw, CORE_MIGRATION_VERSION_FIELD)?;

        if options.migration_version_compatibility == MigrationVersionCompatibility::Compatible
            && migration_version.is_empty()
            && let Some(version) = type_migration_version
        {
            migration_version.insert(type_name.to_string(), version);
        }

        let namespaces = if self.registry.is_multi_namespace(type_name) {
            Some(raw.namespaces())
        } else if self.registry.is_single_namespace(type_name) {
            Some(vec![namespace_id_to_string(namespace.as_ref())])
        } else {
            None
        };

        let version = if raw.seq_no.is_some() || raw.primary_term.is_some() {
            Some(
                encode_hit_version(raw.seq_no, raw.primary_term)
                    .map_err(|e| invalid_field(raw, "_seq_no", &e.to_string()))?,
            )
        } else {
            None
        };

        Ok(SavedObject {
            type_name: type_name.to_string(),
            id,
            namespace,
            namespaces,
            attributes,
            references,
            migration_version,
            type_migration_version,
            core_migration_version,
            created_at: parse_timestamp_field(raw, CREATED_AT_FIELD)?,
            updated_at: parse_timestamp_field(raw, UPDATED_AT_FIELD)?,
            version,
            origin_id: raw.str_field(ORIGIN_ID_FIELD).map(str::to_string),
        })
    }

    /// Flattens a saved object into the raw store shape.
    ///
    /// Multi-namespace objects without explicit membership are written into
    /// their own namespace, so the stored `namespaces` array is never empty.
    pub fn saved_object_to_raw(&self, object: &SavedObject) -> Result<RawDocument, SerializationError> {
        let type_name = object.type_name.as_str();
        let raw_id = self.generate_raw_id(object.namespace.as_ref(), type_name, &object.id);

        if type_name.is_empty() || object.id.is_empty() {
            return Err(SerializationError::InvalidRawId {
                raw_id,
                message: "type and id must be non-empty".to_string(),
            });
        }
        if !object.attributes.is_object() {
            return Err(SerializationError::InvalidField {
                raw_id,
                field: type_name.to_string(),
                message: "attributes must be an object".to_string(),
            });
        }

        let mut source = Map::new();
        source.insert(TYPE_FIELD.to_string(), Value::String(type_name.to_string()));
        source.insert(type_name.to_string(), object.attributes.clone());
        source.insert(
            REFERENCES_FIELD.to_string(),
            serde_json::to_value(&object.references).map_err(|e| SerializationError::Json {
                message: e.to_string(),
            })?,
        );

        if self.registry.is_single_namespace(type_name)
            && let Some(ns) = &object.namespace
        {
            source.insert(NAMESPACE_FIELD.to_string(), Value::String(ns.to_string()));
        }
        if self.registry.is_multi_namespace(type_name) {
            let namespaces = match &object.namespaces {
                Some(namespaces) if !namespaces.is_empty() => namespaces.clone(),
                _ => vec![namespace_id_to_string(object.namespace.as_ref())],
            };
            source.insert(
                NAMESPACES_FIELD.to_string(),
                Value::Array(namespaces.into_iter().map(Value::String).collect()),
            );
        }

        if let Some(origin_id) = &object.origin_id {
            source.insert(ORIGIN_ID_FIELD.to_string(), Value::String(origin_id.clone()));
        }
        if !object.migration_version.is_empty() {
            let map = object
                .migration_version
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.to_string())))
                .collect();
            source.insert(MIGRATION_VERSION_FIELD.to_string(), Value::Object(map));
        }
        if let Some(version) = object.core_migration_version {
            source.insert(
                CORE_MIGRATION_VERSION_FIELD.to_string(),
                Value::String(version.to_string()),
            );
        }
        if let Some(version) = object.type_migration_version {
            source.insert(
                TYPE_MIGRATION_VERSION_FIELD.to_string(),
                Value::String(version.to_string()),
            );
        }
        if let Some(updated_at) = object.updated_at {
            source.insert(UPDATED_AT_FIELD.to_string(), Value::String(format_timestamp(updated_at)));
        }
        if let Some(created_at) = object.created_at {
            source.insert(CREATED_AT_FIELD.to_string(), Value::String(format_timestamp(created_at)));
        }

        let version = object.version.as_ref().map(|v| v.sequence_version());
        Ok(RawDocument {
            id: raw_id,
            source,
            seq_no: version.map(|v| v.seq_no),
            primary_term: version.map(|v| v.primary_term),
        })
    }

    /// Strips the raw id prefix implied by the source, returning the
    /// namespace and logical id.
    fn trim_id_prefix(
        &self,
        raw: &RawDocument,
        type_name: &str,
        treatment: NamespaceTreatment,
    ) -> Result<(Option<Namespace>, String), SerializationError> {
        let source_namespace = if self.registry.is_single_namespace(type_name) {
            raw.str_field(NAMESPACE_FIELD)
                .map(Namespace::new)
                .transpose()
                .map_err(|e| invalid_field(raw, NAMESPACE_FIELD, &e.to_string()))?
        } else {
            None
        };

        let expected = self.generate_raw_id(source_namespace.as_ref(), type_name, "");
        if let Some(id) = raw.id.strip_prefix(&expected)
            && !id.is_empty()
        {
            return Ok((source_namespace, id.to_string()));
        }

        if treatment == NamespaceTreatment::Lax
            && let Ok(parts) = self.parse_raw_id(&raw.id)
            && parts.type_name == type_name
        {
            return Ok((parts.namespace.or(source_namespace), parts.id));
        }

        Err(SerializationError::InvalidRawId {
            raw_id: raw.id.clone(),
            message: format!("expected prefix '{}'", expected),
        })
    }
}

fn invalid_field(raw: &RawDocument, field: &str, message: &str) -> SerializationError {
    SerializationError::InvalidField {
        raw_id: raw.id.clone(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_version_field(
    raw: &RawDocument,
    field: &str,
) -> Result<Option<MigrationVersion>, SerializationError> {
    match raw.source.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|e: crate::error::ConfigError| invalid_field(raw, field, &e.to_string())),
        Some(_) => Err(invalid_field(raw, field, "expected a version string")),
    }
}

fn parse_timestamp_field(
    raw: &RawDocument,
    field: &str,
) -> Result<Option<DateTime<Utc>>, SerializationError> {
    match raw.source.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| invalid_field(raw, field, &e.to_string())),
        Some(_) => Err(invalid_field(raw, field, "expected an RFC 3339 timestamp")),
    }
}

/// Formats a timestamp the way it is stored (`2024-01-02T03:04:05.000Z`).
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NamespaceType, SavedObjectType};
    use crate::version::encode_version;
    use serde_json::json;

    fn serializer() -> SavedObjectsSerializer {
        let registry = TypeRegistry::builder()
            .register(SavedObjectType::new("config", NamespaceType::Single))
            .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
            .register(SavedObjectType::new("space", NamespaceType::Agnostic))
            .build()
            .unwrap();
        SavedObjectsSerializer::new(Arc::new(registry))
    }

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    fn raw(id: &str, source: Value) -> RawDocument {
        RawDocument::new(id, source.as_object().cloned().unwrap())
    }

    #[test]
    fn test_generate_raw_id() {
        let s = serializer();
        assert_eq!(s.generate_raw_id(None, "config", "1"), "config:1");
        assert_eq!(s.generate_raw_id(Some(&ns("ops")), "config", "1"), "ops:config:1");
        assert_eq!(s.generate_raw_id(Some(&ns("ops")), "dashboard", "1"), "dashboard:1");
        assert_eq!(s.generate_raw_id(Some(&ns("ops")), "space", "1"), "space:1");
    }

    #[test]
    fn test_parse_raw_id_round_trip() {
        let s = serializer();
        let cases = [
            (None, "config", "1"),
            (Some(ns("ops")), "config", "a:b"),
            (None, "dashboard", "xyz"),
            (None, "dashboard", "config:c1"),
            (None, "space", "s"),
        ];
        for (namespace, type_name, id) in cases {
            let raw_id = s.generate_raw_id(namespace.as_ref(), type_name, id);
            let parts = s.parse_raw_id(&raw_id).unwrap();
            assert_eq!(parts.namespace, namespace);
            assert_eq!(parts.type_name, type_name);
            assert_eq!(parts.id, id);
        }
    }

    #[test]
    fn test_parse_raw_id_rejects_malformed() {
        let s = serializer();
        for raw_id in ["noseparator", "config:", "ops:unknown:1", "ops:dashboard:1", "ops:config:"] {
            assert!(s.parse_raw_id(raw_id).is_err(), "{:?} should not parse", raw_id);
        }
    }

    #[test]
    fn test_to_raw_single_namespace() {
        let s = serializer();
        let mut object = SavedObject::new("config", "c1", json!({"theme": "dark"}));
        object.namespace = Some(ns("ops"));
        object.type_migration_version = Some(MigrationVersion::new(8, 0, 0));
        object.version = Some(encode_version(5, 1));

        let raw = s.saved_object_to_raw(&object).unwrap();
        assert_eq!(raw.id, "ops:config:c1");
        assert_eq!(raw.source["type"], "config");
        assert_eq!(raw.source["config"]["theme"], "dark");
        assert_eq!(raw.source["namespace"], "ops");
        assert_eq!(raw.source["typeMigrationVersion"], "8.0.0");
        assert_eq!(raw.source["references"], json!([]));
        assert!(raw.source.get("namespaces").is_none());
        assert_eq!((raw.seq_no, raw.primary_term), (Some(5), Some(1)));
    }

    #[test]
    fn test_to_raw_multi_namespace_defaults_membership() {
        let s = serializer();
        let mut object = SavedObject::new("dashboard", "d1", json!({}));
        object.namespace = Some(ns("ops"));
        let raw = s.saved_object_to_raw(&object).unwrap();
        assert_eq!(raw.id, "dashboard:d1");
        assert_eq!(raw.source["namespaces"], json!(["ops"]));
        assert!(raw.source.get("namespace").is_none());

        let default_ns = SavedObject::new("dashboard", "d2", json!({}));
        let raw = s.saved_object_to_raw(&default_ns).unwrap();
        assert_eq!(raw.source["namespaces"], json!(["default"]));
    }

    #[test]
    fn test_to_raw_rejects_non_object_attributes() {
        let s = serializer();
        let object = SavedObject::new("config", "c1", json!("nope"));
        assert!(matches!(
            s.saved_object_to_raw(&object),
            Err(SerializationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_raw_to_saved_object_round_trip() {
        let s = serializer();
        let mut object = SavedObject::new("config", "c1", json!({"theme": "dark"}));
        object.namespace = Some(ns("ops"));
        object.namespaces = Some(vec!["ops".to_string()]);
        object.references = vec![SavedObjectReference::new("r", "dashboard", "d1")];
        object.type_migration_version = Some(MigrationVersion::new(8, 0, 0));
        object.core_migration_version = Some(MigrationVersion::new(8, 1, 0));
        object.origin_id = Some("orig".to_string());
        object.updated_at = Some(
            DateTime::parse_from_rfc3339("2024-01-02T03:04:05.000Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        object.version = Some(encode_version(3, 2));

        let raw = s.saved_object_to_raw(&object).unwrap();
        let back = s.raw_to_saved_object(&raw, RawDocParseOptions::default()).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_raw_to_saved_object_strict_prefix() {
        let s = serializer();
        let doc = raw("config:c1", json!({"type": "config", "namespace": "ops", "config": {}}));
        assert!(matches!(
            s.raw_to_saved_object(&doc, RawDocParseOptions::default()),
            Err(SerializationError::InvalidRawId { .. })
        ));
        assert!(!s.is_raw_saved_object(&doc, RawDocParseOptions::default()));
    }

    #[test]
    fn test_raw_to_saved_object_lax_prefix() {
        let s = serializer();
        let doc = raw("config:c1", json!({"type": "config", "namespace": "ops", "config": {}}));
        let options = RawDocParseOptions {
            namespace_treatment: NamespaceTreatment::Lax,
            ..Default::default()
        };
        let object = s.raw_to_saved_object(&doc, options).unwrap();
        assert_eq!(object.id, "c1");
        assert_eq!(object.namespace, Some(ns("ops")));
        assert!(s.is_raw_saved_object(&doc, options));
    }

    #[test]
    fn test_raw_to_saved_object_missing_type() {
        let s = serializer();
        let doc = raw("config:c1", json!({"config": {}}));
        assert!(matches!(
            s.raw_to_saved_object(&doc, RawDocParseOptions::default()),
            Err(SerializationError::MissingField { .. })
        ));
        assert!(!s.is_raw_saved_object(&doc, RawDocParseOptions::default()));
    }

    #[test]
    fn test_raw_to_saved_object_requires_both_version_halves() {
        let s = serializer();
        let mut doc = raw("config:c1", json!({"type": "config", "config": {}}));
        doc.seq_no = Some(1);
        assert!(s.raw_to_saved_object(&doc, RawDocParseOptions::default()).is_err());
    }

    #[test]
    fn test_migration_version_compatibility() {
        let s = serializer();
        let doc = raw(
            "dashboard:d1",
            json!({"type": "dashboard", "dashboard": {}, "namespaces": ["default"], "typeMigrationVersion": "8.0.0"}),
        );

        let raw_mode = s.raw_to_saved_object(&doc, RawDocParseOptions::default()).unwrap();
        assert!(raw_mode.migration_version.is_empty());

        let compatible = s
            .raw_to_saved_object(
                &doc,
                RawDocParseOptions {
                    migration_version_compatibility: MigrationVersionCompatibility::Compatible,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            compatible.migration_version.get("dashboard"),
            Some(&MigrationVersion::new(8, 0, 0))
        );
        assert_eq!(compatible.namespaces, Some(vec!["default".to_string()]));
    }

    #[test]
    fn test_agnostic_has_no_namespaces() {
        let s = serializer();
        let doc = raw("space:s1", json!({"type": "space", "space": {"name": "S"}}));
        let object = s.raw_to_saved_object(&doc, RawDocParseOptions::default()).unwrap();
        assert!(object.namespace.is_none());
        assert!(object.namespaces.is_none());
    }
}
