//! Version-tagged document transforms.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::types::RawDocument;

use super::MigrationVersion;

/// Context handed to a transform while it runs.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Type being migrated.
    pub type_name: String,
    /// Version the transform starts from.
    pub from_version: MigrationVersion,
    /// Version the transform produces.
    pub to_version: MigrationVersion,
    /// Software version performing the migration.
    pub software_version: MigrationVersion,
}

/// A pure function from one schema revision of a raw document to the next.
pub type TransformFn =
    Arc<dyn Fn(RawDocument, &TransformContext) -> Result<RawDocument, BoxError> + Send + Sync>;

/// Identifies one transform in error messages and logs as `{type}:{from}->{to}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformId {
    /// Type the transform belongs to.
    pub type_name: String,
    /// Source version.
    pub from_version: MigrationVersion,
    /// Target version.
    pub to_version: MigrationVersion,
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}",
            self.type_name, self.from_version, self.to_version
        )
    }
}

/// A schema migration step registered for one saved object type.
///
/// # Examples
///
/// ```
/// use helios_saved_objects::migration::{MigrationTransform, MigrationVersion};
///
/// let rename_title = MigrationTransform::new(
///     "dashboard",
///     MigrationVersion::new(1, 0, 0),
///     MigrationVersion::new(2, 0, 0),
///     |mut doc, _ctx| {
///         if let Some(attrs) = doc.attributes_mut() {
///             if let Some(title) = attrs.remove("name") {
///                 attrs.insert("title".to_string(), title);
///             }
///         }
///         Ok(doc)
///     },
/// );
/// assert_eq!(rename_title.id().to_string(), "dashboard:1.0.0->2.0.0");
/// ```
#[derive(Clone)]
pub struct MigrationTransform {
    type_name: String,
    from_version: MigrationVersion,
    to_version: MigrationVersion,
    transform: TransformFn,
}

impl MigrationTransform {
    /// Creates a transform for `type_name` taking documents from `from_version`
    /// to `to_version`.
    pub fn new<F>(
        type_name: impl Into<String>,
        from_version: MigrationVersion,
        to_version: MigrationVersion,
        transform: F,
    ) -> Self
    where
        F: Fn(RawDocument, &TransformContext) -> Result<RawDocument, BoxError> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            from_version,
            to_version,
            transform: Arc::new(transform),
        }
    }

    /// Returns the type this transform migrates.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the source version.
    pub fn from_version(&self) -> MigrationVersion {
        self.from_version
    }

    /// Returns the target version.
    pub fn to_version(&self) -> MigrationVersion {
        self.to_version
    }

    /// Returns the identifier used in errors and logs.
    pub fn id(&self) -> TransformId {
        TransformId {
            type_name: self.type_name.clone(),
            from_version: self.from_version,
            to_version: self.to_version,
        }
    }

    pub(crate) fn apply(
        &self,
        doc: RawDocument,
        software_version: MigrationVersion,
    ) -> Result<RawDocument, BoxError> {
        let ctx = TransformContext {
            type_name: self.type_name.clone(),
            from_version: self.from_version,
            to_version: self.to_version,
            software_version,
        };
        (self.transform)(doc, &ctx)
    }
}

impl fmt::Debug for MigrationTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationTransform")
            .field("type_name", &self.type_name)
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn test_transform_id_display() {
        let id = TransformId {
            type_name: "map".to_string(),
            from_version: MigrationVersion::new(7, 9, 0),
            to_version: MigrationVersion::new(7, 10, 0),
        };
        assert_eq!(id.to_string(), "map:7.9.0->7.10.0");
    }

    #[test]
    fn test_apply_passes_context() {
        let transform = MigrationTransform::new(
            "map",
            MigrationVersion::new(1, 0, 0),
            MigrationVersion::new(2, 0, 0),
            |mut doc, ctx| {
                doc.source
                    .insert("seen".to_string(), json!(ctx.to_version.to_string()));
                Ok(doc)
            },
        );
        let doc = RawDocument::new("map:1", Map::new());
        let out = transform.apply(doc, MigrationVersion::new(8, 0, 0)).unwrap();
        assert_eq!(out.source["seen"], "2.0.0");
    }

    #[test]
    fn test_debug_hides_closure() {
        let transform = MigrationTransform::new(
            "map",
            MigrationVersion::new(1, 0, 0),
            MigrationVersion::new(2, 0, 0),
            |doc, _| Ok(doc),
        );
        let debug = format!("{:?}", transform);
        assert!(debug.contains("MigrationTransform"));
        assert!(debug.contains("map"));
    }
}
