//! Saved object type definitions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BoxError;
use crate::migration::{MigrationTransform, MigrationVersion, TransformContext};
use crate::types::RawDocument;

/// How a type's objects relate to namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceType {
    /// Each object lives in exactly one namespace, encoded in its raw id.
    Single,
    /// Objects can be shared into several namespaces.
    Multiple,
    /// Objects are stored the multi-namespace way but live in one namespace.
    MultipleIsolated,
    /// Objects exist outside of any namespace.
    Agnostic,
}

impl NamespaceType {
    /// Returns `true` for types whose membership is the `namespaces` array.
    pub fn is_multi_namespace(self) -> bool {
        matches!(self, NamespaceType::Multiple | NamespaceType::MultipleIsolated)
    }
}

impl fmt::Display for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceType::Single => write!(f, "single"),
            NamespaceType::Multiple => write!(f, "multiple"),
            NamespaceType::MultipleIsolated => write!(f, "multiple-isolated"),
            NamespaceType::Agnostic => write!(f, "agnostic"),
        }
    }
}

/// Checks a type's attributes after migration and before every write.
pub type AttributeValidator = Arc<dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// A registered saved object type.
///
/// # Examples
///
/// ```
/// use helios_saved_objects::registry::{NamespaceType, SavedObjectType};
/// use helios_saved_objects::migration::MigrationVersion;
///
/// let dashboard = SavedObjectType::new("dashboard", NamespaceType::Multiple)
///     .with_migration(MigrationVersion::new(1, 0, 0), MigrationVersion::new(2, 0, 0), |doc, _| Ok(doc))
///     .with_validator(|attrs| {
///         if attrs.contains_key("title") {
///             Ok(())
///         } else {
///             Err("title is required".to_string())
///         }
///     });
///
/// assert_eq!(dashboard.target_version(), Some(MigrationVersion::new(2, 0, 0)));
/// ```
#[derive(Clone)]
pub struct SavedObjectType {
    name: String,
    namespace_type: NamespaceType,
    hidden: bool,
    index_pattern: Option<String>,
    migrations: Vec<MigrationTransform>,
    model_version: Option<MigrationVersion>,
    validator: Option<AttributeValidator>,
}

impl SavedObjectType {
    /// Creates a visible type with no migrations.
    pub fn new(name: impl Into<String>, namespace_type: NamespaceType) -> Self {
        Self {
            name: name.into(),
            namespace_type,
            hidden: false,
            index_pattern: None,
            migrations: Vec::new(),
            model_version: None,
            validator: None,
        }
    }

    /// Marks the type hidden. Hidden types are only reachable through
    /// repositories that explicitly include them.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Stores the type's documents in a dedicated index.
    pub fn with_index_pattern(mut self, index: impl Into<String>) -> Self {
        self.index_pattern = Some(index.into());
        self
    }

    /// Registers a migration step.
    pub fn with_migration<F>(
        mut self,
        from_version: MigrationVersion,
        to_version: MigrationVersion,
        transform: F,
    ) -> Self
    where
        F: Fn(RawDocument, &TransformContext) -> Result<RawDocument, BoxError> + Send + Sync + 'static,
    {
        self.migrations.push(MigrationTransform::new(
            self.name.clone(),
            from_version,
            to_version,
            transform,
        ));
        self
    }

    /// Sets the schema version documents are stamped with once migrated.
    ///
    /// Defaults to the highest `to_version` of the registered migrations.
    pub fn with_model_version(mut self, version: MigrationVersion) -> Self {
        self.model_version = Some(version);
        self
    }

    /// Sets the attribute validator.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Returns the type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the namespace type.
    pub fn namespace_type(&self) -> NamespaceType {
        self.namespace_type
    }

    /// Returns `true` if the type is hidden.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Returns the dedicated index, if any.
    pub fn index_pattern(&self) -> Option<&str> {
        self.index_pattern.as_deref()
    }

    /// Returns the registered migrations in registration order.
    pub fn migrations(&self) -> &[MigrationTransform] {
        &self.migrations
    }

    /// Returns the explicit model version, if set.
    pub fn model_version(&self) -> Option<MigrationVersion> {
        self.model_version
    }

    /// Returns the version migrated documents end up at.
    ///
    /// `None` means the type has never declared a schema version.
    pub fn target_version(&self) -> Option<MigrationVersion> {
        let latest_transform = self.migrations.iter().map(|m| m.to_version()).max();
        match (self.model_version, latest_transform) {
            (Some(model), Some(latest)) => Some(model.max(latest)),
            (model, latest) => model.or(latest),
        }
    }

    /// Runs the validator, if one is registered.
    pub fn validate_attributes(&self, attributes: &Map<String, Value>) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator(attributes),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SavedObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedObjectType")
            .field("name", &self.name)
            .field("namespace_type", &self.namespace_type)
            .field("hidden", &self.hidden)
            .field("index_pattern", &self.index_pattern)
            .field("migrations", &self.migrations)
            .field("model_version", &self.model_version)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}
