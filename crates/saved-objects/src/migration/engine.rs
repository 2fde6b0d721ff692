//! The document migration engine.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::error::{ConfigError, SerializationError, StorageResult, TransformError};
use crate::registry::TypeRegistry;
use crate::serialization::SavedObjectsSerializer;
use crate::types::{
    CORE_MIGRATION_VERSION_FIELD, MIGRATION_VERSION_FIELD, NAMESPACE_FIELD, RawDocument,
    TYPE_MIGRATION_VERSION_FIELD,
};

use super::{MigrationTransform, MigrationVersion, TransformId};

/// How a document without a recorded schema version is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingVersionPolicy {
    /// The document predates versioning and runs the full chain from its
    /// first transform. Used on read.
    AssumeUnmigrated,
    /// The document was just written with current-schema attributes and is
    /// only stamped. Used on create.
    AssumeLatest,
}

/// Where a document stands relative to its type's target version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Recorded version is below the target.
    Unmigrated,
    /// Recorded version equals the target.
    Migrated,
    /// Recorded version is above the target (written by newer software).
    AheadOfTarget,
}

/// What [`MigrationEngine::migrate`] did to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Already at the target version; returned unchanged.
    UpToDate,
    /// Transformed and stamped with the target version.
    Migrated {
        /// Transforms applied, in order.
        applied: Vec<TransformId>,
    },
    /// Recorded version is newer than this software knows; returned unchanged.
    AheadOfTarget {
        /// Version found on the document.
        recorded: MigrationVersion,
        /// This software's target for the type.
        target: MigrationVersion,
    },
}

/// A migrated document together with what happened to it.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// The resulting document.
    pub document: RawDocument,
    /// What the engine did.
    pub outcome: MigrationOutcome,
}

#[derive(Debug, Clone)]
struct TypeChain {
    transforms: Vec<MigrationTransform>,
    target: MigrationVersion,
}

/// Applies registered transforms to bring raw documents to their type's
/// target version.
///
/// The engine is immutable once built and cheap to share. Migration works on
/// an owned copy of the input, so a failed chain never leaves a partially
/// migrated document behind.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    chains: Arc<HashMap<String, TypeChain>>,
    serializer: SavedObjectsSerializer,
    software_version: MigrationVersion,
}

impl MigrationEngine {
    /// Builds the engine from every type's migrations.
    ///
    /// Fails when a transform does not move forward (`from >= to`), when two
    /// ranges of the same type overlap, or when an explicit model version is
    /// below the last transform.
    pub fn new(
        registry: Arc<TypeRegistry>,
        software_version: MigrationVersion,
    ) -> Result<Self, ConfigError> {
        let mut chains = HashMap::new();

        for saved_object_type in registry.all_types() {
            let Some(target) = saved_object_type.target_version() else {
                continue;
            };
            let type_name = saved_object_type.name();
            let mut transforms = saved_object_type.migrations().to_vec();
            validate_chain(type_name, &mut transforms)?;

            if let (Some(model), Some(last)) = (saved_object_type.model_version(), transforms.last())
                && model < last.to_version()
            {
                return Err(ConfigError::InvalidMigration {
                    type_name: type_name.to_string(),
                    message: format!(
                        "model version {} is below the last migration target {}",
                        model,
                        last.to_version()
                    ),
                });
            }

            chains.insert(type_name.to_string(), TypeChain { transforms, target });
        }

        Ok(Self {
            chains: Arc::new(chains),
            serializer: SavedObjectsSerializer::new(registry),
            software_version,
        })
    }

    /// Returns the software version stamped as `coreMigrationVersion`.
    pub fn software_version(&self) -> MigrationVersion {
        self.software_version
    }

    /// Returns the target version of a type, if it declares one.
    pub fn target_version(&self, type_name: &str) -> Option<MigrationVersion> {
        self.chains.get(type_name).map(|chain| chain.target)
    }

    /// Classifies a document against its type's target.
    ///
    /// Documents without a recorded version count as unmigrated.
    pub fn state_of(&self, raw: &RawDocument) -> StorageResult<DocumentState> {
        let type_name = document_type(raw)?;
        let Some(chain) = self.chains.get(type_name) else {
            return Ok(DocumentState::Migrated);
        };
        let state = match recorded_version(raw)? {
            None => DocumentState::Unmigrated,
            Some(v) if v < chain.target => DocumentState::Unmigrated,
            Some(v) if v == chain.target => DocumentState::Migrated,
            Some(_) => DocumentState::AheadOfTarget,
        };
        Ok(state)
    }

    /// Migrates a raw document to its type's target version.
    ///
    /// Transforms are applied in `to_version` order, skipping those the
    /// document is already past. A transform starting above the current
    /// version is a gap in the chain and fails with
    /// [`TransformError::MissingTransform`]. The first transform error aborts
    /// with [`TransformError::TransformFailed`].
    pub fn migrate(
        &self,
        raw: &RawDocument,
        policy: MissingVersionPolicy,
    ) -> StorageResult<MigrationResult> {
        let type_name = document_type(raw)?;
        let Some(chain) = self.chains.get(type_name) else {
            return Ok(MigrationResult {
                document: raw.clone(),
                outcome: MigrationOutcome::UpToDate,
            });
        };

        let recorded = recorded_version(raw)?;
        let mut current = match (recorded, policy) {
            (Some(v), _) => v,
            (None, MissingVersionPolicy::AssumeUnmigrated) => chain
                .transforms
                .first()
                .map(MigrationTransform::from_version)
                .unwrap_or(MigrationVersion::ZERO),
            (None, MissingVersionPolicy::AssumeLatest) => chain.target,
        };

        if current > chain.target {
            debug!(
                type_name = %type_name,
                raw_id = %raw.id,
                recorded = %current,
                target = %chain.target,
                "Document is ahead of this software's target version"
            );
            return Ok(MigrationResult {
                document: raw.clone(),
                outcome: MigrationOutcome::AheadOfTarget {
                    recorded: current,
                    target: chain.target,
                },
            });
        }
        if recorded == Some(chain.target) {
            return Ok(MigrationResult {
                document: raw.clone(),
                outcome: MigrationOutcome::UpToDate,
            });
        }

        let mut doc = raw.clone();
        let mut applied = Vec::new();

        for transform in &chain.transforms {
            if transform.to_version() <= current {
                continue;
            }
            if transform.from_version() > current {
                let (id, namespace) = self.error_identity(raw);
                return Err(TransformError::MissingTransform {
                    id,
                    type_name: type_name.to_string(),
                    namespace,
                    from_version: current.to_string(),
                    target_version: chain.target.to_string(),
                }
                .into());
            }

            debug!(
                type_name = %type_name,
                raw_id = %raw.id,
                transform = %transform.id(),
                "Applying migration"
            );
            doc = match transform.apply(doc, self.software_version) {
                Ok(next) if next.type_name() == Some(type_name) => next,
                Ok(_) => {
                    return Err(self.transform_failed(
                        raw,
                        transform,
                        "transform changed or removed the document type".into(),
                    ));
                }
                Err(source) => return Err(self.transform_failed(raw, transform, source)),
            };
            current = transform.to_version();
            set_version(&mut doc, TYPE_MIGRATION_VERSION_FIELD, current);
            applied.push(transform.id());
        }

        set_version(&mut doc, TYPE_MIGRATION_VERSION_FIELD, chain.target);
        set_version(&mut doc, CORE_MIGRATION_VERSION_FIELD, self.software_version);
        doc.source.remove(MIGRATION_VERSION_FIELD);

        Ok(MigrationResult {
            document: doc,
            outcome: MigrationOutcome::Migrated { applied },
        })
    }

    fn transform_failed(
        &self,
        raw: &RawDocument,
        transform: &MigrationTransform,
        source: crate::error::BoxError,
    ) -> crate::error::SavedObjectsError {
        let (id, namespace) = self.error_identity(raw);
        error!(
            type_name = %transform.type_name(),
            id = %id,
            transform = %transform.id(),
            error = %source,
            "Migration transform failed"
        );
        TransformError::TransformFailed {
            id,
            type_name: transform.type_name().to_string(),
            namespace,
            transform: transform.id(),
            source,
        }
        .into()
    }

    /// Logical id and namespace of a document for error reporting.
    fn error_identity(&self, raw: &RawDocument) -> (String, Option<String>) {
        let parsed = self.serializer.parse_raw_id(&raw.id).ok();
        let id = parsed
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_else(|| raw.id.clone());
        let namespace = parsed
            .and_then(|p| p.namespace)
            .map(|ns| ns.to_string())
            .or_else(|| raw.str_field(NAMESPACE_FIELD).map(str::to_string))
            .or_else(|| raw.namespaces().into_iter().next());
        (id, namespace)
    }
}

/// Sorts a type's transforms and checks that the ranges move strictly forward
/// without overlapping.
fn validate_chain(type_name: &str, transforms: &mut [MigrationTransform]) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidMigration {
        type_name: type_name.to_string(),
        message,
    };

    for transform in transforms.iter() {
        if transform.type_name() != type_name {
            return Err(invalid(format!(
                "migration {} is registered under the wrong type",
                transform.id()
            )));
        }
        if transform.from_version() >= transform.to_version() {
            return Err(invalid(format!(
                "migration {} does not move forward",
                transform.id()
            )));
        }
    }

    transforms.sort_by_key(|t| t.to_version());
    for pair in transforms.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.from_version() < prev.to_version() {
            return Err(invalid(format!(
                "migrations {} and {} overlap",
                prev.id(),
                next.id()
            )));
        }
    }
    Ok(())
}

fn document_type(raw: &RawDocument) -> Result<&str, SerializationError> {
    raw.type_name().ok_or_else(|| SerializationError::MissingField {
        raw_id: raw.id.clone(),
        field: "type".to_string(),
    })
}

fn recorded_version(raw: &RawDocument) -> Result<Option<MigrationVersion>, SerializationError> {
    raw.recorded_type_version()
        .map(|v| {
            v.parse().map_err(|e: ConfigError| SerializationError::InvalidField {
                raw_id: raw.id.clone(),
                field: TYPE_MIGRATION_VERSION_FIELD.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn set_version(doc: &mut RawDocument, field: &str, version: MigrationVersion) {
    doc.source
        .insert(field.to_string(), Value::String(version.to_string()));
}
