//! The saved objects repository.
//!
//! [`SavedObjectsRepository`] is the public create/get/update/delete/bulk API.
//! It sits on top of a [`DocumentStoreClient`] and wires the other modules
//! together:
//!
//! ```text
//! write: caller ─► migrate (stamp) ─► validate ─► serialize ─► store
//! read:  store ─► product check ─► migrate ─► deserialize ─► caller
//! ```
//!
//! Every call takes a [`RequestContext`] and checks the target type against
//! the repository's allowed types (the registry's visible types plus the
//! configured hidden ones), narrowed by the context's permissions. A type the
//! caller may not see reads as not found; creating one is a bad request.
//!
//! Concurrency is optimistic. Writes carry `if_seq_no`/`if_primary_term`
//! taken from the caller's version token or from a preflight read, and a lost
//! race surfaces as a conflict. Nothing is cached between calls.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_saved_objects::client::InMemoryStore;
//! use helios_saved_objects::config::SavedObjectsConfig;
//! use helios_saved_objects::context::RequestContext;
//! use helios_saved_objects::registry::{NamespaceType, SavedObjectType, TypeRegistry};
//! use helios_saved_objects::repository::{CreateOptions, GetOptions, SavedObjectsRepository};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TypeRegistry::builder()
//!     .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
//!     .build()?;
//! let repository = SavedObjectsRepository::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(registry),
//!     SavedObjectsConfig::default(),
//! )?;
//! let ctx = RequestContext::internal();
//!
//! let created = repository
//!     .create(&ctx, "dashboard", json!({"title": "Sales"}), CreateOptions::default())
//!     .await?;
//! let read = repository
//!     .get(&ctx, "dashboard", &created.id, GetOptions::default())
//!     .await?;
//! assert_eq!(read.version, created.version);
//! # Ok(())
//! # }
//! ```

mod bulk;
mod create;
mod delete;
mod get;
mod options;
mod update;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

pub use options::{
    BulkCreateObject, BulkCreateOptions, BulkCreateResponse, BulkDeleteOptions,
    BulkDeleteResponse, BulkDeleteStatus, BulkGetOptions, BulkGetResponse, BulkObjectRef,
    CreateOptions, DeleteOptions, GetOptions, UpdateOptions,
};

use crate::client::{
    DocumentStoreClient, GetRequest, OpType, PRODUCT_HEADER, RefreshPolicy, StoreHit,
    StoreResponse, WriteResult,
};
use crate::config::SavedObjectsConfig;
use crate::context::{Operation, RequestContext};
use crate::error::{
    BackendError, ConcurrencyError, ConfigError, RequestError, SavedObjectsError,
    StorageResult, ValidationError,
};
use crate::migration::{MigrationEngine, MissingVersionPolicy};
use crate::namespace::{ALL_NAMESPACES_STRING, Namespace, is_all_namespaces, namespace_id_to_string};
use crate::registry::TypeRegistry;
use crate::serialization::{
    MigrationVersionCompatibility, RawDocParseOptions, SavedObjectsSerializer,
};
use crate::types::{NAMESPACE_FIELD, RawDocument, SavedObject};
use crate::usage::{UsageCounter, UsageCounterEvent, notify};
use crate::version::SequenceVersion;

/// The typed saved objects API over a document store.
pub struct SavedObjectsRepository {
    client: Arc<dyn DocumentStoreClient>,
    registry: Arc<TypeRegistry>,
    serializer: SavedObjectsSerializer,
    migrator: MigrationEngine,
    allowed_types: BTreeSet<String>,
    config: SavedObjectsConfig,
    usage_counter: Option<Arc<dyn UsageCounter>>,
}

impl std::fmt::Debug for SavedObjectsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedObjectsRepository")
            .field("client", &self.client.name())
            .field("allowed_types", &self.allowed_types)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SavedObjectsRepository {
    /// Creates a repository.
    ///
    /// Fails if a configured hidden type is not registered or if the
    /// registry's migrations are inconsistent.
    pub fn new(
        client: Arc<dyn DocumentStoreClient>,
        registry: Arc<TypeRegistry>,
        config: SavedObjectsConfig,
    ) -> StorageResult<Self> {
        let mut allowed_types: BTreeSet<String> = registry
            .visible_types()
            .into_iter()
            .map(str::to_string)
            .collect();
        for hidden in &config.included_hidden_types {
            if !registry.has_type(hidden) {
                return Err(ConfigError::InvalidType {
                    type_name: hidden.clone(),
                    message: "included hidden type is not registered".to_string(),
                }
                .into());
            }
            allowed_types.insert(hidden.clone());
        }

        let migrator = MigrationEngine::new(Arc::clone(&registry), config.software_version)?;

        Ok(Self {
            client,
            serializer: SavedObjectsSerializer::new(Arc::clone(&registry)),
            registry,
            migrator,
            allowed_types,
            config,
            usage_counter: None,
        })
    }

    /// Reports successful mutating calls to `counter`.
    pub fn with_usage_counter(mut self, counter: Arc<dyn UsageCounter>) -> Self {
        self.usage_counter = Some(counter);
        self
    }

    /// Returns the types this repository exposes, before caller permissions.
    pub fn allowed_types(&self) -> impl Iterator<Item = &str> {
        self.allowed_types.iter().map(String::as_str)
    }

    /// Returns the serializer.
    pub fn serializer(&self) -> &SavedObjectsSerializer {
        &self.serializer
    }

    /// Returns the migration engine.
    pub fn migrator(&self) -> &MigrationEngine {
        &self.migrator
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SavedObjectsConfig {
        &self.config
    }

    // ========================================================================
    // Access checks
    // ========================================================================

    fn is_type_allowed(&self, ctx: &RequestContext, type_name: &str) -> bool {
        self.allowed_types.contains(type_name) && ctx.can_access_type(type_name)
    }

    /// Checks access for operations on existing objects. Invisible types read
    /// as not found.
    fn check_existing_access(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        type_name: &str,
        id: &str,
    ) -> StorageResult<()> {
        if !self.is_type_allowed(ctx, type_name) {
            debug!(type_name = %type_name, id = %id, "Type not allowed; reporting not found");
            return Err(SavedObjectsError::not_found(type_name, id));
        }
        ctx.check_operation(operation, type_name)?;
        Ok(())
    }

    /// Checks access for creates. Invisible types are unsupported.
    fn check_create_access(&self, ctx: &RequestContext, type_name: &str) -> StorageResult<()> {
        if !self.is_type_allowed(ctx, type_name) {
            return Err(RequestError::UnsupportedType {
                type_name: type_name.to_string(),
            }
            .into());
        }
        ctx.check_operation(Operation::Create, type_name)?;
        Ok(())
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    fn index_for(&self, type_name: &str) -> String {
        self.registry
            .index_for_type(type_name, &self.config.index)
            .to_string()
    }

    fn refresh(&self, requested: Option<RefreshPolicy>) -> RefreshPolicy {
        requested.unwrap_or(self.config.default_refresh)
    }

    fn notify(&self, operation: Operation, counts: BTreeMap<String, u64>) {
        for (type_name, count) in counts {
            notify(
                self.usage_counter.as_ref(),
                UsageCounterEvent::new(&operation.to_string(), &type_name, count),
            );
        }
    }

    fn notify_one(&self, operation: Operation, type_name: &str) {
        self.notify(operation, BTreeMap::from([(type_name.to_string(), 1)]));
    }

    /// Parses a caller namespace for an operation that must target one namespace.
    fn parse_namespace(
        &self,
        operation: &str,
        namespace: Option<&str>,
    ) -> StorageResult<Option<Namespace>> {
        if is_all_namespaces(namespace) {
            return Err(RequestError::WildcardNamespace {
                operation: operation.to_string(),
            }
            .into());
        }
        let namespace = Namespace::from_option_str(namespace)?;
        if let Some(ns) = &namespace {
            self.check_namespace_name(ns.as_str())?;
        }
        Ok(namespace)
    }

    /// A namespace named after a registered type would make its raw ids
    /// indistinguishable from `{type}:{id}` ids.
    fn check_namespace_name(&self, namespace: &str) -> StorageResult<()> {
        if self.registry.has_type(namespace) {
            return Err(RequestError::InvalidNamespace {
                namespace: namespace.to_string(),
                message: "namespace cannot share its name with a saved object type".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Rejects responses that did not come from a supported store.
    fn ensure_from_store(
        &self,
        response: &StoreResponse,
        type_name: &str,
        id: &str,
    ) -> StorageResult<()> {
        if response.has_product_header() {
            return Ok(());
        }
        warn!(
            type_name = %type_name,
            id = %id,
            status = response.status,
            "Response is missing the {} header",
            PRODUCT_HEADER
        );
        if response.is_not_found() {
            Err(SavedObjectsError::not_found_es_unavailable(type_name, id))
        } else {
            Err(unavailable(response))
        }
    }

    /// Rejects multi-document responses that did not come from a supported store.
    fn ensure_bulk_from_store(&self, response: &StoreResponse) -> StorageResult<()> {
        if response.has_product_header() {
            return Ok(());
        }
        warn!(status = response.status, "Bulk response is missing the {} header", PRODUCT_HEADER);
        Err(unavailable(response))
    }

    /// Reads the current raw document, or `None` if the store says it does
    /// not exist.
    async fn preflight(
        &self,
        type_name: &str,
        id: &str,
        namespace: Option<&Namespace>,
    ) -> StorageResult<Option<RawDocument>> {
        let request = GetRequest {
            index: self.index_for(type_name),
            id: self.serializer.generate_raw_id(namespace, type_name, id),
        };
        let response = self.client.get(request).await?;
        self.ensure_from_store(&response, type_name, id)?;

        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let hit: StoreHit = serde_json::from_value(response.body)?;
        Ok(hit.into_raw())
    }

    /// Returns `true` if `raw` is visible from `namespace`.
    fn raw_in_namespace(&self, raw: &RawDocument, namespace: Option<&Namespace>) -> bool {
        let Some(type_name) = raw.type_name() else {
            return false;
        };
        if self.registry.is_namespace_agnostic(type_name) {
            return true;
        }
        let namespace_string = namespace_id_to_string(namespace);
        if self.registry.is_multi_namespace(type_name) {
            let namespaces = raw.namespaces();
            return namespaces
                .iter()
                .any(|ns| ns == &namespace_string || ns == ALL_NAMESPACES_STRING);
        }
        raw.str_field(NAMESPACE_FIELD) == namespace.map(Namespace::as_str)
    }

    /// Migrates a stored document and converts it to a saved object.
    fn read_document(
        &self,
        raw: &RawDocument,
        compatibility: MigrationVersionCompatibility,
    ) -> StorageResult<SavedObject> {
        let migrated = self
            .migrator
            .migrate(raw, MissingVersionPolicy::AssumeUnmigrated)?;
        let options = RawDocParseOptions {
            migration_version_compatibility: compatibility,
            ..Default::default()
        };
        Ok(self
            .serializer
            .raw_to_saved_object(&migrated.document, options)?)
    }

    /// Runs the type's validator on migrated attributes.
    fn validate_attributes(&self, type_name: &str, id: &str, attributes: &Value) -> StorageResult<()> {
        let Some(attributes) = attributes.as_object() else {
            return Err(ValidationError::AttributesNotObject {
                type_name: type_name.to_string(),
            }
            .into());
        };
        if let Some(saved_object_type) = self.registry.get_type(type_name) {
            saved_object_type
                .validate_attributes(attributes)
                .map_err(|message| ValidationError::InvalidAttributes {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                    message,
                })?;
        }
        Ok(())
    }
}


fn unavailable(response: &StoreResponse) -> SavedObjectsError {
    BackendError::Unavailable {
        message: format!(
            "the client noticed that the server is not a supported distribution (status {})",
            response.status
        ),
    }
    .into()
}

fn unexpected(response: &StoreResponse) -> SavedObjectsError {
    let message = response
        .error_reason()
        .map(str::to_string)
        .unwrap_or_else(|| response.body.to_string());
    BackendError::UnexpectedResponse {
        status: response.status,
        message,
    }
    .into()
}

/// Interprets the outcome of one write (single call or bulk item).
fn write_outcome(
    status: u16,
    result: &WriteResult,
    type_name: &str,
    id: &str,
    op_type: OpType,
    expected_version: Option<&str>,
) -> StorageResult<SequenceVersion> {
    match status {
        409 => {
            debug!(type_name = %type_name, id = %id, "Write rejected with a version conflict");
            Err(match (op_type, expected_version) {
                (OpType::Create, _) => ConcurrencyError::AlreadyExists {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                }
                .into(),
                (OpType::Index, expected) => {
                    SavedObjectsError::conflict(type_name, id, expected.unwrap_or("<none>"))
                }
            })
        }
        404 => {
            debug!(type_name = %type_name, id = %id, "Write target not found");
            Err(SavedObjectsError::not_found(type_name, id))
        }
        200..=299 => result.sequence_version().ok_or_else(|| {
            BackendError::UnexpectedResponse {
                status,
                message: "write response is missing _seq_no or _primary_term".to_string(),
            }
            .into()
        }),
        _ => Err(BackendError::UnexpectedResponse {
            status,
            message: result
                .error
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "write failed".to_string()),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryStore;
    use crate::registry::{NamespaceType, SavedObjectType};

    fn repository(config: SavedObjectsConfig) -> StorageResult<SavedObjectsRepository> {
        let registry = TypeRegistry::builder()
            .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
            .register(SavedObjectType::new("secret", NamespaceType::Single).hidden(true))
            .build()?;
        SavedObjectsRepository::new(Arc::new(InMemoryStore::new()), Arc::new(registry), config)
    }

    #[test]
    fn test_allowed_types_exclude_hidden_by_default() {
        let repo = repository(SavedObjectsConfig::default()).unwrap();
        assert_eq!(repo.allowed_types().collect::<Vec<_>>(), vec!["dashboard"]);
    }

    #[test]
    fn test_included_hidden_types() {
        let config = SavedObjectsConfig {
            included_hidden_types: vec!["secret".to_string()],
            ..Default::default()
        };
        let repo = repository(config).unwrap();
        assert_eq!(repo.allowed_types().collect::<Vec<_>>(), vec!["dashboard", "secret"]);
    }

    #[test]
    fn test_unknown_hidden_type_rejected() {
        let config = SavedObjectsConfig {
            included_hidden_types: vec!["nope".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            repository(config),
            Err(SavedObjectsError::Config(ConfigError::InvalidType { .. }))
        ));
    }

    #[test]
    fn test_parse_namespace() {
        let repo = repository(SavedObjectsConfig::default()).unwrap();
        assert!(repo.parse_namespace("delete", Some("*")).unwrap_err().is_bad_request());
        assert_eq!(repo.parse_namespace("get", Some("default")).unwrap(), None);
        assert!(repo.parse_namespace("get", Some("ops")).unwrap().is_some());
    }

    #[test]
    fn test_namespace_named_after_a_type_is_rejected() {
        let repo = repository(SavedObjectsConfig::default()).unwrap();
        for name in ["dashboard", "secret"] {
            let err = repo.parse_namespace("create", Some(name)).unwrap_err();
            assert!(matches!(
                err,
                SavedObjectsError::Request(RequestError::InvalidNamespace { .. })
            ));
        }
    }

    #[test]
    fn test_write_outcome() {
        let ok = WriteResult {
            seq_no: Some(3),
            primary_term: Some(1),
            ..Default::default()
        };
        assert_eq!(
            write_outcome(201, &ok, "t", "1", OpType::Create, None).unwrap(),
            SequenceVersion::new(3, 1)
        );

        let err = write_outcome(409, &WriteResult::default(), "t", "1", OpType::Create, None).unwrap_err();
        assert!(matches!(
            err,
            SavedObjectsError::Concurrency(ConcurrencyError::AlreadyExists { .. })
        ));

        let err = write_outcome(409, &WriteResult::default(), "t", "1", OpType::Index, Some("WzEsMV0="))
            .unwrap_err();
        assert!(matches!(
            err,
            SavedObjectsError::Concurrency(ConcurrencyError::VersionConflict { .. })
        ));

        assert!(write_outcome(500, &WriteResult::default(), "t", "1", OpType::Index, None).is_err());
        assert!(write_outcome(200, &WriteResult::default(), "t", "1", OpType::Index, None).is_err());
    }
}
