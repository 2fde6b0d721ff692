//! Create.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{CreateOptions, SavedObjectsRepository, unexpected, write_outcome};
use crate::client::{IndexRequest, OpType, RefreshPolicy, WriteResult};
use crate::context::{Operation, RequestContext};
use crate::error::{ConcurrencyError, RequestError, StorageResult, ValidationError};
use crate::migration::{MigrationVersion, MissingVersionPolicy};
use crate::namespace::{ALL_NAMESPACES_STRING, Namespace, namespace_id_to_string};
use crate::serialization::RawDocParseOptions;
use crate::types::{NAMESPACES_FIELD, RawDocument, SavedObject, SavedObjectReference};
use crate::version::decode_request_version;

/// Caller input shared by `create` and each `bulk_create` item.
pub(super) struct NewObject<'a> {
    pub type_name: &'a str,
    pub id: Option<&'a str>,
    pub attributes: Value,
    pub references: Vec<SavedObjectReference>,
    pub overwrite: bool,
    pub version: Option<&'a str>,
    pub migration_version: BTreeMap<String, MigrationVersion>,
    pub type_migration_version: Option<MigrationVersion>,
    pub initial_namespaces: Option<Vec<String>>,
    pub origin_id: Option<String>,
}

impl SavedObjectsRepository {
    /// Persists a new object, or replaces one when `options.overwrite` is set.
    ///
    /// The attributes are stamped with the type's current schema version (or
    /// migrated up from `options.type_migration_version`) and validated
    /// before anything is written. Without `overwrite`, an existing id fails
    /// with a conflict. With `overwrite` and `options.version`, the write only
    /// succeeds if the stored revision still matches.
    #[instrument(
        skip(self, ctx, attributes, options),
        fields(type_name = %type_name, correlation_id = ctx.correlation_id())
    )]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        attributes: Value,
        options: CreateOptions,
    ) -> StorageResult<SavedObject> {
        let namespace = self.parse_namespace("create", options.namespace.as_deref())?;
        self.check_create_access(ctx, type_name)?;

        let refresh = self.refresh(options.refresh);
        let object = NewObject {
            type_name,
            id: options.id.as_deref(),
            attributes,
            references: options.references,
            overwrite: options.overwrite,
            version: options.version.as_deref(),
            migration_version: options.migration_version,
            type_migration_version: options.type_migration_version,
            initial_namespaces: options.initial_namespaces,
            origin_id: options.origin_id,
        };
        self.create_document(object, namespace.as_ref(), refresh)
            .await
    }

    /// Prepares, preflights and writes one new object. Access checks are the
    /// caller's job.
    pub(super) async fn create_document(
        &self,
        object: NewObject<'_>,
        namespace: Option<&Namespace>,
        refresh: RefreshPolicy,
    ) -> StorageResult<SavedObject> {
        let type_name = object.type_name;
        let overwrite = object.overwrite;
        let explicit_namespaces = object.initial_namespaces.is_some();
        let (id, mut raw) = self.prepare_create(object, namespace)?;

        if overwrite
            && self.registry.is_multi_namespace(type_name)
            && let Some(existing) = self.preflight(type_name, &id, namespace).await?
        {
            if !self.raw_in_namespace(&existing, namespace) {
                debug!(type_name = %type_name, id = %id, "Existing object belongs to other namespaces");
                return Err(ConcurrencyError::AlreadyExists {
                    type_name: type_name.to_string(),
                    id,
                }
                .into());
            }
            if !explicit_namespaces {
                inherit_namespaces(&mut raw, &existing);
            }
        }

        let op_type = if overwrite { OpType::Index } else { OpType::Create };
        let expected = raw.version_token();
        let mut request = IndexRequest::from_raw(self.index_for(type_name), raw.clone(), op_type);
        request.refresh = refresh;

        let response = self.client.index(request).await?;
        self.ensure_from_store(&response, type_name, &id)?;
        let result: WriteResult = if response.is_success() {
            serde_json::from_value(response.body.clone())?
        } else if response.is_conflict() || response.is_not_found() {
            WriteResult::default()
        } else {
            return Err(unexpected(&response));
        };
        let written = write_outcome(
            response.status,
            &result,
            type_name,
            &id,
            op_type,
            expected.as_ref().map(|t| t.as_str()),
        )?;

        let mut stored = raw;
        stored.seq_no = Some(written.seq_no);
        stored.primary_term = Some(written.primary_term);
        let saved = self
            .serializer
            .raw_to_saved_object(&stored, RawDocParseOptions::default())?;

        self.notify_one(Operation::Create, type_name);
        Ok(saved)
    }

    /// Builds the raw document for a new object and returns it with its
    /// logical id. The attributes are stamped or migrated, then validated.
    pub(super) fn prepare_create(
        &self,
        object: NewObject<'_>,
        namespace: Option<&Namespace>,
    ) -> StorageResult<(String, RawDocument)> {
        let type_name = object.type_name;
        if !object.attributes.is_object() {
            return Err(ValidationError::AttributesNotObject {
                type_name: type_name.to_string(),
            }
            .into());
        }

        let id = match object.id {
            Some("") => {
                return Err(RequestError::EmptyId {
                    type_name: type_name.to_string(),
                }
                .into());
            }
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let multi_namespace = self.registry.is_multi_namespace(type_name);
        let namespaces = match object.initial_namespaces {
            Some(_) if !multi_namespace => {
                return Err(RequestError::InvalidNamespace {
                    namespace: namespace_id_to_string(namespace),
                    message: "initial namespaces can only be used with multi-namespace types"
                        .to_string(),
                }
                .into());
            }
            Some(initial) => Some(self.validate_initial_namespaces(initial)?),
            None if multi_namespace => Some(vec![namespace_id_to_string(namespace)]),
            None => None,
        };

        // Only an overwrite can target an existing revision.
        let version = if object.overwrite {
            decode_request_version(object.version)?.map(|v| v.to_token())
        } else {
            None
        };

        let now = Utc::now();
        let saved = SavedObject {
            type_name: type_name.to_string(),
            id: id.clone(),
            namespace: if self.registry.is_single_namespace(type_name) {
                namespace.cloned()
            } else {
                None
            },
            namespaces,
            attributes: object.attributes,
            references: object.references,
            migration_version: object.migration_version,
            type_migration_version: object.type_migration_version,
            core_migration_version: None,
            created_at: Some(now),
            updated_at: Some(now),
            version,
            origin_id: object.origin_id,
        };

        let raw = self.serializer.saved_object_to_raw(&saved)?;
        let migrated = self
            .migrator
            .migrate(&raw, MissingVersionPolicy::AssumeLatest)?
            .document;
        let attributes = migrated
            .attributes()
            .cloned()
            .map(Value::Object)
            .unwrap_or(Value::Null);
        self.validate_attributes(type_name, &id, &attributes)?;
        Ok((id, migrated))
    }

    fn validate_initial_namespaces(&self, namespaces: Vec<String>) -> StorageResult<Vec<String>> {
        if namespaces.is_empty() {
            return Err(RequestError::InvalidNamespace {
                namespace: String::new(),
                message: "initial namespaces must contain at least one namespace".to_string(),
            }
            .into());
        }
        for namespace in &namespaces {
            if namespace != ALL_NAMESPACES_STRING {
                Namespace::from_option_str(Some(namespace))?;
                self.check_namespace_name(namespace)?;
            }
        }
        Ok(namespaces)
    }
}

/// Keeps the membership of the document being overwritten.
pub(super) fn inherit_namespaces(raw: &mut RawDocument, existing: &RawDocument) {
    if let Some(namespaces) = existing.source.get(NAMESPACES_FIELD)
        && namespaces.as_array().is_some_and(|values| !values.is_empty())
    {
        raw.source
            .insert(NAMESPACES_FIELD.to_string(), namespaces.clone());
    }
}
