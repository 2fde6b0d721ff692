//! Update.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::create::NewObject;
use super::{SavedObjectsRepository, UpdateOptions, unexpected, write_outcome};
use crate::client::{IndexRequest, OpType, RefreshPolicy, WriteResult};
use crate::context::{Operation, RequestContext};
use crate::error::{RequestError, SavedObjectsError, StorageResult, ValidationError};
use crate::namespace::Namespace;
use crate::serialization::RawDocParseOptions;
use crate::types::SavedObject;
use crate::version::{SequenceVersion, decode_request_version};

impl SavedObjectsRepository {
    /// Shallow-merges `attributes` into an existing object.
    ///
    /// The stored document is read, migrated, patched and written back with
    /// `if_seq_no`/`if_primary_term` from `options.version` or, when absent,
    /// from the read. A conflict on the latter is retried up to
    /// `retry_on_conflict` times. A missing object is created from
    /// `options.upsert` merged with `attributes` when an upsert is given.
    #[instrument(
        skip(self, ctx, attributes, options),
        fields(type_name = %type_name, id = %id, correlation_id = ctx.correlation_id())
    )]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        attributes: Value,
        options: UpdateOptions,
    ) -> StorageResult<SavedObject> {
        let namespace = self.parse_namespace("update", options.namespace.as_deref())?;
        self.check_existing_access(ctx, Operation::Update, type_name, id)?;
        if id.is_empty() {
            return Err(RequestError::EmptyId {
                type_name: type_name.to_string(),
            }
            .into());
        }
        let Value::Object(patch) = attributes else {
            return Err(ValidationError::AttributesNotObject {
                type_name: type_name.to_string(),
            }
            .into());
        };

        let caller_version = decode_request_version(options.version.as_deref())?;
        let max_retries = match caller_version {
            Some(_) => 0,
            None => options
                .retry_on_conflict
                .unwrap_or(self.config.retry_on_conflict),
        };
        let refresh = self.refresh(options.refresh);

        let mut attempt = 0;
        loop {
            let result = self
                .update_once(
                    type_name,
                    id,
                    namespace.as_ref(),
                    &patch,
                    caller_version,
                    &options,
                    refresh,
                )
                .await;
            match result {
                Err(e) if e.is_conflict() && attempt < max_retries => {
                    attempt += 1;
                    debug!(attempt, max_retries, "Retrying update after conflict");
                }
                result => return result,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_once(
        &self,
        type_name: &str,
        id: &str,
        namespace: Option<&Namespace>,
        patch: &Map<String, Value>,
        caller_version: Option<SequenceVersion>,
        options: &UpdateOptions,
        refresh: RefreshPolicy,
    ) -> StorageResult<SavedObject> {
        let existing = self
            .preflight(type_name, id, namespace)
            .await?
            .filter(|raw| self.raw_in_namespace(raw, namespace));

        let Some(existing) = existing else {
            let Some(upsert) = &options.upsert else {
                debug!("Saved object not found");
                return Err(SavedObjectsError::not_found(type_name, id));
            };
            let Value::Object(upsert) = upsert else {
                return Err(ValidationError::AttributesNotObject {
                    type_name: type_name.to_string(),
                }
                .into());
            };
            let mut attributes = upsert.clone();
            attributes.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));

            debug!("Saved object not found; creating it from the upsert");
            let object = NewObject {
                type_name,
                id: Some(id),
                attributes: Value::Object(attributes),
                references: options.references.clone().unwrap_or_default(),
                overwrite: false,
                version: None,
                migration_version: Default::default(),
                type_migration_version: None,
                initial_namespaces: None,
                origin_id: None,
            };
            return self.create_document(object, namespace, refresh).await;
        };

        let expected = caller_version.or(existing.sequence_version());
        let mut current = self.read_document(&existing, Default::default())?;

        let mut attributes = match current.attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        attributes.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        current.attributes = Value::Object(attributes);
        if let Some(references) = &options.references {
            current.references = references.clone();
        }
        current.updated_at = Some(Utc::now());
        current.version = expected.map(SequenceVersion::to_token);

        self.validate_attributes(type_name, id, &current.attributes)?;

        let raw = self.serializer.saved_object_to_raw(&current)?;
        let mut request = IndexRequest::from_raw(self.index_for(type_name), raw.clone(), OpType::Index);
        request.refresh = refresh;

        let response = self.client.index(request).await?;
        self.ensure_from_store(&response, type_name, id)?;
        let result: WriteResult = if response.is_success() {
            serde_json::from_value(response.body.clone())?
        } else if response.is_conflict() || response.is_not_found() {
            WriteResult::default()
        } else {
            return Err(unexpected(&response));
        };
        let expected_token = current.version.as_ref().map(|t| t.as_str().to_string());
        let written = write_outcome(
            response.status,
            &result,
            type_name,
            id,
            OpType::Index,
            expected_token.as_deref(),
        )?;

        let mut stored = raw;
        stored.seq_no = Some(written.seq_no);
        stored.primary_term = Some(written.primary_term);
        let saved = self
            .serializer
            .raw_to_saved_object(&stored, RawDocParseOptions::default())?;

        self.notify_one(Operation::Update, type_name);
        Ok(saved)
    }
}
