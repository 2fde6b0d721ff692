//! Multi-object calls.
//!
//! Each call validates its items individually, fetches whatever preflight
//! state it needs with one `mget`, and writes with one `bulk` request.
//! Results are returned in input order and a failing item never aborts the
//! others. Only call-level problems (a wildcard namespace, too many objects,
//! a transport failure or a response from an unsupported store) fail the
//! whole call.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use super::create::{NewObject, inherit_namespaces};
use super::delete::is_shared;
use super::{
    BulkCreateObject, BulkCreateOptions, BulkCreateResponse, BulkDeleteOptions,
    BulkDeleteResponse, BulkDeleteStatus, BulkGetOptions, BulkGetResponse, BulkObjectRef,
    SavedObjectsRepository, unexpected, write_outcome,
};
use crate::client::{
    BulkOperation, BulkRequest, BulkResponseBody, DeleteRequest, GetRequest, IndexRequest,
    MgetRequest, MgetResponseBody, OpType, RefreshPolicy, WriteResult,
};
use crate::context::{Operation, RequestContext};
use crate::error::{BackendError, ConcurrencyError, RequestError, SavedObjectsError, StorageResult};
use crate::namespace::Namespace;
use crate::serialization::RawDocParseOptions;
use crate::types::{RawDocument, SavedObject};
use crate::version::SequenceVersion;

/// A create item that passed validation.
struct PendingCreate {
    position: usize,
    type_name: String,
    id: String,
    raw: RawDocument,
    explicit_namespaces: bool,
}

/// A delete item that passed validation.
struct PendingDelete {
    position: usize,
    request: DeleteRequest,
}

impl SavedObjectsRepository {
    /// Reads several objects with one `mget`.
    #[instrument(
        skip(self, ctx, objects, options),
        fields(count = objects.len(), correlation_id = ctx.correlation_id())
    )]
    pub async fn bulk_get(
        &self,
        ctx: &RequestContext,
        objects: Vec<BulkObjectRef>,
        options: BulkGetOptions,
    ) -> StorageResult<BulkGetResponse> {
        let namespace = self.parse_namespace("bulk_get", options.namespace.as_deref())?;
        self.check_bulk_size(objects.len())?;

        let mut results: Vec<Option<StorageResult<SavedObject>>> = Vec::with_capacity(objects.len());
        let mut pending = Vec::new();
        for (position, object) in objects.iter().enumerate() {
            match self.check_bulk_item(ctx, Operation::Get, object) {
                Ok(()) => {
                    results.push(None);
                    pending.push(position);
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }

        let docs = pending
            .iter()
            .map(|&position| self.get_request(&objects[position], namespace.as_ref()))
            .collect();
        let hits = self.fetch_many(docs).await?;
        for (position, hit) in pending.into_iter().zip(hits) {
            let object = &objects[position];
            let result = match hit.filter(|raw| self.raw_in_namespace(raw, namespace.as_ref())) {
                Some(raw) => self.read_document(&raw, options.migration_version_compatibility),
                None => Err(SavedObjectsError::not_found(&object.type_name, &object.id)),
            };
            results[position] = Some(result);
        }

        let saved_objects = results
            .into_iter()
            .zip(&objects)
            .map(|(result, object)| {
                result.unwrap_or_else(|| Err(SavedObjectsError::not_found(&object.type_name, &object.id)))
            })
            .collect();
        Ok(BulkGetResponse { saved_objects })
    }

    /// Deletes several objects with one `bulk` request.
    ///
    /// Multi-namespace objects are read first with one `mget` and are subject
    /// to the same shared-object check as [`delete`](Self::delete).
    #[instrument(
        skip(self, ctx, objects, options),
        fields(count = objects.len(), correlation_id = ctx.correlation_id())
    )]
    pub async fn bulk_delete(
        &self,
        ctx: &RequestContext,
        objects: Vec<BulkObjectRef>,
        options: BulkDeleteOptions,
    ) -> StorageResult<BulkDeleteResponse> {
        let namespace = self.parse_namespace("bulk_delete", options.namespace.as_deref())?;
        self.check_bulk_size(objects.len())?;

        let mut results: Vec<Option<StorageResult<()>>> = Vec::with_capacity(objects.len());
        let mut ready = Vec::new();
        let mut needs_preflight = Vec::new();
        for (position, object) in objects.iter().enumerate() {
            if let Err(e) = self.check_bulk_item(ctx, Operation::Delete, object) {
                results.push(Some(Err(e)));
                continue;
            }
            results.push(None);
            if self.registry.is_multi_namespace(&object.type_name) {
                needs_preflight.push(position);
            } else {
                ready.push(PendingDelete {
                    position,
                    request: self.delete_request(object, namespace.as_ref(), None),
                });
            }
        }

        let docs = needs_preflight
            .iter()
            .map(|&position| self.get_request(&objects[position], namespace.as_ref()))
            .collect();
        let hits = self.fetch_many(docs).await?;
        for (position, hit) in needs_preflight.into_iter().zip(hits) {
            let object = &objects[position];
            match hit.filter(|raw| self.raw_in_namespace(raw, namespace.as_ref())) {
                None => {
                    results[position] = Some(Err(SavedObjectsError::not_found(&object.type_name, &object.id)));
                }
                Some(raw) if is_shared(&raw) && !options.force => {
                    results[position] = Some(Err(RequestError::MultipleNamespaces {
                        type_name: object.type_name.clone(),
                        id: object.id.clone(),
                    }
                    .into()));
                }
                Some(raw) => ready.push(PendingDelete {
                    position,
                    request: self.delete_request(object, namespace.as_ref(), raw.sequence_version()),
                }),
            }
        }
        ready.sort_by_key(|pending| pending.position);

        let refresh = self.refresh(options.refresh);
        let operations = ready
            .iter()
            .map(|pending| BulkOperation::Delete(pending.request.clone()))
            .collect();
        let write_results = self.execute_bulk(operations, refresh).await?;

        let mut deleted: BTreeMap<String, u64> = BTreeMap::new();
        for (pending, result) in ready.iter().zip(write_results) {
            let object = &objects[pending.position];
            let outcome = delete_outcome(&result, object, pending.request.if_version);
            if outcome.is_ok() {
                *deleted.entry(object.type_name.clone()).or_default() += 1;
            }
            results[pending.position] = Some(outcome);
        }
        self.notify(Operation::Delete, deleted);

        let statuses = results
            .into_iter()
            .zip(objects)
            .map(|(result, object)| {
                let result = result.unwrap_or_else(|| {
                    Err(SavedObjectsError::not_found(&object.type_name, &object.id))
                });
                BulkDeleteStatus {
                    success: result.is_ok(),
                    error: result.err(),
                    type_name: object.type_name,
                    id: object.id,
                }
            })
            .collect();
        Ok(BulkDeleteResponse { statuses })
    }

    /// Creates several objects with one `bulk` request.
    ///
    /// Every item goes through the same preparation as
    /// [`create`](Self::create); items that fail it are reported without
    /// being sent to the store.
    #[instrument(
        skip(self, ctx, objects, options),
        fields(count = objects.len(), correlation_id = ctx.correlation_id())
    )]
    pub async fn bulk_create(
        &self,
        ctx: &RequestContext,
        objects: Vec<BulkCreateObject>,
        options: BulkCreateOptions,
    ) -> StorageResult<BulkCreateResponse> {
        let namespace = self.parse_namespace("bulk_create", options.namespace.as_deref())?;
        self.check_bulk_size(objects.len())?;

        let op_type = if options.overwrite { OpType::Index } else { OpType::Create };
        let mut results: Vec<Option<StorageResult<SavedObject>>> = Vec::with_capacity(objects.len());
        let mut prepared = Vec::new();
        for (position, object) in objects.into_iter().enumerate() {
            match self.prepare_bulk_create(ctx, object, options.overwrite, namespace.as_ref()) {
                Ok(pending) => {
                    results.push(None);
                    prepared.push(PendingCreate { position, ..pending });
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }

        // An overwrite may not take over an object that lives elsewhere.
        let (check, mut ready): (Vec<_>, Vec<_>) = prepared.into_iter().partition(|pending| {
            options.overwrite && self.registry.is_multi_namespace(&pending.type_name)
        });
        let docs = check
            .iter()
            .map(|pending| GetRequest {
                index: self.index_for(&pending.type_name),
                id: pending.raw.id.clone(),
            })
            .collect();
        let hits = self.fetch_many(docs).await?;
        for (mut pending, hit) in check.into_iter().zip(hits) {
            match hit {
                Some(existing) if !self.raw_in_namespace(&existing, namespace.as_ref()) => {
                    debug!(
                        type_name = %pending.type_name,
                        id = %pending.id,
                        "Existing object belongs to other namespaces"
                    );
                    results[pending.position] = Some(Err(ConcurrencyError::AlreadyExists {
                        type_name: pending.type_name,
                        id: pending.id,
                    }
                    .into()));
                }
                Some(existing) => {
                    if !pending.explicit_namespaces {
                        inherit_namespaces(&mut pending.raw, &existing);
                    }
                    ready.push(pending);
                }
                None => ready.push(pending),
            }
        }
        ready.sort_by_key(|pending| pending.position);

        let refresh = self.refresh(options.refresh);
        let operations = ready
            .iter()
            .map(|pending| {
                BulkOperation::Index(IndexRequest::from_raw(
                    self.index_for(&pending.type_name),
                    pending.raw.clone(),
                    op_type,
                ))
            })
            .collect();
        let write_results = self.execute_bulk(operations, refresh).await?;

        let mut created: BTreeMap<String, u64> = BTreeMap::new();
        for (pending, result) in ready.into_iter().zip(write_results) {
            let expected = pending.raw.version_token();
            let outcome = write_outcome(
                result.status.unwrap_or(500),
                &result,
                &pending.type_name,
                &pending.id,
                op_type,
                expected.as_ref().map(|t| t.as_str()),
            )
            .and_then(|written| {
                let mut stored = pending.raw;
                stored.seq_no = Some(written.seq_no);
                stored.primary_term = Some(written.primary_term);
                Ok(self
                    .serializer
                    .raw_to_saved_object(&stored, RawDocParseOptions::default())?)
            });
            if outcome.is_ok() {
                *created.entry(pending.type_name).or_default() += 1;
            }
            results[pending.position] = Some(outcome);
        }
        self.notify(Operation::Create, created);

        let saved_objects = results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    Err(SavedObjectsError::Backend(BackendError::Internal {
                        backend_name: self.client.name().to_string(),
                        message: "no result for bulk item".to_string(),
                        source: None,
                    }))
                })
            })
            .collect();
        Ok(BulkCreateResponse { saved_objects })
    }

    fn check_bulk_size(&self, count: usize) -> StorageResult<()> {
        if count > self.config.max_bulk_size {
            return Err(RequestError::TooManyObjects {
                count,
                max: self.config.max_bulk_size,
            }
            .into());
        }
        Ok(())
    }

    fn check_bulk_item(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        object: &BulkObjectRef,
    ) -> StorageResult<()> {
        if object.id.is_empty() {
            return Err(RequestError::EmptyId {
                type_name: object.type_name.clone(),
            }
            .into());
        }
        self.check_existing_access(ctx, operation, &object.type_name, &object.id)
    }

    fn prepare_bulk_create(
        &self,
        ctx: &RequestContext,
        object: BulkCreateObject,
        overwrite: bool,
        namespace: Option<&Namespace>,
    ) -> StorageResult<PendingCreate> {
        self.check_create_access(ctx, &object.type_name)?;
        let explicit_namespaces = object.initial_namespaces.is_some();
        let new_object = NewObject {
            type_name: &object.type_name,
            id: object.id.as_deref(),
            attributes: object.attributes,
            references: object.references,
            overwrite,
            version: object.version.as_deref(),
            migration_version: object.migration_version,
            type_migration_version: object.type_migration_version,
            initial_namespaces: object.initial_namespaces,
            origin_id: object.origin_id,
        };
        let (id, raw) = self.prepare_create(new_object, namespace)?;
        Ok(PendingCreate {
            position: 0,
            type_name: object.type_name,
            id,
            raw,
            explicit_namespaces,
        })
    }

    fn get_request(&self, object: &BulkObjectRef, namespace: Option<&Namespace>) -> GetRequest {
        GetRequest {
            index: self.index_for(&object.type_name),
            id: self
                .serializer
                .generate_raw_id(namespace, &object.type_name, &object.id),
        }
    }

    fn delete_request(
        &self,
        object: &BulkObjectRef,
        namespace: Option<&Namespace>,
        if_version: Option<SequenceVersion>,
    ) -> DeleteRequest {
        DeleteRequest {
            index: self.index_for(&object.type_name),
            id: self
                .serializer
                .generate_raw_id(namespace, &object.type_name, &object.id),
            if_version,
            refresh: RefreshPolicy::default(),
        }
    }

    /// Fetches documents with one `mget`, returning exactly one entry per
    /// request.
    async fn fetch_many(&self, docs: Vec<GetRequest>) -> StorageResult<Vec<Option<RawDocument>>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let count = docs.len();
        let response = self.client.mget(MgetRequest { docs }).await?;
        self.ensure_bulk_from_store(&response)?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }

        let body: MgetResponseBody = serde_json::from_value(response.body)?;
        let mut hits: Vec<Option<RawDocument>> =
            body.docs.into_iter().map(|hit| hit.into_raw()).collect();
        hits.resize_with(count, || None);
        Ok(hits)
    }

    /// Runs one `bulk` request, returning exactly one result per operation.
    async fn execute_bulk(
        &self,
        operations: Vec<BulkOperation>,
        refresh: RefreshPolicy,
    ) -> StorageResult<Vec<WriteResult>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let count = operations.len();
        let response = self
            .client
            .bulk(BulkRequest {
                operations,
                refresh,
            })
            .await?;
        self.ensure_bulk_from_store(&response)?;
        if !response.is_success() {
            return Err(unexpected(&response));
        }

        let body: BulkResponseBody = serde_json::from_value(response.body)?;
        if body.errors {
            debug!("Bulk request reported item errors");
        }
        let mut results = body.into_results();
        results.resize_with(count, WriteResult::default);
        Ok(results)
    }
}

fn delete_outcome(
    result: &WriteResult,
    object: &BulkObjectRef,
    if_version: Option<SequenceVersion>,
) -> StorageResult<()> {
    let status = result.status.unwrap_or(500);
    if status == 404 || result.result.as_deref() == Some("not_found") {
        return Err(SavedObjectsError::not_found(&object.type_name, &object.id));
    }
    if status == 409 {
        let expected = if_version
            .map(|v| v.to_token().as_str().to_string())
            .unwrap_or_default();
        return Err(SavedObjectsError::conflict(&object.type_name, &object.id, expected));
    }
    if !(200..300).contains(&status) {
        return Err(BackendError::UnexpectedResponse {
            status,
            message: result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "delete failed".to_string()),
        }
        .into());
    }
    Ok(())
}
