//! Delete.

use tracing::{debug, instrument};

use super::{DeleteOptions, SavedObjectsRepository, unexpected};
use crate::client::{DeleteRequest, WriteResult};
use crate::context::{Operation, RequestContext};
use crate::error::{RequestError, SavedObjectsError, StorageResult};
use crate::namespace::ALL_NAMESPACES_STRING;
use crate::types::RawDocument;

impl SavedObjectsRepository {
    /// Removes one object.
    ///
    /// A multi-namespace object is read first; if it is shared with other
    /// namespaces the delete is refused unless `options.force` is set, and
    /// the delete is conditioned on the revision that was read.
    #[instrument(
        skip(self, ctx, options),
        fields(type_name = %type_name, id = %id, correlation_id = ctx.correlation_id())
    )]
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        options: DeleteOptions,
    ) -> StorageResult<()> {
        let namespace = self.parse_namespace("delete", options.namespace.as_deref())?;
        if id.is_empty() {
            return Err(RequestError::EmptyId {
                type_name: type_name.to_string(),
            }
            .into());
        }
        self.check_existing_access(ctx, Operation::Delete, type_name, id)?;

        let mut if_version = None;
        if self.registry.is_multi_namespace(type_name) {
            let existing = self
                .preflight(type_name, id, namespace.as_ref())
                .await?
                .filter(|raw| self.raw_in_namespace(raw, namespace.as_ref()));
            let Some(existing) = existing else {
                debug!("Saved object not found");
                return Err(SavedObjectsError::not_found(type_name, id));
            };
            if is_shared(&existing) && !options.force {
                return Err(RequestError::MultipleNamespaces {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                }
                .into());
            }
            if_version = existing.sequence_version();
        }

        let request = DeleteRequest {
            index: self.index_for(type_name),
            id: self
                .serializer
                .generate_raw_id(namespace.as_ref(), type_name, id),
            if_version,
            refresh: self.refresh(options.refresh),
        };
        let response = self.client.delete(request).await?;
        self.ensure_from_store(&response, type_name, id)?;

        if response.is_not_found() {
            debug!("Saved object not found");
            return Err(SavedObjectsError::not_found(type_name, id));
        }
        if response.is_conflict() {
            debug!("Delete rejected with a version conflict");
            let expected = if_version
                .map(|v| v.to_token().as_str().to_string())
                .unwrap_or_default();
            return Err(SavedObjectsError::conflict(type_name, id, expected));
        }
        if !response.is_success() {
            return Err(unexpected(&response));
        }
        let result: WriteResult = serde_json::from_value(response.body)?;
        if result.result.as_deref() == Some("not_found") {
            return Err(SavedObjectsError::not_found(type_name, id));
        }

        self.notify_one(Operation::Delete, type_name);
        Ok(())
    }
}

/// Returns `true` if a multi-namespace document lives in more than one
/// namespace.
pub(super) fn is_shared(raw: &RawDocument) -> bool {
    let namespaces = raw.namespaces();
    namespaces.len() > 1 || namespaces.iter().any(|ns| ns == ALL_NAMESPACES_STRING)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::client::InMemoryStore;
    use crate::config::SavedObjectsConfig;
    use crate::registry::{NamespaceType, SavedObjectType, TypeRegistry};
    use crate::repository::{CreateOptions, GetOptions};

    fn repository(store: Arc<InMemoryStore>) -> SavedObjectsRepository {
        let registry = TypeRegistry::builder()
            .register(SavedObjectType::new("config", NamespaceType::Single))
            .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
            .build()
            .unwrap();
        SavedObjectsRepository::new(store, Arc::new(registry), SavedObjectsConfig::default()).unwrap()
    }

    async fn create(repo: &SavedObjectsRepository, type_name: &str, id: &str, namespaces: Option<Vec<&str>>) {
        repo.create(
            &RequestContext::internal(),
            type_name,
            json!({}),
            CreateOptions {
                id: Some(id.to_string()),
                initial_namespaces: namespaces.map(|n| n.into_iter().map(String::from).collect()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let repo = repository(Arc::new(InMemoryStore::new()));
        let ctx = RequestContext::internal();
        create(&repo, "config", "c", None).await;

        repo.delete(&ctx, "config", "c", DeleteOptions::default()).await.unwrap();
        let err = repo.get(&ctx, "config", "c", GetOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());

        let err = repo.delete(&ctx, "config", "c", DeleteOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_shared_object_requires_force() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repository(store.clone());
        let ctx = RequestContext::internal();
        create(&repo, "dashboard", "d", Some(vec!["default", "ops"])).await;

        let err = repo
            .delete(&ctx, "dashboard", "d", DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SavedObjectsError::Request(RequestError::MultipleNamespaces { .. })
        ));
        assert!(store.raw_source(".kibana", "dashboard:d").is_some());

        repo.delete(
            &ctx,
            "dashboard",
            "d",
            DeleteOptions {
                force: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(store.raw_source(".kibana", "dashboard:d").is_none());
    }

    #[tokio::test]
    async fn test_delete_from_wrong_namespace_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repository(store.clone());
        create(&repo, "dashboard", "d", Some(vec!["ops"])).await;

        let err = repo
            .delete(&RequestContext::internal(), "dashboard", "d", DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.raw_source(".kibana", "dashboard:d").is_some());
    }

    #[tokio::test]
    async fn test_delete_argument_checks_run_before_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let repo = repository(store.clone());
        let ctx = RequestContext::internal();

        let wildcard = DeleteOptions {
            namespace: Some("*".to_string()),
            ..Default::default()
        };
        let err = repo.delete(&ctx, "unknown", "", wildcard).await.unwrap_err();
        assert!(matches!(
            err,
            SavedObjectsError::Request(RequestError::WildcardNamespace { .. })
        ));

        let err = repo.delete(&ctx, "unknown", "", DeleteOptions::default()).await.unwrap_err();
        assert!(matches!(err, SavedObjectsError::Request(RequestError::EmptyId { .. })));

        let err = repo.delete(&ctx, "unknown", "x", DeleteOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(store.request_count(), 0);
    }
}
