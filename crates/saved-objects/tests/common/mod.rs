//! Test infrastructure for the saved objects repository.
//!
//! Provides a registry with one type of each namespace kind, repositories
//! over an [`InMemoryStore`], and usage counters that record or fail.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use helios_saved_objects::client::InMemoryStore;
use helios_saved_objects::error::{BoxError, SavedObjectsError};
use helios_saved_objects::migration::MigrationVersion;
use helios_saved_objects::registry::{NamespaceType, SavedObjectType, TypeRegistry};
use helios_saved_objects::usage::{UsageCounter, UsageCounterEvent};
use helios_saved_objects::{RequestContext, SavedObjectsConfig, SavedObjectsRepository};

/// Index every fixture type lives in.
pub const INDEX: &str = ".kibana";

pub const V1: MigrationVersion = MigrationVersion::new(1, 0, 0);
pub const V2: MigrationVersion = MigrationVersion::new(2, 0, 0);
pub const V3: MigrationVersion = MigrationVersion::new(3, 0, 0);

/// Builds the fixture registry.
///
/// - `config`: single-namespace, migrations 1→2 (adds `theme`) and 2→3
///   (renames `title` to `name`), `name` must be a string
/// - `dashboard`: multi-namespace, no migrations
/// - `space`: namespace-agnostic
/// - `secret`: hidden, single-namespace
pub fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .register(
            SavedObjectType::new("config", NamespaceType::Single)
                .with_migration(V1, V2, |mut doc, _| {
                    if let Some(attrs) = doc.attributes_mut() {
                        attrs.entry("theme").or_insert(json!("light"));
                    }
                    Ok(doc)
                })
                .with_migration(V2, V3, |mut doc, _| {
                    if let Some(attrs) = doc.attributes_mut()
                        && let Some(title) = attrs.remove("title")
                    {
                        attrs.insert("name".to_string(), title);
                    }
                    Ok(doc)
                })
                .with_validator(|attrs| match attrs.get("name") {
                    Some(Value::String(_)) | None => Ok(()),
                    Some(_) => Err("[name]: expected a string".to_string()),
                }),
        )
        .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
        .register(SavedObjectType::new("space", NamespaceType::Agnostic))
        .register(SavedObjectType::new("secret", NamespaceType::Single).hidden(true))
        .build()
        .expect("fixture registry is valid")
}

/// A repository over a fresh in-memory store.
pub fn repository() -> (SavedObjectsRepository, Arc<InMemoryStore>) {
    repository_with_config(SavedObjectsConfig::default())
}

/// A repository with custom configuration over a fresh in-memory store.
pub fn repository_with_config(config: SavedObjectsConfig) -> (SavedObjectsRepository, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let repository = SavedObjectsRepository::new(store.clone(), Arc::new(registry()), config)
        .expect("Failed to create repository");
    (repository, store)
}

pub fn internal() -> RequestContext {
    RequestContext::internal().with_correlation_id("test")
}

/// Converts a `json!` object into a raw source map.
pub fn source(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Asserts that an error is a not-found.
pub fn assert_not_found(err: &SavedObjectsError) {
    assert!(err.is_not_found(), "expected not found, got {:?}", err);
}

/// Asserts that an error is a conflict.
pub fn assert_conflict(err: &SavedObjectsError) {
    assert!(err.is_conflict(), "expected conflict, got {:?}", err);
}

/// Asserts that an error is a bad request.
pub fn assert_bad_request(err: &SavedObjectsError) {
    assert!(err.is_bad_request(), "expected bad request, got {:?}", err);
}

/// Records every usage event.
#[derive(Default)]
pub struct RecordingCounter {
    events: Mutex<Vec<UsageCounterEvent>>,
}

impl RecordingCounter {
    pub fn events(&self) -> Vec<UsageCounterEvent> {
        self.events.lock().clone()
    }

    /// Waits until at least `count` events arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<UsageCounterEvent> {
        for _ in 0..200 {
            if self.events.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.events()
    }
}

#[async_trait]
impl UsageCounter for RecordingCounter {
    async fn increment_counter(&self, event: UsageCounterEvent) -> Result<(), BoxError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Fails every increment.
pub struct FailingCounter;

#[async_trait]
impl UsageCounter for FailingCounter {
    async fn increment_counter(&self, _event: UsageCounterEvent) -> Result<(), BoxError> {
        Err("usage collector is down".into())
    }
}

/// Never completes an increment.
pub struct StalledCounter;

#[async_trait]
impl UsageCounter for StalledCounter {
    async fn increment_counter(&self, _event: UsageCounterEvent) -> Result<(), BoxError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}
