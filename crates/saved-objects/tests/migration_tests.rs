//! Migration behaviour observed through the engine and the repository.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use helios_saved_objects::client::InMemoryStore;
use helios_saved_objects::error::{SavedObjectsError, TransformError};
use helios_saved_objects::migration::{
    MigrationEngine, MigrationOutcome, MigrationVersion, MissingVersionPolicy,
};
use helios_saved_objects::registry::{NamespaceType, SavedObjectType, TypeRegistry};
use helios_saved_objects::repository::{GetOptions, UpdateOptions};
use helios_saved_objects::{RawDocument, SavedObjectsConfig, SavedObjectsRepository};

fn engine() -> MigrationEngine {
    MigrationEngine::new(Arc::new(registry()), MigrationVersion::new(8, 0, 0)).unwrap()
}

fn config_at_v1() -> RawDocument {
    RawDocument::new(
        "config:c",
        source(json!({
            "type": "config",
            "config": {"title": "Main"},
            "references": [],
            "typeMigrationVersion": "1.0.0"
        })),
    )
}

#[test]
fn test_chain_applies_every_transform_in_order() {
    let result = engine()
        .migrate(&config_at_v1(), MissingVersionPolicy::AssumeUnmigrated)
        .unwrap();

    let MigrationOutcome::Migrated { applied } = &result.outcome else {
        panic!("expected a migration, got {:?}", result.outcome);
    };
    let applied: Vec<String> = applied.iter().map(ToString::to_string).collect();
    assert_eq!(applied, vec!["config:1.0.0->2.0.0", "config:2.0.0->3.0.0"]);

    let doc = &result.document;
    assert_eq!(doc.source["config"], json!({"name": "Main", "theme": "light"}));
    assert_eq!(doc.source["typeMigrationVersion"], json!("3.0.0"));
    assert_eq!(doc.source["coreMigrationVersion"], json!("8.0.0"));
}

#[test]
fn test_migrating_a_migrated_document_is_a_no_op() {
    let engine = engine();
    let once = engine
        .migrate(&config_at_v1(), MissingVersionPolicy::AssumeUnmigrated)
        .unwrap()
        .document;
    let twice = engine
        .migrate(&once, MissingVersionPolicy::AssumeUnmigrated)
        .unwrap();

    assert_eq!(twice.outcome, MigrationOutcome::UpToDate);
    assert_eq!(twice.document, once);
}

#[test]
fn test_migration_is_deterministic() {
    let engine = engine();
    let input = config_at_v1();
    let first = engine.migrate(&input, MissingVersionPolicy::AssumeUnmigrated).unwrap();
    let second = engine.migrate(&input, MissingVersionPolicy::AssumeUnmigrated).unwrap();
    assert_eq!(first.document, second.document);
    assert_eq!(first.outcome, second.outcome);
}

#[test]
fn test_failing_transform_is_identified_and_input_untouched() {
    let registry = TypeRegistry::builder()
        .register(
            SavedObjectType::new("config", NamespaceType::Single)
                .with_migration(V1, V2, |doc, _| Ok(doc))
                .with_migration(V2, V3, |_, _| Err("boom".into())),
        )
        .build()
        .unwrap();
    let engine = MigrationEngine::new(Arc::new(registry), MigrationVersion::new(8, 0, 0)).unwrap();
    let input = config_at_v1();
    let before = input.clone();

    let err = engine
        .migrate(&input, MissingVersionPolicy::AssumeUnmigrated)
        .unwrap_err();
    match err {
        SavedObjectsError::Migration(TransformError::TransformFailed {
            transform, id, ..
        }) => {
            assert_eq!(transform.from_version, V2);
            assert_eq!(transform.to_version, V3);
            assert_eq!(id, "c");
        }
        other => panic!("expected a transform failure, got {:?}", other),
    }
    assert_eq!(input, before);
}

#[test]
fn test_legacy_migration_version_field_is_honoured() {
    let raw = RawDocument::new(
        "config:legacy",
        source(json!({
            "type": "config",
            "config": {"title": "Old"},
            "migrationVersion": {"config": "2.0.0"}
        })),
    );
    let result = engine()
        .migrate(&raw, MissingVersionPolicy::AssumeUnmigrated)
        .unwrap();

    // Only 2→3 runs: the theme default from 1→2 is not added.
    assert_eq!(result.document.source["config"], json!({"name": "Old"}));
    assert!(result.document.source.get("migrationVersion").is_none());
}

#[tokio::test]
async fn test_get_returns_migrated_view_without_writing_back() {
    let (repo, store) = repository();
    let seeded = store.seed(INDEX, "config:c", config_at_v1().source);

    let object = repo
        .get(&internal(), "config", "c", GetOptions::default())
        .await
        .unwrap();
    assert_eq!(object.attributes, json!({"name": "Main", "theme": "light"}));
    assert_eq!(object.type_migration_version, Some(V3));
    assert_eq!(object.version.unwrap().sequence_version(), seeded);

    let stored = store.raw_source(INDEX, "config:c").unwrap();
    assert_eq!(stored["typeMigrationVersion"], json!("1.0.0"));
}

#[tokio::test]
async fn test_update_persists_migrated_document() {
    let (repo, store) = repository();
    store.seed(INDEX, "config:c", config_at_v1().source);

    repo.update(&internal(), "config", "c", json!({"dark": true}), UpdateOptions::default())
        .await
        .unwrap();

    let stored = store.raw_source(INDEX, "config:c").unwrap();
    assert_eq!(stored["typeMigrationVersion"], json!("3.0.0"));
    assert_eq!(stored["config"], json!({"name": "Main", "theme": "light", "dark": true}));
}

#[tokio::test]
async fn test_document_from_newer_software_is_returned_as_is() {
    let (repo, store) = repository();
    store.seed(
        INDEX,
        "config:future",
        source(json!({
            "type": "config",
            "config": {"name": "Future", "newField": 1},
            "typeMigrationVersion": "9.0.0"
        })),
    );

    let object = repo
        .get(&internal(), "config", "future", GetOptions::default())
        .await
        .unwrap();
    assert_eq!(object.type_migration_version, Some(MigrationVersion::new(9, 0, 0)));
    assert_eq!(object.attributes["newField"], json!(1));
}

#[tokio::test]
async fn test_read_failure_surfaces_transform_error() {
    let registry = TypeRegistry::builder()
        .register(
            SavedObjectType::new("config", NamespaceType::Single)
                .with_migration(V1, V2, |_, _| Err("cannot read legacy config".into())),
        )
        .build()
        .unwrap();
    let store = Arc::new(InMemoryStore::new());
    let repo = SavedObjectsRepository::new(store.clone(), Arc::new(registry), SavedObjectsConfig::default())
        .unwrap();
    store.seed(INDEX, "config:c", config_at_v1().source);

    let err = repo
        .get(&internal(), "config", "c", GetOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_transform_error());
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_invalid_chains_are_rejected_at_startup() {
    let overlapping = TypeRegistry::builder()
        .register(
            SavedObjectType::new("config", NamespaceType::Single)
                .with_migration(V1, V3, |doc, _| Ok(doc))
                .with_migration(V2, V3, |doc, _| Ok(doc)),
        )
        .build()
        .unwrap();
    let err = SavedObjectsRepository::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(overlapping),
        SavedObjectsConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.status_code(), 500);
}
