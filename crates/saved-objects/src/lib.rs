//! Helios Saved Objects
//!
//! This crate is the persistence and migration core for typed JSON documents
//! ("saved objects") kept in an Elasticsearch-style document store. It turns
//! typed objects into raw store documents and back, upgrades stored
//! documents to the current schema as they are read, and exposes a
//! repository with optimistic concurrency control.
//!
//! # Features
//!
//! - **Version tokens**: opaque tokens over `_seq_no` / `_primary_term`
//! - **Serialization**: namespace-aware raw ids and the flat raw document layout
//! - **Migrations**: per-type transform chains applied lazily on read and write
//! - **Repository**: create/get/update/delete plus bulk calls, with namespace,
//!   permission and product-header checks
//!
//! Store adapters are enabled with feature flags:
//!
//! - `elasticsearch` - Elasticsearch via the official client
//!
//! The [`InMemoryStore`](client::InMemoryStore) is always available.
//!
//! # Architecture
//!
//! - [`version`] - version token codec
//! - [`types`] - saved objects and raw documents
//! - [`registry`] - saved object types and their migrations
//! - [`serialization`] - conversion between saved objects and raw documents
//! - [`migration`] - the document migration engine
//! - [`client`] - the document store abstraction and its implementations
//! - [`context`] - per-request caller permissions
//! - [`repository`] - the public saved objects API
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_saved_objects::client::InMemoryStore;
//! use helios_saved_objects::migration::MigrationVersion;
//! use helios_saved_objects::registry::{NamespaceType, SavedObjectType, TypeRegistry};
//! use helios_saved_objects::{RequestContext, SavedObjectsConfig, SavedObjectsRepository};
//! use helios_saved_objects::repository::{GetOptions, UpdateOptions};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TypeRegistry::builder()
//!     .register(
//!         SavedObjectType::new("config", NamespaceType::Single).with_migration(
//!             MigrationVersion::new(1, 0, 0),
//!             MigrationVersion::new(2, 0, 0),
//!             |mut doc, _| {
//!                 if let Some(attrs) = doc.attributes_mut() {
//!                     attrs.entry("theme").or_insert(json!("light"));
//!                 }
//!                 Ok(doc)
//!             },
//!         ),
//!     )
//!     .build()?;
//!
//! let repository = SavedObjectsRepository::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(registry),
//!     SavedObjectsConfig::default(),
//! )?;
//! let ctx = RequestContext::internal();
//!
//! let created = repository
//!     .create(&ctx, "config", json!({"buildNum": 1}), Default::default())
//!     .await?;
//! assert_eq!(created.type_migration_version, Some(MigrationVersion::new(2, 0, 0)));
//!
//! let updated = repository
//!     .update(
//!         &ctx,
//!         "config",
//!         &created.id,
//!         json!({"buildNum": 2}),
//!         UpdateOptions {
//!             version: created.version_str().map(str::to_string),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! assert_ne!(updated.version, created.version);
//!
//! // The old token is now stale.
//! let stale = repository
//!     .update(
//!         &ctx,
//!         "config",
//!         &created.id,
//!         json!({"buildNum": 3}),
//!         UpdateOptions {
//!             version: created.version_str().map(str::to_string),
//!             ..Default::default()
//!         },
//!     )
//!     .await;
//! assert!(stale.unwrap_err().is_conflict());
//!
//! let read = repository.get(&ctx, "config", &created.id, GetOptions::default()).await?;
//! assert_eq!(read.attributes["buildNum"], json!(2));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod migration;
pub mod namespace;
pub mod registry;
pub mod repository;
pub mod serialization;
pub mod types;
pub mod usage;
pub mod version;

// Re-export commonly used types at crate root
pub use config::SavedObjectsConfig;
pub use context::{Operation, RequestContext, TypePermissions};
pub use error::{SavedObjectsError, StorageResult};
pub use repository::SavedObjectsRepository;
pub use types::{RawDocument, SavedObject, SavedObjectReference};

// Re-export the store abstraction
pub use client::{DocumentStoreClient, InMemoryStore, RefreshPolicy};

// Re-export the codecs
pub use serialization::SavedObjectsSerializer;
pub use version::{VersionToken, decode_version, encode_version};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
