//! Schema migrations for saved objects.
//!
//! Every saved object type may register [`MigrationTransform`]s, each taking a
//! raw document from one [`MigrationVersion`] to a later one. The
//! [`MigrationEngine`] applies the relevant slice of a type's chain to bring a
//! document to the type's target version:
//!
//! ```text
//! Unmigrated ──► Migrating ──► Migrated
//!                    │
//!                    └──► Unmigratable (TransformError)
//!
//! recorded > target ──► AheadOfTarget (returned unmodified)
//! ```
//!
//! Documents are migrated on every read and stamped on every write. Results
//! are never cached.

mod engine;
mod migration_version;
mod transform;

pub use engine::{
    DocumentState, MigrationEngine, MigrationOutcome, MigrationResult, MissingVersionPolicy,
};
pub use migration_version::MigrationVersion;
pub use transform::{MigrationTransform, TransformContext, TransformFn, TransformId};
