//! Caller context for repository operations.
//!
//! Every repository call takes a [`RequestContext`]. Its [`TypePermissions`]
//! narrow the repository's allowed types for that caller and restrict which
//! operations it may run.
//!
//! # Examples
//!
//! ```
//! use helios_saved_objects::context::{Operation, RequestContext, TypePermissions};
//!
//! // Full access for internal callers
//! let internal = RequestContext::internal();
//!
//! // A caller that may only read and update dashboards
//! let editor = RequestContext::new(
//!     TypePermissions::builder()
//!         .allow_operations(vec![Operation::Get, Operation::Update])
//!         .allow_types(vec!["dashboard"])
//!         .build(),
//! )
//! .with_correlation_id("req-1");
//!
//! assert!(editor.can_access_type("dashboard"));
//! assert!(!editor.can_access_type("config"));
//! ```

mod permissions;
mod request_context;

pub use permissions::{Operation, TypePermissions, TypePermissionsBuilder};
pub use request_context::RequestContext;
