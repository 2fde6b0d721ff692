//! Core document types.
//!
//! - [`SavedObject`] - the typed view callers work with
//! - [`SavedObjectReference`] - a link between two saved objects
//! - [`RawDocument`] - the flat source shape the backing store holds
//!
//! The serializer converts between the two shapes; see
//! [`crate::serialization`].

mod raw_document;
mod saved_object;

pub use raw_document::{
    CORE_MIGRATION_VERSION_FIELD, CREATED_AT_FIELD, MIGRATION_VERSION_FIELD, NAMESPACE_FIELD,
    NAMESPACES_FIELD, ORIGIN_ID_FIELD, REFERENCES_FIELD, RawDocument, TYPE_FIELD,
    TYPE_MIGRATION_VERSION_FIELD, UPDATED_AT_FIELD,
};
pub use saved_object::{SavedObject, SavedObjectReference};
