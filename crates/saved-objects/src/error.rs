//! Error types for the saved-objects core.
//!
//! Every operation surfaces a [`SavedObjectsError`]. The variants are grouped by
//! category so callers can branch on the kind of failure (bad input, absent
//! document, lost race, store anomaly, broken migration) without string
//! matching. Each category maps to one HTTP status via
//! [`SavedObjectsError::status_code`].

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::migration::TransformId;

/// Boxed error type carried as the source of transform failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all saved-object operations.
#[derive(Error, Debug)]
pub enum SavedObjectsError {
    /// Malformed caller input
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Attribute validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Document state errors
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Optimistic concurrency errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Concurrency token errors
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Migration errors
    #[error(transparent)]
    Migration(#[from] TransformError),

    /// Raw document decoding errors
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Backing store errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Startup configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors caused by malformed or disallowed caller input.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("unsupported saved object type: '{type_name}'")]
    UnsupportedType { type_name: String },

    #[error("id cannot be empty for saved object of type '{type_name}'")]
    EmptyId { type_name: String },

    #[error("\"options.namespace\" cannot be \"*\" for {operation}")]
    WildcardNamespace { operation: String },

    #[error("invalid namespace '{namespace}': {message}")]
    InvalidNamespace { namespace: String, message: String },

    #[error(
        "unable to delete saved object [{type_name}/{id}] that exists in multiple namespaces, use the `force` option to delete it anyway"
    )]
    MultipleNamespaces { type_name: String, id: String },

    #[error("operation {operation} not permitted on saved object type '{type_name}'")]
    OperationNotPermitted { operation: String, type_name: String },

    #[error("too many objects in bulk request: {count}, maximum is {max}")]
    TooManyObjects { count: usize, max: usize },
}

/// Errors raised when attributes fail their type's validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid attributes for saved object [{type_name}/{id}]: {message}")]
    InvalidAttributes {
        type_name: String,
        id: String,
        message: String,
    },

    #[error("attributes of saved object type '{type_name}' must be a JSON object")]
    AttributesNotObject { type_name: String },
}

/// Errors related to document presence.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("saved object [{type_name}/{id}] not found")]
    NotFound { type_name: String, id: String },
}

/// Errors related to optimistic concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The supplied or preflight token no longer matches the stored revision.
    #[error("saved object [{type_name}/{id}] conflict: version {expected_version} is stale")]
    VersionConflict {
        type_name: String,
        id: String,
        expected_version: String,
    },

    /// A create without overwrite hit an existing id.
    #[error("saved object [{type_name}/{id}] conflict: already exists")]
    AlreadyExists { type_name: String, id: String },
}

/// Errors produced by the version codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("_seq_no and _primary_term are required to encode a version: {message}")]
    InvalidVersionInput { message: String },

    #[error("invalid version [{token}]")]
    MalformedVersionToken { token: String },
}

/// Errors raised by the migration engine.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A registered transform returned an error.
    #[error("failed to transform saved object [{type_name}/{id}] with migration {transform}: {source}")]
    TransformFailed {
        id: String,
        type_name: String,
        namespace: Option<String>,
        transform: TransformId,
        #[source]
        source: BoxError,
    },

    /// No registered transform bridges the recorded version to the target.
    #[error(
        "saved object [{type_name}/{id}] cannot be migrated from {from_version}: no migration starts at or before it on the way to {target_version}"
    )]
    MissingTransform {
        id: String,
        type_name: String,
        namespace: Option<String>,
        from_version: String,
        target_version: String,
    },
}

/// Errors decoding raw store documents.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("raw document id '{raw_id}' is invalid: {message}")]
    InvalidRawId { raw_id: String, message: String },

    #[error("raw document '{raw_id}' is missing field '{field}'")]
    MissingField { raw_id: String, field: String },

    #[error("raw document '{raw_id}' has an invalid '{field}' field: {message}")]
    InvalidField {
        raw_id: String,
        field: String,
        message: String,
    },

    #[error("json error: {message}")]
    Json { message: String },
}

/// Errors originating from the backing store or its transport.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The response did not come from a supported store.
    #[error("backing store unavailable: {message}")]
    Unavailable { message: String },

    /// A not-found response without the product header.
    #[error(
        "saved object [{type_name}/{id}] not found: response was not returned by a supported backing store"
    )]
    GenericNotFoundUnavailable { type_name: String, id: String },

    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    #[error("unexpected store response (status {status}): {message}")]
    UnexpectedResponse { status: u16, message: String },

    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Errors detected while building registries at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("saved object type '{type_name}' is registered twice")]
    DuplicateType { type_name: String },

    #[error("invalid saved object type '{type_name}': {message}")]
    InvalidType { type_name: String, message: String },

    #[error("invalid migration for type '{type_name}': {message}")]
    InvalidMigration { type_name: String, message: String },

    #[error("invalid migration version '{value}': {message}")]
    InvalidVersion { value: String, message: String },
}

/// Result type alias for saved-object operations.
pub type StorageResult<T> = Result<T, SavedObjectsError>;

impl SavedObjectsError {
    /// Creates a not-found error for the given type and id.
    pub fn not_found(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        SavedObjectsError::Document(DocumentError::NotFound {
            type_name: type_name.into(),
            id: id.into(),
        })
    }

    /// Creates a not-found error for a response that failed the product check.
    pub fn not_found_es_unavailable(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        SavedObjectsError::Backend(BackendError::GenericNotFoundUnavailable {
            type_name: type_name.into(),
            id: id.into(),
        })
    }

    /// Creates a version conflict error.
    pub fn conflict(
        type_name: impl Into<String>,
        id: impl Into<String>,
        expected_version: impl Into<String>,
    ) -> Self {
        SavedObjectsError::Concurrency(ConcurrencyError::VersionConflict {
            type_name: type_name.into(),
            id: id.into(),
            expected_version: expected_version.into(),
        })
    }

    /// HTTP status code equivalent of this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SavedObjectsError::Request(RequestError::OperationNotPermitted { .. }) => 403,
            SavedObjectsError::Request(_)
            | SavedObjectsError::Validation(_)
            | SavedObjectsError::Version(_) => 400,
            SavedObjectsError::Document(_) => 404,
            SavedObjectsError::Concurrency(_) => 409,
            SavedObjectsError::Backend(BackendError::Unavailable { .. })
            | SavedObjectsError::Backend(BackendError::GenericNotFoundUnavailable { .. }) => 503,
            SavedObjectsError::Migration(_)
            | SavedObjectsError::Serialization(_)
            | SavedObjectsError::Backend(_)
            | SavedObjectsError::Config(_) => 500,
        }
    }

    /// Returns `true` for malformed caller input.
    pub fn is_bad_request(&self) -> bool {
        self.status_code() == 400
    }

    /// Returns `true` for a document the store confirmed absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SavedObjectsError::Document(DocumentError::NotFound { .. }))
    }

    /// Returns `true` for optimistic concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SavedObjectsError::Concurrency(_))
    }

    /// Returns `true` when the response did not come from a supported store.
    pub fn is_backing_store_unavailable(&self) -> bool {
        matches!(
            self,
            SavedObjectsError::Backend(BackendError::Unavailable { .. })
                | SavedObjectsError::Backend(BackendError::GenericNotFoundUnavailable { .. })
        )
    }

    /// Returns `true` for migration failures.
    pub fn is_transform_error(&self) -> bool {
        matches!(self, SavedObjectsError::Migration(_))
    }
}

impl From<serde_json::Error> for SavedObjectsError {
    fn from(err: serde_json::Error) -> Self {
        SavedObjectsError::Serialization(SerializationError::Json {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = SavedObjectsError::not_found("dashboard", "abc");
        assert_eq!(err.to_string(), "saved object [dashboard/abc] not found");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_es_unavailable_is_not_not_found() {
        let err = SavedObjectsError::not_found_es_unavailable("dashboard", "abc");
        assert!(!err.is_not_found());
        assert!(err.is_backing_store_unavailable());
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_conflict_display() {
        let err = SavedObjectsError::conflict("dashboard", "abc", "WzEsMV0=");
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("dashboard/abc"));
    }

    #[test]
    fn test_wildcard_namespace_is_bad_request() {
        let err: SavedObjectsError = RequestError::WildcardNamespace {
            operation: "delete".to_string(),
        }
        .into();
        assert!(err.is_bad_request());
        assert_eq!(
            err.to_string(),
            "\"options.namespace\" cannot be \"*\" for delete"
        );
    }

    #[test]
    fn test_operation_not_permitted_is_forbidden() {
        let err: SavedObjectsError = RequestError::OperationNotPermitted {
            operation: "create".to_string(),
            type_name: "dashboard".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 403);
        assert!(!err.is_bad_request());
    }

    #[test]
    fn test_version_errors_are_bad_requests() {
        let err: SavedObjectsError = VersionError::MalformedVersionToken {
            token: "xyz".to_string(),
        }
        .into();
        assert!(err.is_bad_request());
        assert_eq!(err.to_string(), "invalid version [xyz]");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SavedObjectsError = json_err.into();
        assert!(matches!(
            err,
            SavedObjectsError::Serialization(SerializationError::Json { .. })
        ));
    }
}
