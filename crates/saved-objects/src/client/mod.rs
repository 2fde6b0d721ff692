//! The document store client abstraction.
//!
//! The repository never talks to a store directly. It issues requests through
//! a [`DocumentStoreClient`] and interprets the [`StoreResponse`] it gets
//! back: status, headers and a JSON body shaped like Elasticsearch's document
//! APIs.
//!
//! # Implementations
//!
//! - [`InMemoryStore`] - process-local store with real `_seq_no` /
//!   `_primary_term` semantics, used in tests and embedded setups
//! - `ElasticsearchStore` - Elasticsearch adapter (requires the
//!   `elasticsearch` feature)
//!
//! # Response bodies
//!
//! | Call | Success body |
//! |------|--------------|
//! | `get` | `{_id, found, _seq_no, _primary_term, _source}` |
//! | `mget` | `{docs: [<get body>...]}` |
//! | `index` | `{_id, result, _seq_no, _primary_term}` |
//! | `delete` | `{_id, result, _seq_no, _primary_term}` |
//! | `bulk` | `{errors, items: [{<op>: {_id, status, result?, error?, _seq_no?, _primary_term?}}]}` |

mod in_memory;

#[cfg(feature = "elasticsearch")]
mod elasticsearch;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageResult;
use crate::types::RawDocument;
use crate::version::SequenceVersion;

#[cfg(feature = "elasticsearch")]
pub use self::elasticsearch::{ElasticsearchCredentials, ElasticsearchStore, ElasticsearchStoreConfig};
pub use in_memory::InMemoryStore;

/// Header every genuine store response carries.
pub const PRODUCT_HEADER: &str = "x-elastic-product";

/// Expected value of [`PRODUCT_HEADER`].
pub const PRODUCT_HEADER_VALUE: &str = "Elasticsearch";

/// When a write becomes visible to reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefreshPolicy {
    /// Refresh the affected shards immediately.
    #[serde(rename = "true")]
    True,
    /// Do not refresh.
    #[serde(rename = "false")]
    False,
    /// Wait for the next scheduled refresh before returning.
    #[default]
    #[serde(rename = "wait_for")]
    WaitFor,
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPolicy::True => write!(f, "true"),
            RefreshPolicy::False => write!(f, "false"),
            RefreshPolicy::WaitFor => write!(f, "wait_for"),
        }
    }
}

/// Whether an index request may replace an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Create or replace.
    Index,
    /// Create only; an existing id is a 409.
    Create,
}

/// Fetch one document.
#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    /// Target index.
    pub index: String,
    /// Raw document id.
    pub id: String,
}

/// Fetch several documents in one round-trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MgetRequest {
    /// Documents to fetch, in response order.
    pub docs: Vec<GetRequest>,
}

/// Write one document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    /// Target index.
    pub index: String,
    /// Raw document id.
    pub id: String,
    /// Document source.
    pub document: Map<String, Value>,
    /// Create-only or create-or-replace.
    pub op_type: OpType,
    /// Only write if the stored revision matches (`if_seq_no` / `if_primary_term`).
    pub if_version: Option<SequenceVersion>,
    /// Visibility of the write.
    pub refresh: RefreshPolicy,
}

impl IndexRequest {
    /// Builds a request that writes `raw` into `index`.
    pub fn from_raw(index: impl Into<String>, raw: RawDocument, op_type: OpType) -> Self {
        Self {
            index: index.into(),
            if_version: raw.sequence_version(),
            id: raw.id,
            document: raw.source,
            op_type,
            refresh: RefreshPolicy::default(),
        }
    }
}

/// Delete one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    /// Target index.
    pub index: String,
    /// Raw document id.
    pub id: String,
    /// Only delete if the stored revision matches.
    pub if_version: Option<SequenceVersion>,
    /// Visibility of the delete.
    pub refresh: RefreshPolicy,
}

/// One operation of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Write a document (the request's `refresh` is ignored).
    Index(IndexRequest),
    /// Delete a document (the request's `refresh` is ignored).
    Delete(DeleteRequest),
}

/// Several write operations executed in one round-trip.
///
/// Items succeed or fail independently; the response lists one item per
/// operation, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    /// Operations, in order.
    pub operations: Vec<BulkOperation>,
    /// Visibility of the whole batch.
    pub refresh: RefreshPolicy,
}

/// A raw store response.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreResponse {
    /// HTTP status.
    pub status: u16,
    /// Response headers, with lowercase names.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body (`Value::Null` when the body was empty).
    pub body: Value,
}

impl StoreResponse {
    /// Creates a response carrying the product header.
    pub fn new(status: u16, body: Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert(PRODUCT_HEADER.to_string(), PRODUCT_HEADER_VALUE.to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if the response came from a supported store.
    pub fn has_product_header(&self) -> bool {
        self.header(PRODUCT_HEADER) == Some(PRODUCT_HEADER_VALUE)
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `true` for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns `true` for 409.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Returns the store's error reason, if the body carries one.
    pub fn error_reason(&self) -> Option<&str> {
        let error = self.body.get("error")?;
        error
            .get("reason")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
    }
}

/// A document as returned by `get` and inside `mget`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreHit {
    /// Raw document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Whether the document exists.
    #[serde(default)]
    pub found: bool,
    /// Sequence number of the returned revision.
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<u64>,
    /// Primary term of the returned revision.
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<u64>,
    /// Document source.
    #[serde(rename = "_source", default)]
    pub source: Option<Map<String, Value>>,
}

impl StoreHit {
    /// Converts a found hit into a raw document.
    pub fn into_raw(self) -> Option<RawDocument> {
        if !self.found {
            return None;
        }
        Some(RawDocument {
            id: self.id,
            source: self.source?,
            seq_no: self.seq_no,
            primary_term: self.primary_term,
        })
    }
}

/// Result of an `index` or `delete` call, or one bulk item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteResult {
    /// Raw document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// `created`, `updated`, `deleted` or `not_found`.
    #[serde(default)]
    pub result: Option<String>,
    /// Item status (bulk only).
    #[serde(default)]
    pub status: Option<u16>,
    /// Sequence number of the written revision.
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<u64>,
    /// Primary term of the written revision.
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<u64>,
    /// Error object of a failed bulk item.
    #[serde(default)]
    pub error: Option<Value>,
}

impl WriteResult {
    /// Returns the written revision when both halves are present.
    pub fn sequence_version(&self) -> Option<SequenceVersion> {
        Some(SequenceVersion::new(self.seq_no?, self.primary_term?))
    }
}

/// Body of an `mget` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MgetResponseBody {
    /// One hit per requested document, in request order.
    #[serde(default)]
    pub docs: Vec<StoreHit>,
}

/// Body of a `bulk` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponseBody {
    /// Whether any item failed.
    #[serde(default)]
    pub errors: bool,
    /// One entry per operation, keyed by operation name.
    #[serde(default)]
    pub items: Vec<HashMap<String, WriteResult>>,
}

impl BulkResponseBody {
    /// Returns the item results in operation order, dropping the op-name key.
    pub fn into_results(self) -> Vec<WriteResult> {
        self.items
            .into_iter()
            .map(|item| item.into_values().next().unwrap_or_default())
            .collect()
    }
}

/// An async client for a document store with optimistic concurrency.
///
/// Implementations return the store's answer as a [`StoreResponse`] even for
/// error statuses; `Err` is reserved for transport failures. They must not
/// interpret or hide the product header.
#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// Returns a short name for logs and errors.
    fn name(&self) -> &'static str;

    /// Fetches one document.
    async fn get(&self, request: GetRequest) -> StorageResult<StoreResponse>;

    /// Fetches several documents.
    async fn mget(&self, request: MgetRequest) -> StorageResult<StoreResponse>;

    /// Writes one document.
    async fn index(&self, request: IndexRequest) -> StorageResult<StoreResponse>;

    /// Deletes one document.
    async fn delete(&self, request: DeleteRequest) -> StorageResult<StoreResponse>;

    /// Executes several writes.
    async fn bulk(&self, request: BulkRequest) -> StorageResult<StoreResponse>;
}
