//! Process-local document store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};

use super::{
    BulkOperation, BulkRequest, DeleteRequest, DocumentStoreClient, GetRequest, IndexRequest,
    MgetRequest, OpType, StoreResponse,
};
use crate::error::{BackendError, StorageResult};
use crate::version::SequenceVersion;

const PRIMARY_TERM: u64 = 1;

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Map<String, Value>,
    seq_no: u64,
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<(String, String), StoredDocument>,
    next_seq_no: u64,
}

/// An in-memory [`DocumentStoreClient`].
///
/// Every write bumps a store-wide sequence number, and conditional writes
/// are checked against it exactly like Elasticsearch checks `if_seq_no` /
/// `if_primary_term`. Refresh policies are accepted and ignored since writes
/// are visible immediately.
///
/// The store can also impersonate a misbehaving intermediary:
/// [`set_product_header`](Self::set_product_header) strips the product header
/// from responses and [`set_unavailable`](Self::set_unavailable) fails every
/// call at the transport level.
///
/// ```
/// use helios_saved_objects::client::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.len(), 0);
/// assert_eq!(store.request_count(), 0);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    product_header: AtomicBool,
    unavailable: AtomicBool,
    requests: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            product_header: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    /// Controls whether responses carry the product header.
    pub fn set_product_header(&self, enabled: bool) {
        self.product_header.store(enabled, Ordering::SeqCst);
    }

    /// Makes every call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of calls made so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a stored source directly, bypassing the client API.
    pub fn raw_source(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .read()
            .documents
            .get(&(index.to_string(), id.to_string()))
            .map(|doc| doc.source.clone())
    }

    /// Stores a source directly, as a previous software version would have
    /// written it. Returns the assigned revision.
    pub fn seed(&self, index: &str, id: &str, source: Map<String, Value>) -> SequenceVersion {
        let mut state = self.state.write();
        let seq_no = state.bump();
        state.documents.insert(
            (index.to_string(), id.to_string()),
            StoredDocument { source, seq_no },
        );
        SequenceVersion::new(seq_no, PRIMARY_TERM)
    }

    fn begin(&self) -> StorageResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::ConnectionFailed {
                backend_name: self.name().to_string(),
                message: "store is unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn respond(&self, status: u16, body: Value) -> StoreResponse {
        let mut response = StoreResponse::new(status, body);
        if !self.product_header.load(Ordering::SeqCst) {
            response.headers.clear();
        }
        response
    }
}

impl State {
    fn bump(&mut self) -> u64 {
        let seq_no = self.next_seq_no;
        self.next_seq_no += 1;
        seq_no
    }

    fn get(&self, index: &str, id: &str) -> (u16, Value) {
        match self.documents.get(&(index.to_string(), id.to_string())) {
            Some(doc) => (
                200,
                json!({
                    "_index": index,
                    "_id": id,
                    "found": true,
                    "_seq_no": doc.seq_no,
                    "_primary_term": PRIMARY_TERM,
                    "_source": doc.source,
                }),
            ),
            None => (404, json!({"_index": index, "_id": id, "found": false})),
        }
    }

    fn check_version(
        &self,
        key: &(String, String),
        expected: Option<SequenceVersion>,
    ) -> Result<(), (u16, Value)> {
        let Some(expected) = expected else {
            return Ok(());
        };
        let current = self.documents.get(key).map(|doc| doc.seq_no);
        if current == Some(expected.seq_no) && expected.primary_term == PRIMARY_TERM {
            return Ok(());
        }
        let reason = match current {
            Some(seq_no) => format!(
                "[{}]: version conflict, required seqNo [{}], primary term [{}]. current document has seqNo [{}] and primary term [{}]",
                key.1, expected.seq_no, expected.primary_term, seq_no, PRIMARY_TERM
            ),
            None => format!(
                "[{}]: version conflict, required seqNo [{}], primary term [{}]. but no document was found",
                key.1, expected.seq_no, expected.primary_term
            ),
        };
        Err(conflict(&key.1, reason))
    }

    fn index(&mut self, request: IndexRequest) -> (u16, Value) {
        let key = (request.index.clone(), request.id.clone());
        let exists = self.documents.contains_key(&key);

        if request.op_type == OpType::Create && exists {
            let reason = format!("[{}]: version conflict, document already exists", request.id);
            return conflict(&request.id, reason);
        }
        if let Err(response) = self.check_version(&key, request.if_version) {
            return response;
        }

        let seq_no = self.bump();
        self.documents.insert(
            key,
            StoredDocument {
                source: request.document,
                seq_no,
            },
        );
        let (status, result) = if exists { (200, "updated") } else { (201, "created") };
        (
            status,
            json!({
                "_index": request.index,
                "_id": request.id,
                "result": result,
                "_seq_no": seq_no,
                "_primary_term": PRIMARY_TERM,
            }),
        )
    }

    fn delete(&mut self, request: DeleteRequest) -> (u16, Value) {
        let key = (request.index.clone(), request.id.clone());
        if let Err(response) = self.check_version(&key, request.if_version) {
            return response;
        }
        match self.documents.remove(&key) {
            Some(_) => {
                let seq_no = self.bump();
                (
                    200,
                    json!({
                        "_index": request.index,
                        "_id": request.id,
                        "result": "deleted",
                        "_seq_no": seq_no,
                        "_primary_term": PRIMARY_TERM,
                    }),
                )
            }
            None => (
                404,
                json!({"_index": request.index, "_id": request.id, "result": "not_found"}),
            ),
        }
    }
}

fn conflict(id: &str, reason: String) -> (u16, Value) {
    (
        409,
        json!({
            "_id": id,
            "error": {
                "type": "version_conflict_engine_exception",
                "reason": reason,
            },
            "status": 409,
        }),
    )
}

#[async_trait]
impl DocumentStoreClient for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, request: GetRequest) -> StorageResult<StoreResponse> {
        self.begin()?;
        let (status, body) = self.state.read().get(&request.index, &request.id);
        Ok(self.respond(status, body))
    }

    async fn mget(&self, request: MgetRequest) -> StorageResult<StoreResponse> {
        self.begin()?;
        let state = self.state.read();
        let docs: Vec<Value> = request
            .docs
            .iter()
            .map(|doc| state.get(&doc.index, &doc.id).1)
            .collect();
        drop(state);
        Ok(self.respond(200, json!({ "docs": docs })))
    }

    async fn index(&self, request: IndexRequest) -> StorageResult<StoreResponse> {
        self.begin()?;
        let (status, body) = self.state.write().index(request);
        Ok(self.respond(status, body))
    }

    async fn delete(&self, request: DeleteRequest) -> StorageResult<StoreResponse> {
        self.begin()?;
        let (status, body) = self.state.write().delete(request);
        Ok(self.respond(status, body))
    }

    async fn bulk(&self, request: BulkRequest) -> StorageResult<StoreResponse> {
        self.begin()?;
        let mut state = self.state.write();
        let mut errors = false;
        let mut items = Vec::with_capacity(request.operations.len());

        for operation in request.operations {
            let (op_name, (status, mut body)) = match operation {
                BulkOperation::Index(index) => {
                    let op_name = match index.op_type {
                        OpType::Index => "index",
                        OpType::Create => "create",
                    };
                    (op_name, state.index(index))
                }
                BulkOperation::Delete(delete) => ("delete", state.delete(delete)),
            };
            if status == 409 || status >= 500 {
                errors = true;
            }
            if let Some(obj) = body.as_object_mut() {
                obj.insert("status".to_string(), json!(status));
            }
            let mut item = Map::new();
            item.insert(op_name.to_string(), body);
            items.push(Value::Object(item));
        }
        drop(state);

        Ok(self.respond(200, json!({"errors": errors, "items": items})))
    }
}
