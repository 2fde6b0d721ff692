//! Elasticsearch store adapter.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::params::{OpType as EsOpType, Refresh};
use elasticsearch::{BulkParts, DeleteParts, Elasticsearch, GetParts, IndexParts, MgetParts};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    BulkOperation, BulkRequest, DeleteRequest, DocumentStoreClient, GetRequest, IndexRequest,
    MgetRequest, OpType, RefreshPolicy, StoreResponse,
};
use crate::error::{BackendError, SavedObjectsError, StorageResult};
use crate::version::SequenceVersion;

const BACKEND_NAME: &str = "elasticsearch";

/// Credentials sent with every request.
///
/// Serialized with a `kind` tag, e.g.
/// `{"kind": "basic", "username": "kibana_system", "password": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElasticsearchCredentials {
    /// HTTP basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// A service account or OAuth bearer token.
    Bearer {
        /// Token value, without the `Bearer ` prefix.
        token: String,
    },
    /// An API key id and secret pair.
    ApiKey {
        /// Key id.
        id: String,
        /// Key secret.
        api_key: String,
    },
}

impl ElasticsearchCredentials {
    fn to_transport(&self) -> Credentials {
        match self {
            Self::Basic { username, password } => {
                Credentials::Basic(username.clone(), password.clone())
            }
            Self::Bearer { token } => Credentials::Bearer(token.clone()),
            Self::ApiKey { id, api_key } => Credentials::ApiKey(id.clone(), api_key.clone()),
        }
    }
}

/// Connection settings for [`ElasticsearchStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchStoreConfig {
    /// Cluster URLs. Requests go to the first one.
    pub nodes: Vec<String>,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Credentials, if the cluster has security enabled.
    #[serde(default)]
    pub auth: Option<ElasticsearchCredentials>,

    /// Accept any server certificate. Local clusters with self-signed
    /// certificates only.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ElasticsearchStoreConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

impl ElasticsearchStoreConfig {
    fn node_url(&self) -> StorageResult<elasticsearch::http::Url> {
        let node = self
            .nodes
            .first()
            .ok_or_else(|| connection_error("no cluster node configured".to_string()))?;
        node.parse()
            .map_err(|e| connection_error(format!("node '{}' is not a valid URL: {}", node, e)))
    }
}

/// A [`DocumentStoreClient`] backed by an Elasticsearch cluster.
///
/// Responses are passed through untouched, including error statuses and the
/// product header; only transport failures become `Err`.
pub struct ElasticsearchStore {
    client: Elasticsearch,
    config: ElasticsearchStoreConfig,
}

impl Debug for ElasticsearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchStore")
            .field("nodes", &self.config.nodes)
            .field("request_timeout_ms", &self.config.request_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchStore {
    /// Connects to the first configured node.
    pub fn new(config: ElasticsearchStoreConfig) -> StorageResult<Self> {
        let pool = SingleNodeConnectionPool::new(config.node_url()?);
        let mut transport = TransportBuilder::new(pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));
        if let Some(auth) = &config.auth {
            transport = transport.auth(auth.to_transport());
        }
        if config.disable_certificate_validation {
            transport = transport.cert_validation(CertificateValidation::None);
        }
        let transport = transport
            .build()
            .map_err(|e| connection_error(format!("cannot set up the HTTP transport: {}", e)))?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            config,
        })
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &ElasticsearchStoreConfig {
        &self.config
    }
}

fn connection_error(message: String) -> SavedObjectsError {
    SavedObjectsError::Backend(BackendError::ConnectionFailed {
        backend_name: BACKEND_NAME.to_string(),
        message,
    })
}

fn transport_error(action: &str, e: elasticsearch::Error) -> SavedObjectsError {
    connection_error(format!("{}: {}", action, e))
}

fn refresh_param(refresh: RefreshPolicy) -> Refresh {
    match refresh {
        RefreshPolicy::True => Refresh::True,
        RefreshPolicy::False => Refresh::False,
        RefreshPolicy::WaitFor => Refresh::WaitFor,
    }
}

/// Splits a revision into the signed `if_seq_no` / `if_primary_term` pair
/// the client API takes.
fn signed_version(version: SequenceVersion) -> StorageResult<(i64, i64)> {
    let convert = |v: u64| {
        i64::try_from(v).map_err(|_| {
            SavedObjectsError::Backend(BackendError::Internal {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("version component {} out of range", v),
                source: None,
            })
        })
    };
    Ok((convert(version.seq_no)?, convert(version.primary_term)?))
}

/// Action line of one bulk operation.
fn bulk_action(op: &str, index: &str, id: &str, version: Option<SequenceVersion>) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(index));
    meta.insert("_id".to_string(), json!(id));
    if let Some(v) = version {
        meta.insert("if_seq_no".to_string(), json!(v.seq_no));
        meta.insert("if_primary_term".to_string(), json!(v.primary_term));
    }
    let mut action = Map::new();
    action.insert(op.to_string(), Value::Object(meta));
    Value::Object(action)
}

async fn into_store_response(response: Response) -> StorageResult<StoreResponse> {
    let status = response.status_code().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error("reading response body", e))?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok(StoreResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl DocumentStoreClient for ElasticsearchStore {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get(&self, request: GetRequest) -> StorageResult<StoreResponse> {
        let response = self
            .client
            .get(GetParts::IndexId(&request.index, &request.id))
            .send()
            .await
            .map_err(|e| transport_error("get", e))?;
        into_store_response(response).await
    }

    async fn mget(&self, request: MgetRequest) -> StorageResult<StoreResponse> {
        let docs: Vec<Value> = request
            .docs
            .iter()
            .map(|doc| json!({"_index": doc.index, "_id": doc.id}))
            .collect();
        let response = self
            .client
            .mget(MgetParts::None)
            .body(json!({ "docs": docs }))
            .send()
            .await
            .map_err(|e| transport_error("mget", e))?;
        into_store_response(response).await
    }

    async fn index(&self, request: IndexRequest) -> StorageResult<StoreResponse> {
        let op_type = match request.op_type {
            OpType::Index => EsOpType::Index,
            OpType::Create => EsOpType::Create,
        };
        let mut call = self
            .client
            .index(IndexParts::IndexId(&request.index, &request.id))
            .op_type(op_type)
            .refresh(refresh_param(request.refresh));
        if let Some(version) = request.if_version {
            let (seq_no, primary_term) = signed_version(version)?;
            call = call.if_seq_no(seq_no).if_primary_term(primary_term);
        }
        let response = call
            .body(Value::Object(request.document))
            .send()
            .await
            .map_err(|e| transport_error("index", e))?;
        into_store_response(response).await
    }

    async fn delete(&self, request: DeleteRequest) -> StorageResult<StoreResponse> {
        let mut call = self
            .client
            .delete(DeleteParts::IndexId(&request.index, &request.id))
            .refresh(refresh_param(request.refresh));
        if let Some(version) = request.if_version {
            let (seq_no, primary_term) = signed_version(version)?;
            call = call.if_seq_no(seq_no).if_primary_term(primary_term);
        }
        let response = call
            .send()
            .await
            .map_err(|e| transport_error("delete", e))?;
        into_store_response(response).await
    }

    async fn bulk(&self, request: BulkRequest) -> StorageResult<StoreResponse> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(request.operations.len() * 2);
        for operation in request.operations {
            match operation {
                BulkOperation::Index(index) => {
                    let op = match index.op_type {
                        OpType::Index => "index",
                        OpType::Create => "create",
                    };
                    body.push(bulk_action(op, &index.index, &index.id, index.if_version).into());
                    body.push(Value::Object(index.document).into());
                }
                BulkOperation::Delete(delete) => {
                    body.push(bulk_action("delete", &delete.index, &delete.id, delete.if_version).into());
                }
            }
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .refresh(refresh_param(request.refresh))
            .send()
            .await
            .map_err(|e| transport_error("bulk", e))?;
        into_store_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: ElasticsearchStoreConfig =
            serde_json::from_str(r#"{"nodes": ["http://es:9200"]}"#).unwrap();
        assert_eq!(config.nodes, vec!["http://es:9200"]);
        assert_eq!(config.request_timeout_ms, 30000);
        assert!(config.auth.is_none());
        assert!(!config.disable_certificate_validation);
    }

    #[test]
    fn test_invalid_url_is_connection_error() {
        let config = ElasticsearchStoreConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        };
        let err = ElasticsearchStore::new(config).unwrap_err();
        assert!(matches!(
            err,
            SavedObjectsError::Backend(BackendError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn test_bulk_action_line() {
        let action = bulk_action("delete", ".kibana", "config:1", Some(SequenceVersion::new(3, 1)));
        assert_eq!(
            action,
            json!({"delete": {"_index": ".kibana", "_id": "config:1", "if_seq_no": 3, "if_primary_term": 1}})
        );
        let plain = bulk_action("create", ".kibana", "config:1", None);
        assert!(plain["create"].get("if_seq_no").is_none());
    }

    #[test]
    fn test_signed_version_range() {
        assert_eq!(signed_version(SequenceVersion::new(5, 1)).unwrap(), (5, 1));
        assert!(signed_version(SequenceVersion::new(u64::MAX, 1)).is_err());
    }

    #[test]
    fn test_credentials_are_tagged() {
        let auth: ElasticsearchCredentials =
            serde_json::from_str(r#"{"kind": "api_key", "id": "k1", "api_key": "secret"}"#).unwrap();
        assert_eq!(
            auth,
            ElasticsearchCredentials::ApiKey {
                id: "k1".to_string(),
                api_key: "secret".to_string(),
            }
        );
        assert!(matches!(auth.to_transport(), Credentials::ApiKey(..)));
    }

    #[test]
    fn test_empty_node_list_is_connection_error() {
        let config = ElasticsearchStoreConfig {
            nodes: Vec::new(),
            ..Default::default()
        };
        let err = ElasticsearchStore::new(config).unwrap_err();
        assert!(err.to_string().contains("no cluster node"));
    }
}
