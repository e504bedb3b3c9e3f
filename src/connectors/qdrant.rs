//! Qdrant vector store for retrieval-augmented generation
//!
//! Content is embedded by re-entering the request pipeline through the
//! [`Embedder`](crate::core_types::Embedder) in the connector context, then
//! stored as a point or used as a nearest-neighbour query.
//!
//! The collection is created lazily before the first request of the process.
//! When the backend refuses to create it, the failure is recorded in the
//! external [`InitStatusStore`] so later requests fail fast until an operator
//! clears the flag.

use super::http::{HttpTransport, Payload, PayloadBody};
use super::{models_for, parse_json_body, Connector, ConnectorContext, ConnectorKind, ModelsByPurpose};
use crate::config::InstanceConfig;
use crate::core_types::{
    Embedder, InitStatus, InitStatusStore, PromptResponse, RequestOptions, RequestResponse, Usage, UsageUnit,
};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::purposes::{PurposeKind, RagAction};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_COLLECTION: &str = "moodle";
pub const DEFAULT_VECTOR_NAME: &str = "contentvector";
pub const VECTOR_SIZE: usize = 1536;

/// Failure code recorded when the collection could not be created.
pub const FAILED_TO_CREATE_COLLECTION: u32 = 1;

/// Process-local view of the backend setup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

pub struct QdrantConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
    init_status: Arc<dyn InitStatusStore>,
    state: RwLock<BackendState>,
}

impl fmt::Debug for QdrantConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QdrantConnector")
            .field("instance", &self.instance.name)
            .field("collection", &self.collection())
            .finish_non_exhaustive()
    }
}

impl QdrantConnector {
    pub fn new(
        instance: InstanceConfig,
        transport: HttpTransport,
        init_status: Arc<dyn InitStatusStore>,
    ) -> Self {
        log_debug!(
            connector = "qdrant",
            instance = %instance.name,
            endpoint = %instance.endpoint,
            "Qdrant connector initialized"
        );
        Self {
            instance,
            transport,
            init_status,
            state: RwLock::new(BackendState::Uninitialized),
        }
    }

    pub fn collection(&self) -> &str {
        self.instance
            .custom("collection")
            .unwrap_or(DEFAULT_COLLECTION)
    }

    pub fn vector_name(&self) -> &str {
        self.instance
            .custom("vector_name")
            .unwrap_or(DEFAULT_VECTOR_NAME)
    }

    pub async fn state(&self) -> BackendState {
        self.state.read().await.clone()
    }

    /// Deterministic point id for a caller supplied metadata id.
    pub fn point_id(metadata_id: &Value) -> Uuid {
        let key = match metadata_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    fn status_key(&self) -> &'static str {
        ConnectorKind::Qdrant.as_str()
    }

    /// Run the one-time collection setup unless it already succeeded.
    ///
    /// Concurrent first requests may both run the setup; creating a missing
    /// collection is idempotent on the server. Only a rejected create call is
    /// recorded externally; an unreachable backend or an unreadable listing
    /// leaves the setup to be retried by the next request.
    pub async fn ensure_initialized(&self) -> ManagerResult<()> {
        if let InitStatus::Failed(code) = self.init_status.status(self.status_key()) {
            let reason = format!("backend setup previously failed with code {code}");
            *self.state.write().await = BackendState::Failed(reason.clone());
            return Err(ManagerError::initialization_failed(self.status_key(), reason));
        }
        if *self.state.read().await == BackendState::Ready {
            return Ok(());
        }

        *self.state.write().await = BackendState::Initializing;
        match self.create_collection_if_missing().await {
            Ok(()) => {
                *self.state.write().await = BackendState::Ready;
                Ok(())
            }
            Err(SetupError::Unavailable(e)) => {
                log_warn!(
                    collection = %self.collection(),
                    error = %e,
                    "Vector store not reachable during setup, will retry"
                );
                *self.state.write().await = BackendState::Uninitialized;
                Err(e)
            }
            Err(SetupError::CreateRejected(e)) => {
                log_error!(
                    collection = %self.collection(),
                    error = %e,
                    "Vector store initialization failed"
                );
                self.init_status
                    .set_status(self.status_key(), InitStatus::Failed(FAILED_TO_CREATE_COLLECTION));
                *self.state.write().await = BackendState::Failed(e.to_string());
                Err(ManagerError::initialization_failed(
                    self.status_key(),
                    e.to_string(),
                ))
            }
        }
    }

    async fn create_collection_if_missing(&self) -> Result<(), SetupError> {
        let base = self.instance.base_endpoint();
        let headers = self.build_headers().await.map_err(SetupError::Unavailable)?;
        let listing = Payload {
            method: Method::GET,
            url: format!("{base}collections"),
            body: PayloadBody::Empty,
        };
        let body = match self.transport.execute(&listing, headers.clone()).await {
            RequestResponse::Success { body, .. } => body,
            RequestResponse::Error { debuginfo, .. } => {
                return Err(SetupError::Unavailable(ManagerError::transport_error(
                    format!("Listing collections failed: {debuginfo}"),
                    None,
                )));
            }
        };
        let listing: Value = serde_json::from_slice(&body).map_err(|e| {
            SetupError::Unavailable(ManagerError::malformed_response(format!(
                "collection listing is not valid JSON: {e}"
            )))
        })?;

        let collection = self.collection();
        let exists = listing
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .is_some_and(|items| {
                items
                    .iter()
                    .any(|c| c.get("name").and_then(Value::as_str) == Some(collection))
            });
        if exists {
            log_debug!(collection = %collection, "Collection already exists");
            return Ok(());
        }

        log_info!(collection = %collection, "Creating vector collection");
        let create = Payload {
            method: Method::PUT,
            url: format!("{base}collections/{collection}"),
            body: PayloadBody::Json(json!({
                "vectors": {
                    self.vector_name(): {"size": VECTOR_SIZE, "distance": "Cosine"}
                }
            })),
        };
        match self.transport.execute(&create, headers).await {
            RequestResponse::Success { .. } => Ok(()),
            RequestResponse::Error { debuginfo, .. } => Err(SetupError::CreateRejected(
                ManagerError::transport_error(
                    format!("Creating collection '{collection}' failed: {debuginfo}"),
                    None,
                ),
            )),
        }
    }
}

/// Why the collection setup did not complete.
#[derive(Debug)]
enum SetupError {
    /// The backend could not be asked; setup stays retryable.
    Unavailable(ManagerError),
    /// The backend refused to create the collection.
    CreateRejected(ManagerError),
}

/// Normalize a query answer to `[{id, score, content, metadata}]`.
fn normalize_hits(content: &Value) -> Vec<Value> {
    let points = content
        .pointer("/result/points")
        .or_else(|| content.get("result"))
        .and_then(Value::as_array);
    points
        .into_iter()
        .flatten()
        .map(|point| {
            json!({
                "id": point.get("id").cloned().unwrap_or(Value::Null),
                "score": point.get("score").cloned().unwrap_or(Value::Null),
                "content": point.pointer("/payload/content").cloned().unwrap_or(Value::Null),
                "metadata": point.pointer("/payload/metadata").cloned().unwrap_or_else(|| json!({}))
            })
        })
        .collect()
}

#[async_trait]
impl Connector for QdrantConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Qdrant
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::Rag], &["text-embedding-small3"])
    }

    fn usage_unit(&self) -> UsageUnit {
        UsageUnit::Count
    }

    async fn build_payload(
        &self,
        prompt: &str,
        options: &RequestOptions,
        ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload> {
        self.ensure_initialized().await?;

        let action = RagAction::from_options(options)?;
        let vector = ctx.embedder.embed(prompt).await?;
        if vector.len() != VECTOR_SIZE {
            log_warn!(
                expected = VECTOR_SIZE,
                actual = vector.len(),
                "Embedding size differs from the collection vector size"
            );
        }

        let base = self.instance.base_endpoint();
        let collection = self.collection();
        let payload = match action {
            RagAction::Store => {
                let metadata = options.get("metadata").cloned().unwrap_or_else(|| json!({}));
                let id = metadata
                    .get("id")
                    .map(Self::point_id)
                    .ok_or_else(|| {
                        ManagerError::invalid_parameter("metadata", "storing content requires metadata.id")
                    })?;
                Payload {
                    method: Method::PUT,
                    url: format!("{base}collections/{collection}/points?wait=true"),
                    body: PayloadBody::Json(json!({
                        "points": [{
                            "id": id.to_string(),
                            "vector": {self.vector_name(): vector},
                            "payload": {"content": prompt, "metadata": metadata}
                        }]
                    })),
                }
            }
            RagAction::Retrieve => Payload::post_json(
                format!("{base}collections/{collection}/points/query"),
                json!({
                    "using": self.vector_name(),
                    "query": vector,
                    "top": options.get_i64("topk").unwrap_or(1),
                    "with_payload": true,
                    "with_vector": false
                }),
            ),
        };
        Ok(payload)
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        match self.instance.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => HttpTransport::api_key_headers(key),
            None => Ok(HttpTransport::json_headers()),
        }
    }

    async fn decode_response(
        &self,
        body: &[u8],
        options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> PromptResponse {
        let content = match parse_json_body(body) {
            Ok(content) => content,
            Err(error) => return error,
        };
        let action = match RagAction::from_options(options) {
            Ok(action) => action,
            Err(e) => return PromptResponse::from_error(&e),
        };

        let result = match action {
            RagAction::Store => {
                let id = options
                    .get("metadata")
                    .and_then(|m| m.get("id"))
                    .map(|id| Self::point_id(id).to_string());
                let status = content
                    .pointer("/result/status")
                    .and_then(Value::as_str)
                    .unwrap_or("completed");
                json!({"id": id, "status": status})
            }
            RagAction::Retrieve => Value::Array(normalize_hits(&content)),
        };
        PromptResponse::success(self.model_name(), Usage::single_call(), result.to_string())
    }
}
