//! Provider connectors
//!
//! A connector binds one external AI provider's wire protocol. Given the
//! formatted prompt and validated options it builds the request payload and
//! headers, performs the transport call and decodes the answer into a
//! [`PromptResponse`].
//!
//! Connectors never let a transport failure escape: [`Connector::send`]
//! always returns a [`RequestResponse`], and decoding failures come back as
//! the error variant of [`PromptResponse`].
//!
//! ## Built-in connectors
//!
//! | Kind | Unit | Purposes |
//! |------|------|----------|
//! | [`ConnectorKind::Ollama`] | token | chat, feedback, singleprompt, translate, itt, questiongeneration, agent |
//! | [`ConnectorKind::Dalle`] | count | imggen |
//! | [`ConnectorKind::OpenAiStt`] | count | stt |
//! | [`ConnectorKind::OpenAiTts`] | count | tts |
//! | [`ConnectorKind::Imagen`] | count | imggen |
//! | [`ConnectorKind::OpenAiEmbedding`] | token | embedding |
//! | [`ConnectorKind::Qdrant`] | count | rag |

pub mod auth;
pub mod dalle;
pub mod http;
pub mod imagen;
pub mod ollama;
pub mod openai_embedding;
pub mod openai_stt;
pub mod openai_tts;
pub mod qdrant;

pub use auth::{send_with_token_refresh, AccessToken, AccessTokenSource, ServiceAccountKey};
pub use dalle::DalleConnector;
pub use http::{HttpTransport, MultipartData, Payload, PayloadBody};
pub use imagen::ImagenConnector;
pub use ollama::OllamaConnector;
pub use openai_embedding::OpenAiEmbeddingConnector;
pub use openai_stt::OpenAiSttConnector;
pub use openai_tts::OpenAiTtsConnector;
pub use qdrant::{BackendState, QdrantConnector};

use crate::config::{InstanceConfig, ManagerSettings};
use crate::core_types::{
    BlobOwner, BlobStore, Caller, Embedder, InitStatusStore, PromptResponse, RequestOptions, RequestResponse,
    UsageUnit,
};
use crate::error::{ManagerError, ManagerResult};
use crate::purposes::PurposeKind;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported model ids per purpose.
pub type ModelsByPurpose = BTreeMap<PurposeKind, Vec<String>>;

/// Every connector the manager can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Ollama,
    Dalle,
    #[serde(rename = "openaistt")]
    OpenAiStt,
    #[serde(rename = "openaitts")]
    OpenAiTts,
    Imagen,
    #[serde(rename = "openaiembedding")]
    OpenAiEmbedding,
    Qdrant,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 7] = [
        ConnectorKind::Ollama,
        ConnectorKind::Dalle,
        ConnectorKind::OpenAiStt,
        ConnectorKind::OpenAiTts,
        ConnectorKind::Imagen,
        ConnectorKind::OpenAiEmbedding,
        ConnectorKind::Qdrant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Ollama => "ollama",
            ConnectorKind::Dalle => "dalle",
            ConnectorKind::OpenAiStt => "openaistt",
            ConnectorKind::OpenAiTts => "openaitts",
            ConnectorKind::Imagen => "imagen",
            ConnectorKind::OpenAiEmbedding => "openaiembedding",
            ConnectorKind::Qdrant => "qdrant",
        }
    }

    /// Whether instances of this connector must carry an API key. Imagen
    /// authenticates with a service account instead.
    pub fn requires_api_key(&self) -> bool {
        !matches!(
            self,
            ConnectorKind::Ollama | ConnectorKind::Qdrant | ConnectorKind::Imagen
        )
    }

    /// Vector stores call back into the manager for embeddings, so they must
    /// never serve the embedding purpose themselves.
    pub fn is_vector_store(&self) -> bool {
        matches!(self, ConnectorKind::Qdrant)
    }

    /// Build a connector bound to `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigurationError`] if the instance belongs
    /// to another connector, fails validation or the HTTP client cannot be
    /// built.
    pub fn create(
        &self,
        instance: InstanceConfig,
        settings: &ManagerSettings,
        init_status: Arc<dyn InitStatusStore>,
    ) -> ManagerResult<Arc<dyn Connector>> {
        if instance.connector != *self {
            return Err(ManagerError::configuration_error(format!(
                "Instance '{}' is configured for connector '{}', not '{}'",
                instance.name, instance.connector, self
            )));
        }
        instance.validate()?;
        let transport = HttpTransport::new(settings)?;

        let connector: Arc<dyn Connector> = match self {
            ConnectorKind::Ollama => Arc::new(OllamaConnector::new(instance, transport)),
            ConnectorKind::Dalle => Arc::new(DalleConnector::new(instance, transport)),
            ConnectorKind::OpenAiStt => Arc::new(OpenAiSttConnector::new(instance, transport)),
            ConnectorKind::OpenAiTts => Arc::new(OpenAiTtsConnector::new(instance, transport)),
            ConnectorKind::Imagen => Arc::new(ImagenConnector::new(instance, transport)?),
            ConnectorKind::OpenAiEmbedding => {
                Arc::new(OpenAiEmbeddingConnector::new(instance, transport))
            }
            ConnectorKind::Qdrant => Arc::new(QdrantConnector::new(instance, transport, init_status)),
        };
        Ok(connector)
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ConnectorKind::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| ManagerError::configuration_error(format!("Unknown connector '{s}'")))
    }
}

/// Per-request collaborators a connector may need while building the
/// payload or decoding the response.
#[derive(Clone, Copy)]
pub struct ConnectorContext<'a> {
    pub caller: &'a Caller,
    pub purpose: PurposeKind,
    pub component: &'a str,
    pub context_id: i64,
    pub embedder: &'a dyn Embedder,
    pub blobs: &'a dyn BlobStore,
}

impl fmt::Debug for ConnectorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorContext")
            .field("caller", self.caller)
            .field("purpose", &self.purpose)
            .field("component", &self.component)
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

/// Contract every provider binding implements.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    fn kind(&self) -> ConnectorKind;

    /// Configuration this connector is bound to.
    fn instance(&self) -> &InstanceConfig;

    /// Shared HTTP transport.
    fn transport(&self) -> &HttpTransport;

    /// Supported model ids per purpose. Azure routed instances report
    /// `<model>-azure` aliases.
    fn models_for_purposes(&self) -> ModelsByPurpose;

    fn usage_unit(&self) -> UsageUnit;

    /// Assemble the provider request.
    async fn build_payload(
        &self,
        prompt: &str,
        options: &RequestOptions,
        ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload>;

    /// Authentication and content headers.
    async fn build_headers(&self) -> ManagerResult<HeaderMap>;

    /// Perform the transport call. Never fails; failures come back as
    /// [`RequestResponse::Error`].
    async fn send(
        &self,
        payload: &Payload,
        headers: HeaderMap,
        _options: &RequestOptions,
    ) -> RequestResponse {
        self.transport().execute(payload, headers).await
    }

    /// Turn a success body into a normalized response.
    async fn decode_response(
        &self,
        body: &[u8],
        options: &RequestOptions,
        ctx: &ConnectorContext<'_>,
    ) -> PromptResponse;

    /// Stable caller-facing message for known provider error payloads.
    /// Empty when the error is not recognized.
    fn custom_error_message(&self, _status: u16, _body: Option<&str>) -> String {
        String::new()
    }

    /// Mimetypes accepted for uploaded media. Empty when uploads are not used.
    fn allowed_mimetypes(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Choices offered to callers (sizes, voices, languages, ...).
    fn available_options(&self) -> Value {
        json!({})
    }

    fn supports_purpose(&self, purpose: PurposeKind) -> bool {
        self.models_for_purposes()
            .get(&purpose)
            .is_some_and(|models| !models.is_empty())
    }

    /// Model id reported in responses.
    fn model_name(&self) -> String {
        let instance = self.instance();
        match instance.azure() {
            Some(_) => crate::config::AzureOptions::model_alias(&instance.model),
            None => instance.model.clone(),
        }
    }
}

/// Model list for the given purposes, with Azure aliases when routed
/// through Azure.
pub(crate) fn models_for(
    instance: &InstanceConfig,
    purposes: &[PurposeKind],
    models: &[&str],
) -> ModelsByPurpose {
    let names: Vec<String> = models
        .iter()
        .map(|m| match instance.azure() {
            Some(_) => crate::config::AzureOptions::model_alias(m),
            None => (*m).to_string(),
        })
        .collect();
    purposes.iter().map(|p| (*p, names.clone())).collect()
}

/// Parse a JSON success body, mapping failures to an error response.
pub(crate) fn parse_json_body(body: &[u8]) -> Result<Value, PromptResponse> {
    serde_json::from_slice::<Value>(body).map_err(|e| {
        PromptResponse::from_error(&ManagerError::malformed_response(format!(
            "response body is not valid JSON: {e}"
        )))
    })
}

/// Target URL: the Azure deployment URL when routed through Azure, the
/// configured endpoint otherwise.
pub(crate) fn endpoint_url(instance: &InstanceConfig, azure_path: &str) -> String {
    match instance.azure() {
        Some(azure) => azure.endpoint(azure_path),
        None => instance.endpoint.clone(),
    }
}

/// OpenAI style auth: bearer token, or the `api-key` header under Azure.
pub(crate) fn openai_headers(instance: &InstanceConfig) -> ManagerResult<HeaderMap> {
    let key = instance.api_key.as_deref().unwrap_or_default();
    match instance.azure() {
        Some(_) => HttpTransport::api_key_headers(key),
        None => HttpTransport::bearer_headers(key),
    }
}

/// Persist binary provider output for the caller and return its URL.
pub(crate) fn store_output(
    ctx: &ConnectorContext<'_>,
    options: &RequestOptions,
    bytes: &[u8],
) -> Result<String, PromptResponse> {
    let owner = BlobOwner {
        user_id: ctx.caller.user_id,
        context_id: ctx.context_id,
        item_id: options.get_i64("itemid").unwrap_or(0),
    };
    let filename = options.get_str("filename").unwrap_or("output.bin");
    ctx.blobs
        .store_blob(&owner, bytes, filename)
        .map_err(|e| PromptResponse::from_error(&e))
}

/// Error body field at `pointer`, if the body is JSON.
pub(crate) fn error_field(body: Option<&str>, pointer: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body?).ok()?;
    value.pointer(pointer)?.as_str().map(str::to_string)
}
