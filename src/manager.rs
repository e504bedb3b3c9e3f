//! Request orchestrator
//!
//! [`Manager::perform_request`] walks one request through the pipeline:
//!
//! 1. availability: tenant enabled, purpose assigned, instance enabled,
//!    request limit configured and not reached
//! 2. option sanitization by the purpose
//! 3. prompt formatting by the purpose
//! 4. payload, headers and transport call by the connector
//! 5. decoding by the connector, output formatting by the purpose
//! 6. usage accounting
//!
//! Every failure comes back as the error variant of [`PromptResponse`]. The
//! orchestrator never retries; the only resubmission is the access token
//! refresh inside a connector's `send`.

use crate::config::ManagerSettings;
use crate::connectors::openai_embedding::parse_vector;
use crate::connectors::{Connector, ConnectorContext};
use crate::core_types::{
    BlobStore, Caller, ConfigStore, Embedder, EmbeddingCache, InMemoryBlobStore,
    InMemoryConfigStore, InMemoryEmbeddingCache, InMemoryInitStatusStore, InMemoryUsageStore,
    InitStatusStore, PromptResponse, RawOptions, RequestResponse, UsageStore,
};
use crate::error::{ErrorKind, ManagerError, ManagerResult};
use crate::factory::{ConnectorFactory, PurposeDescriptor};
use crate::logging::{log_debug, log_info, log_warn, preview};
use crate::purposes::{Purpose, PurposeKind};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Component name recorded for embeddings requested by vector stores.
pub const EMBEDDING_COMPONENT: &str = "vectorstore";

/// Collaborators shared by every manager of a process.
pub struct ManagerServices {
    pub config: Arc<dyn ConfigStore>,
    pub usage: Arc<dyn UsageStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub init_status: Arc<dyn InitStatusStore>,
    pub embedding_cache: Arc<dyn EmbeddingCache>,
    pub factory: ConnectorFactory,
}

impl fmt::Debug for ManagerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerServices")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl ManagerServices {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        usage: Arc<dyn UsageStore>,
        blobs: Arc<dyn BlobStore>,
        init_status: Arc<dyn InitStatusStore>,
        embedding_cache: Arc<dyn EmbeddingCache>,
        settings: ManagerSettings,
    ) -> Self {
        let factory = ConnectorFactory::new(Arc::clone(&config), Arc::clone(&init_status), settings);
        Self {
            config,
            usage,
            blobs,
            init_status,
            embedding_cache,
            factory,
        }
    }

    /// Services backed entirely by the in-memory collaborators.
    pub fn in_memory(config: Arc<InMemoryConfigStore>, settings: ManagerSettings) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(InMemoryBlobStore::default()),
            Arc::new(InMemoryInitStatusStore::new()),
            Arc::new(InMemoryEmbeddingCache::new()),
            settings,
        )
    }

    pub fn settings(&self) -> &ManagerSettings {
        self.factory.settings()
    }
}

/// Entry point for one caller and one purpose.
#[derive(Debug, Clone)]
pub struct Manager {
    purpose: PurposeKind,
    caller: Caller,
    services: Arc<ManagerServices>,
}

impl Manager {
    pub fn new(purpose: PurposeKind, caller: Caller, services: Arc<ManagerServices>) -> Self {
        Self {
            purpose,
            caller,
            services,
        }
    }

    pub fn purpose(&self) -> PurposeKind {
        self.purpose
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Options the caller may send for this purpose.
    pub fn purpose_options(&self) -> ManagerResult<PurposeDescriptor> {
        self.services
            .factory
            .purpose_options(self.purpose, self.caller.role)
    }

    /// Run one request through the pipeline.
    ///
    /// `component` names the calling feature and `context_id` the context the
    /// request is made in; both end up in logs and in the ownership of stored
    /// files.
    pub async fn perform_request(
        &self,
        prompt: &str,
        component: &str,
        context_id: i64,
        raw_options: &RawOptions,
    ) -> PromptResponse {
        let started = Instant::now();
        log_debug!(
            purpose = %self.purpose,
            user_id = self.caller.user_id,
            component = %component,
            prompt = %preview(prompt, 100),
            "Processing request"
        );

        let (mut purpose, connector) = match self.check_availability() {
            Ok(resolved) => resolved,
            Err(e) => return PromptResponse::from_error(&e),
        };

        let options = match purpose.sanitize_request_options(raw_options) {
            Ok(options) => options,
            Err(e) => return PromptResponse::from_error(&e),
        };
        let prompt_text = purpose.format_prompt_text(prompt, &options).await;

        let ctx = ConnectorContext {
            caller: &self.caller,
            purpose: self.purpose,
            component,
            context_id,
            embedder: self,
            blobs: self.services.blobs.as_ref(),
        };

        let payload = match connector.build_payload(&prompt_text, &options, &ctx).await {
            Ok(payload) => payload,
            Err(e) => return PromptResponse::from_error(&e),
        };
        let headers = match connector.build_headers().await {
            Ok(headers) => headers,
            Err(e) => return PromptResponse::from_error(&e),
        };

        let body = match connector.send(&payload, headers, &options).await {
            RequestResponse::Success { body, .. } => body,
            RequestResponse::Error {
                code,
                message,
                debuginfo,
                body,
            } => {
                return self.failure_response(
                    connector.as_ref(),
                    code,
                    message,
                    debuginfo,
                    body.as_deref(),
                );
            }
        };

        let response = connector
            .decode_response(&body, &options, &ctx)
            .await
            .map_content(|content| purpose.format_output(content));

        if let PromptResponse::Success { usage, model, .. } = &response {
            self.services
                .usage
                .record_usage(self.caller.user_id, self.purpose, usage);
            log_info!(
                purpose = %self.purpose,
                connector = %connector.kind(),
                model = %model,
                user_id = self.caller.user_id,
                component = %component,
                total_usage = usage.total,
                duration_ms = started.elapsed().as_millis() as u64,
                "Request completed"
            );
        }
        response
    }

    /// Rebuild a pipeline error from the error response of a nested embedding
    /// request.
    fn embedding_error(&self, kind: ErrorKind, code: u16, debuginfo: String) -> ManagerError {
        let purpose = PurposeKind::Embedding.as_str();
        match kind {
            ErrorKind::NotConfigured => ManagerError::not_configured(purpose, self.caller.role.as_str()),
            ErrorKind::Disabled => ManagerError::configuration_error(format!(
                "embedding instance unavailable: {debuginfo}"
            )),
            ErrorKind::QuotaExceeded => ManagerError::quota_exceeded(
                purpose,
                self.services
                    .config
                    .max_requests(PurposeKind::Embedding, self.caller.role),
            ),
            ErrorKind::TransportError => ManagerError::transport_error(debuginfo, None),
            ErrorKind::MalformedResponse => ManagerError::malformed_response(debuginfo),
            ErrorKind::InvalidParameter => ManagerError::invalid_parameter("prompt", debuginfo),
            ErrorKind::ProviderError => ManagerError::provider_error(code, debuginfo),
            ErrorKind::Internal => ManagerError::configuration_error(debuginfo),
        }
    }

    /// Tenant, assignment, instance and quota checks, in that order.
    fn check_availability(&self) -> ManagerResult<(Box<dyn Purpose>, Arc<dyn Connector>)> {
        let config = &self.services.config;
        if !config.is_tenant_enabled(&self.caller.tenant) {
            return Err(ManagerError::tenant_disabled(self.caller.tenant.clone()));
        }

        let resolved = self.services.factory.resolve(self.purpose, self.caller.role)?;

        let limit = config.max_requests(self.purpose, self.caller.role);
        if limit == 0 {
            return Err(ManagerError::not_configured(
                self.purpose.as_str(),
                self.caller.role.as_str(),
            ));
        }
        let used = self
            .services
            .usage
            .current_usage(self.caller.user_id, self.purpose);
        if used >= limit {
            return Err(ManagerError::quota_exceeded(self.purpose.as_str(), limit));
        }
        Ok(resolved)
    }

    /// Map a failed transport call to the caller-facing error, preferring the
    /// connector's message for recognized provider errors.
    fn failure_response(
        &self,
        connector: &dyn Connector,
        code: u16,
        message: String,
        debuginfo: String,
        body: Option<&str>,
    ) -> PromptResponse {
        let error = if code == 0 {
            ManagerError::transport_error(message, None)
        } else {
            ManagerError::provider_error(code, message)
        };
        let custom = connector.custom_error_message(code, body);
        let user_message = if custom.is_empty() {
            error.user_message()
        } else {
            custom
        };
        log_warn!(
            purpose = %self.purpose,
            connector = %connector.kind(),
            status = code,
            "Provider call failed"
        );
        PromptResponse::error(error.status_code(), user_message, debuginfo, error.kind())
    }
}

#[async_trait]
impl Embedder for Manager {
    /// Embed `text` through the embedding purpose, on behalf of this
    /// manager's caller.
    async fn embed(&self, text: &str) -> ManagerResult<Vec<f32>> {
        let use_cache = self.services.settings().use_embedding_cache;
        if use_cache {
            if let Some(vector) = self.services.embedding_cache.get(text) {
                log_debug!(chars = text.len(), "Embedding served from cache");
                return Ok(vector);
            }
        }

        let manager = Manager::new(
            PurposeKind::Embedding,
            self.caller.clone(),
            Arc::clone(&self.services),
        );
        let response = manager
            .perform_request(text, EMBEDDING_COMPONENT, 0, &RawOptions::new())
            .await;
        let vector = match response {
            PromptResponse::Success { content, .. } => parse_vector(&content)?,
            PromptResponse::Error {
                code,
                debuginfo,
                kind,
                ..
            } => return Err(self.embedding_error(kind, code, debuginfo)),
        };

        if use_cache {
            self.services.embedding_cache.put(text, vector.clone());
        }
        Ok(vector)
    }
}

