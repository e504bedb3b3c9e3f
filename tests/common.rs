//! Test helper utilities for ai-manager integration tests
//!
//! Builds managers over in-memory collaborators and instance configurations
//! pointing at a wiremock server.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use ai_manager::{
    Caller, ConnectorKind, InMemoryBlobStore, InMemoryConfigStore, InMemoryEmbeddingCache,
    InMemoryInitStatusStore, InMemoryUsageStore, InstanceConfig, Manager, ManagerServices,
    ManagerSettings, PurposeKind, RawOptions, Role, UsageStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const USER_ID: i64 = 42;
pub const TENANT: &str = "school-1";

/// In-memory collaborators plus the services built over them.
pub struct Harness {
    pub config: Arc<InMemoryConfigStore>,
    pub usage: Arc<InMemoryUsageStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub init_status: Arc<InMemoryInitStatusStore>,
    pub services: Arc<ManagerServices>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ManagerSettings {
            request_timeout: Duration::from_secs(5),
            ..ManagerSettings::default()
        })
    }

    pub fn with_settings(settings: ManagerSettings) -> Self {
        let config = Arc::new(InMemoryConfigStore::new());
        let usage = Arc::new(InMemoryUsageStore::new());
        let blobs = Arc::new(InMemoryBlobStore::default());
        let init_status = Arc::new(InMemoryInitStatusStore::new());
        let services = Arc::new(ManagerServices::new(
            config.clone(),
            usage.clone(),
            blobs.clone(),
            init_status.clone(),
            Arc::new(InMemoryEmbeddingCache::new()),
            settings,
        ));
        Self {
            config,
            usage,
            blobs,
            init_status,
            services,
        }
    }

    /// Register `instance` and assign it to `purpose` for basic users.
    pub fn serve(&self, purpose: PurposeKind, instance: &InstanceConfig, limit: u64) {
        self.config.add_instance(instance.clone());
        self.config.assign(purpose, Role::Basic, instance.name.clone());
        self.config.set_max_requests(purpose, Role::Basic, limit);
    }

    pub fn manager(&self, purpose: PurposeKind) -> Manager {
        Manager::new(purpose, caller(), Arc::clone(&self.services))
    }

    /// Requests recorded for the test user.
    pub fn usage_requests(&self, purpose: PurposeKind) -> u64 {
        self.usage.current_usage(USER_ID, purpose)
    }
}

pub fn caller() -> Caller {
    Caller::new(USER_ID, TENANT, Role::Basic)
}

/// Raw options from a JSON object literal.
pub fn raw(value: Value) -> RawOptions {
    match value {
        Value::Object(map) => map,
        other => panic!("raw options must be an object, got {other}"),
    }
}

pub fn ollama_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "ollama-test",
        ConnectorKind::Ollama,
        "llama3.3",
        format!("{server_uri}/api/chat"),
    )
}

pub fn dalle_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "dalle-test",
        ConnectorKind::Dalle,
        "dall-e-3",
        format!("{server_uri}/v1/images/generations"),
    )
    .with_api_key("sk-test")
}

pub fn stt_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "whisper-test",
        ConnectorKind::OpenAiStt,
        "whisper-1",
        format!("{server_uri}/v1/audio/transcriptions"),
    )
    .with_api_key("sk-test")
}

pub fn tts_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "tts-test",
        ConnectorKind::OpenAiTts,
        "tts-1",
        format!("{server_uri}/v1/audio/speech"),
    )
    .with_api_key("sk-test")
}

pub const SERVICE_ACCOUNT_EMAIL: &str = "imagen@school-project.iam.gserviceaccount.com";
pub const SERVICE_ACCOUNT_PRIVATE_KEY: &str = include_str!("fixtures/service_account_key.pem");
pub const SERVICE_ACCOUNT_PUBLIC_KEY: &str = include_str!("fixtures/service_account_key.pub.pem");

/// Service account key file whose token endpoint is `{server_uri}/token`.
pub fn service_account_json(server_uri: &str) -> String {
    json!({
        "type": "service_account",
        "project_id": "school-project",
        "private_key_id": "key-1",
        "private_key": SERVICE_ACCOUNT_PRIVATE_KEY,
        "client_email": SERVICE_ACCOUNT_EMAIL,
        "token_uri": format!("{server_uri}/token")
    })
    .to_string()
}

pub fn imagen_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "imagen-test",
        ConnectorKind::Imagen,
        "imagen-3.0-generate-002",
        format!("{server_uri}/v1/predict"),
    )
    .with_custom("serviceaccountjson", service_account_json(server_uri))
}

pub fn embedding_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "embedding-test",
        ConnectorKind::OpenAiEmbedding,
        "text-embedding-3-small",
        format!("{server_uri}/v1/embeddings"),
    )
    .with_api_key("sk-test")
}

pub fn qdrant_instance(server_uri: &str) -> InstanceConfig {
    InstanceConfig::new(
        "qdrant-test",
        ConnectorKind::Qdrant,
        "text-embedding-small3",
        server_uri,
    )
}

/// Ollama `/api/chat` answer.
pub fn ollama_chat_body(content: &str, prompt_tokens: u64, completion_tokens: u64) -> Value {
    json!({
        "model": "llama3.3",
        "created_at": "2025-01-01T00:00:00Z",
        "message": {"role": "assistant", "content": content},
        "done": true,
        "prompt_eval_count": prompt_tokens,
        "eval_count": completion_tokens
    })
}

/// OpenAI `/v1/embeddings` answer.
pub fn embedding_body(vector: &[f64], tokens: u64) -> Value {
    json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": vector}],
        "model": "text-embedding-3-small",
        "usage": {"prompt_tokens": tokens, "total_tokens": tokens}
    })
}

/// OAuth token endpoint answer.
pub fn token_body(token: &str) -> Value {
    json!({"access_token": token, "expires_in": 3600, "token_type": "Bearer"})
}
