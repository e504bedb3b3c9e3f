//! Test helper utilities for unit tests
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::config::{AzureOptions, InstanceConfig, ManagerSettings};
use crate::connectors::{Connector, ConnectorContext, ConnectorKind};
use crate::core_types::{
    Caller, Embedder, InMemoryBlobStore, InMemoryInitStatusStore, RawOptions, Role,
};
use crate::error::{ManagerError, ManagerResult};
use crate::purposes::PurposeKind;
use serde_json::Value;
use std::sync::Arc;

/// Caller used by most tests.
pub fn test_caller() -> Caller {
    Caller::new(7, "tenant-a", Role::Basic)
}

/// Raw options from a JSON object literal.
pub fn raw(value: Value) -> RawOptions {
    match value {
        Value::Object(map) => map,
        other => panic!("raw options must be an object, got {other}"),
    }
}

pub fn ollama_instance() -> InstanceConfig {
    InstanceConfig::new(
        "ollama-main",
        ConnectorKind::Ollama,
        "llama3.3",
        "http://localhost:11434/api/chat",
    )
}

pub fn dalle_instance() -> InstanceConfig {
    InstanceConfig::new(
        "dalle-main",
        ConnectorKind::Dalle,
        "dall-e-3",
        "https://api.openai.com/v1/images/generations",
    )
    .with_api_key("sk-test")
}

/// RSA key pair used to sign and verify service account assertions.
pub const SERVICE_ACCOUNT_PRIVATE_KEY: &str =
    include_str!("../../tests/fixtures/service_account_key.pem");
pub const SERVICE_ACCOUNT_PUBLIC_KEY: &str =
    include_str!("../../tests/fixtures/service_account_key.pub.pem");

/// Service account key file as stored on an Imagen instance.
pub fn service_account_json(token_uri: &str) -> String {
    serde_json::json!({
        "type": "service_account",
        "project_id": "school-project",
        "private_key_id": "key-1",
        "private_key": SERVICE_ACCOUNT_PRIVATE_KEY,
        "client_email": "imagen@school-project.iam.gserviceaccount.com",
        "token_uri": token_uri
    })
    .to_string()
}

pub fn azure_options() -> AzureOptions {
    AzureOptions {
        enabled: true,
        resource: "myresource".to_string(),
        deployment: "mydeployment".to_string(),
        api_version: "2024-06-01".to_string(),
    }
}

/// Build a connector for `instance` with default settings.
pub fn build_connector(instance: InstanceConfig) -> Arc<dyn Connector> {
    let kind = instance.connector;
    kind.create(
        instance,
        &ManagerSettings::default(),
        Arc::new(InMemoryInitStatusStore::new()),
    )
    .expect("test instance should be valid")
}

/// Embedder returning a fixed vector.
#[derive(Debug, Clone)]
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait::async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> ManagerResult<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Embedder that always fails.
#[derive(Debug, Clone, Copy)]
pub struct FailingEmbedder;

#[async_trait::async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> ManagerResult<Vec<f32>> {
        Err(ManagerError::transport_error("embedding backend down", None))
    }
}

/// Collaborators a [`ConnectorContext`] borrows from.
pub struct ContextParts {
    pub caller: Caller,
    pub embedder: FixedEmbedder,
    pub blobs: InMemoryBlobStore,
}

impl ContextParts {
    pub fn new() -> Self {
        Self {
            caller: test_caller(),
            embedder: FixedEmbedder(vec![0.1, 0.2, 0.3]),
            blobs: InMemoryBlobStore::default(),
        }
    }

    pub fn context(&self, purpose: PurposeKind) -> ConnectorContext<'_> {
        ConnectorContext {
            caller: &self.caller,
            purpose,
            component: "unit_test",
            context_id: 3,
            embedder: &self.embedder,
            blobs: &self.blobs,
        }
    }
}
