//! OpenAI embeddings, directly or via Azure
//!
//! The vector is returned as comma-separated floats so it fits the string
//! content of a [`PromptResponse`].

use super::http::{HttpTransport, Payload};
use super::{
    endpoint_url, models_for, openai_headers, parse_json_body, Connector, ConnectorContext,
    ConnectorKind, ModelsByPurpose,
};
use crate::config::InstanceConfig;
use crate::core_types::{PromptResponse, RequestOptions, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::PurposeKind;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

const MODELS: &[&str] = &[
    "text-embedding-3-small",
    "text-embedding-3-large",
    "text-embedding-ada-002",
];

#[derive(Debug)]
pub struct OpenAiEmbeddingConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
}

impl OpenAiEmbeddingConnector {
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> Self {
        log_debug!(
            connector = "openaiembedding",
            instance = %instance.name,
            model = %instance.model,
            "OpenAI embedding connector initialized"
        );
        Self {
            instance,
            transport,
        }
    }
}

/// Render a vector the way embedding responses carry it.
pub fn join_vector(vector: &[f64]) -> String {
    vector
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse comma-separated floats back into a vector.
///
/// # Errors
///
/// Returns [`ManagerError::MalformedResponse`] on an empty string or any
/// entry that is not a number.
pub fn parse_vector(content: &str) -> ManagerResult<Vec<f32>> {
    if content.trim().is_empty() {
        return Err(ManagerError::malformed_response("embedding is empty"));
    }
    content
        .split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|e| {
                ManagerError::malformed_response(format!(
                    "embedding entry '{}' is not a number: {e}",
                    part.trim()
                ))
            })
        })
        .collect()
}

#[async_trait]
impl Connector for OpenAiEmbeddingConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::OpenAiEmbedding
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::Embedding], MODELS)
    }

    fn usage_unit(&self) -> UsageUnit {
        UsageUnit::Token
    }

    async fn build_payload(
        &self,
        prompt: &str,
        _options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload> {
        if prompt.trim().is_empty() {
            return Err(ManagerError::invalid_parameter(
                "prompt",
                "cannot embed empty text",
            ));
        }
        Ok(Payload::post_json(
            endpoint_url(&self.instance, "embeddings"),
            json!({"input": prompt, "model": self.instance.model}),
        ))
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        openai_headers(&self.instance)
    }

    async fn decode_response(
        &self,
        body: &[u8],
        _options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> PromptResponse {
        let content = match parse_json_body(body) {
            Ok(content) => content,
            Err(error) => return error,
        };
        let Some(vector) = content
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
        else {
            return PromptResponse::from_error(&ManagerError::malformed_response(
                "embedding response has no data[0].embedding",
            ));
        };
        let vector: Option<Vec<f64>> = vector.iter().map(Value::as_f64).collect();
        let Some(vector) = vector else {
            return PromptResponse::from_error(&ManagerError::malformed_response(
                "embedding contains non-numeric entries",
            ));
        };

        let prompt_tokens = content
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let total_tokens = content
            .pointer("/usage/total_tokens")
            .and_then(Value::as_f64)
            .unwrap_or(prompt_tokens);

        PromptResponse::success(
            self.model_name(),
            Usage::new(total_tokens, prompt_tokens, 0.0),
            join_vector(&vector),
        )
    }
}
