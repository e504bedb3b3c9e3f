//! Ollama connector
//!
//! Talks to Ollama's native chat endpoint (`/api/chat`) with streaming off.
//! Token usage is read from `prompt_eval_count` and `eval_count`; Ollama
//! omits the prompt count when it served the prompt from its cache, so
//! absent counts default to zero.

use super::http::{HttpTransport, Payload};
use super::{models_for, parse_json_body, Connector, ConnectorContext, ConnectorKind, ModelsByPurpose};
use crate::config::InstanceConfig;
use crate::core_types::{PromptResponse, RequestOptions, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::{parse_data_url, PurposeKind};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// Sampling temperature when neither the request nor the instance sets one.
const DEFAULT_TEMPERATURE: f64 = 0.7;

const TEXT_MODELS: &[&str] = &[
    "gemma",
    "gemma3",
    "llama3",
    "llama3.1",
    "llama3.2-vision",
    "llama3.3",
    "llama4",
    "phi4",
    "mistral",
    "mistral-small3.1",
    "codellama",
    "qwen",
    "mixtral",
    "dolphin-mixtral",
    "tinyllama",
];

const VISION_MODELS: &[&str] = &[
    "llava-llama3",
    "llava-phi3",
    "granite-3.2-vision",
    "bakllava",
    "moondream",
    "llama3.2-vision",
    "llama4",
    "gemma3",
    "qwen2.5vl",
    "mistral-small3.1",
];

const IMAGE_MIMETYPES: &[&str] = &["image/png", "image/jpg", "image/jpeg"];

#[derive(Debug)]
pub struct OllamaConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
}

impl OllamaConnector {
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> Self {
        log_debug!(
            connector = "ollama",
            instance = %instance.name,
            endpoint = %instance.endpoint,
            model = %instance.model,
            "Ollama connector initialized"
        );
        Self {
            instance,
            transport,
        }
    }

    fn messages(&self, prompt: &str, options: &RequestOptions) -> ManagerResult<Vec<Value>> {
        if let Some(context) = options.get_array("conversationcontext") {
            let mut messages = context
                .iter()
                .map(conversation_message)
                .collect::<ManagerResult<Vec<_>>>()?;
            messages.push(json!({"role": "user", "content": prompt}));
            return Ok(messages);
        }

        if let Some(image) = options.get("image") {
            let (mimetype, data) = image
                .as_str()
                .and_then(parse_data_url)
                .ok_or_else(|| ManagerError::invalid_parameter("image", "expected a base64 data URL"))?;
            if !IMAGE_MIMETYPES.contains(&mimetype) {
                return Err(ManagerError::invalid_parameter(
                    "image",
                    format!("unsupported image type '{mimetype}'"),
                ));
            }
            return Ok(vec![json!({"role": "user", "content": prompt, "images": [data]})]);
        }

        Ok(vec![json!({"role": "user", "content": prompt})])
    }
}

/// Map a `{sender, message}` conversation entry to a chat message.
fn conversation_message(entry: &Value) -> ManagerResult<Value> {
    let role = match entry.get("sender").and_then(Value::as_str) {
        Some("user") => "user",
        Some("ai") => "assistant",
        Some("system") => "system",
        other => {
            return Err(ManagerError::invalid_parameter(
                "conversationcontext",
                format!("unknown sender {other:?}"),
            ));
        }
    };
    let content = entry
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(json!({"role": role, "content": content}))
}

#[async_trait]
impl Connector for OllamaConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Ollama
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        let mut models = models_for(
            &self.instance,
            &[
                PurposeKind::Chat,
                PurposeKind::Feedback,
                PurposeKind::SinglePrompt,
                PurposeKind::Translate,
                PurposeKind::QuestionGeneration,
                PurposeKind::Agent,
            ],
            TEXT_MODELS,
        );
        models.extend(models_for(&self.instance, &[PurposeKind::Itt], VISION_MODELS));
        models
    }

    fn usage_unit(&self) -> UsageUnit {
        UsageUnit::Token
    }

    async fn build_payload(
        &self,
        prompt: &str,
        options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload> {
        let temperature = options
            .get_f64("temperature")
            .or(self.instance.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let body = json!({
            "model": self.instance.model,
            "messages": self.messages(prompt, options)?,
            "stream": false,
            "keep_alive": "60m",
            "options": {"temperature": temperature}
        });
        Ok(Payload::post_json(self.instance.endpoint.clone(), body))
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        match self.instance.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => HttpTransport::bearer_headers(key),
            None => Ok(HttpTransport::json_headers()),
        }
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
        let Some(text) = content
            .pointer("/message/content")
            .and_then(Value::as_str)
        else {
            return PromptResponse::from_error(&ManagerError::malformed_response(
                "Ollama response has no message content",
            ));
        };

        let prompt_tokens = content
            .get("prompt_eval_count")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let completion_tokens = content
            .get("eval_count")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let model = content
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.instance.model);

        PromptResponse::success(model, Usage::tokens(prompt_tokens, completion_tokens), text)
    }

    fn allowed_mimetypes(&self) -> Vec<&'static str> {
        IMAGE_MIMETYPES.to_vec()
    }
}
