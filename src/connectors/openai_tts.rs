//! OpenAI text to speech, directly or via Azure
//!
//! The provider answers with the audio file itself; it is stored for the
//! caller and its URL returned as content.

use super::http::{HttpTransport, Payload};
use super::{
    endpoint_url, models_for, openai_headers, store_output, Connector, ConnectorContext,
    ConnectorKind, ModelsByPurpose,
};
use crate::config::InstanceConfig;
use crate::core_types::{PromptResponse, RequestOptions, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::PurposeKind;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};

pub const DEFAULT_VOICE: &str = "alloy";

pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer", "verse",
];

/// Only this model family accepts speaking instructions.
const INSTRUCTABLE_MODEL: &str = "gpt-4o-mini-tts";

/// Azure requires a model field but ignores its value.
const AZURE_MODEL_PLACEHOLDER: &str = "ineffective_parameter_value";

#[derive(Debug)]
pub struct OpenAiTtsConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
}

impl OpenAiTtsConnector {
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> Self {
        log_debug!(
            connector = "openaitts",
            instance = %instance.name,
            model = %instance.model,
            azure = instance.azure().is_some(),
            "OpenAI text to speech connector initialized"
        );
        Self {
            instance,
            transport,
        }
    }

    fn accepts_instructions(&self) -> bool {
        self.instance
            .model
            .strip_suffix("-azure")
            .unwrap_or(&self.instance.model)
            == INSTRUCTABLE_MODEL
    }
}

#[async_trait]
impl Connector for OpenAiTtsConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::OpenAiTts
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::Tts], &["tts-1", INSTRUCTABLE_MODEL])
    }

    fn usage_unit(&self) -> UsageUnit {
        UsageUnit::Count
    }

    async fn build_payload(
        &self,
        prompt: &str,
        options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload> {
        let voice = options.first_str("voices").unwrap_or(DEFAULT_VOICE);
        if !VOICES.contains(&voice) {
            return Err(ManagerError::invalid_parameter(
                "voices",
                format!("unknown voice '{voice}'"),
            ));
        }

        let mut body = Map::new();
        body.insert("input".to_string(), json!(prompt));
        body.insert("voice".to_string(), json!(voice));
        if self.accepts_instructions() {
            if let Some(instructions) = options.get_str("instructions") {
                body.insert("instructions".to_string(), json!(instructions));
            }
        }
        let model = match self.instance.azure() {
            Some(_) => AZURE_MODEL_PLACEHOLDER,
            None => self.instance.model.as_str(),
        };
        body.insert("model".to_string(), json!(model));

        Ok(Payload::post_json(
            endpoint_url(&self.instance, "audio/speech"),
            Value::Object(body),
        ))
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        openai_headers(&self.instance)
    }

    async fn decode_response(
        &self,
        body: &[u8],
        options: &RequestOptions,
        ctx: &ConnectorContext<'_>,
    ) -> PromptResponse {
        if body.is_empty() {
            return PromptResponse::from_error(&ManagerError::malformed_response(
                "speech response contained no audio",
            ));
        }
        match store_output(ctx, options, body) {
            Ok(url) => PromptResponse::success(self.model_name(), Usage::single_call(), url),
            Err(error) => error,
        }
    }

    fn available_options(&self) -> Value {
        let voices: Vec<Value> = VOICES
            .iter()
            .map(|voice| {
                let mut name = voice.to_string();
                if let Some(first) = name.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                json!({"key": voice, "displayname": name})
            })
            .collect();
        let mut options = json!({ "voices": voices });
        if self.accepts_instructions() {
            options["instructions"] = json!("text");
        }
        options
    }
}
