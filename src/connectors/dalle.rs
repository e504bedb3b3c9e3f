//! OpenAI image generation (DALL-E, gpt-image-1), directly or via Azure

use super::http::{HttpTransport, Payload};
use super::{
    endpoint_url, error_field, models_for, openai_headers, parse_json_body, store_output, Connector,
    ConnectorContext, ConnectorKind, ModelsByPurpose,
};
use crate::config::{AzureOptions, InstanceConfig};
use crate::core_types::{PromptResponse, RequestOptions, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::PurposeKind;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};

pub const CONTENT_POLICY_MESSAGE: &str =
    "The image could not be generated because the prompt violates the content policy of the AI tool.";

const GPT_IMAGE: &str = "gpt-image-1";

#[derive(Debug)]
pub struct DalleConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
}

impl DalleConnector {
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> Self {
        log_debug!(
            connector = "dalle",
            instance = %instance.name,
            model = %instance.model,
            azure = instance.azure().is_some(),
            "DALL-E connector initialized"
        );
        Self {
            instance,
            transport,
        }
    }

    fn is_gpt_image(&self) -> bool {
        let model = self.instance.model.as_str();
        model == GPT_IMAGE || model == AzureOptions::model_alias(GPT_IMAGE)
    }

    fn default_size(&self) -> &'static str {
        if self.instance.model == "dall-e-2" {
            "256x256"
        } else {
            "1024x1024"
        }
    }
}

#[async_trait]
impl Connector for DalleConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Dalle
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::ImgGen], &["dall-e-3", GPT_IMAGE])
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
        let mut body = Map::new();
        body.insert("prompt".to_string(), json!(prompt));
        body.insert(
            "size".to_string(),
            json!(options.first_str("sizes").unwrap_or(self.default_size())),
        );
        // gpt-image-1 always answers with base64 and rejects the flag
        if !self.is_gpt_image() {
            body.insert("response_format".to_string(), json!("b64_json"));
        }
        // Azure deployments pin the model
        if self.instance.azure().is_none() {
            body.insert("model".to_string(), json!(self.instance.model));
        }
        Ok(Payload::post_json(
            endpoint_url(&self.instance, "images/generations"),
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
        let content = match parse_json_body(body) {
            Ok(content) => content,
            Err(error) => return error,
        };
        let Some(encoded) = content.pointer("/data/0/b64_json").and_then(Value::as_str) else {
            return PromptResponse::from_error(&ManagerError::malformed_response(
                "image response has no data[0].b64_json",
            ));
        };
        let bytes = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                return PromptResponse::from_error(&ManagerError::malformed_response(format!(
                    "image payload is not valid base64: {e}"
                )));
            }
        };
        match store_output(ctx, options, &bytes) {
            Ok(url) => PromptResponse::success(self.model_name(), Usage::single_call(), url),
            Err(error) => error,
        }
    }

    fn custom_error_message(&self, status: u16, body: Option<&str>) -> String {
        if status == 400
            && error_field(body, "/error/code").as_deref() == Some("content_policy_violation")
        {
            return CONTENT_POLICY_MESSAGE.to_string();
        }
        String::new()
    }

    fn available_options(&self) -> Value {
        let base = self
            .instance
            .model
            .strip_suffix("-azure")
            .unwrap_or(&self.instance.model);
        let sizes = match base {
            "dall-e-3" => json!([
                {"key": "1024x1024", "displayname": "Squared (1024px x 1024px)"},
                {"key": "1792x1024", "displayname": "Landscape (1792px x 1024px)"},
                {"key": "1024x1792", "displayname": "Portrait (1024px x 1792px)"}
            ]),
            GPT_IMAGE => json!([
                {"key": "1024x1024", "displayname": "Squared (1024px x 1024px)"},
                {"key": "1536x1024", "displayname": "Landscape (1536px x 1024px)"},
                {"key": "1024x1536", "displayname": "Portrait (1024px x 1536px)"}
            ]),
            _ => json!([]),
        };
        json!({ "sizes": sizes })
    }
}
