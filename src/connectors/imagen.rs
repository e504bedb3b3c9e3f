//! Google Imagen on Vertex AI
//!
//! Authenticates with a short-lived OAuth access token obtained for the
//! instance's service account. Because the cached token can expire in
//! flight, [`Connector::send`] refreshes and resubmits once when the failure
//! is diagnosed as token expiry.

use super::auth::{
    send_with_token_refresh, with_bearer, AccessTokenSource, ServiceAccountKey, DEFAULT_SCOPE,
};
use super::http::{HttpTransport, Payload};
use super::{
    error_field, models_for, parse_json_body, store_output, Connector, ConnectorContext,
    ConnectorKind, ModelsByPurpose,
};
use crate::config::{ExpiryDetector, InstanceConfig};
use crate::core_types::{PromptResponse, RequestOptions, RequestResponse, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::PurposeKind;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

/// Instance custom field holding the service account key file.
pub const SERVICE_ACCOUNT_FIELD: &str = "serviceaccountjson";

pub const CONTENT_POLICY_MESSAGE: &str =
    "The image could not be generated because the prompt was rejected by the AI tool's safety filter.";

const ASPECT_RATIOS: &[(&str, &str)] = &[
    ("1:1", "1:1 (1024 x 1024)"),
    ("3:4", "3:4 (896 x 1280)"),
    ("4:3", "4:3 (1280 x 896)"),
    ("9:16", "9:16 (768 x 1408)"),
    ("16:9", "16:9 (1408 x 768)"),
];

const MODELS: &[&str] = &[
    "imagen-3.0-generate-002",
    "imagen-4.0-generate-001",
    "imagen-4.0-ultra-generate-001",
    "imagen-4.0-fast-generate-001",
];

#[derive(Debug)]
pub struct ImagenConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
    tokens: AccessTokenSource,
    expiry: ExpiryDetector,
}

impl ImagenConnector {
    /// Custom fields: `serviceaccountjson` (required, the service account
    /// key file) and `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigurationError`] if the service account
    /// JSON is missing, unparsable or carries no usable RSA key.
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> ManagerResult<Self> {
        let json = instance.custom(SERVICE_ACCOUNT_FIELD).ok_or_else(|| {
            ManagerError::configuration_error(format!(
                "Imagen instance '{}' requires a service account JSON in '{SERVICE_ACCOUNT_FIELD}'",
                instance.name
            ))
        })?;
        let account = ServiceAccountKey::from_json(json)?;
        let scope = instance.custom("scope").unwrap_or(DEFAULT_SCOPE).to_string();
        let tokens = AccessTokenSource::new(transport.client(), account, scope)?;
        let expiry = instance.expiry.clone().unwrap_or_default();

        log_debug!(
            connector = "imagen",
            instance = %instance.name,
            model = %instance.model,
            token_uri = %tokens.token_uri(),
            "Imagen connector initialized"
        );
        Ok(Self {
            instance,
            transport,
            tokens,
            expiry,
        })
    }
}

#[async_trait]
impl Connector for ImagenConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Imagen
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::ImgGen], MODELS)
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
        let ratio = options.first_str("sizes").unwrap_or("1:1");
        if !ASPECT_RATIOS.iter().any(|(key, _)| *key == ratio) {
            return Err(ManagerError::invalid_parameter(
                "sizes",
                format!("unsupported aspect ratio '{ratio}'"),
            ));
        }
        let body = json!({
            "instances": [{"prompt": prompt}],
            "parameters": {
                "sampleCount": 1,
                "safetySetting": "block_few",
                "language": "en",
                "aspectRatio": ratio
            }
        });
        Ok(Payload::post_json(self.instance.endpoint.clone(), body))
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        let token = self.tokens.access_token().await?;
        with_bearer(HttpTransport::json_headers(), &token)
    }

    async fn send(
        &self,
        payload: &Payload,
        headers: HeaderMap,
        _options: &RequestOptions,
    ) -> RequestResponse {
        send_with_token_refresh(&self.transport, &self.tokens, &self.expiry, payload, headers).await
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
        let Some(encoded) = content
            .pointer("/predictions/0/bytesBase64Encoded")
            .and_then(Value::as_str)
        else {
            // Imagen drops filtered predictions instead of failing the call
            return PromptResponse::from_error(&ManagerError::provider_error(
                400,
                "response contains no image prediction",
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
        if status == 400 && error_field(body, "/error/status").as_deref() == Some("INVALID_ARGUMENT") {
            return CONTENT_POLICY_MESSAGE.to_string();
        }
        String::new()
    }

    fn available_options(&self) -> Value {
        let sizes: Vec<Value> = ASPECT_RATIOS
            .iter()
            .map(|(key, name)| json!({"key": key, "displayname": name}))
            .collect();
        json!({ "sizes": sizes })
    }
}
