//! HTTP transport shared by all connectors
//!
//! Wraps one `reqwest::Client` per connector instance, configured with the
//! uniform request timeout. Every outcome, including connection failures,
//! is returned as a [`RequestResponse`].

use crate::config::ManagerSettings;
use crate::core_types::RequestResponse;
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_error, log_trace, preview};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;
use std::time::Instant;

/// Binary upload with accompanying text fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartData {
    pub file_field: String,
    pub filename: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
    /// Text fields in send order. Repeated names are sent repeatedly.
    pub fields: Vec<(String, String)>,
}

impl MultipartData {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build a fresh form; reqwest forms are consumed when sent.
    fn to_form(&self) -> Result<Form, reqwest::Error> {
        let file = Part::bytes(self.bytes.clone())
            .file_name(self.filename.clone())
            .mime_str(&self.mimetype)?;
        let form = self
            .fields
            .iter()
            .fold(Form::new(), |form, (k, v)| form.text(k.clone(), v.clone()));
        Ok(form.part(self.file_field.clone(), file))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    Json(Value),
    Multipart(MultipartData),
    Empty,
}

/// A provider request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub method: Method,
    pub url: String,
    pub body: PayloadBody,
}

impl Payload {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: PayloadBody::Json(body),
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            PayloadBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigurationError`] if the TLS backend cannot
    /// be initialised.
    pub fn new(settings: &ManagerSettings) -> ManagerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|e| {
                ManagerError::configuration_error(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Underlying client, for auxiliary calls such as token requests.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// JSON content type plus `Authorization: Bearer <key>`.
    pub fn bearer_headers(api_key: &str) -> ManagerResult<HeaderMap> {
        let mut headers = Self::json_headers();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                ManagerError::configuration_error(format!("Invalid API key format: {e}"))
            })?,
        );
        Ok(headers)
    }

    /// JSON content type plus the Azure `api-key` header instead of `Authorization`.
    pub fn api_key_headers(api_key: &str) -> ManagerResult<HeaderMap> {
        let mut headers = Self::json_headers();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key).map_err(|e| {
                ManagerError::configuration_error(format!("Invalid API key format: {e}"))
            })?,
        );
        Ok(headers)
    }

    pub fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Send a payload once.
    pub async fn execute(&self, payload: &Payload, mut headers: HeaderMap) -> RequestResponse {
        let started = Instant::now();
        log_trace!(method = %payload.method, url = %payload.url, "Sending provider request");
        let mut request = self.client.request(payload.method.clone(), &payload.url);

        request = match &payload.body {
            PayloadBody::Json(body) => request.json(body),
            PayloadBody::Multipart(data) => {
                // reqwest sets the multipart boundary itself
                headers.remove(CONTENT_TYPE);
                match data.to_form() {
                    Ok(form) => request.multipart(form),
                    Err(e) => {
                        return RequestResponse::error(
                            0,
                            "Invalid upload",
                            format!("Building multipart form failed: {e}"),
                            None,
                        );
                    }
                }
            }
            PayloadBody::Empty => request,
        };

        let response = match request.headers(headers).send().await {
            Ok(response) => response,
            Err(e) => {
                log_error!(url = %payload.url, error = %e, "HTTP request failed");
                let message = if e.is_timeout() {
                    "Request to the AI tool timed out"
                } else {
                    "Could not connect to the AI tool"
                };
                return RequestResponse::error(0, message, format!("Request failed: {e}"), None);
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                log_error!(url = %payload.url, error = %e, "Failed to read response body");
                return RequestResponse::error(
                    0,
                    "Reading the response of the AI tool failed",
                    format!("Failed to read response: {e}"),
                    None,
                );
            }
        };

        log_debug!(
            url = %payload.url,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            body_bytes = body.len(),
            "Provider call finished"
        );

        if status.is_success() {
            return RequestResponse::success(status.as_u16(), body);
        }

        let error_text = String::from_utf8_lossy(&body).into_owned();
        log_error!(
            status = status.as_u16(),
            error_text = %preview(&error_text, 500),
            "API error response"
        );
        let mut debuginfo = format!("API error {status}: {error_text}");
        if let Some(secs) = retry_after {
            debuginfo.push_str(&format!(" (retry after {secs}s)"));
        }
        RequestResponse::error(
            status.as_u16(),
            status
                .canonical_reason()
                .unwrap_or("Provider error")
                .to_string(),
            debuginfo,
            Some(error_text),
        )
    }
}
