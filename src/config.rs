//! Manager settings and connector instance configuration.
//!
//! Instance configuration is owned by an external store (see
//! [`ConfigStore`](crate::ConfigStore)); the manager treats each
//! [`InstanceConfig`] as read-only for the duration of one request.

use crate::connectors::ConnectorKind;
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Process-wide settings applied when connectors are constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Uniform per-call transport timeout.
    pub request_timeout: Duration,
    /// Verify provider TLS certificates.
    pub verify_ssl: bool,
    /// Consult the embedding cache before computing embeddings.
    pub use_embedding_cache: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            verify_ssl: true,
            use_embedding_cache: false,
        }
    }
}

impl ManagerSettings {
    /// Read settings from the environment.
    ///
    /// Recognized variables: `AI_MANAGER_REQUEST_TIMEOUT` (seconds),
    /// `AI_MANAGER_VERIFY_SSL` and `AI_MANAGER_USE_EMBEDDING_CACHE`.
    /// Unset or unparsable values keep their default.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(secs) = Self::env_param::<u64>("AI_MANAGER_REQUEST_TIMEOUT") {
            if secs == 0 {
                log_warn!("AI_MANAGER_REQUEST_TIMEOUT must be positive, keeping default");
            } else {
                settings.request_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(verify) = Self::env_flag("AI_MANAGER_VERIFY_SSL") {
            settings.verify_ssl = verify;
        }
        if let Some(cache) = Self::env_flag("AI_MANAGER_USE_EMBEDDING_CACHE") {
            settings.use_embedding_cache = cache;
        }

        log_debug!(
            request_timeout_secs = settings.request_timeout.as_secs(),
            verify_ssl = settings.verify_ssl,
            use_embedding_cache = settings.use_embedding_cache,
            "Manager settings loaded from environment"
        );
        settings
    }

    fn env_param<T: std::str::FromStr>(key: &str) -> Option<T> {
        let raw = std::env::var(key).ok()?;
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                log_warn!(variable = key, value = %raw, "Ignoring unparsable setting");
                None
            }
        }
    }

    fn env_flag(key: &str) -> Option<bool> {
        let raw = std::env::var(key).ok()?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                log_warn!(variable = key, value = %raw, "Ignoring unparsable flag");
                None
            }
        }
    }
}

/// Routing of an instance through Azure OpenAI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AzureOptions {
    pub enabled: bool,
    pub resource: String,
    pub deployment: String,
    pub api_version: String,
}

impl AzureOptions {
    /// Model alias used for Azure deployments.
    pub fn model_alias(model: &str) -> String {
        format!("{model}-azure")
    }

    /// Deployment URL for an OpenAI API path such as `images/generations`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "https://{}.openai.azure.com/openai/deployments/{}/{}?api-version={}",
            self.resource, self.deployment, path, self.api_version
        )
    }
}

/// Recognizes a failure caused by an expired short-lived access token.
///
/// Matching is provider specific, so each instance carries its own detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryDetector {
    pub status: u16,
    /// Substring the error body must contain. Empty matches any body.
    pub body_marker: String,
}

impl Default for ExpiryDetector {
    fn default() -> Self {
        Self {
            status: 401,
            body_marker: "UNAUTHENTICATED".to_string(),
        }
    }
}

impl ExpiryDetector {
    pub fn matches(&self, status: u16, body: Option<&str>) -> bool {
        if status != self.status {
            return false;
        }
        self.body_marker.is_empty()
            || body.is_some_and(|body| body.contains(self.body_marker.as_str()))
    }
}

/// A configured, credentialed deployment of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub connector: ConnectorKind,
    pub model: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub azure: Option<AzureOptions>,
    #[serde(default)]
    pub expiry: Option<ExpiryDetector>,
    /// Per-connector extra fields (token endpoints, collection names, ...).
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl InstanceConfig {
    pub fn new(
        name: impl Into<String>,
        connector: ConnectorKind,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: None,
            temperature: None,
            enabled: true,
            azure: None,
            expiry: None,
            custom: HashMap::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_azure(mut self, azure: AzureOptions) -> Self {
        self.azure = Some(azure);
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn with_expiry(mut self, detector: ExpiryDetector) -> Self {
        self.expiry = Some(detector);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Azure options, if Azure routing is switched on.
    pub fn azure(&self) -> Option<&AzureOptions> {
        self.azure.as_ref().filter(|a| a.enabled)
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Endpoint with a trailing slash, for joining relative paths.
    pub fn base_endpoint(&self) -> String {
        if self.endpoint.ends_with('/') {
            self.endpoint.clone()
        } else {
            format!("{}/", self.endpoint)
        }
    }

    /// Validate the configuration is complete for its connector.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigurationError`] if:
    /// - the name or model is empty,
    /// - no endpoint is set and the instance is not routed through Azure,
    /// - the connector requires an API key and none is set,
    /// - Azure routing is on but resource, deployment or API version is missing,
    /// - the default temperature is outside `[0, 1]`.
    pub fn validate(&self) -> ManagerResult<()> {
        if self.name.trim().is_empty() {
            return Err(ManagerError::configuration_error("Instance name is required"));
        }
        if self.model.trim().is_empty() {
            return Err(ManagerError::configuration_error(format!(
                "Instance '{}' has no model",
                self.name
            )));
        }
        match self.azure() {
            Some(azure) => {
                if azure.resource.is_empty()
                    || azure.deployment.is_empty()
                    || azure.api_version.is_empty()
                {
                    return Err(ManagerError::configuration_error(format!(
                        "Instance '{}' enables Azure without resource, deployment and API version",
                        self.name
                    )));
                }
            }
            None if self.endpoint.trim().is_empty() => {
                return Err(ManagerError::configuration_error(format!(
                    "Instance '{}' has no endpoint",
                    self.name
                )));
            }
            None => {}
        }
        if self.connector.requires_api_key() && self.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ManagerError::configuration_error(format!(
                "Instance '{}' requires an API key for connector '{}'",
                self.name, self.connector
            )));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ManagerError::configuration_error(format!(
                    "Instance '{}' default temperature {t} is outside [0, 1]",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
