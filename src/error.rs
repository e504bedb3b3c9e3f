//! Error types for AI manager operations.
//!
//! Every failure the request pipeline can produce is a [`ManagerError`].
//! Errors carry enough structure to be:
//! - categorized for routing ([`ManagerError::category`]),
//! - mapped to an HTTP-like status code for the caller-facing
//!   [`PromptResponse`](crate::PromptResponse) ([`ManagerError::status_code`]),
//! - rendered as a message that is safe to show to end users
//!   ([`ManagerError::user_message`]).
//!
//! # Example
//!
//! ```rust
//! use ai_manager::{ManagerError, error::ErrorCategory};
//!
//! let err = ManagerError::invalid_parameter("temperature", "must be between 0 and 1");
//! assert_eq!(err.category(), ErrorCategory::Client);
//! assert_eq!(err.status_code(), 400);
//! ```
//!
//! Use the constructor methods rather than building variants by hand: they
//! log the error at the level matching its severity.

use crate::logging::{log_error, log_info, log_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service failures (AI providers, vector backends, network).
    External,

    /// Internal system errors (bugs, invariant violations, broken setup).
    Internal,

    /// Client errors (invalid options, missing configuration, quota).
    ///
    /// The caller or an administrator can fix these.
    Client,

    /// Temporary failures that a caller may retry on its own schedule.
    ///
    /// The manager itself never retries (apart from the single access token
    /// refresh inside a connector).
    Transient,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// System is unusable or a backend is permanently broken.
    Critical,
    /// Action failed but system is stable.
    Error,
    /// Unexpected but recoverable situation.
    Warning,
    /// Expected failure (validation, quota, not configured).
    Info,
}

/// Taxonomy tag carried by error responses so callers can branch on the kind
/// of failure without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConfigured,
    Disabled,
    InvalidParameter,
    QuotaExceeded,
    TransportError,
    ProviderError,
    MalformedResponse,
    Internal,
}

// ============================================================================
// Manager error type
// ============================================================================

/// Convenient result type for manager operations.
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

/// Errors that can occur while brokering an AI request.
///
/// | Variant | Category | Kind |
/// |---------|----------|------|
/// | `NotConfigured` | Client | NotConfigured |
/// | `InstanceDisabled` | Client | Disabled |
/// | `TenantDisabled` | Client | Disabled |
/// | `InvalidParameter` | Client | InvalidParameter |
/// | `PayloadTooLarge` | Client | InvalidParameter |
/// | `QuotaExceeded` | Client | QuotaExceeded |
/// | `TransportError` | Transient | TransportError |
/// | `ProviderError` | External | ProviderError |
/// | `MalformedResponse` | External | MalformedResponse |
/// | `InitializationFailed` | Internal | Internal |
/// | `ConfigurationError` | Internal | Internal |
#[derive(Error, Debug)]
pub enum ManagerError {
    /// No provider instance is assigned to the purpose for this role.
    #[error("Purpose '{purpose}' is not configured for role '{role}'")]
    NotConfigured {
        /// Purpose name that was requested.
        purpose: String,
        /// Role of the caller.
        role: String,
    },

    /// An instance is assigned but switched off.
    #[error("Instance '{instance}' is disabled")]
    InstanceDisabled {
        /// Name of the disabled instance.
        instance: String,
    },

    /// AI usage is switched off for the caller's tenant.
    #[error("AI usage is disabled for tenant '{tenant}'")]
    TenantDisabled {
        /// Tenant identifier.
        tenant: String,
    },

    /// A caller-supplied option failed schema or range validation.
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter {
        /// Option name.
        parameter: String,
        /// The violated constraint.
        message: String,
    },

    /// A binary upload exceeds the provider's size limit.
    #[error("Payload too large: {actual} bytes > {max} bytes")]
    PayloadTooLarge {
        /// Maximum accepted size in bytes.
        max: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The caller reached the configured request limit.
    #[error("Request limit of {limit} reached for purpose '{purpose}'")]
    QuotaExceeded {
        /// Purpose name.
        purpose: String,
        /// Configured maximum number of requests.
        limit: u64,
    },

    /// Network, timeout or TLS failure reaching the provider.
    #[error("Transport error: {message}")]
    TransportError {
        /// Description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}: {message}")]
    ProviderError {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider message (may contain internals).
        message: String,
    },

    /// The provider answered but the body could not be decoded.
    #[error("Malformed provider response: {message}")]
    MalformedResponse {
        /// Details about the decoding failure.
        message: String,
    },

    /// One-time backend setup failed; the backend stays unusable until the
    /// external status flag is cleared.
    #[error("Backend '{connector}' failed to initialise: {reason}")]
    InitializationFailed {
        /// Connector name.
        connector: String,
        /// Reason recorded for the failure.
        reason: String,
    },

    /// Instance or manager configuration is invalid.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ManagerError {
    /// Get the error category for routing and handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotConfigured { .. }
            | Self::InstanceDisabled { .. }
            | Self::TenantDisabled { .. }
            | Self::InvalidParameter { .. }
            | Self::PayloadTooLarge { .. }
            | Self::QuotaExceeded { .. } => ErrorCategory::Client,
            Self::TransportError { .. } => ErrorCategory::Transient,
            Self::ProviderError { .. } | Self::MalformedResponse { .. } => ErrorCategory::External,
            Self::InitializationFailed { .. } | Self::ConfigurationError { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get the error severity for logging and alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConfigured { .. }
            | Self::InstanceDisabled { .. }
            | Self::TenantDisabled { .. }
            | Self::InvalidParameter { .. }
            | Self::PayloadTooLarge { .. }
            | Self::QuotaExceeded { .. } => ErrorSeverity::Info,
            Self::TransportError { .. } => ErrorSeverity::Warning,
            Self::MalformedResponse { .. } => ErrorSeverity::Warning,
            Self::ProviderError { .. } => ErrorSeverity::Error,
            Self::ConfigurationError { .. } => ErrorSeverity::Error,
            Self::InitializationFailed { .. } => ErrorSeverity::Critical,
        }
    }

    /// Taxonomy tag placed on error responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured { .. } => ErrorKind::NotConfigured,
            Self::InstanceDisabled { .. } | Self::TenantDisabled { .. } => ErrorKind::Disabled,
            Self::InvalidParameter { .. } | Self::PayloadTooLarge { .. } => {
                ErrorKind::InvalidParameter
            }
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::TransportError { .. } => ErrorKind::TransportError,
            Self::ProviderError { .. } => ErrorKind::ProviderError,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::InitializationFailed { .. } | Self::ConfigurationError { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP-like status code used in the error variant of a prompt response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotConfigured { .. } => 404,
            Self::InstanceDisabled { .. } | Self::TenantDisabled { .. } => 403,
            Self::InvalidParameter { .. } => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::QuotaExceeded { .. } => 429,
            Self::TransportError { .. } => 500,
            Self::ProviderError { status, .. } => *status,
            Self::MalformedResponse { .. } => 502,
            Self::InitializationFailed { .. } | Self::ConfigurationError { .. } => 500,
        }
    }

    /// Whether a caller could reasonably try the same request again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportError { .. } => true,
            Self::ProviderError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Convert to a message suitable for end users. Internal details stay in
    /// the debug info of the response.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured { .. } => {
                "This AI function has not been configured yet".to_string()
            }
            Self::InstanceDisabled { .. } => {
                "The AI tool configured for this function is currently unavailable".to_string()
            }
            Self::TenantDisabled { .. } => "AI functions are disabled for your organisation".to_string(),
            Self::InvalidParameter { parameter, message } => {
                format!("Invalid value for '{parameter}': {message}")
            }
            Self::PayloadTooLarge { max, .. } => {
                format!("The uploaded file is too large. The maximum size is {max} bytes")
            }
            Self::QuotaExceeded { .. } => {
                "You have reached the maximum number of requests for this AI function".to_string()
            }
            Self::TransportError { .. } => "Sending the request to the AI tool failed".to_string(),
            Self::ProviderError { .. } => {
                "The AI tool could not process the request".to_string()
            }
            Self::MalformedResponse { .. } => {
                "The AI tool returned a response that could not be processed".to_string()
            }
            Self::InitializationFailed { .. } | Self::ConfigurationError { .. } => {
                "The AI tool is not set up correctly. Please contact your administrator".to_string()
            }
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn not_configured(purpose: impl Into<String>, role: impl Into<String>) -> Self {
        let purpose = purpose.into();
        let role = role.into();
        log_info!(
            error_type = "not_configured",
            purpose = %purpose,
            role = %role,
            "No AI instance assigned to purpose"
        );
        Self::NotConfigured { purpose, role }
    }

    pub fn instance_disabled(instance: impl Into<String>) -> Self {
        let instance = instance.into();
        log_info!(
            error_type = "instance_disabled",
            instance = %instance,
            "Assigned AI instance is disabled"
        );
        Self::InstanceDisabled { instance }
    }

    pub fn tenant_disabled(tenant: impl Into<String>) -> Self {
        let tenant = tenant.into();
        log_info!(
            error_type = "tenant_disabled",
            tenant = %tenant,
            "AI usage disabled for tenant"
        );
        Self::TenantDisabled { tenant }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        let parameter = parameter.into();
        let message = message.into();
        log_info!(
            error_type = "invalid_parameter",
            parameter = %parameter,
            message = %message,
            "Request option rejected"
        );
        Self::InvalidParameter { parameter, message }
    }

    pub fn payload_too_large(max: usize, actual: usize) -> Self {
        log_info!(
            error_type = "payload_too_large",
            max_bytes = max,
            actual_bytes = actual,
            "Upload exceeds provider limit"
        );
        Self::PayloadTooLarge { max, actual }
    }

    pub fn quota_exceeded(purpose: impl Into<String>, limit: u64) -> Self {
        let purpose = purpose.into();
        log_info!(
            error_type = "quota_exceeded",
            purpose = %purpose,
            limit = limit,
            "Caller reached request limit"
        );
        Self::QuotaExceeded { purpose, limit }
    }

    pub fn transport_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "transport_error",
            message = %message,
            has_source = source.is_some(),
            "Provider request could not be transmitted"
        );
        Self::TransportError { message, source }
    }

    pub fn provider_error(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "provider_error",
            status = status,
            message = %message,
            "Provider returned an error status"
        );
        Self::ProviderError { status, message }
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "malformed_response",
            message = %message,
            "Provider response could not be decoded"
        );
        Self::MalformedResponse { message }
    }

    pub fn initialization_failed(connector: impl Into<String>, reason: impl Into<String>) -> Self {
        let connector = connector.into();
        let reason = reason.into();
        log_error!(
            error_type = "initialization_failed",
            connector = %connector,
            reason = %reason,
            "Backend initialisation failed"
        );
        Self::InitializationFailed { connector, reason }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "AI manager configuration invalid"
        );
        Self::ConfigurationError { message }
    }
}
