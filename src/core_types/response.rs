//! Result shapes of a provider call
//!
//! [`RequestResponse`] answers "did the call transmit", [`PromptResponse`]
//! answers "was the content usable". Only the latter ever reaches the caller.

use crate::core_types::usage::Usage;
use crate::error::{ErrorKind, ManagerError};
use serde::{Deserialize, Serialize};

/// Normalized outcome of a request, as returned to the caller.
///
/// Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromptResponse {
    Success {
        model: String,
        usage: Usage,
        content: String,
    },
    Error {
        code: u16,
        /// Message that is safe to show to end users.
        message: String,
        /// Diagnostic details for logs and administrators.
        debuginfo: String,
        kind: ErrorKind,
    },
}

impl PromptResponse {
    pub fn success(model: impl Into<String>, usage: Usage, content: impl Into<String>) -> Self {
        Self::Success {
            model: model.into(),
            usage,
            content: content.into(),
        }
    }

    pub fn error(
        code: u16,
        message: impl Into<String>,
        debuginfo: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        Self::Error {
            code,
            message: message.into(),
            debuginfo: debuginfo.into(),
            kind,
        }
    }

    /// Error response for a pipeline failure: the user-facing message comes
    /// from [`ManagerError::user_message`], the full error goes to `debuginfo`.
    pub fn from_error(error: &ManagerError) -> Self {
        Self::error(
            error.status_code(),
            error.user_message(),
            error.to_string(),
            error.kind(),
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Success { content, .. } => Some(content),
            Self::Error { .. } => None,
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        match self {
            Self::Success { usage, .. } => Some(usage),
            Self::Error { .. } => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Success { model, .. } => Some(model),
            Self::Error { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    pub fn error_code(&self) -> Option<u16> {
        match self {
            Self::Success { .. } => None,
            Self::Error { code, .. } => Some(*code),
        }
    }

    /// Replace the content of a success response, leaving errors untouched.
    pub fn map_content(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            Self::Success {
                model,
                usage,
                content,
            } => Self::Success {
                model,
                usage,
                content: f(content),
            },
            error => error,
        }
    }
}

/// Raw transport-level result of a provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestResponse {
    /// The provider answered with a success status.
    Success { status: u16, body: Vec<u8> },
    /// The call failed. `code` is the provider status, or `0` when nothing
    /// was received (timeout, connection refused, TLS failure).
    Error {
        code: u16,
        message: String,
        debuginfo: String,
        /// Provider error body, kept for custom error message mapping.
        body: Option<String>,
    },
}

impl RequestResponse {
    pub fn success(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::Success {
            status,
            body: body.into(),
        }
    }

    pub fn error(
        code: u16,
        message: impl Into<String>,
        debuginfo: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        Self::Error {
            code,
            message: message.into(),
            debuginfo: debuginfo.into(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Status code of the answer, `0` for transport failures.
    pub fn code(&self) -> u16 {
        match self {
            Self::Success { status, .. } => *status,
            Self::Error { code, .. } => *code,
        }
    }

    /// Body text of an error response, if the provider sent one.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { body, .. } => body.as_deref(),
        }
    }
}
