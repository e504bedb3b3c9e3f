//! Purpose strategies
//!
//! A purpose is a category of AI use case (chat, transcription, image
//! generation, ...). It declares which options a caller may pass, turns them
//! into the options sent to the connector, shapes the prompt text and
//! post-processes the provider's output.
//!
//! Purposes are a closed registry: [`PurposeKind`] names every variant and
//! [`PurposeKind::create`] builds a fresh strategy for one request, so request
//! state stashed during sanitization never leaks between callers.

mod agent;
mod media;
mod rag;
mod stt;
mod text;

pub use agent::{
    clean_documentation, fallback_answer, normalize_chat_output, AgentPurpose,
    AGENT_FALLBACK_MESSAGE, DOCUMENTATION_CHAR_BUDGET,
};
pub use media::{parse_data_url, ImageGenerationPurpose, ImageToTextPurpose, TextToSpeechPurpose};
pub use rag::{RagAction, RagPurpose};
pub use stt::{SpeechToTextPurpose, STT_RESPONSE_FORMATS};
pub use text::{EmbeddingPurpose, TextPurpose};

use crate::config::ManagerSettings;
use crate::core_types::{OptionSchema, ParamType, RawOptions, RequestOptions, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every purpose the manager can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeKind {
    Chat,
    SinglePrompt,
    Stt,
    Tts,
    ImgGen,
    Itt,
    Agent,
    Rag,
    Feedback,
    Translate,
    QuestionGeneration,
    /// Internal purpose used by vector-store connectors to embed text.
    Embedding,
}

impl PurposeKind {
    pub const ALL: [PurposeKind; 12] = [
        PurposeKind::Chat,
        PurposeKind::SinglePrompt,
        PurposeKind::Stt,
        PurposeKind::Tts,
        PurposeKind::ImgGen,
        PurposeKind::Itt,
        PurposeKind::Agent,
        PurposeKind::Rag,
        PurposeKind::Feedback,
        PurposeKind::Translate,
        PurposeKind::QuestionGeneration,
        PurposeKind::Embedding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PurposeKind::Chat => "chat",
            PurposeKind::SinglePrompt => "singleprompt",
            PurposeKind::Stt => "stt",
            PurposeKind::Tts => "tts",
            PurposeKind::ImgGen => "imggen",
            PurposeKind::Itt => "itt",
            PurposeKind::Agent => "agent",
            PurposeKind::Rag => "rag",
            PurposeKind::Feedback => "feedback",
            PurposeKind::Translate => "translate",
            PurposeKind::QuestionGeneration => "questiongeneration",
            PurposeKind::Embedding => "embedding",
        }
    }

    /// Build the strategy serving one request of this purpose.
    pub fn create(&self, settings: &ManagerSettings) -> ManagerResult<Box<dyn Purpose>> {
        let purpose: Box<dyn Purpose> = match self {
            PurposeKind::Chat
            | PurposeKind::SinglePrompt
            | PurposeKind::Feedback
            | PurposeKind::Translate
            | PurposeKind::QuestionGeneration => Box::new(TextPurpose::new(*self)),
            PurposeKind::Stt => Box::new(SpeechToTextPurpose::default()),
            PurposeKind::Tts => Box::new(TextToSpeechPurpose),
            PurposeKind::ImgGen => Box::new(ImageGenerationPurpose),
            PurposeKind::Itt => Box::new(ImageToTextPurpose),
            PurposeKind::Agent => Box::new(AgentPurpose::new(settings)?),
            PurposeKind::Rag => Box::new(RagPurpose),
            PurposeKind::Embedding => Box::new(EmbeddingPurpose),
        };
        Ok(purpose)
    }
}

impl fmt::Display for PurposeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurposeKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        PurposeKind::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| ManagerError::invalid_parameter("purpose", format!("unknown purpose '{s}'")))
    }
}

/// Strategy shaping one purpose's requests and responses.
#[async_trait]
pub trait Purpose: Send + Sync + fmt::Debug {
    fn kind(&self) -> PurposeKind;

    /// Accepted option names and their types. Depends only on the purpose.
    fn declare_options(&self) -> OptionSchema;

    /// Hook run after schema validation: inject defaults, check ranges, stash
    /// state for [`Purpose::format_output`].
    fn additional_request_options(&mut self, options: RequestOptions) -> ManagerResult<RequestOptions> {
        Ok(options)
    }

    /// Turn raw caller options into the options sent to the connector.
    ///
    /// Sanitizing already sanitized options returns them unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidParameter`] for undeclared keys, values
    /// of the wrong type and a `temperature` outside `[0, 1]`.
    fn sanitize_request_options(&mut self, raw: &RawOptions) -> ManagerResult<RequestOptions> {
        let schema = self.declare_options();
        let options = RequestOptions::from_raw(&schema, raw)?;
        if schema.contains_key("temperature") {
            validate_temperature(&options)?;
        }
        self.additional_request_options(options)
    }

    /// Literal text sent to the provider.
    async fn format_prompt_text(&self, prompt: &str, _options: &RequestOptions) -> String {
        prompt.to_string()
    }

    /// Post-process the provider output before it reaches the caller. Never fails.
    fn format_output(&self, output: String) -> String {
        output
    }

    /// Unit the caller's quota is counted in.
    fn unit(&self) -> UsageUnit {
        UsageUnit::Count
    }
}

/// Reject a `temperature` outside `[0, 1]`.
pub fn validate_temperature(options: &RequestOptions) -> ManagerResult<()> {
    match options.get_f64("temperature") {
        Some(t) if !(0.0..=1.0).contains(&t) => Err(ManagerError::invalid_parameter(
            "temperature",
            format!("must be between 0 and 1, got {t}"),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn schema(entries: &[(&'static str, ParamType)]) -> OptionSchema {
    entries.iter().copied().collect()
}
