//! Text generation purposes sharing one shape: chat, single prompt,
//! feedback, translation and question generation.

use super::{schema, Purpose, PurposeKind};
use crate::core_types::{OptionSchema, ParamType, RequestOptions, UsageUnit};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct TextPurpose {
    kind: PurposeKind,
}

impl TextPurpose {
    pub fn new(kind: PurposeKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Purpose for TextPurpose {
    fn kind(&self) -> PurposeKind {
        self.kind
    }

    fn declare_options(&self) -> OptionSchema {
        match self.kind {
            PurposeKind::Chat => schema(&[
                ("conversationcontext", ParamType::Array),
                ("temperature", ParamType::Float),
            ]),
            PurposeKind::Translate => schema(&[
                ("targetlanguage", ParamType::Text),
                ("temperature", ParamType::Float),
            ]),
            _ => schema(&[("temperature", ParamType::Float)]),
        }
    }

    async fn format_prompt_text(&self, prompt: &str, options: &RequestOptions) -> String {
        match (self.kind, options.get_str("targetlanguage")) {
            (PurposeKind::Translate, Some(language)) => {
                format!("Translate the following text into {language}. Return only the translation.\n\n{prompt}")
            }
            _ => prompt.to_string(),
        }
    }

    fn unit(&self) -> UsageUnit {
        UsageUnit::Token
    }
}

/// Turns text into a vector. Only reached through vector-store connectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingPurpose;

#[async_trait]
impl Purpose for EmbeddingPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Embedding
    }

    fn declare_options(&self) -> OptionSchema {
        OptionSchema::new()
    }

    fn unit(&self) -> UsageUnit {
        UsageUnit::Token
    }
}
