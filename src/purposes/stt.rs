//! Speech to text

use super::{schema, Purpose, PurposeKind};
use crate::core_types::{strip_tags, OptionSchema, ParamType, RequestOptions};
use crate::error::{ManagerError, ManagerResult};
use async_trait::async_trait;

/// Transcript formats a caller may request.
pub const STT_RESPONSE_FORMATS: [&str; 5] = ["text", "json", "verbose_json", "srt", "vtt"];

#[derive(Debug, Clone, Copy, Default)]
pub struct SpeechToTextPurpose;

#[async_trait]
impl Purpose for SpeechToTextPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Stt
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[
            ("audiofile", ParamType::Raw),
            ("filename", ParamType::Text),
            ("language", ParamType::Text),
            ("prompt", ParamType::Text),
            ("response_format", ParamType::Text),
            ("temperature", ParamType::Float),
            ("timestamp_granularities", ParamType::Array),
        ])
    }

    fn additional_request_options(&mut self, mut options: RequestOptions) -> ManagerResult<RequestOptions> {
        match options.get_str("response_format") {
            None => options.insert("response_format", "text"),
            Some(format) if !STT_RESPONSE_FORMATS.contains(&format) => {
                return Err(ManagerError::invalid_parameter(
                    "response_format",
                    format!("must be one of {}", STT_RESPONSE_FORMATS.join(", ")),
                ));
            }
            Some(_) => {}
        }
        if options.get_f64("temperature").is_none() {
            options.insert("temperature", 0.0);
        }
        Ok(options)
    }

    /// Transcripts are plain text; markup is removed, line breaks kept.
    fn format_output(&self, output: String) -> String {
        strip_tags(&output)
    }
}
