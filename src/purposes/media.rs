//! Purposes producing or consuming media: speech synthesis, image
//! generation and image description.

use super::{schema, Purpose, PurposeKind};
use crate::core_types::{OptionSchema, ParamType, RequestOptions};
use crate::error::{ManagerError, ManagerResult};
use async_trait::async_trait;

/// Fill in `itemid` and `filename` for purposes whose output is stored as a file.
fn default_file_target(options: &mut RequestOptions, prefix: &str, extension: &str) {
    if options.get_i64("itemid").is_none() {
        options.insert("itemid", 0);
    }
    if options.get_str("filename").is_none() {
        options.insert(
            "filename",
            format!("{prefix}_{}.{extension}", uuid::Uuid::new_v4().simple()),
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextToSpeechPurpose;

#[async_trait]
impl Purpose for TextToSpeechPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Tts
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[
            ("filename", ParamType::Text),
            ("instructions", ParamType::Text),
            ("itemid", ParamType::Int),
            ("voices", ParamType::Array),
        ])
    }

    fn additional_request_options(&mut self, mut options: RequestOptions) -> ManagerResult<RequestOptions> {
        default_file_target(&mut options, "tts", "mp3");
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageGenerationPurpose;

#[async_trait]
impl Purpose for ImageGenerationPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::ImgGen
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[
            ("filename", ParamType::Text),
            ("itemid", ParamType::Int),
            ("sizes", ParamType::Array),
        ])
    }

    fn additional_request_options(&mut self, mut options: RequestOptions) -> ManagerResult<RequestOptions> {
        default_file_target(&mut options, "image", "png");
        Ok(options)
    }
}

/// Describes an image passed as a data URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageToTextPurpose;

#[async_trait]
impl Purpose for ImageToTextPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Itt
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[("image", ParamType::Raw)])
    }

    fn additional_request_options(&mut self, options: RequestOptions) -> ManagerResult<RequestOptions> {
        match options.get("image") {
            None => Err(ManagerError::invalid_parameter("image", "an image is required")),
            Some(image) => match image.as_str().and_then(parse_data_url) {
                Some(_) => Ok(options),
                None => Err(ManagerError::invalid_parameter(
                    "image",
                    "expected a base64 data URL",
                )),
            },
        }
    }
}

/// Split a `data:<mime>;base64,<payload>` URL into mimetype and payload.
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mimetype = header.strip_suffix(";base64")?;
    if mimetype.is_empty() || payload.is_empty() {
        return None;
    }
    Some((mimetype, payload))
}
