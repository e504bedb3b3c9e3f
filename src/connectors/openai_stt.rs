//! OpenAI speech to text (Whisper) via multipart upload

use super::http::{HttpTransport, MultipartData, Payload, PayloadBody};
use super::{
    endpoint_url, models_for, openai_headers, parse_json_body, Connector, ConnectorContext,
    ConnectorKind, ModelsByPurpose,
};
use crate::config::InstanceConfig;
use crate::core_types::{PromptResponse, RequestOptions, Usage, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::log_debug;
use crate::purposes::{parse_data_url, PurposeKind, STT_RESPONSE_FORMATS};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value};

/// Upload limit of the transcription API (25 MiB).
pub const MAX_FILE_SIZE: usize = 26_214_400;

const AUDIO_MIMETYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp4",
    "audio/x-m4a",
    "audio/wav",
    "audio/webm",
    "video/mp4",
    "video/mpeg",
    "audio/mpga",
];

const LANGUAGES: &[(&str, &str)] = &[
    ("af", "Afrikaans"),
    ("ar", "Arabic"),
    ("hy", "Armenian"),
    ("az", "Azerbaijani"),
    ("be", "Belarusian"),
    ("bs", "Bosnian"),
    ("bg", "Bulgarian"),
    ("ca", "Catalan"),
    ("zh", "Chinese"),
    ("hr", "Croatian"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("nl", "Dutch"),
    ("en", "English"),
    ("et", "Estonian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("gl", "Galician"),
    ("de", "German"),
    ("el", "Greek"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hu", "Hungarian"),
    ("is", "Icelandic"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("kn", "Kannada"),
    ("kk", "Kazakh"),
    ("ko", "Korean"),
    ("lv", "Latvian"),
    ("lt", "Lithuanian"),
    ("mk", "Macedonian"),
    ("ms", "Malay"),
    ("mr", "Marathi"),
    ("mi", "Maori"),
    ("ne", "Nepali"),
    ("no", "Norwegian"),
    ("fa", "Persian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sr", "Serbian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("es", "Spanish"),
    ("sw", "Swahili"),
    ("sv", "Swedish"),
    ("tl", "Tagalog"),
    ("ta", "Tamil"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("vi", "Vietnamese"),
    ("cy", "Welsh"),
];

#[derive(Debug)]
pub struct OpenAiSttConnector {
    instance: InstanceConfig,
    transport: HttpTransport,
}

impl OpenAiSttConnector {
    pub fn new(instance: InstanceConfig, transport: HttpTransport) -> Self {
        log_debug!(
            connector = "openaistt",
            instance = %instance.name,
            model = %instance.model,
            "OpenAI speech to text connector initialized"
        );
        Self {
            instance,
            transport,
        }
    }
}

/// Decode the `audiofile` option, given as a data URL or plain base64.
///
/// Returns the bytes and the mimetype named by the data URL, if any.
fn decode_audio(raw: &str) -> ManagerResult<(Vec<u8>, Option<String>)> {
    let (mimetype, encoded) = match parse_data_url(raw) {
        Some((mimetype, payload)) => (Some(mimetype.to_string()), payload),
        None => (None, raw),
    };
    let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
        ManagerError::invalid_parameter("audiofile", format!("audio is not valid base64: {e}"))
    })?;
    Ok((bytes, mimetype))
}

fn mimetype_from_filename(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "m4a" => "audio/x-m4a",
        "mp4" => "audio/mp4",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "mpeg" => "video/mpeg",
        "mpga" => "audio/mpga",
        _ => "audio/mpeg",
    }
}

#[async_trait]
impl Connector for OpenAiSttConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::OpenAiStt
    }

    fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn models_for_purposes(&self) -> ModelsByPurpose {
        models_for(&self.instance, &[PurposeKind::Stt], &["whisper-1"])
    }

    fn usage_unit(&self) -> UsageUnit {
        UsageUnit::Count
    }

    async fn build_payload(
        &self,
        _prompt: &str,
        options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> ManagerResult<Payload> {
        let raw = options
            .get_str("audiofile")
            .ok_or_else(|| ManagerError::invalid_parameter("audiofile", "an audio file is required"))?;
        let (bytes, declared_mimetype) = decode_audio(raw)?;
        if bytes.len() > MAX_FILE_SIZE {
            return Err(ManagerError::payload_too_large(MAX_FILE_SIZE, bytes.len()));
        }

        let filename = options.get_str("filename").unwrap_or("audio.mp3").to_string();
        let mimetype =
            declared_mimetype.unwrap_or_else(|| mimetype_from_filename(&filename).to_string());
        if !AUDIO_MIMETYPES.contains(&mimetype.as_str()) {
            return Err(ManagerError::invalid_parameter(
                "audiofile",
                format!("unsupported audio type '{mimetype}'"),
            ));
        }

        let mut fields = vec![("model".to_string(), self.instance.model.clone())];
        for key in ["language", "prompt", "response_format"] {
            if let Some(value) = options.get_str(key) {
                fields.push((key.to_string(), value.to_string()));
            }
        }
        if let Some(temperature) = options.get_f64("temperature") {
            fields.push(("temperature".to_string(), temperature.to_string()));
        }
        for granularity in options
            .get_array("timestamp_granularities")
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            fields.push((
                "timestamp_granularities[]".to_string(),
                granularity.to_string(),
            ));
        }

        Ok(Payload {
            method: Method::POST,
            url: endpoint_url(&self.instance, "audio/transcriptions"),
            body: PayloadBody::Multipart(MultipartData {
                file_field: "file".to_string(),
                filename,
                mimetype,
                bytes,
                fields,
            }),
        })
    }

    async fn build_headers(&self) -> ManagerResult<HeaderMap> {
        openai_headers(&self.instance)
    }

    async fn decode_response(
        &self,
        body: &[u8],
        options: &RequestOptions,
        _ctx: &ConnectorContext<'_>,
    ) -> PromptResponse {
        let transcription = match options.get_str("response_format").unwrap_or("text") {
            "json" | "verbose_json" => match parse_json_body(body) {
                Ok(content) => content
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Err(error) => return error,
            },
            _ => String::from_utf8_lossy(body).into_owned(),
        };
        PromptResponse::success(self.model_name(), Usage::single_call(), transcription)
    }

    fn allowed_mimetypes(&self) -> Vec<&'static str> {
        AUDIO_MIMETYPES.to_vec()
    }

    fn available_options(&self) -> Value {
        let languages: Vec<Value> = LANGUAGES
            .iter()
            .map(|(key, name)| json!({"key": key, "displayname": name}))
            .collect();
        json!({
            "languages": languages,
            "response_formats": STT_RESPONSE_FORMATS,
            "max_file_size": MAX_FILE_SIZE,
            "timestamp_granularities": ["segment", "word"]
        })
    }
}
