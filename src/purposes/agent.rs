//! Form-filling agent
//!
//! The agent receives the elements of a web form, asks the model for values
//! and returns a structured answer of the shape
//! `{"formelements": [...], "chatoutput": [{"type":"intro",..},{"type":"outro",..}]}`.
//! Malformed model output never fails the request: it is replaced with a
//! canned answer in the same shape.

use super::{schema, Purpose, PurposeKind};
use crate::config::ManagerSettings;
use crate::core_types::{OptionSchema, ParamType, RequestOptions, UsageUnit};
use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_warn};
use crate::response_parser::parse_structured;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

const PROMPT_TEMPLATE: &str = include_str!("templates/agent_prompt.md");

/// Characters of documentation inlined per source.
pub const DOCUMENTATION_CHAR_BUDGET: usize = 5000;

/// Intro text of the canned answer used when the model output is unusable.
pub const AGENT_FALLBACK_MESSAGE: &str =
    "Sorry, I could not understand the answer of the AI tool. Please try again.";

static NOISE_ELEMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "footer"]
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).ok())
        .collect()
});

static MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("markup pattern is valid"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

#[derive(Debug)]
pub struct AgentPurpose {
    http: reqwest::Client,
    /// Ids of the form elements offered in the request.
    offered_ids: HashSet<String>,
}

impl AgentPurpose {
    pub fn new(settings: &ManagerSettings) -> ManagerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|e| {
                ManagerError::configuration_error(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            http,
            offered_ids: HashSet::new(),
        })
    }

    /// Ids remembered from the last sanitized request.
    pub fn offered_ids(&self) -> &HashSet<String> {
        &self.offered_ids
    }

    async fn fetch_documentation(&self, url: &str) -> String {
        let response = match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                log_warn!(url = %url, status = response.status().as_u16(), "Documentation fetch returned an error status");
                return String::new();
            }
            Err(e) => {
                log_warn!(url = %url, error = %e, "Documentation fetch failed");
                return String::new();
            }
        };
        match response.text().await {
            Ok(html) => clean_documentation(&html),
            Err(e) => {
                log_warn!(url = %url, error = %e, "Documentation body could not be read");
                String::new()
            }
        }
    }

    /// Keep only form elements the request actually offered.
    fn filter_elements(&self, elements: Option<&Value>) -> Vec<Value> {
        elements
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| {
                        element_id(item).is_some_and(|id| self.offered_ids.contains(&id))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Purpose for AgentPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Agent
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[
            ("conversationcontext", ParamType::Array),
            ("documentationurls", ParamType::Array),
            ("formelements", ParamType::Array),
            ("lang", ParamType::Text),
        ])
    }

    fn additional_request_options(&mut self, options: RequestOptions) -> ManagerResult<RequestOptions> {
        self.offered_ids = options
            .get_array("formelements")
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default();
        log_debug!(offered = self.offered_ids.len(), "Agent form elements offered");
        Ok(options)
    }

    async fn format_prompt_text(&self, prompt: &str, options: &RequestOptions) -> String {
        let formelements = options
            .get("formelements")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let lang = options.get_str("lang").unwrap_or("en");

        let mut documentation = Vec::new();
        for url in options
            .get_array("documentationurls")
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            let content = self.fetch_documentation(url).await;
            if !content.is_empty() {
                documentation.push(format!("Source: {url}\n{content}"));
            }
        }

        let formelements = formelements.to_string();
        let documentation = documentation.join("\n\n");
        fill_template(PROMPT_TEMPLATE, |name| match name {
            "userprompt" => Some(prompt),
            "formelements" => Some(formelements.as_str()),
            "lang" => Some(lang),
            "documentation" => Some(documentation.as_str()),
            _ => None,
        })
    }

    fn format_output(&self, output: String) -> String {
        let Ok(parsed) = parse_structured(&output) else {
            return fallback_answer().to_string();
        };
        let chatoutput = normalize_chat_output(parsed.get("chatoutput"));
        let formelements = self.filter_elements(parsed.get("formelements"));

        let mut answer = match parsed {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        answer.insert("formelements".to_string(), Value::Array(formelements));
        answer.insert("chatoutput".to_string(), chatoutput);
        Value::Object(answer).to_string()
    }

    fn unit(&self) -> UsageUnit {
        UsageUnit::Token
    }
}

/// Replace `{{name}}` placeholders in one pass, so substituted values are
/// never scanned again. Unknown placeholders are kept as written.
fn fill_template<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            value(&caps[1]).map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}

fn element_id(element: &Value) -> Option<String> {
    match element.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Canned answer used when the model output cannot be parsed.
pub fn fallback_answer() -> Value {
    json!({
        "formelements": [],
        "chatoutput": [
            {"type": "intro", "text": AGENT_FALLBACK_MESSAGE},
            {"type": "outro", "text": ""}
        ]
    })
}

/// Reduce chat output to exactly `[intro, outro]`, defaulting missing slots
/// to empty text.
pub fn normalize_chat_output(chatoutput: Option<&Value>) -> Value {
    let text_of = |slot: &str| -> String {
        chatoutput
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item.get("type").and_then(Value::as_str) == Some(slot))
            })
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    json!([
        {"type": "intro", "text": text_of("intro")},
        {"type": "outro", "text": text_of("outro")}
    ])
}

/// Strip page chrome and markup from fetched HTML and truncate it.
pub fn clean_documentation(html: &str) -> String {
    let mut text = html.to_string();
    for pattern in NOISE_ELEMENTS.iter() {
        text = pattern.replace_all(&text, " ").into_owned();
    }
    let text = MARKUP.replace_all(&text, " ");
    let collapsed = WHITESPACE.replace_all(&text, " ");
    collapsed
        .trim()
        .chars()
        .take(DOCUMENTATION_CHAR_BUDGET)
        .collect()
}
