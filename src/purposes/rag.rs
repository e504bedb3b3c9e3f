//! Retrieval-augmented generation against a vector store

use super::{schema, Purpose, PurposeKind};
use crate::core_types::{OptionSchema, ParamType, RequestOptions};
use crate::error::{ManagerError, ManagerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a vector-store request does with the prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RagAction {
    /// Embed the text and upsert it together with its metadata.
    Store,
    /// Embed the text and return the nearest stored entries.
    #[default]
    Retrieve,
}

impl RagAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RagAction::Store => "store",
            RagAction::Retrieve => "retrieve",
        }
    }

    /// Action named by validated options, defaulting to retrieve.
    pub fn from_options(options: &RequestOptions) -> ManagerResult<Self> {
        options
            .get_str("action")
            .map_or(Ok(RagAction::Retrieve), str::parse)
    }
}

impl fmt::Display for RagAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RagAction {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(RagAction::Store),
            "retrieve" => Ok(RagAction::Retrieve),
            other => Err(ManagerError::invalid_parameter(
                "action",
                format!("must be 'store' or 'retrieve', got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RagPurpose;

#[async_trait]
impl Purpose for RagPurpose {
    fn kind(&self) -> PurposeKind {
        PurposeKind::Rag
    }

    fn declare_options(&self) -> OptionSchema {
        schema(&[
            ("action", ParamType::Text),
            ("metadata", ParamType::Array),
            ("topk", ParamType::Int),
        ])
    }

    fn additional_request_options(&mut self, mut options: RequestOptions) -> ManagerResult<RequestOptions> {
        let action = RagAction::from_options(&options)?;
        options.insert("action", action.as_str());

        match options.get_i64("topk") {
            None => options.insert("topk", 1),
            Some(k) if k < 1 => {
                return Err(ManagerError::invalid_parameter("topk", "must be at least 1"));
            }
            Some(_) => {}
        }

        if action == RagAction::Store {
            let has_id = options
                .get("metadata")
                .and_then(|m| m.get("id"))
                .is_some_and(|id| !id.is_null() && id.as_str() != Some(""));
            if !has_id {
                return Err(ManagerError::invalid_parameter(
                    "metadata",
                    "storing content requires metadata.id",
                ));
            }
        }
        Ok(options)
    }
}
