//! Option schemas and validated request options
//!
//! Callers hand in free-form key/values ([`RawOptions`]). A purpose declares
//! which keys it accepts and their primitive type ([`OptionSchema`]);
//! [`RequestOptions::from_raw`] rejects undeclared keys and coerces the rest.

use crate::error::{ManagerError, ManagerResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Caller supplied options before validation.
pub type RawOptions = Map<String, Value>;

/// Accepted option names mapped to their primitive type.
pub type OptionSchema = BTreeMap<&'static str, ParamType>;

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("html tag pattern is valid"));

/// Primitive type of a declared option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    /// Plain text; markup is stripped.
    Text,
    /// Passed through untouched (binary payloads, data URLs).
    Raw,
    /// List or keyed structure.
    Array,
}

/// Remove markup from text, keeping line breaks.
pub fn strip_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Validated, type-coerced options for one request.
///
/// Every key was declared by the purpose's schema. Keys are kept in sorted
/// order so serialization is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOptions {
    values: BTreeMap<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate raw caller options against a schema.
    ///
    /// Null values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidParameter`] for undeclared keys and for
    /// values that cannot be coerced to the declared type.
    pub fn from_raw(schema: &OptionSchema, raw: &RawOptions) -> ManagerResult<Self> {
        let mut values = BTreeMap::new();
        for (key, value) in raw {
            let Some(param_type) = schema.get(key.as_str()) else {
                return Err(ManagerError::invalid_parameter(
                    key.clone(),
                    "option is not accepted by this purpose",
                ));
            };
            if value.is_null() {
                continue;
            }
            values.insert(key.clone(), coerce(key, *param_type, value)?);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Text value; empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.values.get(key).and_then(Value::as_array)
    }

    /// First entry of a list option, as used by "sizes" and "voices".
    pub fn first_str(&self, key: &str) -> Option<&str> {
        self.get_array(key)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Options as a raw map, e.g. to feed them back through validation.
    pub fn to_raw(&self) -> RawOptions {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Options as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_raw())
    }
}

fn coerce(key: &str, param_type: ParamType, value: &Value) -> ManagerResult<Value> {
    let invalid = |expected: &str| {
        ManagerError::invalid_parameter(key, format!("expected {expected}, got {value}"))
    };

    match param_type {
        ParamType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::from(f as i64)),
                _ => Err(invalid("an integer")),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("an integer")),
            _ => Err(invalid("an integer")),
        },
        ParamType::Float => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            number
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("a number"))
        }
        ParamType::Text => match value {
            Value::String(s) => Ok(Value::String(strip_tags(s))),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(invalid("text")),
        },
        ParamType::Raw => Ok(value.clone()),
        ParamType::Array => match value {
            Value::Array(_) | Value::Object(_) => Ok(value.clone()),
            _ => Err(invalid("an array")),
        },
    }
}
