//! Usage accounting for a single provider call

use serde::{Deserialize, Serialize};

/// How a connector accounts for what a call consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageUnit {
    /// Prompt/completion token counts reported by the provider.
    Token,
    /// A fixed count of 1.0 per call (images, audio, vector operations).
    Count,
}

/// Quantities consumed by one successful provider call.
///
/// All fields are non-negative and `total` is never below `prompt` or
/// `completion`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub total: f64,
    pub prompt: f64,
    pub completion: f64,
}

impl Usage {
    /// Build a usage record, clamping negative values to zero and raising
    /// `total` so it covers both partial counts.
    pub fn new(total: f64, prompt: f64, completion: f64) -> Self {
        let prompt = prompt.max(0.0);
        let completion = completion.max(0.0);
        let total = total.max(prompt).max(completion);
        Self {
            total,
            prompt,
            completion,
        }
    }

    /// Token based usage; the total is the sum of both counts.
    pub fn tokens(prompt: f64, completion: f64) -> Self {
        let prompt = prompt.max(0.0);
        let completion = completion.max(0.0);
        Self::new(prompt + completion, prompt, completion)
    }

    /// Count based usage for a single call.
    pub fn single_call() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }
}
