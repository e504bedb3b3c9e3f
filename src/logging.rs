//! Logging utilities for ai-manager
//!
//! Re-exports tracing macros with log_* naming so every module logs through
//! the same names, whether it is a connector, a purpose or the orchestrator.

pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    trace as log_trace,
    warn as log_warn,
};

/// Shorten free text for log fields (prompts, provider bodies).
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
