//! Run correlation IDs and token accounting.
//!
//! Every orchestrator run gets a `trace_id`; each reasoning step within it
//! gets a `span_id` derived from the trace. Both appear in log lines and in
//! the run's response so a single answer can be traced back through the logs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for a run.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates runs started within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// Span ID for reasoning step `step` of the run identified by `trace_id`.
pub fn generate_span_id(trace_id: &str, step: u32) -> String {
    format!("{trace_id}:s{step}")
}

/// Token usage accumulated over the backend calls of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Add one backend call's usage.
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens += u64::from(prompt_tokens);
        self.completion_tokens += u64::from(completion_tokens);
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
