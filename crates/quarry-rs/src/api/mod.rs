//! Support for talking to the reasoning backend.
//!
//! - [`retry`] : backoff configuration and the transient-error retry loop
//!   shared by backend calls and tool retries.
//! - [`tracing`] : per-run `trace_id` / per-step `span_id` and token totals.

pub mod retry;
pub mod tracing;

pub use retry::{RetryConfig, retry_transient};
pub use tracing::{TokenUsage, generate_span_id, generate_trace_id};
