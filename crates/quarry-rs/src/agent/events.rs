//! Events, handlers, and run results for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! The orchestrator reports progress through [`AgentEvent`] variants that
//! cover one run from start to terminal outcome. Callers implement
//! [`EventHandler`] to observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, or callers that only want the final response |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | A closure for one-off callbacks |
//! | [`CompositeEventHandler`] | Several handlers, called in order |

use crate::agent::reasoning::Decision;
use crate::agent::transcript::ConversationMessage;
use crate::api::tracing::TokenUsage;
use crate::tools::invocation::{ToolInvocationRequest, ToolInvocationResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AgentEvent<'a> {
    /// A run is starting.
    RunStarted { trace_id: &'a str, question: &'a str },
    /// A reasoning step is starting.
    StepStart { step: u32, max_steps: u32 },
    /// The reasoning step produced a well-formed decision.
    Decision { step: u32, decision: &'a Decision },
    /// The backend's output could not be read as a decision. The step will
    /// be attempted again if `attempt < max_attempts`.
    MalformedDecision {
        step: u32,
        attempt: u32,
        max_attempts: u32,
        reason: &'a str,
    },
    /// A tool is about to be dispatched.
    ToolExecuting { request: &'a ToolInvocationRequest },
    /// A dispatch finished (or was answered from the cache).
    ToolResult { result: &'a ToolInvocationResult },
    /// An idempotent call was answered from an earlier result.
    ToolCacheHit { request: &'a ToolInvocationRequest },
    /// Token usage reported by the backend for one call.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// The step bound was hit without a final answer.
    StepLimitReached { max_steps: u32 },
    /// The caller's stop signal was observed.
    Cancelled { step: u32 },
    /// The run reached its terminal state.
    Finished { status: RunStatus, steps: u32 },
}

/// Receives [`AgentEvent`]s from a run. The default implementation ignores
/// everything.
///
/// Handlers are shared across concurrent runs, hence `Send + Sync`.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &AgentEvent<'_>) {
        let _ = event;
    }
}

/// Ignores all events.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let AgentEvent::ToolResult { result } = event {
///         println!("{} -> {:?}", result.tool, result.status);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent<'_>) {
        (self.0)(event)
    }
}

/// Delivers every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(verbose, FnEventHandler::new(print_event));
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::RunStarted { trace_id, question } => {
                let preview: String = question.chars().take(120).collect();
                info!("[{trace_id}] question: {preview}");
            }
            AgentEvent::StepStart { step, max_steps } => {
                info!("[step {step}/{max_steps}]");
            }
            AgentEvent::Decision { step, decision } => match decision {
                Decision::CallTool(request) => {
                    debug!("Step {step}: call {}", request.tool);
                }
                Decision::FinalAnswer(answer) => {
                    debug!("Step {step}: final answer ({} chars)", answer.chars().count());
                }
            },
            AgentEvent::MalformedDecision {
                step,
                attempt,
                max_attempts,
                reason,
            } => {
                warn!("Malformed decision at step {step} ({attempt}/{max_attempts}): {reason}");
            }
            AgentEvent::ToolExecuting { request } => {
                debug!("Dispatching tool: {}", request.tool);
            }
            AgentEvent::ToolResult { result } => {
                debug!(
                    "Tool {} -> {:?} ({} attempt(s), {}ms{})",
                    result.tool,
                    result.status,
                    result.attempts,
                    result.duration_ms,
                    if result.cached { ", cached" } else { "" }
                );
            }
            AgentEvent::ToolCacheHit { request } => {
                debug!("Tool cache hit: {}", request.tool);
            }
            AgentEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            AgentEvent::StepLimitReached { max_steps } => {
                warn!("Step limit ({max_steps}) reached without a final answer");
            }
            AgentEvent::Cancelled { step } => {
                info!("Run cancelled at step {step}");
            }
            AgentEvent::Finished { status, steps } => {
                info!("Run finished: {status:?} after {steps} step(s)");
            }
        }
    }
}

// ── Run result ─────────────────────────────────────────────────────

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The backend produced a final answer.
    Completed,
    /// The step bound was hit; the answer is a degraded fallback.
    MaxStepsExceeded,
    /// The backend failed permanently or kept returning malformed output.
    FatalReasoning,
    /// The caller's stop signal ended the run.
    Cancelled,
}

/// What [`Orchestrator::run`](super::orchestrator::Orchestrator::run) returns.
/// Always produced, whatever happened during the run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub trace_id: String,
    pub answer: String,
    pub status: RunStatus,
    /// Error description for non-completed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Reasoning steps entered, including one that tripped the step bound.
    pub steps: u32,
    pub usage: TokenUsage,
    pub transcript: Vec<ConversationMessage>,
}

impl AgentResponse {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Tool requests issued during the run, in order.
    pub fn tool_calls(&self) -> Vec<&ToolInvocationRequest> {
        self.transcript
            .iter()
            .filter_map(ConversationMessage::request)
            .collect()
    }

    /// Tool results recorded during the run, in order.
    pub fn tool_results(&self) -> Vec<&ToolInvocationResult> {
        self.transcript
            .iter()
            .filter_map(ConversationMessage::result)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn composite_calls_every_handler() {
        let count = Arc::new(AtomicU32::new(0));
        let (a, b) = (count.clone(), count.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with_if(false, NoopHandler)
            .with_opt(Some(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            })));

        handler.on_event(&AgentEvent::StepStart {
            step: 1,
            max_steps: 6,
        });
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let request = ToolInvocationRequest::new("search", serde_json::json!({}));
        let decision = Decision::FinalAnswer("done".into());
        let events = [
            AgentEvent::RunStarted {
                trace_id: "tr-1",
                question: "q",
            },
            AgentEvent::Decision {
                step: 1,
                decision: &decision,
            },
            AgentEvent::ToolExecuting { request: &request },
            AgentEvent::StepLimitReached { max_steps: 6 },
            AgentEvent::Finished {
                status: RunStatus::Completed,
                steps: 1,
            },
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(RunStatus::MaxStepsExceeded).unwrap(),
            "max_steps_exceeded"
        );
    }
}
