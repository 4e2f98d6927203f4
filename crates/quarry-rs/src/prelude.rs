//! Convenience re-exports for common `quarry-rs` types.
//!
//! ```ignore
//! use quarry_rs::prelude::*;
//! ```
//!
//! Covers what most programs need to build and run an orchestrator. Wire
//! types and the decision parser stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::error::{AgentError, Result};
pub use crate::{OpenRouterClient, json_schema_for};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentResponse, CompositeEventHandler, EventHandler, FnEventHandler, HistoryTurn,
    LoggingHandler, NoopHandler, Orchestrator, OrchestratorConfig, Question, RawDecision,
    ReasoningBackend, ReasoningFuture, ReasoningRequest, Role, RunStatus,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::api::retry::RetryConfig;
pub use crate::tools::{
    FnTool, ParamType, Tool, ToolDescriptor, ToolFuture, ToolRegistry, TrendingTopics, WebSearch,
    parse_tool_args,
};
