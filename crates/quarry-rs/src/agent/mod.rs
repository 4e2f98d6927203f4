//! Agent runtime: the [`Orchestrator`] loop and its supporting modules.
//!
//! - [`orchestrator::Orchestrator`]: the reasoning/dispatch state machine.
//!   Start here.
//! - [`config::OrchestratorConfig`]: step bounds, timeouts, model settings.
//! - [`reasoning`]: the [`ReasoningBackend`] trait, decision parsing and
//!   system prompt assembly.
//! - [`transcript`]: messages, questions and per-run [`AgentState`].
//! - [`events`]: [`EventHandler`] trait and [`AgentEvent`] enum for
//!   observing runs, plus the [`AgentResponse`] a run returns.

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod reasoning;
pub mod transcript;

pub use config::OrchestratorConfig;
pub use events::{
    AgentEvent, AgentResponse, CompositeEventHandler, EventHandler, FnEventHandler,
    LoggingHandler, NoopHandler, RunStatus,
};
pub use orchestrator::{Orchestrator, Phase, Transition};
pub use reasoning::{Decision, RawDecision, ReasoningBackend, ReasoningFuture, ReasoningRequest};
pub use transcript::{AgentState, ConversationMessage, HistoryTurn, Outcome, Question, Role};
