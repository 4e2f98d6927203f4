//! Error taxonomy for registration, dispatch, and the orchestration loop.
//!
//! Tools themselves report failures as plain strings (see
//! [`Tool::invoke`](crate::tools::core::Tool::invoke)); the dispatcher and the
//! orchestrator lift those into [`AgentError`] so callers can match on the
//! failure class instead of parsing messages.

use thiserror::Error;

/// Every failure the agent distinguishes.
///
/// `DuplicateTool` only surfaces at registration time. `UnknownTool`,
/// `InvalidArguments` and `ToolExecution` are recoverable: the orchestrator
/// records them in the transcript and keeps reasoning. `MalformedDecision`
/// is retried in place a bounded number of times. `MaxStepsExceeded`,
/// `FatalReasoning` and `Cancelled` end a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for tool '{tool}': {}", .problems.join("; "))]
    InvalidArguments { tool: String, problems: Vec<String> },

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        tool: String,
        message: String,
        timed_out: bool,
    },

    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    #[error("step limit of {max_steps} reached without a final answer")]
    MaxStepsExceeded { max_steps: u32 },

    #[error("reasoning failed: {0}")]
    FatalReasoning(String),

    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether the loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool(_)
                | Self::InvalidArguments { .. }
                | Self::ToolExecution { .. }
                | Self::MalformedDecision(_)
        )
    }

    /// Short machine-readable label, attached as the `kind` field when the
    /// orchestrator logs a failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateTool(_) => "duplicate_tool",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ToolExecution {
                timed_out: true, ..
            } => "timeout",
            Self::ToolExecution { .. } => "execution",
            Self::MalformedDecision(_) => "malformed_decision",
            Self::MaxStepsExceeded { .. } => "max_steps_exceeded",
            Self::FatalReasoning(_) => "fatal_reasoning",
            Self::Cancelled => "cancelled",
        }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_joins_problems() {
        let err = AgentError::InvalidArguments {
            tool: "search".into(),
            problems: vec!["/query: missing".into(), "/num_results: not an integer".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid arguments for tool 'search': /query: missing; /num_results: not an integer"
        );
    }

    #[test]
    fn recoverable_classes() {
        assert!(AgentError::UnknownTool("x".into()).is_recoverable());
        assert!(AgentError::MalformedDecision("bad".into()).is_recoverable());
        assert!(!AgentError::FatalReasoning("down".into()).is_recoverable());
        assert!(!AgentError::MaxStepsExceeded { max_steps: 6 }.is_recoverable());
        assert!(!AgentError::Cancelled.is_recoverable());
        assert!(!AgentError::DuplicateTool("x".into()).is_recoverable());
    }

    #[test]
    fn timeout_has_its_own_kind() {
        let err = AgentError::ToolExecution {
            tool: "search".into(),
            message: "timed out after 30s".into(),
            timed_out: true,
        };
        assert_eq!(err.kind(), "timeout");
    }
}
