//! Requests to run a tool and the structured records of what happened.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decision to call one tool with a JSON object of arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool: String,
    pub arguments: Value,
    /// Transcript index of the assistant message that issued this request.
    /// Set by the orchestrator when the request is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl ToolInvocationRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            position: None,
        }
    }

    /// Tagged-JSON form of the request, as written back into the transcript.
    pub fn to_decision_json(&self) -> String {
        serde_json::json!({
            "action": "call_tool",
            "tool": self.tool,
            "arguments": self.arguments,
        })
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Success,
    Error,
}

/// Why an invocation did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    Execution,
    Timeout,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorDetail {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// Outcome of one dispatch. Exactly one of `payload` / `error` is set,
/// matching `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool: String,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorDetail>,
    /// Invocations performed, including retries. Zero when the tool was
    /// never called (validation failure, cache hit).
    pub attempts: u32,
    pub duration_ms: u64,
    /// Served from the run's idempotence cache.
    #[serde(default)]
    pub cached: bool,
}

impl ToolInvocationResult {
    pub fn success(tool: impl Into<String>, payload: Value) -> Self {
        Self {
            tool: tool.into(),
            status: InvocationStatus::Success,
            payload: Some(payload),
            error: None,
            attempts: 1,
            duration_ms: 0,
            cached: false,
        }
    }

    pub fn failure(tool: impl Into<String>, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status: InvocationStatus::Error,
            payload: None,
            error: Some(ToolErrorDetail {
                kind,
                message: message.into(),
            }),
            attempts: 0,
            duration_ms: 0,
            cached: false,
        }
    }

    /// Record a dispatch-level error as an error result for `tool`.
    ///
    /// Errors that cannot come out of a dispatch (loop-level failures such as
    /// `Cancelled`) are recorded as execution errors with their message.
    pub fn from_error(tool: impl Into<String>, error: &AgentError) -> Self {
        let (kind, message) = match error {
            AgentError::UnknownTool(_) => (ToolErrorKind::UnknownTool, error.to_string()),
            AgentError::InvalidArguments { problems, .. } => {
                (ToolErrorKind::InvalidArguments, problems.join("; "))
            }
            AgentError::ToolExecution {
                message,
                timed_out: true,
                ..
            } => (ToolErrorKind::Timeout, message.clone()),
            AgentError::ToolExecution { message, .. } => {
                (ToolErrorKind::Execution, message.clone())
            }
            other => (ToolErrorKind::Execution, other.to_string()),
        };
        Self::failure(tool, kind, message)
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    /// Copy of this result marked as served from cache.
    pub fn as_cached(&self) -> Self {
        Self {
            cached: true,
            attempts: 0,
            duration_ms: 0,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_result_from_invalid_arguments() {
        let err = AgentError::InvalidArguments {
            tool: "search".into(),
            problems: vec!["\"query\" is a required property".into()],
        };
        let result = ToolInvocationResult::from_error("search", &err);
        assert!(!result.is_success());
        assert_eq!(result.attempts, 0);
        let detail = result.error.unwrap();
        assert_eq!(detail.kind, ToolErrorKind::InvalidArguments);
        assert!(detail.message.contains("query"));
    }

    #[test]
    fn timeout_maps_to_timeout_kind() {
        let err = AgentError::ToolExecution {
            tool: "slow".into(),
            message: "timed out after 1s".into(),
            timed_out: true,
        };
        let result = ToolInvocationResult::from_error("slow", &err);
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::Timeout);
    }

    #[test]
    fn serialized_result_omits_absent_side() {
        let ok = ToolInvocationResult::success("search", json!({"results": []}));
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "success");
        assert!(v.get("error").is_none());

        let err = ToolInvocationResult::failure("search", ToolErrorKind::Panicked, "boom");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"]["kind"], "panicked");
        assert!(v.get("payload").is_none());
    }

    #[test]
    fn request_renders_tagged_decision() {
        let req = ToolInvocationRequest::new("search", json!({"query": "rust"}));
        let v: Value = serde_json::from_str(&req.to_decision_json()).unwrap();
        assert_eq!(v["action"], "call_tool");
        assert_eq!(v["tool"], "search");
        assert_eq!(v["arguments"]["query"], "rust");
    }
}
