//! The conversation record a run reasons over.
//!
//! A transcript is append-only: messages are pushed, never edited or removed,
//! and each tool message links back to the structured result it renders.
//! [`AgentState`] owns the transcript for one run plus the step counter and
//! the terminal outcome, which can be set exactly once.

use crate::agent::events::RunStatus;
use crate::tools::invocation::{ToolInvocationRequest, ToolInvocationResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Structured data behind an assistant or tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum MessageLink {
    Request(ToolInvocationRequest),
    Result(ToolInvocationResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<MessageLink>,
    /// Orchestrator-authored correction (e.g. after a malformed decision),
    /// not something the user said.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub notice: bool,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            link: None,
            notice: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            link: None,
            notice: false,
        }
    }

    /// Assistant message recording a tool request in tagged-JSON form.
    pub fn tool_request(request: ToolInvocationRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: request.to_decision_json(),
            link: Some(MessageLink::Request(request)),
            notice: false,
        }
    }

    /// Tool message carrying `result`, with `content` as its rendered text.
    pub fn tool_result(result: ToolInvocationResult, content: String) -> Self {
        Self {
            role: Role::Tool,
            content,
            link: Some(MessageLink::Result(result)),
            notice: false,
        }
    }

    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            link: None,
            notice: true,
        }
    }

    pub fn request(&self) -> Option<&ToolInvocationRequest> {
        match &self.link {
            Some(MessageLink::Request(r)) => Some(r),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&ToolInvocationResult> {
        match &self.link {
            Some(MessageLink::Result(r)) => Some(r),
            _ => None,
        }
    }
}

/// A prior turn supplied with a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// The input to one run: the question plus optional earlier turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }
}

impl From<&str> for Question {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Question {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: RunStatus,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Mutable state of one run.
#[derive(Debug, Default)]
pub struct AgentState {
    transcript: Vec<ConversationMessage>,
    step: u32,
    outcome: Option<Outcome>,
}

impl AgentState {
    /// Seed the transcript with prior user/assistant turns, then the
    /// question. Tool-role history turns are dropped: they have no
    /// structured result to link to.
    pub fn new(question: &Question) -> Self {
        let mut transcript: Vec<ConversationMessage> = question
            .history
            .iter()
            .filter_map(|turn| match turn.role {
                Role::User => Some(ConversationMessage::user(&turn.content)),
                Role::Assistant => Some(ConversationMessage::assistant(&turn.content)),
                Role::Tool => None,
            })
            .collect();
        transcript.push(ConversationMessage::user(&question.text));
        Self {
            transcript,
            step: 0,
            outcome: None,
        }
    }

    /// Append a message; returns its transcript index.
    pub fn push(&mut self, message: ConversationMessage) -> usize {
        self.transcript.push(message);
        self.transcript.len() - 1
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    /// Enter the next reasoning step; returns its 1-based number.
    pub fn begin_step(&mut self) -> u32 {
        self.step += 1;
        self.step
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Record the terminal outcome. Returns `false`, leaving the first
    /// outcome in place, if one was already recorded.
    pub fn finish(&mut self, outcome: Outcome) -> bool {
        if let Some(existing) = &self.outcome {
            warn!(
                "Ignoring second terminal outcome {:?}; run already ended as {:?}",
                outcome.status, existing.status
            );
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Consume the state into its transcript and outcome.
    pub fn into_parts(self) -> (Vec<ConversationMessage>, Option<Outcome>, u32) {
        (self.transcript, self.outcome, self.step)
    }
}
