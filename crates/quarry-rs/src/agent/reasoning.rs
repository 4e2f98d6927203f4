//! One reasoning step: transcript in, exactly one [`Decision`] out.
//!
//! The backend is asked to reply with a single tagged JSON object:
//!
//! ```text
//! {"action": "call_tool", "tool": "search", "arguments": {"query": "..."}}
//! {"action": "final_answer", "answer": "..."}
//! ```
//!
//! The object may be wrapped in a Markdown code fence or surrounded by
//! prose. A backend that answers with one native function call instead is
//! accepted too. Anything else (no object, several objects, several native
//! calls, unknown action, missing fields) is a
//! [`MalformedDecision`](AgentError::MalformedDecision); the orchestrator
//! decides whether to try again.

use crate::agent::config::OrchestratorConfig;
use crate::agent::transcript::{ConversationMessage, Role};
use crate::api::retry::retry_transient;
use crate::error::{AgentError, Result};
use crate::tools::descriptor::ToolDescriptor;
use crate::tools::invocation::ToolInvocationRequest;
use crate::{
    ChatRequest, Message, OpenRouterClient, ResponseFormat, ResponseFormatType, ToolCall,
};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, trace};

// ── Decisions ──────────────────────────────────────────────────────

/// What a reasoning step decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    CallTool(ToolInvocationRequest),
    FinalAnswer(String),
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WireDecision {
    CallTool {
        tool: String,
        #[serde(default)]
        arguments: Option<Value>,
    },
    FinalAnswer {
        answer: String,
    },
}

/// Unparsed backend output for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDecision {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// `(prompt_tokens, completion_tokens)` if the backend reported them.
    pub usage: Option<(u32, u32)>,
}

impl RawDecision {
    /// Text-only output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Read a [`Decision`] out of raw backend output.
pub fn parse_decision(raw: &RawDecision) -> Result<Decision> {
    match raw.tool_calls.as_slice() {
        [] => {}
        [call] => return native_call(call),
        calls => {
            return Err(AgentError::MalformedDecision(format!(
                "expected one decision, got {} tool calls",
                calls.len()
            )));
        }
    }

    let content = raw.content.as_deref().map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(AgentError::MalformedDecision("empty response".into()));
    }

    let value = single_json_object(content)?;
    let wire: WireDecision = serde_json::from_value(value)
        .map_err(|e| AgentError::MalformedDecision(format!("unrecognised decision: {e}")))?;

    match wire {
        WireDecision::CallTool { tool, arguments } => call_tool(tool, arguments),
        WireDecision::FinalAnswer { answer } if answer.trim().is_empty() => Err(
            AgentError::MalformedDecision("final_answer with an empty answer".into()),
        ),
        WireDecision::FinalAnswer { answer } => Ok(Decision::FinalAnswer(answer)),
    }
}

fn native_call(call: &ToolCall) -> Result<Decision> {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        None
    } else {
        Some(serde_json::from_str(raw).map_err(|e| {
            AgentError::MalformedDecision(format!(
                "arguments for '{}' are not valid JSON: {e}",
                call.function.name
            ))
        })?)
    };
    call_tool(call.function.name.clone(), arguments)
}

fn call_tool(tool: String, arguments: Option<Value>) -> Result<Decision> {
    if tool.trim().is_empty() {
        return Err(AgentError::MalformedDecision(
            "call_tool without a tool name".into(),
        ));
    }
    let arguments = match arguments {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(obj @ Value::Object(_)) => obj,
        Some(_) => {
            return Err(AgentError::MalformedDecision(format!(
                "arguments for '{tool}' must be a JSON object"
            )));
        }
    };
    Ok(Decision::CallTool(ToolInvocationRequest::new(tool, arguments)))
}

/// Locate exactly one JSON object in `text`, tolerating code fences and
/// surrounding prose. Every `{` is a candidate start; braces in the prose
/// that do not open valid JSON are skipped.
fn single_json_object(text: &str) -> Result<Value> {
    let body = strip_code_fence(text);
    let mut found = None;
    let mut first_error = None;
    let mut pos = 0;

    while let Some(offset) = body.get(pos..).and_then(|rest| rest.find('{')) {
        let start = pos + offset;
        let rest = body.get(start..).unwrap_or_default();
        let mut values = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                if found.is_some() {
                    return Err(AgentError::MalformedDecision(
                        "expected one decision, got several JSON values".into(),
                    ));
                }
                found = Some(value);
                pos = start + values.byte_offset();
            }
            Some(Err(e)) => {
                first_error.get_or_insert(e);
                pos = start + 1;
            }
            None => break,
        }
    }

    match (found, first_error) {
        (Some(value), _) => Ok(value),
        (None, Some(e)) => Err(AgentError::MalformedDecision(format!("invalid JSON: {e}"))),
        (None, None) => Err(AgentError::MalformedDecision(
            "no JSON object in response".into(),
        )),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Corrective notice appended after a malformed decision.
pub fn malformed_notice(reason: &str, attempt: u32, max_attempts: u32) -> String {
    format!(
        "Your previous reply could not be used ({reason}). Attempt {attempt} of {max_attempts}. \
         Reply with exactly one JSON object: either \
         {{\"action\": \"call_tool\", \"tool\": \"<tool name>\", \"arguments\": {{...}}}} \
         or {{\"action\": \"final_answer\", \"answer\": \"<your answer>\"}}. \
         No other text."
    )
}

// ── Prompt ─────────────────────────────────────────────────────────

/// System prompt listing the tools in registry order and the reply format.
pub fn build_system_prompt(tools: &[ToolDescriptor], instructions: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a question-answering assistant. Answer the user's question accurately, \
         using tools when they help. Answer in the language the user asked in.\n",
    );

    if tools.is_empty() {
        prompt.push_str("\nNo tools are available; answer from your own knowledge.\n");
    } else {
        prompt.push_str("\nAvailable tools:\n");
        for tool in tools {
            prompt.push_str(&tool.prompt_listing());
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nEach reply must be exactly one JSON object and nothing else.\n\
         To call a tool:\n\
         {\"action\": \"call_tool\", \"tool\": \"<tool name>\", \"arguments\": {<arguments>}}\n\
         To give the final answer:\n\
         {\"action\": \"final_answer\", \"answer\": \"<your answer>\"}\n\
         Call one tool at a time. Tool results arrive as the next message. \
         If a tool fails, try different arguments, another tool, or answer with what you have.\n",
    );

    if let Some(extra) = instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push('\n');
        prompt.push_str(extra.trim());
        prompt.push('\n');
    }
    prompt
}

/// Map the transcript to chat messages: tool results and notices travel as
/// user messages, tool requests as the assistant's JSON decision.
pub fn to_wire_messages(system_prompt: &str, transcript: &[ConversationMessage]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(Message::system(system_prompt));
    for msg in transcript {
        messages.push(match msg.role {
            Role::User => Message::user(&msg.content),
            Role::Assistant => Message::assistant(&msg.content),
            Role::Tool => Message::user(format!("[tool result]\n{}", msg.content)),
        });
    }
    messages
}

// ── Backend seam ───────────────────────────────────────────────────

/// Everything a backend needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub system_prompt: &'a str,
    pub transcript: &'a [ConversationMessage],
    pub config: &'a OrchestratorConfig,
}

/// Boxed future returned by [`ReasoningBackend::complete`].
pub type ReasoningFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<RawDecision, String>> + Send + 'a>>;

/// A source of decisions: an LLM endpoint in production, a script in tests.
///
/// Errors are plain strings. Messages that look transient (HTTP 429/5xx,
/// network failures) are retried; anything else ends the run.
pub trait ReasoningBackend: Send + Sync {
    fn complete<'a>(&'a self, request: ReasoningRequest<'a>) -> ReasoningFuture<'a>;
}

impl ReasoningBackend for OpenRouterClient {
    fn complete<'a>(&'a self, request: ReasoningRequest<'a>) -> ReasoningFuture<'a> {
        let body = ChatRequest {
            model: request.config.model.clone(),
            messages: to_wire_messages(request.system_prompt, request.transcript),
            max_tokens: request.config.max_tokens,
            temperature: request.config.temperature,
            seed: request.config.seed,
            response_format: Some(ResponseFormat {
                fmt_type: ResponseFormatType::JsonObject,
            }),
        };
        Box::pin(async move {
            let completion = self.chat(&body).await?;
            Ok(RawDecision {
                content: completion.content,
                tool_calls: completion.tool_calls,
                usage: completion.usage.map(|u| {
                    (
                        u.prompt_tokens.unwrap_or(0),
                        u.completion_tokens.unwrap_or(0),
                    )
                }),
            })
        })
    }
}

/// Calls the backend (with transient retries) and parses its output.
pub struct ReasoningStep<'a> {
    backend: &'a dyn ReasoningBackend,
    config: &'a OrchestratorConfig,
}

impl<'a> ReasoningStep<'a> {
    pub fn new(backend: &'a dyn ReasoningBackend, config: &'a OrchestratorConfig) -> Self {
        Self { backend, config }
    }

    /// One attempt at a decision.
    ///
    /// Backend failures that survive the retry budget become
    /// `FatalReasoning`; unparseable output becomes `MalformedDecision`.
    /// Returns the raw output alongside so callers can account for usage.
    pub async fn decide(
        &self,
        system_prompt: &str,
        transcript: &[ConversationMessage],
    ) -> (Result<Decision>, Option<(u32, u32)>) {
        let request = ReasoningRequest {
            system_prompt,
            transcript,
            config: self.config,
        };
        let raw = match retry_transient(&self.config.reasoning_retry, || {
            self.backend.complete(request)
        })
        .await
        {
            Ok(raw) => raw,
            Err(e) => return (Err(AgentError::FatalReasoning(e)), None),
        };

        trace!("Raw decision: {:?}", raw.content);
        let decision = parse_decision(&raw);
        if let Err(e) = &decision {
            debug!("Could not parse decision: {e}");
        }
        (decision, raw.usage)
    }
}
