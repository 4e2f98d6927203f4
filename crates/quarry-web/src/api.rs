//! REST endpoint handlers.
//!
//! A failed run is still a `200` whose `status` says how it ended; only
//! malformed requests are rejected (by axum's `Json` extractor, with a 4xx).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use quarry_rs::agent::{
    ConversationMessage, HistoryTurn, Orchestrator, Question, Role, RunStatus,
};
use quarry_rs::tools::{ParamSpec, ToolInvocationRequest, ToolInvocationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::SERVICE_TITLE;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// GET /: Welcome message.
pub async fn get_root() -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {SERVICE_TITLE} v{}", env!("CARGO_PKG_VERSION")),
        "title": SERVICE_TITLE,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// One entry of `GET /tools`.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

/// GET /tools: Registered tools, in registration order.
pub async fn get_tools(State(app): State<AppState>) -> Json<Vec<ToolInfo>> {
    let tools = app
        .orchestrator
        .registry()
        .list()
        .into_iter()
        .map(|d| ToolInfo {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();
    Json(tools)
}

/// A prior turn in `chat_history`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

impl ChatRequest {
    /// Build the run's question. History turns with roles other than
    /// `user`/`assistant` are skipped.
    pub fn into_question(self) -> Question {
        let history = self
            .chat_history
            .into_iter()
            .filter_map(|turn| {
                let role = match turn.role.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    other => {
                        debug!("Skipping chat_history turn with role '{other}'");
                        return None;
                    }
                };
                Some(HistoryTurn {
                    role,
                    content: turn.content,
                })
            })
            .collect();
        Question::new(self.question).with_history(history)
    }
}

/// Response body for POST /chat.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub status: RunStatus,
    pub steps: u32,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub tool_calls: Vec<ToolInvocationRequest>,
    pub tool_results: Vec<ToolInvocationResult>,
    pub transcript: Vec<ConversationMessage>,
}

/// POST /chat: Answer one question.
pub async fn post_chat(
    State(app): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let response = app.orchestrator.run(body.into_question()).await;
    info!(
        "Chat {} finished: {:?} in {} step(s)",
        response.trace_id, response.status, response.steps
    );

    let tool_calls = response.tool_calls().into_iter().cloned().collect();
    let tool_results = response.tool_results().into_iter().cloned().collect();
    Json(ChatResponse {
        answer: response.answer,
        status: response.status,
        steps: response.steps,
        trace_id: response.trace_id,
        detail: response.detail,
        tool_calls,
        tool_results,
        transcript: response.transcript,
    })
}

/// GET /health: Liveness probe.
pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
