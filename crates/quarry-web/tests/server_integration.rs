//! Integration tests for the quarry-web server.
//!
//! These tests start a real axum server on a random port, backed by a
//! scripted reasoning backend, and exercise every endpoint over HTTP.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use quarry_rs::agent::reasoning::{RawDecision, ReasoningBackend, ReasoningFuture, ReasoningRequest};
use quarry_rs::agent::{Orchestrator, OrchestratorConfig};
use quarry_rs::tools::{FnTool, ParamType, ToolDescriptor, ToolRegistry};
use quarry_web::{WebConfig, spawn_web};
use serde_json::{Value, json};

/// Replays canned replies and records the transcript length of each call.
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<usize>>,
}

impl ReasoningBackend for ScriptedBackend {
    fn complete<'a>(&'a self, request: ReasoningRequest<'a>) -> ReasoningFuture<'a> {
        self.seen.lock().unwrap().push(request.transcript.len());
        let reply = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            reply
                .map(RawDecision::text)
                .ok_or_else(|| "HTTP 400: script exhausted".to_string())
        })
    }
}

fn lookup_tool() -> FnTool {
    FnTool::new(
        ToolDescriptor::builder("lookup", "Look up a fact")
            .required("topic", ParamType::String, "What to look up")
            .idempotent(true)
            .build(),
        |args: Value| async move {
            Ok::<_, String>(json!({ "fact": format!("{} is popular", args["topic"].as_str().unwrap_or("?")) }))
        },
    )
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(replies: &[Value]) -> (Arc<ScriptedBackend>, String) {
    let backend = Arc::new(ScriptedBackend {
        replies: Mutex::new(replies.iter().map(Value::to_string).collect()),
        seen: Mutex::new(Vec::new()),
    });
    let registry = ToolRegistry::new().with(lookup_tool()).unwrap();
    let config = OrchestratorConfig::default().with_reasoning_retries(0);
    let orchestrator = Orchestrator::new(Arc::new(registry), backend.clone(), config);

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
    };
    let addr = spawn_web(Arc::new(orchestrator), config).await.unwrap();
    (backend, format!("http://{addr}"))
}

#[tokio::test]
async fn root_and_health() {
    let (_backend, base) = spawn_test_server(&[]).await;

    let root: Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
    assert_eq!(root["title"], "Quarry QA Agent");
    assert_eq!(root["version"], env!("CARGO_PKG_VERSION"));
    assert!(root["message"].as_str().unwrap().contains("Welcome"));

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn tools_lists_registered_tools() {
    let (_backend, base) = spawn_test_server(&[]).await;

    let tools: Value = reqwest::get(format!("{base}/tools")).await.unwrap().json().await.unwrap();
    let tools = tools.as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "lookup");
    assert_eq!(tools[0]["description"], "Look up a fact");
    assert_eq!(tools[0]["parameters"][0]["name"], "topic");
    assert_eq!(tools[0]["parameters"][0]["type"], "string");
    assert_eq!(tools[0]["parameters"][0]["required"], true);
}

#[tokio::test]
async fn chat_runs_the_agent() {
    let (_backend, base) = spawn_test_server(&[
        json!({ "action": "call_tool", "tool": "lookup", "arguments": { "topic": "rust" } }),
        json!({ "action": "final_answer", "answer": "Rust is popular." }),
    ])
    .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/chat"))
        .json(&json!({ "question": "Is Rust popular?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["answer"], "Rust is popular.");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["steps"], 2);
    assert!(json["trace_id"].as_str().unwrap().starts_with("tr-"));
    assert!(json.get("detail").is_none());
    assert_eq!(json["tool_calls"][0]["tool"], "lookup");
    assert_eq!(json["tool_results"][0]["status"], "success");
    assert_eq!(json["tool_results"][0]["payload"]["fact"], "rust is popular");
    assert_eq!(json["transcript"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn chat_history_seeds_the_run() {
    let (backend, base) = spawn_test_server(&[
        json!({ "action": "final_answer", "answer": "You asked about Rust." }),
    ])
    .await;

    let client = reqwest::Client::new();
    let json: Value = client
        .post(format!("{base}/chat"))
        .json(&json!({
            "question": "What did I ask?",
            "chat_history": [
                { "role": "user", "content": "Tell me about Rust" },
                { "role": "assistant", "content": "Rust is a systems language." }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["status"], "completed");
    assert_eq!(*backend.seen.lock().unwrap(), vec![3]);
}

#[tokio::test]
async fn failed_run_is_still_a_response() {
    // Empty script: the backend fails permanently on the first call.
    let (_backend, base) = spawn_test_server(&[]).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/chat"))
        .json(&json!({ "question": "Hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "fatal_reasoning");
    assert!(!json["answer"].as_str().unwrap().is_empty());
    assert!(json["detail"].as_str().unwrap().contains("HTTP 400"));
}

#[tokio::test]
async fn chat_without_question_is_rejected() {
    let (_backend, base) = spawn_test_server(&[]).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/chat"))
        .json(&json!({ "chat_history": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}
