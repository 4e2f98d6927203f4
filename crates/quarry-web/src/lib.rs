//! HTTP service for the quarry question-answering agent.
//!
//! `quarry-web` wraps an [`Orchestrator`] in a small axum server. Each
//! `POST /chat` request becomes one independent run on its own task; runs
//! share the orchestrator (registry, backend, config) and nothing else.
//!
//! # Quick start
//!
//! ```ignore
//! use quarry_web::{WebConfig, spawn_web};
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(Orchestrator::new(registry, backend, config));
//! let addr = spawn_web(orchestrator, WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /` | Welcome message with service title and version |
//! | `GET /tools` | Registered tools and their parameters |
//! | `POST /chat` | Answer a question, optionally with prior chat history |
//! | `GET /health` | Liveness probe |

mod api;
mod server;

pub use api::{ChatRequest, ChatResponse, ChatTurn, ToolInfo};
pub use server::build_router;

use std::net::SocketAddr;
use std::sync::Arc;

use quarry_rs::agent::Orchestrator;

/// Service title reported by `GET /`.
pub const SERVICE_TITLE: &str = "Quarry QA Agent";

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `0.0.0.0:8000`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down. Fails only if the
/// address cannot be bound.
pub async fn spawn_web(
    orchestrator: Arc<Orchestrator>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(orchestrator);
    server::start_server(router, config.bind_addr).await
}
