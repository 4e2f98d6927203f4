//! Question-answering agent over HTTP.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... BRAVE_SEARCH_KEY=... cargo run -p quarry-web
//! OPENROUTER_KEY=sk-... cargo run -p quarry-web -- --model google/gemini-2.5-flash --port 8080
//! ```
//!
//! Then ask a question:
//!
//! ```bash
//! curl -s localhost:8000/chat -H 'content-type: application/json' \
//!   -d '{"question": "What is trending on Zhihu today?"}'
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use quarry_rs::DEFAULT_MODEL;
use quarry_rs::prelude::*;
use quarry_web::{WebConfig, spawn_web};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Question-answering agent over HTTP.
#[derive(Parser)]
#[command(about = "HTTP service for the tool-augmented QA agent", version)]
struct Args {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// LLM model to use.
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature.
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Reasoning steps allowed per question.
    #[arg(long, env = "MAX_STEPS", default_value_t = 6)]
    max_steps: u32,

    /// Timeout for tools that do not set their own, in seconds.
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 30)]
    tool_timeout_secs: u64,

    /// Chat completions endpoint (any OpenAI-compatible server).
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    /// Verbose logging.
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let default_level = if args.debug {
        "quarry_rs=debug,quarry_web=debug,tower_http=debug"
    } else {
        "quarry_rs=info,quarry_web=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Reasoning backend.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let mut client = OpenRouterClient::new(api_key)?;
    if let Some(url) = args.base_url {
        client = client.with_url(url);
    }

    // 2. Tools, registered once and shared by every request.
    let registry = ToolRegistry::with_default_tools().map_err(|e| e.to_string())?;

    // 3. Orchestrator.
    let config = OrchestratorConfig::new(args.model)
        .with_temperature(args.temperature)
        .with_max_steps(args.max_steps)
        .with_tool_timeout(Duration::from_secs(args.tool_timeout_secs));
    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(client), config)
        .with_event_handler(Arc::new(LoggingHandler));

    // 4. Serve.
    let web_config = WebConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
    };
    let addr = spawn_web(Arc::new(orchestrator), web_config)
        .await
        .map_err(|e| format!("failed to bind {}:{}: {e}", args.host, args.port))?;
    println!("Serving on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let base = ["quarry-web", "--host", "127.0.0.1", "--port", "8000"];
        Args::try_parse_from(base.iter().chain(extra))
    }

    fn debug_from_env(value: &str) -> Result<bool, clap::Error> {
        // SAFETY: this is the only test in the binary, so nothing reads the
        // environment concurrently.
        unsafe { std::env::set_var("DEBUG", value) };
        parse(&[]).map(|args| args.debug)
    }

    #[test]
    fn debug_env_accepts_loose_booleans() {
        for value in ["true", "TRUE", "1", "t", "yes"] {
            assert!(debug_from_env(value).unwrap(), "DEBUG={value}");
        }
        for value in ["False", "false", "0", "f", "no"] {
            assert!(!debug_from_env(value).unwrap(), "DEBUG={value}");
        }
        assert!(debug_from_env("maybe").is_err());

        unsafe { std::env::remove_var("DEBUG") };
        assert!(parse(&["--debug"]).unwrap().debug);
        assert!(!parse(&[]).unwrap().debug);
    }
}
