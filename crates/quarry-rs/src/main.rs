//! Answer one question with the tool-augmented agent and print the result.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable and the
//! search key from `BRAVE_SEARCH_KEY`.
//!
//! # Examples
//!
//! ```sh
//! # Ask a question
//! quarry --question "What is trending on Zhihu today?"
//!
//! # Pick a model and show every step
//! quarry --question "Who won the 2022 World Cup?" \
//!   --model anthropic/claude-sonnet-4 --trace
//!
//! # Show the registered tools
//! quarry --list-tools
//! ```

use clap::Parser;
use clap::builder::BoolishValueParser;
use quarry_rs::agent::{
    AgentResponse, LoggingHandler, Orchestrator, OrchestratorConfig, Role, RunStatus,
};
use quarry_rs::tools::ToolRegistry;
use quarry_rs::{DEFAULT_MODEL, OpenRouterClient};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Answer a question with web search and trending-topic tools.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "quarry", version)]
struct Cli {
    /// The question to answer
    #[arg(long, short)]
    question: Option<String>,

    /// Model used for reasoning
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Reasoning steps allowed before giving up
    #[arg(long, env = "MAX_STEPS", default_value_t = 6)]
    max_steps: u32,

    /// Timeout for tools that do not set their own, in seconds
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 30)]
    tool_timeout_secs: u64,

    /// Chat completions endpoint (any OpenAI-compatible server)
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    /// Verbose logging
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,

    /// Print the full transcript after the answer
    #[arg(long)]
    trace: bool,

    /// List the registered tools and exit
    #[arg(long)]
    list_tools: bool,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "quarry_rs=debug" } else { "quarry_rs=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_tools(registry: &ToolRegistry) {
    for descriptor in registry.list() {
        println!("{}", descriptor.prompt_listing());
    }
}

fn print_transcript(response: &AgentResponse) {
    eprintln!("── trace {} ──", response.trace_id);
    for (i, message) in response.transcript.iter().enumerate() {
        let role = match message.role {
            Role::User if message.notice => "notice",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        eprintln!("[{i}] {role}: {}", message.content);
    }
    eprintln!(
        "── {} step(s), {} tokens ──",
        response.steps,
        response.usage.total()
    );
}

async fn run(cli: Cli) -> Result<bool, String> {
    let registry = ToolRegistry::with_default_tools().map_err(|e| e.to_string())?;
    if cli.list_tools {
        print_tools(&registry);
        return Ok(true);
    }

    let question = cli
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or("provide --question")?;

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable not set".to_string())?;
    let mut client = OpenRouterClient::new(api_key)?;
    if let Some(url) = cli.base_url {
        client = client.with_url(url);
    }

    let config = OrchestratorConfig::new(cli.model)
        .with_temperature(cli.temperature)
        .with_max_steps(cli.max_steps)
        .with_tool_timeout(Duration::from_secs(cli.tool_timeout_secs));

    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(client), config)
        .with_event_handler(Arc::new(LoggingHandler));

    let response = orchestrator.run(question.into()).await;
    if cli.trace {
        print_transcript(&response);
    }
    println!("{}", response.answer);
    if let Some(detail) = &response.detail {
        eprintln!("({:?}: {detail})", response.status);
    }
    Ok(response.status == RunStatus::Completed)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
