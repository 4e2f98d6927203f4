//! Configuration for the [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! ```ignore
//! let config = OrchestratorConfig::new("openai/gpt-4o-mini")
//!     .with_max_steps(8)
//!     .with_temperature(0.2)
//!     .with_tool_timeout(Duration::from_secs(10))
//!     .with_idempotent_tool("search");
//! ```

use crate::DEFAULT_MODEL;
use crate::api::retry::RetryConfig;
use crate::tools::core::DEFAULT_MAX_RESULT_BYTES;
use crate::tools::dispatch::DEFAULT_TOOL_TIMEOUT;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default bound on reasoning steps per run.
pub const DEFAULT_MAX_STEPS: u32 = 6;

/// Default number of attempts a single step gets to produce a well-formed
/// decision.
pub const DEFAULT_MAX_DECISION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model identifier passed to the reasoning backend.
    pub model: String,
    pub temperature: f32,
    /// Completion token cap per reasoning call. Zero leaves it to the backend.
    pub max_tokens: u32,
    pub seed: Option<u64>,
    /// Reasoning steps allowed before the run ends with
    /// `MaxStepsExceeded`. Must be at least 1.
    pub max_steps: u32,
    /// Attempts per step (first try included) to get a parseable decision.
    pub max_decision_attempts: u32,
    /// Timeout for tools that do not declare their own.
    pub tool_timeout: Duration,
    /// Tools treated as idempotent in addition to those whose descriptor
    /// says so.
    pub idempotent_tools: BTreeSet<String>,
    /// Retries for transient backend failures.
    pub reasoning_retry: RetryConfig,
    /// Cap on the rendered size of a tool payload in the transcript.
    pub max_result_bytes: usize,
    /// Extra instructions appended to the system prompt.
    pub instructions: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 0,
            seed: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_decision_attempts: DEFAULT_MAX_DECISION_ATTEMPTS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            idempotent_tools: BTreeSet::new(),
            reasoning_retry: RetryConfig::with_retries(2),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            instructions: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_decision_attempts(mut self, attempts: u32) -> Self {
        self.max_decision_attempts = attempts.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_idempotent_tool(mut self, name: impl Into<String>) -> Self {
        self.idempotent_tools.insert(name.into());
        self
    }

    pub fn with_reasoning_retries(mut self, max_retries: u32) -> Self {
        self.reasoning_retry.max_retries = max_retries;
        self
    }

    pub fn with_reasoning_retry(mut self, retry: RetryConfig) -> Self {
        self.reasoning_retry = retry;
        self
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}
