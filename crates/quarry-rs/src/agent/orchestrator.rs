//! The question-answering loop as an explicit state machine.
//!
//! ```text
//! Init ──Start──▶ Reasoning ──ToolRequested──▶ Dispatch
//!                   ▲  │                          │
//!                   │  └─Answered/StepLimit/      │
//!                   │    Failed/Cancelled──▶ Done ◀── Cancelled/Failed
//!                   └────────ToolFinished─────────┘
//! ```
//!
//! Every reasoning entry increments the step counter. Entering `Reasoning`
//! with the counter above `max_steps` ends the run with a degraded answer,
//! so a run makes at most `max_steps` decisions. Recoverable tool failures
//! are written to the transcript and the loop continues; only backend
//! failures, the step bound, and cancellation end a run early.

use crate::agent::config::OrchestratorConfig;
use crate::agent::events::{AgentEvent, AgentResponse, EventHandler, NoopHandler, RunStatus};
use crate::agent::reasoning::{
    Decision, ReasoningBackend, ReasoningStep, build_system_prompt, malformed_notice,
};
use crate::agent::transcript::{AgentState, ConversationMessage, Outcome, Question};
use crate::api::tracing::{TokenUsage, generate_span_id, generate_trace_id};
use crate::error::{AgentError, Result};
use crate::tools::cache::IdempotentCache;
use crate::tools::core::ToolRegistry;
use crate::tools::dispatch::{ToolDispatcher, prepare_arguments};
use crate::tools::invocation::{ToolInvocationRequest, ToolInvocationResult};
use crate::tools::reflection::render_result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const FATAL_ANSWER: &str =
    "Sorry, I could not process your question because the reasoning service failed.";
const CANCELLED_ANSWER: &str = "The request was cancelled before an answer was produced.";

// ── Phases ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Reasoning,
    Dispatch,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    ToolRequested,
    ToolFinished,
    Answered,
    StepLimit,
    Failed,
    Cancelled,
}

impl Transition {
    /// Whether this transition ends the run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Answered | Self::StepLimit | Self::Failed | Self::Cancelled
        )
    }
}

impl Phase {
    /// The transition table. `None` for pairs that cannot occur.
    pub fn next(self, transition: Transition) -> Option<Phase> {
        use Transition::*;
        match (self, transition) {
            (Phase::Init, Start) => Some(Phase::Reasoning),
            (Phase::Reasoning, ToolRequested) => Some(Phase::Dispatch),
            (Phase::Reasoning, Answered | StepLimit | Failed | Cancelled) => Some(Phase::Done),
            (Phase::Dispatch, ToolFinished) => Some(Phase::Reasoning),
            (Phase::Dispatch, Failed | Cancelled) => Some(Phase::Done),
            _ => None,
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Drives runs against a shared registry and reasoning backend.
///
/// Cheap to share: wrap it in an `Arc` and call [`run`](Self::run) from as
/// many tasks as needed. Each run owns its transcript and idempotence cache.
///
/// ```ignore
/// let orchestrator = Orchestrator::new(registry, backend, OrchestratorConfig::default())
///     .with_event_handler(Arc::new(LoggingHandler));
/// let response = orchestrator.run("What's trending today?".into()).await;
/// ```
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    backend: Arc<dyn ReasoningBackend>,
    config: OrchestratorConfig,
    event_handler: Arc<dyn EventHandler>,
}

/// Per-run mutable state threaded through the phases.
struct Run {
    trace_id: String,
    state: AgentState,
    cache: IdempotentCache,
    usage: TokenUsage,
    pending: Option<ToolInvocationRequest>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        backend: Arc<dyn ReasoningBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher =
            ToolDispatcher::new(registry.clone()).with_default_timeout(config.tool_timeout);
        Self {
            registry,
            dispatcher,
            backend,
            config,
            event_handler: Arc::new(NoopHandler),
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer `question`. Never fails: every run ends in an [`AgentResponse`]
    /// whose `status` says how it ended.
    pub async fn run(&self, question: Question) -> AgentResponse {
        self.run_until(question, &|| false).await
    }

    /// Like [`run`](Self::run), but checks `stop` after every reasoning step
    /// and every dispatch; once it returns `true` the run ends as
    /// [`RunStatus::Cancelled`].
    pub async fn run_until(
        &self,
        question: Question,
        stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> AgentResponse {
        let mut run = Run {
            trace_id: generate_trace_id(),
            state: AgentState::new(&question),
            cache: IdempotentCache::new(),
            usage: TokenUsage::default(),
            pending: None,
        };
        self.emit(&AgentEvent::RunStarted {
            trace_id: &run.trace_id,
            question: &question.text,
        });

        let tools = self.registry.list();
        let system_prompt = build_system_prompt(&tools, self.config.instructions.as_deref());

        let mut phase = self.advance(Phase::Init, Transition::Start);
        while phase != Phase::Done {
            let mut transition = match phase {
                Phase::Reasoning => self.reasoning_phase(&system_prompt, &mut run).await,
                Phase::Dispatch => self.dispatch_phase(&mut run).await,
                Phase::Init | Phase::Done => Transition::Failed,
            };
            if !transition.is_terminal() && stop() {
                let step = run.state.step();
                self.emit(&AgentEvent::Cancelled { step });
                run.state.finish(Outcome {
                    status: RunStatus::Cancelled,
                    answer: CANCELLED_ANSWER.into(),
                    detail: Some(format!("{} at step {step}", AgentError::Cancelled)),
                });
                transition = Transition::Cancelled;
            }
            phase = self.advance(phase, transition);
        }

        self.finalize(run)
    }

    fn advance(&self, phase: Phase, transition: Transition) -> Phase {
        phase.next(transition).unwrap_or_else(|| {
            warn!("No transition from {phase:?} on {transition:?}; ending run");
            Phase::Done
        })
    }

    fn emit(&self, event: &AgentEvent<'_>) {
        self.event_handler.on_event(event);
    }

    fn is_idempotent(&self, tool: &str) -> bool {
        self.config.idempotent_tools.contains(tool)
            || self
                .registry
                .lookup(tool)
                .is_ok_and(|entry| entry.descriptor.idempotent)
    }

    /// Arguments identifying an idempotent call, with defaults filled in.
    /// `None` for non-idempotent tools and for calls the dispatcher would
    /// reject anyway.
    fn cache_key(&self, request: &ToolInvocationRequest) -> Option<Value> {
        if !self.is_idempotent(&request.tool) {
            return None;
        }
        let entry = self.registry.lookup(&request.tool).ok()?;
        prepare_arguments(&entry.descriptor, &request.arguments).ok()
    }

    // ── Reasoning ──

    async fn reasoning_phase(&self, system_prompt: &str, run: &mut Run) -> Transition {
        let step = run.state.begin_step();
        let max_steps = self.config.max_steps;
        if step > max_steps {
            self.emit(&AgentEvent::StepLimitReached { max_steps });
            run.state.finish(Outcome {
                status: RunStatus::MaxStepsExceeded,
                answer: step_limit_answer(max_steps, run.state.transcript()),
                detail: Some(AgentError::MaxStepsExceeded { max_steps }.to_string()),
            });
            return Transition::StepLimit;
        }

        self.emit(&AgentEvent::StepStart { step, max_steps });
        debug!(span = %generate_span_id(&run.trace_id, step), "reasoning");

        let decision = match self.decide(step, system_prompt, run).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(kind = e.kind(), "Run {} failed at step {step}: {e}", run.trace_id);
                run.state.finish(Outcome {
                    status: RunStatus::FatalReasoning,
                    answer: FATAL_ANSWER.into(),
                    detail: Some(e.to_string()),
                });
                return Transition::Failed;
            }
        };
        self.emit(&AgentEvent::Decision {
            step,
            decision: &decision,
        });

        match decision {
            Decision::FinalAnswer(answer) => {
                run.state.push(ConversationMessage::assistant(&answer));
                run.state.finish(Outcome {
                    status: RunStatus::Completed,
                    answer,
                    detail: None,
                });
                Transition::Answered
            }
            Decision::CallTool(mut request) => {
                request.position = Some(run.state.transcript().len());
                run.state
                    .push(ConversationMessage::tool_request(request.clone()));
                run.pending = Some(request);
                Transition::ToolRequested
            }
        }
    }

    /// Ask for a decision, retrying malformed output in place up to
    /// `max_decision_attempts` times with a corrective notice each time.
    async fn decide(&self, step: u32, system_prompt: &str, run: &mut Run) -> Result<Decision> {
        let max_attempts = self.config.max_decision_attempts;
        let reasoning = ReasoningStep::new(self.backend.as_ref(), &self.config);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let (decision, usage) = reasoning
                .decide(system_prompt, run.state.transcript())
                .await;
            if let Some((prompt_tokens, completion_tokens)) = usage {
                run.usage.record(prompt_tokens, completion_tokens);
                self.emit(&AgentEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                });
            }
            match decision {
                Err(AgentError::MalformedDecision(reason)) => {
                    self.emit(&AgentEvent::MalformedDecision {
                        step,
                        attempt,
                        max_attempts,
                        reason: &reason,
                    });
                    run.state.push(ConversationMessage::notice(malformed_notice(
                        &reason,
                        attempt,
                        max_attempts,
                    )));
                    last_reason = reason;
                }
                other => return other,
            }
        }

        Err(AgentError::FatalReasoning(format!(
            "no usable decision after {max_attempts} attempt(s): {last_reason}"
        )))
    }

    // ── Dispatch ──

    async fn dispatch_phase(&self, run: &mut Run) -> Transition {
        let Some(request) = run.pending.take() else {
            warn!("Dispatch entered without a pending request");
            run.state.finish(Outcome {
                status: RunStatus::FatalReasoning,
                answer: FATAL_ANSWER.into(),
                detail: Some("dispatch entered without a pending request".into()),
            });
            return Transition::Failed;
        };
        self.emit(&AgentEvent::ToolExecuting { request: &request });

        let cache_key = self.cache_key(&request);
        let cached = cache_key
            .as_ref()
            .and_then(|args| run.cache.get(&request.tool, args, run.state.transcript()));

        let result = match cached {
            Some(hit) => {
                self.emit(&AgentEvent::ToolCacheHit { request: &request });
                hit
            }
            None => match self.dispatcher.dispatch(&request).await {
                Ok(result) => result,
                Err(e) => {
                    debug!(kind = e.kind(), "Dispatch of {} rejected: {e}", request.tool);
                    ToolInvocationResult::from_error(&request.tool, &e)
                }
            },
        };
        self.emit(&AgentEvent::ToolResult { result: &result });

        let content = render_result(
            &request,
            &result,
            &self.registry.names(),
            self.config.max_result_bytes,
        );
        let fresh = !result.cached;
        let index = run
            .state
            .push(ConversationMessage::tool_result(result.clone(), content));
        if let Some(args) = cache_key.filter(|_| fresh) {
            run.cache.put(&request.tool, &args, &result, index);
        }
        Transition::ToolFinished
    }

    // ── Finish ──

    fn finalize(&self, run: Run) -> AgentResponse {
        let Run {
            trace_id,
            state,
            cache,
            usage,
            ..
        } = run;
        let (transcript, outcome, steps) = state.into_parts();
        let outcome = outcome.unwrap_or_else(|| Outcome {
            status: RunStatus::FatalReasoning,
            answer: FATAL_ANSWER.into(),
            detail: Some("run ended without an outcome".into()),
        });
        if cache.hits() > 0 {
            debug!("Run {trace_id}: {} idempotent cache hit(s)", cache.hits());
        }
        self.emit(&AgentEvent::Finished {
            status: outcome.status,
            steps,
        });
        AgentResponse {
            trace_id,
            answer: outcome.answer,
            status: outcome.status,
            detail: outcome.detail,
            steps,
            usage,
            transcript,
        }
    }
}

fn step_limit_answer(max_steps: u32, transcript: &[ConversationMessage]) -> String {
    let tools_used = transcript
        .iter()
        .filter_map(ConversationMessage::result)
        .filter(|r| r.is_success())
        .count();
    if tools_used == 0 {
        format!("I could not reach an answer within {max_steps} reasoning steps.")
    } else {
        format!(
            "I could not reach an answer within {max_steps} reasoning steps. \
             {tools_used} tool result(s) were gathered and are included in the trace."
        )
    }
}
