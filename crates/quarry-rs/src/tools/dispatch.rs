//! Validated, time-bounded, failure-isolated tool invocation.
//!
//! [`ToolDispatcher::dispatch`] is the only path from a decision to a tool:
//!
//! 1. resolve the tool name in the registry,
//! 2. check the arguments against the descriptor and fill in defaults,
//! 3. invoke under the tool's timeout, catching panics,
//! 4. retry per the tool's [`RetryConfig`](crate::api::retry::RetryConfig),
//! 5. package the outcome as a [`ToolInvocationResult`].
//!
//! Resolution and validation failures come back as `Err` and the tool is
//! never invoked. Anything that goes wrong inside the tool comes back as an
//! `Ok` error result; nothing escapes.

use crate::error::{AgentError, Result};
use crate::tools::core::{Tool, ToolRegistry, log_tool_call};
use crate::tools::descriptor::ToolDescriptor;
use crate::tools::invocation::{ToolErrorKind, ToolInvocationRequest, ToolInvocationResult};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout applied to tools that do not declare their own.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs tool invocations against a shared registry.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Timeout for tools whose descriptor leaves it unset.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Resolve, validate and invoke the requested tool.
    ///
    /// Returns `Err(UnknownTool)` or `Err(InvalidArguments)` without invoking
    /// anything. Every other outcome, including timeouts and panics inside
    /// the tool, is an `Ok` result whose `status` says what happened.
    pub async fn dispatch(&self, request: &ToolInvocationRequest) -> Result<ToolInvocationResult> {
        let entry = self.registry.lookup(&request.tool)?;
        let descriptor = &entry.descriptor;
        let arguments = prepare_arguments(descriptor, &request.arguments)?;

        log_tool_call(&descriptor.name, &arguments);
        let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
        let policy = &descriptor.retry;
        let start = Instant::now();

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match invoke_once(entry.tool.as_ref(), &arguments, timeout).await {
                Ok(payload) => break Ok(payload),
                Err((kind, message)) if kind != ToolErrorKind::Panicked && attempt < policy.max_attempts() => {
                    let delay = policy.delay_for_attempt(attempt - 1);
                    warn!(
                        "Tool {} failed (attempt {attempt}/{}): {message}. Retrying in {delay:?}",
                        descriptor.name,
                        policy.max_attempts()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => break Err(failure),
            }
        };

        let elapsed = start.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let result = match outcome {
            Ok(payload) => {
                debug!("Tool {} succeeded in {duration_ms}ms", descriptor.name);
                ToolInvocationResult::success(&descriptor.name, payload)
            }
            Err((ToolErrorKind::Panicked, message)) => {
                warn!("Tool {} panicked: {message}", descriptor.name);
                ToolInvocationResult::failure(&descriptor.name, ToolErrorKind::Panicked, message)
            }
            Err((kind, message)) => {
                info!("Tool {} failed after {duration_ms}ms: {message}", descriptor.name);
                let error = AgentError::ToolExecution {
                    tool: descriptor.name.clone(),
                    message,
                    timed_out: kind == ToolErrorKind::Timeout,
                };
                ToolInvocationResult::from_error(&descriptor.name, &error)
            }
        };
        Ok(result.with_attempts(attempt).with_duration_ms(duration_ms))
    }
}

async fn invoke_once(
    tool: &dyn Tool,
    arguments: &Value,
    timeout: Duration,
) -> std::result::Result<Value, (ToolErrorKind, String)> {
    // A panic may happen while building the future or while polling it.
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| tool.invoke(arguments)))
        .map_err(|p| (ToolErrorKind::Panicked, panic_message(p.as_ref())))?;

    match tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()).await {
        Err(_) => Err((
            ToolErrorKind::Timeout,
            format!("timed out after {:.1}s", timeout.as_secs_f64()),
        )),
        Ok(Err(panic)) => Err((ToolErrorKind::Panicked, panic_message(panic.as_ref()))),
        Ok(Ok(Err(message))) => Err((ToolErrorKind::Execution, message)),
        Ok(Ok(Ok(payload))) => Ok(payload),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}

/// Check `arguments` against the descriptor's schema and return a copy with
/// declared defaults filled in for omitted optional parameters. An explicit
/// `null` for an optional parameter counts as omitted.
pub fn prepare_arguments(descriptor: &ToolDescriptor, arguments: &Value) -> Result<Value> {
    let invalid = |problems: Vec<String>| AgentError::InvalidArguments {
        tool: descriptor.name.clone(),
        problems,
    };

    let mut args = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(invalid(vec![format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            )]));
        }
    };

    args.retain(|name, value| {
        !(value.is_null() && descriptor.param(name).is_some_and(|p| !p.required))
    });

    let schema = descriptor.json_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| invalid(vec![format!("tool declares an unusable schema: {e}")]))?;
    let instance = Value::Object(args.clone());
    let problems: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| {
            let path = e.instance_path().to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();
    if !problems.is_empty() {
        return Err(invalid(problems));
    }

    for param in &descriptor.parameters {
        if let Some(default) = &param.default {
            args.entry(param.name.clone())
                .or_insert_with(|| default.clone());
        }
    }
    Ok(Value::Object(args))
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryConfig;
    use crate::tools::core::ToolFuture;
    use crate::tools::descriptor::ParamType;
    use crate::tools::invocation::InvocationStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicU32>,
        behavior: fn(u32) -> crate::tools::core::ToolOutput,
        retry: RetryConfig,
        timeout: Option<Duration>,
    }

    impl Counting {
        fn new(name: &'static str, behavior: fn(u32) -> crate::tools::core::ToolOutput) -> Self {
            Self {
                name,
                calls: Arc::new(AtomicU32::new(0)),
                behavior,
                retry: RetryConfig::default(),
                timeout: None,
            }
        }
    }

    impl Tool for Counting {
        fn descriptor(&self) -> ToolDescriptor {
            let mut builder = ToolDescriptor::builder(self.name, "test tool")
                .required("query", ParamType::String, "query")
                .optional_with_default("limit", ParamType::Integer, "limit", 5)
                .retry(self.retry.clone());
            if let Some(t) = self.timeout {
                builder = builder.timeout(t);
            }
            builder.build()
        }

        fn invoke(&self, arguments: &Value) -> ToolFuture<'_> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let out = (self.behavior)(n).map(|v| json!({ "echo": arguments, "value": v }));
            Box::pin(async move { out })
        }
    }

    struct Sleeper;

    impl Tool for Sleeper {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builder("sleeper", "Sleeps")
                .timeout(Duration::from_millis(20))
                .build()
        }

        fn invoke(&self, _arguments: &Value) -> ToolFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            })
        }
    }

    struct Panicker;

    impl Tool for Panicker {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builder("panicker", "Panics").build()
        }

        fn invoke(&self, _arguments: &Value) -> ToolFuture<'_> {
            Box::pin(async { panic!("kaboom") })
        }
    }

    fn dispatcher(registry: ToolRegistry) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn success_fills_defaults() {
        let d = dispatcher(ToolRegistry::new().with(Counting::new("t", |_| Ok(json!(1)))).unwrap());
        let result = d
            .dispatch(&ToolInvocationRequest::new("t", json!({"query": "q"})))
            .await
            .unwrap();
        assert_eq!(result.status, InvocationStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.payload.unwrap()["echo"]["limit"], 5);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let d = dispatcher(ToolRegistry::new());
        let err = d
            .dispatch(&ToolInvocationRequest::new("missing", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::UnknownTool("missing".into()));
    }

    #[tokio::test]
    async fn invalid_arguments_skip_invocation() {
        let tool = Counting::new("t", |_| Ok(json!(1)));
        let calls = tool.calls.clone();
        let d = dispatcher(ToolRegistry::new().with(tool).unwrap());

        let missing = d.dispatch(&ToolInvocationRequest::new("t", json!({}))).await;
        assert!(matches!(missing, Err(AgentError::InvalidArguments { .. })));

        let wrong_type = d
            .dispatch(&ToolInvocationRequest::new("t", json!({"query": 42})))
            .await;
        assert!(matches!(wrong_type, Err(AgentError::InvalidArguments { .. })));

        let unexpected = d
            .dispatch(&ToolInvocationRequest::new("t", json!({"query": "q", "lang": "en"})))
            .await;
        assert!(matches!(unexpected, Err(AgentError::InvalidArguments { .. })));

        let not_object = d
            .dispatch(&ToolInvocationRequest::new("t", json!(["query"])))
            .await;
        assert!(matches!(not_object, Err(AgentError::InvalidArguments { .. })));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execution_error_is_recorded() {
        let d = dispatcher(
            ToolRegistry::new()
                .with(Counting::new("t", |_| Err("upstream said no".into())))
                .unwrap(),
        );
        let result = d
            .dispatch(&ToolInvocationRequest::new("t", json!({"query": "q"})))
            .await
            .unwrap();
        let err = result.error.unwrap();
        assert_eq!(err.kind, ToolErrorKind::Execution);
        assert_eq!(err.message, "upstream said no");
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn timeout_is_recorded() {
        let d = dispatcher(ToolRegistry::new().with(Sleeper).unwrap());
        let result = d
            .dispatch(&ToolInvocationRequest::new("sleeper", json!({})))
            .await
            .unwrap();
        assert_eq!(result.error.unwrap().kind, ToolErrorKind::Timeout);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let d = dispatcher(ToolRegistry::new().with(Panicker).unwrap());
        let result = d
            .dispatch(&ToolInvocationRequest::new("panicker", json!({})))
            .await
            .unwrap();
        let err = result.error.unwrap();
        assert_eq!(err.kind, ToolErrorKind::Panicked);
        assert!(err.message.contains("kaboom"));
    }

    #[tokio::test]
    async fn retry_policy_reattempts_failures() {
        let mut tool = Counting::new("flaky", |n| {
            if n < 2 { Err("flaky".into()) } else { Ok(json!("ok")) }
        });
        tool.retry = RetryConfig::with_retries(2).initial_delay(Duration::from_millis(1));
        let calls = tool.calls.clone();
        let d = dispatcher(ToolRegistry::new().with(tool).unwrap());

        let result = d
            .dispatch(&ToolInvocationRequest::new("flaky", json!({"query": "q"})))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn explicit_null_for_optional_param_takes_the_default() {
        let descriptor = Counting::new("t", |_| Ok(json!(1))).descriptor();
        let args = prepare_arguments(&descriptor, &json!({"query": "q", "limit": null})).unwrap();
        assert_eq!(args, json!({"query": "q", "limit": 5}));

        let required_null = prepare_arguments(&descriptor, &json!({"query": null}));
        assert!(matches!(required_null, Err(AgentError::InvalidArguments { .. })));
    }

    #[test]
    fn null_arguments_mean_empty_object() {
        let descriptor = ToolDescriptor::builder("noargs", "No arguments").build();
        assert_eq!(prepare_arguments(&descriptor, &Value::Null).unwrap(), json!({}));
    }
}
