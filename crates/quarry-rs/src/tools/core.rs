//! Tool abstraction and the registry that names it.
//!
//! The [`Tool`] trait defines the interface every tool implements: a
//! [`ToolDescriptor`] describing it and an async [`Tool::invoke`] taking a
//! validated JSON object of arguments. Tools are collected into a
//! [`ToolRegistry`], which rejects duplicate names and keeps registration
//! order for listing.

use crate::error::{AgentError, Result};
use crate::tools::descriptor::ToolDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, trace};

/// Default cap on the rendered size of a tool payload in the transcript.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// What a tool produces: a JSON payload, or a human-readable error message.
pub type ToolOutput = std::result::Result<Value, String>;

/// Boxed future returned by [`Tool::invoke`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutput> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A capability the agent can invoke by name.
///
/// # Example
///
/// ```ignore
/// struct Clock;
///
/// impl Tool for Clock {
///     fn descriptor(&self) -> ToolDescriptor {
///         ToolDescriptor::builder("clock", "Current UTC time").build()
///     }
///
///     fn invoke(&self, _arguments: &Value) -> ToolFuture<'_> {
///         Box::pin(async { Ok(json!({ "now": chrono::Utc::now().to_rfc3339() })) })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// Name, description, parameters, and execution hints.
    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool. `arguments` is always a JSON object that has already
    /// been validated against the descriptor, with declared defaults filled
    /// in.
    ///
    /// Failures are reported as `Err(message)`; the dispatcher records them
    /// as error results and the run continues.
    fn invoke(&self, arguments: &Value) -> ToolFuture<'_>;

    /// The tool's name (delegates to the descriptor).
    fn name(&self) -> String {
        self.descriptor().name
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A registered tool together with the descriptor captured at registration.
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub tool: Box<dyn Tool>,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .finish()
    }
}

/// Name → tool mapping, built once at startup and read-only afterwards.
///
/// Share it behind an `Arc` once construction is finished; every lookup
/// takes `&self`.
///
/// # Example
///
/// ```ignore
/// let registry = ToolRegistry::new()
///     .with(WebSearch::new())?
///     .with(TrendingTopics::new())?;
///
/// for descriptor in registry.list() {
///     println!("{}", descriptor.name);
/// }
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor's name.
    ///
    /// Fails with [`AgentError::DuplicateTool`] if the name is taken; the
    /// registry is left unchanged.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        let descriptor = tool.descriptor();
        if self.index.contains_key(&descriptor.name) {
            return Err(AgentError::DuplicateTool(descriptor.name));
        }
        debug!(
            "Registered tool {} ({} params, idempotent={})",
            descriptor.name,
            descriptor.parameters.len(),
            descriptor.idempotent
        );
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(RegisteredTool {
            descriptor,
            tool: Box::new(tool),
        });
        Ok(())
    }

    /// The built-in tools: `search` then `trending_topics`.
    ///
    /// `search` reads `BRAVE_SEARCH_KEY` from the environment; without it the
    /// tool is still listed and fails at invocation.
    pub fn with_default_tools() -> Result<Self> {
        Self::new()
            .with(crate::tools::search::WebSearch::new())?
            .with(crate::tools::trending::TrendingTopics::new())
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Register a tool only when `condition` holds (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Result<Self> {
        if condition { self.with(tool) } else { Ok(self) }
    }

    /// Find a tool by exact name.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors of every registered tool, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<dyn Fn(Value) -> ToolFuture<'static> + Send + Sync>;

/// A closure-backed tool with typed arguments and a serializable result.
///
/// Use it for stateless tools; tools that hold clients or caches should be
/// a struct implementing [`Tool`] directly.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct AddArgs { a: i64, b: i64 }
///
/// let add = FnTool::new(
///     ToolDescriptor::builder("add", "Add two integers")
///         .parameters_for::<AddArgs>()
///         .idempotent(true)
///         .build(),
///     |args: AddArgs| async move { Ok::<_, String>(args.a + args.b) },
/// );
/// ```
pub struct FnTool {
    descriptor: ToolDescriptor,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// Wrap `handler`. Arguments are deserialized into `A`; the handler's
    /// `Ok` value is serialized back to JSON.
    pub fn new<A, R, F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        R: serde::Serialize,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, String>> + Send + 'static,
    {
        let erased = move |raw: Value| -> ToolFuture<'static> {
            let args: A = match parse_tool_args(raw) {
                Ok(a) => a,
                Err(e) => return Box::pin(async move { Err(e) }),
            };
            let fut = handler(args);
            Box::pin(async move {
                let out = fut.await?;
                serde_json::to_value(out).map_err(|e| format!("unserializable result: {e}"))
            })
        };

        Self {
            descriptor,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    fn invoke(&self, arguments: &Value) -> ToolFuture<'_> {
        (self.handler)(arguments.clone())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.descriptor.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Deserialize validated arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: Value) -> std::result::Result<T, String> {
    serde_json::from_value(arguments).map_err(|e| format!("invalid tool arguments: {e}"))
}

/// Log a tool call at INFO with a short argument preview.
pub fn log_tool_call(name: &str, arguments: &Value) {
    let raw = arguments.to_string();
    let preview: String = raw.chars().take(120).collect();
    info!(
        "[tool] {name}({preview}{})",
        if raw.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {raw}");
}

/// Truncate `s` to at most `max` bytes on a char boundary, appending a
/// notice if anything was cut.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    let total = s.len();
    let mut out = s;
    out.truncate(cut);
    out.push_str(&format!("...\n[truncated: {total} bytes total]"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::descriptor::ParamType;
    use serde::Deserialize;
    use serde_json::json;

    struct Echo;

    impl Tool for Echo {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builder("echo", "Echo the input")
                .required("text", ParamType::String, "Text to echo")
                .build()
        }

        fn invoke(&self, arguments: &Value) -> ToolFuture<'_> {
            let text = arguments["text"].clone();
            Box::pin(async move { Ok(json!({ "text": text })) })
        }
    }

    struct Clock;

    impl Tool for Clock {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::builder("clock", "Current time").build()
        }

        fn invoke(&self, _arguments: &Value) -> ToolFuture<'_> {
            Box::pin(async { Ok(json!("12:00")) })
        }
    }

    #[test]
    fn default_tools_in_order() {
        let registry = ToolRegistry::with_default_tools().unwrap();
        assert_eq!(registry.names(), vec!["search", "trending_topics"]);
    }

    #[test]
    fn lookup_returns_registered_descriptor() {
        let registry = ToolRegistry::new().with(Echo).unwrap();
        let entry = registry.lookup("echo").unwrap();
        assert_eq!(entry.descriptor, Echo.descriptor());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new().with(Echo).unwrap();
        let err = registry.register(Echo).unwrap_err();
        assert_eq!(err, AgentError::DuplicateTool("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = ToolRegistry::new().with(Echo).unwrap();
        let err = registry.lookup("ech").unwrap_err();
        assert_eq!(err, AgentError::UnknownTool("ech".into()));
    }

    #[test]
    fn list_keeps_registration_order() {
        let registry = ToolRegistry::new()
            .with(Clock)
            .unwrap()
            .with(Echo)
            .unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["clock", "echo"]);
        assert_eq!(registry.names(), vec!["clock", "echo"]);
    }

    #[test]
    fn with_if_skips_when_false() {
        let registry = ToolRegistry::new()
            .with_if(false, Echo)
            .unwrap()
            .with_if(true, Clock)
            .unwrap();
        assert!(!registry.contains("echo"));
        assert!(registry.contains("clock"));
    }

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn fn_tool_parses_and_serializes() {
        let tool = FnTool::new(
            ToolDescriptor::builder("add", "Add")
                .required("a", ParamType::Integer, "first")
                .required("b", ParamType::Integer, "second")
                .build(),
            |args: AddArgs| async move { Ok::<_, String>(args.a + args.b) },
        );
        assert_eq!(tool.name(), "add");
        let out = tool.invoke(&json!({"a": 2, "b": 3})).await;
        assert_eq!(out, Ok(json!(5)));

        let err = tool.invoke(&json!({"a": "two"})).await.unwrap_err();
        assert!(err.starts_with("invalid tool arguments"));
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_result("short".into(), 100), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "知乎热榜".repeat(10);
        let out = truncate_result(s.clone(), 10);
        assert!(out.starts_with("知乎热"));
        assert!(out.contains(&format!("[truncated: {} bytes total]", s.len())));
    }
}
