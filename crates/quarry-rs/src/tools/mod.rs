//! Tools the agent can call, and the machinery that calls them.
//!
//! Every capability is a [`Tool`] implementor: a [`ToolDescriptor`] plus an
//! async `invoke`. Tools are registered once in a [`ToolRegistry`] and
//! invoked through the [`ToolDispatcher`], which validates arguments,
//! applies timeouts and retry policy, and turns every failure into a
//! [`ToolInvocationResult`].
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolRegistry`], [`FnTool`].
//! - [`descriptor`]: [`ToolDescriptor`] builder and parameter specs.
//! - [`invocation`]: request/result records kept in the transcript.
//! - [`dispatch`]: validation, timeout, panic isolation, retries.
//! - [`cache`]: per-run short-circuit for idempotent tools.
//! - [`reflection`]: rendering results and failure hints for the model.
//! - [`search`], [`trending`]: the built-in tools. Register both with
//!   [`ToolRegistry::with_default_tools()`].

pub mod cache;
pub mod core;
pub mod descriptor;
pub mod dispatch;
pub mod invocation;
pub mod names;
pub mod reflection;
pub mod search;
pub mod trending;

pub use cache::IdempotentCache;
pub use core::{
    DEFAULT_MAX_RESULT_BYTES, FnTool, RegisteredTool, Tool, ToolFuture, ToolOutput, ToolRegistry,
    parse_tool_args, truncate_result,
};
pub use descriptor::{ParamSpec, ParamType, ToolDescriptor};
pub use dispatch::ToolDispatcher;
pub use invocation::{
    InvocationStatus, ToolErrorDetail, ToolErrorKind, ToolInvocationRequest, ToolInvocationResult,
};
pub use search::WebSearch;
pub use trending::{TrendingTopic, TrendingTopics};
