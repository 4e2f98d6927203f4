//! Rendering tool results as transcript text.
//!
//! Successful results become their JSON payload (size-capped). Failures get
//! the error plus concrete recovery hints keyed on the error kind, so the
//! next reasoning step can correct course instead of repeating the call.

use crate::tools::core::truncate_result;
use crate::tools::invocation::{ToolErrorKind, ToolInvocationRequest, ToolInvocationResult};

/// Text for the tool message that records `result`.
pub fn render_result(
    request: &ToolInvocationRequest,
    result: &ToolInvocationResult,
    available_tools: &[&str],
    max_bytes: usize,
) -> String {
    match (&result.payload, &result.error) {
        (Some(payload), _) => {
            let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            let cached = if result.cached { " (cached)" } else { "" };
            format!(
                "Tool '{}' succeeded{cached}:\n{}",
                result.tool,
                truncate_result(body, max_bytes)
            )
        }
        (None, Some(error)) => {
            format_tool_failure(request, error.kind, &error.message, available_tools)
        }
        (None, None) => format!("Tool '{}' returned nothing.", result.tool),
    }
}

/// Error text with recovery suggestions.
pub fn format_tool_failure(
    request: &ToolInvocationRequest,
    kind: ToolErrorKind,
    message: &str,
    available_tools: &[&str],
) -> String {
    let mut msg = format!("Error from tool '{}':\n  {message}\n", request.tool);

    let suggestions = suggestions_for(kind, message, available_tools);
    if !suggestions.is_empty() {
        msg.push_str("\nPossible causes and recovery:\n");
        for suggestion in &suggestions {
            msg.push_str(&format!("  - {suggestion}\n"));
        }
    }

    let arguments = request.arguments.to_string();
    let preview: String = arguments.chars().take(200).collect();
    msg.push_str(&format!("\nArguments used: {preview}"));
    if arguments.chars().count() > 200 {
        msg.push_str("...");
    }
    msg
}

fn suggestions_for(kind: ToolErrorKind, message: &str, available_tools: &[&str]) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut suggestions = Vec::new();

    match kind {
        ToolErrorKind::UnknownTool => {
            suggestions.push(format!(
                "Use one of the available tools: {}.",
                if available_tools.is_empty() {
                    "(none)".to_string()
                } else {
                    available_tools.join(", ")
                }
            ));
        }
        ToolErrorKind::InvalidArguments => {
            suggestions.push(
                "Check the tool's parameter list: supply every required parameter with the declared type."
                    .into(),
            );
        }
        ToolErrorKind::Timeout => {
            suggestions.push(
                "The tool took too long. Try a narrower request or answer with what you already have."
                    .into(),
            );
        }
        ToolErrorKind::Panicked => {
            suggestions.push(
                "The tool crashed on this input. Do not repeat the same call; try other arguments or another tool."
                    .into(),
            );
        }
        ToolErrorKind::Execution => {}
    }

    if lower.contains("not set") || lower.contains("api key") || lower.contains("unauthorized") {
        suggestions.push(
            "The tool is not configured on this server. Answer without it.".into(),
        );
    }
    if lower.contains("request failed") || lower.contains("connection") || lower.contains("http 5") {
        suggestions.push(
            "The upstream service looks unavailable. A retry may work; otherwise answer without it."
                .into(),
        );
    }

    if suggestions.is_empty() {
        suggestions.push("Review the error message and adjust your approach.".into());
    }
    suggestions
}
