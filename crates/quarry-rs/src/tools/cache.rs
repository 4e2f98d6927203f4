//! Per-run reuse of idempotent tool results.
//!
//! Within one run, a repeated call to an idempotent tool with the same
//! arguments is answered from the earlier successful result instead of being
//! invoked again. Arguments are compared in canonical form (object keys
//! sorted recursively), so `{"a":1,"b":2}` and `{"b":2,"a":1}` hit the same
//! entry. Each entry remembers the transcript position of the tool message
//! that recorded it and is only served while that message still carries the
//! same result.

use crate::agent::transcript::{ConversationMessage, MessageLink};
use crate::tools::invocation::ToolInvocationResult;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CacheEntry {
    canonical_args: String,
    result: ToolInvocationResult,
    transcript_index: usize,
}

/// Successful idempotent results of one run, keyed by
/// `(tool_name, hash(canonical arguments))`.
#[derive(Debug, Default)]
pub struct IdempotentCache {
    entries: HashMap<(String, u64), CacheEntry>,
    hits: u64,
    misses: u64,
}

impl IdempotentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an earlier result for this exact call.
    ///
    /// Returns a copy marked `cached` if one exists and the transcript still
    /// holds it at the recorded position.
    pub fn get(
        &mut self,
        tool_name: &str,
        arguments: &Value,
        transcript: &[ConversationMessage],
    ) -> Option<ToolInvocationResult> {
        let canonical = canonical_json(arguments);
        let key = (tool_name.to_string(), fnv1a(&canonical));
        let hit = self.entries.get(&key).filter(|entry| {
            entry.canonical_args == canonical
                && matches!(
                    transcript.get(entry.transcript_index),
                    Some(ConversationMessage {
                        link: Some(MessageLink::Result(recorded)),
                        ..
                    }) if *recorded == entry.result
                )
        });
        match hit {
            Some(entry) => {
                self.hits += 1;
                Some(entry.result.as_cached())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Remember a successful result recorded at `transcript_index`. Error
    /// results are never stored.
    pub fn put(
        &mut self,
        tool_name: &str,
        arguments: &Value,
        result: &ToolInvocationResult,
        transcript_index: usize,
    ) {
        if !result.is_success() {
            return;
        }
        let canonical = canonical_json(arguments);
        let key = (tool_name.to_string(), fnv1a(&canonical));
        self.entries.insert(
            key,
            CacheEntry {
                canonical_args: canonical,
                result: result.clone(),
                transcript_index,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Serialize `value` with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), sorted(&map[k.as_str()]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// FNV-1a, 64-bit.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::invocation::ToolErrorKind;
    use serde_json::json;

    fn recorded(result: &ToolInvocationResult) -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("what is trending?"),
            ConversationMessage::tool_result(result.clone(), "ok".into()),
        ]
    }

    #[test]
    fn canonical_form_ignores_key_order() {
        let a = json!({"b": 2, "a": {"y": [1, {"d": 0, "c": 1}], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, {"c": 1, "d": 0}]}, "b": 2});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_ne!(canonical_json(&json!([1, 2])), canonical_json(&json!([2, 1])));
    }

    #[test]
    fn hit_after_put() {
        let result = ToolInvocationResult::success("trending_topics", json!({"topics": []}));
        let transcript = recorded(&result);
        let mut cache = IdempotentCache::new();

        assert!(cache.get("trending_topics", &json!({}), &transcript).is_none());
        cache.put("trending_topics", &json!({}), &result, 1);

        let hit = cache.get("trending_topics", &json!({}), &transcript).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.payload, result.payload);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn different_arguments_miss() {
        let result = ToolInvocationResult::success("search", json!({"results": []}));
        let transcript = recorded(&result);
        let mut cache = IdempotentCache::new();
        cache.put("search", &json!({"query": "a"}), &result, 1);
        assert!(cache.get("search", &json!({"query": "b"}), &transcript).is_none());
        assert!(cache.get("other", &json!({"query": "a"}), &transcript).is_none());
    }

    #[test]
    fn errors_are_not_stored() {
        let mut cache = IdempotentCache::new();
        let err = ToolInvocationResult::failure("search", ToolErrorKind::Execution, "down");
        cache.put("search", &json!({}), &err, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_position_is_not_served() {
        let result = ToolInvocationResult::success("search", json!({"results": [1]}));
        let mut cache = IdempotentCache::new();
        cache.put("search", &json!({}), &result, 1);

        let other = ToolInvocationResult::success("search", json!({"results": [2]}));
        let transcript = recorded(&other);
        assert!(cache.get("search", &json!({}), &transcript).is_none());
    }
}
