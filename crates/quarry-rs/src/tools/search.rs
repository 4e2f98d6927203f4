//! `search`: web search via the Brave Search API.
//!
//! Requires `BRAVE_SEARCH_KEY` (free tier: 2000 queries/month at
//! <https://brave.com/search/api/>). Without a key the tool stays registered
//! and every invocation fails with an explanatory error, which the agent sees
//! and can work around.

use crate::tools::core::{Tool, ToolFuture, parse_tool_args};
use crate::tools::descriptor::ToolDescriptor;
use crate::tools::names;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_NUM_RESULTS: u32 = 5;
const MAX_NUM_RESULTS: u32 = 20;

/// Arguments for `search`.
#[derive(Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query, e.g. 'rust 1.93 release notes'.
    pub query: String,
    /// Number of results to return (max 20).
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

fn default_num_results() -> u32 {
    DEFAULT_NUM_RESULTS
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

pub struct WebSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearch {
    /// Reads the API key from `BRAVE_SEARCH_KEY`.
    pub fn new() -> Self {
        Self::with_api_key(std::env::var("BRAVE_SEARCH_KEY").ok())
    }

    pub fn with_api_key(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: BRAVE_ENDPOINT.to_string(),
        }
    }

    /// Override the Brave endpoint (proxies, regional mirrors).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn brave_search(&self, query: &str, count: u32) -> Result<Vec<SearchHit>, String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            "BRAVE_SEARCH_KEY not set. Get a free API key at https://brave.com/search/api/"
                .to_string()
        })?;

        let url = format!("{}?q={}&count={count}", self.endpoint, urlencoded(query));
        let resp = self
            .client
            .get(&url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e: reqwest::Error| format!("unreadable search response: {e}"))?;
        Ok(parse_brave_results(&body, count as usize))
    }
}

impl Tool for WebSearch {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builder(
            names::SEARCH,
            "Search the web for current information. Returns titles, links and snippets. \
             Use specific, targeted queries.",
        )
        .parameters_for::<SearchArgs>()
        .timeout(Duration::from_secs(15))
        .build()
    }

    fn invoke(&self, arguments: &Value) -> ToolFuture<'_> {
        let args: Result<SearchArgs, String> = parse_tool_args(arguments.clone());
        Box::pin(async move {
            let args = args?;
            let query = args.query.trim();
            if query.is_empty() {
                return Err("query must not be empty".into());
            }
            let count = args.num_results.clamp(1, MAX_NUM_RESULTS);
            let results = self.brave_search(query, count).await?;
            Ok(serde_json::json!({ "results": results }))
        })
    }
}

/// Minimal percent-encoding for URL query parameters.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Extract up to `limit` hits from a Brave `web/search` response.
pub fn parse_brave_results(body: &Value, limit: usize) -> Vec<SearchHit> {
    body["web"]["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let link = r["url"].as_str()?.to_string();
                    Some(SearchHit {
                        title: strip_tags(r["title"].as_str().unwrap_or_default()),
                        link,
                        snippet: strip_tags(r["description"].as_str().unwrap_or_default()),
                    })
                })
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

/// Drop inline HTML tags (Brave highlights matches with `<strong>`).
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
