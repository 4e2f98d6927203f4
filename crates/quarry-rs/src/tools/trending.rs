//! `trending_topics`: today's Zhihu hot list.
//!
//! The official hot-list API is tried first, then two public mirrors. The
//! first source that yields at least one topic wins. Results are cached for
//! the calendar day, so repeated calls within a day cost one fetch.

use crate::tools::core::{Tool, ToolFuture};
use crate::tools::descriptor::ToolDescriptor;
use crate::tools::names;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ZHIHU_HOT_LIST: &str =
    "https://www.zhihu.com/api/v3/feed/topstory/hot-lists/total?limit=50";
const TOPHUB_MIRROR: &str = "https://api.tophub.fun/v2/GetAllInfoGzip?id=1&page=0";
const TENAPI_MIRROR: &str = "https://tenapi.cn/zhihuresou/";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default number of topics returned.
pub const DEFAULT_TOPIC_LIMIT: usize = 10;

/// One entry of the hot list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingTopic {
    /// 1-based position in the list.
    pub rank: usize,
    pub title: String,
    pub url: String,
    /// Popularity text as published, e.g. "1234 万热度". Not every source has it.
    pub hot_value: Option<String>,
}

/// Where topics come from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Zhihu,
    Tophub,
    Tenapi,
}

impl Source {
    const ALL: [Source; 3] = [Source::Zhihu, Source::Tophub, Source::Tenapi];

    fn url(self) -> &'static str {
        match self {
            Self::Zhihu => ZHIHU_HOT_LIST,
            Self::Tophub => TOPHUB_MIRROR,
            Self::Tenapi => TENAPI_MIRROR,
        }
    }

    fn parse(self, body: &Value, limit: usize) -> Vec<TrendingTopic> {
        match self {
            Self::Zhihu => parse_zhihu(body, limit),
            Self::Tophub => parse_tophub(body, limit),
            Self::Tenapi => parse_tenapi(body, limit),
        }
    }
}

pub struct TrendingTopics {
    client: reqwest::Client,
    limit: usize,
    cache: Mutex<Option<(NaiveDate, Vec<TrendingTopic>)>>,
}

impl Default for TrendingTopics {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendingTopics {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            limit: DEFAULT_TOPIC_LIMIT,
            cache: Mutex::new(None),
        }
    }

    /// Number of topics to return (at least 1).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Seed the daily cache, e.g. from a snapshot taken earlier today.
    pub async fn prime(&self, date: NaiveDate, topics: Vec<TrendingTopic>) {
        *self.cache.lock().await = Some((date, topics));
    }

    /// Today's topics, fetched at most once per calendar day.
    pub async fn topics(&self) -> Result<(NaiveDate, Vec<TrendingTopic>), String> {
        let today = Local::now().date_naive();
        if let Some((date, topics)) = self.cache.lock().await.as_ref()
            && *date == today
        {
            debug!("Trending topics served from today's cache");
            return Ok((today, truncated(topics, self.limit)));
        }

        // The lock is released while fetching; a concurrent caller may fetch
        // too, and the last writer wins.
        let topics = self.fetch().await?;
        *self.cache.lock().await = Some((today, topics.clone()));
        Ok((today, truncated(&topics, self.limit)))
    }

    async fn fetch(&self) -> Result<Vec<TrendingTopic>, String> {
        let mut failures = Vec::new();
        for source in Source::ALL {
            match self.fetch_from(source).await {
                Ok(topics) if !topics.is_empty() => {
                    info!("Fetched {} trending topics from {source:?}", topics.len());
                    return Ok(topics);
                }
                Ok(_) => {
                    warn!("{source:?} returned no topics");
                    failures.push(format!("{source:?}: empty list"));
                }
                Err(e) => {
                    warn!("{source:?} hot list unavailable: {e}");
                    failures.push(format!("{source:?}: {e}"));
                }
            }
        }
        Err(format!(
            "all trending sources failed ({})",
            failures.join("; ")
        ))
    }

    async fn fetch_from(&self, source: Source) -> Result<Vec<TrendingTopic>, String> {
        let resp = self
            .client
            .get(source.url())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e: reqwest::Error| format!("unreadable response: {e}"))?;
        Ok(source.parse(&body, usize::MAX))
    }
}

impl Tool for TrendingTopics {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::builder(
            names::TRENDING_TOPICS,
            "Get today's trending topics from the Zhihu hot list: rank, title, link \
             and popularity. Takes no arguments.",
        )
        .timeout(Duration::from_secs(40))
        .idempotent(true)
        .build()
    }

    fn invoke(&self, _arguments: &Value) -> ToolFuture<'_> {
        Box::pin(async move {
            let (date, topics) = self.topics().await?;
            Ok(serde_json::json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "topics": topics,
            }))
        })
    }
}

fn truncated(topics: &[TrendingTopic], limit: usize) -> Vec<TrendingTopic> {
    topics.iter().take(limit).cloned().collect()
}

fn ranked(items: impl Iterator<Item = (String, String, Option<String>)>, limit: usize) -> Vec<TrendingTopic> {
    items
        .filter(|(title, _, _)| !title.trim().is_empty())
        .take(limit)
        .enumerate()
        .map(|(i, (title, url, hot_value))| TrendingTopic {
            rank: i + 1,
            title,
            url,
            hot_value,
        })
        .collect()
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Zhihu `hot-lists/total`: `data[].target.{id,title}` plus `detail_text`.
pub fn parse_zhihu(body: &Value, limit: usize) -> Vec<TrendingTopic> {
    let Some(items) = body["data"].as_array() else {
        return Vec::new();
    };
    ranked(
        items.iter().map(|item| {
            let target = &item["target"];
            let title = target["title"].as_str().unwrap_or_default().to_string();
            let url = text(&target["id"])
                .map(|id| format!("https://www.zhihu.com/question/{id}"))
                .unwrap_or_default();
            (title, url, text(&item["detail_text"]))
        }),
        limit,
    )
}

/// tophub mirror: `Data.data[].{Title,Url,hotValue}`.
pub fn parse_tophub(body: &Value, limit: usize) -> Vec<TrendingTopic> {
    let Some(items) = body["Data"]["data"].as_array() else {
        return Vec::new();
    };
    ranked(
        items.iter().map(|item| {
            (
                item["Title"].as_str().unwrap_or_default().to_string(),
                item["Url"].as_str().unwrap_or_default().to_string(),
                text(&item["hotValue"]),
            )
        }),
        limit,
    )
}

/// tenapi mirror: `list[].{name,url}`, no popularity.
pub fn parse_tenapi(body: &Value, limit: usize) -> Vec<TrendingTopic> {
    let Some(items) = body["list"].as_array() else {
        return Vec::new();
    };
    ranked(
        items.iter().map(|item| {
            (
                item["name"].as_str().unwrap_or_default().to_string(),
                item["url"].as_str().unwrap_or_default().to_string(),
                None,
            )
        }),
        limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic(rank: usize, title: &str) -> TrendingTopic {
        TrendingTopic {
            rank,
            title: title.into(),
            url: format!("https://www.zhihu.com/question/{rank}"),
            hot_value: None,
        }
    }

    #[test]
    fn parses_zhihu_hot_list() {
        let body = json!({
            "data": [
                { "target": { "id": 123, "title": "First" }, "detail_text": "1200 万热度" },
                { "target": { "id": "456", "title": "Second" } },
                { "target": { "id": 789, "title": "" } },
                { "target": { "id": 1, "title": "Third" }, "detail_text": "10 万热度" }
            ]
        });
        let topics = parse_zhihu(&body, 10);
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0].url, "https://www.zhihu.com/question/123");
        assert_eq!(topics[0].hot_value.as_deref(), Some("1200 万热度"));
        assert_eq!(topics[1].url, "https://www.zhihu.com/question/456");
        assert_eq!(topics[1].hot_value, None);
        assert_eq!(topics[2].title, "Third");
        assert_eq!(topics[2].rank, 3);

        assert_eq!(parse_zhihu(&body, 1).len(), 1);
        assert!(parse_zhihu(&json!({"error": "blocked"}), 10).is_empty());
    }

    #[test]
    fn parses_mirrors() {
        let tophub = json!({
            "Data": { "data": [
                { "Title": "A", "Url": "https://www.zhihu.com/question/1", "hotValue": "500万" },
                { "Title": "B", "Url": "https://www.zhihu.com/question/2", "hotValue": 42 }
            ]}
        });
        let topics = parse_tophub(&tophub, 10);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].hot_value.as_deref(), Some("500万"));
        assert_eq!(topics[1].hot_value.as_deref(), Some("42"));

        let tenapi = json!({ "list": [ { "name": "C", "url": "https://www.zhihu.com/question/3" } ] });
        let topics = parse_tenapi(&tenapi, 10);
        assert_eq!(topics, vec![TrendingTopic {
            rank: 1,
            title: "C".into(),
            url: "https://www.zhihu.com/question/3".into(),
            hot_value: None,
        }]);
    }

    #[test]
    fn descriptor_is_idempotent_without_params() {
        let d = TrendingTopics::new().descriptor();
        assert_eq!(d.name, "trending_topics");
        assert!(d.idempotent);
        assert!(d.parameters.is_empty());
    }

    #[tokio::test]
    async fn serves_todays_cache_without_fetching() {
        let tool = TrendingTopics::new().with_limit(2);
        let today = Local::now().date_naive();
        tool.prime(today, vec![topic(1, "a"), topic(2, "b"), topic(3, "c")])
            .await;

        let output = tool.invoke(&json!({})).await.unwrap();
        assert_eq!(output["date"], today.format("%Y-%m-%d").to_string());
        let topics = output["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0]["title"], "a");
        assert_eq!(topics[1]["rank"], 2);
    }
}
