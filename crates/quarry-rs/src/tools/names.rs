//! Canonical tool name constants.
//!
//! Tool-name string literals reference these constants so a rename touches
//! only this file.

pub const SEARCH: &str = "search";
pub const TRENDING_TOPICS: &str = "trending_topics";
