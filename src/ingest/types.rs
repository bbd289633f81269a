// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::Source;

/// One candidate document as a feed exposes it, before dedup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>>;
    fn name(&self) -> &'static str;
}
