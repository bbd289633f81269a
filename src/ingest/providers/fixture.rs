// src/ingest/providers/fixture.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use super::rss::parse_rss;
use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::model::Source;

/// Serves RSS documents held in memory, keyed by source address.
/// Addresses without a document fail like an unreachable feed would.
#[derive(Debug, Default, Clone)]
pub struct StaticFeedFetcher {
    feeds: HashMap<String, String>,
}

impl StaticFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, address: &str, xml: &str) -> Self {
        self.feeds.insert(address.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedFetcher for StaticFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>> {
        let xml = self
            .feeds
            .get(&source.address)
            .ok_or_else(|| anyhow!("no fixture feed for {}", source.address))?;
        parse_rss(xml)
    }

    fn name(&self) -> &'static str {
        "static-rss"
    }
}
