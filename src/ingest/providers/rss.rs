// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::model::Source;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    summary: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Parse an RSS 2.0 document into feed entries. Unparseable `pubDate`
/// values are left empty so the ingestor can stamp ingestion time.
pub fn parse_rss(xml: &str) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let out: Vec<FeedEntry> = rss
        .channel
        .item
        .into_iter()
        .map(|it| FeedEntry {
            title: it.title,
            summary: it.description.or(it.summary),
            link: it.link,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        })
        .collect();

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("pipeline_ingest_parse_ms").record(ms);
    counter!("pipeline_ingest_entries_total").increment(out.len() as u64);
    Ok(out)
}

/// Fetches each source's address over HTTP and parses it as RSS.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("evidence-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(&source.address)
            .send()
            .await
            .with_context(|| format!("feed http get {}", source.address))?
            .error_for_status()
            .with_context(|| format!("feed http status {}", source.address))?;
        let body = resp.text().await.context("feed http .text()")?;
        parse_rss(&body)
    }

    fn name(&self) -> &'static str {
        "http-rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_and_dates() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>Rate decision</title><link>https://fed.test/a</link>
<pubDate>Tue, 10 Jun 2025 14:00:00 +0000</pubDate>
<description>The committee&nbsp;held rates.</description></item>
<item><title>No date</title><link>https://fed.test/b</link>
<pubDate>yesterday-ish</pubDate></item>
</channel></rss>"#;
        let items = parse_rss(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Rate decision"));
        assert_eq!(items[0].summary.as_deref(), Some("The committee held rates."));
        assert_eq!(
            items[0].published_at.map(|d| d.timestamp()),
            Some(1_749_564_000)
        );
        assert!(items[1].published_at.is_none());
        assert!(items[1].summary.is_none());
    }

    #[test]
    fn empty_channel_is_not_an_error() {
        let xml = r#"<rss><channel><title>empty</title></channel></rss>"#;
        assert!(parse_rss(xml).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_rss("not xml at all").is_err());
    }
}
