// src/ingest/mod.rs
//! Deduplicating ingestor: fetch every registered source, fingerprint each
//! entry, and store only entries whose fingerprint is new.

pub mod config;
pub mod providers;
pub mod types;

use chrono::Utc;
use metrics::{counter, gauge};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::model::{
    NewRawItem, NewSource, Source, SourceKind, DEFAULT_CONTENT_KIND, DEFAULT_RELIABILITY_BASELINE,
};
use crate::store::DynStore;

/// Clean feed text: decode entities, strip tags, unify quotes, collapse
/// whitespace. Sentence punctuation is kept; the classifier splits on it.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// Content address of a feed entry: SHA-256 over title, summary and link,
/// unit-separator delimited so field boundaries are part of the hash.
pub fn fingerprint(title: &str, summary: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(summary.trim().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(link.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn entry_fingerprint(entry: &FeedEntry) -> String {
    fingerprint(
        entry.title.as_deref().unwrap_or_default(),
        entry.summary.as_deref().unwrap_or_default(),
        entry.link.as_deref().unwrap_or_default(),
    )
}

pub struct Ingestor {
    store: DynStore,
    fetcher: Arc<dyn FeedFetcher>,
}

impl Ingestor {
    pub fn new(store: DynStore, fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Register a source unless one with the same address already exists.
    pub async fn register_source(
        &self,
        name: &str,
        kind: SourceKind,
        address: &str,
    ) -> Result<Source> {
        if let Some(existing) = self.store.find_source_by_address(address).await? {
            return Ok(existing);
        }
        let source = self
            .store
            .insert_source(NewSource {
                name: name.to_string(),
                kind,
                address: address.to_string(),
                reliability_baseline: DEFAULT_RELIABILITY_BASELINE,
            })
            .await?;
        tracing::info!(target: "pipeline", source_id = %source.id, source_name = name, address, "source registered");
        Ok(source)
    }

    /// Ingest every registered source. A failing source is logged and skipped.
    /// Returns the number of newly stored raw items.
    pub async fn ingest_all(&self) -> Result<usize> {
        crate::telemetry::ensure_metrics_described();

        let sources = self.store.list_sources().await?;
        let mut total_new = 0usize;
        for source in &sources {
            match self.fetcher.fetch(source).await {
                Ok(entries) => total_new += self.store_entries(source, entries).await?,
                Err(e) => {
                    let err = PipelineError::Fetch {
                        address: source.address.clone(),
                        reason: format!("{e:#}"),
                    };
                    tracing::warn!(
                        target: "pipeline",
                        error = %err,
                        source = %source.name,
                        fetcher = self.fetcher.name(),
                        "source fetch failed"
                    );
                    counter!("pipeline_ingest_errors_total").increment(1);
                }
            }
        }

        counter!("pipeline_ingest_new_items_total").increment(total_new as u64);
        gauge!("pipeline_ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        Ok(total_new)
    }

    async fn store_entries(&self, source: &Source, entries: Vec<FeedEntry>) -> Result<usize> {
        let mut new_count = 0usize;
        let mut dup_count = 0usize;
        for entry in entries {
            let fp = entry_fingerprint(&entry);
            if self.store.raw_item_exists(&fp).await? {
                dup_count += 1;
                continue;
            }

            let now = Utc::now();
            let link = entry.link.as_deref().map(str::trim).unwrap_or_default();
            // Entries without a link are cited by their feed's address.
            let address = if link.is_empty() { source.address.as_str() } else { link };
            let new = NewRawItem {
                source_id: source.id,
                fingerprint: fp,
                title: normalize_text(entry.title.as_deref().unwrap_or_default()),
                body: normalize_text(entry.summary.as_deref().unwrap_or_default()),
                address: address.to_string(),
                canonical_address: (!link.is_empty()).then(|| link.to_string()),
                content_kind: DEFAULT_CONTENT_KIND.to_string(),
                published_at: entry.published_at.unwrap_or(now),
                fetched_at: now,
            };
            match self.store.insert_raw_item(new).await {
                Ok(_) => new_count += 1,
                // Lost a race with another writer; same outcome as the pre-check.
                Err(PipelineError::DuplicateFingerprint(_)) => dup_count += 1,
                Err(e) => return Err(e),
            }
        }

        counter!("pipeline_ingest_dedup_total").increment(dup_count as u64);
        tracing::debug!(
            target: "pipeline",
            source = %source.name,
            new = new_count,
            duplicates = dup_count,
            "source ingested"
        );
        Ok(new_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_and_collapses() {
        let s = "  <p>Hello,&nbsp;&nbsp; world!</p>  Next.  ";
        assert_eq!(normalize_text(s), "Hello, world! Next.");
    }

    #[test]
    fn fingerprint_is_deterministic_and_content_addressed() {
        let a = fingerprint("Title", "Summary", "https://x.test/1");
        let b = fingerprint("Title", "Summary", "https://x.test/1");
        let c = fingerprint("Title", "Summary", "https://x.test/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn field_boundaries_change_the_fingerprint() {
        assert_ne!(fingerprint("ab", "c", ""), fingerprint("a", "bc", ""));
        assert_ne!(fingerprint("a", "", "b"), fingerprint("a", "b", ""));
    }

    #[test]
    fn missing_fields_hash_as_empty() {
        let e = FeedEntry {
            title: Some("Only title".into()),
            ..Default::default()
        };
        assert_eq!(entry_fingerprint(&e), fingerprint("Only title", "", ""));
    }
}
