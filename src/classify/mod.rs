// src/classify/mod.rs
//! Evidence classifier: raw item → evidence rows with level, kind and pointer.
//!
//! With an oracle configured the whole document goes to it first; anything
//! other than a schema-valid reply within the deadline falls back to the
//! rule cascade. Callers cannot tell which path ran except by the evidence
//! count (the oracle yields a single statement).

pub mod oracle;
pub mod rules;

use metrics::counter;
use std::time::Duration;

use crate::classify::oracle::{validate_response, DynOracle, OracleVerdict};
use crate::classify::rules::{reliability_for, RuleBook};
use crate::error::{PipelineError, Result};
use crate::model::{Evidence, NewEvidence, Pointer, RawItem, RawItemId, SourceKind};
use crate::store::DynStore;

/// Candidates shorter than this (in chars) are treated as noise.
pub const MIN_STATEMENT_CHARS: usize = 20;
/// Pointer match text keeps this many chars of the statement.
pub const MATCH_TEXT_CHARS: usize = 50;

pub struct Classifier {
    store: DynStore,
    rules: RuleBook,
    oracle: Option<DynOracle>,
    oracle_timeout: Duration,
}

impl Classifier {
    pub fn new(store: DynStore, rules: RuleBook) -> Self {
        Self {
            store,
            rules,
            oracle: None,
            oracle_timeout: Duration::from_secs(8),
        }
    }

    pub fn with_oracle(mut self, oracle: DynOracle, timeout: Duration) -> Self {
        self.oracle = Some(oracle);
        self.oracle_timeout = timeout;
        self
    }

    /// Extract evidence for one raw item. Unknown ids yield an empty list;
    /// an item that already has evidence returns it unchanged.
    pub async fn process_item(&self, raw_item_id: RawItemId) -> Result<Vec<Evidence>> {
        let Some(item) = self.store.get_raw_item(raw_item_id).await? else {
            tracing::debug!(target: "pipeline", raw_item_id = %raw_item_id, "raw item not found");
            return Ok(Vec::new());
        };

        let existing = self.store.evidence_for_item(item.id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let official = match self.store.get_source(item.source_id).await? {
            Some(s) => s.kind == SourceKind::Official,
            None => false,
        };

        let batch = match self.ask_oracle(&item).await {
            Some(verdict) => vec![evidence_from_verdict(&item, verdict)],
            None => self.classify_with_rules(&item, official),
        };
        if batch.is_empty() {
            // No statement survived; don't offer the item again.
            self.store.mark_classified(item.id).await?;
            return Ok(Vec::new());
        }

        let created = self.store.insert_evidence(batch).await?;
        counter!("pipeline_evidence_total").increment(created.len() as u64);
        tracing::debug!(
            target: "pipeline",
            raw_item_id = %item.id,
            evidence = created.len(),
            "item classified"
        );
        Ok(created)
    }

    /// Deterministic path: one evidence row per surviving sentence.
    pub fn classify_with_rules(&self, item: &RawItem, official_source: bool) -> Vec<NewEvidence> {
        split_sentences(&item.body)
            .into_iter()
            .filter(|s| s.chars().count() >= MIN_STATEMENT_CHARS)
            .map(|sentence| {
                let c = self
                    .rules
                    .classify(sentence, &item.address, official_source);
                NewEvidence {
                    raw_item_id: Some(item.id),
                    level: c.level,
                    extract: sentence.to_string(),
                    pointer: pointer_for(item, sentence),
                    reliability: c.reliability(),
                    kind: c.kind,
                }
            })
            .collect()
    }

    /// `None` whenever the rule cascade should run instead.
    async fn ask_oracle(&self, item: &RawItem) -> Option<OracleVerdict> {
        let oracle = self.oracle.as_ref()?;
        let document = format!("{}\n\n{}", item.title, item.body);

        let reply = match tokio::time::timeout(self.oracle_timeout, oracle.classify(&document))
            .await
        {
            Ok(r) => r,
            Err(_) => Err(PipelineError::Oracle(format!(
                "timed out after {} ms",
                self.oracle_timeout.as_millis()
            ))),
        };

        match reply.and_then(|raw| validate_response(&raw)) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    target: "pipeline",
                    error = %e,
                    oracle = oracle.name(),
                    raw_item_id = %item.id,
                    "oracle failed, using rule cascade"
                );
                counter!("pipeline_oracle_fallback_total").increment(1);
                None
            }
        }
    }
}

/// Reliability follows the level, whatever the oracle claimed.
fn evidence_from_verdict(item: &RawItem, v: OracleVerdict) -> NewEvidence {
    if v.reliability != reliability_for(v.level) {
        tracing::debug!(
            target: "pipeline",
            raw_item_id = %item.id,
            claimed = v.reliability,
            level = v.level.get(),
            "oracle reliability replaced by level mapping"
        );
    }
    NewEvidence {
        raw_item_id: Some(item.id),
        level: v.level,
        pointer: pointer_for(item, &v.extract),
        extract: v.extract,
        reliability: reliability_for(v.level),
        kind: v.kind,
    }
}

/// Pointer back to `statement` inside `item`.
pub fn pointer_for(item: &RawItem, statement: &str) -> Pointer {
    Pointer {
        url: item.cited_address().to_string(),
        selector: None,
        match_text: Some(match_excerpt(statement)),
        page: None,
        source_hash: item.fingerprint.clone(),
        captured_at: Some(item.fetched_at),
    }
}

fn match_excerpt(statement: &str) -> String {
    if statement.chars().count() <= MATCH_TEXT_CHARS {
        return statement.to_string();
    }
    let head: String = statement.chars().take(MATCH_TEXT_CHARS).collect();
    format!("{head}...")
}

/// Split at `.`, `!` or `?` followed by whitespace. Terminators stay with
/// their sentence; "2.1%" is not a boundary.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + ch.len_utf8();
                    let s = text[start..end].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = end;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
