//! # Tick orchestrator
//! One tick runs ingest → classify → cluster → score, strictly in that order.
//!
//! Each stage's writes are durable before the next stage reads them. The
//! scoring stage buffers its scores and `internal_tick` logs and commits
//! them as one batch, so a tick that fails while scoring leaves no partial
//! scoring output behind while earlier stages stay committed.
//!
//! At most one tick runs at a time; a tick requested while another is in
//! flight is skipped, not queued.

use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::classify::Classifier;
use crate::cluster::{Clusterer, OPEN_STATES};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::types::FeedFetcher;
use crate::ingest::Ingestor;
use crate::model::{ClusterActivityLog, LogKind};
use crate::score::{Scorer, METHOD_VERSION};
use crate::store::{DynStore, ScoringBatch};

/// What one completed tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub new_items: usize,
    pub new_evidence: usize,
    pub evidence_joined: usize,
    pub clusters_created: usize,
    pub clusters_scored: usize,
}

pub struct Pipeline {
    store: DynStore,
    ingestor: Ingestor,
    classifier: Classifier,
    clusterer: Clusterer,
    scorer: Scorer,
    classify_batch: usize,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        store: DynStore,
        fetcher: Arc<dyn FeedFetcher>,
        classifier: Classifier,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(store.clone(), fetcher),
            clusterer: Clusterer::new(store.clone()),
            scorer: Scorer::new(store.clone()),
            classifier,
            classify_batch: config.classify_batch.max(1),
            store,
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn clusterer(&self) -> &Clusterer {
        &self.clusterer
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Run one tick. `Ok(None)` means another tick was already running.
    pub async fn run_tick(&self) -> Result<Option<TickReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            counter!("pipeline_ticks_skipped_total").increment(1);
            tracing::debug!(target: "pipeline", "tick already running, skipped");
            return Ok(None);
        };
        let t0 = std::time::Instant::now();
        let report = self.run_stages().await?;
        histogram!("pipeline_tick_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("pipeline_ticks_total").increment(1);
        Ok(Some(report))
    }

    /// Scheduler entry point: never returns an error, only logs it.
    pub async fn run_scheduled_tick(&self) {
        match self.run_tick().await {
            Ok(Some(r)) => tracing::info!(
                target: "pipeline",
                new_items = r.new_items,
                new_evidence = r.new_evidence,
                joined = r.evidence_joined,
                clusters_created = r.clusters_created,
                clusters_scored = r.clusters_scored,
                "tick complete"
            ),
            Ok(None) => {}
            Err(e) => {
                counter!("pipeline_tick_failures_total").increment(1);
                tracing::error!(target: "pipeline", error = %e, "tick failed");
            }
        }
    }

    async fn run_stages(&self) -> Result<TickReport> {
        crate::telemetry::ensure_metrics_described();
        let mut report = TickReport {
            new_items: self.ingestor.ingest_all().await?,
            ..Default::default()
        };

        report.new_evidence = self.classify_pending().await?;

        let pass = self.clusterer.cluster_evidence().await?;
        report.evidence_joined = pass.joined;
        report.clusters_created = pass.created;

        report.clusters_scored = self.score_open_clusters().await?;
        Ok(report)
    }

    /// Classify up to `classify_batch` of the most recent unclassified items.
    /// Older items are picked up by later ticks.
    async fn classify_pending(&self) -> Result<usize> {
        let pending = self
            .store
            .unclassified_raw_items(self.classify_batch)
            .await?;
        let mut created = 0usize;
        for item in pending {
            created += self.classifier.process_item(item.id).await?.len();
        }
        Ok(created)
    }

    async fn score_open_clusters(&self) -> Result<usize> {
        let open = self.store.clusters_in_states(&OPEN_STATES).await?;
        let mut batch = ScoringBatch::default();
        for cluster in open {
            let Some(scored) = self.scorer.compute(cluster.id).await? else {
                continue;
            };
            let now = Utc::now();
            batch.logs.push(ClusterActivityLog {
                cluster_id: cluster.id,
                kind: LogKind::InternalTick,
                payload: json!({
                    "method_version": METHOD_VERSION,
                    "added_evidence_by_level": scored.counts,
                    "evidence_total": scored.counts.total(),
                    "score": {
                        "consistency": scored.score.consistency,
                        "mechanism_uncertainty": scored.score.mechanism_uncertainty,
                        "risk": scored.score.risk,
                        "contradiction_ratio": scored.score.contradiction_ratio,
                    },
                }),
                logged_at: now,
            });
            batch.scores.push(scored.score);
        }

        let scored = batch.scores.len();
        if !batch.is_empty() {
            self.store.commit_scoring(batch).await?;
            counter!("pipeline_scores_total").increment(scored as u64);
        }
        Ok(scored)
    }
}

/// Run `pipeline.run_scheduled_tick()` every `interval`, first tick immediately.
/// A tick that overruns the interval causes the missed ticks to be skipped.
pub fn spawn_tick_scheduler(pipeline: Arc<Pipeline>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(target: "pipeline", interval_secs = interval.as_secs(), "tick scheduler started");
        loop {
            ticker.tick().await;
            pipeline.run_scheduled_tick().await;
        }
    })
}
