// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod audit;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod telemetry;
pub mod model;
pub mod score;
pub mod store;
pub mod tick;

// ---- Re-exports for stable public API ----
pub use crate::classify::Classifier;
pub use crate::cluster::Clusterer;
pub use crate::error::{PipelineError, Result};
pub use crate::ingest::Ingestor;
pub use crate::lifecycle::Lifecycle;
pub use crate::score::Scorer;
pub use crate::store::{DynStore, MemoryStore, Store};
pub use crate::tick::{spawn_tick_scheduler, Pipeline, TickReport};

use std::sync::Arc;
use std::time::Duration;

use crate::classify::oracle::build_oracle_from_config;
use crate::classify::rules::RuleBook;
use crate::config::{OracleConfig, PipelineConfig};
use crate::ingest::types::FeedFetcher;

/// Wire a pipeline from configuration: rule book and oracle from the paths
/// named in `config`, everything persisted through `store`.
pub fn build_pipeline(
    store: DynStore,
    fetcher: Arc<dyn FeedFetcher>,
    config: &PipelineConfig,
) -> Pipeline {
    let rules = RuleBook::load_from_file(&config.rules_path);
    let oracle_cfg = OracleConfig::load_or_disabled(&config.oracle_path);

    let mut classifier = Classifier::new(store.clone(), rules);
    if let Some(oracle) = build_oracle_from_config(&oracle_cfg) {
        tracing::info!(
            target: "pipeline",
            provider = oracle.name(),
            timeout_ms = oracle_cfg.timeout_ms,
            "classification oracle enabled"
        );
        classifier = classifier.with_oracle(oracle, Duration::from_millis(oracle_cfg.timeout_ms));
    }
    Pipeline::new(store, fetcher, classifier, config)
}
