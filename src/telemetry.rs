use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_ingest_entries_total",
            "Feed entries parsed from sources."
        );
        describe_counter!(
            "pipeline_ingest_new_items_total",
            "Raw items stored after fingerprint dedup."
        );
        describe_counter!(
            "pipeline_ingest_dedup_total",
            "Feed entries skipped as duplicates."
        );
        describe_counter!(
            "pipeline_ingest_errors_total",
            "Source fetch/parse failures."
        );
        describe_histogram!(
            "pipeline_ingest_parse_ms",
            "Feed parse time in milliseconds."
        );
        describe_gauge!(
            "pipeline_ingest_last_run_ts",
            "Unix ts when ingest last ran."
        );
        describe_counter!(
            "pipeline_evidence_total",
            "Evidence rows created by the classifier."
        );
        describe_counter!(
            "pipeline_oracle_fallback_total",
            "Oracle calls that fell back to the rule cascade."
        );
        describe_counter!(
            "pipeline_clusters_created_total",
            "Clusters created by the clusterer."
        );
        describe_counter!("pipeline_scores_total", "Cluster score snapshots written.");
        describe_counter!("pipeline_ticks_total", "Ticks completed successfully.");
        describe_counter!("pipeline_tick_failures_total", "Ticks that failed.");
        describe_counter!(
            "pipeline_ticks_skipped_total",
            "Ticks skipped because one was already running."
        );
        describe_histogram!("pipeline_tick_ms", "Tick duration in milliseconds.");
    });
}

/// Install the Prometheus recorder without an HTTP listener; callers render
/// the exposition text themselves.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

/// Install the Prometheus recorder with its own `/metrics` listener.
pub fn install_with_listener(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install listener")?;
    ensure_metrics_described();
    Ok(())
}
