// tests/tick_pipeline.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evidence_pipeline::audit::audit_evidence;
use evidence_pipeline::classify::rules::RuleBook;
use evidence_pipeline::config::PipelineConfig;
use evidence_pipeline::ingest::providers::StaticFeedFetcher;
use evidence_pipeline::ingest::types::{FeedEntry, FeedFetcher};
use evidence_pipeline::model::{ClusterState, LogKind, Source, SourceKind};
use evidence_pipeline::score::METHOD_VERSION;
use evidence_pipeline::store::memory::FailPoint;
use evidence_pipeline::{spawn_tick_scheduler, Classifier, MemoryStore, Pipeline, Store};

const WIRE: &str = "https://wire.example.org/rss";
const FED: &str = "https://www.federalreserve.gov/feeds/press_all.xml";
const SOCIAL: &str = "https://twitter.com/someone/rss";

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

async fn pipeline_with(fetcher: Arc<dyn FeedFetcher>) -> (Arc<MemoryStore>, Pipeline) {
    let store = Arc::new(MemoryStore::new());
    let classifier = Classifier::new(store.clone(), RuleBook::default_seed());
    let pipeline = Pipeline::new(store.clone(), fetcher, classifier, &PipelineConfig::default());
    (store, pipeline)
}

async fn fixture_pipeline() -> (Arc<MemoryStore>, Pipeline) {
    let fetcher = StaticFeedFetcher::new()
        .with_feed(WIRE, &fixture("wire_feed.xml"))
        .with_feed(FED, &fixture("official_feed.xml"))
        .with_feed(SOCIAL, &fixture("social_feed.xml"));
    let (store, pipeline) = pipeline_with(Arc::new(fetcher)).await;
    let ing = pipeline.ingestor();
    ing.register_source("Harbour Wire", SourceKind::Rss, WIRE).await.unwrap();
    ing.register_source("Federal Reserve", SourceKind::Official, FED).await.unwrap();
    ing.register_source("Posts", SourceKind::Rss, SOCIAL).await.unwrap();
    (store, pipeline)
}

#[tokio::test]
async fn tick_runs_all_stages_in_order() {
    let (store, pipeline) = fixture_pipeline().await;

    let report = pipeline.run_tick().await.unwrap().expect("not skipped");
    assert_eq!(report.new_items, 4);
    assert_eq!(report.new_evidence, store.evidence_count());
    assert_eq!(report.new_evidence, 8);
    assert!(report.evidence_joined >= 1, "strike sentences share a cluster");
    assert_eq!(
        report.evidence_joined + report.clusters_created,
        report.new_evidence
    );
    assert_eq!(report.clusters_scored, report.clusters_created);

    // Everything is clustered and every open cluster got one tick log.
    assert!(store.unclustered_evidence().await.unwrap().is_empty());
    let open = store
        .clusters_in_states(&[ClusterState::Emerging, ClusterState::Active])
        .await
        .unwrap();
    for c in &open {
        let logs = store.activity_for_cluster(c.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, LogKind::InternalTick);
        assert_eq!(logs[0].payload["method_version"], METHOD_VERSION);
        let score = store.latest_score(c.id).await.unwrap().unwrap();
        assert_eq!(
            logs[0].payload["evidence_total"],
            store.evidence_for_cluster(c.id).await.unwrap().len()
        );
        assert!((score.consistency + score.mechanism_uncertainty - 1.0).abs() < 1e-12);
    }

    let report = audit_evidence(&store.all_evidence());
    assert!(report.total > 0);
    assert!(report.is_clean(), "{report:?}");
}

#[tokio::test]
async fn second_tick_only_rescores() {
    let (store, pipeline) = fixture_pipeline().await;
    let first = pipeline.run_tick().await.unwrap().unwrap();
    let second = pipeline.run_tick().await.unwrap().unwrap();

    assert_eq!(second.new_items, 0);
    assert_eq!(second.new_evidence, 0);
    assert_eq!((second.evidence_joined, second.clusters_created), (0, 0));
    assert_eq!(second.clusters_scored, first.clusters_scored);
    assert_eq!(store.all_activity().len(), 2 * first.clusters_scored);
}

#[tokio::test]
async fn failure_while_scoring_keeps_earlier_stages() {
    let (store, pipeline) = fixture_pipeline().await;
    store.fail_on(FailPoint::CommitScoring);

    assert!(pipeline.run_tick().await.is_err());
    assert_eq!(store.raw_item_count(), 4);
    assert_eq!(store.evidence_count(), 8);
    assert!(store.unclustered_evidence().await.unwrap().is_empty());
    assert!(store.all_activity().is_empty());

    store.clear_failures();
    let retry = pipeline.run_tick().await.unwrap().unwrap();
    assert_eq!(retry.new_items, 0);
    assert!(retry.clusters_scored > 0);
    assert_eq!(store.all_activity().len(), retry.clusters_scored);
}

#[tokio::test]
async fn failure_reading_one_cluster_writes_no_scores() {
    let (store, pipeline) = fixture_pipeline().await;
    pipeline.run_tick().await.unwrap();
    let before = store.all_activity().len();

    let first = store
        .clusters_in_states(&[ClusterState::Emerging])
        .await
        .unwrap()
        .remove(0);
    store.fail_on(FailPoint::EvidenceForCluster(first.id));
    assert!(pipeline.run_tick().await.is_err());
    assert_eq!(store.all_activity().len(), before);
}

#[tokio::test]
async fn failure_while_classifying_keeps_raw_items() {
    let (store, pipeline) = fixture_pipeline().await;
    store.fail_on(FailPoint::InsertEvidence);

    assert!(pipeline.run_tick().await.is_err());
    assert_eq!(store.raw_item_count(), 4);
    assert_eq!(store.evidence_count(), 0);

    store.clear_failures();
    let retry = pipeline.run_tick().await.unwrap().unwrap();
    assert_eq!(retry.new_items, 0);
    assert_eq!(retry.new_evidence, 8);
}

struct SlowFetcher;

#[async_trait]
impl FeedFetcher for SlowFetcher {
    async fn fetch(&self, _source: &Source) -> anyhow::Result<Vec<FeedEntry>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let (_store, pipeline) = pipeline_with(Arc::new(SlowFetcher)).await;
    pipeline
        .ingestor()
        .register_source("slow", SourceKind::Web, "https://slow.example.org")
        .await
        .unwrap();

    let (a, b) = tokio::join!(pipeline.run_tick(), pipeline.run_tick());
    let ran = [a.unwrap(), b.unwrap()];
    assert_eq!(ran.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(ran.iter().filter(|r| r.is_none()).count(), 1);
}

#[tokio::test]
async fn scheduler_ticks_immediately() {
    let (store, pipeline) = fixture_pipeline().await;
    let handle = spawn_tick_scheduler(Arc::new(pipeline), Duration::from_secs(3600));

    for _ in 0..50 {
        if !store.all_activity().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();
    assert_eq!(store.raw_item_count(), 4);
    assert!(!store.all_activity().is_empty());
}

fn bulk_feed(n: usize) -> String {
    let items: String = (0..n)
        .map(|i| {
            format!(
                "<item><title>Bulletin {i}</title><link>https://bulk.example.org/{i}</link>\
                 <description>Harbour bulletin number {i} reports vessel traffic as normal.</description></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>bulk</title>{items}</channel></rss>"#)
}

#[tokio::test]
async fn backlog_larger_than_batch_is_drained_by_later_ticks() {
    let address = "https://bulk.example.org/rss";
    let fetcher = StaticFeedFetcher::new().with_feed(address, &bulk_feed(60));
    let (store, pipeline) = pipeline_with(Arc::new(fetcher)).await;
    pipeline
        .ingestor()
        .register_source("Bulk", SourceKind::Rss, address)
        .await
        .unwrap();

    let first = pipeline.run_tick().await.unwrap().unwrap();
    assert_eq!(first.new_items, 60);
    assert_eq!(first.new_evidence, PipelineConfig::default().classify_batch);

    let second = pipeline.run_tick().await.unwrap().unwrap();
    assert_eq!(second.new_items, 0);
    assert_eq!(second.new_evidence, 10);
    assert_eq!(store.evidence_count(), 60);
    assert!(store.unclassified_raw_items(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn item_without_statements_is_not_retried() {
    let address = "https://short.example.org/rss";
    let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>s</title>
<item><title>Brief</title><link>https://short.example.org/1</link><description>Too short.</description></item>
</channel></rss>"#;
    let (store, pipeline) = pipeline_with(Arc::new(StaticFeedFetcher::new().with_feed(address, xml))).await;
    pipeline
        .ingestor()
        .register_source("Short", SourceKind::Rss, address)
        .await
        .unwrap();

    let report = pipeline.run_tick().await.unwrap().unwrap();
    assert_eq!((report.new_items, report.new_evidence), (1, 0));
    assert_eq!(store.raw_item_count(), 1);
    assert!(store.unclassified_raw_items(10).await.unwrap().is_empty());
}
