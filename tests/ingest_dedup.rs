// tests/ingest_dedup.rs
use std::sync::Arc;

use evidence_pipeline::ingest::providers::StaticFeedFetcher;
use evidence_pipeline::model::SourceKind;
use evidence_pipeline::{DynStore, Ingestor, MemoryStore, Store};

const WIRE: &str = "https://wire.example.org/rss";
const FED: &str = "https://www.federalreserve.gov/feeds/press_all.xml";

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn fetcher() -> StaticFeedFetcher {
    StaticFeedFetcher::new()
        .with_feed(WIRE, &fixture("wire_feed.xml"))
        .with_feed(FED, &fixture("official_feed.xml"))
}

#[tokio::test]
async fn second_ingest_stores_nothing_new() {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: DynStore = store.clone();
    let ingestor = Ingestor::new(dyn_store, Arc::new(fetcher()));
    ingestor
        .register_source("Harbour Wire", SourceKind::Rss, WIRE)
        .await
        .unwrap();
    ingestor
        .register_source("Federal Reserve", SourceKind::Official, FED)
        .await
        .unwrap();

    // The wire feed repeats one entry verbatim.
    let first = ingestor.ingest_all().await.unwrap();
    assert_eq!(first, 3);
    assert_eq!(store.raw_item_count(), 3);

    let second = ingestor.ingest_all().await.unwrap();
    assert_eq!(second, 0);
    assert_eq!(store.raw_item_count(), 3);
}

#[tokio::test]
async fn register_source_is_idempotent_by_address() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), Arc::new(fetcher()));
    let a = ingestor
        .register_source("Harbour Wire", SourceKind::Rss, WIRE)
        .await
        .unwrap();
    let b = ingestor
        .register_source("Renamed", SourceKind::Web, WIRE)
        .await
        .unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(b.name, "Harbour Wire");
    assert_eq!(store.list_sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failing_source_does_not_block_the_others() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), Arc::new(fetcher()));
    ingestor
        .register_source("Unreachable", SourceKind::Rss, "https://down.example.org/rss")
        .await
        .unwrap();
    ingestor
        .register_source("Federal Reserve", SourceKind::Official, FED)
        .await
        .unwrap();

    let n = ingestor.ingest_all().await.unwrap();
    assert_eq!(n, 1);
    assert_eq!(store.raw_item_count(), 1);
}

#[tokio::test]
async fn stored_items_are_normalized_and_dated() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), Arc::new(fetcher()));
    ingestor
        .register_source("Harbour Wire", SourceKind::Rss, WIRE)
        .await
        .unwrap();
    ingestor.ingest_all().await.unwrap();

    let items = store.recent_raw_items(10).await.unwrap();
    let strike = items
        .iter()
        .find(|i| i.title == "Port strike halts container traffic")
        .expect("strike item");
    assert!(!strike.body.contains("<p>"));
    assert!(strike.body.starts_with("Dock workers at the northern port"));
    assert_eq!(strike.published_at.timestamp(), 1_749_547_800);
    assert_eq!(
        strike.cited_address(),
        "https://wire.example.org/2025/06/port-strike"
    );
    assert_eq!(strike.fingerprint.len(), 64);

    // Unparseable pubDate falls back to ingestion time.
    let index = items
        .iter()
        .find(|i| i.title == "Shipping index published")
        .expect("index item");
    assert_eq!(index.published_at, index.fetched_at);
}
