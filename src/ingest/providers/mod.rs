// src/ingest/providers/mod.rs
pub mod fixture;
pub mod rss;

pub use fixture::StaticFeedFetcher;
pub use rss::{parse_rss, HttpFeedFetcher};
