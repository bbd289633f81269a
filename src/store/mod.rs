// src/store/mod.rs
//! Persistence seam. The pipeline only needs create/read/filter/order/limit
//! over its entities, fingerprint uniqueness on raw items, and a conditional
//! cluster assignment; any backing store that offers those can sit behind
//! [`Store`].

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    ClusterActivityLog, ClusterId, ClusterScore, ClusterState, EventCluster, Evidence, EvidenceId,
    NewCluster, NewEvidence, NewRawItem, NewSource, PublishReason, PublishedVersion, RawItem,
    RawItemId, Source, SourceId,
};

pub use memory::MemoryStore;

/// Everything the scoring stage of one tick writes, committed together.
#[derive(Debug, Clone, Default)]
pub struct ScoringBatch {
    pub scores: Vec<ClusterScore>,
    pub logs: Vec<ClusterActivityLog>,
}

impl ScoringBatch {
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty() && self.logs.is_empty()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- sources ---
    async fn insert_source(&self, new: NewSource) -> Result<Source>;
    async fn find_source_by_address(&self, address: &str) -> Result<Option<Source>>;
    /// All sources in registration order.
    async fn list_sources(&self) -> Result<Vec<Source>>;

    // --- raw items ---
    async fn raw_item_exists(&self, fingerprint: &str) -> Result<bool>;
    /// Fails with `DuplicateFingerprint` if the fingerprint is taken.
    async fn insert_raw_item(&self, new: NewRawItem) -> Result<RawItem>;
    async fn get_raw_item(&self, id: RawItemId) -> Result<Option<RawItem>>;
    async fn get_source(&self, id: SourceId) -> Result<Option<Source>>;
    /// Most recently fetched first.
    async fn recent_raw_items(&self, limit: usize) -> Result<Vec<RawItem>>;
    /// Items classification has not run for yet, most recently fetched first.
    /// The limit applies after the filter.
    async fn unclassified_raw_items(&self, limit: usize) -> Result<Vec<RawItem>>;
    /// Record that classification ran for an item that produced no evidence.
    async fn mark_classified(&self, id: RawItemId) -> Result<()>;

    // --- evidence ---
    /// Also marks every referenced raw item as classified.
    async fn insert_evidence(&self, batch: Vec<NewEvidence>) -> Result<Vec<Evidence>>;
    async fn evidence_for_item(&self, id: RawItemId) -> Result<Vec<Evidence>>;
    async fn evidence_for_cluster(&self, id: ClusterId) -> Result<Vec<Evidence>>;
    /// Unclustered evidence in creation order.
    async fn unclustered_evidence(&self) -> Result<Vec<Evidence>>;
    /// Sets `cluster_id` only if the row is still unclustered. Returns whether
    /// this call performed the assignment.
    async fn assign_cluster(&self, evidence: EvidenceId, cluster: ClusterId) -> Result<bool>;

    // --- clusters ---
    async fn insert_cluster(&self, new: NewCluster) -> Result<EventCluster>;
    async fn get_cluster(&self, id: ClusterId) -> Result<Option<EventCluster>>;
    /// Clusters in any of `states`, in creation order.
    async fn clusters_in_states(&self, states: &[ClusterState]) -> Result<Vec<EventCluster>>;
    async fn update_cluster(&self, cluster: EventCluster) -> Result<()>;

    // --- append-only records ---
    async fn append_score(&self, score: ClusterScore) -> Result<()>;
    async fn latest_score(&self, id: ClusterId) -> Result<Option<ClusterScore>>;
    async fn scores_for_cluster(&self, id: ClusterId) -> Result<Vec<ClusterScore>>;
    async fn append_activity(&self, log: ClusterActivityLog) -> Result<()>;
    async fn activity_for_cluster(&self, id: ClusterId) -> Result<Vec<ClusterActivityLog>>;
    /// Atomic: either every score and log in the batch lands, or none do.
    async fn commit_scoring(&self, batch: ScoringBatch) -> Result<()>;
    /// Assigns the next per-cluster sequence number.
    async fn append_published_version(
        &self,
        cluster: ClusterId,
        reason: PublishReason,
        snapshot: serde_json::Value,
    ) -> Result<PublishedVersion>;
    async fn published_versions(&self, id: ClusterId) -> Result<Vec<PublishedVersion>>;
}

pub type DynStore = Arc<dyn Store>;
