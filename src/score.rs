//! Cluster scoring from evidence levels.
//!
//! - `consistency`           = (L5 + L4) / n
//! - `risk`                  = L1 / n
//! - `mechanism_uncertainty` = 1 - consistency
//! - `contradiction_ratio`   = 0 (no contradiction detection)

use chrono::Utc;
use metrics::counter;
use serde::Serialize;

use crate::error::Result;
use crate::model::{ClusterId, ClusterScore, Evidence};
use crate::store::DynStore;

pub const METHOD_VERSION: &str = "governance_1.0";

/// Evidence counts per level, L5 first as in the activity log payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    #[serde(rename = "L5")]
    pub l5: usize,
    #[serde(rename = "L4")]
    pub l4: usize,
    #[serde(rename = "L3")]
    pub l3: usize,
    #[serde(rename = "L2")]
    pub l2: usize,
    #[serde(rename = "L1")]
    pub l1: usize,
}

impl LevelCounts {
    pub fn from_evidence(evidence: &[Evidence]) -> Self {
        let mut c = Self::default();
        for e in evidence {
            match e.level.get() {
                5 => c.l5 += 1,
                4 => c.l4 += 1,
                3 => c.l3 += 1,
                2 => c.l2 += 1,
                _ => c.l1 += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.l5 + self.l4 + self.l3 + self.l2 + self.l1
    }
}

/// Score a set of level counts; `None` for an empty cluster.
pub fn score_counts(cluster_id: ClusterId, counts: &LevelCounts) -> Option<ClusterScore> {
    let n = counts.total();
    if n == 0 {
        return None;
    }
    let n = n as f64;
    let consistency = (counts.l5 + counts.l4) as f64 / n;
    let risk = counts.l1 as f64 / n;
    Some(ClusterScore {
        cluster_id,
        consistency,
        mechanism_uncertainty: 1.0 - consistency,
        risk,
        contradiction_ratio: 0.0,
        computed_at: Utc::now(),
        method_version: METHOD_VERSION.to_string(),
    })
}

/// A computed snapshot plus the counts it came from.
#[derive(Debug, Clone)]
pub struct ScoredCluster {
    pub score: ClusterScore,
    pub counts: LevelCounts,
}

pub struct Scorer {
    store: DynStore,
}

impl Scorer {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Compute without writing. Unknown or empty clusters yield `None`.
    pub async fn compute(&self, cluster_id: ClusterId) -> Result<Option<ScoredCluster>> {
        if self.store.get_cluster(cluster_id).await?.is_none() {
            return Ok(None);
        }
        let evidence = self.store.evidence_for_cluster(cluster_id).await?;
        let counts = LevelCounts::from_evidence(&evidence);
        Ok(score_counts(cluster_id, &counts).map(|score| ScoredCluster { score, counts }))
    }

    /// Append a new score snapshot for the cluster; no-op when it has no evidence.
    pub async fn calculate_cluster_score(&self, cluster_id: ClusterId) -> Result<()> {
        let Some(scored) = self.compute(cluster_id).await? else {
            return Ok(());
        };
        self.store.append_score(scored.score).await?;
        counter!("pipeline_scores_total").increment(1);
        Ok(())
    }
}
