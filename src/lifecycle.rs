//! Cluster lifecycle: validated state transitions, corrections, retractions
//! and published-version snapshots. Every change is mirrored into the
//! activity log. Nothing here decides *when* to transition; callers own
//! that policy.

use chrono::Utc;
use serde_json::json;

use crate::error::{PipelineError, Result};
use crate::model::{
    ClusterActivityLog, ClusterId, ClusterState, EventCluster, LogKind, PublishReason,
    PublishedVersion,
};
use crate::store::DynStore;

/// Allowed edges. `Retracted` is terminal.
pub fn can_transition(from: ClusterState, to: ClusterState) -> bool {
    use ClusterState::*;
    matches!(
        (from, to),
        (Emerging, Active | Disputed | Retracted)
            | (Active, Stabilizing | Disputed | Retracted)
            | (Stabilizing, Active | Disputed | Retracted)
            | (Disputed, Active | Stabilizing | Retracted)
    )
}

pub struct Lifecycle {
    store: DynStore,
}

impl Lifecycle {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    async fn load(&self, id: ClusterId) -> Result<EventCluster> {
        self.store
            .get_cluster(id)
            .await?
            .ok_or(PipelineError::ClusterNotFound(id))
    }

    pub async fn transition(
        &self,
        id: ClusterId,
        to: ClusterState,
        reason: &str,
    ) -> Result<EventCluster> {
        let mut cluster = self.load(id).await?;
        let from = cluster.state;
        if !can_transition(from, to) {
            return Err(PipelineError::InvalidTransition {
                cluster: id,
                from,
                to,
            });
        }

        let now = Utc::now();
        cluster.state = to;
        cluster.last_updated_at = now;
        let kind = if to == ClusterState::Retracted {
            cluster.retracted = true;
            LogKind::Retraction
        } else {
            LogKind::StateChange
        };
        self.store.update_cluster(cluster.clone()).await?;
        self.store
            .append_activity(ClusterActivityLog {
                cluster_id: id,
                kind,
                payload: json!({ "from": from, "to": to, "reason": reason }),
                logged_at: now,
            })
            .await?;

        tracing::info!(target: "pipeline", cluster = %id, ?from, ?to, reason, "cluster state changed");
        Ok(cluster)
    }

    pub async fn retract(&self, id: ClusterId, reason: &str) -> Result<EventCluster> {
        self.transition(id, ClusterState::Retracted, reason).await
    }

    pub async fn mark_corrected(&self, id: ClusterId, note: &str) -> Result<EventCluster> {
        let mut cluster = self.load(id).await?;
        let now = Utc::now();
        cluster.corrected = true;
        cluster.last_updated_at = now;
        self.store.update_cluster(cluster.clone()).await?;
        self.store
            .append_activity(ClusterActivityLog {
                cluster_id: id,
                kind: LogKind::Correction,
                payload: json!({ "note": note }),
                logged_at: now,
            })
            .await?;
        Ok(cluster)
    }

    /// Freeze the cluster's current public state as the next numbered version.
    pub async fn publish(&self, id: ClusterId, reason: PublishReason) -> Result<PublishedVersion> {
        let cluster = self.load(id).await?;
        let score = self.store.latest_score(id).await?;
        let evidence = self.store.evidence_for_cluster(id).await?;
        let snapshot = json!({
            "cluster": cluster,
            "scores": score,
            "evidence_snapshot": evidence,
        });

        let version = self
            .store
            .append_published_version(id, reason, snapshot)
            .await?;
        self.store
            .append_activity(ClusterActivityLog {
                cluster_id: id,
                kind: LogKind::Published,
                payload: json!({
                    "version_seq": version.seq,
                    "reason": reason,
                    "evidence_ids": evidence.iter().map(|e| e.id).collect::<Vec<_>>(),
                }),
                logged_at: version.published_at,
            })
            .await?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClusterState::*;

    #[test]
    fn retracted_is_terminal() {
        for to in [Emerging, Active, Stabilizing, Disputed, Retracted] {
            assert!(!can_transition(Retracted, to));
        }
    }

    #[test]
    fn nothing_returns_to_emerging() {
        for from in [Emerging, Active, Stabilizing, Disputed] {
            assert!(!can_transition(from, Emerging));
        }
    }

    #[test]
    fn forward_edges() {
        assert!(can_transition(Emerging, Active));
        assert!(can_transition(Active, Stabilizing));
        assert!(can_transition(Active, Disputed));
        assert!(can_transition(Disputed, Retracted));
        assert!(!can_transition(Emerging, Stabilizing));
        assert!(!can_transition(Active, Active));
    }
}
