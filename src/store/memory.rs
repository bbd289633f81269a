// src/store/memory.rs
//! In-memory [`Store`]. Every operation takes one lock, so each write is
//! individually atomic and `commit_scoring` lands all-or-nothing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{ScoringBatch, Store};
use crate::error::{PipelineError, Result};
use crate::model::{
    ClusterActivityLog, ClusterId, ClusterScore, ClusterState, EventCluster, Evidence, EvidenceId,
    NewCluster, NewEvidence, NewRawItem, NewSource, PublishReason, PublishedVersion, RawItem,
    RawItemId, Source, SourceId,
};

/// Deliberate failures for exercising the pipeline's error boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CommitScoring,
    EvidenceForCluster(ClusterId),
    InsertEvidence,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    sources: BTreeMap<SourceId, Source>,
    raw_items: BTreeMap<RawItemId, RawItem>,
    fingerprints: HashMap<String, RawItemId>,
    classified: HashSet<RawItemId>,
    evidence: BTreeMap<EvidenceId, Evidence>,
    clusters: BTreeMap<ClusterId, EventCluster>,
    scores: Vec<ClusterScore>,
    activity: Vec<ClusterActivityLog>,
    versions: Vec<PublishedVersion>,
    fail_points: Vec<FailPoint>,
}

impl Tables {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, fp: FailPoint) -> Result<()> {
        if self.fail_points.contains(&fp) {
            return Err(PipelineError::Store(format!("injected failure at {fp:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given operation fail until [`MemoryStore::clear_failures`].
    pub fn fail_on(&self, fp: FailPoint) {
        self.lock().fail_points.push(fp);
    }

    pub fn clear_failures(&self) {
        self.lock().fail_points.clear();
    }

    pub fn raw_item_count(&self) -> usize {
        self.lock().raw_items.len()
    }

    pub fn evidence_count(&self) -> usize {
        self.lock().evidence.len()
    }

    pub fn all_evidence(&self) -> Vec<Evidence> {
        self.lock().evidence.values().cloned().collect()
    }

    pub fn all_activity(&self) -> Vec<ClusterActivityLog> {
        self.lock().activity.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_source(&self, new: NewSource) -> Result<Source> {
        let mut t = self.lock();
        let id = SourceId(t.next());
        let source = Source {
            id,
            name: new.name,
            kind: new.kind,
            address: new.address,
            reliability_baseline: new.reliability_baseline.clamp(0.0, 1.0),
            created_at: Utc::now(),
        };
        t.sources.insert(id, source.clone());
        Ok(source)
    }

    async fn find_source_by_address(&self, address: &str) -> Result<Option<Source>> {
        let t = self.lock();
        Ok(t.sources.values().find(|s| s.address == address).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.lock().sources.values().cloned().collect())
    }

    async fn raw_item_exists(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.lock().fingerprints.contains_key(fingerprint))
    }

    async fn insert_raw_item(&self, new: NewRawItem) -> Result<RawItem> {
        let mut t = self.lock();
        if t.fingerprints.contains_key(&new.fingerprint) {
            return Err(PipelineError::DuplicateFingerprint(new.fingerprint));
        }
        let id = RawItemId(t.next());
        let item = RawItem {
            id,
            source_id: new.source_id,
            fingerprint: new.fingerprint,
            title: new.title,
            body: new.body,
            address: new.address,
            canonical_address: new.canonical_address,
            content_kind: new.content_kind,
            published_at: new.published_at,
            fetched_at: new.fetched_at,
        };
        t.fingerprints.insert(item.fingerprint.clone(), id);
        t.raw_items.insert(id, item.clone());
        Ok(item)
    }

    async fn get_raw_item(&self, id: RawItemId) -> Result<Option<RawItem>> {
        Ok(self.lock().raw_items.get(&id).cloned())
    }

    async fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
        Ok(self.lock().sources.get(&id).cloned())
    }

    async fn recent_raw_items(&self, limit: usize) -> Result<Vec<RawItem>> {
        let t = self.lock();
        let mut items: Vec<RawItem> = t.raw_items.values().cloned().collect();
        items.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then(b.id.cmp(&a.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn unclassified_raw_items(&self, limit: usize) -> Result<Vec<RawItem>> {
        let t = self.lock();
        let mut items: Vec<RawItem> = t
            .raw_items
            .values()
            .filter(|i| !t.classified.contains(&i.id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then(b.id.cmp(&a.id)));
        items.truncate(limit);
        Ok(items)
    }

    async fn mark_classified(&self, id: RawItemId) -> Result<()> {
        self.lock().classified.insert(id);
        Ok(())
    }

    async fn insert_evidence(&self, batch: Vec<NewEvidence>) -> Result<Vec<Evidence>> {
        let mut t = self.lock();
        t.check(FailPoint::InsertEvidence)?;
        let now = Utc::now();
        let mut out = Vec::with_capacity(batch.len());
        for new in batch {
            let id = EvidenceId(t.next());
            if let Some(raw) = new.raw_item_id {
                t.classified.insert(raw);
            }
            let ev = Evidence {
                id,
                raw_item_id: new.raw_item_id,
                cluster_id: None,
                level: new.level,
                extract: new.extract,
                pointer: new.pointer,
                reliability: new.reliability,
                kind: new.kind,
                extracted_at: now,
            };
            t.evidence.insert(id, ev.clone());
            out.push(ev);
        }
        Ok(out)
    }

    async fn evidence_for_item(&self, id: RawItemId) -> Result<Vec<Evidence>> {
        let t = self.lock();
        Ok(t.evidence
            .values()
            .filter(|e| e.raw_item_id == Some(id))
            .cloned()
            .collect())
    }

    async fn evidence_for_cluster(&self, id: ClusterId) -> Result<Vec<Evidence>> {
        let t = self.lock();
        t.check(FailPoint::EvidenceForCluster(id))?;
        Ok(t.evidence
            .values()
            .filter(|e| e.cluster_id == Some(id))
            .cloned()
            .collect())
    }

    async fn unclustered_evidence(&self) -> Result<Vec<Evidence>> {
        let t = self.lock();
        Ok(t.evidence
            .values()
            .filter(|e| e.cluster_id.is_none())
            .cloned()
            .collect())
    }

    async fn assign_cluster(&self, evidence: EvidenceId, cluster: ClusterId) -> Result<bool> {
        let mut t = self.lock();
        if !t.clusters.contains_key(&cluster) {
            return Err(PipelineError::ClusterNotFound(cluster));
        }
        match t.evidence.get_mut(&evidence) {
            Some(ev) if ev.cluster_id.is_none() => {
                ev.cluster_id = Some(cluster);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_cluster(&self, new: NewCluster) -> Result<EventCluster> {
        let mut t = self.lock();
        let id = ClusterId(t.next());
        let now = Utc::now();
        let cluster = EventCluster {
            id,
            domain: new.domain,
            state: ClusterState::Emerging,
            title: new.title,
            first_observed_at: now,
            last_updated_at: now,
            corrected: false,
            retracted: false,
            supersedes: new.supersedes,
        };
        t.clusters.insert(id, cluster.clone());
        Ok(cluster)
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Option<EventCluster>> {
        Ok(self.lock().clusters.get(&id).cloned())
    }

    async fn clusters_in_states(&self, states: &[ClusterState]) -> Result<Vec<EventCluster>> {
        let t = self.lock();
        Ok(t.clusters
            .values()
            .filter(|c| states.contains(&c.state))
            .cloned()
            .collect())
    }

    async fn update_cluster(&self, cluster: EventCluster) -> Result<()> {
        let mut t = self.lock();
        match t.clusters.get_mut(&cluster.id) {
            Some(slot) => {
                *slot = cluster;
                Ok(())
            }
            None => Err(PipelineError::ClusterNotFound(cluster.id)),
        }
    }

    async fn append_score(&self, score: ClusterScore) -> Result<()> {
        self.lock().scores.push(score);
        Ok(())
    }

    async fn latest_score(&self, id: ClusterId) -> Result<Option<ClusterScore>> {
        let t = self.lock();
        // Last appended wins among equal timestamps.
        Ok(t.scores
            .iter()
            .filter(|s| s.cluster_id == id)
            .fold(None::<&ClusterScore>, |best, s| match best {
                Some(b) if b.computed_at > s.computed_at => Some(b),
                _ => Some(s),
            })
            .cloned())
    }

    async fn scores_for_cluster(&self, id: ClusterId) -> Result<Vec<ClusterScore>> {
        let t = self.lock();
        Ok(t.scores.iter().filter(|s| s.cluster_id == id).cloned().collect())
    }

    async fn append_activity(&self, log: ClusterActivityLog) -> Result<()> {
        self.lock().activity.push(log);
        Ok(())
    }

    async fn activity_for_cluster(&self, id: ClusterId) -> Result<Vec<ClusterActivityLog>> {
        let t = self.lock();
        Ok(t.activity
            .iter()
            .filter(|l| l.cluster_id == id)
            .cloned()
            .collect())
    }

    async fn commit_scoring(&self, batch: ScoringBatch) -> Result<()> {
        let mut t = self.lock();
        t.check(FailPoint::CommitScoring)?;
        t.scores.extend(batch.scores);
        t.activity.extend(batch.logs);
        Ok(())
    }

    async fn append_published_version(
        &self,
        cluster: ClusterId,
        reason: PublishReason,
        snapshot: serde_json::Value,
    ) -> Result<PublishedVersion> {
        let mut t = self.lock();
        if !t.clusters.contains_key(&cluster) {
            return Err(PipelineError::ClusterNotFound(cluster));
        }
        let seq = t
            .versions
            .iter()
            .filter(|v| v.cluster_id == cluster)
            .map(|v| v.seq)
            .max()
            .unwrap_or(0)
            + 1;
        let version = PublishedVersion {
            cluster_id: cluster,
            seq,
            label: format!("v{seq}"),
            reason,
            published_at: Utc::now(),
            snapshot,
        };
        t.versions.push(version.clone());
        Ok(version)
    }

    async fn published_versions(&self, id: ClusterId) -> Result<Vec<PublishedVersion>> {
        let t = self.lock();
        Ok(t.versions
            .iter()
            .filter(|v| v.cluster_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, SourceKind, DEFAULT_CONTENT_KIND};

    fn raw(fp: &str) -> NewRawItem {
        NewRawItem {
            source_id: SourceId(1),
            fingerprint: fp.to_string(),
            title: "t".into(),
            body: "b".into(),
            address: "https://example.test/a".into(),
            canonical_address: None,
            content_kind: DEFAULT_CONTENT_KIND.into(),
            published_at: Utc::now(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fingerprint_is_unique() {
        let s = MemoryStore::new();
        s.insert_raw_item(raw("abc")).await.unwrap();
        let err = s.insert_raw_item(raw("abc")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateFingerprint(_)));
        assert_eq!(s.raw_item_count(), 1);
    }

    #[tokio::test]
    async fn unclassified_filters_before_limit() {
        let s = MemoryStore::new();
        let a = s.insert_raw_item(raw("a")).await.unwrap();
        let b = s.insert_raw_item(raw("b")).await.unwrap();
        let c = s.insert_raw_item(raw("c")).await.unwrap();

        s.mark_classified(c.id).await.unwrap();
        let ev = NewEvidence {
            raw_item_id: Some(b.id),
            level: crate::model::EvidenceLevel::WEAK_SECONDARY,
            extract: "x".into(),
            pointer: crate::model::Pointer {
                url: "https://example.test/a".into(),
                selector: None,
                match_text: Some("x".into()),
                page: None,
                source_hash: "b".into(),
                captured_at: None,
            },
            reliability: 0.6,
            kind: crate::model::EvidenceKind::Fact,
        };
        s.insert_evidence(vec![ev]).await.unwrap();

        let pending = s.unclassified_raw_items(1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
    }

    #[tokio::test]
    async fn assignment_only_happens_once() {
        let s = MemoryStore::new();
        let src = s
            .insert_source(NewSource {
                name: "x".into(),
                kind: SourceKind::Rss,
                address: "https://x.test/feed".into(),
                reliability_baseline: 0.5,
            })
            .await
            .unwrap();
        assert_eq!(src.id, SourceId(1));
        let c1 = s
            .insert_cluster(NewCluster {
                domain: Domain::Human,
                title: "a".into(),
                supersedes: None,
            })
            .await
            .unwrap();
        let c2 = s
            .insert_cluster(NewCluster {
                domain: Domain::Human,
                title: "b".into(),
                supersedes: None,
            })
            .await
            .unwrap();
        let ev = s
            .insert_evidence(vec![NewEvidence {
                raw_item_id: None,
                level: crate::model::EvidenceLevel::WEAK_SECONDARY,
                extract: "synthetic".into(),
                pointer: crate::model::Pointer {
                    url: "https://x.test".into(),
                    selector: None,
                    match_text: Some("synthetic".into()),
                    page: None,
                    source_hash: "h".into(),
                    captured_at: Some(Utc::now()),
                },
                reliability: 0.6,
                kind: crate::model::EvidenceKind::Fact,
            }])
            .await
            .unwrap();
        assert!(s.assign_cluster(ev[0].id, c1.id).await.unwrap());
        assert!(!s.assign_cluster(ev[0].id, c2.id).await.unwrap());
        assert_eq!(s.evidence_for_cluster(c1.id).await.unwrap().len(), 1);
        assert!(s.evidence_for_cluster(c2.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn published_sequence_is_per_cluster() {
        let s = MemoryStore::new();
        let a = s
            .insert_cluster(NewCluster {
                domain: Domain::Tech,
                title: "a".into(),
                supersedes: None,
            })
            .await
            .unwrap();
        let b = s
            .insert_cluster(NewCluster {
                domain: Domain::Tech,
                title: "b".into(),
                supersedes: None,
            })
            .await
            .unwrap();
        let v1 = s
            .append_published_version(a.id, PublishReason::Auto60m, serde_json::json!({}))
            .await
            .unwrap();
        let v2 = s
            .append_published_version(a.id, PublishReason::Rapid15m, serde_json::json!({}))
            .await
            .unwrap();
        let w1 = s
            .append_published_version(b.id, PublishReason::Auto60m, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!((v1.seq, v2.seq, w1.seq), (1, 2, 1));
        assert_eq!(v2.label, "v2");
    }

    #[tokio::test]
    async fn failed_scoring_commit_writes_nothing() {
        let s = MemoryStore::new();
        s.fail_on(FailPoint::CommitScoring);
        let batch = ScoringBatch {
            scores: vec![],
            logs: vec![ClusterActivityLog {
                cluster_id: ClusterId(1),
                kind: crate::model::LogKind::InternalTick,
                payload: serde_json::json!({}),
                logged_at: Utc::now(),
            }],
        };
        assert!(s.commit_scoring(batch).await.is_err());
        assert!(s.all_activity().is_empty());
    }
}
