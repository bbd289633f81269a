//! # Similarity clusterer
//!
//! Every unclustered evidence row either joins the open cluster whose title
//! it resembles most (Jaccard over lowercase alphanumeric tokens, accepted at
//! `>= ACCEPT_THRESHOLD`) or seeds a new `Emerging` cluster.
//!
//! Open clusters are enumerated in creation order, so the first cluster to
//! reach the maximum score wins ties. Clusters created earlier in the same
//! pass are candidates for later evidence.

use metrics::counter;
use std::collections::HashSet;

use crate::error::Result;
use crate::model::{ClusterState, Domain, EventCluster, Evidence, NewCluster};
use crate::store::DynStore;

pub const ACCEPT_THRESHOLD: f64 = 0.3;
/// New cluster titles keep this many chars of the seeding extract.
pub const TITLE_CHARS: usize = 100;

pub const OPEN_STATES: [ClusterState; 2] = [ClusterState::Emerging, ClusterState::Active];

/// Keyword cascade for new clusters; first domain with a hit wins.
const DOMAIN_VOCABULARY: &[(Domain, &[&str])] = &[
    (Domain::Universe, &["planet", "nasa", "space"]),
    (Domain::Earth, &["climate", "earth", "environment"]),
    (Domain::Power, &["policy", "election", "law"]),
    (Domain::Tech, &["ai", "tech", "code"]),
    (Domain::Culture, &["art", "culture", "movie"]),
];

pub fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token-set intersection over union; 0.0 when both sides are empty.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let sa = tokens(a);
    let sb = tokens(b);
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

pub fn guess_domain(text: &str) -> Domain {
    let toks = tokens(text);
    DOMAIN_VOCABULARY
        .iter()
        .find(|(_, words)| words.iter().any(|w| toks.contains(*w)))
        .map(|(d, _)| *d)
        .unwrap_or(Domain::Human)
}

/// Highest-scoring cluster at or above the threshold; first one wins ties.
pub fn best_match<'a>(extract: &str, open: &'a [EventCluster]) -> Option<(&'a EventCluster, f64)> {
    let mut best: Option<(&EventCluster, f64)> = None;
    for cluster in open {
        let sim = jaccard(extract, &cluster.title);
        if sim < ACCEPT_THRESHOLD {
            continue;
        }
        match best {
            Some((_, b)) if sim <= b => {}
            _ => best = Some((cluster, sim)),
        }
    }
    best
}

fn title_from(extract: &str) -> String {
    if extract.chars().count() <= TITLE_CHARS {
        return extract.to_string();
    }
    let head: String = extract.chars().take(TITLE_CHARS).collect();
    format!("{head}...")
}

pub struct Clusterer {
    store: DynStore,
}

/// What one clustering pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterPass {
    pub joined: usize,
    pub created: usize,
}

impl Clusterer {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub async fn cluster_evidence(&self) -> Result<ClusterPass> {
        let unclustered = self.store.unclustered_evidence().await?;
        let mut pass = ClusterPass::default();
        if unclustered.is_empty() {
            return Ok(pass);
        }

        let mut open = self.store.clusters_in_states(&OPEN_STATES).await?;
        for ev in unclustered {
            self.place(&ev, &mut open, &mut pass).await?;
        }

        tracing::debug!(
            target: "pipeline",
            joined = pass.joined,
            created = pass.created,
            "clustering pass done"
        );
        Ok(pass)
    }

    async fn place(
        &self,
        ev: &Evidence,
        open: &mut Vec<EventCluster>,
        pass: &mut ClusterPass,
    ) -> Result<()> {
        if let Some((cluster, sim)) = best_match(&ev.extract, open) {
            let cluster_id = cluster.id;
            if self.store.assign_cluster(ev.id, cluster_id).await? {
                pass.joined += 1;
                tracing::trace!(target: "pipeline", evidence = %ev.id, cluster = %cluster_id, sim, "joined");
            }
            return Ok(());
        }

        let cluster = self
            .store
            .insert_cluster(NewCluster {
                domain: guess_domain(&ev.extract),
                title: title_from(&ev.extract),
                supersedes: None,
            })
            .await?;
        counter!("pipeline_clusters_created_total").increment(1);
        if self.store.assign_cluster(ev.id, cluster.id).await? {
            pass.created += 1;
        }
        open.push(cluster);
        Ok(())
    }
}
