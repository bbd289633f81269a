//! # Pipeline entities
//!
//! Sources, raw items, evidence, clusters and the append-only records
//! (scores, activity log, published versions) that the tick produces.
//! Identifiers are store-assigned and increase in creation order, which is
//! what keeps cluster enumeration (and therefore tie-breaking) stable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(SourceId);
id_type!(RawItemId);
id_type!(EvidenceId);
id_type!(ClusterId);

// ------------------------------------------------------------
// Sources and raw items
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Api,
    Web,
    Official,
}

impl SourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Some(Self::Rss),
            "api" => Some(Self::Api),
            "web" => Some(Self::Web),
            "official" => Some(Self::Official),
            _ => None,
        }
    }
}

pub const DEFAULT_RELIABILITY_BASELINE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    pub address: String,
    pub reliability_baseline: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub kind: SourceKind,
    pub address: String,
    pub reliability_baseline: f64,
}

pub const DEFAULT_CONTENT_KIND: &str = "text/html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: RawItemId,
    pub source_id: SourceId,
    pub fingerprint: String,
    pub title: String,
    pub body: String,
    pub address: String,
    pub canonical_address: Option<String>,
    pub content_kind: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

impl RawItem {
    /// Address evidence pointers should cite: canonical when known.
    pub fn cited_address(&self) -> &str {
        match self.canonical_address.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => &self.address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRawItem {
    pub source_id: SourceId,
    pub fingerprint: String,
    pub title: String,
    pub body: String,
    pub address: String,
    pub canonical_address: Option<String>,
    pub content_kind: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

// ------------------------------------------------------------
// Evidence
// ------------------------------------------------------------

/// Evidentiary tier: 1 (speculative) ..= 5 (official/verified).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EvidenceLevel(u8);

impl EvidenceLevel {
    pub const INFERENCE: Self = Self(1);
    pub const SOCIAL: Self = Self(2);
    pub const WEAK_SECONDARY: Self = Self(3);
    pub const STRONG_SECONDARY: Self = Self(4);
    pub const OFFICIAL: Self = Self(5);

    pub fn new(level: i64) -> Result<Self, PipelineError> {
        if (1..=5).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(PipelineError::InvalidLevel(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_high_trust(self) -> bool {
        self.0 >= 4
    }
}

impl TryFrom<i64> for EvidenceLevel {
    type Error = PipelineError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<EvidenceLevel> for i64 {
    fn from(l: EvidenceLevel) -> Self {
        l.0 as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Fact,
    Quote,
    Data,
    Inference,
    /// Only produced by the classification oracle.
    Hazard,
}

impl EvidenceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(Self::Fact),
            "quote" => Some(Self::Quote),
            "data" => Some(Self::Data),
            "inference" => Some(Self::Inference),
            "hazard" => Some(Self::Hazard),
            _ => None,
        }
    }
}

/// Binds an extract back to its position in the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub source_hash: String,
    pub captured_at: Option<DateTime<Utc>>,
}

impl Pointer {
    pub fn has_locator(&self) -> bool {
        self.selector.is_some() || self.match_text.is_some() || self.page.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub raw_item_id: Option<RawItemId>,
    pub cluster_id: Option<ClusterId>,
    pub level: EvidenceLevel,
    pub extract: String,
    pub pointer: Pointer,
    pub reliability: f64,
    pub kind: EvidenceKind,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvidence {
    pub raw_item_id: Option<RawItemId>,
    pub level: EvidenceLevel,
    pub extract: String,
    pub pointer: Pointer,
    pub reliability: f64,
    pub kind: EvidenceKind,
}

// ------------------------------------------------------------
// Clusters
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Universe,
    Earth,
    Human,
    Power,
    Tech,
    Culture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterState {
    Emerging,
    Active,
    Stabilizing,
    Disputed,
    Retracted,
}

impl ClusterState {
    /// Open clusters still accept new evidence.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Emerging | Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCluster {
    pub id: ClusterId,
    pub domain: Domain,
    pub state: ClusterState,
    pub title: String,
    pub first_observed_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub corrected: bool,
    pub retracted: bool,
    pub supersedes: Option<ClusterId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCluster {
    pub domain: Domain,
    pub title: String,
    pub supersedes: Option<ClusterId>,
}

// ------------------------------------------------------------
// Append-only records
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterScore {
    pub cluster_id: ClusterId,
    pub consistency: f64,
    pub mechanism_uncertainty: f64,
    pub risk: f64,
    pub contradiction_ratio: f64,
    pub computed_at: DateTime<Utc>,
    pub method_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    InternalTick,
    EvidenceAdded,
    StateChange,
    Published,
    Correction,
    Retraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterActivityLog {
    pub cluster_id: ClusterId,
    pub kind: LogKind,
    pub payload: serde_json::Value,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    #[serde(rename = "auto_60m")]
    Auto60m,
    #[serde(rename = "rapid_15m")]
    Rapid15m,
    #[serde(rename = "active_30m")]
    Active30m,
    Correction,
    Retraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub cluster_id: ClusterId,
    pub seq: u32,
    pub label: String,
    pub reason: PublishReason,
    pub published_at: DateTime<Utc>,
    pub snapshot: serde_json::Value,
}
