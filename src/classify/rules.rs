//! # Evidence rule cascade
//!
//! Maps one statement to an evidentiary level and kind using marker phrases.
//! Matching is case-insensitive and whitespace-insensitive substring search.
//!
//! Precedence:
//! 1. official source or official marker → L5 fact
//! 2. speculative marker → L1 inference
//! 3. social address → L2 fact
//! 4. document/dataset marker → L4 data (dataset) or quote
//! 5. otherwise → L3 fact
//!
//! Marker lists load from JSON; a missing or broken file falls back to
//! `RuleBook::default_seed()`.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::model::{EvidenceKind, EvidenceLevel};

/// Reliability attached to rule-classified evidence at level >= 4.
pub const HIGH_RELIABILITY: f64 = 0.9;
/// Reliability attached to rule-classified evidence below level 4.
pub const LOW_RELIABILITY: f64 = 0.6;

#[derive(Debug, Clone, Deserialize)]
pub struct RuleBook {
    #[serde(default)]
    pub speculative: Vec<String>,
    #[serde(default)]
    pub social_domains: Vec<String>,
    #[serde(default)]
    pub official: Vec<String>,
    #[serde(default)]
    pub document: Vec<String>,
    #[serde(default)]
    pub dataset: Vec<String>,
}

/// What the cascade decided for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub level: EvidenceLevel,
    pub kind: EvidenceKind,
}

impl Classification {
    pub fn reliability(&self) -> f64 {
        reliability_for(self.level)
    }
}

/// Monotonic level → reliability mapping.
pub fn reliability_for(level: EvidenceLevel) -> f64 {
    if level.is_high_trust() {
        HIGH_RELIABILITY
    } else {
        LOW_RELIABILITY
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl RuleBook {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    pub fn default_seed() -> Self {
        fn v(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            speculative: v(&["predicts", "might", "speculates", "could be", "rumor"]),
            social_domains: v(&["twitter", "weibo", "x.com", "reddit", "facebook", "tiktok"]),
            official: v(&["official statement", "financial report"]),
            document: v(&["according to document", "according to"]),
            dataset: v(&["dataset"]),
        }
    }

    /// Dotted markers (`x.com`) match the host or a parent domain of it;
    /// bare names (`twitter`) match anywhere in the host.
    pub fn is_social_address(&self, address: &str) -> bool {
        let host = host_of(address);
        self.social_domains.iter().any(|d| {
            let d = d.trim().to_ascii_lowercase();
            if d.is_empty() {
                false
            } else if d.contains('.') {
                host == d || host.ends_with(&format!(".{d}"))
            } else {
                host.contains(&d)
            }
        })
    }

    /// Run the cascade over one statement.
    pub fn classify(&self, text: &str, address: &str, official_source: bool) -> Classification {
        let t = normalize(text);

        if official_source || any_contains(&t, &self.official) {
            return Classification {
                level: EvidenceLevel::OFFICIAL,
                kind: EvidenceKind::Fact,
            };
        }
        if any_contains(&t, &self.speculative) {
            return Classification {
                level: EvidenceLevel::INFERENCE,
                kind: EvidenceKind::Inference,
            };
        }
        if self.is_social_address(address) {
            return Classification {
                level: EvidenceLevel::SOCIAL,
                kind: EvidenceKind::Fact,
            };
        }
        let dataset = any_contains(&t, &self.dataset);
        if dataset || any_contains(&t, &self.document) {
            return Classification {
                level: EvidenceLevel::STRONG_SECONDARY,
                kind: if dataset {
                    EvidenceKind::Data
                } else {
                    EvidenceKind::Quote
                },
            };
        }
        Classification {
            level: EvidenceLevel::WEAK_SECONDARY,
            kind: EvidenceKind::Fact,
        }
    }
}

// --- internals ---

/// Lowercase host of `address`; the trimmed address itself when it does not parse.
fn host_of(address: &str) -> String {
    match reqwest::Url::parse(address.trim()) {
        Ok(url) => url.host_str().unwrap_or_default().to_ascii_lowercase(),
        Err(_) => address.trim().to_ascii_lowercase(),
    }
}

fn any_contains(normalized_text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| {
        let p = normalize(p);
        !p.is_empty() && normalized_text.contains(p.as_str())
    })
}

fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        let lc = ch.to_ascii_lowercase();
        if lc.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(lc);
            last_space = false;
        }
    }
    out.trim().to_string()
}
