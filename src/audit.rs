//! Pointer compliance audit for high-trust (level >= 4) evidence.
//!
//! Rules: a locator (selector, match text or page), a capture timestamp,
//! a non-empty source fingerprint, and an http(s) address.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Evidence, EvidenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    MissingLocator,
    MissingCapturedAt,
    MissingSourceHash,
    InvalidUrl,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplianceReport {
    /// High-trust evidence examined.
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub breakdown: BTreeMap<Violation, usize>,
    pub failing: Vec<EvidenceId>,
}

impl ComplianceReport {
    pub fn is_clean(&self) -> bool {
        self.non_compliant == 0
    }
}

pub fn violations(ev: &Evidence) -> Vec<Violation> {
    let p = &ev.pointer;
    let mut out = Vec::new();
    if !p.has_locator() {
        out.push(Violation::MissingLocator);
    }
    if p.captured_at.is_none() {
        out.push(Violation::MissingCapturedAt);
    }
    if p.source_hash.trim().is_empty() {
        out.push(Violation::MissingSourceHash);
    }
    if !p.url.starts_with("http") {
        out.push(Violation::InvalidUrl);
    }
    out
}

pub fn audit_evidence(evidence: &[Evidence]) -> ComplianceReport {
    let mut report = ComplianceReport::default();
    for ev in evidence.iter().filter(|e| e.level.is_high_trust()) {
        report.total += 1;
        let v = violations(ev);
        if v.is_empty() {
            report.compliant += 1;
            continue;
        }
        report.non_compliant += 1;
        report.failing.push(ev.id);
        for rule in v {
            *report.breakdown.entry(rule).or_default() += 1;
        }
    }
    if !report.is_clean() {
        tracing::warn!(
            target: "pipeline",
            total = report.total,
            non_compliant = report.non_compliant,
            "pointer compliance violations"
        );
    }
    report
}
