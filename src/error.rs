// src/error.rs
use thiserror::Error;

use crate::model::{ClusterId, ClusterState};

/// Domain errors raised by the pipeline stages and the persistence seam.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(String),

    #[error("raw item with fingerprint {0} already exists")]
    DuplicateFingerprint(String),

    #[error("cluster {0} not found")]
    ClusterNotFound(ClusterId),

    #[error("evidence level {0} outside 1..=5")]
    InvalidLevel(i64),

    #[error("cluster {cluster}: transition {from:?} -> {to:?} not allowed")]
    InvalidTransition {
        cluster: ClusterId,
        from: ClusterState,
        to: ClusterState,
    },

    #[error("feed fetch failed for {address}: {reason}")]
    Fetch { address: String, reason: String },

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
