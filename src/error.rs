// src/error.rs

use crate::models::EventId;
use thiserror::Error;

/// Errors surfaced by the deduplication core.
///
/// Degraded-dimension conditions (missing coordinates or actors) are not
/// errors; they reduce the dimensions considered by the scorer. Delegate
/// failures are recovered internally by the greedy fallback and never reach
/// callers of `BatchClusteringEngine::cluster`.
#[derive(Error, Debug)]
pub enum DedupError {
    /// Scoring was attempted on an event whose embedding was never populated.
    /// This is a caller contract violation: silently scoring 0 would corrupt
    /// duplicate decisions.
    #[error("event {0} has no embedding; embeddings must be populated before scoring")]
    MissingEmbedding(EventId),

    #[error("embedding dimension mismatch: {left} vs {right}")]
    EmbeddingDimensionMismatch { left: usize, right: usize },

    /// The embedding provider failed. Fatal for the batch: there is no safe
    /// default for vector similarity.
    #[error("embedding provider failure: {0}")]
    Embedding(String),

    /// The store could not serve a whole-window read. Propagated rather than
    /// mapped to "no duplicate found", which would wrongly imply the window
    /// was actually checked.
    #[error("storage error: {0}")]
    Storage(String),

    /// The density-based clustering delegate was unreachable or crashed.
    #[error("clustering delegate error: {0}")]
    Delegate(#[from] anyhow::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DedupError>;
