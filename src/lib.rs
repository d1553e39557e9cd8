// src/lib.rs
//
// Event identity resolution core: decides when two differently-worded
// conflict-event reports describe the same real-world occurrence and groups
// duplicates behind a single canonical record. Consumed as a library by the
// ingestion pipeline; has no network, file or CLI surface of its own.

pub mod clustering;
pub mod config;
pub mod dedup;
pub mod error;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod utils;

// Re-export common types for easier access
pub use config::{DedupConfig, HybridWeights};
pub use error::{DedupError, Result};
pub use models::{
    CasualtyCounts, Cluster, DedupWindow, Event, EventId, GeoPoint, SimilarityResult,
    EMBEDDING_DIM,
};

// Re-export important functionality
pub use clustering::{BatchClusteringEngine, DensityClusterer, DensityParams, SubprocessClusterer};
pub use dedup::DuplicateChecker;
pub use matching::{AliasTable, SimilarityScorer};
pub use pipeline::{BatchStats, DedupePipeline};
pub use store::{ClusterStore, EmbeddingProvider, InMemoryStore};
