// src/config.rs

use serde::{Deserialize, Serialize};

use crate::error::{DedupError, Result};

/// Relative weights for the hybrid similarity score.
///
/// Semantic content is the strongest duplicate signal; the other dimensions
/// corroborate rather than determine, acting as gates as much as boosts.
/// When a dimension is unavailable for a pair, its weight is re-distributed
/// over the remaining dimensions rather than scored as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector: f64,
    pub temporal: f64,
    pub geographic: f64,
    pub actor: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        HybridWeights {
            vector: 0.5,
            temporal: 0.2,
            geographic: 0.2,
            actor: 0.1,
        }
    }
}

impl HybridWeights {
    pub fn sum(&self) -> f64 {
        self.vector + self.temporal + self.geographic + self.actor
    }
}

/// Configuration surface for scoring, duplicate lookup and batch clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Half-width of the deduplication window around a candidate's event-time
    pub dedup_window_hours: i64,

    /// Hours at which temporal similarity has decayed to 1/e
    pub temporal_horizon_hours: f64,

    /// Kilometers at which geographic similarity has decayed to 1/e
    pub geo_radius_km: f64,

    /// Minimum hybrid score for two events to be considered the same occurrence
    pub similarity_threshold: f64,

    pub weights: HybridWeights,

    /// Minimum cluster size passed to the density-based delegate
    pub min_cluster_size: usize,

    /// Minimum samples for core points (density delegate parameter)
    pub min_samples: usize,

    /// Cluster selection epsilon (density delegate parameter)
    pub cluster_selection_epsilon: f64,

    /// Whether to attempt the density-based delegate before the greedy
    /// fallback
    pub use_density_backend: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            dedup_window_hours: 24,
            temporal_horizon_hours: 48.0,
            geo_radius_km: 100.0,
            similarity_threshold: 0.7,
            weights: HybridWeights::default(),
            min_cluster_size: 2,
            min_samples: 1,
            cluster_selection_epsilon: 0.3,
            use_density_backend: true,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dedup_window_hours <= 0 {
            return Err(DedupError::InvalidConfig(
                "dedup_window_hours must be positive".into(),
            ));
        }
        if self.temporal_horizon_hours <= 0.0 {
            return Err(DedupError::InvalidConfig(
                "temporal_horizon_hours must be positive".into(),
            ));
        }
        if self.geo_radius_km <= 0.0 {
            return Err(DedupError::InvalidConfig(
                "geo_radius_km must be positive".into(),
            ));
        }
        let w = &self.weights;
        if w.vector < 0.0 || w.temporal < 0.0 || w.geographic < 0.0 || w.actor < 0.0 {
            return Err(DedupError::InvalidConfig(
                "hybrid weights must be non-negative".into(),
            ));
        }
        if w.sum() <= 0.0 {
            return Err(DedupError::InvalidConfig(
                "hybrid weights must not all be zero".into(),
            ));
        }
        if self.min_cluster_size < 2 {
            return Err(DedupError::InvalidConfig(
                "min_cluster_size must be at least 2".into(),
            ));
        }
        Ok(())
    }
}
