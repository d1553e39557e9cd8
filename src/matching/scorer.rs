// src/matching/scorer.rs

use log::trace;

use crate::config::DedupConfig;
use crate::error::{DedupError, Result};
use crate::matching::actors::{actor_overlap, AliasTable};
use crate::models::{Event, SimilarityResult};
use crate::utils::{cosine_similarity, haversine_km};

/// Multi-factor pairwise similarity scorer.
///
/// Pure computation: deterministic for the same pair and configuration, no
/// side effects. Symmetric in its arguments.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    config: DedupConfig,
    aliases: AliasTable,
}

impl SimilarityScorer {
    pub fn new(config: DedupConfig, aliases: AliasTable) -> Self {
        SimilarityScorer { config, aliases }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Scores two events across the vector, temporal, geographic and actor
    /// dimensions and combines them into a hybrid score.
    ///
    /// Both events must carry embeddings; a missing embedding is a contract
    /// violation surfaced as `DedupError::MissingEmbedding`, never silently
    /// scored as zero.
    pub fn score(&self, a: &Event, b: &Event) -> Result<SimilarityResult> {
        let emb_a = a
            .embedding
            .as_deref()
            .ok_or_else(|| DedupError::MissingEmbedding(a.id.clone()))?;
        let emb_b = b
            .embedding
            .as_deref()
            .ok_or_else(|| DedupError::MissingEmbedding(b.id.clone()))?;
        if emb_a.len() != emb_b.len() {
            return Err(DedupError::EmbeddingDimensionMismatch {
                left: emb_a.len(),
                right: emb_b.len(),
            });
        }

        // Cosine is in [-1,1]; map to [0,1]. A zero-magnitude embedding has
        // undefined cosine and scores 0.
        let vector = cosine_similarity(emb_a, emb_b)
            .map(|cos| (cos + 1.0) / 2.0)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let temporal = self.temporal_score(a, b);
        let geographic = self.geographic_score(a, b);
        let actor = actor_overlap(&a.actors, &b.actors, &self.aliases);

        let hybrid = self.combine(vector, temporal, geographic, actor);

        trace!(
            "score({}, {}): vector={:.3} temporal={:.3} geographic={:?} actor={:?} hybrid={:.3}",
            a.id,
            b.id,
            vector,
            temporal,
            geographic,
            actor,
            hybrid
        );

        Ok(SimilarityResult {
            vector,
            temporal,
            geographic,
            actor,
            hybrid,
        })
    }

    /// Exponential decay over the event-time difference. An unknown timestamp
    /// on either side scores 0: time disagreement must gate semantic
    /// agreement, so this dimension is never excluded.
    fn temporal_score(&self, a: &Event, b: &Event) -> f64 {
        match (a.occurred_at, b.occurred_at) {
            (Some(ta), Some(tb)) => {
                let delta_hours = (ta - tb).num_seconds().abs() as f64 / 3600.0;
                (-delta_hours / self.config.temporal_horizon_hours).exp()
            }
            _ => 0.0,
        }
    }

    /// Exponential decay over great-circle distance. Excluded entirely when
    /// either event lacks resolved coordinates: an unknown location must not
    /// be treated as "far away".
    fn geographic_score(&self, a: &Event, b: &Event) -> Option<f64> {
        let (pa, pb) = (a.location?, b.location?);
        let km = haversine_km(pa.latitude, pa.longitude, pb.latitude, pb.longitude);
        Some((-km / self.config.geo_radius_km).exp())
    }

    /// Weighted average over the dimensions that are actually available,
    /// re-normalizing the weights over that subset.
    fn combine(
        &self,
        vector: f64,
        temporal: f64,
        geographic: Option<f64>,
        actor: Option<f64>,
    ) -> f64 {
        let w = &self.config.weights;
        let mut weighted_sum = vector * w.vector + temporal * w.temporal;
        let mut weight_total = w.vector + w.temporal;
        if let Some(geo) = geographic {
            weighted_sum += geo * w.geographic;
            weight_total += w.geographic;
        }
        if let Some(act) = actor {
            weighted_sum += act * w.actor;
            weight_total += w.actor;
        }
        if weight_total == 0.0 {
            return 0.0;
        }
        (weighted_sum / weight_total).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use chrono::{Duration, TimeZone, Utc};

    fn base_event(embedding: Vec<f32>) -> Event {
        let mut event = Event::new("Clashes in the border region", "Two groups exchanged fire");
        event.occurred_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        event.location = Some(GeoPoint {
            latitude: 48.3,
            longitude: 37.9,
        });
        event.actors = vec!["Army A".to_string(), "Militia B".to_string()];
        event.embedding = Some(embedding);
        event
    }

    fn scorer() -> SimilarityScorer {
        SimilarityScorer::new(DedupConfig::default(), AliasTable::new())
    }

    #[test]
    fn reflexive_score_is_one() {
        let event = base_event(vec![0.1, 0.5, -0.3, 0.8]);
        let sim = scorer().score(&event, &event).unwrap();
        assert!((sim.hybrid - 1.0).abs() < 1e-9, "hybrid {}", sim.hybrid);
        assert!((sim.vector - 1.0).abs() < 1e-9);
        assert!((sim.temporal - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_symmetric() {
        let a = base_event(vec![0.1, 0.5, -0.3, 0.8]);
        let mut b = base_event(vec![0.2, 0.4, 0.0, 0.7]);
        b.occurred_at = Some(a.occurred_at.unwrap() + Duration::hours(5));
        b.location = Some(GeoPoint {
            latitude: 48.5,
            longitude: 38.1,
        });
        b.actors = vec!["Army A".to_string()];
        let s = scorer();
        let ab = s.score(&a, &b).unwrap();
        let ba = s.score(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn all_components_bounded() {
        let a = base_event(vec![1.0, 0.0, 0.0]);
        let mut b = base_event(vec![-1.0, 0.0, 0.0]);
        b.occurred_at = Some(a.occurred_at.unwrap() + Duration::days(30));
        b.location = Some(GeoPoint {
            latitude: -33.9,
            longitude: 151.2,
        });
        b.actors = vec!["Navy C".to_string()];
        let sim = scorer().score(&a, &b).unwrap();
        for value in [
            sim.vector,
            sim.temporal,
            sim.geographic.unwrap(),
            sim.actor.unwrap(),
            sim.hybrid,
        ] {
            assert!((0.0..=1.0).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn missing_embedding_is_an_error() {
        let a = base_event(vec![0.1, 0.2]);
        let mut b = base_event(vec![0.1, 0.2]);
        b.embedding = None;
        match scorer().score(&a, &b) {
            Err(DedupError::MissingEmbedding(id)) => assert_eq!(id, b.id),
            other => panic!("expected MissingEmbedding, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_dimensions_are_an_error() {
        let a = base_event(vec![0.1, 0.2]);
        let b = base_event(vec![0.1, 0.2, 0.3]);
        assert!(matches!(
            scorer().score(&a, &b),
            Err(DedupError::EmbeddingDimensionMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn near_duplicate_scenario_scores_high() {
        // Identical embeddings, 10 minutes apart, ~5 km apart, same actors.
        let a = base_event(vec![0.3, 0.3, 0.9, -0.1]);
        let mut b = a.clone();
        b.id = crate::models::EventId::new();
        b.occurred_at = Some(a.occurred_at.unwrap() + Duration::minutes(10));
        b.location = Some(GeoPoint {
            latitude: 48.345,
            longitude: 37.9,
        });
        let sim = scorer().score(&a, &b).unwrap();
        assert!(sim.hybrid >= 0.95, "hybrid {}", sim.hybrid);
    }

    #[test]
    fn far_apart_in_time_drops_below_threshold() {
        // Cosine 0.9 but 10 days apart with disjoint actors.
        let a = base_event(vec![1.0, 0.0, 0.458]);
        let mut b = base_event(vec![1.0, 0.458, 0.0]);
        b.occurred_at = Some(a.occurred_at.unwrap() + Duration::days(10));
        b.actors = vec!["Faction Z".to_string()];
        b.location = None;
        let sim = scorer().score(&a, &b).unwrap();
        assert!(sim.temporal < 0.01, "temporal {}", sim.temporal);
        assert!(sim.hybrid < 0.7, "hybrid {}", sim.hybrid);
    }

    #[test]
    fn missing_coordinates_renormalize_instead_of_zeroing() {
        let a = base_event(vec![0.4, 0.1, 0.7]);
        let mut b = base_event(vec![0.4, 0.2, 0.6]);
        b.occurred_at = Some(a.occurred_at.unwrap() + Duration::hours(3));

        let s = scorer();
        let with_geo = s.score(&a, &b).unwrap();

        let mut b_no_geo = b.clone();
        b_no_geo.location = None;
        let without_geo = s.score(&a, &b_no_geo).unwrap();
        assert!(without_geo.geographic.is_none());

        // Expected hybrid with vector+temporal+actor weights re-normalized.
        let w = DedupConfig::default().weights;
        let expected = (with_geo.vector * w.vector
            + with_geo.temporal * w.temporal
            + with_geo.actor.unwrap() * w.actor)
            / (w.vector + w.temporal + w.actor);
        assert!(
            (without_geo.hybrid - expected).abs() < 1e-9,
            "got {} expected {}",
            without_geo.hybrid,
            expected
        );
    }

    #[test]
    fn symmetry_and_bounds_hold_for_random_embeddings() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let s = scorer();
        for _ in 0..50 {
            let va: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let vb: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let a = base_event(va);
            let mut b = base_event(vb);
            b.occurred_at =
                Some(a.occurred_at.unwrap() + Duration::hours(rng.gen_range(0..72)));
            let ab = s.score(&a, &b).unwrap();
            let ba = s.score(&b, &a).unwrap();
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab.hybrid));
        }
    }

    #[test]
    fn unknown_timestamp_scores_zero_on_temporal() {
        let a = base_event(vec![0.5, 0.5]);
        let mut b = base_event(vec![0.5, 0.5]);
        b.occurred_at = None;
        let sim = scorer().score(&a, &b).unwrap();
        assert_eq!(sim.temporal, 0.0);
        // The dimension stays in the average rather than being excluded.
        assert!(sim.hybrid < 1.0);
    }
}
