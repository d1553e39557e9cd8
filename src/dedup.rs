// src/dedup.rs

use log::{debug, info, warn};
use std::sync::Arc;

use crate::error::{DedupError, Result};
use crate::matching::SimilarityScorer;
use crate::models::{DedupWindow, Event};
use crate::store::ClusterStore;

/// Checks a single new event against the bounded recent window of persisted
/// canonical events.
pub struct DuplicateChecker {
    store: Arc<dyn ClusterStore>,
    scorer: SimilarityScorer,
}

impl DuplicateChecker {
    pub fn new(store: Arc<dyn ClusterStore>, scorer: SimilarityScorer) -> Self {
        DuplicateChecker { store, scorer }
    }

    /// Returns the best-matching persisted canonical event whose hybrid score
    /// against `candidate` reaches the configured threshold, or `None`.
    ///
    /// The search is bounded by the deduplication window around the
    /// candidate's event-time; events outside it are never compared. A
    /// malformed stored record is logged and skipped rather than aborting
    /// the whole search, but a failed window read propagates: returning
    /// `None` there would wrongly claim "no duplicate found" when nothing
    /// was checked.
    pub async fn find_duplicate(&self, candidate: &Event) -> Result<Option<Event>> {
        if candidate.embedding.is_none() {
            return Err(DedupError::MissingEmbedding(candidate.id.clone()));
        }

        let config = self.scorer.config();
        let window = DedupWindow::around(candidate.anchor_time(), config.dedup_window_hours);
        let recent = self.store.load_recent_events(&window).await?;
        if recent.is_empty() {
            debug!(
                "No persisted events in window {:?} for candidate {}",
                window, candidate.id
            );
            return Ok(None);
        }

        debug!(
            "Checking candidate {} against {} events in window",
            candidate.id,
            recent.len()
        );

        let threshold = config.similarity_threshold;
        let mut best: Option<(f64, Event)> = None;
        let mut skipped = 0usize;

        for stored in recent {
            let sim = match self.scorer.score(candidate, &stored) {
                Ok(sim) => sim,
                Err(e) => {
                    warn!(
                        "Skipping stored event {} during duplicate check for {}: {}",
                        stored.id, candidate.id, e
                    );
                    skipped += 1;
                    continue;
                }
            };
            if sim.hybrid < threshold {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_score, best_event)) => {
                    // Equal scores prefer the more recently created record,
                    // most likely to carry the most complete provenance.
                    sim.hybrid > *best_score
                        || (sim.hybrid == *best_score && stored.created_at > best_event.created_at)
                }
            };
            if better {
                best = Some((sim.hybrid, stored));
            }
        }

        if skipped > 0 {
            warn!(
                "Duplicate check for {} skipped {} malformed stored events",
                candidate.id, skipped
            );
        }

        match best {
            Some((score, event)) => {
                info!(
                    "Candidate {} matches canonical {} (hybrid {:.3})",
                    candidate.id, event.id, score
                );
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::matching::AliasTable;
    use crate::models::{DedupWindow, EventId, GeoPoint};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    fn checker_with(store: Arc<dyn ClusterStore>) -> DuplicateChecker {
        let scorer = SimilarityScorer::new(DedupConfig::default(), AliasTable::new());
        DuplicateChecker::new(store, scorer)
    }

    fn report(headline: &str, hour: u32, embedding: Vec<f32>) -> Event {
        let mut event = Event::new(headline, "summary text");
        event.occurred_at = Some(Utc.with_ymd_and_hms(2024, 7, 4, hour, 0, 0).unwrap());
        event.location = Some(GeoPoint {
            latitude: 31.5,
            longitude: 34.46,
        });
        event.actors = vec!["Faction A".to_string()];
        event.embedding = Some(embedding);
        event
    }

    #[tokio::test]
    async fn empty_window_returns_none() {
        let store = Arc::new(InMemoryStore::new());
        let checker = checker_with(store);
        let candidate = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        assert!(checker.find_duplicate(&candidate).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finds_the_best_scoring_match_above_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let close = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        let far = report("naval incident", 11, vec![-0.7, 0.1, 0.6]);
        store.seed([close.clone(), far]).await;

        let checker = checker_with(store);
        let mut candidate = report("depot struck by artillery", 10, vec![0.2, 0.8, 0.1]);
        candidate.occurred_at = Some(close.occurred_at.unwrap() + Duration::minutes(30));

        let found = checker.find_duplicate(&candidate).await.unwrap().unwrap();
        assert_eq!(found.id, close.id);
    }

    #[tokio::test]
    async fn below_threshold_returns_none() {
        let store = Arc::new(InMemoryStore::new());
        // Same window but dissimilar embedding and disjoint actors.
        let mut stored = report("flood damages bridge", 10, vec![-0.9, 0.1, 0.2]);
        stored.actors = vec!["River Authority".to_string()];
        stored.location = Some(GeoPoint {
            latitude: -12.0,
            longitude: 130.8,
        });
        store.seed([stored]).await;

        let checker = checker_with(store);
        let candidate = report("strike on depot", 11, vec![0.9, 0.2, -0.1]);
        assert!(checker.find_duplicate(&candidate).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_stored_event_is_skipped_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        let mut broken = report("broken record", 10, vec![]);
        broken.embedding = None;
        let good = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        store.seed([broken, good.clone()]).await;

        let checker = checker_with(store);
        let candidate = report("depot hit", 10, vec![0.2, 0.8, 0.1]);
        let found = checker.find_duplicate(&candidate).await.unwrap().unwrap();
        assert_eq!(found.id, good.id);
    }

    #[tokio::test]
    async fn candidate_without_embedding_is_a_contract_violation() {
        let store = Arc::new(InMemoryStore::new());
        let checker = checker_with(store);
        let mut candidate = report("no vector", 10, vec![]);
        candidate.embedding = None;
        assert!(matches!(
            checker.find_duplicate(&candidate).await,
            Err(DedupError::MissingEmbedding(_))
        ));
    }

    #[tokio::test]
    async fn equal_scores_prefer_the_newer_record() {
        let store = Arc::new(InMemoryStore::new());
        let mut older = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        older.created_at = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let mut newer = older.clone();
        newer.id = EventId::new();
        newer.created_at = Utc.with_ymd_and_hms(2024, 7, 3, 0, 0, 0).unwrap();
        store.seed([older, newer.clone()]).await;

        let checker = checker_with(store);
        let candidate = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        let found = checker.find_duplicate(&candidate).await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
    }

    struct FailingStore;

    #[async_trait]
    impl ClusterStore for FailingStore {
        async fn load_recent_events(&self, _window: &DedupWindow) -> crate::error::Result<Vec<Event>> {
            Err(DedupError::Storage("connection refused".into()))
        }
        async fn merge_into_canonical(
            &self,
            _existing: &EventId,
            _incoming: &Event,
        ) -> crate::error::Result<()> {
            unreachable!()
        }
        async fn create_canonical(&self, _event: Event) -> crate::error::Result<Event> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn storage_outage_propagates_instead_of_returning_none() {
        let checker = checker_with(Arc::new(FailingStore));
        let candidate = report("strike on depot", 10, vec![0.2, 0.8, 0.1]);
        assert!(matches!(
            checker.find_duplicate(&candidate).await,
            Err(DedupError::Storage(_))
        ));
    }
}
