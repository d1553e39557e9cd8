// src/clustering/mod.rs

pub mod density;
mod greedy;

pub use density::{DensityClusterer, DensityParams, SubprocessClusterer};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::matching::SimilarityScorer;
use crate::models::{Cluster, Event, EventId};
use crate::utils::mean;

/// Partitions a batch of new events into groups that describe the same
/// real-world occurrence.
///
/// Prefers the density-based delegate when one is configured and available;
/// any delegate failure is recovered by falling back to greedy single-link
/// clustering so the pipeline keeps running without the optional
/// acceleration. Produces clustering decisions only; the caller applies
/// them against storage.
pub struct BatchClusteringEngine {
    scorer: SimilarityScorer,
    delegate: Option<Arc<dyn DensityClusterer>>,
}

impl BatchClusteringEngine {
    pub fn new(scorer: SimilarityScorer, delegate: Option<Arc<dyn DensityClusterer>>) -> Self {
        BatchClusteringEngine { scorer, delegate }
    }

    /// Clusters the batch. Deterministic given a fixed input order and
    /// configuration (delegate output is re-ordered by first member index).
    pub async fn cluster(&self, events: &[Event]) -> Result<Vec<Cluster>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let config = self.scorer.config();
        let threshold = config.similarity_threshold;

        let groups = match self.try_density(events).await {
            Some(groups) => groups,
            None => greedy::greedy_groups(events, &self.scorer, threshold).await?,
        };

        let mut clusters = Vec::with_capacity(groups.len());
        for group in groups {
            clusters.push(self.build_cluster(events, group)?);
        }

        info!(
            "Clustered batch of {} events into {} groups ({} singletons)",
            events.len(),
            clusters.len(),
            clusters.iter().filter(|c| c.is_singleton()).count()
        );
        Ok(clusters)
    }

    /// Runs the density delegate if configured, mapping its labeled groups
    /// back to batch indices and post-filtering them by hybrid score.
    /// Returns `None` whenever the greedy fallback should run instead.
    async fn try_density(&self, events: &[Event]) -> Option<Vec<Vec<usize>>> {
        let config = self.scorer.config();
        if !config.use_density_backend {
            return None;
        }
        let delegate = self.delegate.as_ref()?;
        if !delegate.is_available() {
            warn!("Density clustering delegate unavailable; using greedy fallback");
            return None;
        }
        if events.len() < config.min_cluster_size {
            // Too few samples to form any density cluster; everything would
            // come back as noise anyway.
            debug!(
                "Batch of {} below min_cluster_size {}; skipping delegate",
                events.len(),
                config.min_cluster_size
            );
            return None;
        }

        let params = DensityParams {
            min_cluster_size: config.min_cluster_size,
            min_samples: config.min_samples,
            cluster_selection_epsilon: config.cluster_selection_epsilon,
        };
        let labeled = match delegate.cluster(events, &params).await {
            Ok(labeled) => labeled,
            Err(e) => {
                warn!(
                    "Density clustering delegate failed: {:#}; using greedy fallback",
                    e
                );
                return None;
            }
        };

        Some(self.groups_from_labels(events, labeled))
    }

    /// Converts delegate id-groups into index groups, evicting members the
    /// hybrid post-filter rejects and emitting noise events as singletons.
    fn groups_from_labels(&self, events: &[Event], labeled: Vec<Vec<EventId>>) -> Vec<Vec<usize>> {
        let index_by_id: HashMap<&EventId, usize> =
            events.iter().enumerate().map(|(i, e)| (&e.id, i)).collect();

        let mut grouped = vec![false; events.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for id_group in labeled {
            let mut group: Vec<usize> = id_group
                .iter()
                .filter_map(|id| match index_by_id.get(id) {
                    Some(&idx) => Some(idx),
                    None => {
                        warn!("Delegate returned unknown event id {}; ignoring", id);
                        None
                    }
                })
                .collect();
            group.sort_unstable();
            group.dedup();

            let (kept, evicted) = self.post_filter(events, group);
            for idx in &kept {
                grouped[*idx] = true;
            }
            for idx in evicted {
                // Evicted members fall out as singletons below.
                debug!("Post-filter evicted event {} from its group", events[idx].id);
            }
            if !kept.is_empty() {
                groups.push(kept);
            }
        }

        for (idx, seen) in grouped.iter().enumerate() {
            if !seen {
                groups.push(vec![idx]);
            }
        }
        // Delegate output order is not guaranteed; re-order for determinism.
        groups.sort_by_key(|g| g[0]);
        groups
    }

    /// The delegate clusters in embedding space alone; the temporal,
    /// geographic and actor dimensions act as a post-filter here. A member
    /// whose mean hybrid score against the rest of its group falls below the
    /// threshold is evicted.
    fn post_filter(&self, events: &[Event], group: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
        if group.len() < 2 {
            return (group, Vec::new());
        }
        let threshold = self.scorer.config().similarity_threshold;
        let mut kept = Vec::with_capacity(group.len());
        let mut evicted = Vec::new();

        for &member in &group {
            let mut scores = Vec::with_capacity(group.len() - 1);
            for &other in &group {
                if other == member {
                    continue;
                }
                match self.scorer.score(&events[member], &events[other]) {
                    Ok(sim) => scores.push(sim.hybrid),
                    Err(e) => {
                        warn!(
                            "Post-filter could not score {} vs {}: {}",
                            events[member].id, events[other].id, e
                        );
                    }
                }
            }
            if !scores.is_empty() && mean(&scores) >= threshold {
                kept.push(member);
            } else {
                evicted.push(member);
            }
        }

        // A "group" reduced to one survivor is no group at all.
        if kept.len() < 2 {
            evicted.extend(kept.drain(..));
        }
        (kept, evicted)
    }

    /// Builds the final cluster value: primary selection plus mean pairwise
    /// confidence.
    fn build_cluster(&self, events: &[Event], group: Vec<usize>) -> Result<Cluster> {
        let members: Vec<Event> = group.iter().map(|&i| events[i].clone()).collect();
        let primary_id = select_primary(&members).clone();

        let confidence = if members.len() < 2 {
            1.0
        } else {
            let mut scores = Vec::new();
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    scores.push(self.scorer.score(&members[i], &members[j])?.hybrid);
                }
            }
            mean(&scores)
        };

        Ok(Cluster {
            members,
            primary_id,
            confidence,
        })
    }
}

/// Picks the canonical representative of a group: the member with the most
/// populated structured fields, ties broken by earliest event-time (unknown
/// times sort last), then by id so the ordering is total.
fn select_primary(members: &[Event]) -> &EventId {
    let best = members
        .iter()
        .max_by(|a, b| {
            a.completeness()
                .cmp(&b.completeness())
                .then_with(|| {
                    let ta = a.occurred_at.unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                    let tb = b.occurred_at.unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                    tb.cmp(&ta) // earlier timestamp wins the max
                })
                .then_with(|| b.id.cmp(&a.id))
        })
        .expect("select_primary called with at least one member");
    &best.id
}
