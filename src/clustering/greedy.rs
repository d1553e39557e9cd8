// src/clustering/greedy.rs

use log::debug;

use crate::error::Result;
use crate::matching::SimilarityScorer;
use crate::models::Event;

/// How many pairwise comparisons to run between cooperative yield points.
/// Comparisons are cheap and independent, so a dropped future stops within
/// one chunk and partial work is simply discarded.
const YIELD_EVERY: usize = 64;

/// Greedy single-link clustering over a batch, the always-available fallback
/// when the density-based delegate is missing or fails.
///
/// Iterates events in input order; each not-yet-assigned event seeds a new
/// group, then absorbs every later unassigned event whose hybrid score
/// against the seed reaches `threshold`. O(n²) in the batch size, which is
/// acceptable because the ingestion layer bounds batches. Deterministic for
/// a fixed input order and configuration.
pub(crate) async fn greedy_groups(
    events: &[Event],
    scorer: &SimilarityScorer,
    threshold: f64,
) -> Result<Vec<Vec<usize>>> {
    let mut assigned = vec![false; events.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut comparisons = 0usize;

    for seed in 0..events.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut group = vec![seed];

        for other in (seed + 1)..events.len() {
            if assigned[other] {
                continue;
            }
            let sim = scorer.score(&events[seed], &events[other])?;
            comparisons += 1;
            if comparisons % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            if sim.hybrid >= threshold {
                assigned[other] = true;
                group.push(other);
            }
        }
        groups.push(group);
    }

    debug!(
        "Greedy clustering: {} events into {} groups ({} comparisons)",
        events.len(),
        groups.len(),
        comparisons
    );
    Ok(groups)
}
