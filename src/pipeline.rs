// src/pipeline.rs

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Embedding requests kept in flight concurrently while back-filling a batch.
const EMBED_CONCURRENCY: usize = 4;

use crate::clustering::{BatchClusteringEngine, DensityClusterer};
use crate::config::DedupConfig;
use crate::dedup::DuplicateChecker;
use crate::error::{DedupError, Result};
use crate::matching::{AliasTable, SimilarityScorer};
use crate::models::{Event, EventId};
use crate::store::{ClusterStore, EmbeddingProvider};

/// Statistics for one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Events received in the batch
    pub events_in: usize,
    /// Multi-member clusters formed within the batch
    pub clusters_formed: usize,
    /// Events too dissimilar to anything else in the batch
    pub noise_singletons: usize,
    /// Reports folded into already-persisted canonical events
    pub merged_into_existing: usize,
    /// New canonical events created
    pub canonical_created: usize,
    /// Mean confidence across multi-member clusters
    pub avg_cluster_confidence: f64,
    /// Wall-clock processing time in seconds
    pub processing_time_secs: f64,
}

/// A finalized write decision for one batch group. Decisions are collected
/// first and applied only after all clustering and duplicate checks are
/// done, so a canonical record never changes shape mid-comparison.
enum Decision {
    Merge {
        canonical: EventId,
        members: Vec<Event>,
    },
    Create {
        primary: Event,
        rest: Vec<Event>,
    },
}

/// End-to-end batch orchestration: embed, cluster within the batch, check
/// each group against the persisted window, then merge or create.
pub struct DedupePipeline {
    engine: BatchClusteringEngine,
    checker: DuplicateChecker,
    store: Arc<dyn ClusterStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl DedupePipeline {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        delegate: Option<Arc<dyn DensityClusterer>>,
        aliases: AliasTable,
        config: DedupConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scorer = SimilarityScorer::new(config, aliases);
        let engine = BatchClusteringEngine::new(scorer.clone(), delegate);
        let checker = DuplicateChecker::new(store.clone(), scorer);
        Ok(DedupePipeline {
            engine,
            checker,
            store,
            embedder,
        })
    }

    /// Processes one ingestion batch and returns run statistics.
    ///
    /// A failing embedding provider is fatal for the batch (there is no safe
    /// default for vector similarity); a failing clustering delegate is not
    /// (the engine falls back greedily).
    pub async fn process_batch(&self, mut batch: Vec<Event>) -> Result<BatchStats> {
        let start = Instant::now();
        let events_in = batch.len();
        info!("Processing batch of {} events", events_in);

        self.ensure_embeddings(&mut batch).await?;

        let clusters = self.engine.cluster(&batch).await?;
        let clusters_formed = clusters.iter().filter(|c| !c.is_singleton()).count();
        let noise_singletons = clusters.len() - clusters_formed;
        let avg_cluster_confidence = {
            let scores: Vec<f64> = clusters
                .iter()
                .filter(|c| !c.is_singleton())
                .map(|c| c.confidence)
                .collect();
            crate::utils::mean(&scores)
        };

        // Decision phase: read-only against storage.
        let mut decisions = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let primary = cluster.primary().clone();
            match self.checker.find_duplicate(&primary).await? {
                Some(existing) => decisions.push(Decision::Merge {
                    canonical: existing.id,
                    members: cluster.members,
                }),
                None => {
                    let rest = cluster
                        .members
                        .into_iter()
                        .filter(|e| e.id != primary.id)
                        .collect();
                    decisions.push(Decision::Create { primary, rest });
                }
            }
        }

        // Apply phase: all writes deferred until decisions are finalized.
        let mut merged_into_existing = 0usize;
        let mut canonical_created = 0usize;
        for decision in decisions {
            match decision {
                Decision::Merge { canonical, members } => {
                    debug!(
                        "Merging {} batch reports into canonical {}",
                        members.len(),
                        canonical
                    );
                    for member in &members {
                        self.store.merge_into_canonical(&canonical, member).await?;
                    }
                    merged_into_existing += members.len();
                }
                Decision::Create { primary, rest } => {
                    let stored = self.store.create_canonical(primary).await?;
                    debug!(
                        "Created canonical {} with {} sibling reports",
                        stored.id,
                        rest.len()
                    );
                    for member in &rest {
                        self.store.merge_into_canonical(&stored.id, member).await?;
                    }
                    canonical_created += 1;
                    merged_into_existing += rest.len();
                }
            }
        }

        let stats = BatchStats {
            events_in,
            clusters_formed,
            noise_singletons,
            merged_into_existing,
            canonical_created,
            avg_cluster_confidence,
            processing_time_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            "Batch done in {:.2?}: {} clusters, {} singletons, {} merged, {} created",
            start.elapsed(),
            stats.clusters_formed,
            stats.noise_singletons,
            stats.merged_into_existing,
            stats.canonical_created
        );
        Ok(stats)
    }

    /// Populates missing embeddings from the external provider, a few
    /// requests in flight at a time. Existing embeddings are never
    /// recomputed.
    async fn ensure_embeddings(&self, batch: &mut [Event]) -> Result<()> {
        let missing: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, e)| e.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        debug!("Embedding {} events without vectors", missing.len());

        let embeddings: Vec<Vec<f32>> = stream::iter(missing.iter().map(|&idx| {
            let text = format!("{} {}", batch[idx].headline, batch[idx].summary);
            let embedder = self.embedder.clone();
            async move { embedder.embed(text.trim()).await }
        }))
        .buffered(EMBED_CONCURRENCY)
        .try_collect()
        .await
        .map_err(|e| DedupError::Embedding(e.to_string()))?;

        for (idx, embedding) in missing.into_iter().zip(embeddings) {
            batch[idx].embedding = Some(embedding);
        }
        Ok(())
    }
}
