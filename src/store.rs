// src/store.rs
//
// Boundary contracts between the core and its external collaborators:
// persistent storage on one side, the embedding capability on the other.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{DedupError, Result};
use crate::models::{DedupWindow, Event, EventId};

/// Read/write contract against the persisted canonical-event store.
///
/// The core only ever reads a bounded recent window and defers all writes
/// until clustering decisions are finalized. Implementations must never let
/// the core mutate embeddings or historical timestamps of canonical events.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Canonical events whose event-time falls inside `window`.
    async fn load_recent_events(&self, window: &DedupWindow) -> Result<Vec<Event>>;

    /// Folds a duplicate report into an existing canonical event: provenance
    /// is extended and `last_seen_at` advances, nothing else changes.
    async fn merge_into_canonical(&self, existing: &EventId, incoming: &Event) -> Result<()>;

    /// Persists a new canonical event and returns the stored record.
    async fn create_canonical(&self, event: Event) -> Result<Event>;
}

/// The external embedding capability. Expected to block/await; the only
/// other awaited operation in the core is the clustering delegate.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Vector-backed reference implementation of `ClusterStore`, used by the
/// pipeline tests and as a template for real storage adapters.
#[derive(Default)]
pub struct InMemoryStore {
    events: RwLock<HashMap<EventId, Event>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing canonical events.
    pub async fn seed(&self, events: impl IntoIterator<Item = Event>) {
        let mut guard = self.events.write().await;
        for event in events {
            guard.insert(event.id.clone(), event);
        }
    }

    pub async fn get(&self, id: &EventId) -> Option<Event> {
        self.events.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn load_recent_events(&self, window: &DedupWindow) -> Result<Vec<Event>> {
        let guard = self.events.read().await;
        let mut recent: Vec<Event> = guard
            .values()
            .filter(|e| window.contains(e.anchor_time()))
            .cloned()
            .collect();
        // Stable output order keeps batch runs reproducible.
        recent.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(recent)
    }

    async fn merge_into_canonical(&self, existing: &EventId, incoming: &Event) -> Result<()> {
        let mut guard = self.events.write().await;
        let canonical = guard
            .get_mut(existing)
            .ok_or_else(|| DedupError::Storage(format!("no canonical event {existing}")))?;
        canonical.source_count += incoming.source_count.max(1);
        let seen = incoming.last_seen_at.max(Utc::now());
        if seen > canonical.last_seen_at {
            canonical.last_seen_at = seen;
        }
        Ok(())
    }

    async fn create_canonical(&self, event: Event) -> Result<Event> {
        let mut guard = self.events.write().await;
        guard.insert(event.id.clone(), event.clone());
        Ok(event)
    }
}
