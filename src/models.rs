// src/models.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Dimensionality of event embeddings produced by the MiniLM family of
/// sentence encoders used by the ingestion side.
pub const EMBEDDING_DIM: usize = 384;

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Using newtype pattern for type safety to prevent mixing different ID types

/// Strongly typed identifier for Event records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        EventId(Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//------------------------------------------------------------------------------
// CORE DOMAIN MODELS
//------------------------------------------------------------------------------

/// A resolved geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Reported casualty counts for an event, where known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CasualtyCounts {
    pub killed: Option<u32>,
    pub wounded: Option<u32>,
}

/// A single canonical conflict event assembled from one or more reports.
///
/// Events are immutable once created: a duplicate report never becomes a new
/// event, it is folded into the existing canonical record's provenance
/// (`source_count` is incremented and `last_seen_at` advances). The embedding,
/// once computed, is never recomputed or mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: EventId,

    /// Canonical headline text
    pub headline: String,

    /// Free-text summary of the report
    pub summary: String,

    /// Resolved coordinates, if the location service produced any
    pub location: Option<GeoPoint>,

    /// When the event happened (event-time, not ingestion-time), if known
    pub occurred_at: Option<DateTime<Utc>>,

    /// Primary actor names (factions, states), in reported order
    pub actors: Vec<String>,

    /// Reported casualty counts, if any
    pub casualties: Option<CasualtyCounts>,

    /// Fixed-length embedding of the event text, populated before scoring
    pub embedding: Option<Vec<f32>>,

    /// When this canonical record was first created
    pub created_at: DateTime<Utc>,

    /// When a report for this event was last seen
    pub last_seen_at: DateTime<Utc>,

    /// How many independent source reports have been folded into this record
    pub source_count: u32,
}

impl Event {
    /// Creates a fresh event from a single report.
    pub fn new(headline: impl Into<String>, summary: impl Into<String>) -> Self {
        let now = Utc::now();
        Event {
            id: EventId::new(),
            headline: headline.into(),
            summary: summary.into(),
            location: None,
            occurred_at: None,
            actors: Vec::new(),
            casualties: None,
            embedding: None,
            created_at: now,
            last_seen_at: now,
            source_count: 1,
        }
    }

    /// Number of populated structured fields. Used to pick the most
    /// informative member of a cluster as its canonical representative.
    pub fn completeness(&self) -> u32 {
        let mut filled = 0;
        if self.location.is_some() {
            filled += 1;
        }
        if self.occurred_at.is_some() {
            filled += 1;
        }
        if self.casualties.is_some() {
            filled += 1;
        }
        if !self.actors.is_empty() {
            filled += 1;
        }
        if !self.summary.trim().is_empty() {
            filled += 1;
        }
        filled
    }

    /// The timestamp used to anchor window lookups: event-time when known,
    /// otherwise ingestion time.
    pub fn anchor_time(&self) -> DateTime<Utc> {
        self.occurred_at.unwrap_or(self.created_at)
    }
}

//------------------------------------------------------------------------------
// SIMILARITY & CLUSTERING VALUE TYPES
//------------------------------------------------------------------------------

/// The outcome of comparing two events, recomputed on demand and never
/// persisted.
///
/// `vector` and `temporal` are always scored (an unknown timestamp scores 0,
/// since time disagreement must gate semantic agreement). `geographic` and
/// `actor` are `None` when the dimension is unavailable on either side —
/// an unknown location must not be treated as "far away" — and the hybrid
/// weights are re-normalized over the dimensions actually present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    /// Cosine similarity of the embeddings mapped to [0,1]
    pub vector: f64,
    /// Time-decay similarity in [0,1]
    pub temporal: f64,
    /// Distance-decay similarity in [0,1], if both events have coordinates
    pub geographic: Option<f64>,
    /// Jaccard overlap of alias-resolved actor sets, if either set is non-empty
    pub actor: Option<f64>,
    /// Weighted average over the available dimensions, in [0,1]
    pub hybrid: f64,
}

/// A transient group of events judged to describe one real-world occurrence.
///
/// Clusters exist only for the duration of a batch run; they produce merge
/// decisions and are then discarded.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Member events, in batch input order
    pub members: Vec<Event>,
    /// Identifier of the designated canonical member
    pub primary_id: EventId,
    /// Mean pairwise hybrid score among members; 1.0 for singletons
    pub confidence: f64,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// The designated canonical member.
    pub fn primary(&self) -> &Event {
        self.members
            .iter()
            .find(|e| e.id == self.primary_id)
            .unwrap_or(&self.members[0])
    }
}

/// A bounded time interval over persisted events, used to cap the cost of
/// duplicate lookups regardless of corpus growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DedupWindow {
    /// A symmetric window of `hours` on each side of `anchor`.
    pub fn around(anchor: DateTime<Utc>, hours: i64) -> Self {
        let half = Duration::hours(hours);
        DedupWindow {
            start: anchor - half,
            end: anchor + half,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}
