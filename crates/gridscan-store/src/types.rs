//! Published state types for the collection store.
//!
//! Consumers only ever receive owned copies of these; the live state
//! stays behind the store's lock.

use serde::{Deserialize, Serialize};

use gridscan_aggregate::AggregateSnapshot;
use gridscan_core::CollectionKind;

/// Load-cycle counter. Bumped on every reset so late fetches can be
/// recognised and dropped.
pub type Generation = u64;

/// Page cursor of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "page", rename_all = "snake_case")]
pub enum Cursor {
    /// 1-based index of the next page to request.
    Next(u32),
    /// No further pages in this load cycle.
    Exhausted,
}

impl Cursor {
    pub fn first() -> Self {
        Self::Next(1)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Next page to request, if any.
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Next(page) => Some(*page),
            Self::Exhausted => None,
        }
    }
}

/// Coarse load state surfaced to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LoadStatus {
    /// Nothing requested since the last reset.
    Idle,
    Loading,
    Loaded,
    /// The load ended with an error (bulk mode).
    Failed(String),
    /// The source returned a response that could not be used; the
    /// collection stays loading until a later fetch succeeds.
    Stalled(String),
}

impl LoadStatus {
    /// Whether the load cycle has ended, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Loaded | Self::Failed(_))
    }
}

/// Result of merging one fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Page merged, more pages remain.
    Advanced { next_page: u32 },
    /// Page merged and the cursor is exhausted.
    Exhausted,
    /// Page belongs to an earlier generation and was dropped.
    Stale,
}

/// Entity-free view of a collection, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub kind: CollectionKind,
    pub aggregate: AggregateSnapshot,
    pub loading: bool,
    pub cursor: Cursor,
    pub status: LoadStatus,
    pub entity_count: usize,
    /// Pages of the current load cycle whose fetch failed and that have
    /// not merged since.
    #[serde(default)]
    pub missing_pages: Vec<u32>,
}

impl CollectionSummary {
    pub fn fresh(kind: CollectionKind) -> Self {
        Self {
            kind,
            aggregate: AggregateSnapshot::default(),
            loading: false,
            cursor: Cursor::first(),
            status: LoadStatus::Idle,
            entity_count: 0,
            missing_pages: Vec::new(),
        }
    }
}

/// Owned copy of a collection's entities and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionView<E> {
    pub kind: CollectionKind,
    pub entities: Vec<E>,
    pub aggregate: AggregateSnapshot,
    pub loading: bool,
    pub cursor: Cursor,
    pub status: LoadStatus,
}
