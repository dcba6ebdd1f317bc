//! In-memory state of one explorer collection.
//!
//! Holds the entities merged so far (in arrival order), the page cursor,
//! the loading flag, and the running aggregate. Every mutation goes
//! through the write lock, and a fresh [`CollectionSummary`] is published
//! on a watch channel after each change. Readers get owned copies only.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::debug;

use gridscan_aggregate::{AggregationPolicy, Aggregator};
use gridscan_core::{Entity, EntityId};

use crate::error::{StoreError, StoreResult};
use crate::types::*;

struct CollectionState<E> {
    entities: Vec<E>,
    cursor: Cursor,
    loading: bool,
    status: LoadStatus,
    generation: Generation,
    missing: BTreeSet<u32>,
    aggregator: Aggregator,
}

impl<E: Entity> CollectionState<E> {
    fn new(policy: AggregationPolicy) -> Self {
        Self {
            entities: Vec::new(),
            cursor: Cursor::first(),
            loading: false,
            status: LoadStatus::Idle,
            generation: 0,
            missing: BTreeSet::new(),
            aggregator: Aggregator::new(policy),
        }
    }

    /// Fold the page into the aggregate, then append it.
    fn append(&mut self, mut records: Vec<E>) {
        self.aggregator.fold_page(&records);
        self.entities.append(&mut records);
    }

    fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            kind: E::KIND,
            aggregate: *self.aggregator.snapshot(),
            loading: self.loading,
            cursor: self.cursor,
            status: self.status.clone(),
            entity_count: self.entities.len(),
            missing_pages: self.missing.iter().copied().collect(),
        }
    }
}

/// Shared handle to one collection's state.
///
/// Cheap to clone; all clones see the same collection.
pub struct CollectionStore<E> {
    state: Arc<RwLock<CollectionState<E>>>,
    updates: Arc<watch::Sender<CollectionSummary>>,
}

impl<E> Clone for CollectionStore<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            updates: Arc::clone(&self.updates),
        }
    }
}

impl<E: Entity> CollectionStore<E> {
    pub fn new(policy: AggregationPolicy) -> Self {
        let (tx, _rx) = watch::channel(CollectionSummary::fresh(E::KIND));
        Self {
            state: Arc::new(RwLock::new(CollectionState::new(policy))),
            updates: Arc::new(tx),
        }
    }

    fn publish(&self, state: &CollectionState<E>) {
        self.updates.send_replace(state.summary());
    }

    /// Subscribe to summaries published after every change.
    pub fn subscribe(&self) -> watch::Receiver<CollectionSummary> {
        self.updates.subscribe()
    }

    pub async fn generation(&self) -> Generation {
        self.state.read().await.generation
    }

    pub async fn cursor(&self) -> Cursor {
        self.state.read().await.cursor
    }

    pub async fn is_exhausted(&self) -> bool {
        self.state.read().await.cursor.is_exhausted()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mark the collection as loading and return the generation that
    /// fetches of this cycle must be tagged with.
    pub async fn begin_load(&self) -> Generation {
        let mut state = self.state.write().await;
        state.loading = true;
        state.status = LoadStatus::Loading;
        self.publish(&state);
        debug!(kind = %E::KIND, generation = state.generation, "load started");
        state.generation
    }

    /// Append a page of records in arrival order, folding it into the
    /// aggregate. The cursor is left alone.
    pub async fn append_page(&self, records: Vec<E>) {
        if records.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        state.append(records);
        self.publish(&state);
    }

    /// Merge a fetched page and step the cursor.
    ///
    /// The cursor becomes `Exhausted` when the page is empty or
    /// `page_index` reached `total_pages`; otherwise it advances by one.
    /// Once exhausted it stays exhausted, but late pages still merge.
    /// Pages from an older generation are dropped.
    pub async fn merge_page(
        &self,
        generation: Generation,
        page_index: u32,
        records: Vec<E>,
        total_pages: u32,
    ) -> StoreResult<MergeOutcome> {
        if page_index == 0 {
            return Err(StoreError::InvalidPageIndex(page_index));
        }

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(
                kind = %E::KIND,
                page = page_index,
                fetched_generation = generation,
                current_generation = state.generation,
                "dropping stale page"
            );
            return Ok(MergeOutcome::Stale);
        }

        let page_len = records.len();
        let last_page = page_len == 0 || page_index >= total_pages;
        state.append(records);
        state.missing.remove(&page_index);

        state.cursor = match state.cursor {
            Cursor::Exhausted => Cursor::Exhausted,
            Cursor::Next(_) if last_page => Cursor::Exhausted,
            Cursor::Next(next) => Cursor::Next(next + 1),
        };
        if matches!(state.status, LoadStatus::Stalled(_)) {
            state.status = LoadStatus::Loading;
        }
        self.publish(&state);

        debug!(
            kind = %E::KIND,
            page = page_index,
            total_pages,
            page_len,
            entities = state.entities.len(),
            cursor = ?state.cursor,
            "page merged"
        );

        Ok(match state.cursor {
            Cursor::Next(next_page) => MergeOutcome::Advanced { next_page },
            Cursor::Exhausted => MergeOutcome::Exhausted,
        })
    }

    /// End the load cycle of `generation` with the given status.
    ///
    /// Returns false if the store has moved on to a newer generation.
    pub async fn finish_load(&self, generation: Generation, status: LoadStatus) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.loading = false;
        state.status = status;
        self.publish(&state);
        true
    }

    /// Flag the load of `generation` as stalled. The loading flag stays set.
    pub async fn mark_stalled(&self, generation: Generation, reason: String) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.status = LoadStatus::Stalled(reason);
        self.publish(&state);
        true
    }

    /// Record pages of `generation` that failed to load. They stay
    /// missing until merged or until the next reset.
    pub async fn mark_missing(&self, generation: Generation, pages: &[u32]) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.missing.extend(pages.iter().copied());
        self.publish(&state);
        true
    }

    pub async fn missing_pages(&self) -> Vec<u32> {
        self.state.read().await.missing.iter().copied().collect()
    }

    /// Discard all entities and counters and rewind the cursor to page 1.
    ///
    /// Returns the new generation; merges tagged with an older one are
    /// dropped from now on.
    pub async fn reset(&self) -> Generation {
        let mut state = self.state.write().await;
        state.entities = Vec::new();
        state.cursor = Cursor::first();
        state.loading = false;
        state.status = LoadStatus::Idle;
        state.aggregator.reset();
        state.missing.clear();
        state.generation += 1;
        self.publish(&state);
        debug!(kind = %E::KIND, generation = state.generation, "collection reset");
        state.generation
    }

    /// Owned copy of entities and counters.
    pub async fn snapshot_view(&self) -> CollectionView<E> {
        let state = self.state.read().await;
        CollectionView {
            kind: E::KIND,
            entities: state.entities.clone(),
            aggregate: *state.aggregator.snapshot(),
            loading: state.loading,
            cursor: state.cursor,
            status: state.status.clone(),
        }
    }

    pub async fn summary(&self) -> CollectionSummary {
        self.state.read().await.summary()
    }

    /// First entity matching `predicate`, cloned.
    pub async fn find<F>(&self, predicate: F) -> Option<E>
    where
        F: Fn(&E) -> bool,
    {
        let state = self.state.read().await;
        state.entities.iter().find(|e| predicate(e)).cloned()
    }

    /// First entity with the given id, cloned.
    pub async fn get(&self, id: EntityId) -> Option<E> {
        self.find(|e| e.id() == id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_aggregate::AggregateSnapshot;
    use gridscan_core::{Farm, Node, epoch_secs};

    fn store() -> CollectionStore<Node> {
        CollectionStore::new(AggregationPolicy::default())
    }

    fn nodes(ids: std::ops::Range<i64>) -> Vec<Node> {
        let now = epoch_secs();
        ids.map(|id| Node {
            id,
            farm_id: id % 2,
            updated: now,
            ..Default::default()
        })
        .collect()
    }

    #[tokio::test]
    async fn fresh_store_starts_at_page_one() {
        let store = store();
        assert_eq!(store.cursor().await, Cursor::Next(1));
        assert!(!store.is_loading().await);
        assert!(store.is_empty().await);
        assert_eq!(store.summary().await, CollectionSummary::fresh(gridscan_core::CollectionKind::Nodes));
    }

    #[tokio::test]
    async fn three_page_scenario() {
        let store = store();
        let generation = store.begin_load().await;

        let out = store.merge_page(generation, 1, nodes(0..2), 3).await.unwrap();
        assert_eq!(out, MergeOutcome::Advanced { next_page: 2 });
        assert_eq!(store.cursor().await, Cursor::Next(2));

        let out = store.merge_page(generation, 2, nodes(2..4), 3).await.unwrap();
        assert_eq!(out, MergeOutcome::Advanced { next_page: 3 });

        let out = store.merge_page(generation, 3, nodes(4..5), 3).await.unwrap();
        assert_eq!(out, MergeOutcome::Exhausted);
        assert!(store.is_exhausted().await);
        assert_eq!(store.len().await, 5);
        assert_eq!(store.summary().await.aggregate.registered, 5);
    }

    #[tokio::test]
    async fn empty_page_exhausts_despite_total() {
        let store = store();
        let generation = store.begin_load().await;
        let out = store.merge_page(generation, 1, Vec::new(), 5).await.unwrap();
        assert_eq!(out, MergeOutcome::Exhausted);
        assert_eq!(store.summary().await.aggregate, AggregateSnapshot::default());
    }

    #[tokio::test]
    async fn late_page_merges_after_exhaustion() {
        let store = store();
        let generation = store.begin_load().await;
        store.merge_page(generation, 1, nodes(0..2), 3).await.unwrap();
        // Page 3 resolves before page 2.
        store.merge_page(generation, 3, nodes(4..5), 3).await.unwrap();
        let out = store.merge_page(generation, 2, nodes(2..4), 3).await.unwrap();
        assert_eq!(out, MergeOutcome::Exhausted);
        assert_eq!(store.len().await, 5);

        let ids: Vec<i64> = store.snapshot_view().await.entities.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 4, 2, 3]);
    }

    #[tokio::test]
    async fn stale_generation_dropped() {
        let store = store();
        let old = store.begin_load().await;
        store.reset().await;
        let out = store.merge_page(old, 1, nodes(0..2), 1).await.unwrap();
        assert_eq!(out, MergeOutcome::Stale);
        assert!(store.is_empty().await);
        assert!(!store.finish_load(old, LoadStatus::Loaded).await);
    }

    #[tokio::test]
    async fn page_zero_rejected() {
        let store = store();
        let generation = store.generation().await;
        let err = store.merge_page(generation, 0, nodes(0..1), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPageIndex(0)));
    }

    #[tokio::test]
    async fn reset_returns_to_fresh_view() {
        let fresh = store().snapshot_view().await;

        let store = store();
        let generation = store.begin_load().await;
        store.merge_page(generation, 1, nodes(0..3), 2).await.unwrap();
        store.mark_stalled(generation, "bad header".to_string()).await;
        store.reset().await;

        assert_eq!(store.snapshot_view().await, fresh);
    }

    #[tokio::test]
    async fn missing_pages_clear_on_merge_and_reset() {
        let store = store();
        let generation = store.begin_load().await;
        store.merge_page(generation, 1, nodes(0..2), 4).await.unwrap();
        assert!(store.mark_missing(generation, &[3, 2]).await);
        store.merge_page(generation, 4, nodes(6..7), 4).await.unwrap();

        assert!(store.is_exhausted().await);
        assert_eq!(store.missing_pages().await, vec![2, 3]);
        assert_eq!(store.summary().await.missing_pages, vec![2, 3]);

        store.merge_page(generation, 2, nodes(2..4), 4).await.unwrap();
        assert_eq!(store.missing_pages().await, vec![3]);

        assert!(!store.mark_missing(generation + 1, &[5]).await);
        store.reset().await;
        assert!(store.missing_pages().await.is_empty());
    }

    #[tokio::test]
    async fn append_page_keeps_cursor() {
        let store = store();
        store.append_page(nodes(0..3)).await;
        store.append_page(Vec::new()).await;
        assert_eq!(store.len().await, 3);
        assert_eq!(store.cursor().await, Cursor::Next(1));
        assert_eq!(store.summary().await.aggregate.registered, 3);
    }

    #[tokio::test]
    async fn stall_clears_on_next_merge() {
        let store = store();
        let generation = store.begin_load().await;
        store.mark_stalled(generation, "missing Pages header".to_string()).await;
        assert!(matches!(store.summary().await.status, LoadStatus::Stalled(_)));
        assert!(store.is_loading().await);

        store.merge_page(generation, 1, nodes(0..1), 2).await.unwrap();
        assert_eq!(store.summary().await.status, LoadStatus::Loading);
    }

    #[tokio::test]
    async fn subscribers_see_merges() {
        let store = store();
        let mut rx = store.subscribe();
        let generation = store.begin_load().await;
        store.merge_page(generation, 1, nodes(0..4), 1).await.unwrap();
        store.finish_load(generation, LoadStatus::Loaded).await;

        assert!(rx.has_changed().unwrap());
        let summary = rx.borrow_and_update().clone();
        assert_eq!(summary.entity_count, 4);
        assert_eq!(summary.cursor, Cursor::Exhausted);
        assert_eq!(summary.status, LoadStatus::Loaded);
        assert!(!summary.loading);
    }

    #[tokio::test]
    async fn view_is_a_copy() {
        let store = store();
        store.append_page(nodes(0..2)).await;
        let mut view = store.snapshot_view().await;
        view.entities.clear();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn find_by_id() {
        let farms: CollectionStore<Farm> = CollectionStore::new(AggregationPolicy::default());
        farms
            .append_page(vec![
                Farm { id: 10, name: "alpha".to_string(), ..Default::default() },
                Farm { id: 11, name: "beta".to_string(), ..Default::default() },
            ])
            .await;
        let farm = farms.find(|f| f.id == 11).await.unwrap();
        assert_eq!(farm.name, "beta");
        assert!(farms.find(|f| f.id == 12).await.is_none());
        assert_eq!(farms.get(10).await.map(|f| f.name), Some("alpha".to_string()));
        assert!(farms.get(12).await.is_none());
    }
}
