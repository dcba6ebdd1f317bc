//! Drives page fetches for one collection.
//!
//! Bulk mode fetches the cursor page, then every remaining page
//! concurrently. Progressive mode runs a background poll task that fetches
//! the current cursor page once per interval until the collection is
//! exhausted. Both modes merge through the same store step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use gridscan_core::{CollectionKind, ConfigResult, Entity, FetchMode, GridscanConfig};
use gridscan_source::{CollectionSource, Page, SourceError};
use gridscan_store::{CollectionStore, CollectionSummary, Generation, LoadStatus, MergeOutcome};

use crate::error::{SchedulerError, SchedulerResult};

/// Fetch settings shared by the schedulers of all collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub mode: FetchMode,
    pub page_size: u32,
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Progressive,
            page_size: 500,
            poll_interval: Duration::from_millis(750),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(config: &GridscanConfig) -> ConfigResult<Self> {
        Ok(Self {
            mode: config.fetch.mode,
            page_size: config.fetch.page_size,
            poll_interval: config.poll_interval()?,
        })
    }
}

/// Result of a single page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The cursor was already exhausted; nothing was fetched.
    Skipped,
    Merged(MergeOutcome),
}

/// Background poll task of a progressive load.
struct PollSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    generation: Generation,
}

impl PollSlot {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

struct Inner<E, S> {
    source: Arc<S>,
    store: CollectionStore<E>,
    config: SchedulerConfig,
    poll: Mutex<Option<PollSlot>>,
}

/// Page fetch scheduler for the collection of `E`.
///
/// Cheap to clone; clones share the store and the poll slot.
pub struct PageScheduler<E, S> {
    inner: Arc<Inner<E, S>>,
}

impl<E, S> Clone for PageScheduler<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity, S: CollectionSource> PageScheduler<E, S> {
    pub fn new(source: Arc<S>, store: CollectionStore<E>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                config,
                poll: Mutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        E::KIND
    }

    pub fn store(&self) -> &CollectionStore<E> {
        &self.inner.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub async fn is_exhausted(&self) -> bool {
        self.inner.store.is_exhausted().await
    }

    /// Whether a progressive poll task is active.
    pub async fn is_polling(&self) -> bool {
        self.inner.poll.lock().await.is_some()
    }

    /// Fetch one page and merge it into the current load cycle.
    ///
    /// A no-op once the cursor is exhausted. Merging the last page stops
    /// the poll task.
    pub async fn request_page(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> SchedulerResult<RequestOutcome> {
        let generation = self.inner.store.generation().await;
        self.request_page_for(generation, page_size, page_index).await
    }

    async fn request_page_for(
        &self,
        generation: Generation,
        page_size: u32,
        page_index: u32,
    ) -> SchedulerResult<RequestOutcome> {
        if page_index == 0 || page_size == 0 {
            return Err(SchedulerError::InvalidPage {
                page_index,
                page_size,
            });
        }
        if self.inner.store.is_exhausted().await {
            debug!(kind = %E::KIND, page = page_index, "cursor exhausted, skipping fetch");
            return Ok(RequestOutcome::Skipped);
        }

        let page = self
            .inner
            .source
            .fetch_page::<E>(page_size, page_index)
            .await?;
        let outcome = self.merge(generation, page_index, page).await?;
        Ok(RequestOutcome::Merged(outcome))
    }

    async fn merge(
        &self,
        generation: Generation,
        page_index: u32,
        page: Page<E>,
    ) -> SchedulerResult<MergeOutcome> {
        let outcome = self
            .inner
            .store
            .merge_page(generation, page_index, page.records, page.total_pages)
            .await?;
        if outcome == MergeOutcome::Exhausted {
            self.stop_polling_for(generation).await;
        }
        Ok(outcome)
    }

    /// Load the collection with the configured mode.
    ///
    /// Bulk loads run to completion; progressive loads return as soon as
    /// the poll task is running.
    pub async fn start(&self) -> SchedulerResult<()> {
        match self.inner.config.mode {
            FetchMode::Bulk => self.load_bulk().await,
            FetchMode::Progressive => {
                self.start_progressive().await;
                Ok(())
            }
        }
    }

    /// Fetch the cursor page, then all remaining pages concurrently.
    ///
    /// Pages merge in arrival order. The collection is marked loaded once
    /// every fetch has settled, or failed if any of them errored. After a
    /// failure, the next call refetches only the failed pages.
    pub async fn load_bulk(&self) -> SchedulerResult<()> {
        let generation = self.inner.store.begin_load().await;
        info!(kind = %E::KIND, generation, page_size = self.inner.config.page_size, "bulk load started");

        let result = self.run_bulk(generation).await;
        match &result {
            Ok(()) => {
                self.inner
                    .store
                    .finish_load(generation, LoadStatus::Loaded)
                    .await;
                info!(kind = %E::KIND, generation, "bulk load finished");
            }
            Err(e) if e.is_malformed() => {
                error!(kind = %E::KIND, generation, error = %e, "bulk load stalled");
                self.inner
                    .store
                    .mark_stalled(generation, e.to_string())
                    .await;
            }
            Err(e) => {
                error!(kind = %E::KIND, generation, error = %e, "bulk load failed");
                self.inner
                    .store
                    .finish_load(generation, LoadStatus::Failed(e.to_string()))
                    .await;
            }
        }
        result
    }

    async fn run_bulk(&self, generation: Generation) -> SchedulerResult<()> {
        let page_size = self.inner.config.page_size;

        let missing = self.inner.store.missing_pages().await;
        if !missing.is_empty() {
            debug!(kind = %E::KIND, pages = ?missing, "refetching failed pages");
            return self.fetch_pages(generation, page_size, missing).await;
        }

        let Some(first) = self.inner.store.cursor().await.page() else {
            debug!(kind = %E::KIND, "cursor exhausted, nothing to load");
            return Ok(());
        };

        let page = self
            .inner
            .source
            .fetch_page::<E>(page_size, first)
            .await?;
        let total_pages = page.total_pages;
        let next = match self.merge(generation, first, page).await? {
            MergeOutcome::Advanced { next_page } => next_page,
            MergeOutcome::Exhausted | MergeOutcome::Stale => return Ok(()),
        };

        debug!(kind = %E::KIND, from = next, total_pages, "fetching remaining pages");
        self.fetch_pages(generation, page_size, (next..=total_pages).collect())
            .await
    }

    /// Fetch `pages` concurrently and merge them as they arrive. Failed
    /// pages are recorded as missing so the next bulk load retries them.
    async fn fetch_pages(
        &self,
        generation: Generation,
        page_size: u32,
        pages: Vec<u32>,
    ) -> SchedulerResult<()> {
        let mut in_flight = JoinSet::new();
        for page_index in pages {
            let source = Arc::clone(&self.inner.source);
            in_flight.spawn(async move {
                let result = source.fetch_page::<E>(page_size, page_index).await;
                (page_index, result)
            });
        }

        let mut failed_pages = Vec::new();
        let mut first_error: Option<SourceError> = None;
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((page_index, Ok(page))) => {
                    self.merge(generation, page_index, page).await?;
                }
                Ok((page_index, Err(e))) => {
                    warn!(kind = %E::KIND, page = page_index, error = %e, "page fetch failed");
                    failed_pages.push(page_index);
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(SchedulerError::Task(e.to_string())),
            }
        }

        match first_error {
            Some(first) => {
                failed_pages.sort_unstable();
                self.inner
                    .store
                    .mark_missing(generation, &failed_pages)
                    .await;
                Err(SchedulerError::BulkLoad {
                    kind: E::KIND,
                    failed_pages,
                    first,
                })
            }
            None => Ok(()),
        }
    }

    /// Start the progressive poll task.
    ///
    /// Returns false if a poll task is already running or the collection
    /// is exhausted.
    pub async fn start_progressive(&self) -> bool {
        let mut poll = self.inner.poll.lock().await;
        if poll.is_some() {
            debug!(kind = %E::KIND, "poll task already running");
            return false;
        }
        if self.inner.store.is_exhausted().await {
            debug!(kind = %E::KIND, "cursor exhausted, not polling");
            return false;
        }

        let generation = self.inner.store.begin_load().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run_poll_loop(generation, shutdown_rx).await;
        });
        *poll = Some(PollSlot {
            handle,
            shutdown_tx,
            generation,
        });

        info!(
            kind = %E::KIND,
            generation,
            interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "progressive load started"
        );
        true
    }

    /// One fetch per tick for the current cursor. Ticks do not wait for
    /// earlier fetches.
    async fn run_poll_loop(&self, generation: Generation, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.config.poll_interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if self.inner.store.generation().await != generation {
                        debug!(kind = %E::KIND, generation, "poll loop outlived its generation");
                        break;
                    }
                    let Some(page_index) = self.inner.store.cursor().await.page() else {
                        debug!(kind = %E::KIND, "cursor exhausted, poll loop exiting");
                        break;
                    };
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.poll_tick(generation, page_index).await;
                    });
                }
                _ = shutdown.changed() => {
                    debug!(kind = %E::KIND, generation, "poll loop shutting down");
                    return;
                }
            }
        }
        self.release_poll_slot(generation).await;
    }

    async fn poll_tick(&self, generation: Generation, page_index: u32) {
        let page_size = self.inner.config.page_size;
        match self.request_page_for(generation, page_size, page_index).await {
            Ok(RequestOutcome::Merged(MergeOutcome::Exhausted)) => {
                if self
                    .inner
                    .store
                    .finish_load(generation, LoadStatus::Loaded)
                    .await
                {
                    info!(kind = %E::KIND, generation, page = page_index, "collection exhausted");
                }
            }
            Ok(_) => {}
            Err(SchedulerError::Source(e)) if e.is_transient() => {
                warn!(kind = %E::KIND, page = page_index, error = %e, "page fetch failed, retrying next tick");
            }
            Err(SchedulerError::Source(e)) => {
                error!(kind = %E::KIND, page = page_index, error = %e, "page fetch unusable, collection stalled");
                self.inner
                    .store
                    .mark_stalled(generation, e.to_string())
                    .await;
            }
            Err(e) => {
                error!(kind = %E::KIND, page = page_index, error = %e, "page request failed");
            }
        }
    }

    /// Stop the poll task, if any.
    pub async fn stop_polling(&self) -> bool {
        match self.inner.poll.lock().await.take() {
            Some(slot) => {
                let generation = slot.generation;
                slot.stop();
                debug!(kind = %E::KIND, generation, "poll task stopped");
                true
            }
            None => false,
        }
    }

    async fn stop_polling_for(&self, generation: Generation) {
        let mut poll = self.inner.poll.lock().await;
        if poll.as_ref().is_some_and(|slot| slot.generation == generation) {
            if let Some(slot) = poll.take() {
                slot.stop();
                debug!(kind = %E::KIND, generation, "poll task stopped on exhaustion");
            }
        }
    }

    /// Drop the slot of a poll loop that exited on its own.
    async fn release_poll_slot(&self, generation: Generation) {
        let mut poll = self.inner.poll.lock().await;
        if poll.as_ref().is_some_and(|slot| slot.generation == generation) {
            *poll = None;
        }
    }

    /// Stop polling and discard everything loaded so far.
    ///
    /// Fetches already in flight are left to finish; their merges are
    /// dropped as stale.
    pub async fn reset(&self) -> Generation {
        self.stop_polling().await;
        let generation = self.inner.store.reset().await;
        info!(kind = %E::KIND, generation, "collection reset");
        generation
    }

    /// Wait until the current load cycle is loaded or failed.
    pub async fn wait_settled(&self) -> CollectionSummary {
        let mut updates = self.inner.store.subscribe();
        loop {
            {
                let summary = updates.borrow_and_update();
                if summary.status.is_settled() {
                    return summary.clone();
                }
            }
            if updates.changed().await.is_err() {
                return self.inner.store.summary().await;
            }
        }
    }
}
