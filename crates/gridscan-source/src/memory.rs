//! In-memory source serving fixed collections.
//!
//! Used for tests and offline runs. Records are stored as JSON values and
//! decoded on every fetch, so pages travel the same serde path as HTTP
//! responses. Failures, page-count overrides, and per-page delays can be
//! scripted per collection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use gridscan_core::{CollectionKind, Entity};

use crate::error::{SourceError, SourceResult};
use crate::source::{CollectionSource, Page};

#[derive(Default)]
struct MemoryInner {
    collections: HashMap<CollectionKind, Vec<Value>>,
    failures: HashMap<CollectionKind, VecDeque<SourceError>>,
    page_failures: HashMap<(CollectionKind, u32), SourceError>,
    total_pages: HashMap<CollectionKind, u32>,
    delays: HashMap<(CollectionKind, u32), Duration>,
    requests: Vec<(CollectionKind, u32)>,
}

/// Scriptable in-memory collection source.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<MemoryInner>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `records` as the collection of their kind.
    pub fn with_records<E: Entity>(self, records: &[E]) -> Self {
        let values = records
            .iter()
            .filter_map(|record| match serde_json::to_value(record) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(kind = %E::KIND, error = %e, "skipping unserializable record");
                    None
                }
            })
            .collect();
        self.with_raw(E::KIND, values)
    }

    /// Serve raw JSON values for a collection.
    pub fn with_raw(self, kind: CollectionKind, values: Vec<Value>) -> Self {
        self.lock().collections.insert(kind, values);
        self
    }

    /// Fail the next fetch of `kind` with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, kind: CollectionKind, error: SourceError) {
        self.lock().failures.entry(kind).or_default().push_back(error);
    }

    /// Fail the next fetch of one specific page of `kind`.
    pub fn fail_page(&self, kind: CollectionKind, page_index: u32, error: SourceError) {
        self.lock().page_failures.insert((kind, page_index), error);
    }

    /// Report `pages` as the page count regardless of the records served.
    pub fn override_total_pages(&self, kind: CollectionKind, pages: u32) {
        self.lock().total_pages.insert(kind, pages);
    }

    /// Delay responses for one page of a collection.
    pub fn delay_page(&self, kind: CollectionKind, page_index: u32, delay: Duration) {
        self.lock().delays.insert((kind, page_index), delay);
    }

    /// Every `(kind, page)` requested so far, in request order.
    pub fn requests(&self) -> Vec<(CollectionKind, u32)> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, kind: CollectionKind) -> usize {
        self.lock().requests.iter().filter(|(k, _)| *k == kind).count()
    }
}

/// Number of pages needed for `total` records.
pub fn page_count(total: usize, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as usize) as u32
}

impl CollectionSource for MemorySource {
    async fn fetch_page<E: Entity>(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> SourceResult<Page<E>> {
        let kind = E::KIND;

        let (values, total_pages, delay) = {
            let mut inner = self.lock();
            inner.requests.push((kind, page_index));

            if let Some(error) = inner.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
                debug!(%kind, page = page_index, %error, "scripted failure");
                return Err(error);
            }
            if let Some(error) = inner.page_failures.remove(&(kind, page_index)) {
                debug!(%kind, page = page_index, %error, "scripted page failure");
                return Err(error);
            }

            let all = inner.collections.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
            let start = (page_index.saturating_sub(1) as usize).saturating_mul(page_size as usize);
            let values: Vec<Value> = all
                .iter()
                .skip(start)
                .take(page_size as usize)
                .cloned()
                .collect();
            let total_pages = inner
                .total_pages
                .get(&kind)
                .copied()
                .unwrap_or_else(|| page_count(all.len(), page_size));
            let delay = inner.delays.get(&(kind, page_index)).copied();
            (values, total_pages, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let records = values
            .into_iter()
            .map(serde_json::from_value::<E>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SourceError::MalformedResponse(format!("decoding {kind}: {e}")))?;

        Ok(Page {
            records,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::{Gateway, Node};
    use serde_json::json;

    fn nodes(n: i64) -> Vec<Node> {
        (1..=n).map(|id| Node { id, ..Default::default() }).collect()
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 500), 0);
        assert_eq!(page_count(5, 2), 3);
        assert_eq!(page_count(4, 2), 2);
        assert_eq!(page_count(1, 500), 1);
    }

    #[tokio::test]
    async fn serves_pages_in_order() {
        let source = MemorySource::new().with_records(&nodes(5));

        let page: Page<Node> = source.fetch_page(2, 1).await.unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.records.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);

        let page: Page<Node> = source.fetch_page(2, 3).await.unwrap();
        assert_eq!(page.records.iter().map(|n| n.id).collect::<Vec<_>>(), vec![5]);

        let page: Page<Node> = source.fetch_page(2, 4).await.unwrap();
        assert!(page.records.is_empty());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let source = MemorySource::new().with_records(&nodes(3));
        let page: Page<Gateway> = source.fetch_page(10, 1).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let source = MemorySource::new().with_records(&nodes(2));
        source.fail_next(CollectionKind::Nodes, SourceError::Transport("reset".to_string()));

        let err = source.fetch_page::<Node>(10, 1).await.unwrap_err();
        assert_eq!(err, SourceError::Transport("reset".to_string()));
        assert!(source.fetch_page::<Node>(10, 1).await.is_ok());
        assert_eq!(source.request_count(CollectionKind::Nodes), 2);
    }

    #[tokio::test]
    async fn page_failure_targets_one_page() {
        let source = MemorySource::new().with_records(&nodes(4));
        source.fail_page(
            CollectionKind::Nodes,
            2,
            SourceError::Server { status: 503, body: String::new() },
        );

        assert!(source.fetch_page::<Node>(2, 1).await.is_ok());
        assert!(source.fetch_page::<Node>(2, 2).await.is_err());
        assert!(source.fetch_page::<Node>(2, 2).await.is_ok());
    }

    #[tokio::test]
    async fn undecodable_record_is_malformed() {
        let source = MemorySource::new()
            .with_raw(CollectionKind::Nodes, vec![json!({"id": "not-a-number"})]);
        let err = source.fetch_page::<Node>(10, 1).await.unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn total_pages_override() {
        let source = MemorySource::new();
        source.override_total_pages(CollectionKind::Nodes, 5);
        let page: Page<Node> = source.fetch_page(10, 1).await.unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_pages, 5);
    }
}
