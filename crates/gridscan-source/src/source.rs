//! The paginated collection source contract.

use std::future::Future;
use std::sync::Arc;

use gridscan_core::Entity;

use crate::error::SourceResult;

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<E> {
    pub records: Vec<E>,
    /// Total number of pages at the requested page size, as reported by
    /// the source when this page was served.
    pub total_pages: u32,
}

/// A paginated endpoint serving explorer collections.
///
/// The collection is selected by the entity type (`E::KIND`). Pages are
/// 1-based.
pub trait CollectionSource: Send + Sync + 'static {
    fn fetch_page<E: Entity>(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> impl Future<Output = SourceResult<Page<E>>> + Send;
}

impl<S: CollectionSource> CollectionSource for Arc<S> {
    fn fetch_page<E: Entity>(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> impl Future<Output = SourceResult<Page<E>>> + Send {
        (**self).fetch_page(page_size, page_index)
    }
}
