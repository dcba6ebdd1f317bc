//! Scheduler error types.

use thiserror::Error;

use gridscan_core::CollectionKind;
use gridscan_source::SourceError;
use gridscan_store::StoreError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Page index and size are 1-based.
    #[error("invalid page request: page {page_index} of size {page_size}")]
    InvalidPage { page_index: u32, page_size: u32 },

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("bulk load of {kind} failed for pages {failed_pages:?}: {first}")]
    BulkLoad {
        kind: CollectionKind,
        failed_pages: Vec<u32>,
        first: SourceError,
    },

    #[error("fetch task failed: {0}")]
    Task(String),
}

impl SchedulerError {
    /// Whether the underlying source answered with an unusable response.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Source(SourceError::MalformedResponse(_))
                | Self::BulkLoad {
                    first: SourceError::MalformedResponse(_),
                    ..
                }
        )
    }
}
