//! Error types for the collection store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while mutating a collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid page index {0}: pages are 1-based")]
    InvalidPageIndex(u32),
}
