//! gridscan-store — in-memory collection store for gridscan.
//!
//! One `CollectionStore<E>` per explorer collection holds the merged
//! entities, the page cursor, the loading flag, and the running
//! aggregate. Nothing is persisted; a reset discards everything.
//!
//! # Architecture
//!
//! ```text
//! CollectionStore<E>  (Clone, Arc<RwLock<..>> inside)
//!   ├── merge_page()  ← fetched page: fold + append + cursor step
//!   ├── reset()       → bumps generation, stale merges are dropped
//!   ├── snapshot_view() / summary() → owned copies
//!   └── subscribe()   → watch::Receiver<CollectionSummary>
//! ```

pub mod error;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::CollectionStore;
pub use types::*;
