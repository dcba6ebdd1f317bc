//! gridscan-scheduler — page fetch scheduling for explorer collections.
//!
//! A `PageScheduler<E, S>` owns the load cycle of one collection: it asks
//! the source for pages, merges them into the collection store, and stops
//! once the cursor is exhausted. `Explorer` groups the node, farm, and
//! gateway schedulers behind one trigger API.
//!
//! # Architecture
//!
//! ```text
//! Explorer<S>
//!   ├── PageScheduler<Node, S>
//!   │   ├── bulk:        cursor page, then JoinSet of remaining pages
//!   │   ├── progressive: poll task, one fetch task per tick
//!   │   └── CollectionStore<Node> (merge_page / reset / subscribe)
//!   ├── PageScheduler<Farm, S>
//!   └── PageScheduler<Gateway, S>
//! ```
//!
//! # Failures
//!
//! Transport and server errors during progressive loads are logged and the
//! next tick retries the same page. A malformed response stalls the
//! collection until a later fetch succeeds. Bulk loads collect failed
//! pages into [`SchedulerError::BulkLoad`].

pub mod error;
pub mod explorer;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use explorer::{Explorer, ExplorerSummary};
pub use scheduler::{PageScheduler, RequestOutcome, SchedulerConfig};
