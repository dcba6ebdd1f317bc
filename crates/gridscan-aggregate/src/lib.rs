//! gridscan-aggregate — incremental aggregation of explorer collections.
//!
//! Folds each freshly fetched page into running counters in O(page size),
//! never rescanning pages folded earlier.
//!
//! # Architecture
//!
//! ```text
//! Aggregator (one per collection)
//!   ├── fold_page() ← called once per merged page
//!   ├── AggregationPolicy
//!   │   ├── LivenessPolicy  (online counter)
//!   │   ├── CountryCounting (distinct set vs per-page sum)
//!   │   └── ResourceScope   (online-only vs all sums)
//!   └── snapshot() → AggregateSnapshot
//! ```

pub mod aggregator;

pub use aggregator::{
    AggregateSnapshot, AggregationPolicy, Aggregator, ResourceTotals, WorkloadTotals,
};
