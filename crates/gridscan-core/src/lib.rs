//! gridscan-core — shared types for the gridscan explorer sync engine.
//!
//! Holds the entity records (nodes, farms, gateways) returned by the
//! explorer directory, the liveness classifier, and `gridscan.toml`
//! configuration parsing.

pub mod config;
pub mod liveness;
pub mod types;

pub use config::{
    AggregationConfig, ConfigError, ConfigResult, CountryCounting, FetchConfig, FetchMode,
    GridscanConfig, ResourceScope, SourceConfig,
};
pub use liveness::{Liveness, LivenessPolicy, classify};
pub use types::*;
