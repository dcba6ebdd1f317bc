//! Folds pages of entities into running totals.
//!
//! Each page is visited once. Counters only ever grow; nothing is
//! recomputed from previously folded pages, so an entity that goes
//! offline after being folded stays counted as online until the next
//! reset.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use gridscan_core::{
    AggregationConfig, CountryCounting, Entity, LivenessPolicy, ResourceAmount, ResourceScope,
    WorkloadAmount, epoch_secs,
};

/// Summed resource units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTotals {
    pub cru: f64,
    pub mru: f64,
    pub sru: f64,
    pub hru: f64,
}

impl ResourceTotals {
    fn add(&mut self, amount: &ResourceAmount) {
        self.cru += amount.cru;
        self.mru += amount.mru;
        self.sru += amount.sru;
        self.hru += amount.hru;
    }
}

/// Summed workload counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadTotals {
    pub network: f64,
    pub volume: f64,
    pub container: f64,
    pub zdb_namespace: f64,
    pub k8s_vm: f64,
}

impl WorkloadTotals {
    fn add(&mut self, amount: &WorkloadAmount) {
        self.network += amount.network as f64;
        self.volume += amount.volume as f64;
        self.container += amount.container as f64;
        self.zdb_namespace += amount.zdb_namespace as f64;
        self.k8s_vm += amount.k8s_vm as f64;
    }
}

/// Running counters for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Entities folded so far.
    pub registered: u64,
    /// Entities that were online when folded.
    pub online: u64,
    /// Country count, see [`CountryCounting`].
    pub countries: u64,
    pub resources: ResourceTotals,
    pub workloads: WorkloadTotals,
    /// Non-empty pages folded.
    pub pages: u64,
}

impl AggregateSnapshot {
    pub fn offline(&self) -> u64 {
        self.registered - self.online
    }
}

/// Knobs controlling how entities contribute to the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregationPolicy {
    pub liveness: LivenessPolicy,
    pub country_counting: CountryCounting,
    pub resource_scope: ResourceScope,
}

impl From<&AggregationConfig> for AggregationPolicy {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            liveness: config.liveness,
            country_counting: config.country_counting,
            resource_scope: config.resource_scope,
        }
    }
}

/// Incremental aggregator for a single collection.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    policy: AggregationPolicy,
    snapshot: AggregateSnapshot,
    /// Countries seen this load cycle (only with `CountryCounting::Distinct`).
    seen_countries: HashSet<String>,
}

impl Aggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self {
            policy,
            snapshot: AggregateSnapshot::default(),
            seen_countries: HashSet::new(),
        }
    }

    pub fn snapshot(&self) -> &AggregateSnapshot {
        &self.snapshot
    }

    /// Fold a freshly fetched page, classifying liveness as of now.
    pub fn fold_page<E: Entity>(&mut self, entities: &[E]) -> &AggregateSnapshot {
        self.fold_page_at(entities, epoch_secs())
    }

    /// Fold a freshly fetched page, classifying liveness as of `now`.
    ///
    /// An empty page leaves the snapshot untouched.
    pub fn fold_page_at<E: Entity>(&mut self, entities: &[E], now: i64) -> &AggregateSnapshot {
        if entities.is_empty() {
            return &self.snapshot;
        }

        let mut page_countries: HashSet<&str> = HashSet::new();
        let mut online = 0u64;

        for entity in entities {
            let is_online = entity
                .last_updated()
                .is_some_and(|ts| self.policy.liveness.is_online(ts, now));
            if is_online {
                online += 1;
            }

            let country = entity.location().country.trim();
            if !country.is_empty() {
                page_countries.insert(country);
            }

            let contributes = match self.policy.resource_scope {
                ResourceScope::All => true,
                ResourceScope::Online => is_online,
            };
            if contributes {
                if let Some(resources) = entity.total_resources() {
                    self.snapshot.resources.add(resources);
                }
                if let Some(workloads) = entity.workloads() {
                    self.snapshot.workloads.add(workloads);
                }
            }
        }

        match self.policy.country_counting {
            CountryCounting::PerPage => {
                self.snapshot.countries += page_countries.len() as u64;
            }
            CountryCounting::Distinct => {
                for country in page_countries {
                    if !self.seen_countries.contains(country) {
                        self.seen_countries.insert(country.to_string());
                    }
                }
                self.snapshot.countries = self.seen_countries.len() as u64;
            }
        }

        self.snapshot.registered += entities.len() as u64;
        self.snapshot.online += online;
        self.snapshot.pages += 1;

        trace!(
            kind = %E::KIND,
            page_len = entities.len(),
            registered = self.snapshot.registered,
            online = self.snapshot.online,
            "page folded"
        );
        &self.snapshot
    }

    /// Zero every counter and forget seen countries.
    pub fn reset(&mut self) {
        self.snapshot = AggregateSnapshot::default();
        self.seen_countries.clear();
    }
}
