//! The three collection schedulers behind one trigger API.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use gridscan_aggregate::AggregationPolicy;
use gridscan_core::{CollectionKind, ConfigResult, Farm, Gateway, GridscanConfig, Node};
use gridscan_source::CollectionSource;
use gridscan_store::{CollectionStore, CollectionSummary};

use crate::error::SchedulerResult;
use crate::scheduler::{PageScheduler, SchedulerConfig};

/// Summaries of all three collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplorerSummary {
    pub nodes: CollectionSummary,
    pub farms: CollectionSummary,
    pub gateways: CollectionSummary,
}

impl ExplorerSummary {
    /// Registered farms, as counted by the farms collection.
    pub fn farm_count(&self) -> u64 {
        self.farms.aggregate.registered
    }

    pub fn all_settled(&self) -> bool {
        [&self.nodes, &self.farms, &self.gateways]
            .iter()
            .all(|s| s.status.is_settled())
    }
}

/// Node, farm, and gateway schedulers sharing one source.
pub struct Explorer<S> {
    nodes: PageScheduler<Node, S>,
    farms: PageScheduler<Farm, S>,
    gateways: PageScheduler<Gateway, S>,
}

impl<S> Clone for Explorer<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            farms: self.farms.clone(),
            gateways: self.gateways.clone(),
        }
    }
}

impl<S: CollectionSource> Explorer<S> {
    pub fn new(source: S, config: SchedulerConfig, policy: AggregationPolicy) -> Self {
        let source = Arc::new(source);
        Self {
            nodes: PageScheduler::new(Arc::clone(&source), CollectionStore::new(policy), config),
            farms: PageScheduler::new(Arc::clone(&source), CollectionStore::new(policy), config),
            gateways: PageScheduler::new(source, CollectionStore::new(policy), config),
        }
    }

    pub fn from_config(source: S, config: &GridscanConfig) -> ConfigResult<Self> {
        let scheduler = SchedulerConfig::from_config(config)?;
        let policy = AggregationPolicy::from(&config.aggregation);
        Ok(Self::new(source, scheduler, policy))
    }

    pub fn nodes(&self) -> &PageScheduler<Node, S> {
        &self.nodes
    }

    pub fn farms(&self) -> &PageScheduler<Farm, S> {
        &self.farms
    }

    pub fn gateways(&self) -> &PageScheduler<Gateway, S> {
        &self.gateways
    }

    /// Start loading one collection with the configured mode.
    pub async fn start_load(&self, kind: CollectionKind) -> SchedulerResult<()> {
        match kind {
            CollectionKind::Nodes => self.nodes.start().await,
            CollectionKind::Farms => self.farms.start().await,
            CollectionKind::Gateways => self.gateways.start().await,
        }
    }

    /// Start all three collections concurrently.
    ///
    /// Every collection is started even if another fails; the first error
    /// is returned.
    pub async fn start_all(&self) -> SchedulerResult<()> {
        let (nodes, farms, gateways) =
            tokio::join!(self.nodes.start(), self.farms.start(), self.gateways.start());
        nodes?;
        farms?;
        gateways
    }

    pub async fn reset_all(&self) {
        tokio::join!(self.nodes.reset(), self.farms.reset(), self.gateways.reset());
        info!("all collections reset");
    }

    /// Discard everything and load all collections again.
    pub async fn refresh(&self) -> SchedulerResult<()> {
        self.reset_all().await;
        self.start_all().await
    }

    pub async fn is_exhausted(&self, kind: CollectionKind) -> bool {
        match kind {
            CollectionKind::Nodes => self.nodes.is_exhausted().await,
            CollectionKind::Farms => self.farms.is_exhausted().await,
            CollectionKind::Gateways => self.gateways.is_exhausted().await,
        }
    }

    pub async fn summary(&self, kind: CollectionKind) -> CollectionSummary {
        match kind {
            CollectionKind::Nodes => self.nodes.store().summary().await,
            CollectionKind::Farms => self.farms.store().summary().await,
            CollectionKind::Gateways => self.gateways.store().summary().await,
        }
    }

    pub async fn summaries(&self) -> ExplorerSummary {
        ExplorerSummary {
            nodes: self.nodes.store().summary().await,
            farms: self.farms.store().summary().await,
            gateways: self.gateways.store().summary().await,
        }
    }

    pub fn subscribe(&self, kind: CollectionKind) -> watch::Receiver<CollectionSummary> {
        match kind {
            CollectionKind::Nodes => self.nodes.store().subscribe(),
            CollectionKind::Farms => self.farms.store().subscribe(),
            CollectionKind::Gateways => self.gateways.store().subscribe(),
        }
    }

    /// Wait until every collection has finished its load cycle.
    pub async fn wait_all_settled(&self) -> ExplorerSummary {
        let (nodes, farms, gateways) = tokio::join!(
            self.nodes.wait_settled(),
            self.farms.wait_settled(),
            self.gateways.wait_settled()
        );
        ExplorerSummary {
            nodes,
            farms,
            gateways,
        }
    }

    /// The farm a node belongs to, if that farm has been loaded.
    pub async fn farm_of(&self, node: &Node) -> Option<Farm> {
        self.farms.store().get(node.farm_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_aggregate::AggregateSnapshot;
    use gridscan_store::LoadStatus;

    fn summary(kind: CollectionKind, status: LoadStatus, registered: u64) -> CollectionSummary {
        CollectionSummary {
            status,
            aggregate: AggregateSnapshot {
                registered,
                ..Default::default()
            },
            ..CollectionSummary::fresh(kind)
        }
    }

    #[test]
    fn farm_count_comes_from_farms() {
        let s = ExplorerSummary {
            nodes: summary(CollectionKind::Nodes, LoadStatus::Loaded, 10),
            farms: summary(CollectionKind::Farms, LoadStatus::Loaded, 3),
            gateways: summary(CollectionKind::Gateways, LoadStatus::Loaded, 1),
        };
        assert_eq!(s.farm_count(), 3);
        assert!(s.all_settled());
    }

    #[test]
    fn settled_requires_every_collection() {
        let s = ExplorerSummary {
            nodes: summary(CollectionKind::Nodes, LoadStatus::Loaded, 10),
            farms: summary(CollectionKind::Farms, LoadStatus::Failed("503".into()), 0),
            gateways: summary(CollectionKind::Gateways, LoadStatus::Loading, 1),
        };
        assert!(!s.all_settled());
    }
}
