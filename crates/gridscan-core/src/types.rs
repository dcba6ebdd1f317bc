//! Entity records returned by the explorer directory.
//!
//! Records are received as JSON pages and never mutated client-side.
//! Unknown fields are ignored and missing numeric or list fields default
//! to zero/empty so older explorer versions still decode.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Explorer-assigned identifier (schema ID).
pub type EntityId = i64;

// ── Collection kinds ──────────────────────────────────────────────

/// The three paginated collections the explorer exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Nodes,
    Farms,
    Gateways,
}

impl CollectionKind {
    /// Path segment of the collection endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Farms => "farms",
            Self::Gateways => "gateways",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nodes" | "node" => Ok(Self::Nodes),
            "farms" | "farm" => Ok(Self::Farms),
            "gateways" | "gateway" => Ok(Self::Gateways),
            other => Err(format!("unknown collection kind: {other}")),
        }
    }
}

// ── Shared value types ────────────────────────────────────────────

/// Geographic location reported by a node, farm, or gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub continent: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Resource unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute units (cores).
    Cru,
    /// Memory units (GB).
    Mru,
    /// SSD storage units (GB).
    Sru,
    /// HDD storage units (GB).
    Hru,
}

/// An amount of each resource unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceAmount {
    pub cru: f64,
    pub mru: f64,
    pub sru: f64,
    pub hru: f64,
}

impl ResourceAmount {
    pub fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cru => self.cru,
            ResourceKind::Mru => self.mru,
            ResourceKind::Sru => self.sru,
            ResourceKind::Hru => self.hru,
        }
    }
}

/// Number of workloads of each type deployed on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadAmount {
    pub network: u64,
    pub volume: u64,
    pub zdb_namespace: u64,
    pub container: u64,
    pub k8s_vm: u64,
    pub proxy: u64,
    pub reverse_proxy: u64,
    pub subdomain: u64,
    pub delegate_domain: u64,
}

/// A farmer payout wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletAddress {
    pub asset: String,
    pub address: String,
}

// ── Entities ──────────────────────────────────────────────────────

/// A 3Node registered in the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: EntityId,
    pub node_id: String,
    /// Owning farm. Weak reference, resolve through the farms collection.
    pub farm_id: EntityId,
    pub os_version: String,
    /// Unix timestamp of registration.
    pub created: i64,
    /// Unix timestamp of the last uptime report.
    pub updated: i64,
    /// Seconds since boot.
    pub uptime: u64,
    pub address: String,
    pub location: Location,
    pub total_resources: ResourceAmount,
    pub used_resources: ResourceAmount,
    pub reserved_resources: ResourceAmount,
    pub workloads: WorkloadAmount,
    pub free_to_use: bool,
    pub approved: bool,
    pub public_key_hex: String,
}

impl Node {
    /// Share of a resource that is reserved, in percent.
    ///
    /// Returns 0 when the node reports neither reserved nor total capacity.
    pub fn reserved_percentage(&self, kind: ResourceKind) -> f64 {
        let reserved = self.reserved_resources.get(kind);
        let total = self.total_resources.get(kind);
        if total == 0.0 {
            return 0.0;
        }
        reserved / total * 100.0
    }
}

/// A farm grouping nodes under one farmer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Farm {
    pub id: EntityId,
    pub threebot_id: i64,
    pub iyo_organization: String,
    pub name: String,
    pub email: String,
    pub wallet_addresses: Vec<WalletAddress>,
    pub location: Location,
}

/// A TCP/HTTP gateway registered in the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gateway {
    pub id: EntityId,
    pub node_id: String,
    pub farm_id: EntityId,
    pub os_version: String,
    pub created: i64,
    pub updated: i64,
    pub uptime: u64,
    pub address: String,
    pub location: Location,
    pub workloads: WorkloadAmount,
    pub managed_domains: Vec<String>,
    pub tcp_router_port: u16,
    pub dns_nameserver: Vec<String>,
    pub public_key_hex: String,
    pub free_to_use: bool,
}

/// Common view over a record of one of the explorer collections.
///
/// The aggregator and store are generic over this trait so each collection
/// keeps its concrete record type.
pub trait Entity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: CollectionKind;

    fn id(&self) -> EntityId;

    /// Last-updated timestamp (unix seconds), if the record carries one.
    fn last_updated(&self) -> Option<i64>;

    fn location(&self) -> &Location;

    fn total_resources(&self) -> Option<&ResourceAmount> {
        None
    }

    fn workloads(&self) -> Option<&WorkloadAmount> {
        None
    }
}

impl Entity for Node {
    const KIND: CollectionKind = CollectionKind::Nodes;

    fn id(&self) -> EntityId {
        self.id
    }

    fn last_updated(&self) -> Option<i64> {
        Some(self.updated)
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn total_resources(&self) -> Option<&ResourceAmount> {
        Some(&self.total_resources)
    }

    fn workloads(&self) -> Option<&WorkloadAmount> {
        Some(&self.workloads)
    }
}

impl Entity for Farm {
    const KIND: CollectionKind = CollectionKind::Farms;

    fn id(&self) -> EntityId {
        self.id
    }

    fn last_updated(&self) -> Option<i64> {
        None
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

impl Entity for Gateway {
    const KIND: CollectionKind = CollectionKind::Gateways;

    fn id(&self) -> EntityId {
        self.id
    }

    fn last_updated(&self) -> Option<i64> {
        Some(self.updated)
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn workloads(&self) -> Option<&WorkloadAmount> {
        Some(&self.workloads)
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
