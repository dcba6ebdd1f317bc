//! gridscan.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::liveness::LivenessPolicy;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How a collection is hydrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Fetch the first page, then every remaining page concurrently.
    Bulk,
    /// Fetch one page per poll tick until the collection is exhausted.
    #[default]
    Progressive,
}

/// How the distinct-country counter is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryCounting {
    /// Running set over every page of the load cycle.
    #[default]
    Distinct,
    /// Distinct countries within each page, summed across pages.
    PerPage,
}

/// Which entities contribute to resource and workload sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    /// Only entities counted online.
    #[default]
    Online,
    /// Every entity regardless of liveness.
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridscanConfig {
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Explorer API root, e.g. `http://explorer.local:8080/explorer`.
    pub base_url: String,
    /// Per-request timeout (e.g. "10s").
    pub timeout: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/explorer".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub mode: FetchMode,
    pub page_size: u32,
    /// Delay between progressive poll ticks (e.g. "750ms").
    pub poll_interval: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            page_size: 500,
            poll_interval: "750ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub liveness: LivenessPolicy,
    pub country_counting: CountryCounting,
    pub resource_scope: ResourceScope,
}

impl GridscanConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: GridscanConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.fetch.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch.page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "source.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        self.poll_interval()?;
        self.timeout()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.fetch.poll_interval).ok_or_else(|| ConfigError::Duration {
            field: "fetch.poll_interval",
            value: self.fetch.poll_interval.clone(),
        })
    }

    pub fn timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.source.timeout).ok_or_else(|| ConfigError::Duration {
            field: "source.timeout",
            value: self.source.timeout.clone(),
        })
    }
}

/// Parse a duration string like "750ms", "10s", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
