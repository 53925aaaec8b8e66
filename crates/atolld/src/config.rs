//! TOML configuration for the atoll daemon.
//!
//! Every section is optional; missing values fall back to a three-locality
//! cluster on a zero-latency network.

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Cluster shape and map layout.
    pub cluster: ClusterSection,
    /// Loopback network behaviour.
    pub network: NetworkSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Number of localities to start.
    pub localities: u32,
    /// Requested partition count for the map.
    pub partitions: usize,
    /// Initial bucket count of every partition.
    pub bucket_count: Option<usize>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            localities: 3,
            partitions: 12,
            bucket_count: None,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Lower bound of per-call latency, in milliseconds.
    pub latency_min_ms: u64,
    /// Upper bound of per-call latency, in milliseconds. 0 disables latency.
    pub latency_max_ms: u64,
    /// Seed of the latency RNG.
    pub seed: u64,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`). `RUST_LOG` wins if set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from an optional TOML file path. No path means defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Number of localities, at least one.
    pub fn localities(&self) -> u32 {
        self.cluster.localities.max(1)
    }
}
