//! Node configuration.
//!
//! Parsed from a JSON file; every field has a default so a minimal config
//! is `{}`. Durations are given in the units the option names carry
//! (seconds or milliseconds) and converted once, here; the core never sees
//! raw config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_consensus::ConsensusConfig;
use tessera_state::{DEFAULT_ACCOUNTS_CACHE_SIZE, DEFAULT_MODULES_CACHE_SIZE};

/// All recognized node options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Store root directory.
    pub data_dir: PathBuf,

    /// Upper bound on a serialized block, in bytes.
    pub max_block_size: usize,
    /// Baking budget per block, in milliseconds.
    pub block_construction_timeout: u64,
    /// Reject blocks whose slot-time exceeds now + this threshold, seconds.
    pub early_block_threshold: u64,
    /// Clamp on baker time skew, seconds.
    pub max_baking_delay: u64,

    /// Table insertions between automatic transaction purges.
    pub insertions_before_transaction_purge: u64,
    /// Admission-side horizon for untouched transactions, seconds.
    pub transactions_keep_alive_time: u64,
    /// Period of the background purge task, seconds.
    pub transactions_purging_delay: u64,

    /// Bound of the account cache.
    pub accounts_cache_size: usize,
    /// Bound of the module cache.
    pub modules_cache_size: usize,

    /// Per-chunk timeout for out-of-band catch-up downloads, seconds.
    pub download_blocks_timeout: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: PathBuf::from("data"),
            max_block_size: 4 * 1024 * 1024,
            block_construction_timeout: 3_000,
            early_block_threshold: 30,
            max_baking_delay: 10,
            insertions_before_transaction_purge: 1_000,
            transactions_keep_alive_time: 600,
            transactions_purging_delay: 300,
            accounts_cache_size: DEFAULT_ACCOUNTS_CACHE_SIZE,
            modules_cache_size: DEFAULT_MODULES_CACHE_SIZE,
            download_blocks_timeout: 300,
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The consensus-core view of this configuration.
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            max_block_size: self.max_block_size,
            block_construction_timeout_millis: self.block_construction_timeout,
            early_block_threshold_millis: self.early_block_threshold * 1_000,
            max_baking_delay_millis: self.max_baking_delay * 1_000,
            insertions_before_transaction_purge: self.insertions_before_transaction_purge,
            transactions_keep_alive_millis: self.transactions_keep_alive_time * 1_000,
            transactions_purging_delay_millis: self.transactions_purging_delay * 1_000,
            ..ConsensusConfig::default()
        }
    }

    /// Purge task period.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.transactions_purging_delay)
    }

    /// Per-chunk catch-up download timeout.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_blocks_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: NodeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.early_block_threshold, 30);
        assert_eq!(config.accounts_cache_size, DEFAULT_ACCOUNTS_CACHE_SIZE);
        assert_eq!(config.download_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"earlyBlockThreshold": 5, "maxBlockSize": 1024}"#).unwrap();
        assert_eq!(config.early_block_threshold, 5);
        assert_eq!(config.max_block_size, 1024);
        assert_eq!(
            config.consensus_config().early_block_threshold_millis,
            5_000
        );
    }
}
