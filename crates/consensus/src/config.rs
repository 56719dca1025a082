//! Runtime parameters of the consensus core.

/// Tunables affecting reception, baking and purging. The node layer parses
/// external configuration into this; the core never reads the environment.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Upper bound on a serialized block, in bytes.
    pub max_block_size: usize,
    /// Baking budget per block, in milliseconds.
    pub block_construction_timeout_millis: u64,
    /// Reject blocks whose slot-time exceeds now + this threshold.
    pub early_block_threshold_millis: u64,
    /// Clamp on baker time skew, in milliseconds.
    pub max_baking_delay_millis: u64,
    /// Table insertions between automatic purges.
    pub insertions_before_transaction_purge: u64,
    /// Admission-side horizon for untouched transactions, in milliseconds.
    pub transactions_keep_alive_millis: u64,
    /// Period of the background purge task, in milliseconds.
    pub transactions_purging_delay_millis: u64,
    /// Reject transactions whose expiry lies further than this in the
    /// future.
    pub max_time_to_expiry_millis: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            max_block_size: 4 * 1024 * 1024,
            block_construction_timeout_millis: 3_000,
            early_block_threshold_millis: 30_000,
            max_baking_delay_millis: 10_000,
            insertions_before_transaction_purge: 1_000,
            transactions_keep_alive_millis: 600_000,
            transactions_purging_delay_millis: 300_000,
            max_time_to_expiry_millis: 2 * 60 * 60 * 1_000,
        }
    }
}
