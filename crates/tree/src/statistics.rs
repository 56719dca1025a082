//! Consensus statistics.
//!
//! Counters and exponential moving averages over block arrival and
//! finalization, exposed read-only to observers.

use tessera_types::Timestamp;

/// Smoothing factor for the period averages.
const EMA_WEIGHT: f64 = 0.1;

/// Running statistics of one consensus instance.
#[derive(Debug, Default, Clone)]
pub struct ConsensusStatistics {
    /// Blocks that entered the receive pipeline.
    pub blocks_received: u64,
    /// Blocks fully executed and made live.
    pub blocks_verified: u64,
    /// Finalization records processed.
    pub finalizations: u64,
    /// Blocks finalized (can exceed `finalizations`: one record may settle
    /// several ancestors).
    pub blocks_finalized: u64,

    last_arrival: Option<Timestamp>,
    /// EMA of milliseconds between block arrivals.
    pub block_arrival_period: Option<f64>,

    last_finalization: Option<Timestamp>,
    /// EMA of milliseconds between finalizations.
    pub finalization_period: Option<f64>,
}

impl ConsensusStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block entering the pipeline.
    pub fn on_block_received(&mut self) {
        self.blocks_received += 1;
    }

    /// Record a block going live at `now`.
    pub fn on_block_verified(&mut self, now: Timestamp) {
        self.blocks_verified += 1;
        if let Some(last) = self.last_arrival {
            let period = now.millis_since(last) as f64;
            self.block_arrival_period = Some(match self.block_arrival_period {
                None => period,
                Some(ema) => ema * (1.0 - EMA_WEIGHT) + period * EMA_WEIGHT,
            });
        }
        self.last_arrival = Some(now);
    }

    /// Record a finalization advance settling `count` blocks at `now`.
    pub fn on_finalization(&mut self, now: Timestamp, count: u64) {
        self.finalizations += 1;
        self.blocks_finalized += count;
        if let Some(last) = self.last_finalization {
            let period = now.millis_since(last) as f64;
            self.finalization_period = Some(match self.finalization_period {
                None => period,
                Some(ema) => ema * (1.0 - EMA_WEIGHT) + period * EMA_WEIGHT,
            });
        }
        self.last_finalization = Some(now);
    }
}
