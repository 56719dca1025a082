//! Protocol-update regenesis.
//!
//! A protocol update that crosses its effective time shuts reception down;
//! finalization keeps running. The first finalized block past the effective
//! time is the era's terminal block: its state migrates into the next era's
//! initial state, a regenesis record is staged and announced, and the
//! instance advances to the new era. The terminal epoch's bakers carry over,
//! pending rewards included, as the new era's first-epoch bakers.

use crate::consensus::Consensus;
use tessera_state::{migrate_for_regenesis, BlockState};
use tessera_tree::Skov;
use tessera_types::{
    BlockHeight, CoreGenesisParameters, GenesisData, Timestamp,
};
use tracing::{error, info, instrument};

impl Consensus {
    /// After a finalization advance: regenesis if the new LFB is terminal.
    pub(crate) fn maybe_regenesis(&mut self, _now: Timestamp) {
        let lfb = self.skov.last_finalized();
        let Some((_, update)) = lfb.state.pending_protocol_update().cloned() else {
            return;
        };
        // A state only parks a protocol update once its slot time passed
        // the effective time, so this LFB is the terminal block.
        let terminal_hash = lfb.hash;
        let terminal_height = lfb.height;
        let terminal_slot = lfb.slot();
        let terminal_state = lfb.state.clone();
        let target = update.next_version;

        let migrated = match migrate_for_regenesis(&terminal_state, target) {
            Ok(state) => state,
            Err(err) => {
                // Unmigratable terminal state is a fatal condition; refuse
                // to advance rather than fork silently.
                error!(%err, "Regenesis migration failed; staying shut down");
                return;
            }
        };

        let old_core = *self.skov.genesis_data().core();
        let core = CoreGenesisParameters {
            genesis_time: old_core.slot_time(terminal_slot),
            slot_duration_millis: old_core.slot_duration_millis,
            epoch_length: old_core.epoch_length,
            max_block_energy: old_core.max_block_energy,
            finalization_parameters: old_core.finalization_parameters,
        };
        let genesis = GenesisData::Regenesis {
            core,
            protocol_version: target,
            first_genesis: self.skov.genesis_data().first_genesis_hash(),
            previous_genesis: self.skov.genesis_hash(),
            terminal_block: terminal_hash,
            state_hash: migrated.hash(),
            starting_absolute_height: BlockHeight(
                self.absolute_base.0 + terminal_height.0 + 1,
            ),
        };
        let new_genesis_hash = genesis.hash();

        info!(
            terminal = %terminal_hash,
            new_genesis = %new_genesis_hash,
            version = %target,
            "Protocol update: staging regenesis"
        );
        self.skov.stage_regenesis(genesis);
        self.capabilities.callbacks.on_regenesis(new_genesis_hash);
        self.advance_era(migrated);
    }

    /// Swap into the staged era, carrying the transaction tables.
    #[instrument(skip_all)]
    pub(crate) fn advance_era(&mut self, initial_state: BlockState) {
        let Some(genesis) = self.skov.take_staged_regenesis() else {
            return;
        };
        let starting_height = match &genesis {
            GenesisData::Regenesis {
                starting_absolute_height,
                ..
            } => *starting_absolute_height,
            GenesisData::Initial { .. } => BlockHeight(0),
        };
        let next_index = self.skov.genesis_index().next();
        let mut next = Skov::new(next_index, genesis, initial_state);

        // Non-finalized transactions stay valid across the era boundary:
        // account nonces carry through the migrated state.
        next.transaction_table = std::mem::take(&mut self.skov.transaction_table);
        next.pending_transactions = std::mem::take(&mut self.skov.pending_transactions);
        next.statistics = self.skov.statistics.clone();
        // Pending blocks reference the old era's chain; they die with it.

        self.skov = next;
        self.absolute_base = starting_height;
        self.queued_finalizations.clear();
        self.finalizer_signers.clear();
        info!(era = %next_index, "Advanced to new era");
    }
}
