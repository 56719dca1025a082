//! Block construction.
//!
//! The baker tries each slot it might win: check the lottery against the
//! parent state, select admissible transactions from the pending table in
//! nonce order under the energy and size budgets, execute them to obtain
//! the claimed hashes, sign, and drive the finished block through the
//! normal receive/execute path.

use crate::consensus::Consensus;
use crate::scheduler::{execute_block_items, ExecutionContext};
use crate::verify::base_energy_cost;
use std::sync::Arc;
use tessera_types::{
    serialize, BakedBlock, BakerId, BlockBody, BlockItem, Energy, KeyPair, Slot, Timestamp,
    UpdateResult, VrfKeyPair,
};
use tracing::{debug, info, instrument};

/// Keys and identity of a local baker.
#[derive(Debug, Clone)]
pub struct BakerIdentity {
    pub baker_id: BakerId,
    pub sign_keys: KeyPair,
    pub vrf_keys: VrfKeyPair,
}

/// Serialized-size headroom reserved for the block envelope and header.
const BLOCK_OVERHEAD_BYTES: usize = 1_024;

impl Consensus {
    /// Try to bake a block for `slot`. Returns the finished block, already
    /// inserted into the tree, for the host to broadcast, or `None` when
    /// this baker does not win the slot (or consensus is shut down).
    #[instrument(skip(self, identity), fields(baker = %identity.baker_id, slot = %slot))]
    pub fn bake_for_slot(
        &mut self,
        identity: &BakerIdentity,
        slot: Slot,
        now: Timestamp,
    ) -> Option<Arc<BakedBlock>> {
        if self.is_shut_down() {
            return None;
        }

        // Bake on the best chain; the pending-transaction table follows.
        let best = self.skov.best_block().hash;
        self.skov.set_focus(best);
        let parent = self.skov.live_block(&best)?.clone();
        if parent.slot() >= slot {
            return None;
        }

        let core = *self.skov.genesis_data().core();
        let slot_time = core.slot_time(slot);
        if slot_time.0 > now.0 + self.config.max_baking_delay_millis {
            return None; // slot too far ahead of our clock
        }
        // Past the construction budget the slot has moved on; a late block
        // would lose to its sibling anyway.
        let deadline = slot_time.0
            + self.config.block_construction_timeout_millis
            + self.config.max_baking_delay_millis;
        if now.0 > deadline {
            return None;
        }
        let bakers = parent.state.slot_bakers(slot);
        let baker = bakers.lookup(identity.baker_id)?.clone();
        if baker.signature_key != identity.sign_keys.public()
            || baker.election_key != identity.vrf_keys.public()
        {
            debug!("Registered baker keys do not match local identity");
            return None;
        }

        let seed = parent.state.seed_state().advance_epochs(slot);
        let election_proof = identity.vrf_keys.prove(&seed.election_message(slot));
        let difficulty = parent.state.election_difficulty_at(slot_time);
        let threshold = difficulty.threshold(baker.stake, bakers.total_stake);
        if election_proof.output_as_lot() >= threshold {
            return None; // lost the lottery
        }
        let block_nonce = identity.vrf_keys.prove(&seed.nonce_message(slot));

        let transactions = self.select_transactions(&parent.state, slot_time, core.max_block_energy);

        // The block declares the current LFB, so it settles every record up
        // to it that the parent state has not.
        let lfb = self.skov.last_finalized().hash;
        let settlements = self.settlements_for(&lfb, &parent.state);
        let ctx = ExecutionContext {
            engine: self.capabilities.engine.as_ref(),
            slot,
            slot_time,
            block_nonce: &block_nonce,
            max_block_energy: core.max_block_energy,
            baker: identity.baker_id,
            settlements: &settlements,
        };
        let executed = match execute_block_items(&parent.state, &transactions, &ctx) {
            Ok(executed) => executed,
            Err(err) => {
                debug!(%err, "Baking execution failed; skipping slot");
                return None;
            }
        };

        // Include the newest finalization record when the parent chain has
        // not seen it yet.
        let record = self.skov.last_finalization_record().clone();
        let finalization_record =
            (parent.last_finalized != lfb && record.index.0 != 0).then_some(record);

        let block = Arc::new(
            BlockBody {
                slot,
                parent: parent.hash,
                baker_id: identity.baker_id,
                baker_key: identity.sign_keys.public(),
                election_proof,
                block_nonce,
                last_finalized: lfb,
                finalization_record,
                transactions,
                state_hash: executed.state.hash(),
                outcomes_hash: executed.outcomes_hash,
            }
            .sign(&identity.sign_keys),
        );

        // Feed the block through the normal pipeline so every invariant is
        // enforced on our own blocks too.
        let era = self.skov.genesis_index();
        let (result, handle) = self.receive_block_parsed(era, block.clone(), now);
        if result != UpdateResult::Success {
            debug!(%result, "Self-baked block refused at receive");
            return None;
        }
        let result = self.execute_block(handle?, now);
        if result != UpdateResult::Success {
            debug!(%result, "Self-baked block refused at execute");
            return None;
        }
        info!(block = %block.hash(), "Baked block");
        Some(block)
    }

    /// Pick transactions for a new block: chain updates and credentials
    /// first, then account transactions in nonce order per sender, senders
    /// in address order, under the energy and size budgets.
    fn select_transactions(
        &self,
        parent_state: &tessera_state::BlockState,
        slot_time: Timestamp,
        max_energy: Energy,
    ) -> Vec<Arc<BlockItem>> {
        let mut selected: Vec<Arc<BlockItem>> = Vec::new();
        let mut energy = Energy(0);
        let mut size = BLOCK_OVERHEAD_BYTES;
        let budget = self.config.max_block_size;

        // Budget by the declared limit, the worst case the block can burn.
        let mut try_add = |item: Arc<BlockItem>, energy: &mut Energy, size: &mut usize| -> bool {
            if item.expiry() < slot_time {
                return false;
            }
            if item.energy_limit() < base_energy_cost(&item) {
                return false;
            }
            if energy.0 + item.energy_limit().0 > max_energy.0 {
                return false;
            }
            let item_size = serialize(item.as_ref()).len();
            if *size + item_size > budget {
                return false;
            }
            *energy = Energy(energy.0 + item.energy_limit().0);
            *size += item_size;
            selected.push(item);
            true
        };

        // Chain updates, in type order then sequence order.
        let mut update_types: Vec<_> = self
            .skov
            .pending_transactions
            .pending_updates()
            .map(|(ty, range)| (*ty, *range))
            .collect();
        update_types.sort_by_key(|(ty, _)| *ty);
        for (ty, range) in update_types {
            for (_, items) in self
                .skov
                .transaction_table
                .non_finalized_chain_updates(ty, range.low)
            {
                if let Some(item) = items.first() {
                    try_add(item.clone(), &mut energy, &mut size);
                }
            }
        }

        // Credential deployments, by hash.
        for item in self.skov.transaction_table.received_credentials() {
            try_add(item, &mut energy, &mut size);
        }

        // Account transactions: senders sorted for determinism; per sender
        // strictly sequential nonces starting at the parent state's next.
        let mut senders: Vec<_> = self
            .skov
            .pending_transactions
            .pending_accounts()
            .map(|(addr, range)| (*addr, *range))
            .collect();
        senders.sort_by_key(|(addr, _)| *addr);
        for (sender, range) in senders {
            let mut expected = parent_state
                .get_account(&sender)
                .map(|a| a.next_nonce)
                .unwrap_or(range.low);
            for (nonce, items) in self
                .skov
                .transaction_table
                .account_non_finalized(&sender, expected)
            {
                if nonce != expected {
                    break; // gap: nothing beyond is admissible
                }
                let Some(item) = items.first() else { break };
                if !try_add(item.clone(), &mut energy, &mut size) {
                    break;
                }
                expected = expected.next();
            }
        }

        selected
    }
}
