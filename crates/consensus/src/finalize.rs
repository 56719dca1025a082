//! The finalization processor.
//!
//! Given a record the oracle has already validated, advance the
//! last-finalized pointer: settle the trunk between the old and new LFB,
//! archive ancestor states, prune every branch that does not descend from
//! the new LFB, and drop stale pending blocks. The node layer commits the
//! resulting summary to the persistent store in the same critical section.

use crate::consensus::Consensus;
use std::collections::VecDeque;
use std::sync::Arc;
use tessera_state::BlockState;
use tessera_tree::BlockStatus;
use tessera_types::{
    BlockHash, BlockHeight, FinalizationRecord, FinalizerInfo, Timestamp, TransactionOutcome,
    UpdateResult,
};
use tracing::{debug, info, instrument, warn};

/// What a finalization advance changed.
///
/// Carries everything the host needs to commit the advance to the
/// persistent store in the same critical section: the settled chain with
/// heights, the per-block outcomes, and the new last-finalized state.
#[derive(Debug, Clone)]
pub struct FinalizationSummary {
    /// Newly finalized blocks, ascending by height (the record's block
    /// last).
    pub finalized: Vec<(BlockHeight, BlockHash)>,
    /// Blocks marked dead by pruning, in the order they were killed.
    pub removed: Vec<BlockHash>,
    /// Blocks whose states were archived.
    pub archived: Vec<BlockHash>,
    /// Outcome lists of the newly finalized blocks.
    pub outcomes: Vec<(BlockHash, Arc<Vec<TransactionOutcome>>)>,
    /// The new last-finalized block's state.
    pub lfb_state: BlockState,
}

impl Consensus {
    /// Apply a validated finalization record.
    ///
    /// The caller guarantees the proof checked out (the oracle consumed
    /// it); this only enforces tree-structural validity. `info` is the
    /// oracle's committee descriptor for the record: the signers' claims on
    /// the finalization-reward pool are registered here and settle into
    /// their pending rewards when the next block declaring this record
    /// executes, so the credit lands in a hash-checked state on every
    /// replica.
    #[instrument(skip(self, record, info), fields(index = %record.index, block = %record.block))]
    pub fn do_trusted_finalize(
        &mut self,
        record: FinalizationRecord,
        info: FinalizerInfo,
        now: Timestamp,
    ) -> UpdateResult {
        if record.index != self.skov.next_finalization_index() {
            warn!("Finalization record out of sequence");
            return UpdateResult::Invalid;
        }

        match self.skov.status(&record.block) {
            Some(BlockStatus::Alive) => {}
            Some(BlockStatus::Finalized) => return UpdateResult::Duplicate,
            Some(BlockStatus::Dead) => return UpdateResult::Invalid,
            Some(BlockStatus::Pending) | None => return UpdateResult::Unverifiable,
        }

        let old_lfb = self.skov.last_finalized().hash;
        let old_height = self.skov.last_finalized().height;
        let new_lfb = record.block;
        let new_height = self
            .skov
            .live_block(&new_lfb)
            .expect("alive block has an arena entry")
            .height;

        // Keep the focus inside the surviving subtree before anything dies.
        let focus = self.skov.focus_block().hash;
        if !self.skov.is_ancestor(&new_lfb, &focus) {
            self.skov.set_focus(new_lfb);
        }

        // The trunk: ancestors of the new LFB above the old one, ascending.
        let trunk = self.skov.path_from(&old_lfb, &new_lfb);
        debug_assert_eq!(trunk.last(), Some(&new_lfb));
        let prune_height = (new_height - old_height) as usize;

        let mut removed: Vec<BlockHash> = Vec::new();
        let mut finalized: Vec<(BlockHeight, BlockHash)> = Vec::new();
        let mut archived: Vec<BlockHash> = Vec::new();
        let mut outcomes: Vec<(BlockHash, Arc<Vec<TransactionOutcome>>)> = Vec::new();

        // Split the settled layers into the finalized chain and the rest.
        let mut branches: VecDeque<Vec<BlockHash>> = self.skov.branches().clone();
        for (layer, keep) in trunk.iter().enumerate().take(prune_height) {
            if let Some(hashes) = branches.get(layer) {
                for hash in hashes {
                    if hash != keep {
                        removed.push(*hash);
                    }
                }
            }
        }

        // Record and settle, ascending: intermediate ancestors finalize
        // under the same record index as the new LFB.
        self.skov.record_finalization(record.clone(), new_lfb);
        for hash in &trunk {
            self.skov.mark_finalized_ancestor(*hash);
            let Some((height, block_outcomes, slot, txs)) =
                self.skov.live_block(hash).map(|live| {
                    let txs: Vec<_> = live
                        .block
                        .as_ref()
                        .map(|b| b.transactions.iter().map(|t| t.hash()).collect())
                        .unwrap_or_default();
                    (live.height, live.outcomes.clone(), live.slot(), txs)
                })
            else {
                continue;
            };
            finalized.push((height, *hash));
            outcomes.push((*hash, block_outcomes));
            for tx_hash in txs {
                self.skov.transaction_table.finalize(*hash, slot, tx_hash);
            }
        }

        // Archive states strictly below the new LFB.
        for hash in trunk.iter().take(trunk.len().saturating_sub(1)) {
            if let Some(live) = self.skov.live_block(hash) {
                live.state.archive();
                archived.push(*hash);
            }
        }
        // The previously finalized block is now also strictly below.
        if let Some(live) = self.skov.live_block(&old_lfb) {
            if !live.state.is_archived() {
                live.state.archive();
                archived.push(old_lfb);
            }
        }

        // Prune the branches above the new LFB: keep only descendants.
        let mut kept_parents: Vec<BlockHash> = vec![new_lfb];
        let mut new_branches: VecDeque<Vec<BlockHash>> = VecDeque::new();
        for layer in branches.iter().skip(prune_height) {
            let mut kept_layer = Vec::new();
            for hash in layer {
                let parent = self
                    .skov
                    .live_block(hash)
                    .map(|b| b.parent)
                    .unwrap_or(*hash);
                if kept_parents.contains(&parent) {
                    kept_layer.push(*hash);
                } else {
                    removed.push(*hash);
                }
            }
            kept_parents = kept_layer.clone();
            new_branches.push_back(kept_layer);
        }
        while new_branches.back().map(|l| l.is_empty()).unwrap_or(false) {
            new_branches.pop_back();
        }
        self.skov.set_branches(new_branches);

        // Kill in decreasing height so no parent dies before its children.
        removed.sort_by_key(|h| std::cmp::Reverse(self.block_height_or_zero(h)));
        for hash in &removed {
            let txs: Vec<_> = self
                .skov
                .live_block(hash)
                .and_then(|b| b.block.as_ref().map(|b| b.transactions.clone()))
                .unwrap_or_default();
            for tx in txs {
                self.skov
                    .transaction_table
                    .mark_dead_in_block(hash, &tx.hash());
            }
            self.skov.mark_dead(*hash);
        }

        // Drop pending blocks at or below the new finalized slot.
        let lfb_slot = self.skov.last_finalized().slot();
        while let Some(stale) = self.skov.pending_blocks.take_next_until(lfb_slot) {
            self.skov.mark_dead(stale.hash());
        }

        // Reward accounting: register the signers' claim for this record.
        // Entries below what every executable block's parent has already
        // settled can go; executable parents are the LFB or its
        // descendants, so the LFB state's settled index is the floor.
        debug!(signers = info.signers.len(), "Registered finalizer rewards");
        self.finalizer_signers.insert(record.index, info.signers);
        let floor = self
            .skov
            .last_finalized()
            .state
            .settled_finalization_index();
        self.finalizer_signers.retain(|index, _| *index > floor);

        let summary = FinalizationSummary {
            finalized,
            removed,
            archived,
            outcomes,
            lfb_state: self.skov.last_finalized().state.clone(),
        };
        self.skov
            .statistics
            .on_finalization(now, summary.finalized.len() as u64);
        self.capabilities
            .callbacks
            .on_finalize(&record, new_lfb, &summary);
        info!(
            lfb = %new_lfb,
            height = %new_height,
            finalized = summary.finalized.len(),
            removed = summary.removed.len(),
            "Finalization advanced"
        );

        // A protocol update whose effective time the new LFB has crossed
        // makes this the terminal block: regenesis.
        self.maybe_regenesis(now);

        UpdateResult::Success
    }

    fn block_height_or_zero(&self, hash: &BlockHash) -> u64 {
        self.skov.live_block(hash).map(|b| b.height.0).unwrap_or(0)
    }
}
