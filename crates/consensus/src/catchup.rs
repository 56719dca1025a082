//! Catch-up: serving a peer's status message.
//!
//! A peer announces its last-finalized point and best block; we reply with
//! a bounded burst of finalization records and blocks it is missing, in
//! causal order, through a caller-supplied send capability. The return code
//! tells the caller whether we, in turn, need to catch up from the peer.

use crate::consensus::Consensus;
use tessera_types::{
    CatchUpStatus, ConsensusMessage, GenesisIndex, Timestamp, UpdateResult,
};
use tracing::{debug, instrument};

/// Bound on blocks sent per catch-up response.
const MAX_CATCH_UP_BLOCKS: usize = 1_024;

/// Bound on finalization records sent per catch-up response.
const MAX_CATCH_UP_RECORDS: usize = 1_024;

impl Consensus {
    /// Our own status, to send to peers.
    pub fn catch_up_status(&self, is_request: bool) -> CatchUpStatus {
        CatchUpStatus {
            is_request,
            last_finalized_block: self.skov.last_finalized().hash,
            last_finalized_index: self.skov.last_finalization_record().index,
            best_block: self.skov.best_block().hash,
        }
    }

    /// Process a peer's catch-up status.
    ///
    /// `send` delivers direct messages to that peer only; the burst is
    /// bounded. Returns `ContinueCatchUp` when the peer knows things we do
    /// not, so the caller can mark it as a catch-up target.
    #[instrument(skip(self, status, send), fields(era = %genesis_index, request = status.is_request))]
    pub fn receive_catch_up_status(
        &mut self,
        genesis_index: GenesisIndex,
        status: &CatchUpStatus,
        _now: Timestamp,
        send: &mut dyn FnMut(ConsensusMessage),
    ) -> UpdateResult {
        self.reap_abandoned();
        if genesis_index != self.skov.genesis_index() {
            return UpdateResult::InvalidGenesisIndex;
        }

        if status.is_request {
            self.serve_catch_up(status, send);
        }

        // Do they know more than we do?
        let our_index = self.skov.last_finalization_record().index;
        let behind_on_finalization = status.last_finalized_index > our_index;
        let unknown_best = self.skov.status(&status.best_block).is_none();
        if behind_on_finalization || unknown_best {
            UpdateResult::ContinueCatchUp
        } else {
            UpdateResult::Success
        }
    }

    fn serve_catch_up(
        &self,
        status: &CatchUpStatus,
        send: &mut dyn FnMut(ConsensusMessage),
    ) {
        // Causal order: blocks before the records that finalize them,
        // finalized trunk before the live branches, layers before their
        // children.
        let mut blocks_sent = 0usize;
        let from_height = match self.skov.live_block(&status.last_finalized_block) {
            Some(b) => b.height.0 + 1,
            // Their finalized point is unknown here (possibly ahead of us,
            // or on a pruned branch): serve everything we have finalized.
            None => 1,
        };
        let lfb_height = self.skov.last_finalized().height.0;
        for h in from_height..=lfb_height {
            if blocks_sent >= MAX_CATCH_UP_BLOCKS {
                break;
            }
            if let Some(live) = self
                .skov
                .finalized_at_height(tessera_types::BlockHeight(h))
            {
                if let Some(block) = &live.block {
                    send(ConsensusMessage::Block((**block).clone()));
                    blocks_sent += 1;
                }
            }
        }
        for layer in self.skov.branches() {
            for hash in layer {
                if blocks_sent >= MAX_CATCH_UP_BLOCKS {
                    break;
                }
                if let Some(block) = self.skov.live_block(hash).and_then(|b| b.block.as_ref()) {
                    send(ConsensusMessage::Block((**block).clone()));
                    blocks_sent += 1;
                }
            }
        }

        // Records they miss. Index 0 is the synthetic genesis record; every
        // node derives it locally.
        let mut records_sent = 0usize;
        for (record, _) in self
            .skov
            .finalization_list()
            .iter()
            .filter(|(r, _)| r.index > status.last_finalized_index && r.index.0 != 0)
        {
            if records_sent >= MAX_CATCH_UP_RECORDS {
                break;
            }
            send(ConsensusMessage::FinalizationRecord(record.clone()));
            records_sent += 1;
        }

        // Close with our own status so the peer can assess us.
        send(ConsensusMessage::CatchUpStatus(self.catch_up_status(false)));
        debug!(records_sent, blocks_sent, "Served catch-up burst");
    }
}
