//! The consensus instance: receive → (pending | execute) → live.
//!
//! One [`Consensus`] value is the tree state of the current era plus the
//! capabilities handed in at construction. All mutation goes through `&mut
//! self`; the node wraps the instance in its coordinator and there is no
//! ambient state, so tests run several instances in one process.
//!
//! Reception is two-phase: [`Consensus::receive_block`] validates up to the
//! signature and returns a typed [`ExecuteBlock`] continuation; the caller
//! either passes it to [`Consensus::execute_block`] or drops it, and a
//! dropped handle marks the block dead at the next operation.

use crate::callbacks::{Capabilities, FinalizationOracle, OracleOutcome};
use crate::config::ConsensusConfig;
use crate::scheduler::{execute_block_items, ExecutionContext};
use crate::verify::{AdmissionVerifier, StateAdmission};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tessera_state::{BlockState, SlotBakers, StateError};
use tessera_tree::{
    AddResult, BlockStatus, Skov, TransactionVerifier, VerificationOutcome,
};
use tessera_types::{
    parse_block, parse_block_item, BakedBlock, BakerId, BlockHash, BlockHeight, BlockItem,
    BlockItemKind, FinalizationIndex, FinalizationRecord, GenesisData, GenesisIndex, Hash,
    SeedState, Slot, Timestamp, UpdateResult, VrfProof,
};
use tracing::{debug, info, instrument, warn};

/// Typed continuation between reception and execution.
///
/// Produced by a successful [`Consensus::receive_block`]; consumed by
/// [`Consensus::execute_block`]. Dropping it without executing enqueues the
/// block for dead-marking (blocks live in an arena keyed by hash, so the
/// destructor cannot reach the tree directly).
#[must_use = "pass to execute_block, or the block is marked dead"]
pub struct ExecuteBlock {
    block: Arc<BakedBlock>,
    promoted_from_pending: bool,
    abandoned: Arc<Mutex<Vec<BlockHash>>>,
    consumed: bool,
}

impl std::fmt::Debug for ExecuteBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteBlock")
            .field("block", &self.block.hash())
            .finish_non_exhaustive()
    }
}

impl ExecuteBlock {
    /// The block awaiting execution.
    pub fn block_hash(&self) -> BlockHash {
        self.block.hash()
    }

    fn into_parts(mut self) -> (Arc<BakedBlock>, bool) {
        self.consumed = true;
        (self.block.clone(), self.promoted_from_pending)
    }
}

impl Drop for ExecuteBlock {
    fn drop(&mut self) {
        if !self.consumed {
            warn!(block = %self.block.hash(), "Execution handle dropped; block will be marked dead");
            self.abandoned.lock().push(self.block.hash());
        }
    }
}

/// One era's consensus state machine.
pub struct Consensus {
    pub(crate) skov: Skov,
    pub(crate) config: ConsensusConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) oracle: Box<dyn FinalizationOracle>,

    /// Finalization records for indices we have not reached yet.
    pub(crate) queued_finalizations: BTreeMap<FinalizationIndex, FinalizationRecord>,

    /// Signers the oracle reported per consumed record. Block execution
    /// settles these into finalization-reward claims; entries are pruned
    /// once every executable block's parent has settled past them.
    pub(crate) finalizer_signers: BTreeMap<FinalizationIndex, Vec<BakerId>>,

    /// Hashes with an outstanding execution handle.
    executing: HashSet<BlockHash>,
    /// Hashes whose handle was dropped without execution.
    abandoned: Arc<Mutex<Vec<BlockHash>>>,

    /// Absolute height of this era's genesis block.
    pub(crate) absolute_base: BlockHeight,
}

impl std::fmt::Debug for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consensus")
            .field("era", &self.skov.genesis_index())
            .field("lfb", &self.skov.last_finalized().hash)
            .field("executing", &self.executing.len())
            .finish_non_exhaustive()
    }
}

impl Consensus {
    /// Start era 0 from an initial genesis record.
    pub fn new(
        genesis_data: GenesisData,
        config: ConsensusConfig,
        capabilities: Capabilities,
        oracle: Box<dyn FinalizationOracle>,
    ) -> Result<Self, StateError> {
        let skov = Skov::from_genesis(genesis_data)?;
        Ok(Consensus {
            skov,
            config,
            capabilities,
            oracle,
            queued_finalizations: BTreeMap::new(),
            finalizer_signers: BTreeMap::new(),
            executing: HashSet::new(),
            abandoned: Arc::new(Mutex::new(Vec::new())),
            absolute_base: BlockHeight(0),
        })
    }

    /// The tree state (read access for queries and tests).
    pub fn skov(&self) -> &Skov {
        &self.skov
    }

    /// The current era index.
    pub fn genesis_index(&self) -> GenesisIndex {
        self.skov.genesis_index()
    }

    /// The runtime parameters.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Absolute height of a block of this era.
    pub fn absolute_height(&self, relative: BlockHeight) -> BlockHeight {
        BlockHeight(self.absolute_base.0 + relative.0)
    }

    /// Whether receives are refused for a pending protocol update.
    ///
    /// Shut-down starts once the best chain has executed past a protocol
    /// update's effective time (the update is parked on the tip's state).
    /// From then on new blocks and transactions are refused while
    /// finalization keeps running, until the first finalized block past the
    /// effective time (the era's terminal block) triggers regenesis.
    pub fn is_shut_down(&self) -> bool {
        self.skov
            .best_block()
            .state
            .pending_protocol_update()
            .is_some()
    }

    /// The finalization records a block with the given last-finalized
    /// pointer settles rewards for, ascending: everything between the
    /// parent state's settled index and the newest record on the pointer's
    /// ancestor chain.
    pub(crate) fn settlements_for(
        &self,
        last_finalized: &BlockHash,
        parent_state: &BlockState,
    ) -> Vec<(FinalizationIndex, Vec<BakerId>)> {
        let horizon = self.skov.finalization_horizon(last_finalized);
        let mut settlements = Vec::new();
        let mut index = parent_state.settled_finalization_index().next();
        while index <= horizon {
            let signers = self
                .finalizer_signers
                .get(&index)
                .cloned()
                .unwrap_or_default();
            settlements.push((index, signers));
            index = index.next();
        }
        settlements
    }

    /// Mark blocks whose execution handle was dropped.
    pub(crate) fn reap_abandoned(&mut self) {
        let drained: Vec<BlockHash> = std::mem::take(&mut *self.abandoned.lock());
        for hash in drained {
            self.executing.remove(&hash);
            if self.skov.status(&hash).is_none() {
                debug!(block = %hash, "Marking abandoned block dead");
                self.skov.mark_dead(hash);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Block reception
    // ═══════════════════════════════════════════════════════════════════════

    /// Receive a serialized block for era `genesis_index`.
    #[instrument(skip(self, bytes), fields(era = %genesis_index, len = bytes.len()))]
    pub fn receive_block(
        &mut self,
        genesis_index: GenesisIndex,
        bytes: &[u8],
        now: Timestamp,
    ) -> (UpdateResult, Option<ExecuteBlock>) {
        self.reap_abandoned();
        if self.is_shut_down() {
            return (UpdateResult::ConsensusShutDown, None);
        }
        if bytes.len() > self.config.max_block_size {
            return (UpdateResult::SerializationFail, None);
        }
        let block = match parse_block(bytes) {
            Ok(block) => Arc::new(block),
            Err(_) => return (UpdateResult::SerializationFail, None),
        };
        self.receive_block_parsed(genesis_index, block, now)
    }

    /// Receive an already-parsed block (baker loop, importer, tests).
    pub fn receive_block_parsed(
        &mut self,
        genesis_index: GenesisIndex,
        block: Arc<BakedBlock>,
        now: Timestamp,
    ) -> (UpdateResult, Option<ExecuteBlock>) {
        self.skov.statistics.on_block_received();

        if genesis_index != self.skov.genesis_index() {
            return (UpdateResult::InvalidGenesisIndex, None);
        }

        let slot_time = self.skov.genesis_data().core().slot_time(block.slot);
        if slot_time.0 > now.0 + self.config.early_block_threshold_millis {
            // Not marked dead: the block may be fine once our clock reaches
            // its slot.
            return (UpdateResult::EarlyBlock, None);
        }

        let hash = block.hash();
        if self.skov.status(&hash).is_some() || self.executing.contains(&hash) {
            return (UpdateResult::Duplicate, None);
        }

        if block.slot <= self.skov.last_finalized().slot() {
            self.skov.mark_dead(hash);
            return (UpdateResult::Stale, None);
        }

        match self.skov.status(&block.parent) {
            None | Some(BlockStatus::Pending) => {
                if self.preflight_checks(&block, now) {
                    self.skov.pending_blocks.add_pending(block);
                    (UpdateResult::PendingBlock, None)
                } else {
                    self.skov.mark_dead(hash);
                    (UpdateResult::Invalid, None)
                }
            }
            Some(BlockStatus::Alive) | Some(BlockStatus::Finalized) => {
                if !self.live_parent_checks(&block) || !block.verify_signature() {
                    self.skov.mark_dead(hash);
                    (UpdateResult::Invalid, None)
                } else {
                    self.executing.insert(hash);
                    let handle = ExecuteBlock {
                        block,
                        promoted_from_pending: false,
                        abandoned: self.abandoned.clone(),
                        consumed: false,
                    };
                    (UpdateResult::Success, Some(handle))
                }
            }
            Some(BlockStatus::Dead) => {
                self.skov.mark_dead(hash);
                (UpdateResult::Stale, None)
            }
        }
    }

    /// Checks possible while the parent state is unknown.
    ///
    /// Transactions verify best-effort against the last-finalized state and
    /// land in the table with cached results. Baker and leadership checks
    /// run only where the last-finalized state already determines the
    /// answer; the signature must verify unconditionally.
    fn preflight_checks(&mut self, block: &Arc<BakedBlock>, now: Timestamp) -> bool {
        let lfb_state = self.skov.last_finalized().state.clone();
        let lfb_slot = self.skov.last_finalized().slot();
        let core = *self.skov.genesis_data().core();
        let slot_time = core.slot_time(block.slot);

        for item in &block.transactions {
            let verifier = AdmissionVerifier {
                state: &lfb_state,
                now,
                max_block_energy: core.max_block_energy,
                max_time_to_expiry_millis: self.config.max_time_to_expiry_millis,
            };
            let _ = self.skov.transaction_table.add_commit(
                item.clone(),
                &StateAdmission(&lfb_state),
                &verifier,
                now,
                lfb_slot,
            );
        }

        if let Some(bakers) = lfb_state.definite_slot_bakers(block.slot, slot_time) {
            let Some(baker) = bakers.lookup(block.baker_id) else {
                return false;
            };
            if baker.signature_key != block.baker_key {
                return false;
            }
            // The election nonce is predictable only within the
            // last-finalized seed state's own epoch; later epochs depend on
            // block nonces not yet seen.
            let seed = lfb_state.seed_state();
            if seed.epoch_of(block.slot) == seed.epoch {
                let difficulty = lfb_state.election_difficulty_at(slot_time);
                if !verify_leadership(
                    seed,
                    block.slot,
                    &baker.election_key,
                    &block.election_proof,
                    &block.block_nonce,
                    difficulty.threshold(baker.stake, bakers.total_stake),
                ) {
                    return false;
                }
            }
        }

        block.verify_signature()
    }

    /// Checks requiring the parent's state.
    pub(crate) fn live_parent_checks(&self, block: &Arc<BakedBlock>) -> bool {
        let Some(parent) = self.skov.live_block(&block.parent) else {
            return false;
        };
        if parent.slot() >= block.slot {
            return false;
        }
        let slot_time = self.skov.genesis_data().core().slot_time(block.slot);
        let bakers: SlotBakers = parent.state.slot_bakers(block.slot);
        let Some(baker) = bakers.lookup(block.baker_id) else {
            return false;
        };
        if baker.signature_key != block.baker_key {
            return false;
        }
        let seed = parent.state.seed_state().advance_epochs(block.slot);
        let difficulty = parent.state.election_difficulty_at(slot_time);
        verify_leadership(
            &seed,
            block.slot,
            &baker.election_key,
            &block.election_proof,
            &block.block_nonce,
            difficulty.threshold(baker.stake, bakers.total_stake),
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Block execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Execute a received block, making it alive on success.
    #[instrument(skip(self, handle), fields(block = %handle.block_hash()))]
    pub fn execute_block(&mut self, handle: ExecuteBlock, now: Timestamp) -> UpdateResult {
        self.reap_abandoned();
        let (block, promoted) = handle.into_parts();
        self.executing.remove(&block.hash());
        self.execute_block_inner(block, now, promoted)
    }

    fn execute_block_inner(
        &mut self,
        block: Arc<BakedBlock>,
        now: Timestamp,
        promoted: bool,
    ) -> UpdateResult {
        let hash = block.hash();

        // The parent may have died between receive and execute.
        if !matches!(
            self.skov.status(&block.parent),
            Some(BlockStatus::Alive) | Some(BlockStatus::Finalized)
        ) {
            self.skov.mark_dead(hash);
            return UpdateResult::Invalid;
        }

        // Finalization data: hand the record to the oracle and require that
        // it is consumed or already known, enforcing a single finalized
        // ancestor per index.
        if let Some(record) = block.finalization_record.clone() {
            if block.last_finalized != record.block {
                self.skov.mark_dead(hash);
                return UpdateResult::Invalid;
            }
            match self.oracle.submit_record(&record) {
                OracleOutcome::Consumed(info) => {
                    let result = self.do_trusted_finalize(record, info, now);
                    if result != UpdateResult::Success {
                        self.skov.mark_dead(hash);
                        return UpdateResult::Invalid;
                    }
                }
                OracleOutcome::Duplicate => {
                    let known = self
                        .skov
                        .finalization_list()
                        .get(record.index.0 as usize)
                        .map(|(_, b)| *b);
                    if known != Some(record.block) {
                        self.skov.mark_dead(hash);
                        return UpdateResult::Invalid;
                    }
                }
                OracleOutcome::Rejected => {
                    self.skov.mark_dead(hash);
                    return UpdateResult::Invalid;
                }
            }
        } else if self.skov.status(&block.last_finalized) != Some(BlockStatus::Finalized) {
            // Without a record the block cannot advance finalization; its
            // pointer must name an already-finalized block.
            self.skov.mark_dead(hash);
            return UpdateResult::Invalid;
        }

        // Finalization may have pruned the branch this block extends. A
        // finalized parent other than the LFB would put the block at or
        // below the finalized height, conflicting with the unique finalized
        // chain.
        if self.skov.live_block(&block.parent).is_none()
            || (self.skov.status(&block.parent) == Some(BlockStatus::Finalized)
                && block.parent != self.skov.last_finalized().hash)
        {
            self.skov.mark_dead(hash);
            return UpdateResult::Invalid;
        }
        let parent = self
            .skov
            .live_block(&block.parent)
            .expect("parent checked live above");
        let parent_state = parent.state.clone();

        let core = *self.skov.genesis_data().core();
        let slot_time = core.slot_time(block.slot);
        let settlements = self.settlements_for(&block.last_finalized, &parent_state);
        let ctx = ExecutionContext {
            engine: self.capabilities.engine.as_ref(),
            slot: block.slot,
            slot_time,
            block_nonce: &block.block_nonce,
            max_block_energy: core.max_block_energy,
            baker: block.baker_id,
            settlements: &settlements,
        };

        let executed = match execute_block_items(&parent_state, &block.transactions, &ctx) {
            Ok(executed) => executed,
            Err(failure) => {
                debug!(block = %hash, %failure, "Block failed execution");
                self.skov.mark_dead(hash);
                return UpdateResult::Invalid;
            }
        };

        if executed.state.hash() != block.state_hash
            || executed.outcomes_hash != block.outcomes_hash
        {
            debug!(block = %hash, "Claimed hashes do not match re-execution");
            self.skov.mark_dead(hash);
            return UpdateResult::Invalid;
        }

        let outcomes = executed.outcomes;
        let live = self
            .skov
            .insert_alive(block.clone(), executed.state, outcomes, now);
        let height = live.height;

        // Block transactions enter the table (items arriving only inside
        // blocks were never individually admitted) and record the commit.
        let lfb_state = self.skov.last_finalized().state.clone();
        for (i, item) in block.transactions.iter().enumerate() {
            if self.skov.transaction_table.lookup(&item.hash()).is_none() {
                let _ = self.skov.transaction_table.add_commit(
                    item.clone(),
                    &StateAdmission(&lfb_state),
                    &Preverified(VerificationOutcome::Valid),
                    now,
                    block.slot,
                );
            }
            self.skov
                .transaction_table
                .commit_in_block(block.slot, hash, item.hash(), i);
        }

        self.skov.statistics.on_block_verified(now);
        self.oracle.notify_block_arrival(hash, height);
        self.capabilities.callbacks.on_block_arrived(hash, height);
        if promoted {
            self.capabilities.callbacks.on_pending_live(hash);
        }
        info!(block = %hash, height = %height, "Block is live");

        // Promote pending children through the full live-parent path.
        let children = self.skov.pending_blocks.take_children_of(&hash);
        for child in children {
            let child_hash = child.hash();
            if !self.live_parent_checks(&child) || !child.verify_signature() {
                self.skov.mark_dead(child_hash);
                continue;
            }
            let _ = self.execute_block_inner(child, now, true);
        }

        UpdateResult::Success
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transaction reception
    // ═══════════════════════════════════════════════════════════════════════

    /// Receive a serialized transaction.
    pub fn receive_transaction_bytes(&mut self, bytes: &[u8], now: Timestamp) -> UpdateResult {
        if self.is_shut_down() {
            return UpdateResult::ConsensusShutDown;
        }
        match parse_block_item(bytes) {
            Ok(item) => self.receive_transaction(item, now),
            Err(_) => UpdateResult::SerializationFail,
        }
    }

    /// Receive a parsed transaction, verifying it against the
    /// last-finalized state.
    #[instrument(skip(self, item), fields(tx = %item.hash()))]
    pub fn receive_transaction(&mut self, item: BlockItem, now: Timestamp) -> UpdateResult {
        let lfb_state = self.skov.last_finalized().state.clone();
        let core = *self.skov.genesis_data().core();
        let verifier = AdmissionVerifier {
            state: &lfb_state,
            now,
            max_block_energy: core.max_block_energy,
            max_time_to_expiry_millis: self.config.max_time_to_expiry_millis,
        };
        let verification = verifier.verify(&item);
        self.receive_verified_transaction(item, verification, now)
    }

    /// Receive a transaction whose signature work already ran against the
    /// last-finalized state, outside the global lock.
    ///
    /// The nonce window and table insertion still happen here, inside the
    /// critical section; account keys are fixed at creation, so the cached
    /// verification result needs no re-check.
    pub fn receive_verified_transaction(
        &mut self,
        item: BlockItem,
        verification: VerificationOutcome,
        now: Timestamp,
    ) -> UpdateResult {
        self.reap_abandoned();
        if self.is_shut_down() {
            return UpdateResult::ConsensusShutDown;
        }

        // Individually submitted transactions must verify now; deferred
        // "may heal later" outcomes are only acceptable from block
        // pre-flight.
        match verification {
            VerificationOutcome::Valid => {}
            VerificationOutcome::MaybeLater(code) | VerificationOutcome::Invalid(code) => {
                return code;
            }
        }

        let lfb_state = self.skov.last_finalized().state.clone();
        let lfb_slot = self.skov.last_finalized().slot();
        let item = Arc::new(item);
        let added = self.skov.transaction_table.add_commit(
            item.clone(),
            &StateAdmission(&lfb_state),
            &Preverified(verification),
            now,
            lfb_slot,
        );
        let result = match added {
            AddResult::Added(_) => {
                // Track in the pending table at the focus state's nonce.
                let next_nonce = match item.kind() {
                    BlockItemKind::Normal(tx) => self
                        .skov
                        .focus_block()
                        .state
                        .get_account(&tx.sender)
                        .map(|a| a.next_nonce)
                        .unwrap_or(tessera_types::Nonce::FIRST),
                    _ => tessera_types::Nonce::FIRST,
                };
                self.skov.pending_transactions.add_item(&item, next_nonce);
                UpdateResult::Success
            }
            AddResult::Duplicate(_) => UpdateResult::Duplicate,
            AddResult::ObsoleteNonce => UpdateResult::DuplicateNonce,
            AddResult::NotAdded(code) => code,
        };

        if self.skov.transaction_table.insertions_since_purge()
            >= self.config.insertions_before_transaction_purge
        {
            self.purge_transactions(now);
        }
        result
    }

    /// Drop purgeable transactions now.
    pub fn purge_transactions(&mut self, now: Timestamp) -> usize {
        let lfb_slot = self.skov.last_finalized().slot();
        self.skov
            .transaction_table
            .purge(now, lfb_slot, self.config.transactions_keep_alive_millis)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Finalization reception
    // ═══════════════════════════════════════════════════════════════════════

    /// Receive a finalization record. Still processed during shut-down.
    #[instrument(skip(self, record), fields(index = %record.index, block = %record.block))]
    pub fn receive_finalization_record(
        &mut self,
        genesis_index: GenesisIndex,
        record: FinalizationRecord,
        now: Timestamp,
    ) -> UpdateResult {
        self.reap_abandoned();
        if genesis_index != self.skov.genesis_index() {
            return UpdateResult::InvalidGenesisIndex;
        }
        let next = self.skov.next_finalization_index();
        if record.index < next {
            return UpdateResult::Duplicate;
        }
        if record.index > next {
            self.queued_finalizations.insert(record.index, record);
            return UpdateResult::PendingFinalization;
        }
        let result = match self.oracle.submit_record(&record) {
            OracleOutcome::Consumed(info) => self.do_trusted_finalize(record, info, now),
            OracleOutcome::Duplicate => UpdateResult::Duplicate,
            OracleOutcome::Rejected => UpdateResult::Invalid,
        };
        self.drain_queued_finalizations(now);
        result
    }

    /// Feed queued future records whose index has come up.
    pub(crate) fn drain_queued_finalizations(&mut self, now: Timestamp) {
        loop {
            let next = self.skov.next_finalization_index();
            let Some(record) = self.queued_finalizations.remove(&next) else {
                break;
            };
            match self.oracle.submit_record(&record) {
                OracleOutcome::Consumed(info) => {
                    if self.do_trusted_finalize(record, info, now) != UpdateResult::Success {
                        break;
                    }
                }
                _ => break,
            }
        }
        // Anything at or below the reached index is now useless.
        let reached = self.skov.next_finalization_index();
        self.queued_finalizations.retain(|idx, _| *idx > reached);
    }

    /// Relay an opaque finalization-protocol message to the oracle.
    pub fn receive_finalization_message(
        &mut self,
        genesis_index: GenesisIndex,
        message: &tessera_types::FinalizationMessage,
    ) -> UpdateResult {
        if genesis_index != self.skov.genesis_index() {
            return UpdateResult::InvalidGenesisIndex;
        }
        self.oracle.submit_message(message)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries (never panic; unknown hashes answer None)
    // ═══════════════════════════════════════════════════════════════════════

    /// Status of a block hash.
    pub fn block_status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        self.skov.status(hash)
    }

    /// Account lookup in the last-finalized state.
    pub fn finalized_account(
        &self,
        address: &tessera_types::AccountAddress,
    ) -> Option<Arc<tessera_state::Account>> {
        self.skov.last_finalized().state.get_account(address)
    }

    /// State hash of a live or finalized block (archived states answer).
    pub fn block_state_hash(&self, hash: &BlockHash) -> Option<Hash> {
        self.skov.live_block(hash).map(|b| b.state.hash())
    }
}

/// Verifier wrapper replaying an admission result already computed.
pub(crate) struct Preverified(pub VerificationOutcome);

impl TransactionVerifier for Preverified {
    fn verify(&self, _item: &BlockItem) -> VerificationOutcome {
        self.0
    }
}

/// Leadership check: both proofs verify against the epoch's seed view and
/// the lottery value clears the stake-scaled threshold.
pub(crate) fn verify_leadership(
    seed: &SeedState,
    slot: Slot,
    election_key: &tessera_types::VrfPublicKey,
    election_proof: &VrfProof,
    block_nonce: &VrfProof,
    threshold: u64,
) -> bool {
    let election_message = seed.election_message(slot);
    if !tessera_types::vrf_verify(election_key, &election_message, election_proof) {
        return false;
    }
    let nonce_message = seed.nonce_message(slot);
    if !tessera_types::vrf_verify(election_key, &nonce_message, block_nonce) {
        return false;
    }
    election_proof.output_as_lot() < threshold
}
