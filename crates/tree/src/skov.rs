//! The block tree (Skov).
//!
//! Holds the status of every known block, the live forest above the
//! last-finalized block, the finalization list, and the focus block. Blocks
//! live in an arena keyed by hash; parent and last-finalized references are
//! hashes, never owning pointers, so the apparent cycles of the chain reduce
//! to a DAG on monotone height.
//!
//! # Invariants
//!
//! - Exactly one finalized chain from genesis to the last-finalized block.
//! - `branches[h]` lists the alive blocks at height `LFB.height + 1 + h`;
//!   an alive block's parent is alive or finalized.
//! - The last-finalized block is the newest entry of the finalization list.

use crate::pending_blocks::PendingBlockTable;
use crate::pending_transactions::PendingTransactionTable;
use crate::statistics::ConsensusStatistics;
use crate::transaction_table::TransactionTable;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tessera_state::{genesis_state, BlockState, StateError};
use tessera_types::{
    BakedBlock, BlockHash, BlockHeight, FinalizationIndex, FinalizationProof, FinalizationRecord,
    GenesisData, GenesisIndex, Signature, Slot, Timestamp, TransactionOutcome,
};
use tracing::{debug, info};

/// Status of a block hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Known, parent not live yet.
    Pending,
    /// In the tree, not finalized.
    Alive,
    /// Committed forever.
    Finalized,
    /// Definitively rejected or orphaned.
    Dead,
}

/// Arena entry of an alive or finalized block.
#[derive(Debug, Clone)]
pub struct LiveBlock {
    pub hash: BlockHash,
    /// `None` for the era's genesis block.
    pub block: Option<Arc<BakedBlock>>,
    /// Height above the era's genesis.
    pub height: BlockHeight,
    /// Parent hash; the genesis block points at itself.
    pub parent: BlockHash,
    /// The last-finalized block as of this block's arrival.
    pub last_finalized: BlockHash,
    pub state: BlockState,
    pub outcomes: Arc<Vec<TransactionOutcome>>,
    pub arrival: Timestamp,
}

impl LiveBlock {
    /// The block's slot; genesis sits at slot 0.
    pub fn slot(&self) -> Slot {
        self.block.as_ref().map(|b| b.slot).unwrap_or(Slot(0))
    }
}

/// The tree state of one era.
#[derive(Debug)]
pub struct Skov {
    genesis_index: GenesisIndex,
    genesis_data: Arc<GenesisData>,
    genesis_hash: BlockHash,

    blocks: HashMap<BlockHash, LiveBlock>,
    /// Status map; also carries `Dead` tombstones with no arena entry.
    statuses: HashMap<BlockHash, BlockStatus>,

    finalized_by_height: BTreeMap<BlockHeight, BlockHash>,
    finalization_list: Vec<(FinalizationRecord, BlockHash)>,

    /// Alive blocks per height above the LFB.
    branches: VecDeque<Vec<BlockHash>>,

    focus_block: BlockHash,

    /// Orphan blocks awaiting parents.
    pub pending_blocks: PendingBlockTable,
    /// Transactions not yet reached by the focus block.
    pub pending_transactions: PendingTransactionTable,
    /// All known transactions.
    pub transaction_table: TransactionTable,

    pub statistics: ConsensusStatistics,

    /// Staging slot for the next era during a protocol update.
    staged_regenesis: Option<GenesisData>,
}

impl Skov {
    /// Start an era from its genesis record and initial state.
    ///
    /// The genesis block enters the tree finalized, with a synthetic record
    /// at index 0 (its proof is empty: genesis needs no witnesses).
    pub fn new(
        genesis_index: GenesisIndex,
        genesis_data: GenesisData,
        initial_state: BlockState,
    ) -> Self {
        let genesis_hash = genesis_data.hash();
        let genesis_block = LiveBlock {
            hash: genesis_hash,
            block: None,
            height: BlockHeight(0),
            parent: genesis_hash,
            last_finalized: genesis_hash,
            state: initial_state,
            outcomes: Arc::new(Vec::new()),
            arrival: genesis_data.core().genesis_time,
        };
        let genesis_record = FinalizationRecord {
            index: FinalizationIndex(0),
            block: genesis_hash,
            delay: 0,
            proof: FinalizationProof {
                signers: Vec::new(),
                signature: Signature([0u8; 64]),
            },
        };

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis_block);
        let mut statuses = HashMap::new();
        statuses.insert(genesis_hash, BlockStatus::Finalized);
        let mut finalized_by_height = BTreeMap::new();
        finalized_by_height.insert(BlockHeight(0), genesis_hash);

        info!(era = %genesis_index, genesis = %genesis_hash, "Initialized tree state");

        Skov {
            genesis_index,
            genesis_data: Arc::new(genesis_data),
            genesis_hash,
            blocks,
            statuses,
            finalized_by_height,
            finalization_list: vec![(genesis_record, genesis_hash)],
            branches: VecDeque::new(),
            focus_block: genesis_hash,
            pending_blocks: PendingBlockTable::new(),
            pending_transactions: PendingTransactionTable::new(),
            transaction_table: TransactionTable::new(),
            statistics: ConsensusStatistics::new(),
            staged_regenesis: None,
        }
    }

    /// Start era 0 from an initial genesis record.
    pub fn from_genesis(genesis_data: GenesisData) -> Result<Self, StateError> {
        let state = genesis_state(&genesis_data)?;
        Ok(Skov::new(GenesisIndex(0), genesis_data, state))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// The era index.
    pub fn genesis_index(&self) -> GenesisIndex {
        self.genesis_index
    }

    /// The era's genesis record.
    pub fn genesis_data(&self) -> &Arc<GenesisData> {
        &self.genesis_data
    }

    /// The era's genesis hash.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    /// Status of a hash, if this era knows it.
    pub fn status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        if let Some(status) = self.statuses.get(hash) {
            return Some(*status);
        }
        if self.pending_blocks.contains(hash) {
            return Some(BlockStatus::Pending);
        }
        None
    }

    /// Arena entry of an alive or finalized block.
    pub fn live_block(&self, hash: &BlockHash) -> Option<&LiveBlock> {
        self.blocks.get(hash)
    }

    /// The last-finalized block.
    pub fn last_finalized(&self) -> &LiveBlock {
        let (_, hash) = self
            .finalization_list
            .last()
            .expect("finalization list always holds genesis");
        self.blocks
            .get(hash)
            .expect("last finalized block is always live")
    }

    /// The newest finalization record.
    pub fn last_finalization_record(&self) -> &FinalizationRecord {
        &self
            .finalization_list
            .last()
            .expect("finalization list always holds genesis")
            .0
    }

    /// Next expected finalization index.
    pub fn next_finalization_index(&self) -> FinalizationIndex {
        FinalizationIndex(self.finalization_list.len() as u64)
    }

    /// Finalized block at `height`, if finalization has reached it.
    pub fn finalized_at_height(&self, height: BlockHeight) -> Option<&LiveBlock> {
        let hash = self.finalized_by_height.get(&height)?;
        self.blocks.get(hash)
    }

    /// The finalization list.
    pub fn finalization_list(&self) -> &[(FinalizationRecord, BlockHash)] {
        &self.finalization_list
    }

    /// The tip of the best chain: the first block of the deepest branch
    /// layer, or the LFB when no branches exist.
    pub fn best_block(&self) -> &LiveBlock {
        for layer in self.branches.iter().rev() {
            if let Some(hash) = layer.first() {
                return self.blocks.get(hash).expect("branch blocks are live");
            }
        }
        self.last_finalized()
    }

    /// The focus block.
    pub fn focus_block(&self) -> &LiveBlock {
        self.blocks
            .get(&self.focus_block)
            .expect("focus block is always live")
    }

    /// Branch layers above the LFB.
    pub fn branches(&self) -> &VecDeque<Vec<BlockHash>> {
        &self.branches
    }

    /// Newest finalization index whose block is an ancestor of (or equal
    /// to) `hash`. The genesis record at index 0 always qualifies.
    pub fn finalization_horizon(&self, hash: &BlockHash) -> FinalizationIndex {
        for (record, block) in self.finalization_list.iter().rev() {
            if self.is_ancestor(block, hash) {
                return record.index;
            }
        }
        FinalizationIndex(0)
    }

    /// Whether `ancestor` is on the parent chain of `descendant` (or equal).
    /// Both must be live.
    pub fn is_ancestor(&self, ancestor: &BlockHash, descendant: &BlockHash) -> bool {
        let Some(target) = self.blocks.get(ancestor) else {
            return false;
        };
        let mut cursor = match self.blocks.get(descendant) {
            Some(b) => b,
            None => return false,
        };
        while cursor.height > target.height {
            cursor = match self.blocks.get(&cursor.parent) {
                Some(b) => b,
                None => return false,
            };
        }
        cursor.hash == *ancestor
    }

    /// Walk from `descendant` to the child of `ancestor` along the parent
    /// chain, returning the path in increasing height (excluding both ends'
    /// overlap: the result starts just above `ancestor`).
    pub fn path_from(&self, ancestor: &BlockHash, descendant: &BlockHash) -> Vec<BlockHash> {
        let mut path = Vec::new();
        let mut cursor = *descendant;
        while cursor != *ancestor {
            let Some(block) = self.blocks.get(&cursor) else {
                break;
            };
            path.push(cursor);
            if block.parent == cursor {
                break; // genesis
            }
            cursor = block.parent;
        }
        path.reverse();
        path
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert an executed block as alive, extending the branch layers.
    ///
    /// The parent must be alive or finalized; the height is parent + 1.
    pub fn insert_alive(
        &mut self,
        block: Arc<BakedBlock>,
        state: BlockState,
        outcomes: Vec<TransactionOutcome>,
        arrival: Timestamp,
    ) -> &LiveBlock {
        let hash = block.hash();
        let parent = self
            .blocks
            .get(&block.parent)
            .expect("insert_alive requires a live parent");
        let height = parent.height + 1;
        let lfb_height = self.last_finalized().height;

        let entry = LiveBlock {
            hash,
            block: Some(block.clone()),
            height,
            parent: block.parent,
            last_finalized: block.last_finalized,
            state,
            outcomes: Arc::new(outcomes),
            arrival,
        };

        let layer = (height - lfb_height - 1) as usize;
        while self.branches.len() <= layer {
            self.branches.push_back(Vec::new());
        }
        self.branches[layer].push(hash);

        self.blocks.insert(hash, entry);
        self.statuses.insert(hash, BlockStatus::Alive);
        debug!(block = %hash, height = %height, "Block is alive");
        self.blocks.get(&hash).expect("just inserted")
    }

    /// Mark a hash dead. Any arena entry is removed; dead is terminal.
    pub fn mark_dead(&mut self, hash: BlockHash) {
        self.blocks.remove(&hash);
        self.statuses.insert(hash, BlockStatus::Dead);
    }

    /// Record a finalization: append to the list, index by height, flip the
    /// status. The caller (the finalization processor) prunes branches.
    pub fn record_finalization(&mut self, record: FinalizationRecord, block: BlockHash) {
        let height = self
            .blocks
            .get(&block)
            .expect("finalized block must be live")
            .height;
        self.finalized_by_height.insert(height, block);
        self.statuses.insert(block, BlockStatus::Finalized);
        self.finalization_list.push((record, block));
    }

    /// Settle a trunk ancestor under the newest record: at most one
    /// finalized block per height, no own list entry.
    pub fn mark_finalized_ancestor(&mut self, block: BlockHash) {
        let Some(live) = self.blocks.get(&block) else {
            return;
        };
        self.finalized_by_height.insert(live.height, block);
        self.statuses.insert(block, BlockStatus::Finalized);
    }

    /// Replace the branch layers after pruning.
    pub fn set_branches(&mut self, branches: VecDeque<Vec<BlockHash>>) {
        self.branches = branches;
    }

    /// Move the focus block, replaying the pending-transaction table along
    /// the path between the old and new focus.
    pub fn set_focus(&mut self, new_focus: BlockHash) {
        if new_focus == self.focus_block {
            return;
        }
        // Find the closest common ancestor by walking the higher side down.
        let mut back: Vec<BlockHash> = Vec::new();
        let mut a = self.focus_block;
        let mut b = new_focus;
        let height = |s: &Self, h: &BlockHash| s.blocks.get(h).map(|x| x.height).unwrap_or(BlockHeight(0));
        while height(self, &a) > height(self, &b) {
            back.push(a);
            a = self.blocks[&a].parent;
        }
        let mut fwd_rev: Vec<BlockHash> = Vec::new();
        while height(self, &b) > height(self, &a) {
            fwd_rev.push(b);
            b = self.blocks[&b].parent;
        }
        while a != b {
            back.push(a);
            fwd_rev.push(b);
            a = self.blocks[&a].parent;
            b = self.blocks[&b].parent;
        }

        // Old-focus side rolls back (its transactions become pending again)…
        for hash in &back {
            if let Some(block) = self.blocks.get(hash).and_then(|lb| lb.block.clone()) {
                self.pending_transactions.reverse_block(&block.transactions);
            }
        }
        // …and the new-focus side applies forward, oldest first.
        for hash in fwd_rev.iter().rev() {
            if let Some(block) = self.blocks.get(hash).and_then(|lb| lb.block.clone()) {
                self.pending_transactions.forward_block(&block.transactions);
            }
        }

        self.focus_block = new_focus;
    }

    /// Stage the next era's genesis during a protocol update.
    pub fn stage_regenesis(&mut self, genesis: GenesisData) {
        self.staged_regenesis = Some(genesis);
    }

    /// Take the staged next-era genesis, if a protocol update completed.
    pub fn take_staged_regenesis(&mut self) -> Option<GenesisData> {
        self.staged_regenesis.take()
    }

    /// Read the staged next-era genesis.
    pub fn staged_regenesis(&self) -> Option<&GenesisData> {
        self.staged_regenesis.as_ref()
    }

    /// Check the structural branch invariants (test support).
    pub fn branches_coherent(&self) -> bool {
        let lfb_height = self.last_finalized().height;
        for (layer, hashes) in self.branches.iter().enumerate() {
            for hash in hashes {
                let Some(block) = self.blocks.get(hash) else {
                    return false;
                };
                if (block.height - lfb_height - 1) as usize != layer {
                    return false;
                }
                let parent_ok = if layer == 0 {
                    block.parent == self.last_finalized().hash
                } else {
                    self.branches[layer - 1].contains(&block.parent)
                };
                if !parent_ok {
                    return false;
                }
            }
        }
        // No trailing empty layers.
        self.branches.back().map(|l| !l.is_empty()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_address, test_keypair, test_vrf_keypair};
    use tessera_types::{
        Amount, BakerId, BlockBody, ChainParameters, CoreGenesisParameters, ElectionDifficulty,
        Energy, Epoch, ExchangeRate, FinalizationParameters, GenesisAccount, Hash,
        ProtocolVersion, RewardParameters,
    };

    fn sample_genesis() -> GenesisData {
        GenesisData::Initial {
            core: CoreGenesisParameters {
                genesis_time: Timestamp(0),
                slot_duration_millis: 1_000,
                epoch_length: 100,
                max_block_energy: Energy(3_000_000),
                finalization_parameters: FinalizationParameters {
                    committee_stake_fraction: 100,
                    committee_max_size: 1_000,
                },
            },
            protocol_version: ProtocolVersion::P1,
            leadership_election_nonce: Hash::digest(b"len"),
            accounts: vec![GenesisAccount {
                address: test_address(1),
                balance: Amount(1_000),
                verify_key: test_keypair(1).public(),
                baker: None,
            }],
            governance_keys: vec![],
            governance_threshold: 1,
            identity_providers: vec![0],
            anonymity_revokers: vec![0],
            chain_parameters: ChainParameters {
                election_difficulty: ElectionDifficulty(100_000),
                euro_per_energy: ExchangeRate { numerator: 1, denominator: 1 },
                micro_gtu_per_euro: ExchangeRate { numerator: 1, denominator: 1 },
                baker_cooldown_epochs: Epoch(2),
                minimum_baker_stake: Amount(10),
                reward_parameters: RewardParameters {
                    baking_reward_fraction: 60_000,
                    finalization_reward_fraction: 30_000,
                    gas_account_fraction: 25_000,
                },
            },
        }
    }

    fn child_of(skov: &Skov, parent: BlockHash, slot: u64) -> Arc<BakedBlock> {
        let keys = test_keypair(1);
        let vrf = test_vrf_keypair(1);
        Arc::new(
            BlockBody {
                slot: Slot(slot),
                parent,
                baker_id: BakerId(0),
                baker_key: keys.public(),
                election_proof: vrf.prove(&slot.to_be_bytes()),
                block_nonce: vrf.prove(&slot.to_le_bytes()),
                last_finalized: skov.last_finalized().hash,
                finalization_record: None,
                transactions: vec![],
                state_hash: Hash::digest(b"state"),
                outcomes_hash: Hash::digest(b"outcomes"),
            }
            .sign(&keys),
        )
    }

    fn make_alive(skov: &mut Skov, parent: BlockHash, slot: u64) -> BlockHash {
        let block = child_of(skov, parent, slot);
        let state = skov.last_finalized().state.clone();
        skov.insert_alive(block.clone(), state, vec![], Timestamp(slot * 1_000))
            .hash
    }

    #[test]
    fn genesis_is_finalized_at_index_zero() {
        let skov = Skov::from_genesis(sample_genesis()).unwrap();
        assert_eq!(skov.status(&skov.genesis_hash()), Some(BlockStatus::Finalized));
        assert_eq!(skov.next_finalization_index(), FinalizationIndex(1));
        assert_eq!(skov.last_finalized().height, BlockHeight(0));
        assert_eq!(skov.best_block().hash, skov.genesis_hash());
    }

    #[test]
    fn insert_alive_extends_branches() {
        let mut skov = Skov::from_genesis(sample_genesis()).unwrap();
        let genesis = skov.genesis_hash();
        let a = make_alive(&mut skov, genesis, 1);
        let b = make_alive(&mut skov, a, 2);
        // Fork at height 1.
        let c = make_alive(&mut skov, genesis, 3);

        assert_eq!(skov.branches().len(), 2);
        assert_eq!(skov.branches()[0].len(), 2); // a and c
        assert_eq!(skov.branches()[1], vec![b]);
        assert!(skov.branches_coherent());
        assert_eq!(skov.status(&c), Some(BlockStatus::Alive));
        // Best block is the tip of the deepest layer.
        assert_eq!(skov.best_block().hash, b);
    }

    #[test]
    fn ancestry_and_paths() {
        let mut skov = Skov::from_genesis(sample_genesis()).unwrap();
        let genesis = skov.genesis_hash();
        let a = make_alive(&mut skov, genesis, 1);
        let b = make_alive(&mut skov, a, 2);
        let c = make_alive(&mut skov, genesis, 3);

        assert!(skov.is_ancestor(&genesis, &b));
        assert!(skov.is_ancestor(&a, &b));
        assert!(!skov.is_ancestor(&c, &b));
        assert_eq!(skov.path_from(&genesis, &b), vec![a, b]);
    }

    #[test]
    fn mark_dead_is_terminal() {
        let mut skov = Skov::from_genesis(sample_genesis()).unwrap();
        let genesis = skov.genesis_hash();
        let a = make_alive(&mut skov, genesis, 1);
        skov.mark_dead(a);
        assert_eq!(skov.status(&a), Some(BlockStatus::Dead));
        assert!(skov.live_block(&a).is_none());
    }
}
