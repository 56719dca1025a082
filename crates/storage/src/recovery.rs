//! Startup recovery.
//!
//! The tree structure is re-derived from the persisted finalization list,
//! the height-to-hash index, and the stored block bytes; the node replays
//! the blocks through the normal pipeline. The block-state segment is the
//! cross-check: when both sides are intact their last-finalized points must
//! agree, and when one side is damaged the intact side is authoritative,
//! with the other truncated to its latest consistent point.

use crate::layout;
use crate::store::{read_block_state_segment, TreeStore};
use crate::StorageError;
use std::path::Path;
use tessera_types::{
    BakedBlock, BlockHash, BlockHeight, FinalizationRecord, GenesisData, GenesisIndex, Hash,
};
use tracing::{info, warn};

/// Everything needed to rebuild an era's tree state.
#[derive(Debug)]
pub struct RecoveredEra {
    pub era: GenesisIndex,
    pub genesis: GenesisData,
    /// Finalized blocks in height order, ready for pipeline replay.
    pub blocks: Vec<BakedBlock>,
    /// Finalization records in index order (the synthetic genesis record is
    /// not persisted).
    pub records: Vec<FinalizationRecord>,
    /// State hash of the last finalized block per the segment, when the
    /// segment was intact; replay must reproduce it.
    pub expected_state_hash: Option<Hash>,
}

/// Recover the newest era from a store root.
///
/// `None` when the root holds no era at all (fresh node).
pub fn recover_latest_era(root: &Path) -> Result<Option<RecoveredEra>, StorageError> {
    let eras = layout::list_eras(root)?;
    match eras.last() {
        Some(&era) => Ok(Some(recover_era(root, era)?)),
        None => Ok(None),
    }
}

/// Recover every era in order, for full replay across regeneses: era 0
/// seeds the initial state, later eras' blocks are fed after the pipeline's
/// own regenesis reproduces their genesis.
pub fn recover_all_eras(root: &Path) -> Result<Vec<RecoveredEra>, StorageError> {
    layout::list_eras(root)?
        .into_iter()
        .map(|era| recover_era(root, era))
        .collect()
}

/// Recover one era.
pub fn recover_era(root: &Path, era: GenesisIndex) -> Result<RecoveredEra, StorageError> {
    let store = TreeStore::open(root, era)?;
    let Some(genesis) = store.get_genesis()? else {
        return Err(StorageError::Corrupt(format!(
            "era {era} tree state has no genesis record"
        )));
    };

    let mut records = store.finalization_list()?;
    let segment = match read_block_state_segment(root, era) {
        Ok(segment) => segment,
        Err(err) => {
            // Damaged segment: the tree state is authoritative, replay will
            // rebuild the state from genesis.
            warn!(%err, "Block-state segment unreadable; replaying from genesis");
            None
        }
    };

    // When both sides are intact they must agree on the last-finalized
    // block; a tree state that ran ahead of the last segment write is
    // truncated back to the segment's point.
    let mut expected_state_hash = None;
    if let Some((segment_lfb, state)) = &segment {
        if let Some(pos) = records.iter().position(|r| r.block == *segment_lfb) {
            if pos + 1 < records.len() {
                warn!(
                    dropped = records.len() - pos - 1,
                    "Tree state ahead of block-state segment; truncating"
                );
                records.truncate(pos + 1);
            }
            expected_state_hash = Some(state.hash());
        } else if records.is_empty() && *segment_lfb == genesis.hash() {
            expected_state_hash = Some(state.hash());
        } else {
            // The segment points at a block the finalization list never
            // reached: the segment is stale; replay past it.
            expected_state_hash = None;
        }
    }

    // Collect the finalized chain in height order through the index.
    let mut blocks = Vec::new();
    let mut height = BlockHeight(1);
    loop {
        let Some(hash) = store.finalized_at_height(height)? else {
            break;
        };
        // Stop at the truncation point.
        if !records.is_empty() {
            let last_block: BlockHash = records.last().expect("non-empty").block;
            let Some(block) = store.get_block(&hash)? else {
                // Intact finalization list but missing block bytes:
                // truncate the list to what is replayable.
                warn!(height = %height, "Missing finalized block bytes; truncating recovery");
                truncate_records_to(&mut records, &blocks);
                break;
            };
            let stop_after = block.hash() == last_block;
            blocks.push(block);
            if stop_after {
                break;
            }
        } else {
            break;
        }
        height = height.next();
    }

    info!(
        era = %era,
        blocks = blocks.len(),
        records = records.len(),
        "Recovered era from store"
    );
    Ok(RecoveredEra {
        era,
        genesis,
        blocks,
        records,
        expected_state_hash,
    })
}

/// Drop records whose block is beyond the replayable chain.
fn truncate_records_to(records: &mut Vec<FinalizationRecord>, blocks: &[BakedBlock]) {
    let known: std::collections::HashSet<BlockHash> = blocks.iter().map(|b| b.hash()).collect();
    records.retain(|r| known.contains(&r.block));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_block_state_segment;
    use tempfile::tempdir;
    use tessera_state::genesis_state;
    use tessera_types::test_utils::{test_address, test_keypair, test_vrf_keypair};
    use tessera_types::{
        Amount, BakerId, BlockBody, ChainParameters, CoreGenesisParameters, ElectionDifficulty,
        Energy, Epoch, ExchangeRate, FinalizationIndex, FinalizationParameters,
        FinalizationProof, GenesisAccount, ProtocolVersion, RewardParameters, Signature, Slot,
        Timestamp,
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
                euro_per_energy: ExchangeRate {
                    numerator: 1,
                    denominator: 1,
                },
                micro_gtu_per_euro: ExchangeRate {
                    numerator: 1,
                    denominator: 1,
                },
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

    fn block(slot: u64, parent: BlockHash, lfb: BlockHash) -> BakedBlock {
        let keys = test_keypair(1);
        let vrf = test_vrf_keypair(1);
        BlockBody {
            slot: Slot(slot),
            parent,
            baker_id: BakerId(0),
            baker_key: keys.public(),
            election_proof: vrf.prove(&slot.to_be_bytes()),
            block_nonce: vrf.prove(&slot.to_le_bytes()),
            last_finalized: lfb,
            finalization_record: None,
            transactions: vec![],
            state_hash: Hash::digest(b"state"),
            outcomes_hash: Hash::digest(b"outcomes"),
        }
        .sign(&keys)
    }

    fn rec(index: u64, block: BlockHash) -> FinalizationRecord {
        FinalizationRecord {
            index: FinalizationIndex(index),
            block,
            delay: 0,
            proof: FinalizationProof {
                signers: vec![0],
                signature: Signature([1u8; 64]),
            },
        }
    }

    #[test]
    fn fresh_root_recovers_nothing() {
        let dir = tempdir().unwrap();
        layout::prepare_root(dir.path()).unwrap();
        assert!(recover_latest_era(dir.path()).unwrap().is_none());
    }

    #[test]
    fn recovers_blocks_and_records_in_order() {
        let dir = tempdir().unwrap();
        layout::prepare_root(dir.path()).unwrap();
        let genesis = sample_genesis();
        let state = genesis_state(&genesis).unwrap();
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        store.put_genesis(&genesis).unwrap();

        let b1 = block(1, genesis.hash(), genesis.hash());
        let b2 = block(2, b1.hash(), genesis.hash());
        store.put_block(&b1).unwrap();
        store.put_block(&b2).unwrap();
        store
            .commit_finalization(
                &rec(1, b2.hash()),
                &[(BlockHeight(1), b1.hash()), (BlockHeight(2), b2.hash())],
                &[],
            )
            .unwrap();
        write_block_state_segment(dir.path(), GenesisIndex(0), &b2.hash(), &state).unwrap();

        let recovered = recover_latest_era(dir.path()).unwrap().unwrap();
        assert_eq!(recovered.era, GenesisIndex(0));
        assert_eq!(recovered.genesis.hash(), genesis.hash());
        assert_eq!(recovered.blocks.len(), 2);
        assert_eq!(recovered.blocks[0].hash(), b1.hash());
        assert_eq!(recovered.blocks[1].hash(), b2.hash());
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.expected_state_hash, Some(state.hash()));
    }

    #[test]
    fn corrupt_segment_falls_back_to_tree_state() {
        let dir = tempdir().unwrap();
        layout::prepare_root(dir.path()).unwrap();
        let genesis = sample_genesis();
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        store.put_genesis(&genesis).unwrap();
        let b1 = block(1, genesis.hash(), genesis.hash());
        store.put_block(&b1).unwrap();
        store
            .commit_finalization(&rec(1, b1.hash()), &[(BlockHeight(1), b1.hash())], &[])
            .unwrap();
        std::fs::write(
            layout::block_state_path(dir.path(), GenesisIndex(0)),
            b"garbage",
        )
        .unwrap();

        let recovered = recover_latest_era(dir.path()).unwrap().unwrap();
        assert_eq!(recovered.blocks.len(), 1);
        assert_eq!(recovered.expected_state_hash, None);
    }

    #[test]
    fn tree_state_ahead_of_segment_is_truncated() {
        let dir = tempdir().unwrap();
        layout::prepare_root(dir.path()).unwrap();
        let genesis = sample_genesis();
        let state = genesis_state(&genesis).unwrap();
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        store.put_genesis(&genesis).unwrap();

        let b1 = block(1, genesis.hash(), genesis.hash());
        let b2 = block(2, b1.hash(), genesis.hash());
        store.put_block(&b1).unwrap();
        store.put_block(&b2).unwrap();
        store
            .commit_finalization(&rec(1, b1.hash()), &[(BlockHeight(1), b1.hash())], &[])
            .unwrap();
        store
            .commit_finalization(&rec(2, b2.hash()), &[(BlockHeight(2), b2.hash())], &[])
            .unwrap();
        // The segment only saw the first finalization.
        write_block_state_segment(dir.path(), GenesisIndex(0), &b1.hash(), &state).unwrap();

        let recovered = recover_latest_era(dir.path()).unwrap().unwrap();
        assert_eq!(recovered.records.len(), 1);
        assert_eq!(recovered.records[0].block, b1.hash());
        assert_eq!(recovered.blocks.len(), 1);
    }
}
