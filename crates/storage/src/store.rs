//! The per-era tree-state store.
//!
//! One LMDB environment per era with named databases for blocks,
//! finalization records, transaction outcomes, the height index, and
//! metadata. A finalization advance commits as a single write transaction;
//! everything the recovery path needs (the finalization list, block bytes,
//! and the height-to-hash index) lives here.

use crate::layout;
use crate::StorageError;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use std::path::Path;
use tessera_state::BlockState;
use tessera_types::{
    deserialize, serialize, BakedBlock, BlockHash, BlockHeight, FinalizationIndex,
    FinalizationRecord, GenesisData, GenesisIndex, TransactionOutcome,
};
use tracing::debug;

/// LMDB map size: 64 GiB of address space; pages are allocated lazily.
const MAP_SIZE: usize = 64 * 1024 * 1024 * 1024;

/// Named databases of one environment.
const DB_BLOCKS: &str = "blocks";
const DB_FINALIZATION: &str = "finalization";
const DB_OUTCOMES: &str = "outcomes";
const DB_HEIGHT_INDEX: &str = "height_index";
const DB_METADATA: &str = "metadata";

const META_GENESIS: &[u8] = b"genesis";

/// Handle to one era's tree-state environment.
pub struct TreeStore {
    env: Environment,
    blocks: Database,
    finalization: Database,
    outcomes: Database,
    height_index: Database,
    metadata: Database,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore").finish_non_exhaustive()
    }
}

impl TreeStore {
    /// Open (or create) the tree-state environment for `era` under `root`.
    pub fn open(root: &Path, era: GenesisIndex) -> Result<Self, StorageError> {
        let dir = layout::tree_state_dir(root, era);
        std::fs::create_dir_all(&dir)?;
        let env = Environment::new()
            .set_max_dbs(8)
            .set_map_size(MAP_SIZE)
            .open(&dir)?;
        let blocks = env.create_db(Some(DB_BLOCKS), DatabaseFlags::empty())?;
        let finalization = env.create_db(Some(DB_FINALIZATION), DatabaseFlags::empty())?;
        let outcomes = env.create_db(Some(DB_OUTCOMES), DatabaseFlags::empty())?;
        let height_index = env.create_db(Some(DB_HEIGHT_INDEX), DatabaseFlags::empty())?;
        let metadata = env.create_db(Some(DB_METADATA), DatabaseFlags::empty())?;
        Ok(TreeStore {
            env,
            blocks,
            finalization,
            outcomes,
            height_index,
            metadata,
        })
    }

    /// Persist the era's genesis record (idempotent).
    pub fn put_genesis(&self, genesis: &GenesisData) -> Result<(), StorageError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(
            self.metadata,
            &META_GENESIS,
            &serialize(genesis),
            WriteFlags::empty(),
        )?;
        txn.commit()?;
        Ok(())
    }

    /// Load the era's genesis record.
    pub fn get_genesis(&self) -> Result<Option<GenesisData>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.metadata, &META_GENESIS) {
            Ok(bytes) => Ok(Some(
                deserialize(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a block's canonical bytes on arrival.
    pub fn put_block(&self, block: &BakedBlock) -> Result<(), StorageError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(
            self.blocks,
            block.hash().as_bytes(),
            &serialize(block),
            WriteFlags::empty(),
        )?;
        txn.commit()?;
        Ok(())
    }

    /// Load a block by hash.
    pub fn get_block(&self, hash: &BlockHash) -> Result<Option<BakedBlock>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.blocks, hash.as_bytes()) {
            Ok(bytes) => Ok(Some(
                deserialize(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Commit one finalization advance atomically: the record, the height
    /// index for every newly finalized block, and their outcome lists.
    pub fn commit_finalization(
        &self,
        record: &FinalizationRecord,
        finalized: &[(BlockHeight, BlockHash)],
        outcomes: &[(BlockHash, Vec<TransactionOutcome>)],
    ) -> Result<(), StorageError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(
            self.finalization,
            &record.index.0.to_be_bytes(),
            &serialize(record),
            WriteFlags::empty(),
        )?;
        for (height, hash) in finalized {
            txn.put(
                self.height_index,
                &height.0.to_be_bytes(),
                hash.as_bytes(),
                WriteFlags::empty(),
            )?;
        }
        for (hash, block_outcomes) in outcomes {
            let bytes = bincode::serialize(block_outcomes)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            txn.put(self.outcomes, hash.as_bytes(), &bytes, WriteFlags::empty())?;
        }
        txn.commit()?;
        debug!(index = %record.index, finalized = finalized.len(), "Committed finalization");
        Ok(())
    }

    /// Load a finalization record by index.
    pub fn get_finalization(
        &self,
        index: FinalizationIndex,
    ) -> Result<Option<FinalizationRecord>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.finalization, &index.0.to_be_bytes()) {
            Ok(bytes) => Ok(Some(
                deserialize(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All finalization records, ascending by index.
    pub fn finalization_list(&self) -> Result<Vec<FinalizationRecord>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.finalization)?;
        let mut records = Vec::new();
        for (_key, value) in cursor.iter() {
            records
                .push(deserialize(value).map_err(|e| StorageError::Corrupt(e.to_string()))?);
        }
        Ok(records)
    }

    /// The finalized block hash at a height, from the index.
    pub fn finalized_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<BlockHash>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.height_index, &height.0.to_be_bytes()) {
            Ok(bytes) => {
                let array: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("height index entry".into()))?;
                Ok(Some(BlockHash::from_bytes(array)))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The outcomes persisted for a finalized block.
    pub fn get_outcomes(
        &self,
        hash: &BlockHash,
    ) -> Result<Option<Vec<TransactionOutcome>>, StorageError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.outcomes, hash.as_bytes()) {
            Ok(bytes) => Ok(Some(
                bincode::deserialize(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Block-state segment header magic.
const SEGMENT_MAGIC: &[u8; 4] = b"TSBS";

/// Block-state segment format version.
const SEGMENT_VERSION: u32 = 1;

/// Write the era's block-state segment: the last-finalized state snapshot
/// behind a versioned header.
pub fn write_block_state_segment(
    root: &Path,
    era: GenesisIndex,
    lfb: &BlockHash,
    state: &BlockState,
) -> Result<(), StorageError> {
    let mut out = Vec::new();
    out.extend_from_slice(SEGMENT_MAGIC);
    out.extend_from_slice(&SEGMENT_VERSION.to_be_bytes());
    out.extend_from_slice(&era.0.to_be_bytes());
    out.extend_from_slice(lfb.as_bytes());
    out.extend_from_slice(
        &state
            .to_bytes()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
    );
    // Write-then-rename keeps the previous segment intact on a crash.
    let path = layout::block_state_path(root, era);
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &out)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Read an era's block-state segment, returning the last-finalized hash and
/// the reloaded state.
pub fn read_block_state_segment(
    root: &Path,
    era: GenesisIndex,
) -> Result<Option<(BlockHash, BlockState)>, StorageError> {
    let path = layout::block_state_path(root, era);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    if bytes.len() < 4 + 4 + 4 + 32 || &bytes[..4] != SEGMENT_MAGIC {
        return Err(StorageError::Corrupt("block-state segment header".into()));
    }
    let version = u32::from_be_bytes(bytes[4..8].try_into().expect("length checked"));
    if version != SEGMENT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "block-state segment version {version}"
        )));
    }
    let stored_era = u32::from_be_bytes(bytes[8..12].try_into().expect("length checked"));
    if stored_era != era.0 {
        return Err(StorageError::Corrupt("block-state segment era".into()));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[12..44]);
    let state = BlockState::from_bytes(&bytes[44..])
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Ok(Some((BlockHash::from_bytes(hash), state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_types::test_utils::{test_keypair, test_vrf_keypair};
    use tessera_types::{
        BakerId, BlockBody, FinalizationProof, Hash, Signature, Slot,
    };

    fn block(slot: u64) -> BakedBlock {
        let keys = test_keypair(1);
        let vrf = test_vrf_keypair(1);
        BlockBody {
            slot: Slot(slot),
            parent: Hash::digest(b"parent"),
            baker_id: BakerId(0),
            baker_key: keys.public(),
            election_proof: vrf.prove(&slot.to_be_bytes()),
            block_nonce: vrf.prove(&slot.to_le_bytes()),
            last_finalized: Hash::digest(b"lfb"),
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
    fn blocks_round_trip_through_lmdb() {
        let dir = tempdir().unwrap();
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        let b = block(1);
        store.put_block(&b).unwrap();
        let loaded = store.get_block(&b.hash()).unwrap().unwrap();
        assert_eq!(loaded.hash(), b.hash());
        assert!(store.get_block(&Hash::digest(b"missing")).unwrap().is_none());
    }

    #[test]
    fn finalization_commits_are_atomic_and_ordered() {
        let dir = tempdir().unwrap();
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        let b1 = block(1);
        let b2 = block(2);
        store.put_block(&b1).unwrap();
        store.put_block(&b2).unwrap();

        store
            .commit_finalization(
                &rec(1, b1.hash()),
                &[(BlockHeight(1), b1.hash())],
                &[(b1.hash(), vec![])],
            )
            .unwrap();
        store
            .commit_finalization(
                &rec(2, b2.hash()),
                &[(BlockHeight(2), b2.hash())],
                &[(b2.hash(), vec![])],
            )
            .unwrap();

        let list = store.finalization_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].index, FinalizationIndex(1));
        assert_eq!(list[1].index, FinalizationIndex(2));
        assert_eq!(
            store.finalized_at_height(BlockHeight(2)).unwrap(),
            Some(b2.hash())
        );
        assert_eq!(store.get_outcomes(&b1.hash()).unwrap(), Some(vec![]));
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        let b = block(3);
        {
            let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
            store.put_block(&b).unwrap();
        }
        let store = TreeStore::open(dir.path(), GenesisIndex(0)).unwrap();
        assert!(store.get_block(&b.hash()).unwrap().is_some());
    }
}
