//! Versioned block-bundle export and import (format v3).
//!
//! A bundle is a sequence of chunks, each a header (magic, version, chunk
//! index) followed by blocks and finalization records in causal order. A
//! side index file lists each chunk's first and last block so an importer
//! can skip chunks whose blocks it already has.

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tessera_types::{
    deserialize, serialize, BakedBlock, BlockHash, FinalizationRecord, ReadCursor,
};
use tracing::info;

/// Bundle magic.
const BUNDLE_MAGIC: &[u8; 8] = b"TSEXPORT";

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 3;

/// One chunk of a bundle: blocks and the records finalizing them, in causal
/// order.
#[derive(Debug, Clone, Default)]
pub struct BundleChunk {
    pub blocks: Vec<BakedBlock>,
    pub records: Vec<FinalizationRecord>,
}

/// Index entry describing a chunk, for skip-ahead on import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkIndexEntry {
    pub chunk: u32,
    pub first_block: BlockHash,
    pub last_block: BlockHash,
}

fn index_path(bundle: &Path) -> std::path::PathBuf {
    let mut name = bundle.as_os_str().to_owned();
    name.push(".idx.json");
    std::path::PathBuf::from(name)
}

/// Write a bundle and its index file.
pub fn write_bundle(path: &Path, chunks: &[BundleChunk]) -> Result<(), StorageError> {
    let mut file = fs::File::create(path)?;
    let mut index = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut body = Vec::new();
        body.extend_from_slice(&(chunk.blocks.len() as u32).to_be_bytes());
        for block in &chunk.blocks {
            let bytes = serialize(block);
            body.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            body.extend_from_slice(&bytes);
        }
        body.extend_from_slice(&(chunk.records.len() as u32).to_be_bytes());
        for record in &chunk.records {
            let bytes = serialize(record);
            body.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            body.extend_from_slice(&bytes);
        }

        file.write_all(BUNDLE_MAGIC)?;
        file.write_all(&BUNDLE_VERSION.to_be_bytes())?;
        file.write_all(&(i as u32).to_be_bytes())?;
        file.write_all(&(body.len() as u32).to_be_bytes())?;
        file.write_all(&body)?;

        if let (Some(first), Some(last)) = (chunk.blocks.first(), chunk.blocks.last()) {
            index.push(ChunkIndexEntry {
                chunk: i as u32,
                first_block: first.hash(),
                last_block: last.hash(),
            });
        }
    }
    let index_bytes = serde_json::to_vec_pretty(&index)
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    fs::write(index_path(path), index_bytes)?;
    info!(path = %path.display(), chunks = chunks.len(), "Wrote block bundle");
    Ok(())
}

/// Read a bundle's index file, if present.
pub fn read_bundle_index(path: &Path) -> Result<Option<Vec<ChunkIndexEntry>>, StorageError> {
    let idx = index_path(path);
    if !idx.exists() {
        return Ok(None);
    }
    let bytes = fs::read(idx)?;
    let entries =
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Ok(Some(entries))
}

/// Read every chunk of a bundle.
///
/// `Missing` when the file does not exist (the caller maps this to the
/// `MissingImportFile` reception code).
pub fn read_bundle(path: &Path) -> Result<Vec<BundleChunk>, StorageError> {
    if !path.exists() {
        return Err(StorageError::Missing(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    let mut r = ReadCursor::new(&bytes);
    let mut chunks = Vec::new();
    while !r.is_at_end() {
        let magic = r
            .take(8)
            .map_err(|_| StorageError::Corrupt("bundle chunk header".into()))?;
        if magic != BUNDLE_MAGIC {
            return Err(StorageError::Corrupt("bundle magic".into()));
        }
        let version = r
            .u32()
            .map_err(|_| StorageError::Corrupt("bundle version".into()))?;
        if version != BUNDLE_VERSION {
            return Err(StorageError::Corrupt(format!("bundle version {version}")));
        }
        let _chunk_index = r
            .u32()
            .map_err(|_| StorageError::Corrupt("bundle chunk index".into()))?;
        let body_len = r
            .u32()
            .map_err(|_| StorageError::Corrupt("bundle body length".into()))?
            as usize;
        let body = r
            .take(body_len)
            .map_err(|_| StorageError::Corrupt("bundle body".into()))?;

        let mut chunk = BundleChunk::default();
        let mut br = ReadCursor::new(body);
        let n_blocks = br
            .u32()
            .map_err(|_| StorageError::Corrupt("bundle block count".into()))?;
        for _ in 0..n_blocks {
            let len = br
                .u32()
                .map_err(|_| StorageError::Corrupt("bundle block length".into()))?
                as usize;
            let block_bytes = br
                .take(len)
                .map_err(|_| StorageError::Corrupt("bundle block".into()))?;
            chunk.blocks.push(
                deserialize(block_bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            );
        }
        let n_records = br
            .u32()
            .map_err(|_| StorageError::Corrupt("bundle record count".into()))?;
        for _ in 0..n_records {
            let len = br
                .u32()
                .map_err(|_| StorageError::Corrupt("bundle record length".into()))?
                as usize;
            let record_bytes = br
                .take(len)
                .map_err(|_| StorageError::Corrupt("bundle record".into()))?;
            chunk.records.push(
                deserialize(record_bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?,
            );
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_types::test_utils::{test_keypair, test_vrf_keypair};
    use tessera_types::{
        BakerId, BlockBody, FinalizationIndex, FinalizationProof, Hash, Signature, Slot,
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

    #[test]
    fn bundle_round_trip_with_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.bundle");
        let chunks = vec![
            BundleChunk {
                blocks: vec![block(1), block(2)],
                records: vec![FinalizationRecord {
                    index: FinalizationIndex(1),
                    block: block(2).hash(),
                    delay: 0,
                    proof: FinalizationProof {
                        signers: vec![0],
                        signature: Signature([1u8; 64]),
                    },
                }],
            },
            BundleChunk {
                blocks: vec![block(3)],
                records: vec![],
            },
        ];
        write_bundle(&path, &chunks).unwrap();

        let loaded = read_bundle(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].blocks.len(), 2);
        assert_eq!(loaded[0].records.len(), 1);
        assert_eq!(loaded[1].blocks[0].hash(), block(3).hash());

        let index = read_bundle_index(&path).unwrap().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].first_block, block(1).hash());
        assert_eq!(index[0].last_block, block(2).hash());
    }

    #[test]
    fn missing_bundle_is_reported() {
        let dir = tempdir().unwrap();
        let err = read_bundle(&dir.path().join("nope.bundle")).unwrap_err();
        assert!(matches!(err, StorageError::Missing(_)));
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.bundle");
        fs::write(&path, b"XXXXXXXX\0\0\0\x03").unwrap();
        let err = read_bundle(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
