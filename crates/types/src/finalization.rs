//! Finalization records.
//!
//! The finalization protocol itself is external; the core consumes its
//! records as witnesses that a block at a given index is irreversible. The
//! proof is opaque here; the finalization oracle validates it and reports
//! the signing committee for reward accounting.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::crypto::Signature;
use crate::hash::{BlockHash, Hash};
use crate::identifiers::{BakerId, FinalizationIndex};
use serde::{Deserialize, Serialize};

/// Witness that `block` is finalized at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationRecord {
    /// Monotone, gap-free from 0.
    pub index: FinalizationIndex,
    /// The finalized block.
    pub block: BlockHash,
    /// Height gap parameter of the finalization round.
    pub delay: u64,
    pub proof: FinalizationProof,
}

/// Aggregate signature material, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationProof {
    /// Signing committee member indices, ascending.
    pub signers: Vec<u32>,
    /// Aggregate signature over the finalization statement.
    pub signature: Signature,
}

impl FinalizationRecord {
    /// Content hash of the record.
    pub fn hash(&self) -> Hash {
        Hash::digest(&crate::codec::serialize(self))
    }
}

impl Serial for FinalizationRecord {
    fn serial(&self, out: &mut Vec<u8>) {
        self.index.serial(out);
        self.block.serial(out);
        self.delay.serial(out);
        (self.proof.signers.len() as u32).serial(out);
        for s in &self.proof.signers {
            s.serial(out);
        }
        self.proof.signature.serial(out);
    }
}

impl Deserial for FinalizationRecord {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let index = FinalizationIndex::deserial(r)?;
        let block = Hash::deserial(r)?;
        let delay = r.u64()?;
        let len = r.length()?;
        let mut signers = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            signers.push(r.u32()?);
        }
        let signature = Signature::deserial(r)?;
        Ok(FinalizationRecord {
            index,
            block,
            delay,
            proof: FinalizationProof { signers, signature },
        })
    }
}

/// Committee description returned by the finalization oracle on success,
/// consumed for finalization reward accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerInfo {
    /// All committee members for this finalization session.
    pub committee: Vec<BakerId>,
    /// The subset that signed the accepted record.
    pub signers: Vec<BakerId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{deserialize, serialize};

    #[test]
    fn record_round_trip() {
        let record = FinalizationRecord {
            index: FinalizationIndex(4),
            block: Hash::digest(b"blk"),
            delay: 0,
            proof: FinalizationProof {
                signers: vec![0, 2, 3],
                signature: Signature([7u8; 64]),
            },
        };
        let parsed: FinalizationRecord = deserialize(&serialize(&record)).unwrap();
        assert_eq!(parsed, record);
    }
}
