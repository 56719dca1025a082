//! Baked blocks.

use crate::codec::{self, CodecError, Deserial, ReadCursor, Serial};
use crate::crypto::{KeyPair, PublicKey, Signature, VrfProof};
use crate::finalization::FinalizationRecord;
use crate::hash::{BlockHash, Hash};
use crate::identifiers::{BakerId, Slot};
use crate::transaction::BlockItem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Domain tag under which block signatures are made.
const BLOCK_SIGN_DOMAIN: &[u8] = b"TESSERA.BLOCK.v1";

/// A block produced by a baker.
///
/// The hash is over the complete canonical serialization (including the
/// signature) and is cached at construction; equality is hash equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakedBlock {
    pub slot: Slot,
    pub parent: BlockHash,
    pub baker_id: BakerId,
    /// The baker's claimed block-signing key, checked against the parent
    /// state's registration.
    pub baker_key: PublicKey,
    /// Leadership-election proof for `slot`.
    pub election_proof: VrfProof,
    /// Block nonce folded into the seed state.
    pub block_nonce: VrfProof,
    /// The last-finalized block as of baking time.
    pub last_finalized: BlockHash,
    /// Finalization record the baker includes to advance finalization.
    pub finalization_record: Option<FinalizationRecord>,
    pub transactions: Vec<Arc<BlockItem>>,
    /// Claimed hash of the post-execution state.
    pub state_hash: Hash,
    /// Claimed hash of the transaction outcomes.
    pub outcomes_hash: Hash,
    pub signature: Signature,

    /// Cached content hash.
    hash: BlockHash,
}

impl PartialEq for BakedBlock {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for BakedBlock {}

/// All fields of a block except the signature and cached hash.
///
/// Split out so baking can sign the body before the block exists.
#[derive(Debug, Clone)]
pub struct BlockBody {
    pub slot: Slot,
    pub parent: BlockHash,
    pub baker_id: BakerId,
    pub baker_key: PublicKey,
    pub election_proof: VrfProof,
    pub block_nonce: VrfProof,
    pub last_finalized: BlockHash,
    pub finalization_record: Option<FinalizationRecord>,
    pub transactions: Vec<Arc<BlockItem>>,
    pub state_hash: Hash,
    pub outcomes_hash: Hash,
}

impl BlockBody {
    fn serial_fields(&self, out: &mut Vec<u8>) {
        self.slot.serial(out);
        self.parent.serial(out);
        self.baker_id.serial(out);
        self.baker_key.serial(out);
        self.election_proof.serial(out);
        self.block_nonce.serial(out);
        self.last_finalized.serial(out);
        self.finalization_record.serial(out);
        self.transactions.serial(out);
        self.state_hash.serial(out);
        self.outcomes_hash.serial(out);
    }

    /// The bytes the baker signs.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(BLOCK_SIGN_DOMAIN);
        self.serial_fields(&mut message);
        message
    }

    /// Sign the body, producing the finished block.
    pub fn sign(self, keys: &KeyPair) -> BakedBlock {
        let signature = keys.sign(&self.signing_message());
        BakedBlock::from_parts(self, signature)
    }
}

impl BakedBlock {
    /// Assemble from a body and signature, computing the content hash.
    pub fn from_parts(body: BlockBody, signature: Signature) -> Self {
        let mut bytes = Vec::new();
        body.serial_fields(&mut bytes);
        signature.serial(&mut bytes);
        let hash = Hash::digest(&bytes);
        BakedBlock {
            slot: body.slot,
            parent: body.parent,
            baker_id: body.baker_id,
            baker_key: body.baker_key,
            election_proof: body.election_proof,
            block_nonce: body.block_nonce,
            last_finalized: body.last_finalized,
            finalization_record: body.finalization_record,
            transactions: body.transactions,
            state_hash: body.state_hash,
            outcomes_hash: body.outcomes_hash,
            signature,
            hash,
        }
    }

    /// The content hash.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// The body, cloned out for re-signing or inspection.
    pub fn body(&self) -> BlockBody {
        BlockBody {
            slot: self.slot,
            parent: self.parent,
            baker_id: self.baker_id,
            baker_key: self.baker_key,
            election_proof: self.election_proof,
            block_nonce: self.block_nonce,
            last_finalized: self.last_finalized,
            finalization_record: self.finalization_record.clone(),
            transactions: self.transactions.clone(),
            state_hash: self.state_hash,
            outcomes_hash: self.outcomes_hash,
        }
    }

    /// Verify the baker signature against the claimed key.
    pub fn verify_signature(&self) -> bool {
        self.baker_key
            .verify(&self.body().signing_message(), &self.signature)
    }
}

impl Serial for BakedBlock {
    fn serial(&self, out: &mut Vec<u8>) {
        self.body().serial_fields(out);
        self.signature.serial(out);
    }
}

impl Deserial for BakedBlock {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let body = BlockBody {
            slot: Slot::deserial(r)?,
            parent: Hash::deserial(r)?,
            baker_id: BakerId::deserial(r)?,
            baker_key: PublicKey::deserial(r)?,
            election_proof: VrfProof::deserial(r)?,
            block_nonce: VrfProof::deserial(r)?,
            last_finalized: Hash::deserial(r)?,
            finalization_record: Option::<FinalizationRecord>::deserial(r)?,
            transactions: Vec::<Arc<BlockItem>>::deserial(r)?,
            state_hash: Hash::deserial(r)?,
            outcomes_hash: Hash::deserial(r)?,
        };
        let signature = Signature::deserial(r)?;
        Ok(BakedBlock::from_parts(body, signature))
    }
}

/// Parse a block from canonical bytes.
pub fn parse_block(bytes: &[u8]) -> Result<BakedBlock, CodecError> {
    codec::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::serialize;
    use crate::crypto::VrfKeyPair;
    use crate::identifiers::{AccountAddress, Amount, Energy, Nonce, Timestamp};
    use crate::transaction::{sign_transaction, Payload};

    fn sample_block() -> BakedBlock {
        let keys = KeyPair::from_seed(&[1u8; 32]);
        let vrf = VrfKeyPair::from_seed(&[2u8; 32]);
        let tx = sign_transaction(
            &keys,
            AccountAddress([3u8; 32]),
            Nonce(1),
            Energy(500),
            Timestamp(99_000),
            Payload::Transfer {
                to: AccountAddress([4u8; 32]),
                amount: Amount(5),
            },
        );
        BlockBody {
            slot: Slot(17),
            parent: Hash::digest(b"parent"),
            baker_id: BakerId(0),
            baker_key: keys.public(),
            election_proof: vrf.prove(b"election"),
            block_nonce: vrf.prove(b"nonce"),
            last_finalized: Hash::digest(b"lfb"),
            finalization_record: None,
            transactions: vec![Arc::new(tx)],
            state_hash: Hash::digest(b"state"),
            outcomes_hash: Hash::digest(b"outcomes"),
        }
        .sign(&keys)
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let block = sample_block();
        let bytes = serialize(&block);
        let parsed = parse_block(&bytes).unwrap();
        assert_eq!(parsed.hash(), block.hash());
        assert_eq!(serialize(&parsed), bytes);
    }

    #[test]
    fn signature_binds_the_body() {
        let block = sample_block();
        assert!(block.verify_signature());

        // Re-signing a tampered body under a different key must not verify
        // against the original claimed key.
        let mut body = block.body();
        body.slot = Slot(18);
        let forged = body.sign(&KeyPair::from_seed(&[9u8; 32]));
        assert!(!forged.verify_signature());
    }

    #[test]
    fn truncated_block_fails_to_parse() {
        let bytes = serialize(&sample_block());
        assert!(parse_block(&bytes[..bytes.len() - 1]).is_err());
    }
}
