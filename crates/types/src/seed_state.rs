//! Leadership-election seed state.
//!
//! The seed state is the beacon deciding baker eligibility per slot. Each
//! epoch has a fixed leadership-election nonce; block VRF nonces baked during
//! the first two thirds of an epoch are folded into `updated_nonce`, which
//! becomes the next epoch's election nonce. Blocks late in an epoch cannot
//! bias the next epoch's lottery.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::crypto::VrfProof;
use crate::hash::{Hash, Hasher};
use crate::identifiers::{Epoch, Slot};
use serde::{Deserialize, Serialize};

/// Per-epoch election beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedState {
    /// Epoch this seed state is for.
    pub epoch: Epoch,
    /// Slots per epoch; constant within an era.
    pub epoch_length: u64,
    /// The election nonce for `epoch`. Fixed once the epoch starts.
    pub current_nonce: Hash,
    /// Accumulator over block nonces; seeds the next epoch's election nonce.
    pub updated_nonce: Hash,
}

impl SeedState {
    /// Seed state of epoch 0 of an era.
    pub fn genesis(leadership_election_nonce: Hash, epoch_length: u64) -> Self {
        SeedState {
            epoch: Epoch(0),
            epoch_length,
            current_nonce: leadership_election_nonce,
            updated_nonce: leadership_election_nonce,
        }
    }

    /// The epoch a slot falls into.
    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        Epoch(slot.0 / self.epoch_length)
    }

    /// Whether `slot` lies in the nonce-contribution window of its epoch
    /// (the first two thirds).
    pub fn contributes_nonce(&self, slot: Slot) -> bool {
        slot.0 % self.epoch_length < self.epoch_length * 2 / 3
    }

    /// Apply the epoch transitions up to `slot`'s epoch, without any nonce
    /// contribution: the accumulated nonce, rehashed with each new epoch
    /// number, becomes that epoch's election nonce. A block may skip whole
    /// epochs; each intervening epoch rehashes once.
    pub fn advance_epochs(&self, slot: Slot) -> SeedState {
        let mut next = *self;
        let target = self.epoch_of(slot);
        while next.epoch < target {
            next.epoch = next.epoch.next();
            let mut h = Hasher::new();
            h.update(next.updated_nonce.as_bytes());
            h.update(&next.epoch.0.to_be_bytes());
            next.current_nonce = h.finalize();
            next.updated_nonce = next.current_nonce;
        }
        next
    }

    /// Advance the seed state for a block baked in `slot` with `block_nonce`.
    pub fn update(&self, slot: Slot, block_nonce: &VrfProof) -> SeedState {
        let mut next = self.advance_epochs(slot);
        if next.contributes_nonce(slot) {
            let mut h = Hasher::new();
            h.update(next.updated_nonce.as_bytes());
            h.update(block_nonce.output().as_bytes());
            next.updated_nonce = h.finalize();
        }
        next
    }

    /// Re-key for the start of a new era.
    ///
    /// `leadershipElectionNonce = SHA256("Regenesis" ∥ prior.updatedNonce)`,
    /// epoch resets to 0, the epoch length carries over.
    pub fn regenesis(&self) -> SeedState {
        let mut h = Hasher::new();
        h.update(b"Regenesis");
        h.update(self.updated_nonce.as_bytes());
        let nonce = h.finalize();
        SeedState {
            epoch: Epoch(0),
            epoch_length: self.epoch_length,
            current_nonce: nonce,
            updated_nonce: nonce,
        }
    }

    /// The message a baker's leadership proof signs for `slot`.
    pub fn election_message(&self, slot: Slot) -> Vec<u8> {
        let mut message = Vec::with_capacity(52);
        message.extend_from_slice(b"LE");
        message.extend_from_slice(self.current_nonce.as_bytes());
        message.extend_from_slice(&slot.0.to_be_bytes());
        message
    }

    /// The message a baker's block nonce proves for `slot`.
    pub fn nonce_message(&self, slot: Slot) -> Vec<u8> {
        let mut message = Vec::with_capacity(52);
        message.extend_from_slice(b"NONCE");
        message.extend_from_slice(self.current_nonce.as_bytes());
        message.extend_from_slice(&slot.0.to_be_bytes());
        message
    }
}

impl Serial for SeedState {
    fn serial(&self, out: &mut Vec<u8>) {
        self.epoch.serial(out);
        self.epoch_length.serial(out);
        self.current_nonce.serial(out);
        self.updated_nonce.serial(out);
    }
}

impl Deserial for SeedState {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(SeedState {
            epoch: Epoch::deserial(r)?,
            epoch_length: r.u64()?,
            current_nonce: Hash::deserial(r)?,
            updated_nonce: Hash::deserial(r)?,
        })
    }
}
