//! Core types for the Tessera consensus tree-state.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: content hashes, canonical serialization, crypto wrappers
//! - **Identifiers**: slots, heights, baker ids, nonces, era indices
//! - **Consensus types**: blocks, block items, finalization records, genesis
//!   records, seed state, chain parameters
//! - **Contracts**: the [`UpdateResult`] code table and the wire envelope
//!
//! # Design Philosophy
//!
//! This crate is self-contained and depends on no other workspace crates,
//! making it the foundation layer. Everything that is hashed or sent between
//! nodes implements the canonical [`codec::Serial`] encoding; round-trip
//! byte-identity is part of the protocol, not an implementation choice.

pub mod block;
pub mod codec;
pub mod crypto;
pub mod finalization;
pub mod genesis;
pub mod hash;
pub mod identifiers;
pub mod network;
pub mod outcomes;
pub mod params;
pub mod results;
pub mod seed_state;
pub mod transaction;

pub use block::{parse_block, BakedBlock, BlockBody};
pub use codec::{deserialize, serialize, CodecError, Deserial, ReadCursor, Serial};
pub use crypto::{vrf_verify, KeyPair, PublicKey, Signature, VrfKeyPair, VrfProof, VrfPublicKey};
pub use finalization::{FinalizationProof, FinalizationRecord, FinalizerInfo};
pub use genesis::{GenesisAccount, GenesisBaker, GenesisData};
pub use hash::{
    hash_pair, merkle_root, BlockHash, Hash, Hasher, HexError, ModuleRef, TransactionHash,
};
pub use identifiers::{
    AccountAddress, Amount, BakerId, BlockHeight, ContractAddress, CredentialRegistrationId,
    Energy, Epoch, FinalizationIndex, GenesisIndex, Nonce, Slot, Timestamp, UpdateSequenceNumber,
};
pub use network::{
    decode_message, encode_message, CatchUpStatus, ConsensusMessage, FinalizationMessage,
    WIRE_VERSION,
};
pub use outcomes::{
    outcomes_hash, Address, Event, OutcomeResult, RejectReason, TransactionOutcome,
};
pub use params::{
    ChainParameters, CoreGenesisParameters, ElectionDifficulty, ExchangeRate,
    FinalizationParameters, ProtocolUpdate, ProtocolVersion, QueuedUpdate, RewardParameters,
    UpdatePayload, UpdateType,
};
pub use results::UpdateResult;
pub use seed_state::SeedState;
pub use transaction::{
    parse_block_item, sign_transaction, BlockItem, BlockItemKind, ChainUpdate,
    CredentialDeployment, NormalTransaction, Payload, ADMINISTRATIVE_ENERGY,
};

/// Test utilities shared by downstream crates' suites.
#[cfg(feature = "test-utils")]
pub mod test_utils {
    use super::*;

    /// Deterministic signing keypair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// Deterministic VRF keypair from a seed byte.
    pub fn test_vrf_keypair(seed: u8) -> VrfKeyPair {
        VrfKeyPair::from_seed(&[seed; 32])
    }

    /// Deterministic account address from a seed byte.
    pub fn test_address(seed: u8) -> AccountAddress {
        AccountAddress([seed; 32])
    }
}
