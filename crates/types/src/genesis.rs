//! Genesis and regenesis records.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::crypto::PublicKey;
use crate::hash::{BlockHash, Hash};
use crate::identifiers::{AccountAddress, Amount, BakerId, BlockHeight};
use crate::params::{ChainParameters, CoreGenesisParameters, ProtocolVersion};
use serde::{Deserialize, Serialize};

/// A baker registered at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBaker {
    pub baker_id: BakerId,
    pub stake: Amount,
    pub election_key: PublicKey,
    pub signature_key: PublicKey,
    pub aggregation_key: PublicKey,
}

impl Serial for GenesisBaker {
    fn serial(&self, out: &mut Vec<u8>) {
        self.baker_id.serial(out);
        self.stake.serial(out);
        self.election_key.serial(out);
        self.signature_key.serial(out);
        self.aggregation_key.serial(out);
    }
}

impl Deserial for GenesisBaker {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(GenesisBaker {
            baker_id: BakerId::deserial(r)?,
            stake: Amount::deserial(r)?,
            election_key: PublicKey::deserial(r)?,
            signature_key: PublicKey::deserial(r)?,
            aggregation_key: PublicKey::deserial(r)?,
        })
    }
}

/// An account present at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: AccountAddress,
    pub balance: Amount,
    pub verify_key: PublicKey,
    pub baker: Option<GenesisBaker>,
}

impl Serial for GenesisAccount {
    fn serial(&self, out: &mut Vec<u8>) {
        self.address.serial(out);
        self.balance.serial(out);
        self.verify_key.serial(out);
        self.baker.serial(out);
    }
}

impl Deserial for GenesisAccount {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(GenesisAccount {
            address: AccountAddress::deserial(r)?,
            balance: Amount::deserial(r)?,
            verify_key: PublicKey::deserial(r)?,
            baker: Option::<GenesisBaker>::deserial(r)?,
        })
    }
}

/// The record an era starts from.
///
/// Era 0 starts from `Initial`; every later era starts from `Regenesis`,
/// whose state is migrated from the prior era's terminal block rather than
/// built from account lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenesisData {
    Initial {
        core: CoreGenesisParameters,
        protocol_version: ProtocolVersion,
        /// Seed of the era's first leadership-election nonce.
        leadership_election_nonce: Hash,
        accounts: Vec<GenesisAccount>,
        /// Governance keys authorizing chain updates.
        governance_keys: Vec<PublicKey>,
        /// Signatures required for a chain update to be accepted.
        governance_threshold: u32,
        /// Recognized identity provider ids.
        identity_providers: Vec<u32>,
        /// Recognized anonymity revoker ids.
        anonymity_revokers: Vec<u32>,
        chain_parameters: ChainParameters,
    },
    Regenesis {
        core: CoreGenesisParameters,
        protocol_version: ProtocolVersion,
        /// First genesis of the whole chain (era 0).
        first_genesis: BlockHash,
        /// The prior era's genesis hash.
        previous_genesis: BlockHash,
        /// The prior era's terminal block.
        terminal_block: BlockHash,
        /// Hash of the migrated initial state.
        state_hash: Hash,
        /// Absolute height the new era starts at (terminal height + 1).
        starting_absolute_height: BlockHeight,
    },
}

impl GenesisData {
    /// The genesis block hash of this era.
    pub fn hash(&self) -> BlockHash {
        Hash::digest(&crate::codec::serialize(self))
    }

    /// Core parameters of the era.
    pub fn core(&self) -> &CoreGenesisParameters {
        match self {
            GenesisData::Initial { core, .. } => core,
            GenesisData::Regenesis { core, .. } => core,
        }
    }

    /// Protocol version every block of the era is interpreted under.
    pub fn protocol_version(&self) -> ProtocolVersion {
        match self {
            GenesisData::Initial {
                protocol_version, ..
            } => *protocol_version,
            GenesisData::Regenesis {
                protocol_version, ..
            } => *protocol_version,
        }
    }

    /// The era-0 genesis hash: self for an initial genesis.
    pub fn first_genesis_hash(&self) -> BlockHash {
        match self {
            GenesisData::Initial { .. } => self.hash(),
            GenesisData::Regenesis { first_genesis, .. } => *first_genesis,
        }
    }
}

impl Serial for GenesisData {
    fn serial(&self, out: &mut Vec<u8>) {
        match self {
            GenesisData::Initial {
                core,
                protocol_version,
                leadership_election_nonce,
                accounts,
                governance_keys,
                governance_threshold,
                identity_providers,
                anonymity_revokers,
                chain_parameters,
            } => {
                out.push(0);
                core.serial(out);
                protocol_version.serial(out);
                leadership_election_nonce.serial(out);
                accounts.serial(out);
                governance_keys.serial(out);
                governance_threshold.serial(out);
                identity_providers.serial(out);
                anonymity_revokers.serial(out);
                chain_parameters.serial(out);
            }
            GenesisData::Regenesis {
                core,
                protocol_version,
                first_genesis,
                previous_genesis,
                terminal_block,
                state_hash,
                starting_absolute_height,
            } => {
                out.push(1);
                core.serial(out);
                protocol_version.serial(out);
                first_genesis.serial(out);
                previous_genesis.serial(out);
                terminal_block.serial(out);
                state_hash.serial(out);
                starting_absolute_height.serial(out);
            }
        }
    }
}

impl Deserial for GenesisData {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => GenesisData::Initial {
                core: CoreGenesisParameters::deserial(r)?,
                protocol_version: ProtocolVersion::deserial(r)?,
                leadership_election_nonce: Hash::deserial(r)?,
                accounts: Vec::<GenesisAccount>::deserial(r)?,
                governance_keys: Vec::<PublicKey>::deserial(r)?,
                governance_threshold: r.u32()?,
                identity_providers: Vec::<u32>::deserial(r)?,
                anonymity_revokers: Vec::<u32>::deserial(r)?,
                chain_parameters: ChainParameters::deserial(r)?,
            },
            1 => GenesisData::Regenesis {
                core: CoreGenesisParameters::deserial(r)?,
                protocol_version: ProtocolVersion::deserial(r)?,
                first_genesis: Hash::deserial(r)?,
                previous_genesis: Hash::deserial(r)?,
                terminal_block: Hash::deserial(r)?,
                state_hash: Hash::deserial(r)?,
                starting_absolute_height: BlockHeight::deserial(r)?,
            },
            tag => return Err(CodecError::InvalidTag { what: "GenesisData", tag }),
        })
    }
}
