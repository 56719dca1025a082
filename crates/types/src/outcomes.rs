//! Transaction outcomes and their hashing.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::hash::{merkle_root, Hash, Hasher, ModuleRef, TransactionHash};
use crate::identifiers::{
    AccountAddress, Amount, BakerId, ContractAddress, CredentialRegistrationId, Energy, Timestamp,
};
use crate::params::ProtocolVersion;
use serde::{Deserialize, Serialize};

/// Either side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Address {
    Account(AccountAddress),
    Contract(ContractAddress),
}

impl Serial for Address {
    fn serial(&self, out: &mut Vec<u8>) {
        match self {
            Address::Account(a) => {
                out.push(0);
                a.serial(out);
            }
            Address::Contract(c) => {
                out.push(1);
                c.serial(out);
            }
        }
    }
}

impl Deserial for Address {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => Address::Account(AccountAddress::deserial(r)?),
            1 => Address::Contract(ContractAddress::deserial(r)?),
            tag => return Err(CodecError::InvalidTag { what: "Address", tag }),
        })
    }
}

/// Observable effects of a successful transaction, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A module was deployed.
    ModuleDeployed { module_ref: ModuleRef },
    /// A contract instance was created.
    ContractInitialized {
        address: ContractAddress,
        module_ref: ModuleRef,
        amount: Amount,
    },
    /// A contract entrypoint ran.
    Updated {
        address: ContractAddress,
        amount: Amount,
    },
    /// GTU moved.
    Transferred {
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// A baker was registered or its keys/stake changed.
    BakerConfigured { baker_id: BakerId, stake: Amount },
    /// A baker was deregistered; stake enters cooldown.
    BakerRemoved { baker_id: BakerId },
    /// An account was created from a credential.
    AccountCreated {
        address: AccountAddress,
        reg_id: CredentialRegistrationId,
    },
    /// A chain update was enqueued.
    UpdateEnqueued { effective_time: Timestamp },
}

impl Serial for Event {
    fn serial(&self, out: &mut Vec<u8>) {
        match self {
            Event::ModuleDeployed { module_ref } => {
                out.push(0);
                module_ref.serial(out);
            }
            Event::ContractInitialized {
                address,
                module_ref,
                amount,
            } => {
                out.push(1);
                address.serial(out);
                module_ref.serial(out);
                amount.serial(out);
            }
            Event::Updated { address, amount } => {
                out.push(2);
                address.serial(out);
                amount.serial(out);
            }
            Event::Transferred { from, to, amount } => {
                out.push(3);
                from.serial(out);
                to.serial(out);
                amount.serial(out);
            }
            Event::BakerConfigured { baker_id, stake } => {
                out.push(4);
                baker_id.serial(out);
                stake.serial(out);
            }
            Event::BakerRemoved { baker_id } => {
                out.push(5);
                baker_id.serial(out);
            }
            Event::AccountCreated { address, reg_id } => {
                out.push(6);
                address.serial(out);
                reg_id.serial(out);
            }
            Event::UpdateEnqueued { effective_time } => {
                out.push(7);
                effective_time.serial(out);
            }
        }
    }
}

impl Deserial for Event {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => Event::ModuleDeployed {
                module_ref: Hash::deserial(r)?,
            },
            1 => Event::ContractInitialized {
                address: ContractAddress::deserial(r)?,
                module_ref: Hash::deserial(r)?,
                amount: Amount::deserial(r)?,
            },
            2 => Event::Updated {
                address: ContractAddress::deserial(r)?,
                amount: Amount::deserial(r)?,
            },
            3 => Event::Transferred {
                from: Address::deserial(r)?,
                to: Address::deserial(r)?,
                amount: Amount::deserial(r)?,
            },
            4 => Event::BakerConfigured {
                baker_id: BakerId::deserial(r)?,
                stake: Amount::deserial(r)?,
            },
            5 => Event::BakerRemoved {
                baker_id: BakerId::deserial(r)?,
            },
            6 => Event::AccountCreated {
                address: AccountAddress::deserial(r)?,
                reg_id: CredentialRegistrationId::deserial(r)?,
            },
            7 => Event::UpdateEnqueued {
                effective_time: Timestamp::deserial(r)?,
            },
            tag => return Err(CodecError::InvalidTag { what: "Event", tag }),
        })
    }
}

/// Why a well-formed transaction failed during execution.
///
/// Rejected transactions still pay for their declared energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RejectReason {
    OutOfEnergy = 0,
    InsufficientFunds = 1,
    InvalidModuleRef = 2,
    InvalidContractAddress = 3,
    InvalidInitMethod = 4,
    InvalidReceiveMethod = 5,
    RuntimeFailure = 6,
    AlreadyABaker = 7,
    NotABaker = 8,
    StakeUnderThreshold = 9,
    DuplicateAggregationKey = 10,
}

impl Serial for RejectReason {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(self.clone() as u8);
    }
}

impl Deserial for RejectReason {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => RejectReason::OutOfEnergy,
            1 => RejectReason::InsufficientFunds,
            2 => RejectReason::InvalidModuleRef,
            3 => RejectReason::InvalidContractAddress,
            4 => RejectReason::InvalidInitMethod,
            5 => RejectReason::InvalidReceiveMethod,
            6 => RejectReason::RuntimeFailure,
            7 => RejectReason::AlreadyABaker,
            8 => RejectReason::NotABaker,
            9 => RejectReason::StakeUnderThreshold,
            10 => RejectReason::DuplicateAggregationKey,
            tag => return Err(CodecError::InvalidTag { what: "RejectReason", tag }),
        })
    }
}

/// Result half of an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeResult {
    Success(Vec<Event>),
    Rejected(RejectReason),
}

impl Serial for OutcomeResult {
    fn serial(&self, out: &mut Vec<u8>) {
        match self {
            OutcomeResult::Success(events) => {
                out.push(0);
                events.serial(out);
            }
            OutcomeResult::Rejected(reason) => {
                out.push(1);
                reason.serial(out);
            }
        }
    }
}

impl Deserial for OutcomeResult {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => OutcomeResult::Success(Vec::<Event>::deserial(r)?),
            1 => OutcomeResult::Rejected(RejectReason::deserial(r)?),
            tag => {
                return Err(CodecError::InvalidTag {
                    what: "OutcomeResult",
                    tag,
                })
            }
        })
    }
}

/// The outcome of one transaction in one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub transaction_hash: TransactionHash,
    pub energy_used: Energy,
    pub result: OutcomeResult,
}

impl TransactionOutcome {
    /// Content hash of this outcome.
    pub fn hash(&self) -> Hash {
        Hash::digest(&crate::codec::serialize(self))
    }

    /// Whether execution succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success(_))
    }
}

impl Serial for TransactionOutcome {
    fn serial(&self, out: &mut Vec<u8>) {
        self.transaction_hash.serial(out);
        self.energy_used.serial(out);
        self.result.serial(out);
    }
}

impl Deserial for TransactionOutcome {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(TransactionOutcome {
            transaction_hash: Hash::deserial(r)?,
            energy_used: Energy::deserial(r)?,
            result: OutcomeResult::deserial(r)?,
        })
    }
}

/// Hash of a block's outcome list under the era's protocol version.
///
/// Up to P2 this is a flat fold; from P3 outcomes form a Merkle tree so that
/// membership proofs are logarithmic.
pub fn outcomes_hash(version: ProtocolVersion, outcomes: &[TransactionOutcome]) -> Hash {
    let leaves: Vec<Hash> = outcomes.iter().map(TransactionOutcome::hash).collect();
    if version.merkle_outcomes() {
        merkle_root(&leaves)
    } else {
        let mut h = Hasher::new();
        h.update(b"OUTCOMES");
        for leaf in &leaves {
            h.update(leaf.as_bytes());
        }
        h.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{deserialize, serialize};

    fn outcome(n: u8) -> TransactionOutcome {
        TransactionOutcome {
            transaction_hash: Hash::digest(&[n]),
            energy_used: Energy(n as u64 * 10),
            result: OutcomeResult::Success(vec![Event::Updated {
                address: ContractAddress::new(n as u64),
                amount: Amount(n as u64),
            }]),
        }
    }

    #[test]
    fn outcome_round_trip() {
        let o = outcome(1);
        let parsed: TransactionOutcome = deserialize(&serialize(&o)).unwrap();
        assert_eq!(parsed, o);
    }

    #[test]
    fn hash_mode_differs_between_versions() {
        let outcomes = vec![outcome(1), outcome(2), outcome(3)];
        let flat = outcomes_hash(ProtocolVersion::P1, &outcomes);
        let merkle = outcomes_hash(ProtocolVersion::P3, &outcomes);
        assert_ne!(flat, merkle);
        // P1 and P2 share the flat fold.
        assert_eq!(flat, outcomes_hash(ProtocolVersion::P2, &outcomes));
    }

    #[test]
    fn rejected_outcomes_hash_differently() {
        let ok = outcome(1);
        let rejected = TransactionOutcome {
            result: OutcomeResult::Rejected(RejectReason::OutOfEnergy),
            ..ok.clone()
        };
        assert_ne!(ok.hash(), rejected.hash());
    }
}
