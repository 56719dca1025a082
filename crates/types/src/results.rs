//! Reception result codes.
//!
//! The integer values form the cross-component contract with the networking
//! layer and RPC surface: every code must keep its value and its relay
//! semantics.

use std::fmt;

/// Outcome of receiving a consensus message or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateResult {
    /// Accepted and processed.
    Success = 0,
    /// The bytes do not parse.
    SerializationFail = 1,
    /// Well-formed but violates a protocol rule.
    Invalid = 2,
    /// Queued awaiting its parent block.
    PendingBlock = 3,
    /// Queued awaiting a finalization it depends on.
    PendingFinalization = 4,
    /// Accepted for asynchronous processing.
    Async = 5,
    /// Already known.
    Duplicate = 6,
    /// At or below the last finalized point.
    Stale = 7,
    /// Finalization message for a session this node is not in.
    IncorrectFinalizationSession = 8,
    /// Cannot be verified against any available state.
    Unverifiable = 9,
    /// Catch-up: the peer should continue serving.
    ContinueCatchUp = 10,
    /// Slot-time too far in the future; retry later.
    EarlyBlock = 11,
    /// Out-of-band import file is missing.
    MissingImportFile = 12,
    /// Consensus stopped for a protocol update.
    ConsensusShutDown = 13,
    /// Transaction expiry is unreasonably far in the future.
    ExpiryTooLate = 14,
    /// Transaction failed signature or semantic verification.
    VerificationFailed = 15,
    /// Sender account does not exist.
    NonexistingSenderAccount = 16,
    /// A transaction with this nonce is already finalized.
    DuplicateNonce = 17,
    /// Nonce is beyond the admission window.
    NonceTooLarge = 18,
    /// Declared energy is below the payload's base cost.
    TooLowEnergy = 19,
    /// Message is for an unknown era.
    InvalidGenesisIndex = 20,
    /// Credential registration id already used.
    DuplicateAccountRegistrationID = 21,
    CredentialDeploymentInvalidSignatures = 22,
    CredentialDeploymentInvalidIP = 23,
    CredentialDeploymentInvalidAR = 24,
    CredentialDeploymentExpired = 25,
    ChainUpdateInvalidEffectiveTime = 26,
    ChainUpdateSequenceNumberTooOld = 27,
    ChainUpdateInvalidSignatures = 28,
    /// Transaction energy exceeds the block energy limit.
    EnergyExceeded = 29,
    /// Sender cannot cover the declared cost.
    InsufficientFunds = 30,
}

impl UpdateResult {
    /// The wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        use UpdateResult::*;
        Some(match code {
            0 => Success,
            1 => SerializationFail,
            2 => Invalid,
            3 => PendingBlock,
            4 => PendingFinalization,
            5 => Async,
            6 => Duplicate,
            7 => Stale,
            8 => IncorrectFinalizationSession,
            9 => Unverifiable,
            10 => ContinueCatchUp,
            11 => EarlyBlock,
            12 => MissingImportFile,
            13 => ConsensusShutDown,
            14 => ExpiryTooLate,
            15 => VerificationFailed,
            16 => NonexistingSenderAccount,
            17 => DuplicateNonce,
            18 => NonceTooLarge,
            19 => TooLowEnergy,
            20 => InvalidGenesisIndex,
            21 => DuplicateAccountRegistrationID,
            22 => CredentialDeploymentInvalidSignatures,
            23 => CredentialDeploymentInvalidIP,
            24 => CredentialDeploymentInvalidAR,
            25 => CredentialDeploymentExpired,
            26 => ChainUpdateInvalidEffectiveTime,
            27 => ChainUpdateSequenceNumberTooOld,
            28 => ChainUpdateInvalidSignatures,
            29 => EnergyExceeded,
            30 => InsufficientFunds,
            _ => return None,
        })
    }

    /// Whether the message that produced this result should be relayed to
    /// other peers.
    ///
    /// Accepted and dependency-deferred messages propagate; everything that
    /// was dropped, rejected or already known does not.
    pub fn should_relay(self) -> bool {
        matches!(
            self,
            UpdateResult::Success | UpdateResult::PendingBlock | UpdateResult::PendingFinalization
        )
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        // The numeric assignments are frozen; a renumbering is a protocol
        // break even if every variant survives.
        assert_eq!(UpdateResult::Success.code(), 0);
        assert_eq!(UpdateResult::EarlyBlock.code(), 11);
        assert_eq!(UpdateResult::ConsensusShutDown.code(), 13);
        assert_eq!(UpdateResult::InvalidGenesisIndex.code(), 20);
        assert_eq!(UpdateResult::InsufficientFunds.code(), 30);
    }

    #[test]
    fn every_code_round_trips() {
        for code in 0..=30u8 {
            let result = UpdateResult::from_code(code).unwrap();
            assert_eq!(result.code(), code);
        }
        assert!(UpdateResult::from_code(31).is_none());
    }

    #[test]
    fn relay_semantics() {
        assert!(UpdateResult::Success.should_relay());
        assert!(UpdateResult::PendingBlock.should_relay());
        assert!(UpdateResult::PendingFinalization.should_relay());
        assert!(!UpdateResult::Duplicate.should_relay());
        assert!(!UpdateResult::Stale.should_relay());
        assert!(!UpdateResult::Invalid.should_relay());
    }
}
