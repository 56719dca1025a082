//! Admission-time transaction verification.
//!
//! Runs against the last-finalized state, outside the global lock; the
//! result is cached in the transaction table. Only failures that no future
//! state can heal are cached as invalid; everything else re-checks at
//! execution time.

use tessera_state::BlockState;
use tessera_tree::{AdmissionContext, TransactionVerifier, VerificationOutcome};
use tessera_types::{
    AccountAddress, BlockItem, BlockItemKind, Energy, Nonce, Payload, Timestamp, UpdateResult,
    UpdateSequenceNumber, UpdateType, ADMINISTRATIVE_ENERGY,
};

/// Base energy cost of a payload, charged before any execution.
pub fn base_energy_cost(item: &BlockItem) -> Energy {
    match item.kind() {
        BlockItemKind::Normal(tx) => match &tx.payload {
            Payload::Transfer { .. } => Energy(50),
            Payload::DeployModule { source } => Energy(300 + source.len() as u64 / 10),
            Payload::InitContract { .. } => Energy(500),
            Payload::UpdateContract { .. } => Energy(500),
            Payload::ConfigureBaker { .. } => Energy(300),
            Payload::RemoveBaker => Energy(300),
        },
        _ => Energy(ADMINISTRATIVE_ENERGY),
    }
}

/// Adapter exposing a block state as the table's nonce/sequence source.
pub struct StateAdmission<'a>(pub &'a BlockState);

impl AdmissionContext for StateAdmission<'_> {
    fn account_next_nonce(&self, sender: &AccountAddress) -> Option<Nonce> {
        self.0.get_account(sender).map(|a| a.next_nonce)
    }

    fn update_next_sequence(&self, ty: UpdateType) -> UpdateSequenceNumber {
        self.0.next_update_sequence(ty)
    }
}

/// Verifier over a reference state.
pub struct AdmissionVerifier<'a> {
    pub state: &'a BlockState,
    /// Wall-clock now, for expiry checks.
    pub now: Timestamp,
    /// The era's block energy budget.
    pub max_block_energy: Energy,
    /// Admission bound on how far an expiry may lie in the future.
    pub max_time_to_expiry_millis: u64,
}

impl AdmissionVerifier<'_> {
    fn verify_normal(&self, tx: &tessera_types::NormalTransaction, item: &BlockItem) -> VerificationOutcome {
        if tx.expiry < self.now {
            // Already expired; no future state un-expires it, but the code
            // reported to the peer is Stale, not VerificationFailed.
            return VerificationOutcome::Invalid(UpdateResult::Stale);
        }
        if tx.expiry.0 > self.now.0 + self.max_time_to_expiry_millis {
            return VerificationOutcome::Invalid(UpdateResult::ExpiryTooLate);
        }
        if tx.energy_limit < base_energy_cost(item) {
            return VerificationOutcome::Invalid(UpdateResult::TooLowEnergy);
        }
        if tx.energy_limit > self.max_block_energy {
            return VerificationOutcome::Invalid(UpdateResult::EnergyExceeded);
        }
        let Some(account) = self.state.get_account(&tx.sender) else {
            // The account may be created by a credential that finalizes
            // later.
            return VerificationOutcome::MaybeLater(UpdateResult::NonexistingSenderAccount);
        };
        if !tx.verify_signature(&account.verify_key) {
            // Account keys are fixed at creation; a bad signature cannot
            // heal.
            return VerificationOutcome::Invalid(UpdateResult::VerificationFailed);
        }
        let fee = tessera_state::energy_to_gtu(self.state.chain_parameters(), tx.energy_limit);
        let needed = match &tx.payload {
            Payload::Transfer { amount, .. } => fee.saturating_add(*amount),
            Payload::InitContract { amount, .. } => fee.saturating_add(*amount),
            Payload::UpdateContract { amount, .. } => fee.saturating_add(*amount),
            _ => fee,
        };
        if account.spendable_balance(self.now) < needed {
            // The balance can grow before execution.
            return VerificationOutcome::MaybeLater(UpdateResult::InsufficientFunds);
        }
        VerificationOutcome::Valid
    }

    fn verify_credential(
        &self,
        cd: &tessera_types::CredentialDeployment,
    ) -> VerificationOutcome {
        if cd.expiry < self.now {
            return VerificationOutcome::Invalid(UpdateResult::CredentialDeploymentExpired);
        }
        if !self.state.has_identity_provider(cd.ip_identity) {
            return VerificationOutcome::Invalid(UpdateResult::CredentialDeploymentInvalidIP);
        }
        if !self.state.has_anonymity_revoker(cd.ar_identity) {
            return VerificationOutcome::Invalid(UpdateResult::CredentialDeploymentInvalidAR);
        }
        if !cd.verify_signature() {
            return VerificationOutcome::Invalid(
                UpdateResult::CredentialDeploymentInvalidSignatures,
            );
        }
        if self.state.get_account_by_credential(&cd.reg_id).is_some() {
            return VerificationOutcome::Invalid(
                UpdateResult::DuplicateAccountRegistrationID,
            );
        }
        VerificationOutcome::Valid
    }

    fn verify_chain_update(&self, up: &tessera_types::ChainUpdate) -> VerificationOutcome {
        if up.timeout < self.now {
            return VerificationOutcome::Invalid(UpdateResult::Stale);
        }
        if up.effective_time <= self.now || up.timeout > up.effective_time {
            return VerificationOutcome::Invalid(
                UpdateResult::ChainUpdateInvalidEffectiveTime,
            );
        }
        let next = self.state.next_update_sequence(up.payload.update_type());
        if up.sequence_number < next {
            return VerificationOutcome::Invalid(
                UpdateResult::ChainUpdateSequenceNumberTooOld,
            );
        }
        let (keys, threshold) = self.state.governance();
        if up.count_valid_signatures(keys) < threshold as usize {
            return VerificationOutcome::Invalid(UpdateResult::ChainUpdateInvalidSignatures);
        }
        VerificationOutcome::Valid
    }
}

impl TransactionVerifier for AdmissionVerifier<'_> {
    fn verify(&self, item: &BlockItem) -> VerificationOutcome {
        match item.kind() {
            BlockItemKind::Normal(tx) => self.verify_normal(tx, item),
            BlockItemKind::CredentialDeployment(cd) => self.verify_credential(cd),
            BlockItemKind::ChainUpdate(up) => self.verify_chain_update(up),
        }
    }
}

