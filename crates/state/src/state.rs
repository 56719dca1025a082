//! The versioned block state.
//!
//! Every block references an immutable [`BlockState`] snapshot. Executing a
//! child block thaws the parent snapshot into a [`MutableState`] workspace,
//! applies the block's transactions, and freezes the result into the child's
//! snapshot. Snapshots share unmodified accounts, instances and modules by
//! `Arc`; a write copies only the touched entry.
//!
//! Finalization archives snapshots of blocks strictly below the new
//! last-finalized block: an archived snapshot keeps its hash and read
//! operations but can no longer be thawed.

use crate::account::{Account, Baker, Delegation};
use crate::contract::{Instance, Module};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tessera_types::{
    merkle_root, AccountAddress, Amount, BakerId, ChainParameters, ContractAddress,
    CredentialDeployment, CredentialRegistrationId, ElectionDifficulty, Epoch,
    FinalizationIndex, GenesisData, Hash, ModuleRef, Nonce, ProtocolUpdate, ProtocolVersion,
    PublicKey, QueuedUpdate, SeedState, Serial, Slot, Timestamp, UpdatePayload,
    UpdateSequenceNumber, UpdateType,
};

/// Errors from block-state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Lookup miss.
    #[error("Entity not found")]
    NotFound,

    /// State opened under the wrong protocol version.
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        expected: ProtocolVersion,
        actual: ProtocolVersion,
    },

    /// The snapshot has been archived; mutable capabilities are gone.
    #[error("State is archived")]
    Archived,

    /// A transfer source cannot cover the amount.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Backing store failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// The special reward-holding accounts and supply totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccounts {
    /// Pool paid to bakers at paydays.
    pub baking_reward: Amount,
    /// Pool paid to the finalization committee.
    pub finalization_reward: Amount,
    /// Execution fees retained for the next block's baker.
    pub gas_account: Amount,
    /// Sum of all shielded balances.
    pub total_encrypted: Amount,
    /// Recorded total supply; conserved by every operation.
    pub total_gtu: Amount,
}

/// How one execution fee was divided across the reward accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gas: Amount,
    pub baking: Amount,
    pub finalization: Amount,
}

impl RewardAccounts {
    fn hash(&self) -> Hash {
        let mut out = Vec::new();
        self.baking_reward.serial(&mut out);
        self.finalization_reward.serial(&mut out);
        self.gas_account.serial(&mut out);
        self.total_encrypted.serial(&mut out);
        self.total_gtu.serial(&mut out);
        Hash::digest(&out)
    }
}

/// Per-type queue of not-yet-effective chain updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQueue {
    /// Next admissible sequence number for this type.
    pub next_sequence: UpdateSequenceNumber,
    /// Pending updates, ordered by effective time.
    pub queue: Vec<QueuedUpdate>,
}

impl Default for UpdateQueue {
    fn default() -> Self {
        UpdateQueue {
            next_sequence: UpdateSequenceNumber::FIRST,
            queue: Vec::new(),
        }
    }
}

/// The baker committee answering a slot-bakers query.
#[derive(Debug, Clone)]
pub struct SlotBakers {
    pub bakers: Vec<Arc<Baker>>,
    pub total_stake: Amount,
}

impl SlotBakers {
    /// Find a committee member by id.
    pub fn lookup(&self, id: BakerId) -> Option<&Arc<Baker>> {
        self.bakers.iter().find(|b| b.id == id)
    }
}

/// The entity tables of one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StateInner {
    pub protocol_version: ProtocolVersion,

    // Accounts, with secondary indices by ordinal and credential.
    pub accounts: BTreeMap<AccountAddress, Arc<Account>>,
    pub accounts_by_index: BTreeMap<u64, AccountAddress>,
    pub accounts_by_credential: BTreeMap<CredentialRegistrationId, AccountAddress>,
    pub next_account_index: u64,

    pub instances: BTreeMap<u64, Arc<Instance>>,
    pub next_instance_index: u64,

    pub modules: BTreeMap<ModuleRef, Arc<Module>>,

    pub bakers: BTreeMap<BakerId, Arc<Baker>>,
    pub next_baker_id: BakerId,
    /// Aggregation keys of active bakers; uniqueness is enforced here.
    pub active_aggregation_keys: BTreeSet<[u8; 32]>,

    pub reward_accounts: RewardAccounts,
    pub seed_state: SeedState,
    pub chain_parameters: ChainParameters,

    pub governance_keys: Vec<PublicKey>,
    pub governance_threshold: u32,

    /// Recognized identity providers and anonymity revokers.
    pub identity_providers: BTreeSet<u32>,
    pub anonymity_revokers: BTreeSet<u32>,

    pub update_queues: BTreeMap<UpdateType, UpdateQueue>,
    /// Set once a protocol update crosses its effective time; cleared only
    /// by regenesis.
    pub pending_protocol_update: Option<(Timestamp, ProtocolUpdate)>,

    /// Highest finalization index whose rewards are settled into pending
    /// claims. Advanced only during block execution, so every replica
    /// executing a block settles the same records.
    pub settled_finalization_index: FinalizationIndex,
}

impl StateInner {
    fn compute_hash(&self) -> Hash {
        let accounts_root =
            merkle_root(&self.accounts.values().map(|a| a.hash()).collect::<Vec<_>>());
        let instances_root =
            merkle_root(&self.instances.values().map(|i| i.hash()).collect::<Vec<_>>());
        let modules_root =
            merkle_root(&self.modules.values().map(|m| m.hash()).collect::<Vec<_>>());
        let bakers_root =
            merkle_root(&self.bakers.values().map(|b| b.hash()).collect::<Vec<_>>());

        let mut meta = Vec::new();
        meta.push(self.protocol_version as u8);
        self.seed_state.serial(&mut meta);
        self.chain_parameters.serial(&mut meta);
        (self.governance_keys.len() as u32).serial(&mut meta);
        for k in &self.governance_keys {
            k.serial(&mut meta);
        }
        self.governance_threshold.serial(&mut meta);
        for ip in &self.identity_providers {
            ip.serial(&mut meta);
        }
        for ar in &self.anonymity_revokers {
            ar.serial(&mut meta);
        }
        for (ty, q) in &self.update_queues {
            ty.serial(&mut meta);
            q.next_sequence.serial(&mut meta);
            (q.queue.len() as u32).serial(&mut meta);
            for u in &q.queue {
                u.effective_time.serial(&mut meta);
                u.payload.serial(&mut meta);
            }
        }
        match &self.pending_protocol_update {
            None => meta.push(0),
            Some((t, p)) => {
                meta.push(1);
                t.serial(&mut meta);
                p.serial(&mut meta);
            }
        }
        self.settled_finalization_index.serial(&mut meta);
        let meta_hash = Hash::digest(&meta);

        merkle_root(&[
            accounts_root,
            instances_root,
            modules_root,
            bakers_root,
            self.reward_accounts.hash(),
            meta_hash,
        ])
    }

    fn active_bakers(&self) -> SlotBakers {
        let bakers: Vec<Arc<Baker>> = self
            .bakers
            .values()
            .filter(|b| b.is_active())
            .cloned()
            .collect();
        let total_stake = Amount(bakers.iter().map(|b| b.stake.0).sum());
        SlotBakers {
            bakers,
            total_stake,
        }
    }
}

/// An immutable, hash-addressed snapshot.
#[derive(Debug, Clone)]
pub struct BlockState {
    inner: Arc<StateInner>,
    hash: Hash,
    archived: Arc<AtomicBool>,
}

impl BlockState {
    /// The structural state hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The era's protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.inner.protocol_version
    }

    /// Release mutable capabilities, keeping hash and reads.
    pub fn archive(&self) {
        self.archived.store(true, Ordering::Release);
    }

    /// Whether [`BlockState::archive`] has run.
    pub fn is_archived(&self) -> bool {
        self.archived.load(Ordering::Acquire)
    }

    /// Open a mutable workspace on top of this snapshot.
    pub fn thaw(&self) -> Result<MutableState, StateError> {
        if self.is_archived() {
            return Err(StateError::Archived);
        }
        Ok(MutableState {
            inner: (*self.inner).clone(),
        })
    }

    /// Like [`thaw`](Self::thaw), but also checks the protocol version.
    pub fn thaw_for(&self, version: ProtocolVersion) -> Result<MutableState, StateError> {
        if self.inner.protocol_version != version {
            return Err(StateError::VersionMismatch {
                expected: version,
                actual: self.inner.protocol_version,
            });
        }
        self.thaw()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════════════════

    /// Account by address.
    pub fn get_account(&self, address: &AccountAddress) -> Option<Arc<Account>> {
        self.inner.accounts.get(address).cloned()
    }

    /// Account by creation ordinal.
    pub fn get_account_by_index(&self, index: u64) -> Option<Arc<Account>> {
        let address = self.inner.accounts_by_index.get(&index)?;
        self.get_account(address)
    }

    /// Account owning a credential.
    pub fn get_account_by_credential(
        &self,
        reg_id: &CredentialRegistrationId,
    ) -> Option<Arc<Account>> {
        let address = self.inner.accounts_by_credential.get(reg_id)?;
        self.get_account(address)
    }

    /// Contract instance by address.
    pub fn get_instance(&self, address: ContractAddress) -> Option<Arc<Instance>> {
        if address.subindex != 0 {
            return None;
        }
        self.inner.instances.get(&address.index).cloned()
    }

    /// Module by reference.
    pub fn get_module(&self, module_ref: &ModuleRef) -> Option<Arc<Module>> {
        self.inner.modules.get(module_ref).cloned()
    }

    /// The leadership-election seed state.
    pub fn seed_state(&self) -> &SeedState {
        &self.inner.seed_state
    }

    /// Current chain parameters (before queued updates).
    pub fn chain_parameters(&self) -> &ChainParameters {
        &self.inner.chain_parameters
    }

    /// Reward accounts and supply totals.
    pub fn reward_accounts(&self) -> &RewardAccounts {
        &self.inner.reward_accounts
    }

    /// Governance keys authorizing chain updates, with the signature
    /// threshold.
    pub fn governance(&self) -> (&[PublicKey], u32) {
        (&self.inner.governance_keys, self.inner.governance_threshold)
    }

    /// The election difficulty effective at `ts`, after queued updates up to
    /// that time.
    pub fn election_difficulty_at(&self, ts: Timestamp) -> ElectionDifficulty {
        let mut difficulty = self.inner.chain_parameters.election_difficulty;
        if let Some(q) = self.inner.update_queues.get(&UpdateType::ElectionDifficulty) {
            for u in &q.queue {
                if u.effective_time <= ts {
                    if let UpdatePayload::ElectionDifficulty(d) = u.payload {
                        difficulty = d;
                    }
                }
            }
        }
        difficulty
    }

    /// Next admissible sequence number for an update type.
    pub fn next_update_sequence(&self, ty: UpdateType) -> UpdateSequenceNumber {
        self.inner
            .update_queues
            .get(&ty)
            .map(|q| q.next_sequence)
            .unwrap_or(UpdateSequenceNumber::FIRST)
    }

    /// The protocol update that has crossed its effective time, if any.
    pub fn pending_protocol_update(&self) -> Option<&(Timestamp, ProtocolUpdate)> {
        self.inner.pending_protocol_update.as_ref()
    }

    /// Highest finalization index whose rewards this state has settled.
    pub fn settled_finalization_index(&self) -> FinalizationIndex {
        self.inner.settled_finalization_index
    }

    /// Effective time of the nearest protocol update, parked or still
    /// queued, if one exists.
    pub fn next_protocol_update_effective(&self) -> Option<Timestamp> {
        if let Some((t, _)) = &self.inner.pending_protocol_update {
            return Some(*t);
        }
        self.inner
            .update_queues
            .get(&UpdateType::Protocol)
            .and_then(|q| q.queue.first())
            .map(|u| u.effective_time)
    }

    /// The baker committee for `slot`.
    pub fn slot_bakers(&self, _slot: Slot) -> SlotBakers {
        // The committee is the active baker set; stake snapshots are taken
        // at epoch boundaries by the seed-state transition.
        self.inner.active_bakers()
    }

    /// The committee for `slot`, but only if the answer cannot change under
    /// any still-unresolved update in the queue.
    ///
    /// Returns `None` when a protocol update could take effect at or before
    /// the slot's time, or when the slot's epoch is beyond the next epoch
    /// (membership there depends on blocks not yet baked).
    pub fn definite_slot_bakers(&self, slot: Slot, slot_time: Timestamp) -> Option<SlotBakers> {
        if let Some((effective, _)) = &self.inner.pending_protocol_update {
            if *effective <= slot_time {
                return None;
            }
        }
        if let Some(q) = self.inner.update_queues.get(&UpdateType::Protocol) {
            if q.queue.iter().any(|u| u.effective_time <= slot_time) {
                return None;
            }
        }
        let seed = &self.inner.seed_state;
        if seed.epoch_of(slot) > seed.epoch.next() {
            return None;
        }
        Some(self.inner.active_bakers())
    }

    /// Check the supply conservation identity. Pending baker rewards are
    /// funds held on the baker records between accrual and payday.
    pub fn verify_total_supply(&self) -> bool {
        let accounts: u64 = self.inner.accounts.values().map(|a| a.balance.0).sum();
        let instances: u64 = self.inner.instances.values().map(|i| i.balance.0).sum();
        let pending: u64 = self.inner.bakers.values().map(|b| b.pending_reward.0).sum();
        let r = &self.inner.reward_accounts;
        accounts + instances + pending + r.baking_reward.0 + r.finalization_reward.0
            + r.gas_account.0
            + r.total_encrypted.0
            == r.total_gtu.0
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.inner.accounts.len()
    }

    /// Iterate accounts in address order.
    pub fn accounts(&self) -> impl Iterator<Item = &Arc<Account>> {
        self.inner.accounts.values()
    }

    /// Iterate active bakers.
    pub fn bakers(&self) -> impl Iterator<Item = &Arc<Baker>> {
        self.inner.bakers.values()
    }

    /// Whether `key` is an active aggregation key.
    pub fn has_aggregation_key(&self, key: &PublicKey) -> bool {
        self.inner.active_aggregation_keys.contains(&key.0)
    }

    /// Whether an identity provider id is recognized.
    pub fn has_identity_provider(&self, id: u32) -> bool {
        self.inner.identity_providers.contains(&id)
    }

    /// Whether an anonymity revoker id is recognized.
    pub fn has_anonymity_revoker(&self, id: u32) -> bool {
        self.inner.anonymity_revokers.contains(&id)
    }

    pub(crate) fn inner(&self) -> &StateInner {
        &self.inner
    }

    /// Rebuild a snapshot from a deserialized inner table set.
    pub(crate) fn from_inner(inner: StateInner) -> Self {
        let hash = inner.compute_hash();
        BlockState {
            inner: Arc::new(inner),
            hash,
            archived: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serialize for the per-era block-state segment.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(&*self.inner).map_err(|e| StateError::Storage(e.to_string()))
    }

    /// Reload a persisted snapshot. The structural hash is recomputed, so a
    /// corrupted segment surfaces as a hash mismatch at the caller.
    pub fn from_bytes(bytes: &[u8]) -> Result<BlockState, StateError> {
        let inner: StateInner =
            bincode::deserialize(bytes).map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(BlockState::from_inner(inner))
    }
}

/// A mutable workspace opened by [`BlockState::thaw`].
#[derive(Debug)]
pub struct MutableState {
    inner: StateInner,
}

impl MutableState {
    /// The era's protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.inner.protocol_version
    }

    /// Commit to an immutable snapshot, computing the structural hash.
    pub fn freeze(self) -> BlockState {
        BlockState::from_inner(self.inner)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accounts
    // ═══════════════════════════════════════════════════════════════════════

    /// Read an account.
    pub fn get_account(&self, address: &AccountAddress) -> Option<&Arc<Account>> {
        self.inner.accounts.get(address)
    }

    /// Mutable access to an account; copies the shared entry on first write.
    pub fn account_mut(&mut self, address: &AccountAddress) -> Result<&mut Account, StateError> {
        self.inner
            .accounts
            .get_mut(address)
            .map(Arc::make_mut)
            .ok_or(StateError::NotFound)
    }

    /// Whether a credential registration id has ever been used.
    pub fn credential_exists(&self, reg_id: &CredentialRegistrationId) -> bool {
        self.inner.accounts_by_credential.contains_key(reg_id)
    }

    /// Create the account a credential deployment describes.
    ///
    /// The registration id must be fresh; the new account starts at balance
    /// zero with the credential's verification key.
    pub fn create_account(
        &mut self,
        credential: &CredentialDeployment,
    ) -> Result<AccountAddress, StateError> {
        if self.credential_exists(&credential.reg_id) {
            return Err(StateError::NotFound);
        }
        let address = credential.account_address();
        let index = self.inner.next_account_index;
        self.inner.next_account_index += 1;
        let account = Account {
            address,
            index,
            balance: Amount::ZERO,
            next_nonce: Nonce::FIRST,
            verify_key: credential.verify_key,
            credentials: vec![credential.reg_id],
            release_schedule: Vec::new(),
            encrypted_balance: Amount::ZERO,
            baker: None,
            delegation: None,
        };
        self.inner.accounts.insert(address, Arc::new(account));
        self.inner.accounts_by_index.insert(index, address);
        self.inner
            .accounts_by_credential
            .insert(credential.reg_id, address);
        Ok(address)
    }

    /// Move `amount` from `from` to `to`. Fails without mutation when the
    /// source cannot cover it.
    pub fn transfer(
        &mut self,
        from: &AccountAddress,
        to: &AccountAddress,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), StateError> {
        let src = self.get_account(from).ok_or(StateError::NotFound)?;
        if src.spendable_balance(now) < amount {
            return Err(StateError::InsufficientFunds);
        }
        if !self.inner.accounts.contains_key(to) {
            return Err(StateError::NotFound);
        }
        {
            let src = self.account_mut(from)?;
            src.balance = src
                .balance
                .checked_sub(amount)
                .ok_or(StateError::InsufficientFunds)?;
        }
        let dst = self.account_mut(to)?;
        dst.balance += amount;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Modules and instances
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a module.
    pub fn get_module(&self, module_ref: &ModuleRef) -> Option<&Arc<Module>> {
        self.inner.modules.get(module_ref)
    }

    /// Register a deployed module. Duplicate deployments are idempotent
    /// (the reference is the content hash).
    pub fn put_module(&mut self, module: Module) -> ModuleRef {
        let module_ref = module.module_ref;
        self.inner
            .modules
            .entry(module_ref)
            .or_insert_with(|| Arc::new(module));
        module_ref
    }

    /// Read an instance.
    pub fn get_instance(&self, address: ContractAddress) -> Option<&Arc<Instance>> {
        if address.subindex != 0 {
            return None;
        }
        self.inner.instances.get(&address.index)
    }

    /// Mutable access to an instance.
    pub fn instance_mut(&mut self, address: ContractAddress) -> Result<&mut Instance, StateError> {
        if address.subindex != 0 {
            return Err(StateError::NotFound);
        }
        self.inner
            .instances
            .get_mut(&address.index)
            .map(Arc::make_mut)
            .ok_or(StateError::NotFound)
    }

    /// Create a new instance, assigning the next address.
    pub fn create_instance(
        &mut self,
        module_ref: ModuleRef,
        init_name: String,
        init_params: Vec<u8>,
        state: Vec<u8>,
        balance: Amount,
        owner: AccountAddress,
    ) -> ContractAddress {
        let address = ContractAddress::new(self.inner.next_instance_index);
        self.inner.next_instance_index += 1;
        let instance = Instance {
            address,
            module_ref,
            init_name,
            init_params,
            state,
            balance,
            owner,
        };
        self.inner.instances.insert(address.index, Arc::new(instance));
        address
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Bakers
    // ═══════════════════════════════════════════════════════════════════════

    /// Register `owner` as a baker, or update its keys and stake.
    ///
    /// A fresh registration takes the next baker id. The aggregation key
    /// must not be in active use by another baker.
    pub fn configure_baker(
        &mut self,
        owner: &AccountAddress,
        stake: Amount,
        election_key: PublicKey,
        signature_key: PublicKey,
        aggregation_key: PublicKey,
    ) -> Result<BakerId, StateError> {
        let existing = self.get_account(owner).ok_or(StateError::NotFound)?.baker;
        if let Some(id) = existing {
            // Key rotation: release the old aggregation key first.
            let old = self.inner.bakers.get(&id).cloned().ok_or(StateError::NotFound)?;
            if old.aggregation_key != aggregation_key
                && self.inner.active_aggregation_keys.contains(&aggregation_key.0)
            {
                return Err(StateError::NotFound);
            }
            self.inner.active_aggregation_keys.remove(&old.aggregation_key.0);
            self.inner.active_aggregation_keys.insert(aggregation_key.0);
            let baker = self.inner.bakers.get_mut(&id).map(Arc::make_mut).ok_or(StateError::NotFound)?;
            baker.stake = stake;
            baker.election_key = election_key;
            baker.signature_key = signature_key;
            baker.aggregation_key = aggregation_key;
            baker.cooldown_until = None;
            return Ok(id);
        }
        if self.inner.active_aggregation_keys.contains(&aggregation_key.0) {
            return Err(StateError::NotFound);
        }
        let id = self.inner.next_baker_id;
        self.inner.next_baker_id = self.inner.next_baker_id.next();
        let baker = Baker {
            id,
            owner: *owner,
            stake,
            election_key,
            signature_key,
            aggregation_key,
            cooldown_until: None,
            pending_reward: Amount::ZERO,
        };
        self.inner.bakers.insert(id, Arc::new(baker));
        self.inner.active_aggregation_keys.insert(aggregation_key.0);
        self.account_mut(owner)?.baker = Some(id);
        Ok(id)
    }

    /// Deregister `owner`'s baker; the stake unlocks after the cooldown.
    pub fn remove_baker(&mut self, owner: &AccountAddress) -> Result<BakerId, StateError> {
        let id = self
            .get_account(owner)
            .ok_or(StateError::NotFound)?
            .baker
            .ok_or(StateError::NotFound)?;
        let cooldown = self.inner.chain_parameters.baker_cooldown_epochs;
        let current_epoch = self.inner.seed_state.epoch;
        {
            let baker = self
                .inner
                .bakers
                .get_mut(&id)
                .map(Arc::make_mut)
                .ok_or(StateError::NotFound)?;
            baker.cooldown_until = Some(Epoch(current_epoch.0 + cooldown.0));
            let agg = baker.aggregation_key;
            self.inner.active_aggregation_keys.remove(&agg.0);
        }
        self.account_mut(owner)?.baker = None;
        Ok(id)
    }

    /// Drop bakers whose cooldown has passed as of `epoch`.
    pub fn expire_cooldowns(&mut self, epoch: Epoch) {
        self.inner
            .bakers
            .retain(|_, b| b.cooldown_until.map(|c| c > epoch).unwrap_or(true));
    }

    /// Baker by id.
    pub fn get_baker(&self, id: BakerId) -> Option<&Arc<Baker>> {
        self.inner.bakers.get(&id)
    }

    /// Move a baker's share out of the baking-reward pool into its pending
    /// reward, held on the baker record until the next payday.
    pub fn accrue_baker_reward(&mut self, id: BakerId, amount: Amount) -> Result<(), StateError> {
        self.inner.reward_accounts.baking_reward = self
            .inner
            .reward_accounts
            .baking_reward
            .checked_sub(amount)
            .ok_or(StateError::InsufficientFunds)?;
        let baker = self
            .inner
            .bakers
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(StateError::NotFound)?;
        baker.pending_reward += amount;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rewards and fees
    // ═══════════════════════════════════════════════════════════════════════

    /// Split an execution fee across the three reward accounts: the GAS
    /// fraction off the top, the remainder between the baking and
    /// finalization pools in proportion to their fractions. Rounding dust
    /// lands in the baking pool. The fee has already been debited from the
    /// payer.
    pub fn distribute_fee(&mut self, fee: Amount) -> FeeSplit {
        let params = &self.inner.chain_parameters.reward_parameters;
        let to_gas = Amount((fee.0 as u128 * params.gas_account_fraction as u128 / 100_000) as u64);
        let rest = fee.0 - to_gas.0;
        let reward_weight =
            params.baking_reward_fraction as u128 + params.finalization_reward_fraction as u128;
        let to_finalization = if reward_weight == 0 {
            Amount::ZERO
        } else {
            Amount(
                (rest as u128 * params.finalization_reward_fraction as u128 / reward_weight)
                    as u64,
            )
        };
        let to_baking = Amount(rest - to_finalization.0);
        self.inner.reward_accounts.gas_account += to_gas;
        self.inner.reward_accounts.baking_reward += to_baking;
        self.inner.reward_accounts.finalization_reward += to_finalization;
        FeeSplit {
            gas: to_gas,
            baking: to_baking,
            finalization: to_finalization,
        }
    }

    /// Settle one finalization record's rewards: every listed signer gets
    /// an equal share of the finalization-reward pool, moved into its
    /// pending reward. Signers without a baker record forfeit their share
    /// back to the pool. Records at or below the already-settled index are
    /// ignored, so replays cannot double-pay.
    pub fn settle_finalization_rewards(
        &mut self,
        index: FinalizationIndex,
        signers: &[BakerId],
    ) -> Amount {
        if index <= self.inner.settled_finalization_index {
            return Amount::ZERO;
        }
        self.inner.settled_finalization_index = index;
        if signers.is_empty() {
            return Amount::ZERO;
        }
        let share = Amount(self.inner.reward_accounts.finalization_reward.0 / signers.len() as u64);
        let mut credited = Amount::ZERO;
        for signer in signers {
            if let Some(baker) = self.inner.bakers.get_mut(signer).map(Arc::make_mut) {
                baker.pending_reward += share;
                credited += share;
            }
        }
        self.inner.reward_accounts.finalization_reward = self
            .inner
            .reward_accounts
            .finalization_reward
            .checked_sub(credited)
            .unwrap_or(Amount::ZERO);
        credited
    }

    /// Payday: pay every baker's pending reward into its owner account and
    /// zero the claims. Runs at epoch boundaries during block execution.
    pub fn payday(&mut self) -> Amount {
        let due: Vec<(AccountAddress, BakerId, Amount)> = self
            .inner
            .bakers
            .values()
            .filter(|b| b.pending_reward > Amount::ZERO)
            .map(|b| (b.owner, b.id, b.pending_reward))
            .collect();
        let mut paid = Amount::ZERO;
        for (owner, id, amount) in due {
            // An owner without an account cannot happen for a registered
            // baker; a missing entry just leaves the claim standing.
            if self.inner.accounts.contains_key(&owner) {
                if let Ok(account) = self.account_mut(&owner) {
                    account.balance += amount;
                }
                if let Some(baker) = self.inner.bakers.get_mut(&id).map(Arc::make_mut) {
                    baker.pending_reward = Amount::ZERO;
                }
                paid += amount;
            }
        }
        paid
    }

    /// Read reward accounts.
    pub fn reward_accounts(&self) -> &RewardAccounts {
        &self.inner.reward_accounts
    }

    /// Highest finalization index whose rewards this state has settled.
    pub fn settled_finalization_index(&self) -> FinalizationIndex {
        self.inner.settled_finalization_index
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Seed state and chain updates
    // ═══════════════════════════════════════════════════════════════════════

    /// The seed state.
    pub fn seed_state(&self) -> &SeedState {
        &self.inner.seed_state
    }

    /// Replace the seed state (computed by the execution pipeline).
    pub fn set_seed_state(&mut self, seed: SeedState) {
        self.inner.seed_state = seed;
    }

    /// Chain parameters.
    pub fn chain_parameters(&self) -> &ChainParameters {
        &self.inner.chain_parameters
    }

    /// Next admissible sequence number for an update type.
    pub fn next_update_sequence(&self, ty: UpdateType) -> UpdateSequenceNumber {
        self.inner
            .update_queues
            .get(&ty)
            .map(|q| q.next_sequence)
            .unwrap_or(UpdateSequenceNumber::FIRST)
    }

    /// Governance keys and signature threshold.
    pub fn governance(&self) -> (&[PublicKey], u32) {
        (&self.inner.governance_keys, self.inner.governance_threshold)
    }

    /// Enqueue a chain update at the next sequence number of its type.
    pub fn enqueue_update(&mut self, effective_time: Timestamp, payload: UpdatePayload) {
        let queue = self
            .inner
            .update_queues
            .entry(payload.update_type())
            .or_default();
        queue.next_sequence = queue.next_sequence.next();
        queue.queue.push(QueuedUpdate {
            effective_time,
            payload,
        });
        queue
            .queue
            .sort_by_key(|u| u.effective_time);
    }

    /// Apply every queued update whose effective time has passed.
    ///
    /// Parameter updates mutate the chain parameters in order. A protocol
    /// update does not change parameters; it parks in
    /// `pending_protocol_update`, which shuts down consensus until the era's
    /// terminal block is finalized. Only the first protocol update to cross
    /// its effective time sticks.
    pub fn apply_updates_until(&mut self, now: Timestamp) {
        for (_, queue) in self.inner.update_queues.iter_mut() {
            let due: Vec<QueuedUpdate> = {
                let (due, rest): (Vec<_>, Vec<_>) = queue
                    .queue
                    .drain(..)
                    .partition(|u| u.effective_time <= now);
                queue.queue = rest;
                due
            };
            for update in due {
                match update.payload {
                    UpdatePayload::ElectionDifficulty(d) => {
                        self.inner.chain_parameters.election_difficulty = d;
                    }
                    UpdatePayload::EuroPerEnergy(r) => {
                        self.inner.chain_parameters.euro_per_energy = r;
                    }
                    UpdatePayload::MicroGtuPerEuro(r) => {
                        self.inner.chain_parameters.micro_gtu_per_euro = r;
                    }
                    UpdatePayload::RewardParameters(p) => {
                        self.inner.chain_parameters.reward_parameters = p;
                    }
                    UpdatePayload::MinimumBakerStake(a) => {
                        self.inner.chain_parameters.minimum_baker_stake = a;
                    }
                    UpdatePayload::Protocol(p) => {
                        // Only the first protocol update to take effect
                        // matters; the era ends before any later one could.
                        if self.inner.pending_protocol_update.is_none() {
                            info!(
                                effective = %update.effective_time,
                                next_version = %p.next_version,
                                "Protocol update took effect"
                            );
                            self.inner.pending_protocol_update =
                                Some((update.effective_time, p));
                        }
                    }
                }
            }
        }
    }

    /// The protocol update that has crossed its effective time, if any.
    pub fn pending_protocol_update(&self) -> Option<&(Timestamp, ProtocolUpdate)> {
        self.inner.pending_protocol_update.as_ref()
    }
}

/// Convert an energy amount to a GTU fee under the current exchange rates.
pub fn energy_to_gtu(params: &ChainParameters, energy: tessera_types::Energy) -> Amount {
    let euro = energy.0 as u128 * params.euro_per_energy.numerator as u128;
    let micro_gtu = euro * params.micro_gtu_per_euro.numerator as u128
        / (params.euro_per_energy.denominator as u128
            * params.micro_gtu_per_euro.denominator as u128);
    Amount(micro_gtu as u64)
}

/// Build the initial block state of era 0 from a genesis record.
///
/// Fails with `VersionMismatch` when handed a regenesis record: those
/// states come out of [`migrate_for_regenesis`], not account lists.
pub fn genesis_state(genesis: &GenesisData) -> Result<BlockState, StateError> {
    let GenesisData::Initial {
        core,
        protocol_version,
        leadership_election_nonce,
        accounts,
        governance_keys,
        governance_threshold,
        identity_providers,
        anonymity_revokers,
        chain_parameters,
    } = genesis
    else {
        return Err(StateError::Storage(
            "regenesis record cannot seed an initial state".to_string(),
        ));
    };

    let mut inner = StateInner {
        protocol_version: *protocol_version,
        accounts: BTreeMap::new(),
        accounts_by_index: BTreeMap::new(),
        accounts_by_credential: BTreeMap::new(),
        next_account_index: 0,
        instances: BTreeMap::new(),
        next_instance_index: 0,
        modules: BTreeMap::new(),
        bakers: BTreeMap::new(),
        next_baker_id: BakerId(0),
        active_aggregation_keys: BTreeSet::new(),
        reward_accounts: RewardAccounts {
            baking_reward: Amount::ZERO,
            finalization_reward: Amount::ZERO,
            gas_account: Amount::ZERO,
            total_encrypted: Amount::ZERO,
            total_gtu: Amount::ZERO,
        },
        seed_state: SeedState::genesis(*leadership_election_nonce, core.epoch_length),
        chain_parameters: chain_parameters.clone(),
        governance_keys: governance_keys.clone(),
        governance_threshold: *governance_threshold,
        identity_providers: identity_providers.iter().copied().collect(),
        anonymity_revokers: anonymity_revokers.iter().copied().collect(),
        update_queues: BTreeMap::new(),
        pending_protocol_update: None,
        settled_finalization_index: FinalizationIndex(0),
    };

    let mut total = 0u64;
    for (i, ga) in accounts.iter().enumerate() {
        let index = i as u64;
        let mut account = Account {
            address: ga.address,
            index,
            balance: ga.balance,
            next_nonce: Nonce::FIRST,
            verify_key: ga.verify_key,
            credentials: Vec::new(),
            release_schedule: Vec::new(),
            encrypted_balance: Amount::ZERO,
            baker: None,
            delegation: None,
        };
        total += ga.balance.0;
        if let Some(gb) = &ga.baker {
            account.baker = Some(gb.baker_id);
            let baker = Baker {
                id: gb.baker_id,
                owner: ga.address,
                stake: gb.stake,
                election_key: gb.election_key,
                signature_key: gb.signature_key,
                aggregation_key: gb.aggregation_key,
                cooldown_until: None,
                pending_reward: Amount::ZERO,
            };
            inner.active_aggregation_keys.insert(gb.aggregation_key.0);
            if gb.baker_id >= inner.next_baker_id {
                inner.next_baker_id = gb.baker_id.next();
            }
            inner.bakers.insert(gb.baker_id, Arc::new(baker));
        }
        inner.accounts_by_index.insert(index, ga.address);
        inner.accounts.insert(ga.address, Arc::new(account));
    }
    inner.next_account_index = accounts.len() as u64;
    inner.reward_accounts.total_gtu = Amount(total);

    Ok(BlockState::from_inner(inner))
}

/// Migrate an era's terminal state into the next era's initial state.
///
/// Re-keys the seed state, clears the pending protocol update, empties the
/// update queues (sequence numbers carry over so old signed updates cannot
/// replay), runs per-version migrations, and freezes. The terminal epoch's
/// bakers, pending rewards included, carry into the new era's first epoch.
pub fn migrate_for_regenesis(
    terminal: &BlockState,
    target: ProtocolVersion,
) -> Result<BlockState, StateError> {
    let mut state = terminal.thaw()?;
    info!(from = %terminal.protocol_version(), to = %target, "Migrating state for regenesis");
    state.inner.seed_state = state.inner.seed_state.regenesis();
    state.inner.pending_protocol_update = None;
    // The new era's finalization list restarts at its own genesis record.
    state.inner.settled_finalization_index = FinalizationIndex(0);
    for (_, queue) in state.inner.update_queues.iter_mut() {
        queue.queue.clear();
    }
    apply_version_migrations(&mut state.inner, terminal.protocol_version(), target);
    state.inner.protocol_version = target;
    Ok(state.freeze())
}

/// Per-version account and stake migrations.
fn apply_version_migrations(inner: &mut StateInner, from: ProtocolVersion, to: ProtocolVersion) {
    if from < ProtocolVersion::P2 && to >= ProtocolVersion::P2 {
        // P2 introduces delegation. Any stake a P1 state recorded outside a
        // baker is folded back into the owning account as undelegated.
        for account in inner.accounts.values_mut() {
            Arc::make_mut(account).delegation = None;
        }
    }
    // P2 -> P3 changes only the outcome hashing mode; no state migration.
    let _ = (from, to);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_address, test_keypair, test_vrf_keypair};
    use tessera_types::{
        CoreGenesisParameters, ExchangeRate, FinalizationParameters, GenesisAccount, GenesisBaker,
        RewardParameters,
    };

    pub(crate) fn sample_genesis() -> GenesisData {
        GenesisData::Initial {
            core: CoreGenesisParameters {
                genesis_time: Timestamp(0),
                slot_duration_millis: 1_000,
                epoch_length: 100,
                max_block_energy: tessera_types::Energy(3_000_000),
                finalization_parameters: FinalizationParameters {
                    committee_stake_fraction: 100,
                    committee_max_size: 1_000,
                },
            },
            protocol_version: ProtocolVersion::P1,
            leadership_election_nonce: Hash::digest(b"len"),
            accounts: vec![
                GenesisAccount {
                    address: test_address(1),
                    balance: Amount(1_000_000),
                    verify_key: test_keypair(1).public(),
                    baker: Some(GenesisBaker {
                        baker_id: BakerId(0),
                        stake: Amount(500_000),
                        election_key: test_vrf_keypair(1).public(),
                        signature_key: test_keypair(1).public(),
                        aggregation_key: test_keypair(11).public(),
                    }),
                },
                GenesisAccount {
                    address: test_address(2),
                    balance: Amount(250_000),
                    verify_key: test_keypair(2).public(),
                    baker: None,
                },
            ],
            governance_keys: vec![test_keypair(9).public()],
            governance_threshold: 1,
            identity_providers: vec![0],
            anonymity_revokers: vec![0],
            chain_parameters: ChainParameters {
                election_difficulty: ElectionDifficulty(100_000),
                euro_per_energy: ExchangeRate {
                    numerator: 1,
                    denominator: 1_000,
                },
                micro_gtu_per_euro: ExchangeRate {
                    numerator: 1_000,
                    denominator: 1,
                },
                baker_cooldown_epochs: Epoch(2),
                minimum_baker_stake: Amount(1_000),
                reward_parameters: RewardParameters {
                    baking_reward_fraction: 60_000,
                    finalization_reward_fraction: 30_000,
                    gas_account_fraction: 25_000,
                },
            },
        }
    }

    #[test]
    fn genesis_state_conserves_supply() {
        let state = genesis_state(&sample_genesis()).unwrap();
        assert!(state.verify_total_supply());
        assert_eq!(state.reward_accounts().total_gtu, Amount(1_250_000));
        assert_eq!(state.account_count(), 2);
    }

    #[test]
    fn freeze_thaw_without_mutation_preserves_hash() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let refrozen = state.thaw().unwrap().freeze();
        assert_eq!(state.hash(), refrozen.hash());
    }

    #[test]
    fn transfer_moves_balance_and_conserves_supply() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.transfer(&test_address(1), &test_address(2), Amount(100), Timestamp(0))
            .unwrap();
        let frozen = m.freeze();
        assert_eq!(
            frozen.get_account(&test_address(1)).unwrap().balance,
            Amount(999_900)
        );
        assert_eq!(
            frozen.get_account(&test_address(2)).unwrap().balance,
            Amount(250_100)
        );
        assert!(frozen.verify_total_supply());
        assert_ne!(frozen.hash(), state.hash());
    }

    #[test]
    fn archived_state_cannot_thaw() {
        let state = genesis_state(&sample_genesis()).unwrap();
        state.archive();
        assert!(matches!(state.thaw(), Err(StateError::Archived)));
        // Reads keep working.
        assert!(state.get_account(&test_address(1)).is_some());
    }

    #[test]
    fn thaw_for_checks_version() {
        let state = genesis_state(&sample_genesis()).unwrap();
        assert!(matches!(
            state.thaw_for(ProtocolVersion::P2),
            Err(StateError::VersionMismatch { .. })
        ));
        assert!(state.thaw_for(ProtocolVersion::P1).is_ok());
    }

    #[test]
    fn election_difficulty_applies_queued_updates_by_time() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.enqueue_update(
            Timestamp(500),
            UpdatePayload::ElectionDifficulty(ElectionDifficulty(10_000)),
        );
        let frozen = m.freeze();
        assert_eq!(
            frozen.election_difficulty_at(Timestamp(499)),
            ElectionDifficulty(100_000)
        );
        assert_eq!(
            frozen.election_difficulty_at(Timestamp(500)),
            ElectionDifficulty(10_000)
        );
    }

    #[test]
    fn protocol_update_parks_and_blocks_definite_bakers() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.enqueue_update(
            Timestamp(1_000),
            UpdatePayload::Protocol(ProtocolUpdate {
                next_version: ProtocolVersion::P2,
                specification_hash: Hash::digest(b"spec"),
                auxiliary_data: vec![],
            }),
        );
        // Queued but not yet effective: definite bakers unavailable at or
        // past the effective time.
        let frozen = m.freeze();
        assert!(frozen.definite_slot_bakers(Slot(0), Timestamp(999)).is_some());
        assert!(frozen.definite_slot_bakers(Slot(1), Timestamp(1_000)).is_none());

        let mut m = frozen.thaw().unwrap();
        m.apply_updates_until(Timestamp(1_000));
        assert!(m.pending_protocol_update().is_some());
    }

    #[test]
    fn regenesis_migration_rekeys_seed_and_clears_updates() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.enqueue_update(
            Timestamp(100),
            UpdatePayload::Protocol(ProtocolUpdate {
                next_version: ProtocolVersion::P2,
                specification_hash: Hash::digest(b"spec"),
                auxiliary_data: vec![],
            }),
        );
        m.apply_updates_until(Timestamp(100));
        let terminal = m.freeze();

        let migrated = migrate_for_regenesis(&terminal, ProtocolVersion::P2).unwrap();
        assert_eq!(migrated.protocol_version(), ProtocolVersion::P2);
        assert!(migrated.pending_protocol_update().is_none());
        assert_eq!(
            migrated.seed_state().current_nonce,
            terminal.seed_state().regenesis().current_nonce
        );
        assert_eq!(migrated.seed_state().epoch, Epoch(0));
        // Sequence numbers carry over; queues are empty.
        assert_eq!(
            migrated.next_update_sequence(UpdateType::Protocol),
            UpdateSequenceNumber(2)
        );
        // Bakers carry into the new era.
        assert_eq!(migrated.bakers().count(), 1);
        assert!(migrated.verify_total_supply());
    }

    #[test]
    fn baker_lifecycle_and_aggregation_key_closure() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();

        // Duplicate aggregation key is rejected.
        assert!(m
            .configure_baker(
                &test_address(2),
                Amount(10_000),
                test_vrf_keypair(2).public(),
                test_keypair(2).public(),
                test_keypair(11).public(), // already used by baker 0
            )
            .is_err());

        let id = m
            .configure_baker(
                &test_address(2),
                Amount(10_000),
                test_vrf_keypair(2).public(),
                test_keypair(2).public(),
                test_keypair(12).public(),
            )
            .unwrap();
        assert_eq!(id, BakerId(1));

        m.remove_baker(&test_address(2)).unwrap();
        let frozen = m.freeze();
        assert!(frozen.get_account(&test_address(2)).unwrap().baker.is_none());
        assert!(!frozen.has_aggregation_key(&test_keypair(12).public()));
        // Cooldown: the record remains but is inactive.
        assert_eq!(frozen.slot_bakers(Slot(0)).bakers.len(), 1);
    }

    #[test]
    fn fee_distribution_funds_all_three_pools() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        // Debit the fee from an account first so supply stays conserved.
        m.account_mut(&test_address(1)).unwrap().balance = Amount(1_000_000 - 1_000);
        let split = m.distribute_fee(Amount(1_000));
        // 25% gas off the top; the remaining 750 splits 60 000:30 000
        // between baking and finalization.
        assert_eq!(split.gas, Amount(250));
        assert_eq!(split.finalization, Amount(250));
        assert_eq!(split.baking, Amount(500));
        let frozen = m.freeze();
        assert_eq!(frozen.reward_accounts().gas_account, Amount(250));
        assert_eq!(frozen.reward_accounts().baking_reward, Amount(500));
        assert_eq!(frozen.reward_accounts().finalization_reward, Amount(250));
        assert!(frozen.verify_total_supply());
    }

    #[test]
    fn baker_accrual_moves_pool_into_pending_reward() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.account_mut(&test_address(1)).unwrap().balance = Amount(1_000_000 - 1_000);
        let split = m.distribute_fee(Amount(1_000));
        m.accrue_baker_reward(BakerId(0), split.baking).unwrap();

        assert_eq!(m.reward_accounts().baking_reward, Amount::ZERO);
        assert_eq!(m.get_baker(BakerId(0)).unwrap().pending_reward, Amount(500));
        // The pool cannot be overdrawn.
        assert!(matches!(
            m.accrue_baker_reward(BakerId(0), Amount(1)),
            Err(StateError::InsufficientFunds)
        ));
        assert!(m.freeze().verify_total_supply());
    }

    #[test]
    fn finalization_settlement_credits_signers_once() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.account_mut(&test_address(1)).unwrap().balance = Amount(1_000_000 - 1_000);
        m.distribute_fee(Amount(1_000)); // finalization pool: 250

        let credited =
            m.settle_finalization_rewards(FinalizationIndex(1), &[BakerId(0), BakerId(9)]);
        // Baker 9 does not exist; its share stays in the pool.
        assert_eq!(credited, Amount(125));
        assert_eq!(m.get_baker(BakerId(0)).unwrap().pending_reward, Amount(125));
        assert_eq!(m.reward_accounts().finalization_reward, Amount(125));
        assert_eq!(m.settled_finalization_index(), FinalizationIndex(1));

        // Replaying the same record settles nothing.
        assert_eq!(
            m.settle_finalization_rewards(FinalizationIndex(1), &[BakerId(0)]),
            Amount::ZERO
        );
        assert!(m.freeze().verify_total_supply());
    }

    #[test]
    fn payday_pays_pending_into_owner_account() {
        let state = genesis_state(&sample_genesis()).unwrap();
        let mut m = state.thaw().unwrap();
        m.account_mut(&test_address(1)).unwrap().balance = Amount(1_000_000 - 1_000);
        let split = m.distribute_fee(Amount(1_000));
        m.accrue_baker_reward(BakerId(0), split.baking).unwrap();
        m.settle_finalization_rewards(FinalizationIndex(1), &[BakerId(0)]);

        let paid = m.payday();
        assert_eq!(paid, Amount(750)); // 500 baking + 250 finalization
        assert_eq!(m.get_baker(BakerId(0)).unwrap().pending_reward, Amount::ZERO);
        // Baker 0 belongs to account 1 in the fixture.
        assert_eq!(
            m.get_account(&test_address(1)).unwrap().balance,
            Amount(1_000_000 - 1_000 + 750)
        );
        // A second payday is a no-op.
        assert_eq!(m.payday(), Amount::ZERO);
        assert!(m.freeze().verify_total_supply());
    }
}
