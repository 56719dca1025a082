//! Transaction scheduling: executing a block's items against its parent
//! state.
//!
//! Execution is all-or-nothing at the block level: an item that cannot even
//! be charged (unknown sender, wrong nonce, bad signature, expired) makes
//! the whole block invalid; an honest baker never includes it. An item
//! that is chargeable but fails (insufficient funds, missing contract,
//! engine trap) produces a `Rejected` outcome: the fee is taken, the nonce
//! advances, nothing else changes.

use crate::callbacks::{ContractEngine, EngineCall};
use crate::verify::base_energy_cost;
use std::sync::Arc;
use tessera_state::{energy_to_gtu, BlockState, Module, MutableState, StateError};
use tessera_types::{
    outcomes_hash, Address, Amount, BakerId, BlockItem, BlockItemKind, Energy, Event,
    FinalizationIndex, Hash, NormalTransaction, OutcomeResult, Payload, RejectReason, Slot,
    Timestamp, TransactionOutcome, VrfProof,
};
use tracing::{debug, instrument, warn};

/// Why a block failed execution. All of these mark the block dead.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("Sender account does not exist")]
    UnknownSender,

    #[error("Transaction nonce does not match the account")]
    BadNonce,

    #[error("Transaction signature does not verify")]
    BadSignature,

    #[error("Transaction expired before the block's slot time")]
    Expired,

    #[error("Sender cannot cover the declared fee")]
    UndepositableFee,

    #[error("Block exceeds the energy budget")]
    EnergyOverBudget,

    #[error("Credential deployment is not admissible in this block")]
    BadCredential,

    #[error("Chain update is not admissible in this block")]
    BadUpdate,

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Inputs of one block execution.
pub struct ExecutionContext<'a> {
    pub engine: &'a dyn ContractEngine,
    pub slot: Slot,
    /// Nominal wall-clock time of `slot`.
    pub slot_time: Timestamp,
    pub block_nonce: &'a VrfProof,
    pub max_block_energy: Energy,
    /// The block's baker, credited with the baking share of fees.
    pub baker: BakerId,
    /// Finalization records this block settles rewards for, ascending:
    /// every record between the parent state's settled index and the
    /// block's last-finalized pointer, with the signers the oracle reported.
    pub settlements: &'a [(FinalizationIndex, Vec<BakerId>)],
}

/// Result of a successful block execution.
pub struct ExecutedState {
    pub state: BlockState,
    pub outcomes: Vec<TransactionOutcome>,
    pub energy_used: Energy,
    /// Hash of `outcomes` under the era's protocol version.
    pub outcomes_hash: Hash,
}

/// Execute a block's items atomically against the parent state.
///
/// The update queues are advanced to the slot time first, then pending
/// finalization rewards settle and an epoch boundary pays the payday, then
/// each item runs in order, then the seed state advances. The frozen result
/// carries the structural state hash compared against the baker's claim.
#[instrument(skip_all, fields(slot = %ctx.slot, items = items.len()))]
pub fn execute_block_items(
    parent: &BlockState,
    items: &[Arc<BlockItem>],
    ctx: &ExecutionContext<'_>,
) -> Result<ExecutedState, ExecutionFailure> {
    let version = parent.protocol_version();
    let mut state = parent.thaw_for(version)?;

    state.apply_updates_until(ctx.slot_time);
    let epoch = state.seed_state().epoch_of(ctx.slot);
    state.expire_cooldowns(epoch);

    // Finalization rewards settle here, not when the record is processed:
    // the settling block names the record through its last-finalized
    // pointer, so every replica mutates the same state.
    for (index, signers) in ctx.settlements {
        state.settle_finalization_rewards(*index, signers);
    }
    if epoch > state.seed_state().epoch {
        let paid = state.payday();
        debug!(%epoch, %paid, "Payday at epoch boundary");
    }

    let mut outcomes = Vec::with_capacity(items.len());
    let mut energy_used = Energy(0);
    for item in items {
        let outcome = execute_item(&mut state, item, ctx)?;
        energy_used += outcome.energy_used;
        if energy_used > ctx.max_block_energy {
            return Err(ExecutionFailure::EnergyOverBudget);
        }
        outcomes.push(outcome);
    }

    let seed = state.seed_state().update(ctx.slot, ctx.block_nonce);
    state.set_seed_state(seed);

    let state = state.freeze();
    let outcomes_hash = outcomes_hash(version, &outcomes);
    Ok(ExecutedState {
        state,
        outcomes,
        energy_used,
        outcomes_hash,
    })
}

fn execute_item(
    state: &mut MutableState,
    item: &Arc<BlockItem>,
    ctx: &ExecutionContext<'_>,
) -> Result<TransactionOutcome, ExecutionFailure> {
    match item.kind() {
        BlockItemKind::Normal(tx) => execute_normal(state, item, tx, ctx),
        BlockItemKind::CredentialDeployment(cd) => {
            if cd.expiry < ctx.slot_time || !cd.verify_signature() {
                return Err(ExecutionFailure::BadCredential);
            }
            // create_account rejects a reused registration id.
            let address = state
                .create_account(cd)
                .map_err(|_| ExecutionFailure::BadCredential)?;
            Ok(TransactionOutcome {
                transaction_hash: item.hash(),
                energy_used: item.energy_limit(),
                result: OutcomeResult::Success(vec![Event::AccountCreated {
                    address,
                    reg_id: cd.reg_id,
                }]),
            })
        }
        BlockItemKind::ChainUpdate(up) => execute_chain_update(state, item, up, ctx),
    }
}

fn execute_chain_update(
    state: &mut MutableState,
    item: &Arc<BlockItem>,
    up: &tessera_types::ChainUpdate,
    ctx: &ExecutionContext<'_>,
) -> Result<TransactionOutcome, ExecutionFailure> {
    if up.timeout < ctx.slot_time {
        return Err(ExecutionFailure::BadUpdate);
    }
    if up.sequence_number != state.next_update_sequence(up.payload.update_type()) {
        return Err(ExecutionFailure::BadUpdate);
    }
    let (keys, threshold) = state.governance();
    if up.count_valid_signatures(keys) < threshold as usize {
        return Err(ExecutionFailure::BadUpdate);
    }
    state.enqueue_update(up.effective_time, up.payload.clone());
    Ok(TransactionOutcome {
        transaction_hash: item.hash(),
        energy_used: item.energy_limit(),
        result: OutcomeResult::Success(vec![Event::UpdateEnqueued {
            effective_time: up.effective_time,
        }]),
    })
}

fn execute_normal(
    state: &mut MutableState,
    item: &Arc<BlockItem>,
    tx: &NormalTransaction,
    ctx: &ExecutionContext<'_>,
) -> Result<TransactionOutcome, ExecutionFailure> {
    if tx.expiry < ctx.slot_time {
        return Err(ExecutionFailure::Expired);
    }
    let account = state
        .get_account(&tx.sender)
        .ok_or(ExecutionFailure::UnknownSender)?;
    if tx.nonce != account.next_nonce {
        return Err(ExecutionFailure::BadNonce);
    }
    if !tx.verify_signature(&account.verify_key) {
        return Err(ExecutionFailure::BadSignature);
    }
    let max_fee = energy_to_gtu(state.chain_parameters(), tx.energy_limit);
    if account.spendable_balance(ctx.slot_time) < max_fee {
        return Err(ExecutionFailure::UndepositableFee);
    }
    if tx.energy_limit < base_energy_cost(item) {
        return Err(ExecutionFailure::EnergyOverBudget);
    }

    // Chargeable from here on: nonce advances and the fee is taken whatever
    // the payload does.
    let energy_used = base_energy_cost(item);
    let fee = energy_to_gtu(state.chain_parameters(), energy_used);
    {
        let account = state.account_mut(&tx.sender)?;
        account.next_nonce = account.next_nonce.next();
        account.balance = account
            .balance
            .checked_sub(fee)
            .ok_or(ExecutionFailure::UndepositableFee)?;
    }
    let split = state.distribute_fee(fee);
    // The baker won this slot, so its record exists in the executing state;
    // a failure here is a real invariant break and invalidates the block.
    state.accrue_baker_reward(ctx.baker, split.baking)?;

    let result = match apply_payload(state, tx, ctx) {
        Ok(events) => OutcomeResult::Success(events),
        Err(reason) => OutcomeResult::Rejected(reason),
    };

    Ok(TransactionOutcome {
        transaction_hash: item.hash(),
        energy_used,
        result,
    })
}

fn apply_payload(
    state: &mut MutableState,
    tx: &NormalTransaction,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Event>, RejectReason> {
    match &tx.payload {
        Payload::Transfer { to, amount } => {
            state
                .transfer(&tx.sender, to, *amount, ctx.slot_time)
                .map_err(|e| match e {
                    StateError::InsufficientFunds => RejectReason::InsufficientFunds,
                    _ => RejectReason::RuntimeFailure,
                })?;
            Ok(vec![Event::Transferred {
                from: Address::Account(tx.sender),
                to: Address::Account(*to),
                amount: *amount,
            }])
        }

        Payload::DeployModule { source } => {
            let entrypoints = ctx.engine.load_module(source)?;
            let module = Module::from_artifact(source.clone(), entrypoints);
            let module_ref = state.put_module(module);
            Ok(vec![Event::ModuleDeployed { module_ref }])
        }

        Payload::InitContract {
            amount,
            module_ref,
            init_name,
            param,
        } => {
            let module = state
                .get_module(module_ref)
                .cloned()
                .ok_or(RejectReason::InvalidModuleRef)?;
            if !module.entrypoints.iter().any(|e| e == init_name) {
                return Err(RejectReason::InvalidInitMethod);
            }
            let sender_balance = state
                .get_account(&tx.sender)
                .map(|a| a.spendable_balance(ctx.slot_time))
                .unwrap_or(Amount::ZERO);
            if sender_balance < *amount {
                return Err(RejectReason::InsufficientFunds);
            }
            let initial_state = ctx.engine.init(&module, init_name, param, *amount)?;
            {
                let account = state
                    .account_mut(&tx.sender)
                    .map_err(|_| RejectReason::RuntimeFailure)?;
                account.balance = account
                    .balance
                    .checked_sub(*amount)
                    .ok_or(RejectReason::InsufficientFunds)?;
            }
            let address = state.create_instance(
                *module_ref,
                init_name.clone(),
                param.to_vec(),
                initial_state,
                *amount,
                tx.sender,
            );
            Ok(vec![Event::ContractInitialized {
                address,
                module_ref: *module_ref,
                amount: *amount,
            }])
        }

        Payload::UpdateContract {
            amount,
            address,
            entrypoint,
            param,
        } => {
            let instance = state
                .get_instance(*address)
                .cloned()
                .ok_or(RejectReason::InvalidContractAddress)?;
            let module = state
                .get_module(&instance.module_ref)
                .cloned()
                .ok_or(RejectReason::InvalidModuleRef)?;
            if !module.entrypoints.iter().any(|e| e == entrypoint) {
                return Err(RejectReason::InvalidReceiveMethod);
            }
            let sender_balance = state
                .get_account(&tx.sender)
                .map(|a| a.spendable_balance(ctx.slot_time))
                .unwrap_or(Amount::ZERO);
            if sender_balance < *amount {
                return Err(RejectReason::InsufficientFunds);
            }

            let balance_after = instance.balance + *amount;
            let outcome = ctx.engine.update(EngineCall {
                module: &module,
                instance_state: &instance.state,
                entrypoint,
                param,
                amount: *amount,
                balance: balance_after,
                sender: tx.sender,
            })?;

            // Validate the engine's transfers before touching anything.
            let total_out: u64 = outcome.transfers_out.iter().map(|(_, a)| a.0).sum();
            if total_out > balance_after.0 {
                warn!(instance = %address, "Engine overdrew instance balance");
                return Err(RejectReason::RuntimeFailure);
            }
            for (recipient, _) in &outcome.transfers_out {
                if state.get_account(recipient).is_none() {
                    return Err(RejectReason::RuntimeFailure);
                }
            }

            // Apply: attach the amount, install the new state, pay out.
            {
                let account = state
                    .account_mut(&tx.sender)
                    .map_err(|_| RejectReason::RuntimeFailure)?;
                account.balance = account
                    .balance
                    .checked_sub(*amount)
                    .ok_or(RejectReason::InsufficientFunds)?;
            }
            let mut events = vec![Event::Updated {
                address: *address,
                amount: *amount,
            }];
            {
                let instance = state
                    .instance_mut(*address)
                    .map_err(|_| RejectReason::RuntimeFailure)?;
                instance.balance = Amount(balance_after.0 - total_out);
                instance.state = outcome.new_state;
            }
            for (recipient, transfer_amount) in outcome.transfers_out {
                let account = state
                    .account_mut(&recipient)
                    .map_err(|_| RejectReason::RuntimeFailure)?;
                account.balance += transfer_amount;
                events.push(Event::Transferred {
                    from: Address::Contract(*address),
                    to: Address::Account(recipient),
                    amount: transfer_amount,
                });
            }
            Ok(events)
        }

        Payload::ConfigureBaker {
            stake,
            election_key,
            signature_key,
            aggregation_key,
        } => {
            if *stake < state.chain_parameters().minimum_baker_stake {
                return Err(RejectReason::StakeUnderThreshold);
            }
            let spendable = state
                .get_account(&tx.sender)
                .map(|a| a.spendable_balance(ctx.slot_time))
                .unwrap_or(Amount::ZERO);
            if spendable < *stake {
                return Err(RejectReason::InsufficientFunds);
            }
            let baker_id = state
                .configure_baker(
                    &tx.sender,
                    *stake,
                    *election_key,
                    *signature_key,
                    *aggregation_key,
                )
                .map_err(|_| RejectReason::DuplicateAggregationKey)?;
            Ok(vec![Event::BakerConfigured {
                baker_id,
                stake: *stake,
            }])
        }

        Payload::RemoveBaker => {
            let baker_id = state
                .remove_baker(&tx.sender)
                .map_err(|_| RejectReason::NotABaker)?;
            Ok(vec![Event::BakerRemoved { baker_id }])
        }
    }
}
