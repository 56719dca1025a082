//! Versioned per-block chain state.
//!
//! This crate owns the block-state side of the consensus core's contract:
//! accounts, contract instances and modules, bakers and delegators, reward
//! accounts, the leadership-election seed state, chain parameters and the
//! update queues. A snapshot is immutable and hash-addressed; execution
//! thaws a parent snapshot, mutates the workspace, and freezes the child.
//!
//! The structural state hash is the Merkle root over the entity-table
//! roots, so two implementations agreeing on content agree on the hash.

mod account;
mod cache;
mod contract;
mod state;

pub use account::{Account, Baker, Delegation, ScheduledRelease};
pub use cache::{StateCaches, DEFAULT_ACCOUNTS_CACHE_SIZE, DEFAULT_MODULES_CACHE_SIZE};
pub use contract::{Instance, Module};
pub use state::{
    energy_to_gtu, genesis_state, migrate_for_regenesis, BlockState, FeeSplit, MutableState,
    RewardAccounts, SlotBakers, StateError, UpdateQueue,
};
