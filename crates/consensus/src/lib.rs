//! The Tessera consensus core.
//!
//! This crate drives the tree state: the two-phase receive/execute block
//! pipeline, transaction admission, the finalization processor, catch-up
//! service, block construction, and protocol-update regenesis.
//!
//! # Architecture
//!
//! ```text
//! network bytes → receive_*() → UpdateResult (+ ExecuteBlock continuation)
//!                     │
//!                     └── execute_block() → tree mutation → callbacks
//! ```
//!
//! The [`Consensus`] value is a synchronous state machine: no I/O, no
//! clocks (time comes in as a parameter), no ambient state. The node layer
//! serializes access through a single coordinator and executes the outbound
//! callbacks; tests run several instances side by side and shuttle messages
//! between them directly.

mod baker;
mod callbacks;
mod catchup;
mod config;
mod consensus;
mod finalize;
mod protocol_update;
mod scheduler;
mod verify;

pub use baker::BakerIdentity;
pub use callbacks::{
    Callbacks, Capabilities, ContractEngine, EngineCall, EngineOutcome, FinalizationOracle,
    NullCallbacks, NullEngine, OracleOutcome, TrustingOracle,
};
pub use config::ConsensusConfig;
pub use consensus::{Consensus, ExecuteBlock};
pub use finalize::FinalizationSummary;
pub use scheduler::{execute_block_items, ExecutedState, ExecutionContext, ExecutionFailure};
pub use verify::{base_energy_cost, AdmissionVerifier, StateAdmission};
