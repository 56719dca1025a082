//! Block tree, transaction table and pending tables.
//!
//! This crate owns the in-memory tree state of one era: the status of every
//! known block, the live branches above the last-finalized block, the
//! finalization list, the focus block, and the transaction admission
//! indices. All mutation flows through the single coordinator; nothing here
//! locks.

mod pending_blocks;
mod pending_transactions;
mod skov;
mod statistics;
mod transaction_table;

pub use pending_blocks::PendingBlockTable;
pub use pending_transactions::{PendingRange, PendingTransactionTable};
pub use skov::{BlockStatus, LiveBlock, Skov};
pub use statistics::ConsensusStatistics;
pub use transaction_table::{
    AddResult, AdmissionContext, StatusQuery, TransactionStatus, TransactionTable,
    TransactionVerifier, VerificationOutcome,
};
