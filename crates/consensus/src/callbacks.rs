//! The core's outbound contract.
//!
//! The host hands these capabilities in at construction; the core never
//! reaches for ambient state. Callbacks fire inside the same critical
//! section as the state change they announce, so an observer never sees a
//! state without its announcement.

use crate::finalize::FinalizationSummary;
use std::sync::Arc;
use tessera_types::{
    BlockHash, BlockHeight, FinalizationMessage, FinalizationRecord, FinalizerInfo, UpdateResult,
};

/// Host capabilities.
pub trait Callbacks: Send + Sync {
    /// A block became alive at `height`.
    fn on_block_arrived(&self, block: BlockHash, height: BlockHeight);

    /// A previously pending block was promoted and executed. Fires exactly
    /// once per block, after `on_block_arrived`.
    fn on_pending_live(&self, block: BlockHash);

    /// A finalization advanced: `record` finalized `block`; the summary
    /// lists everything that settled, died, or was archived.
    fn on_finalize(
        &self,
        record: &FinalizationRecord,
        block: BlockHash,
        summary: &FinalizationSummary,
    );

    /// A protocol update completed; the next era starts from `new_genesis`.
    fn on_regenesis(&self, new_genesis: BlockHash);
}

/// A no-op host, for tests and tools that only query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl Callbacks for NullCallbacks {
    fn on_block_arrived(&self, _block: BlockHash, _height: BlockHeight) {}
    fn on_pending_live(&self, _block: BlockHash) {}
    fn on_finalize(
        &self,
        _record: &FinalizationRecord,
        _block: BlockHash,
        _summary: &FinalizationSummary,
    ) {
    }
    fn on_regenesis(&self, _new_genesis: BlockHash) {}
}

/// Outcome of handing a finalization record to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    /// The record verified; the committee descriptor supports reward
    /// accounting.
    Consumed(FinalizerInfo),
    /// The oracle has already seen (and used) this record.
    Duplicate,
    /// The proof does not verify.
    Rejected,
}

/// The finalization protocol, seen as a black box.
///
/// The core feeds it records and opaque protocol messages; it validates
/// proofs against the committee it tracks and may advance the last-finalized
/// pointer by consuming a record. The committee descriptor returned for a
/// consumed record feeds finalization-reward settlement, so it must be a
/// deterministic function of the record: every replica derives the same
/// signers.
pub trait FinalizationOracle: Send + Sync {
    /// Validate a record's proof.
    fn submit_record(&mut self, record: &FinalizationRecord) -> OracleOutcome;

    /// Feed an opaque finalization-protocol message. The returned code is
    /// passed through to the network layer.
    fn submit_message(&mut self, message: &FinalizationMessage) -> UpdateResult;

    /// Observe a block arrival (the protocol tracks eligible targets).
    fn notify_block_arrival(&mut self, block: BlockHash, height: BlockHeight);
}

/// An oracle that accepts every well-formed record once.
///
/// Stands in for the external finalization component in tests and
/// single-node setups: dedupe by index, no proof checking, and the
/// committee descriptor reads the proof's signer indices as baker ids
/// directly (a deterministic function of the record, as the trait
/// requires).
#[derive(Debug, Default)]
pub struct TrustingOracle {
    seen: std::collections::HashSet<tessera_types::FinalizationIndex>,
}

impl FinalizationOracle for TrustingOracle {
    fn submit_record(&mut self, record: &FinalizationRecord) -> OracleOutcome {
        if !self.seen.insert(record.index) {
            return OracleOutcome::Duplicate;
        }
        let members: Vec<tessera_types::BakerId> = record
            .proof
            .signers
            .iter()
            .map(|index| tessera_types::BakerId(*index as u64))
            .collect();
        OracleOutcome::Consumed(FinalizerInfo {
            committee: members.clone(),
            signers: members,
        })
    }

    fn submit_message(&mut self, _message: &FinalizationMessage) -> UpdateResult {
        UpdateResult::Success
    }

    fn notify_block_arrival(&mut self, _block: BlockHash, _height: BlockHeight) {}
}

/// The smart-contract execution engine, invoked per transaction.
///
/// External to the core: given a module artifact and call data it returns a
/// deterministic state delta and outgoing transfers. Gas metering beyond the
/// declared energy budget is the engine's concern.
pub trait ContractEngine: Send + Sync {
    /// Validate an artifact and list its exposed entrypoints.
    fn load_module(&self, source: &[u8]) -> Result<Vec<String>, tessera_types::RejectReason>;

    /// Run an init entrypoint, producing the instance's initial state.
    fn init(
        &self,
        module: &tessera_state::Module,
        init_name: &str,
        param: &[u8],
        amount: tessera_types::Amount,
    ) -> Result<Vec<u8>, tessera_types::RejectReason>;

    /// Run a receive entrypoint against the instance's current state.
    fn update(&self, call: EngineCall<'_>) -> Result<EngineOutcome, tessera_types::RejectReason>;
}

/// Arguments of a contract invocation.
#[derive(Debug)]
pub struct EngineCall<'a> {
    pub module: &'a tessera_state::Module,
    pub instance_state: &'a [u8],
    pub entrypoint: &'a str,
    pub param: &'a [u8],
    /// Amount attached to the call (already credited to the instance).
    pub amount: tessera_types::Amount,
    /// Instance balance including the attached amount.
    pub balance: tessera_types::Amount,
    /// The invoking account.
    pub sender: tessera_types::AccountAddress,
}

/// Deterministic result of a contract invocation.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Replacement contract state.
    pub new_state: Vec<u8>,
    /// Transfers out of the instance balance, in order.
    pub transfers_out: Vec<(tessera_types::AccountAddress, tessera_types::Amount)>,
}

/// An engine that accepts any artifact and treats calls as state-preserving
/// deposits. Real deployments plug the WASM interpreter in here.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEngine;

impl ContractEngine for NullEngine {
    fn load_module(&self, source: &[u8]) -> Result<Vec<String>, tessera_types::RejectReason> {
        if source.is_empty() {
            return Err(tessera_types::RejectReason::RuntimeFailure);
        }
        // Artifact format: newline-separated exported entrypoint names.
        let text = std::str::from_utf8(source)
            .map_err(|_| tessera_types::RejectReason::RuntimeFailure)?;
        Ok(text.lines().map(str::to_owned).collect())
    }

    fn init(
        &self,
        _module: &tessera_state::Module,
        _init_name: &str,
        param: &[u8],
        _amount: tessera_types::Amount,
    ) -> Result<Vec<u8>, tessera_types::RejectReason> {
        Ok(param.to_vec())
    }

    fn update(&self, call: EngineCall<'_>) -> Result<EngineOutcome, tessera_types::RejectReason> {
        Ok(EngineOutcome {
            new_state: call.instance_state.to_vec(),
            transfers_out: Vec::new(),
        })
    }
}

/// Shared handles the consensus instance is constructed with.
#[derive(Clone)]
pub struct Capabilities {
    pub callbacks: Arc<dyn Callbacks>,
    pub engine: Arc<dyn ContractEngine>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
