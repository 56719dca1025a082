//! The coordinator: a single logical serial writer over the consensus core.
//!
//! Network ingress, RPC, the baker and the purge loop all call in here.
//! Every mutation takes the write lock; store commits happen inside the
//! same critical section as the tree mutation they persist, so an observer
//! (or a crash) never sees one without the other. Queries clone cheap
//! snapshots under the read lock.

use crate::config::NodeConfig;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tessera_consensus::{
    AdmissionVerifier, BakerIdentity, Callbacks, Capabilities, Consensus, ConsensusConfig,
    ContractEngine, FinalizationOracle, FinalizationSummary,
};
use tessera_state::StateCaches;
use tessera_storage::{
    prepare_root, recover_all_eras, write_block_state_segment, StorageError, TreeStore,
};
use tessera_tree::{BlockStatus, TransactionVerifier};
use tessera_types::{
    serialize, BakedBlock, BlockHash, BlockHeight, CatchUpStatus, ConsensusMessage,
    FinalizationMessage, FinalizationRecord, GenesisData, GenesisIndex, Slot, Timestamp,
    UpdateResult,
};
use tracing::{debug, error, info, warn};

/// Wall-clock now as a protocol timestamp.
pub fn wall_now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Timestamp(millis)
}

/// Host-side effects recorded by the core's callbacks, drained and
/// persisted by the coordinator inside the same critical section.
enum HostEvent {
    Arrived(BlockHash),
    Finalized {
        record: FinalizationRecord,
        summary: FinalizationSummary,
    },
    Regenesis(BlockHash),
}

/// Callback sink shared with the consensus instance.
#[derive(Default)]
struct EventSink {
    events: Mutex<Vec<HostEvent>>,
}

impl Callbacks for EventSink {
    fn on_block_arrived(&self, block: BlockHash, _height: BlockHeight) {
        self.events.lock().push(HostEvent::Arrived(block));
    }

    fn on_pending_live(&self, _block: BlockHash) {}

    fn on_finalize(
        &self,
        record: &FinalizationRecord,
        _block: BlockHash,
        summary: &FinalizationSummary,
    ) {
        self.events.lock().push(HostEvent::Finalized {
            record: record.clone(),
            summary: summary.clone(),
        });
    }

    fn on_regenesis(&self, new_genesis: BlockHash) {
        self.events.lock().push(HostEvent::Regenesis(new_genesis));
    }
}

struct Inner {
    consensus: Consensus,
    store: TreeStore,
}

/// The node's serial coordinator.
pub struct Coordinator {
    inner: RwLock<Inner>,
    sink: Arc<EventSink>,
    config: NodeConfig,
    root: PathBuf,
    /// Read-through caches backing persisted-state lookups.
    pub caches: Arc<StateCaches>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Open (or recover) a node from its store root.
    ///
    /// `genesis` bootstraps a fresh store; a non-empty store replays its
    /// persisted chain through the normal pipeline instead, cross-checked
    /// against the block-state segment.
    pub fn open(
        config: NodeConfig,
        genesis: GenesisData,
        engine: Arc<dyn ContractEngine>,
        oracle: Box<dyn FinalizationOracle>,
    ) -> anyhow::Result<Arc<Self>> {
        let root = config.data_dir.clone();
        prepare_root(&root)?;
        let caches = Arc::new(StateCaches::new(
            config.accounts_cache_size,
            config.modules_cache_size,
        ));

        let sink = Arc::new(EventSink::default());
        let capabilities = Capabilities {
            callbacks: sink.clone() as Arc<dyn Callbacks>,
            engine,
        };

        let eras = recover_all_eras(&root)?;
        let (consensus, fresh) = match eras.first() {
            None => {
                let consensus = Consensus::new(
                    genesis,
                    config.consensus_config(),
                    capabilities,
                    oracle,
                )?;
                (consensus, true)
            }
            Some(first) => {
                if first.era == GenesisIndex(0) && first.genesis.hash() != genesis.hash() {
                    anyhow::bail!(
                        "store at {} belongs to a different chain (genesis {})",
                        root.display(),
                        first.genesis.hash()
                    );
                }
                let mut consensus = Consensus::new(
                    first.genesis.clone(),
                    config.consensus_config(),
                    capabilities,
                    oracle,
                )?;
                for era in &eras {
                    replay_era(&mut consensus, era)?;
                }
                if let (Some(expected), actual) = (
                    eras.last().and_then(|e| e.expected_state_hash),
                    consensus.skov().last_finalized().state.hash(),
                ) {
                    if expected != actual {
                        anyhow::bail!(
                            "recovered state hash {actual} does not match segment {expected}"
                        );
                    }
                }
                (consensus, false)
            }
        };

        let era = consensus.genesis_index();
        let store = TreeStore::open(&root, era)?;
        if fresh {
            store.put_genesis(consensus.skov().genesis_data())?;
            let lfb = consensus.skov().last_finalized();
            write_block_state_segment(&root, era, &lfb.hash, &lfb.state)?;
        }
        // Replay produced host events we have already persisted.
        sink.events.lock().clear();

        info!(era = %era, lfb = %consensus.skov().last_finalized().hash, "Coordinator ready");
        Ok(Arc::new(Coordinator {
            inner: RwLock::new(Inner { consensus, store }),
            sink,
            config,
            root,
            caches,
            shutdown: tokio::sync::watch::Sender::new(false),
        }))
    }

    /// The effective consensus configuration.
    pub fn consensus_config(&self) -> ConsensusConfig {
        self.config.consensus_config()
    }

    /// Per-chunk deadline the catch-up downloader must apply to out-of-band
    /// block downloads before driving them through [`Self::import_bundle`].
    pub fn download_blocks_timeout(&self) -> std::time::Duration {
        self.config.download_timeout()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reception (write path)
    // ═══════════════════════════════════════════════════════════════════════

    /// Receive and, if valid, execute a block.
    pub fn receive_block(&self, genesis_index: GenesisIndex, bytes: &[u8]) -> UpdateResult {
        let now = wall_now();
        let mut inner = self.inner.write();
        let (received, continuation) =
            inner.consensus.receive_block(genesis_index, bytes, now);
        let result = match continuation {
            Some(handle) => inner.consensus.execute_block(handle, now),
            None => received,
        };
        self.persist_events(&mut inner);
        result
    }

    /// Receive a transaction.
    ///
    /// Signature verification runs against a snapshot outside the write
    /// lock; only the nonce window and table insertion enter the critical
    /// section.
    pub fn receive_transaction(&self, bytes: &[u8]) -> UpdateResult {
        let now = wall_now();
        let item = match tessera_types::parse_block_item(bytes) {
            Ok(item) => item,
            Err(_) => return UpdateResult::SerializationFail,
        };

        let (lfb_state, max_block_energy, max_time_to_expiry_millis) = {
            let inner = self.inner.read();
            if inner.consensus.is_shut_down() {
                return UpdateResult::ConsensusShutDown;
            }
            let skov = inner.consensus.skov();
            (
                skov.last_finalized().state.clone(),
                skov.genesis_data().core().max_block_energy,
                inner.consensus.config().max_time_to_expiry_millis,
            )
        };
        let verifier = AdmissionVerifier {
            state: &lfb_state,
            now,
            max_block_energy,
            max_time_to_expiry_millis,
        };
        let verification = verifier.verify(&item);

        let mut inner = self.inner.write();
        let result = inner
            .consensus
            .receive_verified_transaction(item, verification, now);
        self.persist_events(&mut inner);
        result
    }

    /// Receive a finalization record.
    pub fn receive_finalization_record(
        &self,
        genesis_index: GenesisIndex,
        record: FinalizationRecord,
    ) -> UpdateResult {
        let now = wall_now();
        let mut inner = self.inner.write();
        let result = inner
            .consensus
            .receive_finalization_record(genesis_index, record, now);
        self.persist_events(&mut inner);
        result
    }

    /// Relay a finalization-protocol message to the oracle.
    pub fn receive_finalization_message(
        &self,
        genesis_index: GenesisIndex,
        message: &FinalizationMessage,
    ) -> UpdateResult {
        let mut inner = self.inner.write();
        inner
            .consensus
            .receive_finalization_message(genesis_index, message)
    }

    /// Process a peer's catch-up status, returning the direct-message burst
    /// for that peer.
    pub fn receive_catch_up_status(
        &self,
        genesis_index: GenesisIndex,
        status: &CatchUpStatus,
    ) -> (UpdateResult, Vec<ConsensusMessage>) {
        let now = wall_now();
        let mut burst = Vec::new();
        let mut inner = self.inner.write();
        let result = inner.consensus.receive_catch_up_status(
            genesis_index,
            status,
            now,
            &mut |message| burst.push(message),
        );
        (result, burst)
    }

    /// Dispatch a whole wire envelope.
    pub fn receive_message(&self, bytes: &[u8]) -> UpdateResult {
        let (genesis_index, message) = match tessera_types::decode_message(bytes) {
            Ok(decoded) => decoded,
            Err(_) => return UpdateResult::SerializationFail,
        };
        match message {
            ConsensusMessage::Block(block) => {
                self.receive_block(genesis_index, &serialize(&block))
            }
            ConsensusMessage::FinalizationRecord(record) => {
                self.receive_finalization_record(genesis_index, record)
            }
            ConsensusMessage::FinalizationMessage(message) => {
                self.receive_finalization_message(genesis_index, &message)
            }
            ConsensusMessage::CatchUpStatus(status) => {
                self.receive_catch_up_status(genesis_index, &status).0
            }
        }
    }

    /// Bake a block for `slot`, if this node's baker wins it.
    pub fn bake(&self, identity: &BakerIdentity, slot: Slot) -> Option<Arc<BakedBlock>> {
        let now = wall_now();
        let mut inner = self.inner.write();
        let baked = inner.consensus.bake_for_slot(identity, slot, now);
        self.persist_events(&mut inner);
        baked
    }

    /// Purge the transaction table now.
    pub fn purge_transactions(&self) -> usize {
        let mut inner = self.inner.write();
        inner.consensus.purge_transactions(wall_now())
    }

    /// Import a block bundle exported by another node.
    pub fn import_bundle(&self, path: &std::path::Path) -> UpdateResult {
        let chunks = match tessera_storage::read_bundle(path) {
            Ok(chunks) => chunks,
            Err(StorageError::Missing(_)) => return UpdateResult::MissingImportFile,
            Err(err) => {
                warn!(%err, "Bundle unreadable");
                return UpdateResult::SerializationFail;
            }
        };
        let index = tessera_storage::read_bundle_index(path).ok().flatten();

        for (i, chunk) in chunks.iter().enumerate() {
            // Skip chunks whose blocks are already present.
            if let Some(index) = &index {
                if let Some(entry) = index.iter().find(|e| e.chunk == i as u32) {
                    let known = self
                        .block_status(&entry.last_block)
                        .map(|s| s != BlockStatus::Pending)
                        .unwrap_or(false);
                    if known {
                        debug!(chunk = i, "Skipping already-imported chunk");
                        continue;
                    }
                }
            }
            let era = self.genesis_index();
            for block in &chunk.blocks {
                let result = self.receive_block(era, &serialize(block));
                if result == UpdateResult::ConsensusShutDown {
                    return result;
                }
            }
            for record in &chunk.records {
                let _ = self.receive_finalization_record(era, record.clone());
            }
        }
        UpdateResult::Success
    }

    /// Export the finalized chain as a v3 bundle.
    pub fn export_bundle(
        &self,
        path: &std::path::Path,
        blocks_per_chunk: usize,
    ) -> Result<(), StorageError> {
        let inner = self.inner.read();
        let skov = inner.consensus.skov();
        let mut chunks = Vec::new();
        let mut current = tessera_storage::BundleChunk::default();
        let lfb_height = skov.last_finalized().height.0;
        for h in 1..=lfb_height {
            let Some(live) = skov.finalized_at_height(BlockHeight(h)) else {
                continue;
            };
            if let Some(block) = &live.block {
                current.blocks.push((**block).clone());
            }
            if current.blocks.len() >= blocks_per_chunk.max(1) {
                chunks.push(std::mem::take(&mut current));
            }
        }
        // Records go into the final chunk, after every block they finalize.
        for (record, _) in skov.finalization_list().iter().filter(|(r, _)| r.index.0 != 0) {
            current.records.push(record.clone());
        }
        if !current.blocks.is_empty() || !current.records.is_empty() {
            chunks.push(current);
        }
        tessera_storage::write_bundle(path, &chunks)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries (read path)
    // ═══════════════════════════════════════════════════════════════════════

    /// The current era.
    pub fn genesis_index(&self) -> GenesisIndex {
        self.inner.read().consensus.genesis_index()
    }

    /// Status of a block hash; unknown hashes answer `None`.
    pub fn block_status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        self.inner.read().consensus.block_status(hash)
    }

    /// The last-finalized block hash and height.
    pub fn last_finalized(&self) -> (BlockHash, BlockHeight) {
        let inner = self.inner.read();
        let lfb = inner.consensus.skov().last_finalized();
        (lfb.hash, lfb.height)
    }

    /// The best block hash.
    pub fn best_block(&self) -> BlockHash {
        self.inner.read().consensus.skov().best_block().hash
    }

    /// Our catch-up status for peers.
    pub fn catch_up_status(&self, is_request: bool) -> CatchUpStatus {
        self.inner.read().consensus.catch_up_status(is_request)
    }

    /// Account lookup in the last-finalized state, through the cache.
    pub fn finalized_account(
        &self,
        address: &tessera_types::AccountAddress,
    ) -> Option<Arc<tessera_state::Account>> {
        self.caches.account_or_load(address, || {
            self.inner.read().consensus.finalized_account(address)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Run the periodic transaction purge until shutdown.
    pub async fn run_purge_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.purge_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let purged = self.purge_transactions();
                    if purged > 0 {
                        debug!(purged, "Periodic transaction purge");
                    }
                }
            }
        }
    }

    /// Stop background tasks and flush the store.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let inner = self.inner.read();
        let lfb = inner.consensus.skov().last_finalized();
        let era = inner.consensus.genesis_index();
        if let Err(err) = write_block_state_segment(&self.root, era, &lfb.hash, &lfb.state) {
            error!(%err, "Failed to flush block-state segment on shutdown");
        }
        info!("Coordinator shut down");
    }

    /// Drain recorded host events and commit them, still under the write
    /// lock.
    fn persist_events(&self, inner: &mut Inner) {
        let events: Vec<HostEvent> = std::mem::take(&mut *self.sink.events.lock());
        for event in events {
            match event {
                HostEvent::Arrived(hash) => {
                    let block = inner
                        .consensus
                        .skov()
                        .live_block(&hash)
                        .and_then(|live| live.block.clone());
                    match block {
                        Some(block) => {
                            if let Err(err) = inner.store.put_block(&block) {
                                error!(%err, block = %hash, "Failed to persist block");
                            }
                        }
                        // The block's era ended within this operation; the
                        // next era does not carry it.
                        None => debug!(block = %hash, "Skipping persist of superseded block"),
                    }
                }
                HostEvent::Finalized { record, summary } => {
                    if let Err(err) = inner.store.commit_finalization(
                        &record,
                        &summary.finalized,
                        &summary
                            .outcomes
                            .iter()
                            .map(|(h, o)| (*h, (**o).clone()))
                            .collect::<Vec<_>>(),
                    ) {
                        error!(%err, "Failed to persist finalization");
                        continue;
                    }
                    if let Some((_, lfb_hash)) = summary.finalized.last() {
                        let era = inner.consensus.genesis_index();
                        if let Err(err) = write_block_state_segment(
                            &self.root,
                            era,
                            lfb_hash,
                            &summary.lfb_state,
                        ) {
                            error!(%err, "Failed to write block-state segment");
                        }
                    }
                }
                HostEvent::Regenesis(new_genesis) => {
                    let era = inner.consensus.genesis_index();
                    match TreeStore::open(&self.root, era) {
                        Ok(store) => {
                            inner.store = store;
                            if let Err(err) =
                                inner.store.put_genesis(inner.consensus.skov().genesis_data())
                            {
                                error!(%err, "Failed to persist regenesis record");
                            }
                            let lfb = inner.consensus.skov().last_finalized();
                            if let Err(err) = write_block_state_segment(
                                &self.root,
                                era,
                                &lfb.hash,
                                &lfb.state,
                            ) {
                                error!(%err, "Failed to write regenesis segment");
                            }
                            info!(era = %era, genesis = %new_genesis, "Persisted new era");
                        }
                        Err(err) => error!(%err, "Failed to open new era store"),
                    }
                }
            }
        }
    }
}

/// Replay one recovered era through the pipeline.
fn replay_era(
    consensus: &mut Consensus,
    era: &tessera_storage::RecoveredEra,
) -> anyhow::Result<()> {
    if consensus.genesis_index() != era.era {
        anyhow::bail!(
            "store era {} does not follow pipeline era {}",
            era.era,
            consensus.genesis_index()
        );
    }
    let mut records = era.records.iter().peekable();
    for block in &era.blocks {
        let now = Timestamp(u64::MAX / 2); // replay ignores wall-clock gating
        let (result, continuation) =
            consensus.receive_block_parsed(era.era, Arc::new(block.clone()), now);
        match continuation {
            Some(handle) => {
                let result = consensus.execute_block(handle, now);
                if result != UpdateResult::Success {
                    anyhow::bail!("replayed block {} failed: {result}", block.hash());
                }
            }
            None => anyhow::bail!("replayed block {} refused: {result}", block.hash()),
        }
        // Apply any record that finalizes a block we now have.
        while let Some(record) = records.peek() {
            if record.block == block.hash() {
                let record = (*record).clone();
                records.next();
                let result = consensus.receive_finalization_record(era.era, record, now);
                if result != UpdateResult::Success && result != UpdateResult::Duplicate {
                    anyhow::bail!("replayed finalization failed: {result}");
                }
            } else {
                break;
            }
        }
    }
    for record in records {
        let result =
            consensus.receive_finalization_record(era.era, record.clone(), Timestamp(u64::MAX / 2));
        if result != UpdateResult::Success && result != UpdateResult::Duplicate {
            warn!(%result, index = %record.index, "Trailing finalization record not applied");
        }
    }
    Ok(())
}
