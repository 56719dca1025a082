//! The transaction table.
//!
//! All known-but-not-purged transactions live here, indexed by hash, by
//! (sender, nonce) for account transactions, and by (type, sequence) for
//! chain updates. Verification results are cached at admission so the
//! scheduler does not re-verify signatures whose keys have not changed.
//!
//! Access is serialized through the coordinator; plain `HashMap`s suffice.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tessera_types::{
    AccountAddress, BlockHash, BlockItem, BlockItemKind, Nonce, Slot, Timestamp, TransactionHash,
    UpdateResult, UpdateSequenceNumber, UpdateType,
};
use tracing::{debug, trace};

/// Cached verdict of admission-time verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Verified against a state and admissible.
    Valid,
    /// Currently inadmissible for a reason that a future state may heal
    /// (e.g. the sender account does not exist yet). Re-verified at
    /// execution time.
    MaybeLater(UpdateResult),
    /// Definitively invalid; never admissible in any state.
    Invalid(UpdateResult),
}

/// Verifies an item against some reference state at admission.
pub trait TransactionVerifier {
    fn verify(&self, item: &BlockItem) -> VerificationOutcome;
}

/// Nonce/sequence context the table checks admission against.
///
/// Implemented over the last-finalized block state by the consensus layer.
pub trait AdmissionContext {
    /// The next nonce of `sender` in the reference state; `None` when the
    /// account does not exist there.
    fn account_next_nonce(&self, sender: &AccountAddress) -> Option<Nonce>;

    /// The next sequence number for an update type in the reference state.
    fn update_next_sequence(&self, ty: UpdateType) -> UpdateSequenceNumber;
}

/// Lifecycle status of a table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Known, not in any live block.
    Received {
        since: Slot,
        verification: VerificationOutcome,
    },
    /// In one or more live blocks; maps block to the outcome index there.
    Committed {
        since: Slot,
        verification: VerificationOutcome,
        outcomes: HashMap<BlockHash, usize>,
    },
    /// In a finalized block.
    Finalized {
        slot: Slot,
        block: BlockHash,
        outcome_index: usize,
    },
}

impl TransactionStatus {
    /// Whether this entry has reached a terminal state.
    pub fn is_finalized(&self) -> bool {
        matches!(self, TransactionStatus::Finalized { .. })
    }
}

/// Status answer for lookups, including tombstones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    Live(TransactionStatus),
    /// Purged or superseded by a finalized competitor.
    Dropped,
    Unknown,
}

/// Outcome of [`TransactionTable::add_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResult {
    /// Newly admitted.
    Added(VerificationOutcome),
    /// Already known; the cached verification result is returned.
    Duplicate(VerificationOutcome),
    /// Nonce or sequence number already settled by finalization.
    ObsoleteNonce,
    /// Rejected; the code says why.
    NotAdded(UpdateResult),
}

#[derive(Debug)]
struct TableEntry {
    item: Arc<BlockItem>,
    status: TransactionStatus,
    arrival: Timestamp,
    /// Latest slot this transaction was observed or committed at; drives
    /// purge eligibility.
    max_slot: Slot,
}

/// Non-finalized index for one sender account.
#[derive(Debug, Default)]
struct AccountIndex {
    /// First nonce not yet finalized for this sender.
    next_nonce: Nonce,
    /// Competing transactions per nonce, for `nonce >= next_nonce`. Keys
    /// form a contiguous interval starting at `next_nonce`.
    by_nonce: BTreeMap<Nonce, BTreeSet<TransactionHash>>,
}

/// Non-finalized index for one update type.
#[derive(Debug, Default)]
struct UpdateIndex {
    next_sequence: UpdateSequenceNumber,
    by_sequence: BTreeMap<UpdateSequenceNumber, BTreeSet<TransactionHash>>,
}

/// The table.
#[derive(Debug, Default)]
pub struct TransactionTable {
    entries: HashMap<TransactionHash, TableEntry>,
    accounts: HashMap<AccountAddress, AccountIndex>,
    updates: HashMap<UpdateType, UpdateIndex>,
    /// Tombstones of purged/superseded hashes; cleared by purge cycles.
    dropped: HashSet<TransactionHash>,
    insertions_since_purge: u64,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertions since the last purge; the coordinator purges when this
    /// crosses its configured cadence.
    pub fn insertions_since_purge(&self) -> u64 {
        self.insertions_since_purge
    }

    /// Admit a transaction, verifying it if unseen.
    ///
    /// `received_as_of` is the slot of the state the verification ran
    /// against (the last-finalized block's slot at admission time).
    pub fn add_commit(
        &mut self,
        item: Arc<BlockItem>,
        ctx: &dyn AdmissionContext,
        verifier: &dyn TransactionVerifier,
        recv_time: Timestamp,
        received_as_of: Slot,
    ) -> AddResult {
        let hash = item.hash();
        if let Some(entry) = self.entries.get(&hash) {
            let verification = match &entry.status {
                TransactionStatus::Received { verification, .. }
                | TransactionStatus::Committed { verification, .. } => *verification,
                TransactionStatus::Finalized { .. } => VerificationOutcome::Valid,
            };
            return AddResult::Duplicate(verification);
        }

        // Nonce window check before any signature work.
        match item.kind() {
            BlockItemKind::Normal(tx) => {
                let index_next = self
                    .accounts
                    .get(&tx.sender)
                    .map(|i| i.next_nonce)
                    .or_else(|| ctx.account_next_nonce(&tx.sender));
                if let Some(next) = index_next {
                    if tx.nonce < next {
                        return AddResult::ObsoleteNonce;
                    }
                    let highest_admissible = self
                        .accounts
                        .get(&tx.sender)
                        .and_then(|i| i.by_nonce.keys().next_back().copied())
                        .map(|high| high.next())
                        .unwrap_or(next);
                    if tx.nonce > highest_admissible {
                        return AddResult::NotAdded(UpdateResult::NonceTooLarge);
                    }
                }
                // Unknown sender: admission depends on the verifier deciding
                // the account may exist in a future state.
            }
            BlockItemKind::ChainUpdate(up) => {
                let next = self
                    .updates
                    .get(&up.payload.update_type())
                    .map(|i| i.next_sequence)
                    .unwrap_or_else(|| ctx.update_next_sequence(up.payload.update_type()));
                if up.sequence_number < next {
                    return AddResult::ObsoleteNonce;
                }
            }
            BlockItemKind::CredentialDeployment(_) => {}
        }

        let verification = verifier.verify(&item);
        if let VerificationOutcome::Invalid(code) = verification {
            return AddResult::NotAdded(code);
        }

        self.index_item(&item, ctx);
        trace!(tx_hash = %hash, "Admitted transaction");
        self.entries.insert(
            hash,
            TableEntry {
                item,
                status: TransactionStatus::Received {
                    since: received_as_of,
                    verification,
                },
                arrival: recv_time,
                max_slot: received_as_of,
            },
        );
        self.dropped.remove(&hash);
        self.insertions_since_purge += 1;
        AddResult::Added(verification)
    }

    fn index_item(&mut self, item: &Arc<BlockItem>, ctx: &dyn AdmissionContext) {
        match item.kind() {
            BlockItemKind::Normal(tx) => {
                let index = self.accounts.entry(tx.sender).or_insert_with(|| {
                    AccountIndex {
                        next_nonce: ctx.account_next_nonce(&tx.sender).unwrap_or(Nonce::FIRST),
                        by_nonce: BTreeMap::new(),
                    }
                });
                index.by_nonce.entry(tx.nonce).or_default().insert(item.hash());
            }
            BlockItemKind::ChainUpdate(up) => {
                let ty = up.payload.update_type();
                let index = self.updates.entry(ty).or_insert_with(|| UpdateIndex {
                    next_sequence: ctx.update_next_sequence(ty),
                    by_sequence: BTreeMap::new(),
                });
                index
                    .by_sequence
                    .entry(up.sequence_number)
                    .or_default()
                    .insert(item.hash());
            }
            BlockItemKind::CredentialDeployment(_) => {}
        }
    }

    /// Record that a live block at `slot` includes the transaction at
    /// outcome position `outcome_index`.
    pub fn commit_in_block(
        &mut self,
        slot: Slot,
        block: BlockHash,
        tx_hash: TransactionHash,
        outcome_index: usize,
    ) {
        let Some(entry) = self.entries.get_mut(&tx_hash) else {
            return;
        };
        entry.max_slot = entry.max_slot.max(slot);
        match &mut entry.status {
            TransactionStatus::Received {
                since,
                verification,
            } => {
                let mut outcomes = HashMap::new();
                outcomes.insert(block, outcome_index);
                entry.status = TransactionStatus::Committed {
                    since: (*since).max(slot),
                    verification: *verification,
                    outcomes,
                };
            }
            TransactionStatus::Committed { since, outcomes, .. } => {
                *since = (*since).max(slot);
                outcomes.insert(block, outcome_index);
            }
            TransactionStatus::Finalized { .. } => {}
        }
    }

    /// Forget a specific block association (the block died).
    pub fn mark_dead_in_block(&mut self, block: &BlockHash, tx_hash: &TransactionHash) {
        let Some(entry) = self.entries.get_mut(tx_hash) else {
            return;
        };
        if let TransactionStatus::Committed {
            since,
            verification,
            outcomes,
        } = &mut entry.status
        {
            outcomes.remove(block);
            if outcomes.is_empty() {
                entry.status = TransactionStatus::Received {
                    since: *since,
                    verification: *verification,
                };
            }
        }
    }

    /// Move a committed transaction to `Finalized` in `block`.
    ///
    /// All competing entries at the same (sender, nonce), or (type,
    /// sequence), are dropped and the index advances past the settled
    /// number.
    pub fn finalize(&mut self, block: BlockHash, slot: Slot, tx_hash: TransactionHash) {
        let Some(entry) = self.entries.get_mut(&tx_hash) else {
            return;
        };
        let outcome_index = match &entry.status {
            TransactionStatus::Committed { outcomes, .. } => {
                outcomes.get(&block).copied().unwrap_or(0)
            }
            _ => 0,
        };
        entry.status = TransactionStatus::Finalized {
            slot,
            block,
            outcome_index,
        };

        // Settle the index: everything at or below the finalized number is
        // superseded.
        let item = entry.item.clone();
        match item.kind() {
            BlockItemKind::Normal(tx) => {
                let mut superseded = Vec::new();
                if let Some(index) = self.accounts.get_mut(&tx.sender) {
                    let settled: Vec<Nonce> = index
                        .by_nonce
                        .range(..=tx.nonce)
                        .map(|(n, _)| *n)
                        .collect();
                    for nonce in settled {
                        if let Some(set) = index.by_nonce.remove(&nonce) {
                            superseded.extend(set.into_iter().filter(|h| *h != tx_hash));
                        }
                    }
                    index.next_nonce = tx.nonce.next();
                }
                for hash in superseded {
                    self.drop_entry(&hash);
                }
            }
            BlockItemKind::ChainUpdate(up) => {
                let ty = up.payload.update_type();
                let mut superseded = Vec::new();
                if let Some(index) = self.updates.get_mut(&ty) {
                    let settled: Vec<UpdateSequenceNumber> = index
                        .by_sequence
                        .range(..=up.sequence_number)
                        .map(|(n, _)| *n)
                        .collect();
                    for seq in settled {
                        if let Some(set) = index.by_sequence.remove(&seq) {
                            superseded.extend(set.into_iter().filter(|h| *h != tx_hash));
                        }
                    }
                    index.next_sequence = up.sequence_number.next();
                }
                for hash in superseded {
                    self.drop_entry(&hash);
                }
            }
            BlockItemKind::CredentialDeployment(_) => {}
        }
        debug!(tx_hash = %tx_hash, block = %block, "Finalized transaction");
    }

    fn drop_entry(&mut self, hash: &TransactionHash) {
        if self.entries.remove(hash).is_some() {
            self.dropped.insert(*hash);
        }
    }

    /// Delete transactions whose latest slot is at or below the
    /// last-finalized slot and whose arrival predates the keep-alive
    /// horizon. Finalized entries and entries still committed to a live
    /// block survive.
    ///
    /// Nonce intervals are purged from the tail downward, stopping at the
    /// first nonce with a survivor, so contiguity holds afterwards.
    pub fn purge(&mut self, now: Timestamp, lfb_slot: Slot, keep_alive_millis: u64) -> usize {
        let horizon = Timestamp(now.0.saturating_sub(keep_alive_millis));
        let is_doomed = |entry: &TableEntry| {
            entry.arrival < horizon
                && entry.max_slot <= lfb_slot
                && matches!(entry.status, TransactionStatus::Received { .. })
        };

        let mut removed: Vec<TransactionHash> = Vec::new();

        // Account indices: walk each sender's nonces from the tail.
        for index in self.accounts.values_mut() {
            loop {
                let Some((&nonce, _)) = index.by_nonce.iter().next_back() else {
                    break;
                };
                let set = index.by_nonce.get_mut(&nonce).expect("key just observed");
                let doomed: Vec<TransactionHash> = set
                    .iter()
                    .filter(|h| self.entries.get(*h).map(is_doomed).unwrap_or(true))
                    .copied()
                    .collect();
                for h in &doomed {
                    set.remove(h);
                }
                removed.extend(doomed);
                if set.is_empty() {
                    index.by_nonce.remove(&nonce);
                } else {
                    break;
                }
            }
        }

        // Update indices: same tail discipline on sequence numbers.
        for index in self.updates.values_mut() {
            loop {
                let Some((&seq, _)) = index.by_sequence.iter().next_back() else {
                    break;
                };
                let set = index.by_sequence.get_mut(&seq).expect("key just observed");
                let doomed: Vec<TransactionHash> = set
                    .iter()
                    .filter(|h| self.entries.get(*h).map(is_doomed).unwrap_or(true))
                    .copied()
                    .collect();
                for h in &doomed {
                    set.remove(h);
                }
                removed.extend(doomed);
                if set.is_empty() {
                    index.by_sequence.remove(&seq);
                } else {
                    break;
                }
            }
        }

        // Credential deployments carry no index; purge them directly.
        let doomed_credentials: Vec<TransactionHash> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                matches!(e.item.kind(), BlockItemKind::CredentialDeployment(_)) && is_doomed(e)
            })
            .map(|(h, _)| *h)
            .collect();
        removed.extend(doomed_credentials);

        let purged = removed.len();
        for hash in removed {
            self.drop_entry(&hash);
        }
        self.insertions_since_purge = 0;
        if purged > 0 {
            debug!(purged, "Purged transaction table");
        }
        purged
    }

    /// Look up an entry.
    pub fn lookup(&self, hash: &TransactionHash) -> Option<(&Arc<BlockItem>, &TransactionStatus)> {
        self.entries.get(hash).map(|e| (&e.item, &e.status))
    }

    /// Status including dropped tombstones.
    pub fn status(&self, hash: &TransactionHash) -> StatusQuery {
        if let Some(entry) = self.entries.get(hash) {
            return StatusQuery::Live(entry.status.clone());
        }
        if self.dropped.contains(hash) {
            return StatusQuery::Dropped;
        }
        StatusQuery::Unknown
    }

    /// The table's next-nonce view for a sender (falls back to `None` when
    /// the sender has no non-finalized entries).
    pub fn next_account_nonce(&self, sender: &AccountAddress) -> Option<Nonce> {
        self.accounts.get(sender).map(|i| {
            i.by_nonce
                .keys()
                .next_back()
                .map(|high| high.next())
                .unwrap_or(i.next_nonce)
        })
    }

    /// Non-finalized transactions of `sender` from `from_nonce` upward, in
    /// nonce order.
    pub fn account_non_finalized(
        &self,
        sender: &AccountAddress,
        from_nonce: Nonce,
    ) -> Vec<(Nonce, Vec<Arc<BlockItem>>)> {
        let Some(index) = self.accounts.get(sender) else {
            return Vec::new();
        };
        index
            .by_nonce
            .range(from_nonce..)
            .map(|(nonce, hashes)| {
                let items = hashes
                    .iter()
                    .filter_map(|h| self.entries.get(h).map(|e| e.item.clone()))
                    .collect();
                (*nonce, items)
            })
            .collect()
    }

    /// Non-finalized chain updates of `ty` from `from_seq` upward.
    pub fn non_finalized_chain_updates(
        &self,
        ty: UpdateType,
        from_seq: UpdateSequenceNumber,
    ) -> Vec<(UpdateSequenceNumber, Vec<Arc<BlockItem>>)> {
        let Some(index) = self.updates.get(&ty) else {
            return Vec::new();
        };
        index
            .by_sequence
            .range(from_seq..)
            .map(|(seq, hashes)| {
                let items = hashes
                    .iter()
                    .filter_map(|h| self.entries.get(h).map(|e| e.item.clone()))
                    .collect();
                (*seq, items)
            })
            .collect()
    }

    /// Credential deployments not yet in any live block, for block
    /// construction. Order is by hash for determinism.
    pub fn received_credentials(&self) -> Vec<Arc<BlockItem>> {
        let mut items: Vec<Arc<BlockItem>> = self
            .entries
            .values()
            .filter(|e| {
                matches!(e.item.kind(), BlockItemKind::CredentialDeployment(_))
                    && matches!(e.status, TransactionStatus::Received { .. })
            })
            .map(|e| e.item.clone())
            .collect();
        items.sort_by_key(|i| i.hash());
        items
    }

    /// Check the contiguity invariant for every sender (test support).
    pub fn nonce_intervals_contiguous(&self) -> bool {
        self.accounts.values().all(|index| {
            let mut expected = index.next_nonce;
            for nonce in index.by_nonce.keys() {
                if *nonce != expected {
                    return false;
                }
                expected = expected.next();
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_address, test_keypair};
    use tessera_types::{sign_transaction, Amount, Energy, Payload};

    struct FixedContext;

    impl AdmissionContext for FixedContext {
        fn account_next_nonce(&self, _sender: &AccountAddress) -> Option<Nonce> {
            Some(Nonce::FIRST)
        }

        fn update_next_sequence(&self, _ty: UpdateType) -> UpdateSequenceNumber {
            UpdateSequenceNumber::FIRST
        }
    }

    struct AcceptAll;

    impl TransactionVerifier for AcceptAll {
        fn verify(&self, _item: &BlockItem) -> VerificationOutcome {
            VerificationOutcome::Valid
        }
    }

    fn tx(sender_seed: u8, nonce: u64, amount: u64) -> Arc<BlockItem> {
        Arc::new(sign_transaction(
            &test_keypair(sender_seed),
            test_address(sender_seed),
            Nonce(nonce),
            Energy(100),
            Timestamp(1_000_000),
            Payload::Transfer {
                to: test_address(99),
                amount: Amount(amount),
            },
        ))
    }

    fn add(table: &mut TransactionTable, item: &Arc<BlockItem>) -> AddResult {
        table.add_commit(item.clone(), &FixedContext, &AcceptAll, Timestamp(0), Slot(0))
    }

    #[test]
    fn add_then_duplicate() {
        let mut table = TransactionTable::new();
        let item = tx(1, 1, 10);
        assert!(matches!(add(&mut table, &item), AddResult::Added(_)));
        assert!(matches!(add(&mut table, &item), AddResult::Duplicate(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn obsolete_and_oversized_nonces_are_rejected() {
        let mut table = TransactionTable::new();
        let first = tx(1, 1, 10);
        add(&mut table, &first);

        // Nonce 3 would leave a gap after 1.
        assert!(matches!(
            add(&mut table, &tx(1, 3, 10)),
            AddResult::NotAdded(UpdateResult::NonceTooLarge)
        ));
        // Nonce 2 extends the interval.
        assert!(matches!(add(&mut table, &tx(1, 2, 10)), AddResult::Added(_)));
        assert!(table.nonce_intervals_contiguous());
    }

    #[test]
    fn finalize_drops_same_nonce_competitors() {
        let mut table = TransactionTable::new();
        let a = tx(1, 7, 10);
        let b = tx(1, 7, 20); // competing at the same nonce
        // Seed the index at nonce 7.
        let ctx = struct_ctx(7);
        table.add_commit(a.clone(), &ctx, &AcceptAll, Timestamp(0), Slot(0));
        table.add_commit(b.clone(), &ctx, &AcceptAll, Timestamp(0), Slot(0));

        let block = tessera_types::Hash::digest(b"block");
        table.commit_in_block(Slot(5), block, a.hash(), 0);
        table.finalize(block, Slot(5), a.hash());

        assert!(matches!(
            table.status(&a.hash()),
            StatusQuery::Live(TransactionStatus::Finalized { .. })
        ));
        assert_eq!(table.status(&b.hash()), StatusQuery::Dropped);
        assert_eq!(table.next_account_nonce(&test_address(1)), Some(Nonce(8)));
        assert!(table.nonce_intervals_contiguous());
    }

    fn struct_ctx(next: u64) -> impl AdmissionContext {
        struct Ctx(u64);
        impl AdmissionContext for Ctx {
            fn account_next_nonce(&self, _sender: &AccountAddress) -> Option<Nonce> {
                Some(Nonce(self.0))
            }
            fn update_next_sequence(&self, _ty: UpdateType) -> UpdateSequenceNumber {
                UpdateSequenceNumber::FIRST
            }
        }
        Ctx(next)
    }

    #[test]
    fn mark_dead_reverts_to_received() {
        let mut table = TransactionTable::new();
        let item = tx(1, 1, 10);
        add(&mut table, &item);

        let block = tessera_types::Hash::digest(b"block");
        table.commit_in_block(Slot(3), block, item.hash(), 0);
        assert!(matches!(
            table.status(&item.hash()),
            StatusQuery::Live(TransactionStatus::Committed { .. })
        ));

        table.mark_dead_in_block(&block, &item.hash());
        assert!(matches!(
            table.status(&item.hash()),
            StatusQuery::Live(TransactionStatus::Received { .. })
        ));
    }

    #[test]
    fn purge_respects_keepalive_and_slot() {
        let mut table = TransactionTable::new();
        let old = tx(1, 1, 10);
        table.add_commit(old.clone(), &FixedContext, &AcceptAll, Timestamp(0), Slot(0));
        let fresh = tx(2, 1, 10);
        table.add_commit(
            fresh.clone(),
            &FixedContext,
            &AcceptAll,
            Timestamp(900_000),
            Slot(0),
        );

        // keep-alive 600s, now = 1000s: `old` (arrival 0) is past the
        // horizon, `fresh` is not.
        let purged = table.purge(Timestamp(1_000_000), Slot(10), 600_000);
        assert_eq!(purged, 1);
        assert_eq!(table.status(&old.hash()), StatusQuery::Dropped);
        assert!(matches!(table.status(&fresh.hash()), StatusQuery::Live(_)));
        assert!(table.nonce_intervals_contiguous());
    }

    #[test]
    fn committed_transactions_survive_purge() {
        let mut table = TransactionTable::new();
        let item = tx(1, 1, 10);
        add(&mut table, &item);
        let block = tessera_types::Hash::digest(b"live");
        table.commit_in_block(Slot(20), block, item.hash(), 0);

        table.purge(Timestamp(10_000_000), Slot(10), 1);
        assert!(matches!(table.status(&item.hash()), StatusQuery::Live(_)));
    }

    #[test]
    fn account_non_finalized_orders_by_nonce() {
        let mut table = TransactionTable::new();
        add(&mut table, &tx(1, 1, 10));
        add(&mut table, &tx(1, 2, 10));
        add(&mut table, &tx(1, 3, 10));
        let listed = table.account_non_finalized(&test_address(1), Nonce(2));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, Nonce(2));
        assert_eq!(listed[1].0, Nonce(3));
    }
}
