//! The pending-transaction table.
//!
//! Tracks, per sender, the nonce range of transactions that the focus block
//! has not yet applied; the baker builds blocks from this table and catch-up
//! replays it. Moving the focus block replays included transactions forward
//! (removing them) or backward (re-adding them) along the tree path.

use std::collections::HashMap;
use tessera_types::{
    AccountAddress, BlockItem, BlockItemKind, Nonce, UpdateSequenceNumber, UpdateType,
};

/// Inclusive pending range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRange<T> {
    pub low: T,
    pub high: T,
}

/// Transactions not yet reached by the focus block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingTransactionTable {
    accounts: HashMap<AccountAddress, PendingRange<Nonce>>,
    updates: HashMap<UpdateType, PendingRange<UpdateSequenceNumber>>,
}

impl PendingTransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.updates.is_empty()
    }

    /// The pending nonce range of a sender.
    pub fn account_range(&self, sender: &AccountAddress) -> Option<PendingRange<Nonce>> {
        self.accounts.get(sender).copied()
    }

    /// The pending sequence range of an update type.
    pub fn update_range(&self, ty: UpdateType) -> Option<PendingRange<UpdateSequenceNumber>> {
        self.updates.get(&ty).copied()
    }

    /// Senders with pending transactions.
    pub fn pending_accounts(&self) -> impl Iterator<Item = (&AccountAddress, &PendingRange<Nonce>)> {
        self.accounts.iter()
    }

    /// Update types with pending instructions.
    pub fn pending_updates(
        &self,
    ) -> impl Iterator<Item = (&UpdateType, &PendingRange<UpdateSequenceNumber>)> {
        self.updates.iter()
    }

    /// Record a newly admitted item as pending.
    ///
    /// `next_nonce` is the focus state's next nonce for the sender; a fresh
    /// range starts there so lower in-flight nonces stay covered.
    pub fn add_item(&mut self, item: &BlockItem, next_nonce: Nonce) {
        match item.kind() {
            BlockItemKind::Normal(tx) => {
                let range = self
                    .accounts
                    .entry(tx.sender)
                    .or_insert(PendingRange {
                        low: next_nonce.max(Nonce::FIRST),
                        high: tx.nonce,
                    });
                range.low = range.low.min(next_nonce.max(Nonce::FIRST));
                range.high = range.high.max(tx.nonce);
            }
            BlockItemKind::ChainUpdate(up) => {
                let ty = up.payload.update_type();
                let range = self.updates.entry(ty).or_insert(PendingRange {
                    low: up.sequence_number,
                    high: up.sequence_number,
                });
                range.low = range.low.min(up.sequence_number);
                range.high = range.high.max(up.sequence_number);
            }
            BlockItemKind::CredentialDeployment(_) => {}
        }
    }

    /// Replay a block's transactions forward: the focus block moved to a
    /// child that includes them.
    pub fn forward_block(&mut self, transactions: &[std::sync::Arc<BlockItem>]) {
        for item in transactions {
            match item.kind() {
                BlockItemKind::Normal(tx) => {
                    if let Some(range) = self.accounts.get_mut(&tx.sender) {
                        if tx.nonce >= range.low {
                            range.low = tx.nonce.next();
                        }
                        if range.low > range.high {
                            self.accounts.remove(&tx.sender);
                        }
                    }
                }
                BlockItemKind::ChainUpdate(up) => {
                    let ty = up.payload.update_type();
                    if let Some(range) = self.updates.get_mut(&ty) {
                        if up.sequence_number >= range.low {
                            range.low = up.sequence_number.next();
                        }
                        if range.low > range.high {
                            self.updates.remove(&ty);
                        }
                    }
                }
                BlockItemKind::CredentialDeployment(_) => {}
            }
        }
    }

    /// Replay a block's transactions backward: the focus block moved to an
    /// ancestor that does not include them.
    pub fn reverse_block(&mut self, transactions: &[std::sync::Arc<BlockItem>]) {
        for item in transactions {
            match item.kind() {
                BlockItemKind::Normal(tx) => {
                    let range = self.accounts.entry(tx.sender).or_insert(PendingRange {
                        low: tx.nonce,
                        high: tx.nonce,
                    });
                    range.low = range.low.min(tx.nonce);
                    range.high = range.high.max(tx.nonce);
                }
                BlockItemKind::ChainUpdate(up) => {
                    let ty = up.payload.update_type();
                    let range = self.updates.entry(ty).or_insert(PendingRange {
                        low: up.sequence_number,
                        high: up.sequence_number,
                    });
                    range.low = range.low.min(up.sequence_number);
                    range.high = range.high.max(up.sequence_number);
                }
                BlockItemKind::CredentialDeployment(_) => {}
            }
        }
    }
}
