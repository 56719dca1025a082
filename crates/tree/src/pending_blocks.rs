//! Pending (orphan) blocks.
//!
//! A block whose parent is not live yet parks here, keyed by the unknown
//! parent, until the parent arrives or the block goes stale. A slot-ordered
//! priority queue supports dropping pendings at or below the last-finalized
//! slot without scanning the whole table.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tessera_types::{BakedBlock, BlockHash, Slot};
use tracing::trace;

/// Table of blocks waiting for their parent.
#[derive(Debug, Default)]
pub struct PendingBlockTable {
    /// Parent hash → children waiting on it.
    by_parent: HashMap<BlockHash, Vec<BlockHash>>,
    /// The blocks themselves.
    blocks: HashMap<BlockHash, Arc<BakedBlock>>,
    /// Min-queue over (slot, child, parent). Entries are not removed when a
    /// block resolves through another path; stale entries are skipped at
    /// pop time.
    queue: BinaryHeap<Reverse<(Slot, BlockHash, BlockHash)>>,
}

impl PendingBlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently pending.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `hash` is pending.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Park `block` under its parent and enqueue it by slot.
    pub fn add_pending(&mut self, block: Arc<BakedBlock>) {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return;
        }
        trace!(block = %hash, parent = %block.parent, slot = %block.slot, "Parking pending block");
        self.by_parent.entry(block.parent).or_default().push(hash);
        self.queue.push(Reverse((block.slot, hash, block.parent)));
        self.blocks.insert(hash, block);
    }

    /// Atomically remove and return all pending children of `parent`.
    pub fn take_children_of(&mut self, parent: &BlockHash) -> Vec<Arc<BakedBlock>> {
        let Some(children) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        children
            .into_iter()
            .filter_map(|hash| self.blocks.remove(&hash))
            .collect()
    }

    /// Pop the next still-pending block with `slot <= slot_cap`, skipping
    /// queue entries whose block has already been resolved another way.
    pub fn take_next_until(&mut self, slot_cap: Slot) -> Option<Arc<BakedBlock>> {
        while let Some(Reverse((slot, hash, parent))) = self.queue.peek().copied() {
            if slot > slot_cap {
                return None;
            }
            self.queue.pop();
            if let Some(block) = self.blocks.remove(&hash) {
                // Also unhook from the parent list.
                if let Some(siblings) = self.by_parent.get_mut(&parent) {
                    siblings.retain(|h| *h != hash);
                    if siblings.is_empty() {
                        self.by_parent.remove(&parent);
                    }
                }
                return Some(block);
            }
            // Stale entry: resolved via take_children_of.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_keypair, test_vrf_keypair};
    use tessera_types::{BakerId, BlockBody, Hash};

    fn block(slot: u64, parent: &[u8]) -> Arc<BakedBlock> {
        let keys = test_keypair(1);
        let vrf = test_vrf_keypair(1);
        Arc::new(
            BlockBody {
                slot: Slot(slot),
                parent: Hash::digest(parent),
                baker_id: BakerId(0),
                baker_key: keys.public(),
                election_proof: vrf.prove(&slot.to_be_bytes()),
                block_nonce: vrf.prove(parent),
                last_finalized: Hash::digest(b"lfb"),
                finalization_record: None,
                transactions: vec![],
                state_hash: Hash::digest(b"state"),
                outcomes_hash: Hash::digest(b"outcomes"),
            }
            .sign(&keys),
        )
    }

    #[test]
    fn children_resolve_together() {
        let mut table = PendingBlockTable::new();
        let a = block(5, b"p1");
        let b = block(6, b"p1");
        let c = block(7, b"p2");
        table.add_pending(a.clone());
        table.add_pending(b.clone());
        table.add_pending(c.clone());

        let children = table.take_children_of(&Hash::digest(b"p1"));
        assert_eq!(children.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.contains(&c.hash()));
    }

    #[test]
    fn queue_drains_in_slot_order_up_to_cap() {
        let mut table = PendingBlockTable::new();
        let early = block(3, b"p1");
        let late = block(9, b"p2");
        table.add_pending(late.clone());
        table.add_pending(early.clone());

        let popped = table.take_next_until(Slot(5)).unwrap();
        assert_eq!(popped.hash(), early.hash());
        // The late block is beyond the cap.
        assert!(table.take_next_until(Slot(5)).is_none());
        assert!(table.contains(&late.hash()));
    }

    #[test]
    fn stale_queue_entries_are_skipped() {
        let mut table = PendingBlockTable::new();
        let a = block(3, b"p1");
        let b = block(4, b"p2");
        table.add_pending(a.clone());
        table.add_pending(b.clone());

        // Resolve `a` through the parent path; its queue entry goes stale.
        let taken = table.take_children_of(&Hash::digest(b"p1"));
        assert_eq!(taken.len(), 1);

        let popped = table.take_next_until(Slot(10)).unwrap();
        assert_eq!(popped.hash(), b.hash());
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let mut table = PendingBlockTable::new();
        let a = block(3, b"p1");
        table.add_pending(a.clone());
        table.add_pending(a.clone());
        assert_eq!(table.len(), 1);
        assert_eq!(table.take_children_of(&Hash::digest(b"p1")).len(), 1);
    }
}
