//! LMDB-backed persistence for the consensus core.
//!
//! The durable store is append-structured per era: one block-state segment
//! and one LMDB tree-state environment per era, named by era index, behind
//! a version-stamped root with a one-shot migration from the legacy
//! unversioned layout. Finalization advances commit as single write
//! transactions; recovery re-derives the tree from the finalization list,
//! the height index and the stored blocks, cross-checked against the
//! segment.

mod export;
mod layout;
mod recovery;
mod store;

use thiserror::Error;

pub use export::{
    read_bundle, read_bundle_index, write_bundle, BundleChunk, ChunkIndexEntry, BUNDLE_VERSION,
};
pub use layout::{
    block_state_path, list_eras, prepare_root, read_version, tree_state_dir, LAYOUT_VERSION,
};
pub use recovery::{recover_all_eras, recover_era, recover_latest_era, RecoveredEra};
pub use store::{read_block_state_segment, write_block_state_segment, TreeStore};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] lmdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Missing file: {0}")]
    Missing(String),
}
