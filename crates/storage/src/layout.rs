//! On-disk layout and the legacy-layout migration.
//!
//! The store root holds, per era `n`, a block-state segment
//! `blockstate-<n>.dat` and an LMDB tree-state directory `treestate-<n>/`,
//! plus a `version.json` stamp. A pre-versioning root (`blockstate.dat` and
//! `treestate/`) is renamed in place to era 0 and stamped, once, at
//! startup.

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tessera_types::GenesisIndex;
use tracing::info;

/// Current store layout version.
pub const LAYOUT_VERSION: u32 = 1;

/// Name of the version stamp file.
const VERSION_FILE: &str = "version.json";

#[derive(Debug, Serialize, Deserialize)]
struct VersionStamp {
    version: u32,
}

/// Path of an era's block-state segment.
pub fn block_state_path(root: &Path, era: GenesisIndex) -> PathBuf {
    root.join(format!("blockstate-{}.dat", era.0))
}

/// Path of an era's tree-state LMDB directory.
pub fn tree_state_dir(root: &Path, era: GenesisIndex) -> PathBuf {
    root.join(format!("treestate-{}", era.0))
}

/// Read the version stamp, if present.
pub fn read_version(root: &Path) -> Result<Option<u32>, StorageError> {
    let path = root.join(VERSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    let stamp: VersionStamp = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Corrupt(format!("version stamp: {e}")))?;
    Ok(Some(stamp.version))
}

fn write_version(root: &Path) -> Result<(), StorageError> {
    let stamp = VersionStamp {
        version: LAYOUT_VERSION,
    };
    let bytes = serde_json::to_vec_pretty(&stamp)
        .map_err(|e| StorageError::Corrupt(format!("version stamp: {e}")))?;
    fs::write(root.join(VERSION_FILE), bytes)?;
    Ok(())
}

/// Prepare a store root: create it, migrate a legacy layout in place, and
/// stamp the version. Returns whether a legacy migration ran.
pub fn prepare_root(root: &Path) -> Result<bool, StorageError> {
    fs::create_dir_all(root)?;
    match read_version(root)? {
        Some(LAYOUT_VERSION) => return Ok(false),
        Some(other) => {
            return Err(StorageError::Corrupt(format!(
                "unsupported store layout version {other}"
            )))
        }
        None => {}
    }

    // Unversioned root: a legacy layout present means a one-shot rename.
    let legacy_blockstate = root.join("blockstate.dat");
    let legacy_treestate = root.join("treestate");
    let mut migrated = false;
    if legacy_blockstate.exists() {
        fs::rename(
            &legacy_blockstate,
            block_state_path(root, GenesisIndex(0)),
        )?;
        migrated = true;
    }
    if legacy_treestate.exists() {
        fs::rename(&legacy_treestate, tree_state_dir(root, GenesisIndex(0)))?;
        migrated = true;
    }
    write_version(root)?;
    if migrated {
        info!(root = %root.display(), "Migrated legacy store layout to era 0");
    }
    Ok(migrated)
}

/// Eras with a tree-state directory, ascending.
pub fn list_eras(root: &Path) -> Result<Vec<GenesisIndex>, StorageError> {
    let mut eras = Vec::new();
    if !root.exists() {
        return Ok(eras);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix("treestate-")) else {
            continue;
        };
        if let Ok(era) = rest.parse::<u32>() {
            eras.push(GenesisIndex(era));
        }
    }
    eras.sort();
    Ok(eras)
}
