//! Smart-contract modules and instances.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_types::{AccountAddress, Amount, ContractAddress, Hash, ModuleRef, Serial};

/// A deployed module.
///
/// The artifact is the verified code blob; the metadata (size, exposed
/// entrypoints) stays resident while the artifact itself may be dropped from
/// the cache for finalized states and reloaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Content hash of the artifact; the module's identity.
    pub module_ref: ModuleRef,
    /// Artifact size in bytes.
    pub size: u64,
    /// Entrypoints the artifact exposes, sorted.
    pub entrypoints: Vec<String>,
    /// The artifact. `None` when evicted; [`crate::cache::StateCaches`]
    /// reloads it from the store.
    pub artifact: Option<Arc<Vec<u8>>>,
}

impl Module {
    /// Derive a module from its source artifact.
    ///
    /// Entrypoint discovery is the loader's job; the artifact format is a
    /// list of newline-separated exported names in this implementation's
    /// test engine, and a WASM export section in production.
    pub fn from_artifact(source: Vec<u8>, entrypoints: Vec<String>) -> Self {
        let module_ref = Hash::digest(&source);
        Module {
            module_ref,
            size: source.len() as u64,
            entrypoints,
            artifact: Some(Arc::new(source)),
        }
    }

    /// Content hash, a leaf of the modules table root.
    ///
    /// Only identity and metadata contribute: the artifact is already bound
    /// by `module_ref`.
    pub fn hash(&self) -> Hash {
        let mut out = Vec::new();
        self.module_ref.serial(&mut out);
        self.size.serial(&mut out);
        (self.entrypoints.len() as u32).serial(&mut out);
        for e in &self.entrypoints {
            e.serial(&mut out);
        }
        Hash::digest(&out)
    }
}

/// A contract instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub address: ContractAddress,
    pub module_ref: ModuleRef,
    /// The init entrypoint this instance was created from.
    pub init_name: String,
    /// Immutable parameters passed at init.
    pub init_params: Vec<u8>,
    /// Mutable contract state.
    pub state: Vec<u8>,
    pub balance: Amount,
    pub owner: AccountAddress,
}

impl Instance {
    /// Content hash, a leaf of the instances table root.
    pub fn hash(&self) -> Hash {
        let mut out = Vec::new();
        self.address.serial(&mut out);
        self.module_ref.serial(&mut out);
        self.init_name.serial(&mut out);
        self.init_params.as_slice().serial(&mut out);
        self.state.as_slice().serial(&mut out);
        self.balance.serial(&mut out);
        self.owner.serial(&mut out);
        Hash::digest(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_ref_is_artifact_digest() {
        let m = Module::from_artifact(b"artifact".to_vec(), vec!["init".into()]);
        assert_eq!(m.module_ref, Hash::digest(b"artifact"));
        assert_eq!(m.size, 8);
    }

    #[test]
    fn module_hash_ignores_artifact_presence() {
        let mut m = Module::from_artifact(b"artifact".to_vec(), vec!["init".into()]);
        let with = m.hash();
        m.artifact = None;
        assert_eq!(m.hash(), with);
    }

    #[test]
    fn instance_hash_tracks_state() {
        let a = Instance {
            address: ContractAddress::new(0),
            module_ref: Hash::digest(b"m"),
            init_name: "init_counter".into(),
            init_params: vec![],
            state: vec![0],
            balance: Amount::ZERO,
            owner: AccountAddress([1u8; 32]),
        };
        let mut b = a.clone();
        b.state = vec![1];
        assert_ne!(a.hash(), b.hash());
    }
}
