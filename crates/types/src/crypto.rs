//! Cryptographic wrappers.
//!
//! The consensus core treats signatures and VRF proofs as opaque
//! verify/prove pairs. Keys and signatures are stored as raw bytes so that
//! state snapshots serialize without touching the underlying library types;
//! parsing happens at verification time.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::hash::{Hash, Hasher};
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag for VRF proofs, preventing reuse of block signatures as proofs.
const VRF_DOMAIN: &[u8] = b"TESSERA.VRF.v1";

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

// serde's derive stops at 32-byte arrays; 64-byte values go through a
// sequence representation.
impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))?;
        Ok(Signature(array))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…")
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…")
    }
}

impl PublicKey {
    /// Verify `signature` over `message`.
    ///
    /// Returns false for malformed keys as well as wrong signatures; callers
    /// only care whether the claim holds.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }
}

/// A signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    secret: ed25519_dalek::SigningKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Derive a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        KeyPair {
            secret: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The public half.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.secret.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.secret.sign(message).to_bytes())
    }
}

/// A VRF proof: an ed25519 signature under the VRF domain tag.
///
/// Ed25519 signing is deterministic, so the proof doubles as a verifiable
/// pseudo-random function: the proof bytes are unpredictable without the
/// secret key, and [`VrfProof::output`] maps them to a uniform 32-byte value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfProof(pub [u8; 64]);

impl Serialize for VrfProof {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VrfProof {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))?;
        Ok(VrfProof(array))
    }
}

impl fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…")
    }
}

impl VrfProof {
    /// The pseudo-random output this proof attests to.
    pub fn output(&self) -> Hash {
        let mut h = Hasher::new();
        h.update(b"TESSERA.VRF.OUT");
        h.update(&self.0);
        h.finalize()
    }

    /// Interpret the leading output bytes as a uniform fraction of u64::MAX.
    ///
    /// Used for the leadership lottery: a baker wins slot `s` when this
    /// value is below its stake-scaled difficulty threshold.
    pub fn output_as_lot(&self) -> u64 {
        let out = self.output();
        u64::from_be_bytes(out.as_bytes()[..8].try_into().unwrap_or([0u8; 8]))
    }
}

/// The public half of a VRF keypair.
pub type VrfPublicKey = PublicKey;

/// A VRF keypair.
#[derive(Clone, Debug)]
pub struct VrfKeyPair {
    inner: KeyPair,
}

impl VrfKeyPair {
    /// Derive deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        VrfKeyPair {
            inner: KeyPair::from_seed(seed),
        }
    }

    /// The public half.
    pub fn public(&self) -> VrfPublicKey {
        self.inner.public()
    }

    /// Produce a proof over `message`.
    pub fn prove(&self, message: &[u8]) -> VrfProof {
        let mut tagged = Vec::with_capacity(VRF_DOMAIN.len() + message.len());
        tagged.extend_from_slice(VRF_DOMAIN);
        tagged.extend_from_slice(message);
        VrfProof(self.inner.sign(&tagged).0)
    }
}

/// Verify a VRF proof over `message` under `key`.
pub fn vrf_verify(key: &VrfPublicKey, message: &[u8], proof: &VrfProof) -> bool {
    let mut tagged = Vec::with_capacity(VRF_DOMAIN.len() + message.len());
    tagged.extend_from_slice(VRF_DOMAIN);
    tagged.extend_from_slice(message);
    key.verify(&tagged, &Signature(proof.0))
}

impl Serial for PublicKey {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Deserial for PublicKey {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(PublicKey(r.take_array()?))
    }
}

impl Serial for Signature {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Deserial for Signature {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(Signature(r.take_array()?))
    }
}

impl Serial for VrfProof {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Deserial for VrfProof {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(VrfProof(r.take_array()?))
    }
}
