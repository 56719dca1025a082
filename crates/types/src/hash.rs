//! Content hashes.
//!
//! Every identifier in the protocol is the SHA-256 digest of a canonical
//! serialization. Equal logical values hash equally across implementations,
//! so the byte layout of everything fed into [`Hasher`] is normative.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// A 32-byte content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

/// Hash of a block's canonical serialization.
pub type BlockHash = Hash;

/// Hash of a transaction's canonical serialization.
pub type TransactionHash = Hash;

/// Reference to a deployed smart-contract module.
pub type ModuleRef = Hash;

/// Errors from parsing a hex-encoded hash.
#[derive(Debug, Error)]
pub enum HexError {
    #[error("Invalid hex length: expected 64 characters, got {0}")]
    InvalidLength(usize),

    #[error("Invalid hex character at position {0}")]
    InvalidCharacter(usize),
}

impl Hash {
    /// The zero hash (all bytes 0x00).
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes with SHA-256.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Hash(hasher.finalize().into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        if s.len() != 64 {
            return Err(HexError::InvalidLength(s.len()));
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or(HexError::InvalidCharacter(i * 2))?;
            let lo = hex_val(chunk[1]).ok_or(HexError::InvalidCharacter(i * 2 + 1))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Hash(out))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Incremental SHA-256 hasher over canonical serializations.
///
/// Thin wrapper so call sites never name the digest algorithm directly.
pub struct Hasher(Sha256);

impl Hasher {
    /// Start a fresh hasher.
    pub fn new() -> Self {
        Hasher(Sha256::new())
    }

    /// Feed bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Finish and return the digest.
    pub fn finalize(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine two hashes into one (interior node of a Merkle composition).
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut h = Hasher::new();
    h.update(left.as_bytes());
    h.update(right.as_bytes());
    h.finalize()
}

/// Merkle root over a list of leaf hashes.
///
/// Odd layers promote the trailing node unchanged. The empty list hashes to
/// the digest of the empty string so that an empty table still has a stable
/// root.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::digest(&[]);
    }
    let mut layer: Vec<Hash> = leaves.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            match pair {
                [l, r] => next.push(hash_pair(l, r)),
                [single] => next.push(*single),
                _ => unreachable!(),
            }
        }
        layer = next;
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        // SHA-256("abc")
        let h = Hash::digest(b"abc");
        assert_eq!(
            h.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::digest(b"round trip");
        let parsed = Hash::from_hex(&h.to_string()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert!(matches!(Hash::from_hex("ff"), Err(HexError::InvalidLength(2))));
        let bad = "zz".repeat(32);
        assert!(matches!(Hash::from_hex(&bad), Err(HexError::InvalidCharacter(0))));
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let c = Hash::digest(b"c");
        assert_ne!(merkle_root(&[a, b, c]), merkle_root(&[b, a, c]));
        assert_eq!(merkle_root(&[a]), a);
    }

    #[test]
    fn empty_merkle_root_is_stable() {
        assert_eq!(merkle_root(&[]), Hash::digest(&[]));
    }
}
