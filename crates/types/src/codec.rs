//! Canonical serialization.
//!
//! # Wire format
//!
//! Every value that is hashed or sent between nodes uses this codec:
//! fixed-width integers are big-endian, sequences carry a `u32` length
//! prefix, options carry a one-byte tag. There is exactly one encoding per
//! logical value: `serialize(parse(bytes)) == bytes` is a protocol
//! requirement, not an implementation detail.

use thiserror::Error;

/// Errors that can occur while decoding canonical bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unexpected end of input: needed {needed} more bytes")]
    UnexpectedEof { needed: usize },

    #[error("Trailing bytes after value: {0} remaining")]
    TrailingBytes(usize),

    #[error("Invalid tag byte {tag} for {what}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("Length {got} exceeds limit {limit}")]
    LengthOutOfBounds { got: usize, limit: usize },

    #[error("Unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("Invalid utf-8 in string field")]
    InvalidUtf8,
}

/// Sequences longer than this are rejected at decode time.
///
/// Bounds allocation before any semantic check runs; real blocks stay far
/// below it because `maxBlockSize` caps the enclosing message.
pub const MAX_SEQUENCE_LENGTH: usize = 1 << 20;

/// Types with a canonical byte encoding.
pub trait Serial {
    /// Append the canonical encoding of `self` to `out`.
    fn serial(&self, out: &mut Vec<u8>);
}

/// Types decodable from their canonical encoding.
pub trait Deserial: Sized {
    /// Decode one value from the cursor.
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError>;
}

/// Encode a value to a fresh buffer.
pub fn serialize<T: Serial + ?Sized>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.serial(&mut out);
    out
}

/// Decode a value, requiring the input to be fully consumed.
pub fn deserialize<T: Deserial>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut r = ReadCursor::new(bytes);
    let value = T::deserial(&mut r)?;
    if !r.is_at_end() {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }
    Ok(value)
}

/// Forward-only reader over a byte slice.
pub struct ReadCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    /// Start reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        ReadCursor { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether all input has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Take `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n - self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Take a fixed-size array.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u32.
    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian u64.
    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Read a u32 length prefix, bounded by [`MAX_SEQUENCE_LENGTH`].
    pub fn length(&mut self) -> Result<usize, CodecError> {
        let len = self.u32()? as usize;
        if len > MAX_SEQUENCE_LENGTH {
            return Err(CodecError::LengthOutOfBounds {
                got: len,
                limit: MAX_SEQUENCE_LENGTH,
            });
        }
        Ok(len)
    }
}

impl Serial for u8 {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl Deserial for u8 {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        r.u8()
    }
}

impl Serial for u32 {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
}

impl Deserial for u32 {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        r.u32()
    }
}

impl Serial for u64 {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
}

impl Deserial for u64 {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        r.u64()
    }
}

impl<T: Serial> Serial for Vec<T> {
    fn serial(&self, out: &mut Vec<u8>) {
        (self.len() as u32).serial(out);
        for item in self {
            item.serial(out);
        }
    }
}

impl<T: Deserial> Deserial for Vec<T> {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let len = r.length()?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(T::deserial(r)?);
        }
        Ok(out)
    }
}

impl<T: Serial> Serial for Option<T> {
    fn serial(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(v) => {
                out.push(1);
                v.serial(out);
            }
        }
    }
}

impl<T: Deserial> Deserial for Option<T> {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        match r.u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::deserial(r)?)),
            tag => Err(CodecError::InvalidTag { what: "Option", tag }),
        }
    }
}

/// Byte strings carry a length prefix, unlike fixed-size arrays.
impl Serial for [u8] {
    fn serial(&self, out: &mut Vec<u8>) {
        (self.len() as u32).serial(out);
        out.extend_from_slice(self);
    }
}

impl Serial for str {
    fn serial(&self, out: &mut Vec<u8>) {
        self.as_bytes().serial(out);
    }
}

impl Serial for String {
    fn serial(&self, out: &mut Vec<u8>) {
        self.as_str().serial(out);
    }
}

impl Deserial for String {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let len = r.length()?;
        let bytes = r.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

macro_rules! serial_via_u64 {
    ($($ty:ty),*) => {
        $(
            impl Serial for $ty {
                fn serial(&self, out: &mut Vec<u8>) {
                    self.0.serial(out);
                }
            }

            impl Deserial for $ty {
                fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
                    Ok(Self(r.u64()?))
                }
            }
        )*
    };
}

use crate::identifiers::{
    Amount, BakerId, BlockHeight, Energy, Epoch, FinalizationIndex, GenesisIndex, Nonce, Slot,
    Timestamp, UpdateSequenceNumber,
};

serial_via_u64!(
    Slot,
    BlockHeight,
    BakerId,
    Epoch,
    Nonce,
    UpdateSequenceNumber,
    FinalizationIndex,
    Energy,
    Timestamp,
    Amount
);

impl Serial for GenesisIndex {
    fn serial(&self, out: &mut Vec<u8>) {
        self.0.serial(out);
    }
}

impl Deserial for GenesisIndex {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(GenesisIndex(r.u32()?))
    }
}

impl Serial for crate::hash::Hash {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Deserial for crate::hash::Hash {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(crate::hash::Hash(r.take_array()?))
    }
}

impl Serial for crate::identifiers::AccountAddress {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Deserial for crate::identifiers::AccountAddress {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(crate::identifiers::AccountAddress(r.take_array()?))
    }
}

impl Serial for crate::identifiers::ContractAddress {
    fn serial(&self, out: &mut Vec<u8>) {
        self.index.serial(out);
        self.subindex.serial(out);
    }
}

impl Deserial for crate::identifiers::ContractAddress {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(crate::identifiers::ContractAddress {
            index: r.u64()?,
            subindex: r.u64()?,
        })
    }
}

impl Serial for crate::identifiers::CredentialRegistrationId {
    fn serial(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Deserial for crate::identifiers::CredentialRegistrationId {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(crate::identifiers::CredentialRegistrationId(r.take_array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(serialize(&0x0102u32), vec![0, 0, 1, 2]);
        assert_eq!(serialize(&1u64), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn option_round_trip() {
        let v: Option<u64> = Some(7);
        let bytes = serialize(&v);
        assert_eq!(deserialize::<Option<u64>>(&bytes).unwrap(), Some(7));
        let n: Option<u64> = None;
        assert_eq!(deserialize::<Option<u64>>(&serialize(&n)).unwrap(), None);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = serialize(&7u64);
        bytes.push(0);
        assert!(matches!(
            deserialize::<u64>(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = serialize(&Hash::digest(b"x"));
        assert!(matches!(
            deserialize::<Hash>(&bytes[..16]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut bytes = Vec::new();
        (u32::MAX).serial(&mut bytes);
        assert!(matches!(
            deserialize::<Vec<u64>>(&bytes),
            Err(CodecError::LengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn random_byte_strings_round_trip() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        for _ in 0..64 {
            let len = rng.gen_range(0..512);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let mut out = Vec::new();
            bytes.as_slice().serial(&mut out);
            let mut r = ReadCursor::new(&out);
            let n = r.length().unwrap();
            assert_eq!(r.take(n).unwrap(), &bytes[..]);
            assert!(r.is_at_end());
        }
    }
}
