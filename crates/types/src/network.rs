//! Wire envelope for consensus messages.
//!
//! # Wire format
//!
//! ```text
//! [type: u8][genesis_index: u32][version: u8][payload]
//! ```
//!
//! - Type selects block / finalization-message / finalization-record /
//!   catch-up-status.
//! - Genesis index routes the message to an era; the receiver rejects
//!   unknown indices before touching the payload.
//! - Version is currently `1`; the payload is the canonical encoding of the
//!   message body.

use crate::block::BakedBlock;
use crate::codec::{self, CodecError, Deserial, ReadCursor, Serial};
use crate::finalization::FinalizationRecord;
use crate::hash::BlockHash;
use crate::identifiers::{FinalizationIndex, GenesisIndex};

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Message type tags.
const TAG_BLOCK: u8 = 0;
const TAG_FINALIZATION_MESSAGE: u8 = 1;
const TAG_FINALIZATION_RECORD: u8 = 2;
const TAG_CATCH_UP_STATUS: u8 = 3;

/// An opaque finalization-protocol message, relayed to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizationMessage {
    /// Finalization session the message belongs to.
    pub session_index: u32,
    /// Protocol payload, interpreted only by the finalization component.
    pub payload: Vec<u8>,
}

impl Serial for FinalizationMessage {
    fn serial(&self, out: &mut Vec<u8>) {
        self.session_index.serial(out);
        self.payload.as_slice().serial(out);
    }
}

impl Deserial for FinalizationMessage {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let session_index = r.u32()?;
        let len = r.length()?;
        Ok(FinalizationMessage {
            session_index,
            payload: r.take(len)?.to_vec(),
        })
    }
}

/// A peer's catch-up summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpStatus {
    /// Whether the sender expects a response burst.
    pub is_request: bool,
    pub last_finalized_block: BlockHash,
    pub last_finalized_index: FinalizationIndex,
    /// Tip of the sender's best chain.
    pub best_block: BlockHash,
}

impl Serial for CatchUpStatus {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(self.is_request as u8);
        self.last_finalized_block.serial(out);
        self.last_finalized_index.serial(out);
        self.best_block.serial(out);
    }
}

impl Deserial for CatchUpStatus {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let is_request = match r.u8()? {
            0 => false,
            1 => true,
            tag => {
                return Err(CodecError::InvalidTag {
                    what: "CatchUpStatus.is_request",
                    tag,
                })
            }
        };
        Ok(CatchUpStatus {
            is_request,
            last_finalized_block: BlockHash::deserial(r)?,
            last_finalized_index: FinalizationIndex::deserial(r)?,
            best_block: BlockHash::deserial(r)?,
        })
    }
}

/// A decoded inbound consensus message.
#[derive(Debug, Clone)]
pub enum ConsensusMessage {
    Block(BakedBlock),
    FinalizationMessage(FinalizationMessage),
    FinalizationRecord(FinalizationRecord),
    CatchUpStatus(CatchUpStatus),
}

impl ConsensusMessage {
    fn tag(&self) -> u8 {
        match self {
            ConsensusMessage::Block(_) => TAG_BLOCK,
            ConsensusMessage::FinalizationMessage(_) => TAG_FINALIZATION_MESSAGE,
            ConsensusMessage::FinalizationRecord(_) => TAG_FINALIZATION_RECORD,
            ConsensusMessage::CatchUpStatus(_) => TAG_CATCH_UP_STATUS,
        }
    }

    /// Human-readable message type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsensusMessage::Block(_) => "Block",
            ConsensusMessage::FinalizationMessage(_) => "FinalizationMessage",
            ConsensusMessage::FinalizationRecord(_) => "FinalizationRecord",
            ConsensusMessage::CatchUpStatus(_) => "CatchUpStatus",
        }
    }
}

/// Encode a message for era `genesis_index`.
pub fn encode_message(genesis_index: GenesisIndex, message: &ConsensusMessage) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(message.tag());
    genesis_index.serial(&mut out);
    out.push(WIRE_VERSION);
    match message {
        ConsensusMessage::Block(b) => b.serial(&mut out),
        ConsensusMessage::FinalizationMessage(m) => m.serial(&mut out),
        ConsensusMessage::FinalizationRecord(rec) => rec.serial(&mut out),
        ConsensusMessage::CatchUpStatus(s) => s.serial(&mut out),
    }
    out
}

/// Decode an inbound envelope.
pub fn decode_message(bytes: &[u8]) -> Result<(GenesisIndex, ConsensusMessage), CodecError> {
    let mut r = ReadCursor::new(bytes);
    let tag = r.u8()?;
    let genesis_index = GenesisIndex::deserial(&mut r)?;
    let version = r.u8()?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    let rest = r.take(r.remaining())?;
    let message = match tag {
        TAG_BLOCK => ConsensusMessage::Block(codec::deserialize(rest)?),
        TAG_FINALIZATION_MESSAGE => {
            ConsensusMessage::FinalizationMessage(codec::deserialize(rest)?)
        }
        TAG_FINALIZATION_RECORD => ConsensusMessage::FinalizationRecord(codec::deserialize(rest)?),
        TAG_CATCH_UP_STATUS => ConsensusMessage::CatchUpStatus(codec::deserialize(rest)?),
        tag => {
            return Err(CodecError::InvalidTag {
                what: "ConsensusMessage",
                tag,
            })
        }
    };
    Ok((genesis_index, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn catch_up_status_round_trip() {
        let status = CatchUpStatus {
            is_request: true,
            last_finalized_block: Hash::digest(b"lfb"),
            last_finalized_index: FinalizationIndex(3),
            best_block: Hash::digest(b"best"),
        };
        let bytes = encode_message(
            GenesisIndex(2),
            &ConsensusMessage::CatchUpStatus(status.clone()),
        );
        let (gi, decoded) = decode_message(&bytes).unwrap();
        assert_eq!(gi, GenesisIndex(2));
        match decoded {
            ConsensusMessage::CatchUpStatus(s) => assert_eq!(s, status),
            other => panic!("wrong message type: {}", other.type_name()),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut bytes = vec![9u8]; // bad tag
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.push(WIRE_VERSION);
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::InvalidTag { .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let status = CatchUpStatus {
            is_request: false,
            last_finalized_block: Hash::ZERO,
            last_finalized_index: FinalizationIndex(0),
            best_block: Hash::ZERO,
        };
        let mut bytes = encode_message(
            GenesisIndex(0),
            &ConsensusMessage::CatchUpStatus(status),
        );
        bytes[5] = 99; // version byte
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::UnknownVersion(99))
        ));
    }
}
