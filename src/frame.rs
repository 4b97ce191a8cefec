//! Frame encoding and decoding.
//!
//! One frame travels as the plaintext of exactly one secure-channel record.
//!
//! Wire format:
//! ```text
//! +0  Tag length (1 byte)
//! +1  Tag (ASCII: DATA, ACK, FIN, FIN-ACK, REKEY, REKEY-ACK)
//! +n  Seq (4 bytes LE32)
//! +n+4  Payload length (4 bytes LE32)
//! +n+8  Payload (variable, <= MSS)
//! ```

use thiserror::Error;

use crate::core::constants::{MAX_PAYLOAD, REKEY_SEQ};

/// Frame type, carried on the wire as an ASCII tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Payload-bearing frame.
    Data,
    /// Acknowledgment; cumulative through `seq` at the sender.
    Ack,
    /// Orderly termination request.
    Fin,
    /// Acknowledgment of FIN.
    FinAck,
    /// Key-rotation request (seq 0).
    Rekey,
    /// Acknowledgment of REKEY (seq 0).
    RekeyAck,
}

impl FrameType {
    /// The wire tag for this frame type.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Fin => "FIN",
            Self::FinAck => "FIN-ACK",
            Self::Rekey => "REKEY",
            Self::RekeyAck => "REKEY-ACK",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"DATA" => Some(Self::Data),
            b"ACK" => Some(Self::Ack),
            b"FIN" => Some(Self::Fin),
            b"FIN-ACK" => Some(Self::FinAck),
            b"REKEY" => Some(Self::Rekey),
            b"REKEY-ACK" => Some(Self::RekeyAck),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Sequence number (monotonic per session for DATA, starts at 100).
    pub seq: u32,
    /// Opaque payload bytes; empty for control frames.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a DATA frame.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self { frame_type: FrameType::Data, seq, payload }
    }

    /// Create a control frame with no payload.
    pub fn control(frame_type: FrameType, seq: u32) -> Self {
        Self { frame_type, seq, payload: Vec::new() }
    }

    /// Create a REKEY frame targeting `epoch`.
    ///
    /// The target rides in the payload so a retransmitted REKEY is
    /// idempotent at the receiver.
    pub fn rekey(epoch: u32) -> Self {
        Self { frame_type: FrameType::Rekey, seq: REKEY_SEQ, payload: epoch.to_le_bytes().to_vec() }
    }

    /// Create a REKEY-ACK frame echoing `epoch`.
    pub fn rekey_ack(epoch: u32) -> Self {
        Self {
            frame_type: FrameType::RekeyAck,
            seq: REKEY_SEQ,
            payload: epoch.to_le_bytes().to_vec(),
        }
    }

    /// The target epoch of a REKEY / REKEY-ACK frame, if well formed.
    pub fn rekey_epoch(&self) -> Option<u32> {
        match self.frame_type {
            FrameType::Rekey | FrameType::RekeyAck => {
                Some(u32::from_le_bytes(self.payload.as_slice().try_into().ok()?))
            }
            _ => None,
        }
    }

    /// Total encoded size.
    pub fn wire_size(&self) -> usize {
        1 + self.frame_type.as_tag().len() + 4 + 4 + self.payload.len()
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.frame_type.as_tag().as_bytes();
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.push(tag.len() as u8);
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode from wire format.
    ///
    /// Malformed input yields an error; callers count and drop, a bad frame
    /// never aborts a session.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let tag_len = *data.first().ok_or(FrameError::TooShort { expected: 1, actual: 0 })? as usize;
        let header_len = 1 + tag_len + 8;
        if data.len() < header_len {
            return Err(FrameError::TooShort { expected: header_len, actual: data.len() });
        }

        let tag = &data[1..1 + tag_len];
        let frame_type = FrameType::from_tag(tag)
            .ok_or_else(|| FrameError::UnknownTag(String::from_utf8_lossy(tag).into_owned()))?;

        let seq = u32::from_le_bytes(data[1 + tag_len..1 + tag_len + 4].try_into().unwrap());
        let payload_len =
            u32::from_le_bytes(data[1 + tag_len + 4..header_len].try_into().unwrap()) as usize;

        if payload_len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(payload_len));
        }
        if data.len() < header_len + payload_len {
            return Err(FrameError::TooShort {
                expected: header_len + payload_len,
                actual: data.len(),
            });
        }

        let payload = data[header_len..header_len + payload_len].to_vec();
        Ok(Self { frame_type, seq, payload })
    }
}

/// Frame encoding/decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Input data is shorter than required.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Unrecognized frame tag.
    #[error("unknown frame tag: {0:?}")]
    UnknownTag(String),

    /// Declared payload length exceeds the MSS.
    #[error("payload length {0} exceeds MSS")]
    PayloadTooLarge(usize),
}
