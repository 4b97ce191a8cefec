//! Error types for the KESTREL transport.

use thiserror::Error;

use crate::frame::FrameType;

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No cipher suite common to both preference lists.
    #[error("no common cipher suite")]
    NoCommonSuite,

    /// AEAD encryption failed.
    #[error("record encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted record).
    #[error("record decryption failed")]
    DecryptionFailed,

    /// Replayed record detected.
    #[error("replay detected")]
    ReplayDetected,

    /// Record carried an epoch outside the acceptance window.
    #[error("record epoch {0} not accepted")]
    EpochOutOfRange(u32),

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Nonce counter exhausted, the channel must terminate.
    #[error("nonce counter exhausted")]
    CounterExhaustion,
}

/// Errors on the secure datagram channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Handshake failure (fatal, no channel).
    #[error("channel handshake: {0}")]
    Handshake(#[from] CryptoError),

    /// Peer closed the channel.
    #[error("channel closed by peer")]
    Closed,

    /// Too many authenticated-decryption failures.
    #[error("MAC failure limit reached ({0} records dropped)")]
    MacFailureLimit(u64),

    /// I/O error on the underlying socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal session outcomes surfaced to the collaborator.
///
/// Anything representable by retransmission or congestion response is
/// recovered inside the core; these are the errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The secure handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer closed the channel.
    #[error("peer closed")]
    PeerClosed,

    /// No ACK progress within the wall-clock budget, or FIN went
    /// unacknowledged past its retry budget.
    #[error("timeout abort: {0}")]
    TimeoutAbort(&'static str),

    /// Authenticated-decryption failures exceeded the limit.
    #[error("MAC failure limit reached")]
    MacFailureLimit,

    /// A frame type arrived that is invalid in the current state.
    #[error("protocol violation: unexpected {frame_type} in {state}")]
    ProtocolViolation {
        /// The offending frame type.
        frame_type: FrameType,
        /// The state the session was in.
        state: &'static str,
    },

    /// I/O error on the underlying socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ChannelError> for SessionError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Handshake(e) => SessionError::HandshakeFailed(e.to_string()),
            ChannelError::Closed => SessionError::PeerClosed,
            ChannelError::MacFailureLimit(_) => SessionError::MacFailureLimit,
            ChannelError::Io(e) => SessionError::Io(e),
        }
    }
}

/// Errors returned from `submit`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// `finish` was already requested; no further payloads are accepted.
    #[error("session is finishing")]
    Finishing,

    /// Payload exceeds the negotiated MSS.
    #[error("payload too large: {size} > {max}")]
    PayloadTooLarge {
        /// Submitted payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// The session task is gone.
    #[error("session closed")]
    Closed,
}
