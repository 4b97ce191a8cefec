//! Protocol constants.
//!
//! Defaults for the wire contract and the timer/window machinery. Values
//! marked "design default" are configurable through `SessionConfig`.

use std::time::Duration;

// =============================================================================
// SEQUENCE SPACE
// =============================================================================

/// First sequence number assigned to a DATA frame.
pub const DATA_SEQ_START: u32 = 100;

/// Sequence number reserved for REKEY / REKEY-ACK frames.
pub const REKEY_SEQ: u32 = 0;

// =============================================================================
// WINDOW AND PAYLOAD BOUNDS
// =============================================================================

/// Upper bound on the congestion window and the receiver's reorder buffer.
pub const WINDOW_MAX: usize = 32;

/// Initial congestion window (slow start, design default).
pub const INITIAL_CWND: u32 = 1;

/// Initial slow-start threshold (design default).
pub const INITIAL_SSTHRESH: u32 = 16;

/// Largest payload carried by a single DATA frame (MSS).
pub const MAX_PAYLOAD: usize = 1024;

// =============================================================================
// TIMERS
// =============================================================================

/// Per-packet retransmission timeout.
pub const RETRY_TIMEOUT: Duration = Duration::from_millis(500);

/// How long the sender waits for FIN-ACK before retransmitting FIN.
pub const FIN_WAIT: Duration = Duration::from_secs(5);

/// FIN retransmissions before the session closes unilaterally.
pub const FIN_RETRIES: u32 = 3;

/// Receiver read deadline used to detect dead peers.
pub const IDLE_READ: Duration = Duration::from_secs(5);

/// Interval between initiator-driven key rotations.
pub const REKEY_INTERVAL: Duration = Duration::from_secs(120);

/// How long the initiator waits for REKEY-ACK before retrying (once).
pub const REKEY_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sessions making no ACK progress for this long are aborted.
pub const MAX_WALL_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Per-attempt handshake response timeout on the client.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum handshake attempts before giving up.
pub const HANDSHAKE_MAX_RETRIES: u32 = 5;

// =============================================================================
// RECORD LAYER
// =============================================================================

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Noise handshake hash size (BLAKE2s).
pub const HASH_SIZE: usize = 32;

/// GCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// GCM nonce size.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Anti-replay window size in bits.
pub const REPLAY_WINDOW_SIZE: usize = 2048;

/// Authenticated-decryption failures tolerated before the session aborts.
pub const MAC_FAILURE_LIMIT: u64 = 64;
