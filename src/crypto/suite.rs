//! Cipher suites and negotiation.
//!
//! The client sends an ordered preference list in its handshake payload; the
//! server selects the first entry it supports, preserving the client's
//! order. The handshake itself always requires extended key material bound
//! to the transcript (the Noise handshake hash), the analogue of requiring
//! Extended Master Secret.

use crate::core::error::CryptoError;

/// Record-protection cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherSuite {
    /// AES-128-GCM with SHA-256 key schedule.
    Aes128GcmSha256 = 0x01,
    /// AES-256-GCM with SHA-384-strength keys (SHA-256 schedule, 32-byte keys).
    Aes256GcmSha384 = 0x02,
}

impl CipherSuite {
    /// All suites this implementation supports, in server preference order.
    pub const SUPPORTED: [CipherSuite; 2] = [Self::Aes128GcmSha256, Self::Aes256GcmSha384];

    /// Suite identifier on the wire.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire identifier.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Aes128GcmSha256),
            0x02 => Some(Self::Aes256GcmSha384),
            _ => None,
        }
    }

    /// AEAD key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128GcmSha256 => 16,
            Self::Aes256GcmSha384 => 32,
        }
    }

    /// Stable name used in logs and events.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Aes128GcmSha256 => "AES128-GCM-SHA256",
            Self::Aes256GcmSha384 => "AES256-GCM-SHA384",
        }
    }
}

/// Default client preference order (strongest first).
pub fn default_preferences() -> Vec<CipherSuite> {
    vec![CipherSuite::Aes256GcmSha384, CipherSuite::Aes128GcmSha256]
}

/// Select a suite from the client's ordered preferences.
///
/// Returns the first client preference present in `server_supported`, so the
/// client's order wins.
pub fn negotiate(
    client_prefs: &[CipherSuite],
    server_supported: &[CipherSuite],
) -> Result<CipherSuite, CryptoError> {
    client_prefs
        .iter()
        .copied()
        .find(|suite| server_supported.contains(suite))
        .ok_or(CryptoError::NoCommonSuite)
}

/// Encode a preference list for the handshake payload.
pub fn encode_preferences(prefs: &[CipherSuite]) -> Vec<u8> {
    prefs.iter().map(|s| s.as_byte()).collect()
}

/// Decode a preference list from a handshake payload.
///
/// Unknown identifiers are skipped: a newer peer may offer suites we do not
/// implement.
pub fn decode_preferences(data: &[u8]) -> Vec<CipherSuite> {
    data.iter().filter_map(|&b| CipherSuite::from_byte(b)).collect()
}
