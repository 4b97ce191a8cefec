//! Record protection.
//!
//! Every datagram after the handshake is one record:
//!
//! ```text
//! +0   Record type (1 byte)
//! +1   Suite id (1 byte)
//! +2   Epoch (4 bytes LE32)
//! +6   Counter (8 bytes LE64)
//! +14  Ciphertext || GCM tag
//! ```
//!
//! The 14-byte header is authenticated as AAD, so tampering with the epoch
//! or counter fails the tag check. The nonce is epoch || counter, unique per
//! key because the counter never wraps (the channel terminates first) and
//! each epoch has fresh keys.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use zeroize::Zeroize;

use crate::core::constants::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE};
use crate::core::error::CryptoError;

use super::suite::CipherSuite;

/// Encoded record header size.
pub const RECORD_HEADER_SIZE: usize = 14;

/// Record type for protected application records.
pub const RECORD_TYPE_APPLICATION: u8 = 0x17;

/// Record type for plaintext handshake messages.
pub const RECORD_TYPE_HANDSHAKE: u8 = 0x16;

/// The authenticated record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record type byte.
    pub record_type: u8,
    /// Negotiated suite.
    pub suite: CipherSuite,
    /// Key epoch.
    pub epoch: u32,
    /// Per-epoch monotonically increasing record counter.
    pub counter: u64,
}

impl RecordHeader {
    /// Header for a protected application record.
    pub fn application(suite: CipherSuite, epoch: u32, counter: u64) -> Self {
        Self { record_type: RECORD_TYPE_APPLICATION, suite, epoch, counter }
    }

    /// Encode to the wire/AAD form.
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[0] = self.record_type;
        buf[1] = self.suite.as_byte();
        buf[2..6].copy_from_slice(&self.epoch.to_le_bytes());
        buf[6..14].copy_from_slice(&self.counter.to_le_bytes());
        buf
    }

    /// Decode a header from the front of a datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let suite = CipherSuite::from_byte(data[1]).ok_or(CryptoError::DecryptionFailed)?;
        let epoch = u32::from_le_bytes(data[2..6].try_into().unwrap());
        let counter = u64::from_le_bytes(data[6..14].try_into().unwrap());
        Ok(Self { record_type: data[0], suite, epoch, counter })
    }

    fn nonce(&self) -> [u8; AEAD_NONCE_SIZE] {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce[..4].copy_from_slice(&self.epoch.to_le_bytes());
        nonce[4..12].copy_from_slice(&self.counter.to_le_bytes());
        nonce
    }
}

enum AeadCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

/// A single-direction AEAD key.
pub struct RecordKey {
    cipher: AeadCipher,
}

impl RecordKey {
    /// Build a key for `suite` from raw key material.
    ///
    /// The caller's key bytes are not retained.
    pub fn new(suite: CipherSuite, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != suite.key_len() {
            return Err(CryptoError::KeyDerivationFailed);
        }
        let cipher = match suite {
            CipherSuite::Aes128GcmSha256 => AeadCipher::Aes128(
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyDerivationFailed)?,
            ),
            CipherSuite::Aes256GcmSha384 => AeadCipher::Aes256(
                Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyDerivationFailed)?,
            ),
        };
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under `header`, returning ciphertext || tag.
    pub fn seal(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut aad = header.encode();
        let nonce_bytes = header.nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let payload = Payload { msg: plaintext, aad: &aad };
        let out = match &self.cipher {
            AeadCipher::Aes128(c) => c.encrypt(nonce, payload),
            AeadCipher::Aes256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::EncryptionFailed)?;
        aad.zeroize();
        Ok(out)
    }

    /// Decrypt ciphertext || tag under `header`.
    pub fn open(&self, header: &RecordHeader, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let aad = header.encode();
        let nonce_bytes = header.nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let payload = Payload { msg: ciphertext, aad: &aad };
        match &self.cipher {
            AeadCipher::Aes128(c) => c.decrypt(nonce, payload),
            AeadCipher::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::DecryptionFailed)
    }
}
