//! Epoch key schedule.
//!
//! Record keys are derived per epoch from the Noise handshake hash, so both
//! sides can compute any epoch's keys independently. A REKEY exchange only
//! coordinates *when* the send epoch advances; the key material itself needs
//! no extra round trip, which is what lets a receiver open records from the
//! previous epoch while a rotation is in flight.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::core::constants::HASH_SIZE;
use crate::core::error::CryptoError;

use super::aead::RecordKey;
use super::suite::CipherSuite;

/// HKDF info prefix for record key derivation.
const KEY_SCHEDULE_LABEL: &[u8] = b"kestrel v1 record keys";

/// Which side of the handshake this endpoint played.
///
/// Determines which half of the epoch key material is used for sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The connecting client.
    Initiator,
    /// The accepting server.
    Responder,
}

/// Directional record keys for one epoch.
pub struct EpochKeys {
    /// The epoch these keys protect.
    pub epoch: u32,
    /// Key for records this endpoint sends.
    pub send: RecordKey,
    /// Key for records this endpoint receives.
    pub recv: RecordKey,
}

/// Deterministic per-epoch key derivation rooted in the handshake transcript.
pub struct KeySchedule {
    prk: [u8; HASH_SIZE],
    suite: CipherSuite,
    role: Role,
}

impl KeySchedule {
    /// Build a schedule from the handshake hash and negotiated suite.
    pub fn new(handshake_hash: [u8; HASH_SIZE], suite: CipherSuite, role: Role) -> Self {
        Self { prk: handshake_hash, suite, role }
    }

    /// The negotiated suite.
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Derive the directional keys for `epoch`.
    pub fn derive_epoch(&self, epoch: u32) -> Result<EpochKeys, CryptoError> {
        let key_len = self.suite.key_len();

        let mut info = Vec::with_capacity(KEY_SCHEDULE_LABEL.len() + 5);
        info.extend_from_slice(KEY_SCHEDULE_LABEL);
        info.push(self.suite.as_byte());
        info.extend_from_slice(&epoch.to_le_bytes());

        let hk = Hkdf::<Sha256>::new(None, &self.prk);
        let mut okm = vec![0u8; key_len * 2];
        hk.expand(&info, &mut okm).map_err(|_| CryptoError::KeyDerivationFailed)?;

        // First half protects initiator-to-responder traffic.
        let (i2r, r2i) = okm.split_at(key_len);
        let keys = match self.role {
            Role::Initiator => EpochKeys {
                epoch,
                send: RecordKey::new(self.suite, i2r)?,
                recv: RecordKey::new(self.suite, r2i)?,
            },
            Role::Responder => EpochKeys {
                epoch,
                send: RecordKey::new(self.suite, r2i)?,
                recv: RecordKey::new(self.suite, i2r)?,
            },
        };
        okm.zeroize();
        Ok(keys)
    }
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.prk.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aead::RecordHeader;

    fn schedule_pair(suite: CipherSuite) -> (KeySchedule, KeySchedule) {
        let hash = [0x42u8; HASH_SIZE];
        (
            KeySchedule::new(hash, suite, Role::Initiator),
            KeySchedule::new(hash, suite, Role::Responder),
        )
    }

    #[test]
    fn test_roles_derive_mirrored_keys() {
        let (client, server) = schedule_pair(CipherSuite::Aes256GcmSha384);
        let ck = client.derive_epoch(0).unwrap();
        let sk = server.derive_epoch(0).unwrap();

        let header = RecordHeader::application(CipherSuite::Aes256GcmSha384, 0, 1);
        let record = ck.send.seal(&header, b"hello").unwrap();
        assert_eq!(sk.recv.open(&header, &record).unwrap(), b"hello");

        let reply = sk.send.seal(&header, b"world").unwrap();
        assert_eq!(ck.recv.open(&header, &reply).unwrap(), b"world");
    }

    #[test]
    fn test_epochs_produce_distinct_keys() {
        let (client, server) = schedule_pair(CipherSuite::Aes128GcmSha256);
        let e0 = client.derive_epoch(0).unwrap();
        let e1 = server.derive_epoch(1).unwrap();

        let h0 = RecordHeader::application(CipherSuite::Aes128GcmSha256, 0, 7);
        let record = e0.send.seal(&h0, b"payload").unwrap();
        // Epoch-1 keys cannot open an epoch-0 record.
        assert!(e1.recv.open(&h0, &record).is_err());
    }

    #[test]
    fn test_distinct_transcripts_distinct_keys() {
        let a = KeySchedule::new([1u8; HASH_SIZE], CipherSuite::Aes128GcmSha256, Role::Initiator);
        let b = KeySchedule::new([2u8; HASH_SIZE], CipherSuite::Aes128GcmSha256, Role::Responder);

        let header = RecordHeader::application(CipherSuite::Aes128GcmSha256, 0, 1);
        let record = a.derive_epoch(0).unwrap().send.seal(&header, b"x").unwrap();
        assert!(b.derive_epoch(0).unwrap().recv.open(&header, &record).is_err());
    }
}
