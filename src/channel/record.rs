//! Shared record-protection state for an established channel.
//!
//! The send and receive halves of a channel live in different tasks but
//! share one `RecordState`: the key schedule, the send counter, and the
//! per-epoch receive keys with their replay windows.
//!
//! Epoch acceptance: a record is opened with the keys of its own epoch,
//! provided that epoch is within one of the current receive epoch. That
//! tolerance is what keeps in-flight records decryptable across a REKEY
//! exchange.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::constants::HASH_SIZE;
use crate::core::error::CryptoError;
use crate::crypto::aead::{RecordHeader, RECORD_TYPE_APPLICATION};
use crate::crypto::{CipherSuite, KeySchedule, RecordKey, ReplayWindow, Role};
use crate::frame::Frame;

struct SendState {
    epoch: u32,
    counter: u64,
    key: RecordKey,
}

struct RecvEpoch {
    key: RecordKey,
    replay: ReplayWindow,
}

struct RecvState {
    /// Current receive epoch; epochs within ±1 are accepted.
    current: u32,
    /// Keys for accepted epochs, derived lazily. Index = epoch.
    epochs: Vec<(u32, RecvEpoch)>,
}

impl RecvState {
    fn epoch_entry(
        &mut self,
        epoch: u32,
        schedule: &KeySchedule,
    ) -> Result<&mut RecvEpoch, CryptoError> {
        // The epoch comes from an unauthenticated header; saturate so a
        // hostile value at either integer limit cannot overflow.
        if epoch < self.current.saturating_sub(1) || epoch > self.current.saturating_add(1) {
            return Err(CryptoError::EpochOutOfRange(epoch));
        }
        if let Some(idx) = self.epochs.iter().position(|(e, _)| *e == epoch) {
            return Ok(&mut self.epochs[idx].1);
        }
        let keys = schedule.derive_epoch(epoch)?;
        self.epochs.push((epoch, RecvEpoch { key: keys.recv, replay: ReplayWindow::new() }));
        let idx = self.epochs.len() - 1;
        Ok(&mut self.epochs[idx].1)
    }

    fn prune(&mut self) {
        let current = self.current;
        self.epochs.retain(|(e, _)| e.saturating_add(1) >= current);
    }
}

/// Record-protection state shared between the two channel halves.
pub struct RecordState {
    schedule: KeySchedule,
    send: Mutex<SendState>,
    recv: Mutex<RecvState>,
    mac_failures: AtomicU64,
}

impl RecordState {
    /// Build the epoch-0 state from a completed handshake.
    pub fn new(
        handshake_hash: [u8; HASH_SIZE],
        suite: CipherSuite,
        role: Role,
    ) -> Result<Self, CryptoError> {
        let schedule = KeySchedule::new(handshake_hash, suite, role);
        let keys = schedule.derive_epoch(0)?;
        Ok(Self {
            schedule,
            send: Mutex::new(SendState { epoch: 0, counter: 0, key: keys.send }),
            recv: Mutex::new(RecvState {
                current: 0,
                epochs: vec![(0, RecvEpoch { key: keys.recv, replay: ReplayWindow::new() })],
            }),
            mac_failures: AtomicU64::new(0),
        })
    }

    /// The negotiated suite.
    pub fn suite(&self) -> CipherSuite {
        self.schedule.suite()
    }

    /// Current send epoch.
    pub fn send_epoch(&self) -> u32 {
        self.send.lock().unwrap_or_else(|e| e.into_inner()).epoch
    }

    /// Encrypt a frame into a datagram.
    pub fn seal(&self, frame: &Frame) -> Result<Vec<u8>, CryptoError> {
        let mut send = self.send.lock().unwrap_or_else(|e| e.into_inner());
        let counter = send.counter;
        send.counter = counter.checked_add(1).ok_or(CryptoError::CounterExhaustion)?;

        let header = RecordHeader::application(self.schedule.suite(), send.epoch, counter);
        let ciphertext = send.key.seal(&header, &frame.encode())?;

        let mut datagram = Vec::with_capacity(header.encode().len() + ciphertext.len());
        datagram.extend_from_slice(&header.encode());
        datagram.extend_from_slice(&ciphertext);
        Ok(datagram)
    }

    /// Decrypt a datagram into a frame.
    ///
    /// Failures here are drop-and-count events for the caller, never fatal
    /// by themselves.
    pub fn open(&self, datagram: &[u8]) -> Result<Frame, CryptoError> {
        let header = RecordHeader::decode(datagram)?;
        if header.record_type != RECORD_TYPE_APPLICATION {
            return Err(CryptoError::DecryptionFailed);
        }
        if header.suite != self.schedule.suite() {
            return Err(CryptoError::DecryptionFailed);
        }

        let mut recv = self.recv.lock().unwrap_or_else(|e| e.into_inner());
        let entry = recv.epoch_entry(header.epoch, &self.schedule)?;
        let plaintext = entry.key.open(&header, &datagram[header.encode().len()..])?;
        // Only after the tag verified may the counter touch the window.
        entry.replay.check_and_update(header.counter)?;

        Frame::decode(&plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Switch both directions to `epoch`.
    ///
    /// The initiator calls this when REKEY-ACK arrives; the responder when
    /// REKEY arrives. Receive keys for the previous epoch stay accepted.
    pub fn advance_to_epoch(&self, epoch: u32) -> Result<(), CryptoError> {
        let keys = self.schedule.derive_epoch(epoch)?;
        {
            let mut send = self.send.lock().unwrap_or_else(|e| e.into_inner());
            if epoch <= send.epoch {
                // Duplicate REKEY; already there.
                return Ok(());
            }
            send.epoch = epoch;
            send.counter = 0;
            send.key = keys.send;
        }
        let mut recv = self.recv.lock().unwrap_or_else(|e| e.into_inner());
        recv.current = epoch;
        recv.prune();
        Ok(())
    }

    /// Record one dropped record; returns the running total.
    pub fn record_dropped(&self) -> u64 {
        self.mac_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total records dropped for authentication or replay reasons.
    pub fn dropped_total(&self) -> u64 {
        self.mac_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;

    fn pair(suite: CipherSuite) -> (RecordState, RecordState) {
        let hash = [0x55u8; HASH_SIZE];
        (
            RecordState::new(hash, suite, Role::Initiator).unwrap(),
            RecordState::new(hash, suite, Role::Responder).unwrap(),
        )
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (client, server) = pair(CipherSuite::Aes256GcmSha384);
        let frame = Frame::data(100, b"line one".to_vec());
        let datagram = client.seal(&frame).unwrap();
        assert_eq!(server.open(&datagram).unwrap(), frame);

        let ack = Frame::control(FrameType::Ack, 100);
        let datagram = server.seal(&ack).unwrap();
        assert_eq!(client.open(&datagram).unwrap(), ack);
    }

    #[test]
    fn test_replayed_datagram_rejected() {
        let (client, server) = pair(CipherSuite::Aes128GcmSha256);
        let datagram = client.seal(&Frame::data(100, vec![1])).unwrap();
        assert!(server.open(&datagram).is_ok());
        assert!(matches!(server.open(&datagram), Err(CryptoError::ReplayDetected)));
    }

    #[test]
    fn test_corrupted_datagram_rejected() {
        let (client, server) = pair(CipherSuite::Aes128GcmSha256);
        let mut datagram = client.seal(&Frame::data(100, vec![1, 2, 3])).unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0xFF;
        assert!(server.open(&datagram).is_err());
        // The replay window must not have consumed the counter.
        let good = client.seal(&Frame::data(101, vec![4])).unwrap();
        assert!(server.open(&good).is_ok());
    }

    #[test]
    fn test_epoch_advance_keeps_previous_epoch_readable() {
        let (client, server) = pair(CipherSuite::Aes256GcmSha384);

        let old = client.seal(&Frame::data(100, b"old epoch".to_vec())).unwrap();
        client.advance_to_epoch(1).unwrap();
        let new = client.seal(&Frame::data(101, b"new epoch".to_vec())).unwrap();

        // Receiver that already rotated still reads the in-flight old record.
        server.advance_to_epoch(1).unwrap();
        assert_eq!(server.open(&new).unwrap().payload, b"new epoch");
        assert_eq!(server.open(&old).unwrap().payload, b"old epoch");
    }

    #[test]
    fn test_distant_epoch_rejected() {
        let (client, server) = pair(CipherSuite::Aes128GcmSha256);
        client.advance_to_epoch(1).unwrap();
        client.advance_to_epoch(2).unwrap();
        client.advance_to_epoch(3).unwrap();
        let datagram = client.seal(&Frame::data(100, vec![])).unwrap();
        assert!(matches!(server.open(&datagram), Err(CryptoError::EpochOutOfRange(3))));
    }

    #[test]
    fn test_forged_epoch_at_integer_limit_rejected() {
        let (_client, server) = pair(CipherSuite::Aes128GcmSha256);
        // A spoofed header is parsed before any authentication; the hostile
        // epoch must fall out as out-of-range, not panic.
        let header = RecordHeader::application(CipherSuite::Aes128GcmSha256, u32::MAX, 0);
        let mut datagram = header.encode().to_vec();
        datagram.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            server.open(&datagram),
            Err(CryptoError::EpochOutOfRange(u32::MAX))
        ));
    }

    #[test]
    fn test_duplicate_epoch_advance_is_idempotent() {
        let (client, server) = pair(CipherSuite::Aes128GcmSha256);
        client.advance_to_epoch(1).unwrap();
        client.advance_to_epoch(1).unwrap();
        assert_eq!(client.send_epoch(), 1);
        server.advance_to_epoch(1).unwrap();
        let datagram = client.seal(&Frame::data(100, vec![9])).unwrap();
        assert!(server.open(&datagram).is_ok());
    }

    #[test]
    fn test_drop_counter() {
        let (client, _server) = pair(CipherSuite::Aes128GcmSha256);
        assert_eq!(client.dropped_total(), 0);
        assert_eq!(client.record_dropped(), 1);
        assert_eq!(client.record_dropped(), 2);
        assert_eq!(client.dropped_total(), 2);
    }
}
