//! Noise_IK channel handshake.
//!
//! The client knows the server's static public key in advance (its trust
//! anchor) and authenticates it in one round trip:
//!
//! ```text
//! Noise_IK(s, rs):
//!   <- s                    # Server's static key known to client
//!   ...
//!   -> e, es, s, ss         # Client: ephemeral + encrypted static + prefs
//!   <- e, ee, se            # Server: ephemeral + selected suite
//! ```
//!
//! Handshake payloads carry the cipher-suite negotiation. Record keys are
//! derived from the handshake hash, binding them to the full transcript.

use snow::{Builder, HandshakeState};

use crate::core::constants::{HASH_SIZE, PUBLIC_KEY_SIZE};
use crate::core::error::CryptoError;

use super::keys::StaticKeypair;

/// Noise pattern for the channel handshake.
const NOISE_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_BLAKE2s";

/// Maximum Noise message size.
const NOISE_MAX_MESSAGE: usize = 65535;

/// Result of a completed handshake.
pub struct HandshakeResult {
    /// Transcript hash, the PRK for the record key schedule.
    pub handshake_hash: [u8; HASH_SIZE],
}

/// Client-side handshake state machine.
pub struct InitiatorHandshake {
    state: HandshakeState,
}

impl InitiatorHandshake {
    /// Create a new initiator handshake against a known server key.
    pub fn new(
        local: &StaticKeypair,
        server_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|_| CryptoError::HandshakeFailed("bad noise pattern".into()))?,
        );
        let state = builder
            .local_private_key(local.private_key())
            .remote_public_key(server_public)
            .build_initiator()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(Self { state })
    }

    /// Produce the initiation message carrying `payload` (suite preferences).
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; NOISE_MAX_MESSAGE];
        let len = self
            .state
            .write_message(payload, &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Consume the server's response; yields its payload (selected suite)
    /// and the transcript hash.
    pub fn read_message(
        mut self,
        message: &[u8],
    ) -> Result<(Vec<u8>, HandshakeResult), CryptoError> {
        let mut payload = vec![0u8; NOISE_MAX_MESSAGE];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        payload.truncate(len);

        let mut handshake_hash = [0u8; HASH_SIZE];
        handshake_hash.copy_from_slice(self.state.get_handshake_hash());

        // Completes the pattern; transport keys come from our own schedule.
        self.state
            .into_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        Ok((payload, HandshakeResult { handshake_hash }))
    }
}

/// Server-side handshake state machine.
pub struct ResponderHandshake {
    state: HandshakeState,
}

impl ResponderHandshake {
    /// Create a new responder handshake.
    pub fn new(local: &StaticKeypair) -> Result<Self, CryptoError> {
        let builder = Builder::new(
            NOISE_PATTERN
                .parse()
                .map_err(|_| CryptoError::HandshakeFailed("bad noise pattern".into()))?,
        );
        let state = builder
            .local_private_key(local.private_key())
            .build_responder()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        Ok(Self { state })
    }

    /// Consume the client's initiation; yields its payload (preference list)
    /// and the client's authenticated static public key.
    pub fn read_message(
        &mut self,
        message: &[u8],
    ) -> Result<(Vec<u8>, [u8; PUBLIC_KEY_SIZE]), CryptoError> {
        let mut payload = vec![0u8; NOISE_MAX_MESSAGE];
        let len = self
            .state
            .read_message(message, &mut payload)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        payload.truncate(len);

        let remote = self
            .state
            .get_remote_static()
            .ok_or_else(|| CryptoError::HandshakeFailed("no remote static key".into()))?;
        let mut client_public = [0u8; PUBLIC_KEY_SIZE];
        client_public.copy_from_slice(remote);

        Ok((payload, client_public))
    }

    /// Produce the response carrying `payload` (selected suite); yields the
    /// transcript hash.
    pub fn write_message(
        mut self,
        payload: &[u8],
    ) -> Result<(Vec<u8>, HandshakeResult), CryptoError> {
        let mut buf = vec![0u8; NOISE_MAX_MESSAGE];
        let len = self
            .state
            .write_message(payload, &mut buf)
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;
        buf.truncate(len);

        let mut handshake_hash = [0u8; HASH_SIZE];
        handshake_hash.copy_from_slice(self.state.get_handshake_hash());

        self.state
            .into_transport_mode()
            .map_err(|e| CryptoError::HandshakeFailed(e.to_string()))?;

        Ok((buf, HandshakeResult { handshake_hash }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let client_kp = StaticKeypair::generate();
        let server_kp = StaticKeypair::generate();

        let mut initiator = InitiatorHandshake::new(&client_kp, server_kp.public_key()).unwrap();
        let mut responder = ResponderHandshake::new(&server_kp).unwrap();

        let init = initiator.write_message(&[0x02, 0x01]).unwrap();
        let (prefs, client_public) = responder.read_message(&init).unwrap();
        assert_eq!(prefs, vec![0x02, 0x01]);
        assert_eq!(&client_public, client_kp.public_key());

        let (resp, server_result) = responder.write_message(&[0x02]).unwrap();
        let (selected, client_result) = initiator.read_message(&resp).unwrap();
        assert_eq!(selected, vec![0x02]);

        assert_eq!(client_result.handshake_hash, server_result.handshake_hash);
    }

    #[test]
    fn test_handshake_wrong_trust_anchor_fails() {
        let client_kp = StaticKeypair::generate();
        let server_kp = StaticKeypair::generate();
        let wrong_kp = StaticKeypair::generate();

        let mut initiator = InitiatorHandshake::new(&client_kp, wrong_kp.public_key()).unwrap();
        let mut responder = ResponderHandshake::new(&server_kp).unwrap();

        let init = initiator.write_message(&[]).unwrap();
        assert!(responder.read_message(&init).is_err());
    }

    #[test]
    fn test_distinct_sessions_have_distinct_hashes() {
        let client_kp = StaticKeypair::generate();
        let server_kp = StaticKeypair::generate();

        let run = || {
            let mut initiator =
                InitiatorHandshake::new(&client_kp, server_kp.public_key()).unwrap();
            let mut responder = ResponderHandshake::new(&server_kp).unwrap();
            let init = initiator.write_message(&[]).unwrap();
            responder.read_message(&init).unwrap();
            let (resp, result) = responder.write_message(&[]).unwrap();
            initiator.read_message(&resp).unwrap();
            result.handshake_hash
        };

        // Ephemeral keys differ per run, so transcripts differ.
        assert_ne!(run(), run());
    }
}
