//! X25519 identity keys.
//!
//! The server's static public key is the client's trust anchor; certificate
//! files and CA handling belong to external collaborators.

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::constants::{PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

/// A static X25519 keypair for long-term identity.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct StaticKeypair {
    private: [u8; PRIVATE_KEY_SIZE],
    public: [u8; PUBLIC_KEY_SIZE],
}

impl StaticKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        OsRng.fill_bytes(&mut private);
        let secret = StaticSecret::from(private);
        let public = *PublicKey::from(&secret).as_bytes();
        Self { private, public }
    }

    /// Create a keypair from an existing private key.
    pub fn from_private(private: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(private);
        let public = *PublicKey::from(&secret).as_bytes();
        Self { private, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Get the private key. Handle with care.
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private
    }
}

impl Drop for StaticKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl std::fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("public", &hex_prefix(&self.public))
            .finish_non_exhaustive()
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect::<String>() + ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = StaticKeypair::generate();
        let kp2 = StaticKeypair::generate();
        assert_ne!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_keypair_from_private_is_deterministic() {
        let kp = StaticKeypair::generate();
        let rebuilt = StaticKeypair::from_private(*kp.private_key());
        assert_eq!(kp.public_key(), rebuilt.public_key());
    }

    #[test]
    fn test_debug_does_not_leak_private_key() {
        let kp = StaticKeypair::generate();
        let repr = format!("{kp:?}");
        assert!(!repr.contains(&hex::encode(kp.private_key())));
    }
}
