//! Cryptographic foundation: identity keys, Noise_IK handshake, cipher-suite
//! negotiation, record protection, epoch key schedule, and anti-replay.

pub mod aead;
pub mod keys;
pub mod noise;
pub mod rekey;
pub mod replay;
pub mod suite;

pub use aead::{RecordHeader, RecordKey};
pub use keys::StaticKeypair;
pub use rekey::{EpochKeys, KeySchedule, Role};
pub use replay::ReplayWindow;
pub use suite::CipherSuite;
