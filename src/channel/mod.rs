//! Secure datagram channel: handshake, record protection, and the UDP
//! plumbing that carries frames between peers.

pub mod channel;
pub mod listener;
pub mod record;

pub use channel::{ChannelRecv, ChannelSend, RecvOutcome, SecureChannel};
pub use listener::{RouteGuard, SecureListener};
pub use record::RecordState;
