//! # KESTREL
//!
//! **K**eyed, **E**ncrypted, **S**equenced **T**ransport for **REL**iable
//! datagrams.
//!
//! KESTREL is a reliable, ordered, secure datagram transport over UDP. It
//! provides:
//!
//! - **Security**: a Noise_IK handshake against a pinned server key,
//!   AES-GCM record protection with anti-replay, and periodic key rotation
//! - **Reliability**: selective-repeat sliding window with per-packet
//!   retransmission timers and cumulative acknowledgments
//! - **Ordering**: exactly-once, in-sequence delivery through a bounded
//!   reorder buffer
//! - **Fairness**: Tahoe-style congestion control (slow start, congestion
//!   avoidance, timeout collapse)
//!
//! ## Modules
//!
//! - [`core`]: constants, error types, and observability events
//! - [`frame`]: the frame wire format (DATA, ACK, FIN, FIN-ACK, REKEY,
//!   REKEY-ACK)
//! - [`crypto`]: handshake, suites, record keys, epochs, anti-replay
//! - [`channel`]: the secure datagram channel over UDP
//! - [`session`]: window, congestion, reorder, rekey, and session tasks
//! - [`server`] / [`client`]: the high-level endpoints
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kestrel_protocol::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = StaticKeypair::generate();
//! let server_public = *keypair.public_key();
//!
//! // Each session is assigned ten numbered payloads.
//! let source = Arc::new(|session_id: u64| {
//!     (1..=10)
//!         .map(|n| format!("session {session_id} line {n}").into_bytes())
//!         .collect::<Vec<_>>()
//! });
//!
//! let sink: SharedSink = Arc::new(TracingSink);
//! let config = ServerConfig::new("127.0.0.1:0".parse()?, keypair);
//! let server = Server::serve(config, source, Arc::clone(&sink)).await?;
//!
//! let client_config = ClientConfig::new(server.local_addr(), server_public);
//! let (client, mut delivery) = Client::connect(client_config, sink).await?;
//! while let Some(payload) = delivery.recv().await {
//!     println!("{}", String::from_utf8_lossy(&payload));
//! }
//! let stats = client.wait().await?;
//! assert!(stats.clean_close);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod client;
pub mod core;
pub mod crypto;
pub mod frame;
pub mod server;
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::channel::{SecureChannel, SecureListener};
    pub use crate::client::{Client, ClientConfig};
    pub use crate::core::error::{ChannelError, CryptoError, SessionError, SubmitError};
    pub use crate::core::events::{
        EventSink, NullSink, SharedSink, TracingSink, TransportEvent,
    };
    pub use crate::crypto::{CipherSuite, StaticKeypair};
    pub use crate::frame::{Frame, FrameType};
    pub use crate::server::{PayloadSource, Server, ServerConfig};
    pub use crate::session::{SessionConfig, SessionStats};
}

pub use crate::core::error::{ChannelError, CryptoError, SessionError, SubmitError};
pub use crate::crypto::{CipherSuite, StaticKeypair};
pub use crate::frame::{Frame, FrameType};
pub use crate::session::{SessionConfig, SessionStats};
