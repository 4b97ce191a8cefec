//! High-level transport client.
//!
//! Connects to a server whose static public key is known in advance, runs
//! the secure handshake, and exposes the delivered payload stream plus the
//! final session statistics.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::SecureChannel;
use crate::core::constants::PUBLIC_KEY_SIZE;
use crate::core::error::SessionError;
use crate::core::events::SharedSink;
use crate::crypto::suite::default_preferences;
use crate::crypto::{CipherSuite, StaticKeypair};
use crate::session::{ReceiverSession, SessionConfig, SessionStats};

/// Client configuration.
pub struct ClientConfig {
    /// Server address.
    pub server_addr: SocketAddr,
    /// The server's static public key (trust anchor).
    pub server_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Cipher-suite preference order.
    pub preferences: Vec<CipherSuite>,
    /// Client identity; generated fresh when not provided.
    pub identity: Option<StaticKeypair>,
    /// Per-session tunables.
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Configuration with default preferences and session tunables.
    pub fn new(server_addr: SocketAddr, server_public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            server_addr,
            server_public_key,
            preferences: default_preferences(),
            identity: None,
            session: SessionConfig::default(),
        }
    }

    /// Override the cipher-suite preference order.
    pub fn preferences(mut self, preferences: Vec<CipherSuite>) -> Self {
        self.preferences = preferences;
        self
    }

    /// Use a fixed client identity.
    pub fn identity(mut self, identity: StaticKeypair) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Override the per-session tunables.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// A connected client session.
pub struct Client {
    session: ReceiverSession,
}

impl Client {
    /// Connect and hand back the client plus its delivery stream.
    ///
    /// Payloads arrive on the stream in sequence order, each exactly once.
    pub async fn connect(
        config: ClientConfig,
        sink: SharedSink,
    ) -> Result<(Self, mpsc::Receiver<Vec<u8>>), SessionError> {
        let identity = config.identity.unwrap_or_else(StaticKeypair::generate);
        let channel = SecureChannel::connect(
            config.server_addr,
            &identity,
            &config.server_public_key,
            &config.preferences,
            Arc::clone(&sink),
        )
        .await?;

        let (session, delivery) = ReceiverSession::spawn(channel, config.session, sink);
        Ok((Self { session }, delivery))
    }

    /// Wait for the session to end and return its statistics.
    pub async fn wait(self) -> Result<SessionStats, SessionError> {
        self.session.wait().await
    }
}
