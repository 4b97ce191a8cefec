//! The secure datagram channel.
//!
//! A channel is one authenticated, encrypted UDP association with a peer.
//! It carries whole frames: one frame per record, one record per datagram.
//! The channel splits into a send half and a receive half so the two can
//! live in different tasks; they share the [`RecordState`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use crate::core::constants::{
    HANDSHAKE_MAX_RETRIES, HANDSHAKE_TIMEOUT, MAC_FAILURE_LIMIT, PUBLIC_KEY_SIZE,
};
use crate::core::error::{ChannelError, CryptoError};
use crate::core::events::{SharedSink, TransportEvent};
use crate::crypto::aead::RECORD_TYPE_HANDSHAKE;
use crate::crypto::noise::InitiatorHandshake;
use crate::crypto::suite::{decode_preferences, encode_preferences};
use crate::crypto::{CipherSuite, Role, StaticKeypair};
use crate::frame::Frame;

use super::record::RecordState;

/// Datagrams queued per channel before the route starts shedding.
pub(crate) const INBOUND_QUEUE_DEPTH: usize = 256;

/// Outcome of a deadline-bounded receive.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A frame arrived and authenticated.
    Frame(Frame),
    /// The deadline passed first.
    Timeout,
}

/// Sending half of a channel.
pub struct ChannelSend {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    state: Arc<RecordState>,
}

impl ChannelSend {
    /// Encrypt and transmit one frame.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let datagram = self.state.seal(frame)?;
        self.socket.send_to(&datagram, self.peer).await?;
        Ok(())
    }

    /// The remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// Receiving half of a channel.
pub struct ChannelRecv {
    inbound: mpsc::Receiver<Vec<u8>>,
    state: Arc<RecordState>,
    sink: SharedSink,
}

impl ChannelRecv {
    /// Receive the next authenticated frame, waiting until `deadline`.
    ///
    /// Records that fail authentication, replay, or epoch checks are dropped
    /// and counted; the wait continues. Crossing the drop limit is fatal.
    pub async fn recv_deadline(&mut self, deadline: Instant) -> Result<RecvOutcome, ChannelError> {
        loop {
            let datagram = tokio::select! {
                datagram = self.inbound.recv() => datagram,
                _ = tokio::time::sleep_until(deadline) => return Ok(RecvOutcome::Timeout),
            };
            let Some(datagram) = datagram else {
                return Err(ChannelError::Closed);
            };

            match self.state.open(&datagram) {
                Ok(frame) => return Ok(RecvOutcome::Frame(frame)),
                Err(err) => {
                    let dropped = self.state.record_dropped();
                    tracing::debug!(%err, dropped, "dropping unauthenticated record");
                    self.sink.emit(TransportEvent::RecordDropped { dropped });
                    if dropped >= MAC_FAILURE_LIMIT {
                        return Err(ChannelError::MacFailureLimit(dropped));
                    }
                }
            }
        }
    }
}

/// An established secure channel.
pub struct SecureChannel {
    send: ChannelSend,
    recv: ChannelRecv,
}

impl SecureChannel {
    pub(crate) fn from_parts(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        inbound: mpsc::Receiver<Vec<u8>>,
        state: Arc<RecordState>,
        sink: SharedSink,
    ) -> Self {
        Self {
            send: ChannelSend { socket, peer, state: Arc::clone(&state) },
            recv: ChannelRecv { inbound, state, sink },
        }
    }

    /// Connect to a server and run the handshake as initiator.
    ///
    /// Each attempt sends a fresh initiation and waits for the response;
    /// after the retry budget the connect fails.
    pub async fn connect(
        server_addr: SocketAddr,
        local: &StaticKeypair,
        server_public: &[u8; PUBLIC_KEY_SIZE],
        preferences: &[CipherSuite],
        sink: SharedSink,
    ) -> Result<Self, ChannelError> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let prefs_payload = encode_preferences(preferences);
        let mut buf = vec![0u8; 2048];

        for attempt in 1..=HANDSHAKE_MAX_RETRIES {
            let mut handshake = InitiatorHandshake::new(local, server_public)?;
            let init = handshake.write_message(&prefs_payload)?;
            let mut datagram = Vec::with_capacity(1 + init.len());
            datagram.push(RECORD_TYPE_HANDSHAKE);
            datagram.extend_from_slice(&init);
            socket.send_to(&datagram, server_addr).await?;

            let response = match timeout(HANDSHAKE_TIMEOUT, async {
                loop {
                    let (len, from) = socket.recv_from(&mut buf).await?;
                    if from == server_addr && buf.first() == Some(&RECORD_TYPE_HANDSHAKE) {
                        return Ok::<Vec<u8>, std::io::Error>(buf[1..len].to_vec());
                    }
                }
            })
            .await
            {
                Ok(recv) => recv?,
                Err(_) => {
                    tracing::debug!(attempt, "handshake response timed out");
                    continue;
                }
            };

            // A stale response to an earlier attempt cannot be read by this
            // handshake; that burns the attempt, not the whole connect.
            let (selected, result) = match handshake.read_message(&response) {
                Ok(read) => read,
                Err(err) => {
                    tracing::debug!(attempt, %err, "handshake response rejected, retrying");
                    continue;
                }
            };
            let suite = match decode_preferences(&selected).first().copied() {
                Some(suite) if preferences.contains(&suite) => suite,
                _ => return Err(CryptoError::NoCommonSuite.into()),
            };

            let state =
                Arc::new(RecordState::new(result.handshake_hash, suite, Role::Initiator)?);
            let inbound = spawn_pump(Arc::clone(&socket), server_addr);

            tracing::info!(peer = %server_addr, suite = suite.wire_name(), "channel established");
            sink.emit(TransportEvent::HandshakeComplete { peer: server_addr, suite });

            return Ok(Self::from_parts(socket, server_addr, inbound, state, sink));
        }

        Err(CryptoError::HandshakeFailed("no response from server".into()).into())
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (ChannelSend, ChannelRecv) {
        (self.send, self.recv)
    }

    /// The shared record state.
    pub fn state(&self) -> Arc<RecordState> {
        Arc::clone(&self.send.state)
    }

    /// The remote address.
    pub fn peer(&self) -> SocketAddr {
        self.send.peer
    }
}

/// Pump datagrams from a client socket into the channel's inbound queue.
///
/// Datagrams from other sources are dropped; the queue sheds under overload
/// rather than backpressuring the socket. The task exits, releasing its hold
/// on the socket, as soon as the channel's receive half is dropped.
fn spawn_pump(socket: Arc<UdpSocket>, peer: SocketAddr) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            let received = tokio::select! {
                received = socket.recv_from(&mut buf) => received,
                _ = tx.closed() => return,
            };
            let (len, from) = match received {
                Ok(v) => v,
                Err(err) => {
                    tracing::debug!(%err, "socket receive failed, stopping pump");
                    return;
                }
            };
            if from != peer {
                continue;
            }
            match tx.try_send(buf[..len].to_vec()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("inbound queue full, shedding datagram");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    });
    rx
}
