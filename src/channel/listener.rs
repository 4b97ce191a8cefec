//! Server-side channel acceptance.
//!
//! One UDP socket serves every session. A demux task routes application
//! records to the owning channel by source address and queues handshake
//! initiations for [`SecureListener::accept`]. A handshake initiation from
//! an address that already has a channel replaces that channel: a peer that
//! rebinds its address is a new session, not a resumed one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::constants::PUBLIC_KEY_SIZE;
use crate::core::error::ChannelError;
use crate::core::events::{SharedSink, TransportEvent};
use crate::crypto::aead::RECORD_TYPE_HANDSHAKE;
use crate::crypto::noise::ResponderHandshake;
use crate::crypto::suite::{decode_preferences, negotiate, CipherSuite};
use crate::crypto::{Role, StaticKeypair};

use super::channel::{SecureChannel, INBOUND_QUEUE_DEPTH};
use super::record::RecordState;

type RouteTable = Arc<Mutex<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>>;

/// Accepts secure channels on a single UDP socket.
pub struct SecureListener {
    socket: Arc<UdpSocket>,
    keypair: StaticKeypair,
    routes: RouteTable,
    pending: mpsc::Receiver<(SocketAddr, Vec<u8>)>,
    sink: SharedSink,
    demux: JoinHandle<()>,
}

impl SecureListener {
    /// Bind the listener and start the demux task.
    pub async fn bind(
        addr: SocketAddr,
        keypair: StaticKeypair,
        sink: SharedSink,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let routes: RouteTable = Arc::new(Mutex::new(HashMap::new()));
        let (pending_tx, pending) = mpsc::channel(64);

        let demux = tokio::spawn(demux_loop(Arc::clone(&socket), Arc::clone(&routes), pending_tx));

        tracing::info!(addr = %socket.local_addr()?, "listener bound");
        Ok(Self { socket, keypair, routes, pending, sink, demux })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accept the next channel.
    ///
    /// Runs the responder handshake for the next queued initiation. An
    /// initiation that fails authentication or suite negotiation is logged
    /// and skipped; it never tears the listener down.
    pub async fn accept(
        &mut self,
    ) -> Result<(SecureChannel, [u8; PUBLIC_KEY_SIZE]), ChannelError> {
        loop {
            let (peer, message) = self.pending.recv().await.ok_or(ChannelError::Closed)?;
            match self.respond(peer, &message).await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    tracing::warn!(%peer, %err, "rejected handshake initiation");
                }
            }
        }
    }

    async fn respond(
        &self,
        peer: SocketAddr,
        message: &[u8],
    ) -> Result<(SecureChannel, [u8; PUBLIC_KEY_SIZE]), ChannelError> {
        let mut handshake = ResponderHandshake::new(&self.keypair)?;
        let (prefs_payload, client_public) = handshake.read_message(message)?;

        let prefs = decode_preferences(&prefs_payload);
        let suite = negotiate(&prefs, &CipherSuite::SUPPORTED)?;

        let (response, result) = handshake.write_message(&[suite.as_byte()])?;
        let mut datagram = Vec::with_capacity(1 + response.len());
        datagram.push(RECORD_TYPE_HANDSHAKE);
        datagram.extend_from_slice(&response);
        self.socket.send_to(&datagram, peer).await?;

        let state = Arc::new(RecordState::new(result.handshake_hash, suite, Role::Responder)?);
        let (route_tx, inbound) = mpsc::channel(INBOUND_QUEUE_DEPTH);

        // Replacing an existing route drops its sender; the old channel's
        // receive half then observes Closed.
        let replaced = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer, route_tx)
            .is_some();
        if replaced {
            tracing::info!(%peer, "peer re-handshake, replacing existing channel");
        }

        tracing::info!(%peer, suite = suite.wire_name(), "channel established");
        self.sink.emit(TransportEvent::HandshakeComplete { peer, suite });

        let channel = SecureChannel::from_parts(
            Arc::clone(&self.socket),
            peer,
            inbound,
            state,
            Arc::clone(&self.sink),
        );
        Ok((channel, client_public))
    }

    /// Remove a peer's route, closing its channel's receive half.
    pub fn remove_route(&self, peer: SocketAddr) {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).remove(&peer);
    }

    /// Handle for removing routes from other tasks.
    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard { routes: Arc::clone(&self.routes) }
    }
}

impl Drop for SecureListener {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

/// Clonable handle that removes a peer's route when its session ends.
#[derive(Clone)]
pub struct RouteGuard {
    routes: RouteTable,
}

impl RouteGuard {
    /// Remove `peer` from the routing table.
    pub fn remove(&self, peer: SocketAddr) {
        self.routes.lock().unwrap_or_else(|e| e.into_inner()).remove(&peer);
    }
}

async fn demux_loop(
    socket: Arc<UdpSocket>,
    routes: RouteTable,
    pending: mpsc::Sender<(SocketAddr, Vec<u8>)>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(%err, "listener socket failed, stopping demux");
                return;
            }
        };
        if len == 0 {
            continue;
        }

        if buf[0] == RECORD_TYPE_HANDSHAKE {
            if pending.try_send((from, buf[1..len].to_vec())).is_err() {
                tracing::debug!(%from, "handshake queue full, dropping initiation");
            }
            continue;
        }

        let route = {
            let routes = routes.lock().unwrap_or_else(|e| e.into_inner());
            routes.get(&from).cloned()
        };
        match route {
            Some(tx) => {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(buf[..len].to_vec())
                {
                    tracing::debug!(%from, "inbound queue full, shedding datagram");
                }
            }
            None => {
                tracing::debug!(%from, "datagram from unknown peer dropped");
            }
        }
    }
}
