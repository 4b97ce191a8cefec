//! High-level transport server.
//!
//! Accepts secure channels on one UDP socket, registers a session per peer,
//! and drives each session with payloads from a [`PayloadSource`]. Every
//! session runs in its own task; a session ending, cleanly or not, never
//! disturbs its siblings.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channel::{RouteGuard, SecureListener};
use crate::core::events::SharedSink;
use crate::crypto::StaticKeypair;
use crate::session::{SenderSession, SessionConfig};

use super::registry::SessionRegistry;

/// Supplies the payloads each session should deliver.
///
/// Called once per accepted session with its registry id.
pub trait PayloadSource: Send + Sync + 'static {
    /// The payloads to send, in delivery order.
    fn assign(&self, session_id: u64) -> Vec<Vec<u8>>;
}

impl<F> PayloadSource for F
where
    F: Fn(u64) -> Vec<Vec<u8>> + Send + Sync + 'static,
{
    fn assign(&self, session_id: u64) -> Vec<Vec<u8>> {
        self(session_id)
    }
}

/// Server configuration.
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// The server's long-term identity.
    pub keypair: StaticKeypair,
    /// Per-session tunables.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Configuration with default session tunables.
    pub fn new(bind_addr: SocketAddr, keypair: StaticKeypair) -> Self {
        Self { bind_addr, keypair, session: SessionConfig::default() }
    }

    /// Override the per-session tunables.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// A running transport server.
pub struct Server {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind and start accepting sessions.
    pub async fn serve<P: PayloadSource>(
        config: ServerConfig,
        source: Arc<P>,
        sink: SharedSink,
    ) -> std::io::Result<Self> {
        let listener =
            SecureListener::bind(config.bind_addr, config.keypair, Arc::clone(&sink)).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(SessionRegistry::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            config.session,
            source,
            Arc::clone(&registry),
            sink,
            shutdown_rx,
        ));

        Ok(Self { local_addr, registry, shutdown: Some(shutdown_tx), accept_task })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting new sessions and wait for the accept loop to exit.
    ///
    /// Sessions already running finish on their own.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.accept_task).await;
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn accept_loop<P: PayloadSource>(
    mut listener: SecureListener,
    session_config: SessionConfig,
    source: Arc<P>,
    registry: Arc<SessionRegistry>,
    sink: SharedSink,
    mut shutdown: oneshot::Receiver<()>,
) {
    let guard = listener.route_guard();
    loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("server shutting down");
                return;
            }
            accepted = listener.accept() => accepted,
        };
        let (channel, client_public) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::error!(%err, "listener failed, stopping accept loop");
                return;
            }
        };

        let peer = channel.peer();
        let session_id = registry.register(peer);
        tracing::info!(
            session_id,
            %peer,
            client_key = %hex_prefix(&client_public),
            "session registered"
        );

        let session = SenderSession::spawn(channel, session_config.clone(), Arc::clone(&sink));
        tokio::spawn(drive_session(
            session,
            session_id,
            peer,
            Arc::clone(&source),
            Arc::clone(&registry),
            guard.clone(),
        ));
    }
}

/// Feed one session its assigned payloads, then tear it down.
async fn drive_session<P: PayloadSource>(
    session: SenderSession,
    session_id: u64,
    peer: SocketAddr,
    source: Arc<P>,
    registry: Arc<SessionRegistry>,
    guard: RouteGuard,
) {
    for payload in source.assign(session_id) {
        if let Err(err) = session.submit(payload).await {
            tracing::warn!(session_id, %err, "submit failed, abandoning session");
            break;
        }
    }

    match session.finish().await {
        Ok(stats) => {
            tracing::info!(
                session_id,
                frames = stats.frames_sent,
                retransmits = stats.retransmits,
                rekeys = stats.rekeys,
                clean = stats.clean_close,
                duration_ms = stats.duration.as_millis() as u64,
                "session finished"
            );
        }
        Err(err) => {
            tracing::warn!(session_id, %err, "session ended with error");
        }
    }

    // Only the current owner of the address slot may clear the route.
    if registry.remove(peer, session_id) {
        guard.remove(peer);
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect::<String>() + ".."
}
