//! Observability hooks.
//!
//! The core emits structured events at well-defined points; committing them
//! anywhere (file, log pipeline, metrics) is the collaborator's duty.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::suite::CipherSuite;

/// A structured transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Secure handshake completed; the session is ESTABLISHED.
    HandshakeComplete {
        /// Remote endpoint.
        peer: SocketAddr,
        /// Negotiated cipher suite.
        suite: CipherSuite,
    },

    /// A DATA frame was sent for the first time.
    DataSent {
        /// Sequence number.
        seq: u32,
    },

    /// A fresh ACK was processed.
    AckReceived {
        /// Acknowledged sequence number (cumulative through this seq).
        seq: u32,
    },

    /// A DATA or FIN frame was retransmitted after a timeout.
    Retransmit {
        /// Sequence number.
        seq: u32,
        /// Retransmission count for this frame.
        retx_count: u32,
    },

    /// The congestion window changed.
    CwndChange {
        /// New congestion window (whole frames).
        cwnd: usize,
        /// Current slow-start threshold.
        ssthresh: usize,
    },

    /// A REKEY frame was sent.
    RekeyInitiated {
        /// Epoch that will be installed once acknowledged.
        epoch: u32,
    },

    /// The peer acknowledged a rekey; the new epoch is live.
    RekeyAcknowledged {
        /// The newly installed epoch.
        epoch: u32,
    },

    /// FIN was sent; the session is CLOSING.
    FinSent {
        /// FIN sequence number.
        seq: u32,
    },

    /// An inbound record was dropped before reaching the session
    /// (authentication failure or replay).
    RecordDropped {
        /// Running count of dropped records on this channel.
        dropped: u64,
    },

    /// The session reached CLOSED.
    SessionClosed {
        /// Session duration.
        duration: Duration,
        /// Whether teardown was orderly (FIN/FIN-ACK completed).
        clean: bool,
    },
}

/// Sink for transport events.
///
/// Implementations must be cheap and non-blocking; events are emitted from
/// the session tasks' hot path.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: TransportEvent);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TransportEvent) {}
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TransportEvent) {
        match &event {
            TransportEvent::HandshakeComplete { peer, suite } => {
                tracing::info!(%peer, suite = suite.wire_name(), "handshake_complete");
            }
            TransportEvent::DataSent { seq } => tracing::trace!(seq, "data_sent"),
            TransportEvent::AckReceived { seq } => tracing::trace!(seq, "ack_received"),
            TransportEvent::Retransmit { seq, retx_count } => {
                tracing::debug!(seq, retx_count, "retransmit");
            }
            TransportEvent::CwndChange { cwnd, ssthresh } => {
                tracing::trace!(cwnd, ssthresh, "cwnd_change");
            }
            TransportEvent::RekeyInitiated { epoch } => tracing::info!(epoch, "rekey_initiated"),
            TransportEvent::RekeyAcknowledged { epoch } => {
                tracing::info!(epoch, "rekey_acknowledged");
            }
            TransportEvent::FinSent { seq } => tracing::debug!(seq, "fin_sent"),
            TransportEvent::RecordDropped { dropped } => {
                tracing::warn!(dropped, "record_dropped");
            }
            TransportEvent::SessionClosed { duration, clean } => {
                tracing::info!(?duration, clean, "session_closed");
            }
        }
    }
}

/// Sink that forwards events into an unbounded channel, for tests and
/// collaborators that consume the stream asynchronously.
impl EventSink for tokio::sync::mpsc::UnboundedSender<TransportEvent> {
    fn emit(&self, event: TransportEvent) {
        let _ = self.send(event);
    }
}

/// Shared event sink handle.
pub type SharedSink = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_accepts_events() {
        let sink = NullSink;
        sink.emit(TransportEvent::DataSent { seq: 100 });
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink: SharedSink = Arc::new(tx);
        sink.emit(TransportEvent::AckReceived { seq: 101 });
        assert_eq!(rx.recv().await, Some(TransportEvent::AckReceived { seq: 101 }));
    }
}
