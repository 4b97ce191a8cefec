//! Receiver-side session task.
//!
//! Owns the receiving end of a session: acknowledges every DATA frame,
//! reorders out-of-sequence arrivals, answers REKEY with REKEY-ACK, and
//! completes the FIN / FIN-ACK teardown. Delivered payloads flow to the
//! collaborator over an mpsc channel in strict sequence order.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{ChannelRecv, ChannelSend, RecordState, RecvOutcome, SecureChannel};
use crate::core::error::{ChannelError, SessionError};
use crate::core::events::{SharedSink, TransportEvent};
use crate::frame::{Frame, FrameType};

use super::reorder::{ReceiveOutcome, ReorderBuffer};
use super::state::{SessionConfig, SessionPhase, SessionStats};

/// Handle to a running receiver session.
pub struct ReceiverSession {
    task: JoinHandle<Result<SessionStats, SessionError>>,
}

impl ReceiverSession {
    /// Spawn the session task; returns the handle and the delivery stream.
    pub fn spawn(
        channel: SecureChannel,
        config: SessionConfig,
        sink: SharedSink,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (delivery_tx, delivery_rx) = mpsc::channel(64);
        let task = tokio::spawn(run(channel, config, sink, delivery_tx));
        (Self { task }, delivery_rx)
    }

    /// Wait for the session to end.
    pub async fn wait(self) -> Result<SessionStats, SessionError> {
        self.task.await.map_err(|_| SessionError::TimeoutAbort("session task panicked"))?
    }
}

async fn run(
    channel: SecureChannel,
    config: SessionConfig,
    sink: SharedSink,
    delivery: mpsc::Sender<Vec<u8>>,
) -> Result<SessionStats, SessionError> {
    let peer = channel.peer();
    let state = channel.state();
    let (send, recv) = channel.split();

    let started = Instant::now();
    let mut stats = SessionStats::default();

    let result = drive(&config, &sink, &delivery, peer, &state, &send, recv, &mut stats).await;

    let clean = matches!(result, Ok(true));
    stats.records_dropped = state.dropped_total();
    stats.duration = started.elapsed();
    stats.clean_close = clean;
    sink.emit(TransportEvent::SessionClosed { duration: stats.duration, clean });

    result.map(|_| stats)
}

/// The ingest loop proper; `Ok(clean)` reports whether teardown completed.
#[allow(clippy::too_many_arguments)]
async fn drive(
    config: &SessionConfig,
    sink: &SharedSink,
    delivery: &mpsc::Sender<Vec<u8>>,
    peer: SocketAddr,
    state: &RecordState,
    send: &ChannelSend,
    mut recv: ChannelRecv,
    stats: &mut SessionStats,
) -> Result<bool, SessionError> {
    let mut reorder = ReorderBuffer::new();
    let mut fin_seq: Option<u32> = None;

    loop {
        let deadline = Instant::now() + config.idle_read;
        let outcome = match recv.recv_deadline(deadline).await {
            Ok(outcome) => outcome,
            // Our route was torn down after teardown completed.
            Err(ChannelError::Closed) if fin_seq.is_some() => return Ok(true),
            Err(err) => return Err(err.into()),
        };

        let frame = match outcome {
            RecvOutcome::Frame(frame) => frame,
            RecvOutcome::Timeout => {
                if fin_seq.is_some() {
                    // FIN retransmissions stopped; the sender is gone.
                    return Ok(true);
                }
                tracing::warn!(%peer, "peer went silent, aborting session");
                return Err(SessionError::TimeoutAbort("read deadline exceeded"));
            }
        };

        match frame.frame_type {
            FrameType::Data => {
                // A DATA straggler after FIN was already covered by the
                // flush; the only answer left is to repeat the FIN-ACK.
                if let Some(fin) = fin_seq {
                    send.send_frame(&Frame::control(FrameType::FinAck, fin)).await?;
                    continue;
                }
                match reorder.accept(frame.seq, frame.payload) {
                    ReceiveOutcome::Delivered { payloads, ack } => {
                        for (_, payload) in payloads {
                            stats.delivered += 1;
                            // A collaborator that stopped reading does not
                            // stop the protocol; keep acknowledging.
                            let _ = delivery.send(payload).await;
                        }
                        send.send_frame(&Frame::control(FrameType::Ack, ack)).await?;
                    }
                    ReceiveOutcome::Buffered { ack } | ReceiveOutcome::Duplicate { ack } => {
                        if let Some(ack) = ack {
                            send.send_frame(&Frame::control(FrameType::Ack, ack)).await?;
                        }
                    }
                    ReceiveOutcome::Overflow => {
                        // No ACK: an acknowledged-but-dropped frame would be
                        // retired by the sender and lost forever.
                        tracing::debug!(seq = frame.seq, "reorder buffer full, frame dropped");
                    }
                }
            }
            FrameType::Fin => {
                for (_, payload) in reorder.flush_contiguous() {
                    stats.delivered += 1;
                    let _ = delivery.send(payload).await;
                }
                send.send_frame(&Frame::control(FrameType::FinAck, frame.seq)).await?;
                if fin_seq.is_none() {
                    tracing::info!(%peer, seq = frame.seq, "FIN received, closing");
                    fin_seq = Some(frame.seq);
                }
            }
            FrameType::Rekey => {
                let Some(epoch) = frame.rekey_epoch() else {
                    tracing::debug!("malformed REKEY dropped");
                    continue;
                };
                // A retransmitted REKEY re-acks without advancing again.
                if epoch > state.send_epoch() {
                    state.advance_to_epoch(epoch).map_err(ChannelError::from)?;
                    stats.rekeys += 1;
                    tracing::info!(epoch, "key rotation applied");
                    sink.emit(TransportEvent::RekeyAcknowledged { epoch });
                }
                send.send_frame(&Frame::rekey_ack(epoch)).await?;
            }
            other @ (FrameType::Ack | FrameType::FinAck | FrameType::RekeyAck) => {
                return Err(SessionError::ProtocolViolation {
                    frame_type: other,
                    state: if fin_seq.is_some() {
                        SessionPhase::Closing.name()
                    } else {
                        SessionPhase::Established.name()
                    },
                });
            }
        }
    }
}
