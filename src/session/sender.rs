//! Sender-side session task.
//!
//! One task owns each sending session. It multiplexes three inputs:
//! commands from the collaborator (submit / finish), frames arriving on the
//! channel (ACK, FIN-ACK, REKEY-ACK), and the earliest of its timer
//! deadlines (retransmission, FIN wait, rekey, stall abort). Nothing polls;
//! the task sleeps until one of those fires.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{ChannelRecv, ChannelSend, RecordState, RecvOutcome, SecureChannel};
use crate::core::constants::MAX_PAYLOAD;
use crate::core::error::{ChannelError, SessionError, SubmitError};
use crate::core::events::{SharedSink, TransportEvent};
use crate::frame::{Frame, FrameType};

use super::congestion::CongestionController;
use super::rekey::{RekeyCoordinator, RekeyTimeout};
use super::state::{SessionConfig, SessionPhase, SessionStats};
use super::window::{AckDisposition, SendWindow};

enum Command {
    Submit { payload: Vec<u8>, reply: oneshot::Sender<Result<(), SubmitError>> },
    Finish,
}

/// Handle to a running sender session.
pub struct SenderSession {
    cmd: mpsc::Sender<Command>,
    task: JoinHandle<Result<SessionStats, SessionError>>,
}

impl SenderSession {
    /// Spawn the session task over an established channel.
    pub fn spawn(channel: SecureChannel, config: SessionConfig, sink: SharedSink) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let task = tokio::spawn(run(channel, config, sink, cmd_rx));
        Self { cmd: cmd_tx, task }
    }

    /// Queue one payload for reliable, ordered delivery.
    ///
    /// Backpressures when the send queue is full; fails once `finish` has
    /// been requested.
    pub async fn submit(&self, payload: Vec<u8>) -> Result<(), SubmitError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(SubmitError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD });
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd
            .send(Command::Submit { payload, reply: reply_tx })
            .await
            .map_err(|_| SubmitError::Closed)?;
        reply_rx.await.map_err(|_| SubmitError::Closed)?
    }

    /// Drain the queue, run the FIN exchange, and return the final stats.
    pub async fn finish(self) -> Result<SessionStats, SessionError> {
        // An already-ended task just means we skip straight to the result.
        let _ = self.cmd.send(Command::Finish).await;
        self.task.await.map_err(|_| SessionError::TimeoutAbort("session task panicked"))?
    }
}

struct FinExchange {
    seq: u32,
    sent_at: Instant,
    retries: u32,
}

struct Sender {
    config: SessionConfig,
    sink: SharedSink,
    started: Instant,
    window: SendWindow,
    congestion: CongestionController,
    rekey: RekeyCoordinator,
    pending: VecDeque<Vec<u8>>,
    stats: SessionStats,
    finishing: bool,
    fin: Option<FinExchange>,
}

async fn run(
    channel: SecureChannel,
    config: SessionConfig,
    sink: SharedSink,
    cmd_rx: mpsc::Receiver<Command>,
) -> Result<SessionStats, SessionError> {
    let peer = channel.peer();
    let state = channel.state();
    let (send, recv) = channel.split();

    let started = Instant::now();
    let mut s = Sender {
        window: SendWindow::new(config.retry_timeout, started),
        congestion: CongestionController::new(),
        rekey: RekeyCoordinator::new(started, config.rekey_interval),
        pending: VecDeque::new(),
        stats: SessionStats::default(),
        finishing: false,
        fin: None,
        config,
        sink,
        started,
    };

    // Whatever path the loop exits on, the session closes exactly once.
    match drive(&mut s, peer, &state, &send, recv, cmd_rx).await {
        Ok(clean) => {
            s.close(&state, clean);
            Ok(s.stats)
        }
        Err(err) => {
            s.close(&state, false);
            Err(err)
        }
    }
}

/// The session loop proper; `Ok(clean)` reports whether teardown completed.
async fn drive(
    s: &mut Sender,
    peer: SocketAddr,
    state: &RecordState,
    send: &ChannelSend,
    mut recv: ChannelRecv,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<bool, SessionError> {
    let mut cmd_open = true;

    loop {
        let now = Instant::now();

        // Stall abort: a window making no ACK progress for the whole wall
        // budget means the peer is gone.
        if !s.window.is_empty() && s.window.stall_duration(now) >= s.config.max_wall_timeout {
            tracing::warn!(%peer, "no acknowledgment progress, aborting session");
            return Err(SessionError::TimeoutAbort("no acknowledgment progress"));
        }

        // Retransmission timers. A timeout batch is one congestion event.
        let expired = s.window.expired(now);
        if !expired.is_empty() {
            s.congestion.on_timeout();
            s.emit_cwnd();
            for seq in expired {
                let Some(payload) = s.window.payload(seq).map(<[u8]>::to_vec) else {
                    continue;
                };
                send.send_frame(&Frame::data(seq, payload)).await?;
                let retx_count = s.window.mark_retransmitted(seq, now);
                s.stats.retransmits += 1;
                tracing::debug!(seq, retx_count, "retransmitting");
                s.sink.emit(TransportEvent::Retransmit { seq, retx_count });
            }
        }

        // FIN retransmission.
        if let Some(f) = s.fin.as_mut() {
            if now >= f.sent_at + s.config.fin_wait {
                if f.retries >= s.config.fin_retries {
                    tracing::warn!(%peer, "FIN unacknowledged, closing unilaterally");
                    return Ok(false);
                }
                send.send_frame(&Frame::control(FrameType::Fin, f.seq)).await?;
                f.sent_at = now;
                f.retries += 1;
                let seq = f.seq;
                s.sink.emit(TransportEvent::FinSent { seq });
            }
        }

        // Rekey initiation and its ACK deadline. No rotations once teardown
        // has started.
        if s.config.rekey_enabled && s.fin.is_none() {
            if s.rekey.due(now) {
                let epoch = s.rekey.initiate(state.send_epoch(), now);
                send.send_frame(&Frame::rekey(epoch)).await?;
                tracing::info!(epoch, "initiating key rotation");
                s.sink.emit(TransportEvent::RekeyInitiated { epoch });
            } else if s.rekey.in_flight() && now >= s.rekey.next_deadline() {
                match s.rekey.on_timeout(now) {
                    RekeyTimeout::Retry(epoch) => {
                        tracing::debug!(epoch, "REKEY unacknowledged, retrying");
                        send.send_frame(&Frame::rekey(epoch)).await?;
                    }
                    RekeyTimeout::Fatal => {
                        return Err(SessionError::TimeoutAbort("rekey unacknowledged"));
                    }
                }
            }
        }

        // Fill the congestion window from the queue.
        while s.window.in_flight() < s.congestion.window() {
            let Some(payload) = s.pending.pop_front() else { break };
            if s.window.is_empty() {
                s.window.touch(now);
            }
            let seq = s.window.register(payload.clone(), now);
            send.send_frame(&Frame::data(seq, payload)).await?;
            s.stats.frames_sent += 1;
            s.sink.emit(TransportEvent::DataSent { seq });
        }

        // Everything sent and acknowledged: begin teardown.
        if s.finishing && s.fin.is_none() && s.pending.is_empty() && s.window.is_empty() {
            let seq = s.window.next_seq();
            send.send_frame(&Frame::control(FrameType::Fin, seq)).await?;
            s.fin = Some(FinExchange { seq, sent_at: now, retries: 0 });
            s.sink.emit(TransportEvent::FinSent { seq });
        }

        let deadline = s.next_deadline(now);

        tokio::select! {
            cmd = cmd_rx.recv(), if cmd_open && s.pending.len() < s.config.submit_queue_depth => {
                match cmd {
                    Some(Command::Submit { payload, reply }) => {
                        let result = if s.finishing {
                            Err(SubmitError::Finishing)
                        } else {
                            s.pending.push_back(payload);
                            Ok(())
                        };
                        let _ = reply.send(result);
                    }
                    Some(Command::Finish) => {
                        s.finishing = true;
                    }
                    None => {
                        // Handle dropped without finish: drain and tear down.
                        s.finishing = true;
                        cmd_open = false;
                    }
                }
            }
            outcome = recv.recv_deadline(deadline) => {
                match outcome? {
                    RecvOutcome::Timeout => {}
                    RecvOutcome::Frame(frame) => {
                        if s.on_frame(frame, now, state)? {
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }
}

impl Sender {
    fn emit_cwnd(&self) {
        self.sink.emit(TransportEvent::CwndChange {
            cwnd: self.congestion.window(),
            ssthresh: self.congestion.ssthresh(),
        });
    }

    fn close(&mut self, state: &RecordState, clean: bool) {
        self.stats.records_dropped = state.dropped_total();
        self.stats.duration = self.started.elapsed();
        self.stats.clean_close = clean;
        let duration = self.stats.duration;
        self.sink.emit(TransportEvent::SessionClosed { duration, clean });
    }

    fn next_deadline(&self, now: Instant) -> Instant {
        let mut deadline = now + self.config.max_wall_timeout;
        if !self.window.is_empty() {
            if let Some(retx) = self.window.next_deadline() {
                deadline = deadline.min(retx);
            }
            let stall = now - self.window.stall_duration(now) + self.config.max_wall_timeout;
            deadline = deadline.min(stall);
        }
        if let Some(f) = &self.fin {
            deadline = deadline.min(f.sent_at + self.config.fin_wait);
        } else if self.config.rekey_enabled {
            deadline = deadline.min(self.rekey.next_deadline());
        }
        deadline
    }

    /// Handle a frame; `Ok(true)` means the FIN exchange completed.
    fn on_frame(
        &mut self,
        frame: Frame,
        now: Instant,
        state: &RecordState,
    ) -> Result<bool, SessionError> {
        match frame.frame_type {
            FrameType::Ack => {
                match self.window.on_ack(frame.seq, now) {
                    AckDisposition::Fresh { acked } => {
                        self.stats.acks_received += 1;
                        self.congestion.on_ack(acked.len());
                        self.sink.emit(TransportEvent::AckReceived { seq: frame.seq });
                        self.emit_cwnd();
                    }
                    AckDisposition::Duplicate => {
                        tracing::trace!(seq = frame.seq, "duplicate ACK ignored");
                    }
                    AckDisposition::Unknown => {
                        self.stats.unknown_acks += 1;
                        tracing::debug!(seq = frame.seq, "ACK for unassigned sequence ignored");
                    }
                }
                Ok(false)
            }
            FrameType::FinAck => match &self.fin {
                Some(f) if f.seq == frame.seq => Ok(true),
                Some(_) => {
                    tracing::debug!(seq = frame.seq, "FIN-ACK for wrong sequence ignored");
                    Ok(false)
                }
                None => Err(SessionError::ProtocolViolation {
                    frame_type: FrameType::FinAck,
                    state: SessionPhase::Established.name(),
                }),
            },
            FrameType::RekeyAck => {
                if let Some(epoch) = self.rekey.on_ack(now) {
                    state.advance_to_epoch(epoch).map_err(ChannelError::from)?;
                    self.stats.rekeys += 1;
                    tracing::info!(epoch, "key rotation acknowledged");
                    self.sink.emit(TransportEvent::RekeyAcknowledged { epoch });
                } else {
                    tracing::debug!("stray REKEY-ACK ignored");
                }
                Ok(false)
            }
            other => Err(SessionError::ProtocolViolation {
                frame_type: other,
                state: if self.fin.is_some() {
                    SessionPhase::Closing.name()
                } else {
                    SessionPhase::Established.name()
                },
            }),
        }
    }
}
