//! Reliability-core simulations with a synthetic clock and a lossy link.
//!
//! These drive the pure state machines (send window, congestion controller,
//! reorder buffer) directly, with deterministic loss and reordering, so the
//! recovery behavior is tested without sockets or timers.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use kestrel_protocol::session::{
    AckDisposition, CongestionController, ReceiveOutcome, ReorderBuffer, SendWindow,
};

const RTO: Duration = Duration::from_millis(500);

/// Deterministic lossy link: drops DATA transmissions whose global index is
/// listed, delivers the rest immediately.
struct LossyLink {
    drops: Vec<u64>,
    transmissions: u64,
}

impl LossyLink {
    fn new(drops: &[u64]) -> Self {
        Self { drops: drops.to_vec(), transmissions: 0 }
    }

    fn transmit(&mut self) -> bool {
        let index = self.transmissions;
        self.transmissions += 1;
        !self.drops.contains(&index)
    }
}

/// Run a full transfer of `payloads` through a lossy link; returns the
/// delivered payloads and the number of retransmissions.
fn run_transfer(payloads: Vec<Vec<u8>>, link: &mut LossyLink) -> (Vec<Vec<u8>>, u64) {
    let mut now = Instant::now();
    let mut window = SendWindow::new(RTO, now);
    let mut congestion = CongestionController::new();
    let mut reorder = ReorderBuffer::new();
    let mut queue: VecDeque<Vec<u8>> = payloads.into();
    let mut delivered = Vec::new();
    let mut retransmits = 0u64;
    // ACKs travel instantly in this model.
    let mut acks: VecDeque<u32> = VecDeque::new();

    for _round in 0..10_000 {
        // Send fresh data up to the congestion window.
        while window.in_flight() < congestion.window() {
            let Some(payload) = queue.pop_front() else { break };
            let seq = window.register(payload.clone(), now);
            if link.transmit() {
                deliver(&mut reorder, seq, payload, &mut delivered, &mut acks);
            }
        }

        // Process the acknowledgments that came back.
        while let Some(ack) = acks.pop_front() {
            if let AckDisposition::Fresh { acked } = window.on_ack(ack, now) {
                congestion.on_ack(acked.len());
            }
        }

        if queue.is_empty() && window.is_empty() {
            return (delivered, retransmits);
        }

        // Nothing more can happen until a timer fires.
        if window.in_flight() >= congestion.window() || queue.is_empty() {
            if let Some(deadline) = window.next_deadline() {
                if deadline > now {
                    now = deadline;
                }
            }
            let expired = window.expired(now);
            if !expired.is_empty() {
                congestion.on_timeout();
                for seq in expired {
                    let payload = window.payload(seq).unwrap().to_vec();
                    window.mark_retransmitted(seq, now);
                    retransmits += 1;
                    if link.transmit() {
                        deliver(&mut reorder, seq, payload, &mut delivered, &mut acks);
                    }
                }
            }
        }
    }
    panic!("transfer did not converge");
}

fn deliver(
    reorder: &mut ReorderBuffer,
    seq: u32,
    payload: Vec<u8>,
    delivered: &mut Vec<Vec<u8>>,
    acks: &mut VecDeque<u32>,
) {
    match reorder.accept(seq, payload) {
        ReceiveOutcome::Delivered { payloads, ack } => {
            delivered.extend(payloads.into_iter().map(|(_, p)| p));
            acks.push_back(ack);
        }
        ReceiveOutcome::Buffered { ack } | ReceiveOutcome::Duplicate { ack } => {
            if let Some(ack) = ack {
                acks.push_back(ack);
            }
        }
        ReceiveOutcome::Overflow => {}
    }
}

fn numbered(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|n| format!("payload {n}").into_bytes()).collect()
}

#[test]
fn test_lossless_transfer_has_no_retransmits() {
    let payloads = numbered(50);
    let (delivered, retransmits) = run_transfer(payloads.clone(), &mut LossyLink::new(&[]));
    assert_eq!(delivered, payloads);
    assert_eq!(retransmits, 0);
}

#[test]
fn test_single_loss_recovered_in_order() {
    let payloads = numbered(20);
    let (delivered, retransmits) = run_transfer(payloads.clone(), &mut LossyLink::new(&[3]));
    assert_eq!(delivered, payloads);
    assert!(retransmits >= 1);
}

#[test]
fn test_burst_loss_recovered_in_order() {
    let payloads = numbered(40);
    let (delivered, retransmits) =
        run_transfer(payloads.clone(), &mut LossyLink::new(&[5, 6, 7, 12, 30]));
    assert_eq!(delivered, payloads);
    assert!(retransmits >= 5);
}

#[test]
fn test_retransmission_of_retransmission() {
    // Index 2 is the first transmission of some frame; whatever retransmits
    // next (a later global index) is dropped again.
    let payloads = numbered(10);
    let (delivered, retransmits) =
        run_transfer(payloads.clone(), &mut LossyLink::new(&[2, 10]));
    assert_eq!(delivered, payloads);
    assert!(retransmits >= 2);
}

#[test]
fn test_reordered_arrivals_deliver_in_sequence() {
    let mut reorder = ReorderBuffer::new();
    let mut delivered: Vec<u32> = Vec::new();

    // Arrival order 102, 100, 104, 101, 103.
    for seq in [102u32, 100, 104, 101, 103] {
        if let ReceiveOutcome::Delivered { payloads, .. } = reorder.accept(seq, vec![seq as u8]) {
            delivered.extend(payloads.into_iter().map(|(s, _)| s));
        }
    }
    assert_eq!(delivered, vec![100, 101, 102, 103, 104]);
}

#[test]
fn test_congestion_collapse_and_regrowth() {
    let mut congestion = CongestionController::new();

    // Grow past slow start.
    for _ in 0..40 {
        congestion.on_ack(1);
    }
    assert!(!congestion.in_slow_start());
    let grown = congestion.window();

    congestion.on_timeout();
    assert_eq!(congestion.window(), 1);
    assert_eq!(congestion.ssthresh(), (grown / 2).max(2));

    // Slow start climbs back to the new threshold, then goes linear.
    while congestion.in_slow_start() {
        congestion.on_ack(1);
    }
    assert!(congestion.window() >= congestion.ssthresh());
}

#[test]
fn test_window_never_exceeds_congestion_allowance() {
    let mut link = LossyLink::new(&[1, 4, 9]);
    let now = Instant::now();
    let mut window = SendWindow::new(RTO, now);
    let congestion = CongestionController::new();

    // With cwnd = 1 at start, only one frame may be outstanding.
    let mut queue: VecDeque<Vec<u8>> = numbered(5).into();
    while window.in_flight() < congestion.window() {
        let payload = queue.pop_front().unwrap();
        window.register(payload, now);
        link.transmit();
    }
    assert_eq!(window.in_flight(), 1);

    // Until an ACK arrives, the budget stays spent.
    assert!(window.in_flight() >= congestion.window());
}
