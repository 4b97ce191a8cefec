//! Receiver-side reorder buffer.
//!
//! Out-of-order DATA frames are parked until the gap before them fills;
//! delivery to the collaborator is strictly in sequence order, exactly once.
//!
//! ACK emission is cumulative: every acknowledgment carries a sequence the
//! sender may retire everything at-or-below. An out-of-order arrival
//! therefore re-asserts the high-water mark rather than acking its own
//! sequence, because acking above a gap would let the sender retire the
//! very frame the gap is waiting for.

use std::collections::BTreeMap;

use crate::core::constants::{DATA_SEQ_START, WINDOW_MAX};

/// What the receiver should do with an arriving DATA frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The frame (plus any now-contiguous parked frames) is deliverable.
    Delivered {
        /// Payloads in sequence order, starting with the arrived frame.
        payloads: Vec<(u32, Vec<u8>)>,
        /// Cumulative acknowledgment: the last delivered sequence.
        ack: u32,
    },
    /// The frame was parked above a gap.
    Buffered {
        /// High-water re-ack, absent when nothing has been delivered yet.
        ack: Option<u32>,
    },
    /// Already delivered or already parked.
    Duplicate {
        /// Re-acknowledgment, absent when nothing has been delivered yet.
        ack: Option<u32>,
    },
    /// The buffer is full and the frame was dropped. No acknowledgment:
    /// acking a frame we discarded would let the sender retire data that
    /// will never be delivered.
    Overflow,
}

/// In-order reassembly buffer.
#[derive(Debug)]
pub struct ReorderBuffer {
    next_expected: u32,
    parked: BTreeMap<u32, Vec<u8>>,
    capacity: usize,
}

impl ReorderBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { next_expected: DATA_SEQ_START, parked: BTreeMap::new(), capacity: WINDOW_MAX }
    }

    /// The next sequence the collaborator has not yet seen.
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// Number of parked out-of-order frames.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Highest sequence safe for the sender to retire cumulatively.
    fn high_water(&self) -> Option<u32> {
        (self.next_expected > DATA_SEQ_START).then(|| self.next_expected - 1)
    }

    /// Process one arriving DATA frame.
    pub fn accept(&mut self, seq: u32, payload: Vec<u8>) -> ReceiveOutcome {
        if seq < self.next_expected {
            return ReceiveOutcome::Duplicate { ack: Some(seq) };
        }

        if seq == self.next_expected {
            let mut payloads = vec![(seq, payload)];
            self.next_expected += 1;
            while let Some(next) = self.parked.remove(&self.next_expected) {
                payloads.push((self.next_expected, next));
                self.next_expected += 1;
            }
            return ReceiveOutcome::Delivered { payloads, ack: self.next_expected - 1 };
        }

        if self.parked.contains_key(&seq) {
            return ReceiveOutcome::Duplicate { ack: self.high_water() };
        }
        if self.parked.len() >= self.capacity {
            return ReceiveOutcome::Overflow;
        }
        self.parked.insert(seq, payload);
        ReceiveOutcome::Buffered { ack: self.high_water() }
    }

    /// Drain whatever contiguous prefix remains, for teardown.
    pub fn flush_contiguous(&mut self) -> Vec<(u32, Vec<u8>)> {
        let mut payloads = Vec::new();
        while let Some(next) = self.parked.remove(&self.next_expected) {
            payloads.push((self.next_expected, next));
            self.next_expected += 1;
        }
        payloads
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_delivery() {
        let mut buf = ReorderBuffer::new();
        for seq in 100..105 {
            match buf.accept(seq, vec![seq as u8]) {
                ReceiveOutcome::Delivered { payloads, ack } => {
                    assert_eq!(payloads, vec![(seq, vec![seq as u8])]);
                    assert_eq!(ack, seq);
                }
                other => panic!("expected Delivered, got {other:?}"),
            }
        }
        assert_eq!(buf.next_expected(), 105);
    }

    #[test]
    fn test_gap_fill_releases_run_with_cumulative_ack() {
        let mut buf = ReorderBuffer::new();
        assert_eq!(buf.accept(101, b"b".to_vec()), ReceiveOutcome::Buffered { ack: None });
        assert_eq!(buf.accept(102, b"c".to_vec()), ReceiveOutcome::Buffered { ack: None });

        match buf.accept(100, b"a".to_vec()) {
            ReceiveOutcome::Delivered { payloads, ack } => {
                // The ack covers the whole drained run.
                assert_eq!(ack, 102);
                let seqs: Vec<u32> = payloads.iter().map(|(s, _)| *s).collect();
                assert_eq!(seqs, vec![100, 101, 102]);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
        assert_eq!(buf.parked(), 0);
    }

    #[test]
    fn test_out_of_order_ack_never_crosses_the_gap() {
        let mut buf = ReorderBuffer::new();
        buf.accept(100, vec![0]);
        buf.accept(101, vec![1]);
        // 102 lost; 103 parks but re-acks only the delivered high water.
        assert_eq!(buf.accept(103, vec![3]), ReceiveOutcome::Buffered { ack: Some(101) });
    }

    #[test]
    fn test_duplicate_of_delivered_reacked() {
        let mut buf = ReorderBuffer::new();
        buf.accept(100, vec![1]);
        assert_eq!(buf.accept(100, vec![1]), ReceiveOutcome::Duplicate { ack: Some(100) });
    }

    #[test]
    fn test_duplicate_of_parked_reasserts_high_water() {
        let mut buf = ReorderBuffer::new();
        buf.accept(105, vec![5]);
        assert_eq!(buf.accept(105, vec![5]), ReceiveOutcome::Duplicate { ack: None });
        buf.accept(100, vec![0]);
        assert_eq!(buf.accept(105, vec![5]), ReceiveOutcome::Duplicate { ack: Some(100) });
        assert_eq!(buf.parked(), 1);
    }

    #[test]
    fn test_overflow_drops_without_ack() {
        let mut buf = ReorderBuffer::new();
        for seq in 101..101 + WINDOW_MAX as u32 {
            assert!(matches!(buf.accept(seq, vec![]), ReceiveOutcome::Buffered { .. }));
        }
        let overflow_seq = 101 + WINDOW_MAX as u32;
        assert_eq!(buf.accept(overflow_seq, vec![]), ReceiveOutcome::Overflow);
        // The missing head still releases everything that was parked.
        match buf.accept(100, vec![]) {
            ReceiveOutcome::Delivered { payloads, .. } => {
                assert_eq!(payloads.len(), 1 + WINDOW_MAX);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn test_flush_contiguous_stops_at_gap() {
        let mut buf = ReorderBuffer::new();
        buf.accept(100, vec![0]);
        buf.accept(102, vec![2]);
        assert!(buf.flush_contiguous().is_empty());
        buf.accept(101, vec![1]);
        // 101 arriving drained 102 with it; nothing remains parked.
        assert_eq!(buf.parked(), 0);
        assert_eq!(buf.next_expected(), 103);
    }
}
