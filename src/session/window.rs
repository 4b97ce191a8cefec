//! Sender-side sliding window.
//!
//! Tracks unacknowledged DATA frames with their per-packet retransmission
//! deadlines. Pure state machine: every operation takes the current time
//! explicitly, so tests drive it with a synthetic clock.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::constants::DATA_SEQ_START;

/// How the sender should interpret an incoming ACK.
#[derive(Debug, PartialEq, Eq)]
pub enum AckDisposition {
    /// The ACK retired at least one in-flight frame (cumulative through the
    /// acknowledged sequence).
    Fresh {
        /// Sequence numbers retired, ascending.
        acked: Vec<u32>,
    },
    /// Everything at or below this sequence was already retired.
    Duplicate,
    /// The sequence was never assigned; ignore and count.
    Unknown,
}

/// One unacknowledged DATA frame.
#[derive(Debug)]
pub struct InFlight {
    payload: Vec<u8>,
    sent_at: Instant,
    retx_count: u32,
}

/// The sliding send window.
#[derive(Debug)]
pub struct SendWindow {
    in_flight: BTreeMap<u32, InFlight>,
    next_seq: u32,
    retry_timeout: Duration,
    last_progress: Instant,
}

impl SendWindow {
    /// Create an empty window.
    pub fn new(retry_timeout: Duration, now: Instant) -> Self {
        Self {
            in_flight: BTreeMap::new(),
            next_seq: DATA_SEQ_START,
            retry_timeout,
            last_progress: now,
        }
    }

    /// The next sequence number that `register` will assign.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Number of unacknowledged frames.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// True when nothing is awaiting acknowledgment.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Assign the next sequence to `payload` and start its timer.
    pub fn register(&mut self, payload: Vec<u8>, now: Instant) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq, InFlight { payload, sent_at: now, retx_count: 0 });
        seq
    }

    /// Apply an ACK cumulatively.
    pub fn on_ack(&mut self, seq: u32, now: Instant) -> AckDisposition {
        if seq < DATA_SEQ_START || seq >= self.next_seq {
            return AckDisposition::Unknown;
        }
        let acked: Vec<u32> =
            self.in_flight.range(..=seq).map(|(s, _)| *s).collect();
        if acked.is_empty() {
            return AckDisposition::Duplicate;
        }
        for s in &acked {
            self.in_flight.remove(s);
        }
        self.last_progress = now;
        AckDisposition::Fresh { acked }
    }

    /// Sequences whose retransmission timer has fired.
    pub fn expired(&self, now: Instant) -> Vec<u32> {
        self.in_flight
            .iter()
            .filter(|(_, f)| now >= f.sent_at + self.retry_timeout)
            .map(|(s, _)| *s)
            .collect()
    }

    /// The payload of an in-flight frame.
    pub fn payload(&self, seq: u32) -> Option<&[u8]> {
        self.in_flight.get(&seq).map(|f| f.payload.as_slice())
    }

    /// Restart a frame's timer after retransmission; returns its retry count.
    pub fn mark_retransmitted(&mut self, seq: u32, now: Instant) -> u32 {
        match self.in_flight.get_mut(&seq) {
            Some(f) => {
                f.sent_at = now;
                f.retx_count += 1;
                f.retx_count
            }
            None => 0,
        }
    }

    /// Earliest retransmission deadline, if anything is in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.sent_at + self.retry_timeout).min()
    }

    /// Time since the last cumulative ACK made progress.
    pub fn stall_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress)
    }

    /// Reset the progress clock, e.g. when new work arrives on an idle window.
    pub fn touch(&mut self, now: Instant) {
        self.last_progress = now;
    }
}
