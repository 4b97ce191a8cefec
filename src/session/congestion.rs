//! Tahoe-style congestion control.
//!
//! Slow start doubles the window each round trip (one increment per ACK);
//! past the threshold, congestion avoidance grows it by roughly one segment
//! per window. Any retransmission timeout halves the threshold and drops
//! the window back to one segment.

use crate::core::constants::{INITIAL_CWND, INITIAL_SSTHRESH, WINDOW_MAX};

/// Congestion controller state.
#[derive(Debug)]
pub struct CongestionController {
    cwnd: f64,
    ssthresh: f64,
}

impl CongestionController {
    /// Start in slow start with the initial window.
    pub fn new() -> Self {
        Self { cwnd: f64::from(INITIAL_CWND), ssthresh: f64::from(INITIAL_SSTHRESH) }
    }

    /// The number of frames allowed in flight.
    pub fn window(&self) -> usize {
        (self.cwnd as usize).clamp(1, WINDOW_MAX)
    }

    /// Current slow-start threshold, in segments.
    pub fn ssthresh(&self) -> usize {
        self.ssthresh as usize
    }

    /// True while the window grows exponentially.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Grow the window for `newly_acked` freshly retired frames.
    pub fn on_ack(&mut self, newly_acked: usize) {
        for _ in 0..newly_acked {
            if self.cwnd < self.ssthresh {
                self.cwnd += 1.0;
            } else {
                self.cwnd += 1.0 / self.cwnd;
            }
        }
        self.cwnd = self.cwnd.min(WINDOW_MAX as f64);
    }

    /// React to a retransmission timeout.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(2.0);
        self.cwnd = 1.0;
    }
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new()
    }
}
