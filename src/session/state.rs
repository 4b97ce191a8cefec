//! Session configuration, lifecycle phases, and end-of-session statistics.

use std::time::Duration;

use crate::core::constants::{
    FIN_RETRIES, FIN_WAIT, IDLE_READ, MAX_WALL_TIMEOUT, REKEY_INTERVAL, RETRY_TIMEOUT,
};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Secure handshake in progress.
    Handshake,
    /// Transferring data.
    Established,
    /// FIN exchanged, draining.
    Closing,
    /// Done.
    Closed,
}

impl SessionPhase {
    /// Stable name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Established => "established",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Tunable session parameters.
///
/// Defaults match the protocol's design values; tests shrink the timers.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-packet retransmission timeout.
    pub retry_timeout: Duration,
    /// Wait for FIN-ACK before retransmitting FIN.
    pub fin_wait: Duration,
    /// FIN retransmissions before closing unilaterally.
    pub fin_retries: u32,
    /// Abort when no ACK progress happens for this long.
    pub max_wall_timeout: Duration,
    /// Receiver idle deadline.
    pub idle_read: Duration,
    /// Whether the sender initiates periodic rekeying.
    pub rekey_enabled: bool,
    /// Time between key rotations.
    pub rekey_interval: Duration,
    /// Payloads queued behind the window before `submit` backpressures.
    pub submit_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_timeout: RETRY_TIMEOUT,
            fin_wait: FIN_WAIT,
            fin_retries: FIN_RETRIES,
            max_wall_timeout: MAX_WALL_TIMEOUT,
            idle_read: IDLE_READ,
            rekey_enabled: true,
            rekey_interval: REKEY_INTERVAL,
            submit_queue_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Set the retransmission timeout.
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    /// Set the FIN-ACK wait.
    pub fn fin_wait(mut self, wait: Duration) -> Self {
        self.fin_wait = wait;
        self
    }

    /// Set the FIN retransmission count.
    pub fn fin_retries(mut self, retries: u32) -> Self {
        self.fin_retries = retries;
        self
    }

    /// Set the no-progress abort budget.
    pub fn max_wall_timeout(mut self, timeout: Duration) -> Self {
        self.max_wall_timeout = timeout;
        self
    }

    /// Set the receiver idle deadline.
    pub fn idle_read(mut self, deadline: Duration) -> Self {
        self.idle_read = deadline;
        self
    }

    /// Enable or disable periodic rekeying.
    pub fn rekey(mut self, enabled: bool) -> Self {
        self.rekey_enabled = enabled;
        self
    }

    /// Set the rotation interval.
    pub fn rekey_interval(mut self, interval: Duration) -> Self {
        self.rekey_interval = interval;
        self
    }
}

/// Counters collected over a session's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// DATA frames sent for the first time.
    pub frames_sent: u64,
    /// DATA frames retransmitted.
    pub retransmits: u64,
    /// Fresh (progress-making) ACKs received.
    pub acks_received: u64,
    /// ACKs for sequences never assigned.
    pub unknown_acks: u64,
    /// Payloads delivered to the collaborator.
    pub delivered: u64,
    /// Completed key rotations.
    pub rekeys: u32,
    /// Records dropped for authentication, replay, or epoch reasons.
    pub records_dropped: u64,
    /// Session wall-clock duration.
    pub duration: Duration,
    /// True when teardown completed with the FIN / FIN-ACK exchange.
    pub clean_close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(SessionPhase::Established.name(), "established");
        assert_eq!(SessionPhase::Closing.name(), "closing");
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::default()
            .retry_timeout(Duration::from_millis(50))
            .rekey(false);
        assert_eq!(config.retry_timeout, Duration::from_millis(50));
        assert!(!config.rekey_enabled);
        assert_eq!(config.fin_retries, FIN_RETRIES);
    }
}
