//! Rekey scheduling on the initiating side.
//!
//! At most one rotation is ever in flight. The REKEY frame carries the
//! target epoch so a retransmitted request is idempotent at the receiver;
//! the send epoch advances only once the REKEY-ACK arrives.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::constants::REKEY_ACK_TIMEOUT;

/// Result of a rekey timer expiring.
#[derive(Debug, PartialEq, Eq)]
pub enum RekeyTimeout {
    /// Resend the REKEY for this target epoch.
    Retry(u32),
    /// The retry also went unanswered; the session must abort.
    Fatal,
}

#[derive(Debug)]
enum RekeyState {
    Idle { next_at: Instant },
    AwaitingAck { epoch: u32, sent_at: Instant, retried: bool },
}

/// Drives periodic key rotation.
#[derive(Debug)]
pub struct RekeyCoordinator {
    interval: Duration,
    state: RekeyState,
}

impl RekeyCoordinator {
    /// Schedule the first rotation one `interval` from `now`.
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self { interval, state: RekeyState::Idle { next_at: now + interval } }
    }

    /// True when a rotation should be initiated.
    pub fn due(&self, now: Instant) -> bool {
        matches!(self.state, RekeyState::Idle { next_at } if now >= next_at)
    }

    /// True while a REKEY awaits its acknowledgment.
    pub fn in_flight(&self) -> bool {
        matches!(self.state, RekeyState::AwaitingAck { .. })
    }

    /// Begin a rotation from `current_epoch`; returns the target epoch to
    /// put in the REKEY frame.
    pub fn initiate(&mut self, current_epoch: u32, now: Instant) -> u32 {
        let epoch = current_epoch + 1;
        self.state = RekeyState::AwaitingAck { epoch, sent_at: now, retried: false };
        epoch
    }

    /// A REKEY-ACK arrived; returns the epoch to switch to, or `None` if no
    /// rotation was pending (stray ACK, ignored).
    pub fn on_ack(&mut self, now: Instant) -> Option<u32> {
        match self.state {
            RekeyState::AwaitingAck { epoch, .. } => {
                self.state = RekeyState::Idle { next_at: now + self.interval };
                Some(epoch)
            }
            RekeyState::Idle { .. } => None,
        }
    }

    /// Handle the ACK deadline passing: one retry, then fatal.
    pub fn on_timeout(&mut self, now: Instant) -> RekeyTimeout {
        match self.state {
            RekeyState::AwaitingAck { epoch, retried: false, .. } => {
                self.state = RekeyState::AwaitingAck { epoch, sent_at: now, retried: true };
                RekeyTimeout::Retry(epoch)
            }
            _ => RekeyTimeout::Fatal,
        }
    }

    /// The next instant this coordinator needs the clock.
    pub fn next_deadline(&self) -> Instant {
        match self.state {
            RekeyState::Idle { next_at } => next_at,
            RekeyState::AwaitingAck { sent_at, .. } => sent_at + REKEY_ACK_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(120);

    #[test]
    fn test_due_after_interval() {
        let now = Instant::now();
        let r = RekeyCoordinator::new(now, INTERVAL);
        assert!(!r.due(now));
        assert!(r.due(now + INTERVAL));
    }

    #[test]
    fn test_initiate_then_ack_advances() {
        let now = Instant::now();
        let mut r = RekeyCoordinator::new(now, INTERVAL);
        let target = r.initiate(0, now);
        assert_eq!(target, 1);
        assert!(r.in_flight());
        assert_eq!(r.on_ack(now), Some(1));
        assert!(!r.in_flight());
        // Next rotation is a full interval out.
        assert!(!r.due(now + INTERVAL - REKEY_ACK_TIMEOUT));
        assert!(r.due(now + INTERVAL));
    }

    #[test]
    fn test_stray_ack_ignored() {
        let now = Instant::now();
        let mut r = RekeyCoordinator::new(now, INTERVAL);
        assert_eq!(r.on_ack(now), None);
    }

    #[test]
    fn test_timeout_retries_once_then_fatal() {
        let now = Instant::now();
        let mut r = RekeyCoordinator::new(now, INTERVAL);
        r.initiate(2, now);
        assert_eq!(r.next_deadline(), now + REKEY_ACK_TIMEOUT);
        assert_eq!(r.on_timeout(now + REKEY_ACK_TIMEOUT), RekeyTimeout::Retry(3));
        assert_eq!(r.on_timeout(now + 2 * REKEY_ACK_TIMEOUT), RekeyTimeout::Fatal);
    }
}
