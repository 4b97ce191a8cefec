//! Anti-replay sliding window.
//!
//! One window per receive epoch. Counters below the window or already seen
//! are rejected; the replay check runs before any plaintext reaches the
//! session.

use crate::core::constants::REPLAY_WINDOW_SIZE;
use crate::core::error::CryptoError;

/// Sliding bitmap over received record counters.
pub struct ReplayWindow {
    bitmap: [u64; REPLAY_WINDOW_SIZE / 64],
    highest: u64,
    initialized: bool,
}

impl ReplayWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self { bitmap: [0; REPLAY_WINDOW_SIZE / 64], highest: 0, initialized: false }
    }

    /// Check a counter and mark it seen.
    ///
    /// Returns `Err(ReplayDetected)` for duplicates and counters that fell
    /// below the window.
    pub fn check_and_update(&mut self, counter: u64) -> Result<(), CryptoError> {
        if !self.initialized {
            self.highest = counter;
            self.mark_seen(counter);
            self.initialized = true;
            return Ok(());
        }

        if counter > self.highest {
            let shift = counter - self.highest;
            self.shift_window(shift);
            self.highest = counter;
            self.mark_seen(counter);
            return Ok(());
        }

        let diff = self.highest - counter;
        if diff >= REPLAY_WINDOW_SIZE as u64 || self.is_seen(counter) {
            return Err(CryptoError::ReplayDetected);
        }
        self.mark_seen(counter);
        Ok(())
    }

    fn is_seen(&self, counter: u64) -> bool {
        let diff = (self.highest - counter) as usize;
        let word = diff / 64;
        let bit = diff % 64;
        (self.bitmap[word] & (1 << bit)) != 0
    }

    fn mark_seen(&mut self, counter: u64) {
        let diff = (self.highest - counter) as usize;
        if diff >= REPLAY_WINDOW_SIZE {
            return;
        }
        let word = diff / 64;
        let bit = diff % 64;
        self.bitmap[word] |= 1 << bit;
    }

    fn shift_window(&mut self, shift: u64) {
        if shift >= REPLAY_WINDOW_SIZE as u64 {
            self.bitmap = [0; REPLAY_WINDOW_SIZE / 64];
            return;
        }

        let shift_words = (shift / 64) as usize;
        let shift_bits = (shift % 64) as u32;

        if shift_words > 0 {
            for i in (shift_words..self.bitmap.len()).rev() {
                self.bitmap[i] = self.bitmap[i - shift_words];
            }
            for word in self.bitmap.iter_mut().take(shift_words) {
                *word = 0;
            }
        }

        if shift_bits > 0 {
            let mut carry = 0u64;
            for i in 0..self.bitmap.len() {
                let new_carry = self.bitmap[i] >> (64 - shift_bits);
                self.bitmap[i] = (self.bitmap[i] << shift_bits) | carry;
                carry = new_carry;
            }
        }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}
