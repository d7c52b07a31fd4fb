// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session token bucket with even refill.
//!
//! `capacity` tokens refill evenly over a one-minute window using
//! integer-only arithmetic. All intermediate values use `u64` to prevent
//! overflow. Built on `tokio::time::Instant` so paused-clock tests are
//! deterministic.

use tokio::time::Instant;

/// Classical token bucket: N tokens refill over a window, each send
/// consumes one.
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket holding `capacity` tokens, refilling `capacity`
    /// per minute.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Consumes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Remaining tokens after refill.
    pub fn available(&mut self) -> u32 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_millis();
        if elapsed_ms == 0 {
            return;
        }
        // Cap elapsed time so the multiplication cannot overflow.
        let capped_ms: u64 = elapsed_ms.min(600_000) as u64;
        let refill = capped_ms.saturating_mul(self.capacity as u64) / 60_000;
        if refill > 0 {
            let new_tokens = (self.tokens as u64)
                .saturating_add(refill)
                .min(self.capacity as u64);
            self.tokens = new_tokens as u32;
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn allows_capacity_then_blocks() {
        let mut bucket = TokenBucket::new(20);
        for _ in 0..20 {
            assert!(bucket.try_acquire());
        }
        // The 21st send in the same instant must wait.
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn twenty_first_send_waits_one_refill_interval() {
        let mut bucket = TokenBucket::new(20);
        for _ in 0..20 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());

        // One refill interval at 20/min is 3 seconds.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!bucket.try_acquire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_even_not_bursty() {
        let mut bucket = TokenBucket::new(20);
        for _ in 0..20 {
            bucket.try_acquire();
        }
        // 30 seconds restores half the bucket, not all of it.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(bucket.available(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_capacity() {
        let mut bucket = TokenBucket::new(20);
        bucket.try_acquire();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(bucket.available(), 20);
    }
}
