// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap timeouts and refund eligibility
//!
//! If the counterparty disappears, funds are recoverable through the refund
//! branch of each lock once its timelock passes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bitcoin treats `nLockTime` values below this as block heights.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Average bitcoin block interval used for display estimates
pub const BITCOIN_BLOCK_SECS: u64 = 600;

/// Absolute threshold after which a refund/cancel path opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timelock {
    /// Bitcoin block height (script `CHECKLOCKTIMEVERIFY`)
    BlockHeight(u32),
    /// Unix seconds (escrow cancellation instant)
    UnixTime(u64),
}

impl Timelock {
    pub fn has_elapsed(&self, clock: &ChainClock) -> bool {
        match *self {
            Timelock::BlockHeight(height) => clock.block_height >= height,
            Timelock::UnixTime(at) => clock.unix_time >= at,
        }
    }

    pub fn value(&self) -> u64 {
        match *self {
            Timelock::BlockHeight(height) => height as u64,
            Timelock::UnixTime(at) => at,
        }
    }

    /// Value observed on `clock` for the same unit as this timelock.
    pub fn observed(&self, clock: &ChainClock) -> u64 {
        match self {
            Timelock::BlockHeight(_) => clock.block_height as u64,
            Timelock::UnixTime(_) => clock.unix_time,
        }
    }
}

impl fmt::Display for Timelock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timelock::BlockHeight(h) => write!(f, "height {}", h),
            Timelock::UnixTime(t) => write!(f, "unix {}", t),
        }
    }
}

/// Observed chain time, supplied by whoever reports an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainClock {
    /// Bitcoin tip height
    pub block_height: u32,
    /// Account-chain latest block timestamp
    pub unix_time: u64,
}

impl ChainClock {
    pub fn new(block_height: u32, unix_time: u64) -> Self {
        Self {
            block_height,
            unix_time,
        }
    }
}

/// Bitcoin refund height for a lock created at `current_height`.
pub fn calculate_refund_height(current_height: u32, timeout_blocks: u32) -> u32 {
    current_height.saturating_add(timeout_blocks)
}

/// Check if a leg can be refunded at `clock`
pub fn can_refund(timelock: Timelock, clock: &ChainClock, settled: bool) -> bool {
    !settled && timelock.has_elapsed(clock)
}

/// Refund eligibility status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundStatus {
    pub can_refund: bool,
    pub timelock: Timelock,
    pub observed: u64,
    /// Blocks or seconds left; negative once expired
    pub remaining: i64,
    pub time_remaining_seconds: i64,
}

impl RefundStatus {
    pub fn new(timelock: Timelock, clock: &ChainClock, settled: bool) -> Self {
        let observed = timelock.observed(clock);
        let remaining = timelock.value() as i64 - observed as i64;

        let time_remaining_seconds = if remaining > 0 {
            match timelock {
                Timelock::BlockHeight(_) => remaining * BITCOIN_BLOCK_SECS as i64,
                Timelock::UnixTime(_) => remaining,
            }
        } else {
            0
        };

        Self {
            can_refund: can_refund(timelock, clock, settled),
            timelock,
            observed,
            remaining,
            time_remaining_seconds,
        }
    }

    pub fn status_message(&self) -> String {
        if self.can_refund {
            format!("✓ Refund available ({} passed)", self.timelock)
        } else {
            let hours = self.time_remaining_seconds / 3600;
            let minutes = (self.time_remaining_seconds % 3600) / 60;
            match self.timelock {
                Timelock::BlockHeight(_) => format!(
                    "⏳ Refund in {} blocks (~{}h {}m)",
                    self.remaining, hours, minutes
                ),
                Timelock::UnixTime(_) => format!("⏳ Refund in ~{}h {}m", hours, minutes),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_refund_height() {
        assert_eq!(calculate_refund_height(1000, 144), 1144);
        assert_eq!(calculate_refund_height(u32::MAX, 1), u32::MAX);
    }

    #[test]
    fn test_can_refund() {
        let lock = Timelock::BlockHeight(1144);
        assert!(!can_refund(lock, &ChainClock::new(1100, 0), false));
        assert!(can_refund(lock, &ChainClock::new(1144, 0), false));
        assert!(can_refund(lock, &ChainClock::new(1200, 0), false));
        // Settled legs can never be refunded
        assert!(!can_refund(lock, &ChainClock::new(1200, 0), true));
    }

    #[test]
    fn test_unix_timelock_uses_timestamp() {
        let lock = Timelock::UnixTime(10_000);
        assert!(!lock.has_elapsed(&ChainClock::new(u32::MAX, 9_999)));
        assert!(lock.has_elapsed(&ChainClock::new(0, 10_000)));
    }

    #[test]
    fn test_refund_status() {
        let status = RefundStatus::new(Timelock::BlockHeight(1144), &ChainClock::new(1100, 0), false);
        assert!(!status.can_refund);
        assert_eq!(status.remaining, 44);
        assert_eq!(status.time_remaining_seconds, 44 * 600);
        assert!(status.status_message().contains("44 blocks"));

        let status = RefundStatus::new(Timelock::BlockHeight(1144), &ChainClock::new(1150, 0), false);
        assert!(status.can_refund);
        assert_eq!(status.remaining, -6);
        assert!(status.status_message().contains("Refund available"));
    }
}
