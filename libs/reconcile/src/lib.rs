//! Reconciliation loop primitives.
//!
//! This library provides the pieces the farmerbot control loop is built
//! from. Key concepts:
//!
//! - **Clock**: every time-dependent decision reads time through [`Clock`],
//!   so tests can drive timeouts with a [`ManualClock`] instead of sleeping.
//! - **Transition timeout**: a power transition that is not confirmed within
//!   [`TIMEOUT_POWER_STATE_CHANGE`] is rolled back by the loop.
//! - **Claim decay**: a provisional resource claim is trusted for
//!   [`TIMEOUT_CLAIMED_RESOURCES`] rounds, counted by [`ClaimCountdown`].
//!
//! # Invariants
//!
//! - Decay is driven by the reconciliation tick, never by a separate timer
//! - Decisions are deterministic given the same inputs and clock reading

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A transition was not confirmed in time.
    #[error("timeout after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
    },
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a manual clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Check whether a transition started at `since` is still inside `timeout`.
///
/// Returns `Err(ReconcileError::Timeout)` once the window has elapsed.
pub fn check_transition(
    resource: impl Into<String>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<(), ReconcileError> {
    let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
    if elapsed < timeout {
        Ok(())
    } else {
        Err(ReconcileError::Timeout {
            resource: resource.into(),
            elapsed,
        })
    }
}

/// Round counter guarding a provisional resource claim.
///
/// While the counter is non-zero the claimed usage on the node is trusted;
/// each reconciliation round decrements it. At zero the next round replaces
/// usage with an authoritative read from the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimCountdown(u8);

impl ClaimCountdown {
    /// A countdown that has already expired.
    pub const EXPIRED: Self = Self(0);

    /// Restart the countdown after a new claim.
    pub fn reset(&mut self) {
        self.0 = TIMEOUT_CLAIMED_RESOURCES;
    }

    /// Advance one round.
    ///
    /// Returns true when the countdown was already expired, meaning the
    /// caller should refresh usage from the authoritative source.
    pub fn tick(&mut self) -> bool {
        if self.0 == 0 {
            return true;
        }
        self.0 -= 1;
        false
    }

    /// Whether an authoritative refresh is due this round.
    pub fn is_due(&self) -> bool {
        self.0 == 0
    }

    /// Rounds left before the claim is superseded.
    pub fn remaining(&self) -> u8 {
        self.0
    }
}

/// Integer usage percentage, `None` when there is no capacity at all.
pub fn usage_percent(used: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    Some((u128::from(used) * 100 / u128::from(total)) as u64)
}

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long a node may stay waking up or shutting down before the loop
/// forces it back to the state it was leaving.
pub const TIMEOUT_POWER_STATE_CHANGE: Duration = Duration::from_secs(30 * 60);

/// Rounds a provisional claim is trusted before usage is re-read.
pub const TIMEOUT_CLAIMED_RESOURCES: u8 = 6;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(start());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start() + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new(start());
        let later = start() + chrono::Duration::days(2);
        clock.set(later);
        assert_eq!(clock.now(), later);

        clock.set(start());
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn test_check_transition() {
        let since = start();
        let inside = since + chrono::Duration::minutes(29);
        let outside = since + chrono::Duration::minutes(30);

        assert!(check_transition("node-1", since, inside, TIMEOUT_POWER_STATE_CHANGE).is_ok());
        let err = check_transition("node-1", since, outside, TIMEOUT_POWER_STATE_CHANGE)
            .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::Timeout {
                resource: "node-1".to_string(),
                elapsed: TIMEOUT_POWER_STATE_CHANGE,
            }
        );
    }

    #[test]
    fn test_check_transition_clock_skew() {
        // A change time in the future counts as zero elapsed.
        let since = start() + chrono::Duration::minutes(5);
        assert!(check_transition("node-1", since, start(), TIMEOUT_POWER_STATE_CHANGE).is_ok());
    }

    #[test]
    fn test_claim_countdown() {
        let mut countdown = ClaimCountdown::EXPIRED;
        assert!(countdown.is_due());
        assert!(countdown.tick());

        countdown.reset();
        assert_eq!(countdown.remaining(), TIMEOUT_CLAIMED_RESOURCES);

        // Six rounds of trust, then the seventh refreshes.
        for _ in 0..TIMEOUT_CLAIMED_RESOURCES {
            assert!(!countdown.tick());
        }
        assert!(countdown.is_due());
        assert!(countdown.tick());
    }

    #[test]
    fn test_usage_percent() {
        assert_eq!(usage_percent(0, 0), None);
        assert_eq!(usage_percent(16, 16), Some(100));
        assert_eq!(usage_percent(79, 100), Some(79));
        assert_eq!(usage_percent(1, 3), Some(33));
        assert_eq!(usage_percent(u64::MAX, u64::MAX), Some(100));
    }
}
