//! Reconnection backoff.
//!
//! Two policies share one state machine:
//!
//! - **Fixed**: the same delay after every failure. Used by
//!   [`Connection::act`](crate::Connection::act) for mid-call recovery.
//! - **Graduated**: start at 2s, double after each failure until 512s, then
//!   grow by 1s per further failure. Used by
//!   [`Serializer::start`](crate::Serializer::start) for explicit bring-up.
//!
//! [`Backoff`] only computes delays; callers do the sleeping (through
//! `tokio::time`, so tests can run it on a paused clock).
//!
//! # Example
//!
//! ```
//! use linkwire_client::backoff::{Backoff, BackoffPolicy};
//! use std::time::Duration;
//!
//! let mut backoff = Backoff::new(BackoffPolicy::graduated());
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Default fixed recovery interval.
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// First graduated delay.
pub const GRADUATED_INITIAL: Duration = Duration::from_secs(2);

/// Graduated delay after which doubling stops.
pub const GRADUATED_CEILING: Duration = Duration::from_secs(512);

/// Linear growth past the ceiling.
pub const GRADUATED_STEP: Duration = Duration::from_secs(1);

/// How delays grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay every time.
    Fixed(Duration),
    /// Doubling up to `ceiling`, then linear by `step`.
    Graduated {
        /// First delay.
        initial: Duration,
        /// Where doubling stops.
        ceiling: Duration,
        /// Increment once the ceiling is reached.
        step: Duration,
    },
}

impl BackoffPolicy {
    /// Fixed policy.
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed(delay)
    }

    /// Graduated policy with the standard 2s / 512s / 1s shape.
    pub fn graduated() -> Self {
        BackoffPolicy::Graduated {
            initial: GRADUATED_INITIAL,
            ceiling: GRADUATED_CEILING,
            step: GRADUATED_STEP,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::graduated()
    }
}

/// Backoff state: how many failures so far and the last delay handed out.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Option<Duration>,
    failures: u32,
}

impl Backoff {
    /// Start a fresh backoff sequence.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: None,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let next = match (self.policy, self.current) {
            (BackoffPolicy::Fixed(delay), _) => delay,
            (BackoffPolicy::Graduated { initial, .. }, None) => initial,
            (BackoffPolicy::Graduated { ceiling, step, .. }, Some(current)) => {
                if current >= ceiling {
                    current.saturating_add(step)
                } else {
                    current.saturating_mul(2).min(ceiling)
                }
            }
        };

        self.current = Some(next);
        self.failures = self.failures.saturating_add(1);
        next
    }

    /// Forget past failures (call after a successful attempt).
    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    /// Failures recorded since the last reset.
    #[inline]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The policy in use.
    #[inline]
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_graduated_first_five() {
        let backoff = Backoff::new(BackoffPolicy::graduated());
        let delays: Vec<_> = backoff.take(5).collect();
        assert_eq!(delays, secs(&[2, 4, 8, 16, 32]));
    }

    #[test]
    fn test_graduated_reaches_ceiling_then_linear() {
        let mut backoff = Backoff::new(BackoffPolicy::graduated());
        let delays: Vec<_> = (0..12).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            secs(&[2, 4, 8, 16, 32, 64, 128, 256, 512, 513, 514, 515])
        );
        assert_eq!(backoff.failures(), 12);
    }

    #[test]
    fn test_graduated_clamps_to_uneven_ceiling() {
        let mut backoff = Backoff::new(BackoffPolicy::Graduated {
            initial: Duration::from_secs(3),
            ceiling: Duration::from_secs(10),
            step: Duration::from_secs(2),
        });
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, secs(&[3, 6, 10, 12, 14]));
    }

    #[test]
    fn test_fixed_never_grows() {
        let backoff = Backoff::new(BackoffPolicy::fixed(DEFAULT_RECOVERY_INTERVAL));
        assert!(backoff.take(20).all(|d| d == Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = Backoff::new(BackoffPolicy::graduated());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy_is_graduated() {
        assert_eq!(BackoffPolicy::default(), BackoffPolicy::graduated());
    }
}
