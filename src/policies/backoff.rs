//! # Backoff policy for admin link reconnects.
//!
//! The delay after `n` consecutive failed connects is `first × factor^n`, clamped to
//! `max`, then jittered. The base is derived from the failure count alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(2), Duration::from_millis(400));
//! assert_eq!(backoff.next(8), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per consecutive failure (`1.0` = fixed delay).
    pub factor: f64,
    /// Randomization applied on top of the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A policy that always waits `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after `failures` consecutive failures (0-indexed).
    pub fn next(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(50),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn grows_until_capped() {
        let policy = doubling();
        assert_eq!(policy.next(0), Duration::from_millis(50));
        assert_eq!(policy.next(1), Duration::from_millis(100));
        assert_eq!(policy.next(3), Duration::from_millis(400));
        assert_eq!(policy.next(6), Duration::from_secs(2));
    }

    #[test]
    fn fixed_never_changes() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(250));
        for failures in 0..20 {
            assert_eq!(policy.next(failures), Duration::from_millis(250));
        }
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(30),
            ..doubling()
        };
        assert_eq!(policy.next(0), Duration::from_secs(2));
    }

    #[test]
    fn overflowing_exponent_clamps_to_max() {
        assert_eq!(doubling().next(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn jitter_never_exceeds_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..doubling()
        };
        for failures in 0..10 {
            assert!(policy.next(failures) <= Duration::from_secs(2));
        }
    }
}
