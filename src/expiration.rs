//! Expiration policies.
//!
//! An [`ExpirationPolicy`] decides whether an entry's expiration instant
//! has passed, given a "now" supplied by the storage's
//! [`Clock`](crate::clock::Clock). Keeping the decision behind a trait
//! lets deployments soften the TTL boundary without touching storage:
//!
//! - [`GeneralExpiration`]: the standard rule: expired exactly when
//!   `now >= expires_at`. An entry is live strictly before its deadline
//!   and dead at the deadline itself.
//! - [`NeverExpiration`]: entries never expire; useful for permanent
//!   reference data with out-of-band invalidation.
//! - [`EarlyExpiration`]: probabilistically treats entries as expired up
//!   to a margin before their deadline, staggering refreshes across a
//!   fleet to avoid synchronized refresh storms.

use std::time::{Duration, Instant};

/// Decides whether an expiration instant has passed.
pub trait ExpirationPolicy: Send + Sync {
    /// Returns true if an entry expiring at `expires_at` is expired at
    /// `now`.
    fn is_expired(&self, now: Instant, expires_at: Instant) -> bool;
}

/// Standard expiration: expired iff `now >= expires_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralExpiration;

impl ExpirationPolicy for GeneralExpiration {
    fn is_expired(&self, now: Instant, expires_at: Instant) -> bool {
        now >= expires_at
    }
}

/// Entries never expire under this policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExpiration;

impl ExpirationPolicy for NeverExpiration {
    fn is_expired(&self, _now: Instant, _expires_at: Instant) -> bool {
        false
    }
}

/// Probabilistic early expiration.
///
/// With probability `probability`, the deadline is checked against
/// `now + margin` instead of `now`, so the entry may be treated as
/// expired up to `margin` early. Different cache instances then refresh
/// the same hot entry at different times instead of stampeding the
/// source together.
#[derive(Debug, Clone)]
pub struct EarlyExpiration {
    margin: Duration,
    probability: f64,
}

impl EarlyExpiration {
    /// Creates a policy that expires entries up to `margin` early with
    /// the given probability (clamped into `[0, 1]`).
    pub fn new(margin: Duration, probability: f64) -> Self {
        Self {
            margin,
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl ExpirationPolicy for EarlyExpiration {
    fn is_expired(&self, now: Instant, expires_at: Instant) -> bool {
        if rand::random::<f64>() < self.probability {
            now + self.margin >= expires_at
        } else {
            now >= expires_at
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: general expiration is monotone: once expired,
        /// later "now" values stay expired.
        #[test]
        fn prop_general_is_monotone(ttl_ms in 0u64..100_000, later_ms in 0u64..100_000) {
            let now = Instant::now();
            let deadline = now + Duration::from_millis(ttl_ms);
            if GeneralExpiration.is_expired(now, deadline) {
                prop_assert!(GeneralExpiration.is_expired(
                    now + Duration::from_millis(later_ms),
                    deadline,
                ));
            }
        }

        /// Property: the exact deadline is always expired, one
        /// nanosecond before never is.
        #[test]
        fn prop_general_boundary(ttl_ms in 1u64..100_000) {
            let now = Instant::now();
            let deadline = now + Duration::from_millis(ttl_ms);
            prop_assert!(GeneralExpiration.is_expired(deadline, deadline));
            prop_assert!(!GeneralExpiration.is_expired(
                deadline - Duration::from_nanos(1),
                deadline,
            ));
        }

        /// Property: early expiration with probability 1 is equivalent
        /// to shifting "now" forward by the margin.
        #[test]
        fn prop_early_full_probability_shifts_now(
            ttl_ms in 0u64..100_000,
            margin_ms in 0u64..100_000,
        ) {
            let policy = EarlyExpiration::new(Duration::from_millis(margin_ms), 1.0);
            let now = Instant::now();
            let deadline = now + Duration::from_millis(ttl_ms);
            prop_assert_eq!(
                policy.is_expired(now, deadline),
                GeneralExpiration.is_expired(now + Duration::from_millis(margin_ms), deadline),
            );
        }
    }
}
