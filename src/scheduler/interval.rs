//! Resolves a configured interval value into a concrete millisecond count.
//!
//! Grounded on `orchestrator::calculate_retry_backoff`'s jitter draw (`rand`
//! uniform sampling over a range), generalized from a fixed exponential
//! formula to the three interval shapes §4.4 allows: a scalar, a `[min, max]`
//! range, or a user function returning either.

use rand::Rng;

/// The default interval fallback used when a configured function errors or
/// returns a non-finite value: a uniform `[1000, 2000]` ms range.
pub const DEFAULT_INTERVAL_RANGE: (u64, u64) = (1000, 2000);

/// The resolved shape of a configured interval, before jitter is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalValue {
    Scalar(u64),
    Range(u64, u64),
}

impl IntervalValue {
    /// Coerce an arbitrary signed result (as a user function might return)
    /// into a non-negative scalar: `max(0, trunc(x))`.
    #[must_use]
    pub fn from_signed(x: f64) -> Option<Self> {
        if !x.is_finite() {
            return None;
        }
        Some(Self::Scalar(x.trunc().max(0.0) as u64))
    }
}

/// Resolve an [`IntervalValue`] to a concrete millisecond count, drawing a
/// uniform sample if it's a range.
#[must_use]
pub fn resolve(value: IntervalValue) -> u64 {
    match value {
        IntervalValue::Scalar(ms) => ms,
        IntervalValue::Range(a, b) => {
            if a >= b {
                a
            } else {
                rand::rng().random_range(a..=b)
            }
        }
    }
}

/// The default `[1000, 2000]` interval, used as a fallback on error.
#[must_use]
pub fn default_interval_ms() -> u64 {
    resolve(IntervalValue::Range(
        DEFAULT_INTERVAL_RANGE.0,
        DEFAULT_INTERVAL_RANGE.1,
    ))
}
