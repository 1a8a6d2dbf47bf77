//! TTL jitter
//!
//! Every write draws its TTL uniformly from `[base * (1 - j), base * (1 + j)]`
//! so that records written in the same burst spread their expiry.

use std::time::Duration;

use rand::Rng;

/// Jitter `base` with the thread-local RNG.
pub fn jittered(base: Duration, jitter: f64) -> Duration {
    jittered_with(base, jitter, &mut rand::thread_rng())
}

/// Jitter `base` with a caller-supplied RNG.
///
/// The band is capped at `[0, 2 * base]`; a non-finite or non-positive
/// `jitter` leaves `base` unchanged.
pub fn jittered_with<R: Rng + ?Sized>(base: Duration, jitter: f64, rng: &mut R) -> Duration {
    if !jitter.is_finite() || jitter <= 0.0 || base.is_zero() {
        return base;
    }
    let jitter = jitter.min(1.0);
    let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
    base.mul_f64(factor.max(0.0))
}
