//! Jittered exponential backoff.

use rand::Rng;
use std::time::Duration;

/// Default delay for attempt 0, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default ceiling for any computed delay, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Upper bound (exclusive) of the jitter fraction.
pub const MAX_JITTER_FRACTION: f64 = 0.25;

/// Computes the delay before retrying after `attempt` (0-based).
///
/// `min(base * 2^attempt * (1 + j), max)` with `j` drawn uniformly from
/// `[0, 0.25)`.
pub fn compute_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER_FRACTION);
    compute_delay_with_jitter(attempt, base, max, jitter)
}

/// [`compute_delay`] with an explicit jitter fraction.
pub fn compute_delay_with_jitter(
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter: f64,
) -> Duration {
    let max_ms = max.as_millis() as f64;
    let exponential = base.as_millis() as f64 * 2f64.powi(attempt.min(63) as i32);
    let delay_ms = (exponential * (1.0 + jitter.clamp(0.0, MAX_JITTER_FRACTION))).min(max_ms);

    Duration::from_millis(delay_ms as u64)
}

/// Suspends the current task for `delay` without blocking other tasks.
pub async fn sleep_for(delay: Duration) {
    tokio::time::sleep(delay).await;
}
