//! Resilience building blocks for the request pipeline: jittered backoff and
//! rate limit tracking.

pub mod backoff;
pub mod rate_limit;

pub use backoff::{compute_delay, compute_delay_with_jitter, sleep_for};
pub use rate_limit::{
    parse_rate_limit_header, RateLimitHeader, RateLimitStatus, RateLimitTracker,
    NEAR_LIMIT_THRESHOLD, RATE_LIMIT_HEADER, WARN_THRESHOLD,
};
