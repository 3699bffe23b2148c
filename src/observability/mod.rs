//! Observability: request metrics, tracing hooks and logging setup.

mod logging;

pub use logging::{LogFormat, LoggingConfig};

use crate::resilience::RateLimitStatus;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Metrics collector for App Store Connect API calls.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Logical calls started.
    requests_total: AtomicU64,
    /// Logical calls that succeeded.
    requests_success: AtomicU64,
    /// Logical calls that ended in an error.
    requests_failed: AtomicU64,
    /// HTTP round trips attempted.
    attempts_total: AtomicU64,
    /// Attempts followed by another attempt.
    retries_total: AtomicU64,
    /// 429 responses received.
    rate_limited_total: AtomicU64,
    /// Credential invalidations after a rejected token.
    reauthentications_total: AtomicU64,
    /// Total latency of logical calls in microseconds.
    latency_total_us: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a logical call.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an HTTP round trip.
    pub fn record_attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry.
    pub fn record_retry(&self) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a 429 response.
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a credential invalidation.
    pub fn record_reauthentication(&self) {
        self.reauthentications_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the end of a logical call.
    pub fn record_outcome(&self, success: bool, latency: Duration) {
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Gets a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests_total = self.requests_total.load(Ordering::Relaxed);
        let requests_success = self.requests_success.load(Ordering::Relaxed);
        let requests_failed = self.requests_failed.load(Ordering::Relaxed);
        let completed = requests_success + requests_failed;
        let latency = self.latency_total_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total,
            requests_success,
            requests_failed,
            attempts_total: self.attempts_total.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            reauthentications_total: self.reauthentications_total.load(Ordering::Relaxed),
            average_latency_us: if completed == 0 { 0 } else { latency / completed },
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Logical calls started.
    pub requests_total: u64,
    /// Logical calls that succeeded.
    pub requests_success: u64,
    /// Logical calls that failed.
    pub requests_failed: u64,
    /// HTTP round trips attempted.
    pub attempts_total: u64,
    /// Retries performed.
    pub retries_total: u64,
    /// 429 responses received.
    pub rate_limited_total: u64,
    /// Credential invalidations.
    pub reauthentications_total: u64,
    /// Average latency of completed calls in microseconds.
    pub average_latency_us: u64,
}

/// Log events emitted by the pipeline.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of an attempt.
    pub fn on_request_start(method: &str, url: &str, attempt: u32) {
        debug!(method = %method, url = %url, attempt, "App Store Connect request started");
    }

    /// Logs outgoing headers at trace level with sensitive values masked.
    pub fn on_request_headers(headers: &HeaderMap) {
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(headers = ?redacted_headers(headers), "App Store Connect request headers");
        }
    }

    /// Logs a received response.
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        info!(
            method = %method,
            url = %url,
            status,
            duration_ms = duration.as_millis() as u64,
            "App Store Connect request completed"
        );
    }

    /// Logs a terminal failure.
    pub fn on_request_error(method: &str, url: &str, error: &str) {
        warn!(method = %method, url = %url, error = %error, "App Store Connect request failed");
    }

    /// Logs a retry.
    pub fn on_retry(attempt: u32, delay: Duration, reason: &str) {
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Retrying App Store Connect request"
        );
    }

    /// Logs a rejected token being dropped before the re-auth attempt.
    pub fn on_reauthenticate(status: u16) {
        info!(status, "Credentials rejected, retrying with a fresh token");
    }

    /// Logs a newly signed token.
    pub fn on_token_signed(expires_at: i64) {
        debug!(expires_at, "Signed new App Store Connect token");
    }

    /// Logs a cache invalidation.
    pub fn on_token_invalidated() {
        debug!("Cached App Store Connect token invalidated");
    }

    /// Logs a rate limit update.
    pub fn on_rate_limit_update(status: &RateLimitStatus) {
        debug!(
            limit = status.hourly_limit,
            remaining = status.hourly_remaining,
            "Rate limit updated"
        );
    }

    /// Logs the near-limit advisory. `loud` selects warn over debug.
    pub fn on_near_limit(status: &RateLimitStatus, loud: bool) {
        if loud {
            warn!(
                limit = status.hourly_limit,
                remaining = status.hourly_remaining,
                "Approaching App Store Connect rate limit"
            );
        } else {
            debug!(
                limit = status.hourly_limit,
                remaining = status.hourly_remaining,
                "Approaching App Store Connect rate limit"
            );
        }
    }
}

/// Sensitive headers that should be redacted in logs.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Redacts sensitive values in headers.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

/// Header name/value pairs safe to log.
pub fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("[BINARY]");
            (name.as_str().to_string(), redact_header(name.as_str(), value))
        })
        .collect()
}
