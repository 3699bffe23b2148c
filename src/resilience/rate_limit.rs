//! Tracking of the hourly request quota advertised by the service.
//!
//! Responses carry an `x-rate-limit` header such as
//! `user-hour-lim:3600;user-hour-rem:2500;`. The tracker keeps the latest
//! values so callers can inspect the remaining quota without a request.

use crate::observability::TracingHooks;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

/// Response header carrying rate limit metadata.
pub const RATE_LIMIT_HEADER: &str = "x-rate-limit";

/// Published hourly request ceiling.
pub const DEFAULT_HOURLY_LIMIT: u32 = 3600;

/// Below this many remaining requests the quota is considered nearly spent.
pub const NEAR_LIMIT_THRESHOLD: u32 = 100;

/// Below this many remaining requests callers should be warned.
pub const WARN_THRESHOLD: u32 = 500;

/// Minimum seconds between two near-limit warnings from one tracker.
const NEAR_LIMIT_LOG_INTERVAL_SECS: i64 = 60;

const KEY_HOURLY_LIMIT: &str = "user-hour-lim";
const KEY_HOURLY_REMAINING: &str = "user-hour-rem";

/// Snapshot of the quota state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Requests allowed per hour.
    pub hourly_limit: u32,
    /// Requests left in the current hour.
    pub hourly_remaining: u32,
    /// When the state was last changed.
    pub last_updated: DateTime<Utc>,
}

impl RateLimitStatus {
    fn initial() -> Self {
        Self {
            hourly_limit: DEFAULT_HOURLY_LIMIT,
            hourly_remaining: DEFAULT_HOURLY_LIMIT,
            last_updated: Utc::now(),
        }
    }

    /// True when fewer than [`NEAR_LIMIT_THRESHOLD`] requests remain.
    pub fn is_near_limit(&self) -> bool {
        self.hourly_remaining < NEAR_LIMIT_THRESHOLD
    }

    /// True when fewer than [`WARN_THRESHOLD`] requests remain.
    pub fn should_warn(&self) -> bool {
        self.hourly_remaining < WARN_THRESHOLD
    }
}

/// Values recognized in one rate limit header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHeader {
    /// Parsed `user-hour-lim`.
    pub hourly_limit: Option<u32>,
    /// Parsed `user-hour-rem`.
    pub hourly_remaining: Option<u32>,
}

impl RateLimitHeader {
    /// True when no recognized key was found.
    pub fn is_empty(&self) -> bool {
        self.hourly_limit.is_none() && self.hourly_remaining.is_none()
    }
}

/// Parses a `key:value;key:value;` header. Unknown keys and malformed
/// segments are skipped.
pub fn parse_rate_limit_header(value: &str) -> RateLimitHeader {
    let mut parsed = RateLimitHeader::default();

    for segment in value.split(';') {
        let Some((key, raw)) = segment.split_once(':') else {
            continue;
        };
        let Ok(number) = raw.trim().parse::<u32>() else {
            continue;
        };

        match key.trim() {
            KEY_HOURLY_LIMIT => parsed.hourly_limit = Some(number),
            KEY_HOURLY_REMAINING => parsed.hourly_remaining = Some(number),
            _ => {}
        }
    }

    parsed
}

/// Shared quota state for one client.
///
/// Updates replace the whole record under one lock, so readers never see a
/// limit from one response paired with a remaining count from another.
/// Concurrent updates are last-write-wins.
#[derive(Debug)]
pub struct RateLimitTracker {
    state: RwLock<RateLimitStatus>,
    last_near_limit_log: AtomicI64,
}

impl RateLimitTracker {
    /// Creates a tracker at the published hourly ceiling.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RateLimitStatus::initial()),
            last_near_limit_log: AtomicI64::new(i64::MIN),
        }
    }

    /// Feeds the `x-rate-limit` header of one response. A missing header or
    /// one without recognized keys leaves the state untouched.
    pub fn observe(&self, header: Option<&str>) {
        let Some(value) = header else {
            return;
        };

        let parsed = parse_rate_limit_header(value);
        if parsed.is_empty() {
            return;
        }

        let snapshot = {
            let mut state = self.state.write();
            *state = RateLimitStatus {
                hourly_limit: parsed.hourly_limit.unwrap_or(state.hourly_limit),
                hourly_remaining: parsed.hourly_remaining.unwrap_or(state.hourly_remaining),
                last_updated: Utc::now(),
            };
            *state
        };

        TracingHooks::on_rate_limit_update(&snapshot);
    }

    /// Returns a copy of the current state.
    pub fn current_status(&self) -> RateLimitStatus {
        *self.state.read()
    }

    /// True when fewer than [`NEAR_LIMIT_THRESHOLD`] requests remain.
    pub fn is_near_limit(&self) -> bool {
        self.current_status().is_near_limit()
    }

    /// True when fewer than [`WARN_THRESHOLD`] requests remain.
    pub fn should_warn(&self) -> bool {
        self.current_status().should_warn()
    }

    /// Emits the near-limit advisory if the quota is nearly spent. Warnings
    /// are limited to one per minute; the rest go to debug.
    pub fn advise_if_near_limit(&self) {
        let status = self.current_status();
        if !status.is_near_limit() {
            return;
        }

        let now = Utc::now().timestamp();
        let last = self.last_near_limit_log.load(Ordering::Relaxed);
        let due = now.saturating_sub(last) >= NEAR_LIMIT_LOG_INTERVAL_SECS
            && self
                .last_near_limit_log
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok();

        TracingHooks::on_near_limit(&status, due);
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}
