//! Rate limit state machine.

use chrono::{DateTime, TimeZone, Utc};

use crate::http_client::ApiResponse;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// What a response's headers said about the rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSignal {
    /// No limit information, or plenty of calls left.
    Clear,
    /// Few calls left; warn but keep going.
    Approaching { remaining: u64 },
    /// The limit is spent until `reset_at`.
    Exhausted { reset_at: DateTime<Utc> },
}

/// Global backoff state: either open, or blocked until a reset time.
#[derive(Debug, Clone, Default)]
pub struct RateLimitState {
    reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current block, if any. Does not clear expired blocks.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Gate a call attempt. Clears an expired block first.
    /// Returns the reset time if calls are still refused.
    pub fn check(&mut self, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        match self.reset_at {
            Some(reset_at) if reset_at > now => Err(reset_at),
            Some(_) => {
                self.reset_at = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Enter the blocked state. Returns true if this is a new block (the state
    /// was open or the previous block had already expired). A reset time that
    /// has already passed blocks nothing.
    pub fn block_until(&mut self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if reset_at <= now {
            return false;
        }
        let was_blocked = matches!(self.reset_at, Some(t) if t > now);
        self.reset_at = Some(match self.reset_at {
            Some(current) if was_blocked && current > reset_at => current,
            _ => reset_at,
        });
        !was_blocked
    }

    pub fn clear(&mut self) {
        self.reset_at = None;
    }
}

fn header_u64(response: &ApiResponse, name: &str) -> Option<u64> {
    response.header(name).and_then(|v| v.trim().parse::<u64>().ok())
}

/// Classify a response's rate-limit headers.
///
/// A zero `x-ratelimit-remaining` only counts as exhaustion when
/// `x-ratelimit-reset` (epoch seconds) is also present.
pub fn classify(response: &ApiResponse, warn_threshold: u64) -> RateLimitSignal {
    let Some(remaining) = header_u64(response, HEADER_REMAINING) else {
        return RateLimitSignal::Clear;
    };

    if remaining == 0 {
        let reset_at = header_u64(response, HEADER_RESET)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        if let Some(reset_at) = reset_at {
            return RateLimitSignal::Exhausted { reset_at };
        }
        return RateLimitSignal::Approaching { remaining };
    }

    if remaining <= warn_threshold {
        RateLimitSignal::Approaching { remaining }
    } else {
        RateLimitSignal::Clear
    }
}

/// Parse a `retry-after` header given in whole seconds.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<std::time::Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}
