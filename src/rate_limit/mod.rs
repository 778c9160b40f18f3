//! GitHub rate limit tracking.
//!
//! GitHub reports the remaining call budget on every response. Once it hits
//! zero, every further call is refused locally until the advertised reset time,
//! instead of burning requests on guaranteed 403s. A `retry-after` header is a
//! separate, one-shot instruction handled by the caller.

mod state;

pub use state::{
    classify, parse_retry_after, RateLimitSignal, RateLimitState, HEADER_REMAINING, HEADER_RESET,
    HEADER_RETRY_AFTER,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::http_client::ApiResponse;

/// Configuration for rate limit handling.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Remaining-call count at or below which a warning is logged.
    pub warn_threshold: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { warn_threshold: 5 }
    }
}

/// Outcome of inspecting one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitReport {
    pub signal: RateLimitSignal,
    /// True when this response moved the limiter from open to blocked.
    pub newly_blocked: bool,
    /// One-shot delay requested by the server.
    pub retry_after: Option<Duration>,
}

/// Shared handle to the session's rate limit state.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<RwLock<RateLimitState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(RateLimitState::new())),
        }
    }

    /// Gate an outbound call. Returns the reset time if calls are refused.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        let mut state = self.state.write().await;
        let had_block = state.reset_at().is_some();
        let result = state.check(now);
        if had_block && result.is_ok() {
            info!("GitHub rate limit window has passed, resuming requests");
        }
        result
    }

    /// Current block, if it is still in effect.
    pub async fn blocked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        state.reset_at().filter(|t| *t > now)
    }

    /// Inspect a received response and update state accordingly.
    pub async fn report(&self, response: &ApiResponse, now: DateTime<Utc>) -> RateLimitReport {
        let signal = classify(response, self.config.warn_threshold);
        let retry_after = parse_retry_after(response.header(HEADER_RETRY_AFTER));

        let newly_blocked = match signal {
            RateLimitSignal::Exhausted { reset_at } => {
                let mut state = self.state.write().await;
                let newly_blocked = state.block_until(reset_at, now);
                if reset_at > now {
                    warn!(
                        "GitHub rate limit exceeded. No more requests will be made until {}",
                        reset_at.to_rfc3339()
                    );
                } else {
                    debug!("Rate limit reset {} already passed", reset_at.to_rfc3339());
                }
                newly_blocked
            }
            RateLimitSignal::Approaching { remaining } => {
                warn!("GitHub rate limit approaching ({} requests remaining)", remaining);
                false
            }
            RateLimitSignal::Clear => {
                debug!("Rate limit headers clear for {} response", response.status);
                false
            }
        };

        RateLimitReport {
            signal,
            newly_blocked,
            retry_after,
        }
    }

    /// Forget any block (used by tests and manual resets).
    pub async fn reset(&self) {
        self.state.write().await.clear();
    }
}
