//! Fetch-with-cache orchestration.
//!
//! [`GitHubApi::fetch`] is the single path by which anything reaches GitHub:
//!
//! 1. A cached entry younger than the minimum request interval is returned
//!    as-is, without touching the queue or the network.
//! 2. Otherwise the request gets GitHub's accept/version headers, the bearer
//!    token if any, and `if-none-match`/`if-modified-since` from a stale entry.
//! 3. The rate limiter may refuse the call outright.
//! 4. The call runs on the request queue.
//! 5. A 304 refreshes the cached entry and returns its body; a 2xx replaces
//!    it. Rate-limit headers are inspected on every received response, and a
//!    `retry-after` triggers a single delayed retry.
//! 6. Pagination relations come from the `link` header.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::error::{rate_limit_message, ApiError, RequestError};
use super::pagination::{parse_link_header, Paginated};
use crate::cache::{CacheEntry, CachedResponse, ResponseCache, SharedCache};
use crate::clock::{Clock, SystemClock};
use crate::config::GithubAccount;
use crate::http_client::{ApiRequest, ApiResponse, Transport};
use crate::notify::{LogNotifier, Notifier};
use crate::queue::{QueueConfig, RequestQueue};
use crate::rate_limit::{RateLimitSignal, RateLimiter};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const ACCEPT: &str = "application/vnd.github+json";
pub const API_VERSION: &str = "2022-11-28";

/// How many times a single fetch honours `retry-after`.
const MAX_RETRY_AFTER_RETRIES: u32 = 1;

pub type ApiResult<T> = Result<T, ApiError>;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Cached entries younger than this are served without any network call.
    pub min_request_interval: Duration,
    /// `per_page` used when a list call does not set one.
    pub default_page_size: u32,
    pub accounts: Vec<GithubAccount>,
    pub default_account: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            min_request_interval: Duration::seconds(60),
            default_page_size: 10,
            accounts: Vec::new(),
            default_account: None,
        }
    }
}

/// GitHub client composing the response cache, rate limiter and request
/// queue around a [`Transport`].
pub struct GitHubApi {
    transport: Arc<dyn Transport>,
    cache: SharedCache,
    rate_limiter: RateLimiter,
    queue: RequestQueue,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: ApiConfig,
}

impl GitHubApi {
    /// Create a client with an empty cache, a fresh rate limiter and a
    /// single-lane queue. Must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: ApiConfig) -> Self {
        Self {
            transport,
            cache: ResponseCache::new().shared(),
            rate_limiter: RateLimiter::new(),
            queue: RequestQueue::new(QueueConfig::default()),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_queue(mut self, queue: RequestQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Shared handle to the response cache, for persistence.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Fetch a request through the cache, rate limiter and queue.
    pub async fn fetch(
        &self,
        request: ApiRequest,
        token: Option<&str>,
        skip_cache: bool,
    ) -> ApiResult<Paginated<CachedResponse>> {
        let mut request = init_headers(request, token);
        let mut cached = self.cache.read().await.get(&request).cloned();

        if let Some(entry) = cached.as_ref() {
            if !skip_cache && self.is_recent(entry) {
                debug!("Request was too recent. Returning cached value for: {}", request.url);
                return Ok(paginate(entry.response.clone()));
            }
            set_cache_headers(&mut request, entry);
        }

        let authenticated = token.is_some();
        let mut retries = 0;

        loop {
            if let Err(reset_at) = self.rate_limiter.check(self.clock.now()).await {
                warn!(
                    "GitHub rate limit exceeded. Not requesting {} until {}",
                    request.url,
                    reset_at.to_rfc3339()
                );
                return Err(ApiError::RateLimited {
                    reset_at,
                    authenticated,
                });
            }

            let response = self.dispatch(&request).await?;
            let now = self.clock.now();

            let report = self.rate_limiter.report(&response, now).await;
            if let (true, RateLimitSignal::Exhausted { reset_at }) =
                (report.newly_blocked, report.signal)
            {
                self.notifier
                    .notify(&rate_limit_message(&reset_at, &authenticated));
            }

            if let Some(delay) = report.retry_after {
                if retries < MAX_RETRY_AFTER_RETRIES {
                    retries += 1;
                    warn!(
                        "Got retry-after header with value {}s for {}",
                        delay.as_secs(),
                        request.url
                    );
                    if self.store(&request, &response, cached.is_some(), now).await {
                        cached = self.cache.read().await.get(&request).cloned();
                        if let Some(entry) = cached.as_ref() {
                            set_cache_headers(&mut request, entry);
                        }
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
                warn!("Not retrying {} again despite retry-after", request.url);
            }

            return self.settle(&request, response, cached, now).await;
        }
    }

    /// Evict every cached entry. Returns how many were removed.
    pub async fn clear_cache(&self) -> usize {
        let removed = self.cache.write().await.clean(self.clock.now());
        info!("Cleared {} cached responses", removed);
        removed
    }

    /// Evict entries retrieved at or before `max_age`.
    pub async fn clean_cache(&self, max_age: DateTime<Utc>) -> usize {
        let removed = self.cache.write().await.clean(max_age);
        if removed > 0 {
            info!("Removed {} cached responses older than {}", removed, max_age);
        }
        removed
    }

    fn is_recent(&self, entry: &CacheEntry) -> bool {
        let min_age = self
            .clock
            .now_millis()
            .saturating_sub(self.config.min_request_interval.num_milliseconds());
        entry.retrieved > min_age
    }

    async fn dispatch(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let transport = self.transport.clone();
        let outbound = request.clone();
        debug!("Request: {} {}", request.method, request.url);

        let response = self
            .queue
            .enqueue(move || async move { transport.send(&outbound).await })
            .await??;

        debug!("Response ({}): {}", request.url, response.status);
        Ok(response)
    }

    /// Apply a received response to the cache without settling the call:
    /// 2xx replaces the entry, 304 refreshes an existing one. Returns whether
    /// the cache changed.
    async fn store(
        &self,
        request: &ApiRequest,
        response: &ApiResponse,
        has_entry: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if response.is_not_modified() && has_entry {
            self.cache.write().await.update(request, now)
        } else if response.is_success() {
            self.cache.write().await.set(request, response, now)
        } else {
            false
        }
    }

    async fn settle(
        &self,
        request: &ApiRequest,
        response: ApiResponse,
        cached: Option<CacheEntry>,
        now: DateTime<Utc>,
    ) -> ApiResult<Paginated<CachedResponse>> {
        if response.is_not_modified() {
            return match cached {
                Some(entry) => {
                    self.cache.write().await.update(request, now);
                    debug!("Not modified, reusing cached body for {}", request.url);
                    Ok(paginate(entry.response))
                }
                None => Err(RequestError::from_response(&request.url, &response).into()),
            };
        }

        if response.is_success() {
            self.cache.write().await.set(request, &response, now);
            let meta = parse_link_header(response.link());
            return Ok(Paginated::new(meta, CachedResponse::from_response(&response)));
        }

        Err(RequestError::from_response(&request.url, &response).into())
    }
}

fn init_headers(mut request: ApiRequest, token: Option<&str>) -> ApiRequest {
    request.set_header("Accept", ACCEPT);
    request.set_header("X-GitHub-Api-Version", API_VERSION);
    if let Some(token) = token {
        request.set_header("Authorization", format!("Bearer {}", token));
    }
    request
}

fn set_cache_headers(request: &mut ApiRequest, entry: &CacheEntry) {
    if let Some(etag) = &entry.etag {
        request.set_header("if-none-match", etag.clone());
    }
    if let Some(last_modified) = &entry.last_modified {
        request.set_header("if-modified-since", last_modified.clone());
    }
}

fn paginate(response: CachedResponse) -> Paginated<CachedResponse> {
    Paginated::new(parse_link_header(response.header("link")), response)
}
