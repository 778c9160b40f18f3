//! ghlink - cached, rate-limit aware GitHub REST client.
//!
//! Every call to GitHub goes through [`github::GitHubApi`], which serves fresh
//! responses from a persistent cache, revalidates stale ones with conditional
//! requests, refuses calls while the rate limit is exhausted, and serializes
//! network traffic through a request queue. [`session::Session`] owns the
//! persisted data blob the cache lives in.

pub mod cache;
pub mod clock;
pub mod config;
pub mod github;
pub mod http_client;
pub mod notify;
pub mod queue;
pub mod rate_limit;
pub mod session;
pub mod storage;
#[cfg(any(feature = "test-utils", test))]
pub mod testing;
