//! GitHub REST API client.
//!
//! Everything that talks to GitHub goes through [`GitHubApi`], which layers
//! the response cache, rate limiter and request queue over a transport.
//! Endpoint wrappers live in `endpoints`; browser URL helpers in `url_parse`.

mod accounts;
mod api;
mod endpoints;
mod error;
pub mod models;
mod pagination;
mod url_parse;

pub use accounts::{org_from_query, select_account, select_token};
pub use api::{ApiConfig, ApiResult, GitHubApi, ACCEPT, API_VERSION, DEFAULT_BASE_URL};
pub use endpoints::{IssueListParams, PullListParams, SearchParams};
pub use error::{rate_limit_message, ApiError, RequestError};
pub use models::IssueStatus;
pub use pagination::{parse_link_header, LinkMeta, Paginated, PaginationMeta};
pub use url_parse::{
    is_allowed_path, parse_url, repo_api_to_browser_url, CodeLocation, ParsedUrl, RESERVED_PATHS,
};
