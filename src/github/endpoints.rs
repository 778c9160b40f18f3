//! Endpoint wrappers over [`GitHubApi::fetch`].
//!
//! Each wrapper shapes parameters (page size defaults, comma-joined labels),
//! picks a token for the target organization, and decodes the cached JSON
//! body into a typed model.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::accounts::{org_from_query, select_token};
use super::api::{ApiResult, GitHubApi};
use super::error::{ApiError, RequestError};
use super::models::{CheckRunList, CodeContent, Issue, PullRequest, SearchResults, TimelineEvent};
use super::pagination::{Paginated, PaginationMeta};
use crate::http_client::ApiRequest;

type Query = Vec<(&'static str, String)>;

fn push(query: &mut Query, key: &'static str, value: &Option<String>) {
    if let Some(value) = value {
        query.push((key, value.clone()));
    }
}

fn push_page(query: &mut Query, page: Option<u32>, per_page: Option<u32>, default_page_size: u32) {
    if let Some(page) = page {
        query.push(("page", page.to_string()));
    }
    query.push(("per_page", per_page.unwrap_or(default_page_size).to_string()));
}

fn push_labels(query: &mut Query, labels: &[String]) {
    if !labels.is_empty() {
        query.push(("labels", labels.join(",")));
    }
}

/// Filters for issue list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueListParams {
    pub state: Option<String>,
    pub milestone: Option<String>,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub mentioned: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub since: Option<String>,
    /// Only meaningful for the authenticated user's issues.
    pub filter: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl IssueListParams {
    /// Query for `/repos/{org}/{repo}/issues`.
    fn repo_query(&self, default_page_size: u32) -> Query {
        let mut query = Query::new();
        push(&mut query, "state", &self.state);
        push(&mut query, "milestone", &self.milestone);
        push(&mut query, "assignee", &self.assignee);
        push(&mut query, "creator", &self.creator);
        push(&mut query, "mentioned", &self.mentioned);
        push_labels(&mut query, &self.labels);
        push(&mut query, "sort", &self.sort);
        push(&mut query, "direction", &self.direction);
        push(&mut query, "since", &self.since);
        push_page(&mut query, self.page, self.per_page, default_page_size);
        query
    }

    /// Query for `/issues`; person filters do not apply there.
    fn user_query(&self, default_page_size: u32) -> Query {
        let mut query = Query::new();
        push(&mut query, "filter", &self.filter);
        push(&mut query, "state", &self.state);
        push_labels(&mut query, &self.labels);
        push(&mut query, "sort", &self.sort);
        push(&mut query, "direction", &self.direction);
        push(&mut query, "since", &self.since);
        push_page(&mut query, self.page, self.per_page, default_page_size);
        query
    }
}

/// Filters for `/repos/{org}/{repo}/pulls`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullListParams {
    pub state: Option<String>,
    pub head: Option<String>,
    pub base: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PullListParams {
    fn query(&self, default_page_size: u32) -> Query {
        let mut query = Query::new();
        push(&mut query, "state", &self.state);
        push(&mut query, "head", &self.head);
        push(&mut query, "base", &self.base);
        push(&mut query, "sort", &self.sort);
        push(&mut query, "direction", &self.direction);
        push_page(&mut query, self.page, self.per_page, default_page_size);
        query
    }
}

/// Options for `/search/issues`. The query string itself is passed separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl SearchParams {
    fn query(&self, q: &str, default_page_size: u32) -> Query {
        let mut query = vec![("q", q.to_string())];
        push(&mut query, "sort", &self.sort);
        push(&mut query, "order", &self.order);
        push_page(&mut query, self.page, self.per_page, default_page_size);
        query
    }
}

impl GitHubApi {
    /// Token for an organization according to the configured accounts.
    pub fn token_for(&self, org: Option<&str>) -> Option<&str> {
        let config = self.config();
        select_token(org, &config.accounts, config.default_account.as_deref())
    }

    fn endpoint(&self, path: &str, query: &[(&'static str, String)]) -> ApiResult<String> {
        let raw = format!("{}{}", self.config().base_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&raw).map_err(|e| RequestError::invalid_url(&raw, e))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: String,
        token: Option<&str>,
        skip_cache: bool,
    ) -> ApiResult<Paginated<T>> {
        let result = self.fetch(ApiRequest::get(&url), token, skip_cache).await?;
        let status = result.response.status;
        let Paginated { meta, response } = result;
        let decoded = serde_json::from_value(response.json)
            .map_err(|e| RequestError::decode(&url, status, e))?;
        Ok(Paginated::new(meta, decoded))
    }

    pub async fn fetch_issue(&self, org: &str, repo: &str, number: u64) -> ApiResult<Issue> {
        let url = self.endpoint(&format!("/repos/{}/{}/issues/{}", org, repo, number), &[])?;
        let issue: Paginated<Issue> =
            self.fetch_json(url, self.token_for(Some(org)), false).await?;
        Ok(issue.response)
    }

    pub async fn fetch_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> ApiResult<PullRequest> {
        let url = self.endpoint(&format!("/repos/{}/{}/pulls/{}", org, repo, number), &[])?;
        let pr: Paginated<PullRequest> =
            self.fetch_json(url, self.token_for(Some(org)), false).await?;
        Ok(pr.response)
    }

    /// Issues of one repository.
    pub async fn list_issues(
        &self,
        org: &str,
        repo: &str,
        params: &IssueListParams,
        skip_cache: bool,
    ) -> ApiResult<Paginated<Vec<Issue>>> {
        let query = params.repo_query(self.config().default_page_size);
        let url = self.endpoint(&format!("/repos/{}/{}/issues", org, repo), &query)?;
        self.fetch_json(url, self.token_for(Some(org)), skip_cache)
            .await
    }

    /// Issues visible to the account selected for `org`.
    ///
    /// Without a token there is no "me", so this returns an empty list and
    /// makes no request.
    pub async fn list_my_issues(
        &self,
        params: &IssueListParams,
        org: Option<&str>,
        skip_cache: bool,
    ) -> ApiResult<Paginated<Vec<Issue>>> {
        let Some(token) = self.token_for(org) else {
            debug!("No account token available, skipping personal issue list");
            return Ok(Paginated::new(PaginationMeta::default(), Vec::new()));
        };
        let query = params.user_query(self.config().default_page_size);
        let url = self.endpoint("/issues", &query)?;
        self.fetch_json(url, Some(token), skip_cache).await
    }

    pub async fn list_pull_requests(
        &self,
        org: &str,
        repo: &str,
        params: &PullListParams,
    ) -> ApiResult<Paginated<Vec<PullRequest>>> {
        let query = params.query(self.config().default_page_size);
        let url = self.endpoint(&format!("/repos/{}/{}/pulls", org, repo), &query)?;
        self.fetch_json(url, self.token_for(Some(org)), false).await
    }

    /// Search issues and pull requests. When `org` is not given, a
    /// `repo:<org>/<name>` qualifier in the query picks the token.
    pub async fn search_issues(
        &self,
        query: &str,
        params: &SearchParams,
        org: Option<&str>,
        skip_cache: bool,
    ) -> ApiResult<Paginated<SearchResults>> {
        let pairs = params.query(query, self.config().default_page_size);
        let url = self.endpoint("/search/issues", &pairs)?;
        let org = org.or_else(|| org_from_query(query));
        self.fetch_json(url, self.token_for(org), skip_cache).await
    }

    /// Repository contents at `path` on `branch`.
    pub async fn get_code(
        &self,
        org: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> ApiResult<CodeContent> {
        let path = path.trim_start_matches('/');
        let url = self.endpoint(
            &format!("/repos/{}/{}/contents/{}", org, repo, path),
            &[("ref", branch.to_string())],
        )?;
        let code: Paginated<CodeContent> =
            self.fetch_json(url, self.token_for(Some(org)), false).await?;
        Ok(code.response)
    }

    pub async fn list_check_runs_for_ref(
        &self,
        org: &str,
        repo: &str,
        git_ref: &str,
    ) -> ApiResult<CheckRunList> {
        let url = self.endpoint(
            &format!("/repos/{}/{}/commits/{}/check-runs", org, repo, git_ref),
            &[],
        )?;
        let runs: Paginated<CheckRunList> =
            self.fetch_json(url, self.token_for(Some(org)), false).await?;
        Ok(runs.response)
    }

    /// Browser URL of a pull request that cross-references an issue, found by
    /// scanning the issue's timeline. A missing timeline means "no PR".
    pub async fn get_pr_for_issue(
        &self,
        timeline_url: &str,
        org: Option<&str>,
    ) -> ApiResult<Option<String>> {
        let events: Paginated<Vec<TimelineEvent>> = match self
            .fetch_json(timeline_url.to_string(), self.token_for(org), false)
            .await
        {
            Ok(events) => events,
            Err(ApiError::Request(e)) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(events
            .response
            .iter()
            .find_map(|event| event.cross_referenced_pr())
            .map(str::to_string))
    }
}
