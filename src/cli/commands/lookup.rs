//! Issue, pull request, search and link lookups.

use serde_json::json;

use ghlink::github::{
    is_allowed_path, parse_url, GitHubApi, IssueListParams, ParsedUrl, PullListParams,
    SearchParams,
};

use super::print_json;

pub async fn cmd_issue(api: &GitHubApi, org: &str, repo: &str, number: u64) -> anyhow::Result<()> {
    let issue = api.fetch_issue(org, repo, number).await?;
    print_json(&json!({ "status": issue.status(), "issue": issue }))
}

pub async fn cmd_pr(api: &GitHubApi, org: &str, repo: &str, number: u64) -> anyhow::Result<()> {
    let pr = api.fetch_pull_request(org, repo, number).await?;
    print_json(&json!({ "status": pr.status(), "pullRequest": pr }))
}

pub async fn cmd_issues(
    api: &GitHubApi,
    org: &str,
    repo: &str,
    params: &IssueListParams,
    refresh: bool,
) -> anyhow::Result<()> {
    let issues = api.list_issues(org, repo, params, refresh).await?;
    print_json(&issues)
}

pub async fn cmd_mine(
    api: &GitHubApi,
    params: &IssueListParams,
    org: Option<&str>,
    refresh: bool,
) -> anyhow::Result<()> {
    if api.token_for(org).is_none() {
        eprintln!(
            "{} No account token available; pass --token or configure an account",
            crate::cli::icons::warning()
        );
    }
    let issues = api.list_my_issues(params, org, refresh).await?;
    print_json(&issues)
}

pub async fn cmd_pulls(
    api: &GitHubApi,
    org: &str,
    repo: &str,
    params: &PullListParams,
) -> anyhow::Result<()> {
    let pulls = api.list_pull_requests(org, repo, params).await?;
    print_json(&pulls)
}

pub async fn cmd_search(
    api: &GitHubApi,
    query: &str,
    params: &SearchParams,
    org: Option<&str>,
    refresh: bool,
) -> anyhow::Result<()> {
    let results = api.search_issues(query, params, org, refresh).await?;
    print_json(&results)
}

/// Fetch whatever a github.com link points at: an issue (with any pull
/// request that references it), a pull request, file contents or a commit's
/// check runs. Other links are printed as parsed.
pub async fn cmd_show(api: &GitHubApi, url: &str) -> anyhow::Result<()> {
    if !is_allowed_path(url) {
        anyhow::bail!("Not a repository link: {}", url);
    }
    let link = parse_url(url)?;

    let (Some(org), Some(repo)) = (link.org.as_deref(), link.repo.as_deref()) else {
        return print_json(&link);
    };

    if let Some(number) = link.issue {
        let issue = api.fetch_issue(org, repo, number).await?;
        let linked_pr = match issue.timeline_url.as_deref() {
            Some(timeline) => api.get_pr_for_issue(timeline, Some(org)).await?,
            None => None,
        };
        return print_json(&json!({
            "link": link,
            "status": issue.status(),
            "issue": issue,
            "linkedPullRequest": linked_pr,
        }));
    }

    if let Some(number) = link.pr {
        let pr = api.fetch_pull_request(org, repo, number).await?;
        return print_json(&json!({ "link": link, "status": pr.status(), "pullRequest": pr }));
    }

    if let Some(code) = code_target(&link) {
        let (branch, path) = code;
        let content = api.get_code(org, repo, path, branch).await?;
        return print_json(&json!({ "link": link, "content": content }));
    }

    if let Some(sha) = link.commit.as_deref() {
        let checks = api.list_check_runs_for_ref(org, repo, sha).await?;
        return print_json(&json!({ "link": link, "checkRuns": checks }));
    }

    print_json(&link)
}

fn code_target(link: &ParsedUrl) -> Option<(&str, &str)> {
    let code = link.code.as_ref()?;
    Some((code.branch.as_deref()?, code.path.as_deref()?))
}
