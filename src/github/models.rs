//! Typed views over GitHub REST responses.
//!
//! Only the fields ghlink reads are modelled; everything else in the payload
//! is ignored. Optional and defaulted fields keep decoding tolerant of the
//! many shapes GitHub returns for the same resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rendering status shared by issues, pull requests and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Closed,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The `pull_request` stub attached to issues that are really pull requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuePullRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub state_reason: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub timeline_url: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pull_request: Option<IssuePullRequest>,
}

impl Issue {
    /// Status of an issue fetched directly.
    pub fn status(&self) -> IssueStatus {
        if self.state == "open" {
            IssueStatus::Open
        } else if self.state_reason.as_deref() == Some("completed") {
            IssueStatus::Done
        } else {
            IssueStatus::Closed
        }
    }

    /// Status of an issue or pull request returned by search, where merged
    /// pull requests count as done.
    pub fn search_status(&self) -> IssueStatus {
        let merged = self
            .pull_request
            .as_ref()
            .is_some_and(|pr| pr.merged_at.is_some());
        if merged || self.state_reason.as_deref() == Some("completed") {
            IssueStatus::Done
        } else if self.closed_at.is_some() || self.state == "closed" {
            IssueStatus::Closed
        } else {
            IssueStatus::Open
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub head: Option<GitRef>,
    #[serde(default)]
    pub base: Option<GitRef>,
}

impl PullRequest {
    pub fn status(&self) -> IssueStatus {
        if self.merged {
            IssueStatus::Done
        } else if self.closed_at.is_some() {
            IssueStatus::Closed
        } else {
            IssueStatus::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<Issue>,
}

/// One entry of the repository contents API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Base64 file content; only present for single files.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Contents of a path: a single file, or a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeContent {
    Directory(Vec<ContentItem>),
    File(ContentItem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub check_runs: Vec<CheckRun>,
}

/// Issue timeline event, reduced to what cross-reference lookup needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub source: Option<TimelineSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSource {
    #[serde(default)]
    pub issue: Option<TimelineIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineIssue {
    #[serde(default)]
    pub pull_request: Option<IssuePullRequest>,
}

impl TimelineEvent {
    /// Browser URL of the pull request this event cross-references, if any.
    pub fn cross_referenced_pr(&self) -> Option<&str> {
        if self.event.as_deref() != Some("cross-referenced") {
            return None;
        }
        self.source
            .as_ref()?
            .issue
            .as_ref()?
            .pull_request
            .as_ref()?
            .html_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(value: serde_json::Value) -> Issue {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_issue_status() {
        let open = issue(json!({"number": 1, "title": "t", "state": "open"}));
        assert_eq!(open.status(), IssueStatus::Open);

        let completed = issue(json!({
            "number": 1, "title": "t", "state": "closed", "state_reason": "completed"
        }));
        assert_eq!(completed.status(), IssueStatus::Done);

        let wontfix = issue(json!({
            "number": 1, "title": "t", "state": "closed", "state_reason": "not_planned"
        }));
        assert_eq!(wontfix.status(), IssueStatus::Closed);
    }

    #[test]
    fn test_search_status_counts_merged_prs_as_done() {
        let merged = issue(json!({
            "number": 2, "title": "t", "state": "closed",
            "closed_at": "2024-01-02T00:00:00Z",
            "pull_request": {"merged_at": "2024-01-02T00:00:00Z"}
        }));
        assert!(merged.is_pull_request());
        assert_eq!(merged.search_status(), IssueStatus::Done);

        let closed = issue(json!({
            "number": 3, "title": "t", "state": "open",
            "closed_at": "2024-01-02T00:00:00Z"
        }));
        assert_eq!(closed.search_status(), IssueStatus::Closed);

        let open = issue(json!({"number": 4, "title": "t", "state": "open"}));
        assert_eq!(open.search_status(), IssueStatus::Open);
    }

    #[test]
    fn test_pull_request_status() {
        let pr: PullRequest = serde_json::from_value(json!({
            "number": 5, "title": "t", "state": "closed", "merged": true,
            "head": {"ref": "feature", "sha": "abc"}
        }))
        .unwrap();
        assert_eq!(pr.status(), IssueStatus::Done);
        assert_eq!(pr.head.unwrap().ref_name, "feature");

        let closed: PullRequest = serde_json::from_value(json!({
            "number": 6, "title": "t", "state": "closed",
            "closed_at": "2024-01-02T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(closed.status(), IssueStatus::Closed);
    }

    #[test]
    fn test_code_content_file_or_directory() {
        let file: CodeContent = serde_json::from_value(json!({
            "type": "file", "name": "lib.rs", "path": "src/lib.rs", "content": "Zm4="
        }))
        .unwrap();
        assert!(matches!(file, CodeContent::File(ref f) if f.content.is_some()));

        let dir: CodeContent = serde_json::from_value(json!([
            {"type": "file", "name": "a.rs", "path": "src/a.rs"},
            {"type": "dir", "name": "b", "path": "src/b"}
        ]))
        .unwrap();
        assert!(matches!(dir, CodeContent::Directory(ref items) if items.len() == 2));
    }

    #[test]
    fn test_timeline_cross_reference() {
        let events: Vec<TimelineEvent> = serde_json::from_value(json!([
            {"event": "labeled"},
            {"event": "cross-referenced", "source": {"issue": {}}},
            {"event": "cross-referenced", "source": {"issue": {
                "pull_request": {"html_url": "https://github.com/a/b/pull/9"}
            }}}
        ]))
        .unwrap();
        let found: Vec<_> = events.iter().filter_map(|e| e.cross_referenced_pr()).collect();
        assert_eq!(found, vec!["https://github.com/a/b/pull/9"]);
    }
}
