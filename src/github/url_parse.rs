//! Browser URL helpers.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

/// Top-level github.com paths that are site pages, not organizations.
pub const RESERVED_PATHS: &[&str] = &[
    "about",
    "account",
    "codespaces",
    "dashboard",
    "discussions",
    "explore",
    "gist",
    "github-copilot",
    "issues",
    "logout",
    "marketplace",
    "mine",
    "new",
    "organizations",
    "projects",
    "pulls",
    "search",
    "security",
    "settings",
    "sponsors",
];

/// Location within a repository's tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeLocation {
    pub branch: Option<String>,
    pub path: Option<String>,
}

/// What a github.com URL points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedUrl {
    pub url: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

fn non_empty(part: Option<&&str>) -> Option<String> {
    part.filter(|p| !p.is_empty()).map(|p| p.to_string())
}

/// Break a github.com browser URL into its parts.
///
/// Handles repository roots, `/issues/<n>`, `/pull/<n>`,
/// `/blob/<branch>/<path>` and `/commit/<sha>`. Fragments such as line anchors
/// are ignored.
pub fn parse_url(url: &str) -> Result<ParsedUrl, url::ParseError> {
    let parsed = Url::parse(url)?;
    let parts: Vec<&str> = parsed.path().split('/').collect();

    let mut result = ParsedUrl {
        url: url.to_string(),
        host: parsed.host_str().unwrap_or_default().to_string(),
        org: non_empty(parts.get(1)),
        repo: non_empty(parts.get(2)),
        ..Default::default()
    };

    if parts.len() > 4 {
        let number = parts[4].parse::<u64>().ok();
        match parts[3].to_ascii_lowercase().as_str() {
            "issues" => result.issue = number,
            "pull" => result.pr = number,
            "blob" => {
                let path = parts[5..].join("/");
                result.code = Some(CodeLocation {
                    branch: non_empty(parts.get(4)),
                    path: Some(path).filter(|p| !p.is_empty()),
                });
            }
            "commit" => {
                result.commit = Some(parts[4..].join("/")).filter(|c| !c.is_empty());
            }
            _ => {}
        }
    }

    Ok(result)
}

/// False for links GitHub uses for its own pages (and for unparseable links).
pub fn is_allowed_path(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let base = url.path().split('/').nth(1).unwrap_or_default();
    !RESERVED_PATHS.contains(&base)
}

fn api_repo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(https://)?api\.github\.com/repos/").expect("Invalid regex")
    })
}

/// Turn an API repository URL into the matching browser URL.
pub fn repo_api_to_browser_url(url: &str) -> String {
    api_repo_pattern()
        .replace(url, "https://github.com/")
        .into_owned()
}
