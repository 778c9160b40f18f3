//! Token selection across configured accounts.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::GithubAccount;

fn query_org_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"repo:([^/\s]+)/").expect("Invalid regex"))
}

/// Pick the account for an organization: the first account listing `org`,
/// otherwise the account whose id is `default_account`.
pub fn select_account<'a>(
    org: Option<&str>,
    accounts: &'a [GithubAccount],
    default_account: Option<&str>,
) -> Option<&'a GithubAccount> {
    org.and_then(|org| {
        accounts
            .iter()
            .find(|account| account.orgs.iter().any(|saved| saved == org))
    })
    .or_else(|| {
        let default_account = default_account?;
        accounts.iter().find(|account| account.id == default_account)
    })
}

/// Token for an organization, following [`select_account`]. Blank tokens
/// count as missing.
pub fn select_token<'a>(
    org: Option<&str>,
    accounts: &'a [GithubAccount],
    default_account: Option<&str>,
) -> Option<&'a str> {
    select_account(org, accounts, default_account)
        .and_then(|account| account.token.as_deref())
        .filter(|token| !token.trim().is_empty())
}

/// Organization named by the first `repo:<org>/<name>` qualifier in a search
/// query.
pub fn org_from_query(query: &str) -> Option<&str> {
    query_org_pattern()
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
