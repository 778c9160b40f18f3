//! Cache maintenance commands.

use chrono::Utc;
use serde_json::json;

use ghlink::github::GitHubApi;
use ghlink::session::Session;

use super::print_json;
use crate::cli::icons::{success, warning};

pub async fn cmd_cache_stats(session: &Session) -> anyhow::Result<()> {
    let stats = session.cache().read().await.stats();
    print_json(&json!({
        "entries": stats.entries,
        "oldest": stats.oldest,
        "newest": stats.newest,
        "unsaved": stats.dirty,
        "maxAgeHours": session.settings().max_cache_age_hours,
    }))
}

/// Drop entries older than the configured maximum age.
pub async fn cmd_cache_clean(session: &Session, api: &GitHubApi) -> anyhow::Result<()> {
    let max_age = session.settings().max_cache_age(Utc::now());
    let removed = api.clean_cache(max_age).await;

    if removed == 0 {
        eprintln!("{} No expired cache entries", warning());
    } else {
        eprintln!("{} Removed {} expired cache entries", success(), removed);
    }
    Ok(())
}

pub async fn cmd_cache_clear(api: &GitHubApi) -> anyhow::Result<()> {
    let removed = api.clear_cache().await;
    eprintln!("{} Removed {} cache entries", success(), removed);
    Ok(())
}
