//! Command implementations.

mod cache;
mod lookup;

pub use cache::{cmd_cache_clean, cmd_cache_clear, cmd_cache_stats};
pub use lookup::{cmd_issue, cmd_issues, cmd_mine, cmd_pr, cmd_pulls, cmd_search, cmd_show};

use serde::Serialize;

/// Print a value as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
