//! Command-line host: owns the data file, prints notices to stderr and
//! results as JSON to stdout.

mod commands;
mod icons;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ghlink::clock::SystemClock;
use ghlink::config::{load_config, Config, GithubAccount, LoadOptions, LogLevel};
use ghlink::http_client::ReqwestTransport;
use ghlink::notify::StderrNotifier;
use ghlink::session::Session;
use ghlink::storage::{DataStore, JsonFileStore};

/// Account id used for a token passed on the command line.
const CLI_ACCOUNT_ID: &str = "command-line";

#[derive(Parser)]
#[command(name = "ghlink")]
#[command(about = "Cached, rate-limit aware GitHub lookups")]
#[command(version)]
pub struct Cli {
    /// Data file holding settings and the response cache
    #[arg(long, global = true, env = "GHLINK_DATA")]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "GHLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Token used when no configured account matches
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Increase logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Bypass fresh cache entries for list and search commands
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one issue
    Issue {
        org: String,
        repo: String,
        number: u64,
    },

    /// Fetch one pull request
    Pr {
        org: String,
        repo: String,
        number: u64,
    },

    /// List issues of a repository
    Issues {
        org: String,
        repo: String,
        /// open, closed or all
        #[arg(long)]
        state: Option<String>,
        /// Label filter (repeatable or comma separated)
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// List issues assigned to or created by the selected account
    Mine {
        /// Organization used to pick the account
        #[arg(long)]
        org: Option<String>,
        /// assigned, created, mentioned, subscribed or all
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// List pull requests of a repository
    Pulls {
        org: String,
        repo: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Search issues and pull requests
    Search {
        query: String,
        /// Organization used to pick the account
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Resolve a github.com link to whatever it points at
    Show { url: String },

    /// Inspect or maintain the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show entry count and age range
    Stats,
    /// Remove entries older than the configured maximum age
    Clean,
    /// Remove every entry
    Clear,
}

/// Configuration resolved before logging is set up.
pub struct Prepared {
    config: Config,
    data_path: PathBuf,
    verbose: u8,
    stored_level: Option<LogLevel>,
}

impl Prepared {
    /// Filter used when `RUST_LOG` is not set.
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => {}
            1 => return LogLevel::Info.as_filter(),
            _ => return LogLevel::Debug.as_filter(),
        }

        let configured = self
            .config
            .log_level
            .as_deref()
            .and_then(LogLevel::from_name)
            .or(self.stored_level);

        match configured {
            Some(level) if level >= LogLevel::Info => level.as_filter(),
            _ => LogLevel::Warn.as_filter(),
        }
    }
}

/// Locate config and data before the subscriber exists.
pub async fn prepare(cli: &Cli) -> Prepared {
    let options = LoadOptions {
        config_path: cli.config.clone(),
        data_path: cli.data.clone(),
    };
    let (config, data_path) = load_config(&options).await;

    let stored_level = JsonFileStore::new(&data_path)
        .load()
        .await
        .ok()
        .flatten()
        .map(|data| data.settings.log_level);

    Prepared {
        config,
        data_path,
        verbose: cli.verbose,
        stored_level,
    }
}

pub async fn run(cli: Cli, prepared: Prepared) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::new(&prepared.data_path));
    let mut session = Session::open(
        store,
        Arc::new(SystemClock),
        Arc::new(StderrNotifier),
        &prepared.config,
    )
    .await?;

    if let Some(token) = cli.token.filter(|t| !t.trim().is_empty()) {
        let settings = session.settings_mut();
        settings.accounts.push(GithubAccount {
            id: CLI_ACCOUNT_ID.to_string(),
            name: CLI_ACCOUNT_ID.to_string(),
            token: Some(token),
            ..Default::default()
        });
        settings.default_account = Some(CLI_ACCOUNT_ID.to_string());
    }

    let transport = ReqwestTransport::new(session.settings().request_timeout())?;
    let api = session.build_api(Arc::new(transport));
    let saver = session.spawn_saver();
    let refresh = cli.refresh;

    let result = match cli.command {
        Commands::Issue { org, repo, number } => {
            commands::cmd_issue(&api, &org, &repo, number).await
        }
        Commands::Pr { org, repo, number } => commands::cmd_pr(&api, &org, &repo, number).await,
        Commands::Issues {
            org,
            repo,
            state,
            labels,
            assignee,
            page,
            per_page,
        } => {
            let params = ghlink::github::IssueListParams {
                state,
                labels,
                assignee,
                page,
                per_page,
                ..Default::default()
            };
            commands::cmd_issues(&api, &org, &repo, &params, refresh).await
        }
        Commands::Mine {
            org,
            filter,
            state,
            page,
            per_page,
        } => {
            let params = ghlink::github::IssueListParams {
                filter,
                state,
                page,
                per_page,
                ..Default::default()
            };
            commands::cmd_mine(&api, &params, org.as_deref(), refresh).await
        }
        Commands::Pulls {
            org,
            repo,
            state,
            page,
            per_page,
        } => {
            let params = ghlink::github::PullListParams {
                state,
                page,
                per_page,
                ..Default::default()
            };
            commands::cmd_pulls(&api, &org, &repo, &params).await
        }
        Commands::Search {
            query,
            org,
            sort,
            order,
            page,
            per_page,
        } => {
            let params = ghlink::github::SearchParams {
                sort,
                order,
                page,
                per_page,
            };
            commands::cmd_search(&api, &query, &params, org.as_deref(), refresh).await
        }
        Commands::Show { url } => commands::cmd_show(&api, &url).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => commands::cmd_cache_stats(&session).await,
            CacheCommands::Clean => commands::cmd_cache_clean(&session, &api).await,
            CacheCommands::Clear => commands::cmd_cache_clear(&api).await,
        },
    };

    saver.stop().await;
    session.save_if_dirty().await?;
    result
}
