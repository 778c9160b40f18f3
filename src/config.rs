//! Configuration management for ghlink using the prefer crate.
//!
//! Two layers feed the effective [`Settings`]:
//!
//! - the persisted settings inside the data file (camelCase keys, shared with
//!   other hosts of the same data), and
//! - an optional config file overlay, discovered with `prefer` or given
//!   explicitly, whose set fields win over the persisted values.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::github::{ApiConfig, DEFAULT_BASE_URL};
use crate::queue::{QueueConfig, DEFAULT_LANE};
use crate::rate_limit::RateLimitConfig;

/// Upper bound for timer-backed settings: one year.
const MAX_TIMER_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Data file name inside the data directory.
pub const DATA_FILENAME: &str = "ghlink.json";

/// Log verbosity stored with the settings, persisted as 0 (error) to 3 (debug).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    #[default]
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn from_number(n: u64) -> Option<Self> {
        match n {
            0 => Some(LogLevel::Error),
            1 => Some(LogLevel::Warn),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "ghlink=error",
            LogLevel::Warn => "ghlink=warn",
            LogLevel::Info => "ghlink=info",
            LogLevel::Debug => "ghlink=debug",
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Name(String),
        }

        let level = match Repr::deserialize(deserializer)? {
            Repr::Number(n) => LogLevel::from_number(n),
            Repr::Name(name) => LogLevel::from_name(&name),
        };
        level.ok_or_else(|| serde::de::Error::custom("unknown log level"))
    }
}

/// A GitHub identity whose token is used for matching organizations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Organizations and users this account is used for.
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom_oauth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

fn default_page_size() -> u32 {
    10
}

fn default_cache_interval_seconds() -> u64 {
    60
}

fn default_max_cache_age_hours() -> u64 {
    120
}

fn default_min_request_seconds() -> u64 {
    60
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_queue_concurrency() -> usize {
    1
}

fn default_rate_limit_warn_threshold() -> u64 {
    5
}

/// Effective settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub accounts: Vec<GithubAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// How often a dirty cache is written back.
    #[serde(default = "default_cache_interval_seconds")]
    pub cache_interval_seconds: u64,
    /// Entries older than this are dropped at startup.
    #[serde(default = "default_max_cache_age_hours")]
    pub max_cache_age_hours: u64,
    /// Cached responses younger than this are served without a request.
    #[serde(default = "default_min_request_seconds")]
    pub min_request_seconds: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_queue_concurrency")]
    pub queue_concurrency: usize,
    #[serde(default = "default_rate_limit_warn_threshold")]
    pub rate_limit_warn_threshold: u64,
    /// Settings owned by other hosts of the same data file, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            default_account: None,
            default_page_size: default_page_size(),
            cache_interval_seconds: default_cache_interval_seconds(),
            max_cache_age_hours: default_max_cache_age_hours(),
            min_request_seconds: default_min_request_seconds(),
            log_level: LogLevel::default(),
            api_base_url: default_api_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            queue_concurrency: default_queue_concurrency(),
            rate_limit_warn_threshold: default_rate_limit_warn_threshold(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_base_url.clone(),
            min_request_interval: i64::try_from(self.min_request_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            default_page_size: self.default_page_size,
            accounts: self.accounts.clone(),
            default_account: self.default_account.clone(),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            warn_threshold: self.rate_limit_warn_threshold,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            name: DEFAULT_LANE.to_string(),
            concurrency: self.queue_concurrency,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds.min(MAX_TIMER_SECONDS))
    }

    pub fn cache_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_interval_seconds.clamp(1, MAX_TIMER_SECONDS))
    }

    /// Oldest `retrieved` time a cache entry may have at `now`. Ages beyond
    /// what a timestamp can represent keep every entry.
    pub fn max_cache_age(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.max_cache_age_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Configuration file structure. Every field is optional; set fields
/// override the persisted settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data file location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cache_age_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_request_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_warn_threshold: Option<u64>,
    /// Level name: error, warn, info or debug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers ghlink config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("ghlink").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Data file location named by this config, resolved against `base_dir`.
    pub fn data_path(&self, base_dir: &Path) -> Option<PathBuf> {
        self.data.as_deref().map(|p| resolve_path(p, base_dir))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref url) = self.api_base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(ref account) = self.default_account {
            settings.default_account = Some(account.clone());
        }
        if let Some(size) = self.default_page_size {
            settings.default_page_size = size;
        }
        if let Some(secs) = self.cache_interval_seconds {
            settings.cache_interval_seconds = secs;
        }
        if let Some(hours) = self.max_cache_age_hours {
            settings.max_cache_age_hours = hours;
        }
        if let Some(secs) = self.min_request_seconds {
            settings.min_request_seconds = secs;
        }
        if let Some(secs) = self.request_timeout_seconds {
            settings.request_timeout_seconds = secs;
        }
        if let Some(concurrency) = self.queue_concurrency {
            settings.queue_concurrency = concurrency;
        }
        if let Some(threshold) = self.rate_limit_warn_threshold {
            settings.rate_limit_warn_threshold = threshold;
        }
        if let Some(level) = self.log_level.as_deref() {
            match LogLevel::from_name(level) {
                Some(level) => settings.log_level = level,
                None => tracing::warn!("Unknown log level in config: {}", level),
            }
        }
    }
}

/// Resolve a path that may be relative to the config file.
/// - Absolute paths are returned as-is
/// - Paths starting with ~ are expanded
/// - Relative paths are resolved relative to `base_dir`
pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Default data file: `<platform data dir>/ghlink/ghlink.json`.
pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ghlink")
        .join(DATA_FILENAME)
}

/// Options for locating configuration and data.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file; skips discovery.
    pub config_path: Option<PathBuf>,
    /// Explicit data file; wins over the config file's `data`.
    pub data_path: Option<PathBuf>,
}

/// Load the config overlay and decide where the data file lives.
pub async fn load_config(options: &LoadOptions) -> (Config, PathBuf) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let data_path = options
        .data_path
        .as_ref()
        .map(|p| resolve_path(&p.to_string_lossy(), &base_dir))
        .or_else(|| config.data_path(&base_dir))
        .unwrap_or_else(default_data_path);

    tracing::debug!("Using data file {}", data_path.display());
    (config, data_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_defaults_from_empty_object() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_page_size, 10);
        assert_eq!(settings.cache_interval_seconds, 60);
        assert_eq!(settings.max_cache_age_hours, 120);
        assert_eq!(settings.min_request_seconds, 60);
        assert_eq!(settings.log_level, LogLevel::Error);
        assert_eq!(settings.api_base_url, "https://api.github.com");
    }

    #[test]
    fn test_settings_keep_unknown_keys() {
        let raw = r#"{"accounts":[{"id":"a","name":"A","orgs":["acme"],"token":"t"}],
            "defaultAccount":"a","logLevel":3,"showPagination":false}"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.accounts[0].orgs, vec!["acme"]);
        assert_eq!(settings.default_account.as_deref(), Some("a"));
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.extra.get("showPagination"), Some(&Value::Bool(false)));

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["showPagination"], false);
        assert_eq!(back["logLevel"], 3);
        assert_eq!(back["defaultPageSize"], 10);
    }

    #[test]
    fn test_log_level_accepts_names() {
        let level: LogLevel = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(level, LogLevel::Info);
        assert!(serde_json::from_str::<LogLevel>("7").is_err());
    }

    #[test]
    fn test_derived_configs() {
        let settings = Settings {
            min_request_seconds: 5,
            queue_concurrency: 3,
            rate_limit_warn_threshold: 9,
            ..Settings::default()
        };
        assert_eq!(settings.api_config().min_request_interval, Duration::seconds(5));
        assert_eq!(settings.queue_config().concurrency, 3);
        assert_eq!(settings.rate_limit_config().warn_threshold, 9);

        let now = Utc::now();
        assert_eq!(settings.max_cache_age(now), now - Duration::hours(120));
    }

    #[test]
    fn test_out_of_range_durations_saturate() {
        let settings: Settings = serde_json::from_str(
            r#"{"maxCacheAgeHours":10000000000,"minRequestSeconds":18446744073709551615,
                "cacheIntervalSeconds":18446744073709551615,"requestTimeoutSeconds":18446744073709551615}"#,
        )
        .unwrap();

        let now = Utc::now();
        assert_eq!(settings.max_cache_age(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(settings.api_config().min_request_interval, Duration::MAX);
        assert_eq!(
            settings.cache_interval(),
            std::time::Duration::from_secs(365 * 24 * 60 * 60)
        );
        assert_eq!(settings.request_timeout(), settings.cache_interval());

        let zero = Settings {
            cache_interval_seconds: 0,
            ..Settings::default()
        };
        assert_eq!(zero.cache_interval(), std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghlink.toml");
        tokio::fs::write(
            &path,
            "data = \"state/data.json\"\nmin_request_seconds = 15\nlog_level = \"debug\"\n",
        )
        .await
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
        assert_eq!(
            config.data_path(dir.path()),
            Some(dir.path().join("state/data.json"))
        );

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(settings.min_request_seconds, 15);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.default_page_size, 10);
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("ghlink.yaml");
        tokio::fs::write(&yaml, "default_page_size: 50\n").await.unwrap();
        let json = dir.path().join("ghlink.json");
        tokio::fs::write(&json, r#"{"queue_concurrency": 2}"#).await.unwrap();

        assert_eq!(
            Config::load_from_path(&yaml).await.unwrap().default_page_size,
            Some(50)
        );
        assert_eq!(
            Config::load_from_path(&json).await.unwrap().queue_concurrency,
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_load_from_path_reports_parse_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "this is = = not toml").await.unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(err.contains("TOML"));
    }

    #[tokio::test]
    async fn test_explicit_data_path_wins() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ghlink.json");
        tokio::fs::write(&config_path, r#"{"data": "from-config.json"}"#)
            .await
            .unwrap();

        let (_, data) = load_config(&LoadOptions {
            config_path: Some(config_path.clone()),
            data_path: None,
        })
        .await;
        assert_eq!(data, dir.path().join("from-config.json"));

        let explicit = dir.path().join("explicit.json");
        let (_, data) = load_config(&LoadOptions {
            config_path: Some(config_path),
            data_path: Some(explicit.clone()),
        })
        .await;
        assert_eq!(data, explicit);
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/base");
        assert_eq!(resolve_path("/abs/file", base), PathBuf::from("/abs/file"));
        assert_eq!(resolve_path("rel/file", base), PathBuf::from("/base/rel/file"));
    }
}
