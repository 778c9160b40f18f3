//! Session lifecycle: load persisted data, migrate and clean the cache, wire
//! up a [`GitHubApi`], and persist the cache periodically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::{ResponseCache, SharedCache};
use crate::clock::Clock;
use crate::config::{Config, Settings};
use crate::github::GitHubApi;
use crate::http_client::Transport;
use crate::notify::Notifier;
use crate::queue::RequestQueue;
use crate::rate_limit::RateLimiter;
use crate::storage::{DataStore, PersistedData, StoreError, DATA_VERSION};

/// One host session over a persisted data blob.
///
/// `settings()` are the effective settings (stored settings with the config
/// overlay applied). Only the stored settings are written back on save.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn DataStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    cache: SharedCache,
    stored_settings: Settings,
    settings: Settings,
}

impl Session {
    /// Load the blob, migrate an outdated cache and drop expired entries.
    pub async fn open(
        store: Arc<dyn DataStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        overlay: &Config,
    ) -> Result<Self, StoreError> {
        let loaded = store.load().await?;
        let fresh = loaded.is_none();
        let data = loaded.unwrap_or_default();

        let mut settings = data.settings.clone();
        overlay.apply_to_settings(&mut settings);

        let cache = ResponseCache::from_json(data.cache.as_deref().unwrap_or_default());

        let session = Self {
            store,
            clock,
            notifier,
            cache: cache.shared(),
            stored_settings: data.settings.clone(),
            settings,
        };

        if fresh {
            debug!("No stored data, starting with an empty cache");
            session.save().await?;
        } else if data.needs_migration() {
            session.migrate().await?;
        }

        session.clean_expired().await?;
        Ok(session)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let removed = {
            let mut cache = self.cache.write().await;
            cache.clean(self.clock.now())
        };
        self.save().await?;

        self.notifier.notify(&format!(
            "GitHub link data schema migrated to version {}. Removed {} stored items from GitHub Link cache.",
            DATA_VERSION, removed
        ));
        Ok(())
    }

    async fn clean_expired(&self) -> Result<usize, StoreError> {
        let max_age = self.settings.max_cache_age(self.clock.now());
        let removed = {
            let mut cache = self.cache.write().await;
            cache.clean(max_age)
        };
        if removed > 0 {
            self.save().await?;
            info!("Cleaned {} entries from request cache.", removed);
        }
        Ok(removed)
    }

    /// Effective settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Effective settings, for per-process overrides that are never saved.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Settings as stored in the blob.
    pub fn stored_settings(&self) -> &Settings {
        &self.stored_settings
    }

    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Persist settings and cache unconditionally. Returns the number of
    /// cache entries written.
    pub async fn save(&self) -> Result<usize, StoreError> {
        let (entries, revision) = {
            let cache = self.cache.read().await;
            (cache.to_json(), cache.revision())
        };
        let count = entries.len();

        let data = PersistedData {
            settings: self.stored_settings.clone(),
            cache: Some(entries),
            data_version: Some(DATA_VERSION),
        };
        self.store.save(&data).await?;

        self.cache.write().await.mark_saved_at(revision);
        Ok(count)
    }

    /// Persist only when the cache changed since the last save. Returns the
    /// number of entries written, if a save happened.
    pub async fn save_if_dirty(&self) -> Result<Option<usize>, StoreError> {
        if !self.cache.read().await.is_dirty() {
            return Ok(None);
        }
        let count = self.save().await?;
        info!("Saved request cache with {} items.", count);
        Ok(Some(count))
    }

    /// Start a background task saving a dirty cache every
    /// `cache_interval_seconds`.
    pub fn spawn_saver(&self) -> CacheSaver {
        let session = self.clone();
        let period = self.settings.cache_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = session.save_if_dirty().await {
                            error!("Failed to save request cache: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Cache saver stopped");
                        break;
                    }
                }
            }
        });

        CacheSaver {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            period,
        }
    }

    /// Build the API client over this session's cache and settings.
    pub fn build_api(&self, transport: Arc<dyn Transport>) -> GitHubApi {
        GitHubApi::new(transport, self.settings.api_config())
            .with_cache(self.cache.clone())
            .with_rate_limiter(RateLimiter::with_config(self.settings.rate_limit_config()))
            .with_queue(RequestQueue::new(self.settings.queue_config()))
            .with_clock(self.clock.clone())
            .with_notifier(self.notifier.clone())
    }
}

/// Handle to the periodic cache saver. Dropping it stops the task.
pub struct CacheSaver {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl CacheSaver {
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheSaver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::clock::MockClock;
    use crate::http_client::ApiRequest;
    use crate::notify::RecordingNotifier;
    use crate::storage::{JsonFileStore, MemoryStore};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn entry_json(url: &str, retrieved_ms: i64) -> String {
        let request = ApiRequest::get(url);
        let response = crate::http_client::ApiResponse::from_parts(
            200,
            Default::default(),
            r#"{"ok":true}"#.to_string(),
        );
        CacheEntry::new(&request, &response, retrieved_ms)
            .to_json_string()
            .unwrap()
    }

    fn clock() -> Arc<MockClock> {
        Arc::new(MockClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
    }

    async fn open(
        store: Arc<MemoryStore>,
        clock: Arc<MockClock>,
        notifier: Arc<RecordingNotifier>,
    ) -> Session {
        Session::open(store, clock, notifier, &Config::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_store_saves_current_version() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let session = open(store.clone(), clock(), notifier.clone()).await;

        assert_eq!(store.saves(), 1);
        assert_eq!(store.data().unwrap().data_version, Some(DATA_VERSION));
        assert!(notifier.messages().is_empty());
        assert!(session.cache().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_unversioned_cache_is_migrated() {
        let clock = clock();
        let now = clock.now_millis();
        let store = Arc::new(MemoryStore::with_data(PersistedData {
            cache: Some(vec![
                entry_json("https://api.github.com/a", now),
                entry_json("https://api.github.com/b", now),
            ]),
            data_version: None,
            ..Default::default()
        }));
        let notifier = Arc::new(RecordingNotifier::new());
        let session = open(store.clone(), clock, notifier.clone()).await;

        assert!(session.cache().read().await.is_empty());
        let saved = store.data().unwrap();
        assert_eq!(saved.data_version, Some(DATA_VERSION));
        assert_eq!(saved.cache, Some(Vec::new()));
        assert_eq!(
            notifier.messages(),
            vec![
                "GitHub link data schema migrated to version 1. Removed 2 stored items from GitHub Link cache."
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_cleaned_on_open() {
        let clock = clock();
        let now = clock.now_millis();
        let old = (clock.now() - ChronoDuration::hours(121)).timestamp_millis();
        let store = Arc::new(MemoryStore::with_data(PersistedData {
            cache: Some(vec![
                entry_json("https://api.github.com/new", now),
                entry_json("https://api.github.com/old", old),
            ]),
            data_version: Some(DATA_VERSION),
            ..Default::default()
        }));
        let session = open(store.clone(), clock, Arc::new(RecordingNotifier::new())).await;

        let cache = session.cache();
        let cache = cache.read().await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&ApiRequest::get("https://api.github.com/new")).is_some());
        assert_eq!(store.saves(), 1);
        assert_eq!(store.data().unwrap().cache.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_stored_entries_are_skipped() {
        let clock = clock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghlink.json");
        let raw = serde_json::json!({
            "settings": {},
            "cache": ["{garbage", 42, entry_json("https://api.github.com/ok", clock.now_millis())],
            "dataVersion": DATA_VERSION,
        });
        tokio::fs::write(&path, raw.to_string()).await.unwrap();

        let session = Session::open(
            Arc::new(JsonFileStore::new(&path)),
            clock,
            Arc::new(RecordingNotifier::new()),
            &Config::default(),
        )
        .await
        .unwrap();

        let cache = session.cache();
        let cache = cache.read().await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&ApiRequest::get("https://api.github.com/ok")).is_some());
    }

    #[tokio::test]
    async fn test_huge_max_cache_age_keeps_entries() {
        let clock = clock();
        let old = (clock.now() - ChronoDuration::hours(10_000)).timestamp_millis();
        let data: PersistedData = serde_json::from_value(serde_json::json!({
            "settings": {"maxCacheAgeHours": 10_000_000_000u64},
            "cache": [entry_json("https://api.github.com/old", old)],
            "dataVersion": DATA_VERSION,
        }))
        .unwrap();
        let store = Arc::new(MemoryStore::with_data(data));

        let session = open(store.clone(), clock, Arc::new(RecordingNotifier::new())).await;

        assert_eq!(session.cache().read().await.len(), 1);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_current_data_without_expired_entries_is_not_saved() {
        let clock = clock();
        let store = Arc::new(MemoryStore::with_data(PersistedData {
            cache: Some(vec![entry_json("https://api.github.com/a", clock.now_millis())]),
            data_version: Some(DATA_VERSION),
            ..Default::default()
        }));
        let session = open(store.clone(), clock, Arc::new(RecordingNotifier::new())).await;

        assert_eq!(store.saves(), 0);
        assert_eq!(session.save_if_dirty().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overlay_is_effective_but_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let overlay = Config {
            default_page_size: Some(50),
            ..Default::default()
        };
        let session = Session::open(
            store.clone(),
            clock(),
            Arc::new(RecordingNotifier::new()),
            &overlay,
        )
        .await
        .unwrap();

        assert_eq!(session.settings().default_page_size, 50);
        assert_eq!(session.stored_settings().default_page_size, 10);
        session.save().await.unwrap();
        assert_eq!(store.data().unwrap().settings.default_page_size, 10);
    }

    #[tokio::test]
    async fn test_unknown_settings_survive_save() {
        let data: PersistedData = serde_json::from_str(
            r#"{"settings":{"showPagination":true,"defaultPageSize":20},"cache":[],"dataVersion":1}"#,
        )
        .unwrap();
        let store = Arc::new(MemoryStore::with_data(data));
        let session = open(store.clone(), clock(), Arc::new(RecordingNotifier::new())).await;

        session.save().await.unwrap();
        let saved = serde_json::to_value(store.data().unwrap()).unwrap();
        assert_eq!(saved["settings"]["showPagination"], true);
        assert_eq!(saved["settings"]["defaultPageSize"], 20);
    }

    #[tokio::test]
    async fn test_save_if_dirty_clears_flag() {
        let clock = clock();
        let store = Arc::new(MemoryStore::new());
        let session = open(store.clone(), clock.clone(), Arc::new(RecordingNotifier::new())).await;

        let request = ApiRequest::get("https://api.github.com/x");
        let response =
            crate::http_client::ApiResponse::from_parts(200, Default::default(), "{}".to_string());
        session
            .cache()
            .write()
            .await
            .set(&request, &response, clock.now());

        assert_eq!(session.save_if_dirty().await.unwrap(), Some(1));
        assert!(!session.cache().read().await.is_dirty());
        assert_eq!(session.save_if_dirty().await.unwrap(), None);
        assert_eq!(store.saves(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saver_persists_dirty_cache_on_interval() {
        let clock = clock();
        let store = Arc::new(MemoryStore::new());
        let session = open(store.clone(), clock.clone(), Arc::new(RecordingNotifier::new())).await;
        assert_eq!(store.saves(), 1);

        let saver = session.spawn_saver();
        assert_eq!(saver.period(), Duration::from_secs(60));

        let request = ApiRequest::get("https://api.github.com/x");
        let response =
            crate::http_client::ApiResponse::from_parts(200, Default::default(), "{}".to_string());
        session
            .cache()
            .write()
            .await
            .set(&request, &response, clock.now());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.saves(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.saves(), 2);

        // Nothing changed, so the next tick does not save.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.saves(), 2);

        saver.stop().await;
    }
}
