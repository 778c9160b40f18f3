//! Request-keyed response cache with conditional revalidation support.
//!
//! Entries are keyed by [`RequestIdentity`] and hold the last successful
//! response body plus the validators (`etag`, `last-modified`) needed to ask
//! the server whether it changed. The cache never judges freshness itself;
//! callers compare [`CacheEntry::retrieved`] against their own window.
//!
//! The whole cache persists as a flat list of JSON strings, one per entry.

mod entry;
mod identity;

pub use entry::{CacheEntry, CachedRequest, CachedResponse, SANITIZED_HEADERS};
pub use identity::RequestIdentity;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::http_client::{ApiRequest, ApiResponse};

/// Errors from cache entry (de)serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(String),
}

/// Cache handle shared between the orchestrator and the persistence layer.
pub type SharedCache = Arc<RwLock<ResponseCache>>;

/// Summary of the cache contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub dirty: bool,
}

/// In-memory response cache.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<RequestIdentity, CacheEntry>,
    cache_updated: bool,
    /// Bumped on every mutation.
    revision: u64,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this cache for sharing.
    pub fn shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    /// Rehydrate from persisted entries. Corrupt entries are skipped.
    pub fn from_json<S: AsRef<str>>(serialized: &[S]) -> Self {
        let mut entries = HashMap::with_capacity(serialized.len());
        let mut skipped = 0usize;

        for raw in serialized {
            match CacheEntry::from_json_str(raw.as_ref()) {
                Ok(entry) => {
                    entries.insert(entry.request.identity(), entry);
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping cache entry: {}", e);
                }
            }
        }

        if skipped > 0 {
            warn!(
                "Loaded {} cache entries, skipped {} corrupt entries",
                entries.len(),
                skipped
            );
        } else {
            debug!("Loaded {} cache entries", entries.len());
        }

        Self {
            entries,
            cache_updated: false,
            revision: 0,
        }
    }

    /// Exact-match lookup. Does not evaluate freshness.
    pub fn get(&self, request: &ApiRequest) -> Option<&CacheEntry> {
        self.entries.get(&RequestIdentity::of(request))
    }

    /// Store or replace the entry for `request`.
    ///
    /// Responses outside 200..=208 are refused; returns whether the entry was
    /// stored.
    pub fn set(&mut self, request: &ApiRequest, response: &ApiResponse, now: DateTime<Utc>) -> bool {
        if !response.is_success() {
            warn!(
                "Refusing to cache {} response for {}",
                response.status, request.url
            );
            return false;
        }
        let entry = CacheEntry::new(request, response, now.timestamp_millis());
        self.entries.insert(RequestIdentity::of(request), entry);
        self.touch();
        true
    }

    /// Mark an existing entry as confirmed by the server (304).
    /// Returns false if there was no entry.
    pub fn update(&mut self, request: &ApiRequest, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&RequestIdentity::of(request)) {
            Some(entry) => {
                entry.retrieved = now.timestamp_millis();
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Evict a single entry.
    pub fn remove(&mut self, request: &ApiRequest) -> Option<CacheEntry> {
        let removed = self.entries.remove(&RequestIdentity::of(request));
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Evict every entry retrieved at or before `max_age`.
    /// Returns the number of entries removed.
    pub fn clean(&mut self, max_age: DateTime<Utc>) -> usize {
        let cutoff = max_age.timestamp_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.retrieved > cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.touch();
            debug!("Cleaned {} cache entries older than {}", removed, max_age);
        }
        removed
    }

    /// Serialize every entry for persistence, ordered by identity.
    pub fn to_json(&self) -> Vec<String> {
        let mut keyed: Vec<(&RequestIdentity, &CacheEntry)> = self.entries.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed
            .into_iter()
            .filter_map(|(id, entry)| match entry.to_json_string() {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Dropping unserializable cache entry {}: {}", id, e);
                    None
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self) {
        self.cache_updated = true;
        self.revision = self.revision.wrapping_add(1);
    }

    /// True when there are mutations not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.cache_updated
    }

    /// Counter identifying the current contents, for [`Self::mark_saved_at`].
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Called by the persistence layer after a successful save.
    pub fn mark_saved(&mut self) {
        self.cache_updated = false;
    }

    /// Clear the dirty flag only if nothing changed since `revision` was
    /// read. Returns whether the flag was cleared.
    pub fn mark_saved_at(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.cache_updated = false;
            true
        } else {
            false
        }
    }

    pub fn stats(&self) -> CacheStats {
        let oldest = self.entries.values().map(|e| e.retrieved).min();
        let newest = self.entries.values().map(|e| e.retrieved).max();
        let to_time = |ms: i64| Utc.timestamp_millis_opt(ms).single();
        CacheStats {
            entries: self.entries.len(),
            oldest: oldest.and_then(to_time),
            newest: newest.and_then(to_time),
            dirty: self.cache_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap as Map;

    fn response(status: u16, body: &str, etag: Option<&str>) -> ApiResponse {
        let mut headers = Map::new();
        if let Some(etag) = etag {
            headers.insert("etag".to_string(), etag.to_string());
        }
        ApiResponse::from_parts(status, headers, body.to_string())
    }

    fn request(n: u32) -> ApiRequest {
        ApiRequest::get(format!("https://api.github.com/repos/a/b/issues/{}", n))
    }

    #[test]
    fn test_set_then_get_returns_stored_value() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        for status in [200u16, 201, 204, 208] {
            let resp = response(status, r#"{"n":1}"#, Some("\"e\""));
            assert!(cache.set(&request(1), &resp, now));
            let entry = cache.get(&request(1)).unwrap();
            assert_eq!(entry.response.status, status);
            assert_eq!(entry.response.json["n"], 1);
            assert_eq!(entry.etag.as_deref(), Some("\"e\""));
        }
    }

    #[test]
    fn test_error_status_is_not_stored() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        cache.set(&request(1), &response(200, r#"{"v":"old"}"#, None), now);
        cache.mark_saved();

        for status in [304u16, 404, 403, 500, 209] {
            assert!(!cache.set(&request(1), &response(status, r#"{"v":"new"}"#, None), now));
        }
        assert_eq!(cache.get(&request(1)).unwrap().response.json["v"], "old");
        assert!(!cache.is_dirty());

        assert!(!cache.set(&request(2), &response(404, "{}", None), now));
        assert!(cache.get(&request(2)).is_none());
    }

    #[test]
    fn test_update_refreshes_retrieved_only() {
        let mut cache = ResponseCache::new();
        let then = Utc::now() - Duration::hours(1);
        cache.set(&request(1), &response(200, r#"{"v":1}"#, Some("\"e\"")), then);
        let now = Utc::now();
        assert!(cache.update(&request(1), now));
        let entry = cache.get(&request(1)).unwrap();
        assert_eq!(entry.retrieved, now.timestamp_millis());
        assert_eq!(entry.response.json["v"], 1);
        assert!(!cache.update(&request(2), now));
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        for n in 0..5 {
            cache.set(&request(n), &response(200, &format!(r#"{{"n":{}}}"#, n), None), now);
        }
        let restored = ResponseCache::from_json(&cache.to_json());
        assert_eq!(restored.len(), 5);
        assert!(!restored.is_dirty());
        for n in 0..5 {
            assert_eq!(restored.get(&request(n)), cache.get(&request(n)));
        }
    }

    #[test]
    fn test_corrupt_entries_are_skipped() {
        let mut cache = ResponseCache::new();
        cache.set(&request(1), &response(200, "{}", None), Utc::now());
        let mut serialized = cache.to_json();
        serialized.push("{garbage".to_string());
        serialized.push(r#"{"request":{"url":"x"}}"#.to_string());

        let restored = ResponseCache::from_json(&serialized);
        assert_eq!(restored.len(), 1);
        assert!(restored.get(&request(1)).is_some());
    }

    #[test]
    fn test_clean_now_removes_everything() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        for n in 0..4 {
            cache.set(&request(n), &response(200, "{}", None), now - Duration::minutes(n as i64));
        }
        cache.mark_saved();
        assert_eq!(cache.clean(now), 4);
        assert!(cache.is_empty());
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_clean_epoch_removes_nothing() {
        let mut cache = ResponseCache::new();
        cache.set(&request(1), &response(200, "{}", None), Utc::now());
        cache.mark_saved();
        assert_eq!(cache.clean(DateTime::<Utc>::UNIX_EPOCH), 0);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_clean_respects_cutoff() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        cache.set(&request(1), &response(200, "{}", None), now - Duration::hours(200));
        cache.set(&request(2), &response(200, "{}", None), now - Duration::hours(1));
        assert_eq!(cache.clean(now - Duration::hours(120)), 1);
        assert!(cache.get(&request(1)).is_none());
        assert!(cache.get(&request(2)).is_some());
    }

    #[test]
    fn test_remove_sets_dirty() {
        let mut cache = ResponseCache::new();
        cache.set(&request(1), &response(200, "{}", None), Utc::now());
        cache.mark_saved();
        assert!(cache.remove(&request(1)).is_some());
        assert!(cache.is_dirty());
        assert!(cache.remove(&request(1)).is_none());
    }

    #[test]
    fn test_mark_saved_at_ignores_stale_revision() {
        let mut cache = ResponseCache::new();
        cache.set(&request(1), &response(200, "{}", None), Utc::now());
        let saved = cache.revision();
        cache.set(&request(2), &response(200, "{}", None), Utc::now());

        assert!(!cache.mark_saved_at(saved));
        assert!(cache.is_dirty());
        assert!(cache.mark_saved_at(cache.revision()));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_lookup_ignores_query_order() {
        let mut cache = ResponseCache::new();
        let a = ApiRequest::get("https://api.github.com/issues?state=open&page=1");
        let b = ApiRequest::get("https://api.github.com/issues?page=1&state=open");
        cache.set(&a, &response(200, "[]", None), Utc::now());
        assert!(cache.get(&b).is_some());
    }
}
