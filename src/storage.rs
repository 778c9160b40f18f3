//! Persisted data blob: settings, serialized cache entries and schema version.
//!
//! The host owns where the blob lives. [`JsonFileStore`] keeps it in a single
//! JSON file; [`MemoryStore`] keeps it in memory for embedding and tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;

/// Current schema version of the persisted cache.
pub const DATA_VERSION: u32 = 1;

/// Everything the host persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedData {
    #[serde(default)]
    pub settings: Settings,
    /// One serialized cache entry per element. Elements that are not
    /// strings are dropped on load.
    #[serde(default, deserialize_with = "lenient_cache")]
    pub cache: Option<Vec<String>>,
    /// Missing in data written before versioning existed.
    #[serde(default)]
    pub data_version: Option<u32>,
}

impl PersistedData {
    /// True when the stored cache predates the current schema.
    pub fn needs_migration(&self) -> bool {
        self.data_version.map_or(true, |v| v < DATA_VERSION)
    }
}

fn lenient_cache<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warn!("Stored cache is not a list, discarding it");
            return Ok(None);
        }
    };

    let total = items.len();
    let entries: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(raw) => Some(raw),
            _ => None,
        })
        .collect();

    if entries.len() < total {
        warn!(
            "Skipping {} stored cache entries that are not strings",
            total - entries.len()
        );
    }
    Ok(Some(entries))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Failed to serialize data: {0}")]
    Serialize(String),
}

/// Load/save collaborator for [`PersistedData`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<PersistedData>, StoreError>;
    async fn save(&self, data: &PersistedData) -> Result<(), StoreError>;
}

/// Stores the blob as pretty-printed JSON in one file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl DataStore for JsonFileStore {
    async fn load(&self) -> Result<Option<PersistedData>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No data file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    async fn save(&self, data: &PersistedData) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("Saved data to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the blob in memory and counts saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Option<PersistedData>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: PersistedData) -> Self {
        Self {
            data: Mutex::new(Some(data)),
            saves: Mutex::new(0),
        }
    }

    /// Last saved (or initial) data.
    pub fn data(&self) -> Option<PersistedData> {
        self.data.lock().ok().and_then(|d| d.clone())
    }

    pub fn saves(&self) -> usize {
        self.saves.lock().map(|s| *s).unwrap_or(0)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedData>, StoreError> {
        Ok(self.data())
    }

    async fn save(&self, data: &PersistedData) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.data.lock() {
            *slot = Some(data.clone());
        }
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}
