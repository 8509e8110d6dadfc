// ── Offline cache ──
//
// Last-known device list, property snapshots, LAN configs and the stream
// key, stored as JSON text keyed by (kind, dsn or session name).
// Last write wins.

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CacheKind {
    Device,
    Property,
    LanConfig,
    StreamKey,
}

/// Key-value persistence for offline bootstrap.
pub trait Cache: Send + Sync + fmt::Debug {
    fn save(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CoreError>;

    fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CoreError>;

    fn remove(&self, kind: CacheKind, key: &str) -> Result<(), CoreError>;
}

// ── Typed helpers ────────────────────────────────────────────────────

pub(crate) fn save_json<T: Serialize + ?Sized>(
    cache: &dyn Cache,
    kind: CacheKind,
    key: &str,
    value: &T,
) -> Result<(), CoreError> {
    let text = serde_json::to_string(value)?;
    cache.save(kind, key, &text)
}

/// Load and decode an entry. Undecodable entries are logged and treated
/// as absent.
pub(crate) fn load_json<T: DeserializeOwned>(
    cache: &dyn Cache,
    kind: CacheKind,
    key: &str,
) -> Result<Option<T>, CoreError> {
    let Some(text) = cache.get(kind, key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(%kind, key, error = %e, "discarding undecodable cache entry");
            Ok(None)
        }
    }
}

/// Save and log on failure. Cache writes never fail the operation that
/// triggered them.
pub(crate) fn save_json_logged<T: Serialize + ?Sized>(
    cache: &dyn Cache,
    kind: CacheKind,
    key: &str,
    value: &T,
) {
    if let Err(e) = save_json(cache, kind, key, value) {
        warn!(%kind, key, error = %e, "cache write failed");
    }
}

// ── In-memory ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(CacheKind, String), String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn save(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries.insert((kind, key.to_owned()), value.to_owned());
        Ok(())
    }

    fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self
            .entries
            .get(&(kind, key.to_owned()))
            .map(|e| e.value().clone()))
    }

    fn remove(&self, kind: CacheKind, key: &str) -> Result<(), CoreError> {
        self.entries.remove(&(kind, key.to_owned()));
        Ok(())
    }
}

// ── File-backed ──────────────────────────────────────────────────────

/// One file per entry: `<dir>/<kind>-<key>.json`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::Cache {
            message: format!("cannot create {}: {e}", dir.display()),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: CacheKind, key: &str) -> PathBuf {
        let key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{kind}-{key}.json"))
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> CoreError {
    CoreError::Cache {
        message: format!("{}: {e}", path.display()),
    }
}

impl Cache for FileCache {
    fn save(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CoreError> {
        let path = self.path(kind, key);
        std::fs::write(&path, value).map_err(|e| io_error(&path, &e))
    }

    fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CoreError> {
        let path = self.path(kind, key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    fn remove(&self, kind: CacheKind, key: &str) -> Result<(), CoreError> {
        let path = self.path(kind, key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_last_write_wins() {
        let cache = MemoryCache::new();
        cache.save(CacheKind::StreamKey, "default", "k1").unwrap();
        cache.save(CacheKind::StreamKey, "default", "k2").unwrap();
        assert_eq!(
            cache.get(CacheKind::StreamKey, "default").unwrap().as_deref(),
            Some("k2")
        );
        assert_eq!(cache.get(CacheKind::Device, "default").unwrap(), None);

        cache.remove(CacheKind::StreamKey, "default").unwrap();
        assert_eq!(cache.get(CacheKind::StreamKey, "default").unwrap(), None);
    }

    #[test]
    fn file_cache_round_trips_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache")).unwrap();

        save_json(&cache, CacheKind::Property, "AC000W1", &vec![1, 2, 3]).unwrap();
        let loaded: Option<Vec<i32>> = load_json(&cache, CacheKind::Property, "AC000W1").unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        cache.remove(CacheKind::Property, "AC000W1").unwrap();
        cache.remove(CacheKind::Property, "AC000W1").unwrap();
        assert_eq!(cache.get(CacheKind::Property, "AC000W1").unwrap(), None);
    }

    #[test]
    fn file_cache_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        cache.save(CacheKind::Device, "../escape", "[]").unwrap();
        assert!(dir.path().join("device-___escape.json").exists());
    }

    #[test]
    fn undecodable_entry_reads_as_absent() {
        let cache = MemoryCache::new();
        cache.save(CacheKind::Device, "s", "{not json").unwrap();
        let loaded: Option<Vec<String>> = load_json(&cache, CacheKind::Device, "s").unwrap();
        assert_eq!(loaded, None);
    }
}
