//! Persistent blob store: a durable key -> bytes layer surviving restarts.
//!
//! Store failures are soft by contract. A store that cannot write flips
//! itself into a no-op for the rest of the session and reads as "always
//! absent"; the in-memory resource pool carries the session from there.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::key::CacheKey;

/// A persisted cache record: raw asset bytes plus the time they were
/// written. Immutable once written; removed only by `clear`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub bytes: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

/// Durable key -> blob storage.
///
/// The API is deliberately infallible: implementations absorb their own
/// failures (quota, disabled storage) and degrade rather than propagate.
pub trait BlobStore {
    /// Look up a previously stored blob. Absent on miss or store failure.
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Write-through a fetched blob. A failing put is a no-op.
    fn put(&self, key: &CacheKey, bytes: &[u8]);

    /// Drop every stored entry. Used for corruption recovery.
    fn clear(&self);
}

/// Sidecar metadata written next to each blob file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    stored_at: DateTime<Utc>,
}

/// Filesystem-backed store. One `.blob` plus one `.json` sidecar per entry,
/// under the platform's local data directory by default.
pub struct FsBlobStore {
    dir: PathBuf,
    disabled: AtomicBool,
}

impl FsBlobStore {
    /// Open the default store under the platform data directory
    /// (e.g. `~/.local/share/atrium/asset-cache`).
    pub fn open() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("atrium")
            .join("asset-cache");
        Self::open_at(dir)
    }

    /// Open a store rooted at an explicit directory.
    pub fn open_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let disabled = match fs::create_dir_all(&dir) {
            Ok(()) => {
                info!("asset store opened at {}", dir.display());
                false
            }
            Err(err) => {
                warn!(
                    "asset store unavailable at {}: {}; caching in memory only",
                    dir.display(),
                    err
                );
                true
            }
        };
        Self {
            dir,
            disabled: AtomicBool::new(disabled),
        }
    }

    /// Whether the store has degraded to a no-op for this session.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Filename for a key: a sanitized prefix for debuggability plus a hash
    /// of the full key to keep distinct keys from colliding on disk.
    fn file_stem(key: &CacheKey) -> String {
        let mut hasher = DefaultHasher::new();
        key.as_str().hash(&mut hasher);
        let prefix: String = key
            .as_str()
            .chars()
            .take(40)
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}-{:016x}", prefix.to_lowercase(), hasher.finish())
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.blob", Self::file_stem(key)))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", Self::file_stem(key)))
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let meta_path = self.meta_path(key);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta: EntryMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if meta.key != key.as_str() {
            // Hash collision between distinct keys; treat as a miss.
            return Ok(None);
        }
        let bytes = fs::read(self.blob_path(key))?;
        Ok(Some(CacheEntry {
            key: key.clone(),
            bytes,
            stored_at: meta.stored_at,
        }))
    }

    fn try_put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StoreError> {
        fs::write(self.blob_path(key), bytes)?;
        let meta = EntryMeta {
            key: key.as_str().to_string(),
            stored_at: Utc::now(),
        };
        let json =
            serde_json::to_string(&meta).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        fs::write(self.meta_path(key), json)?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if self.is_disabled() {
            return None;
        }
        match self.try_get(key) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("store read failed for '{}': {}", key, err);
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) {
        if self.is_disabled() {
            return;
        }
        if let Err(err) = self.try_put(key, bytes) {
            warn!(
                "store write failed for '{}': {}; persistent caching disabled for this session",
                key, err
            );
            self.disabled.store(true, Ordering::Relaxed);
        }
    }

    fn clear(&self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to clear asset store: {}", err);
                return;
            }
        }
        match fs::create_dir_all(&self.dir) {
            Ok(()) => {
                info!("asset store cleared");
                // A successful clear frees quota; give writes another chance.
                self.disabled.store(false, Ordering::Relaxed);
            }
            Err(err) => {
                warn!("failed to recreate asset store: {}", err);
                self.disabled.store(true, Ordering::Relaxed);
            }
        }
    }
}

/// In-memory store for tests and store-less (headless) embedding. Clones
/// share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: std::sync::Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<CacheKey, CacheEntry>,
    byte_limit: Option<usize>,
    used: usize,
    disabled: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes past `limit` total bytes, simulating a
    /// quota-constrained environment.
    pub fn with_byte_limit(limit: usize) -> Self {
        let store = Self::new();
        store.inner.lock().byte_limit = Some(limit);
        store
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.lock().disabled
    }

    fn try_put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(limit) = inner.byte_limit {
            if inner.used + bytes.len() > limit {
                return Err(StoreError::QuotaExceeded);
            }
        }
        inner.used += bytes.len();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                bytes: bytes.to_vec(),
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let inner = self.inner.lock();
        if inner.disabled {
            return None;
        }
        inner.entries.get(key).cloned()
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) {
        if self.inner.lock().disabled {
            return;
        }
        if let Err(err) = self.try_put(key, bytes) {
            warn!(
                "store write failed for '{}': {}; persistent caching disabled for this session",
                key, err
            );
            self.inner.lock().disabled = true;
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.used = 0;
        inner.disabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryBlobStore::new();
        let key = CacheKey::bare("brick");
        store.put(&key, b"pixels");
        let entry = store.get(&key).expect("entry should be present");
        assert_eq!(entry.bytes, b"pixels");
        assert_eq!(entry.key, key);
    }

    #[test]
    fn test_memory_quota_degrades_to_noop() {
        let store = MemoryBlobStore::with_byte_limit(4);
        let key = CacheKey::bare("big");
        store.put(&key, b"way too many bytes");
        assert!(store.get(&key).is_none());
        assert!(store.is_disabled());

        // Further puts are silent no-ops, not panics.
        store.put(&CacheKey::bare("small"), b"x");
        assert!(store.get(&CacheKey::bare("small")).is_none());

        // Clearing recovers the store.
        store.clear();
        assert!(!store.is_disabled());
        store.put(&key, b"ok");
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_fs_round_trip_and_clear() {
        let dir = std::env::temp_dir().join(format!("atrium-store-{}", Uuid::new_v4()));
        let store = FsBlobStore::open_at(&dir);
        let key = CacheKey::bare("venue/floor|u=2.000000");

        assert!(store.get(&key).is_none());
        store.put(&key, b"blob bytes");
        let entry = store.get(&key).expect("entry should be present");
        assert_eq!(entry.bytes, b"blob bytes");

        store.clear();
        assert!(store.get(&key).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fs_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("atrium-store-{}", Uuid::new_v4()));
        let key = CacheKey::bare("persistent");
        {
            let store = FsBlobStore::open_at(&dir);
            store.put(&key, b"still here");
        }
        let store = FsBlobStore::open_at(&dir);
        let entry = store.get(&key).expect("entry should survive reopen");
        assert_eq!(entry.bytes, b"still here");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_distinct_keys_do_not_collide_on_disk() {
        let dir = std::env::temp_dir().join(format!("atrium-store-{}", Uuid::new_v4()));
        let store = FsBlobStore::open_at(&dir);
        let a = CacheKey::bare("brick|u=2.000000|v=2.000000");
        let b = CacheKey::bare("brick|u=4.000000|v=4.000000");
        store.put(&a, b"aa");
        store.put(&b, b"bb");
        assert_eq!(store.get(&a).unwrap().bytes, b"aa");
        assert_eq!(store.get(&b).unwrap().bytes, b"bb");

        std::fs::remove_dir_all(&dir).ok();
    }
}
