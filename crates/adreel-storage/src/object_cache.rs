//! Local LRU disk cache fronting the remote object store.
//!
//! Compositing fetches the same scene/audio objects repeatedly across retries
//! within a short window, so a bounded local mirror converts those fetches
//! into at most one remote transfer per key per eviction cycle.
//!
//! Concurrency: downloads for the same key are single-flight (a per-key
//! lock), downloads for different keys proceed in parallel, and all capacity
//! accounting runs under one state lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct ObjectCacheConfig {
    /// Directory mirroring remote keys 1:1
    pub root: PathBuf,
    /// Upper bound on total resident bytes
    pub capacity_bytes: u64,
}

impl Default for ObjectCacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/tmp/adreel/cache"),
            capacity_bytes: 2 * 1024 * 1024 * 1024, // 2 GiB
        }
    }
}

impl ObjectCacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            root: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/adreel/cache")),
            capacity_bytes: std::env::var("CACHE_CAPACITY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2 * 1024 * 1024 * 1024),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    size: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
    /// Monotonic access ordinal; total order even for back-to-back hits.
    clock: u64,
}

impl CacheState {
    fn touch(&mut self, key: &str, size: u64) {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.total_bytes = self.total_bytes - entry.size + size;
                entry.size = size;
                entry.last_access = clock;
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        size,
                        last_access: clock,
                    },
                );
                self.total_bytes += size;
            }
        }
    }

    fn untrack(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.total_bytes -= entry.size;
        }
    }

    /// Least-recently-used tracked key, excluding `keep`.
    fn lru_victim(&self, keep: &str) -> Option<String> {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != keep)
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
    }
}

/// Local LRU disk cache over a remote object store.
pub struct RemoteObjectCache {
    store: Arc<dyn ObjectStore>,
    root: PathBuf,
    capacity_bytes: u64,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RemoteObjectCache {
    /// Create a new cache over the given store.
    pub fn new(store: Arc<dyn ObjectStore>, config: ObjectCacheConfig) -> Self {
        Self {
            store,
            root: config.root,
            capacity_bytes: config.capacity_bytes,
            state: Mutex::new(CacheState::default()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch an object, downloading on miss and evicting over budget.
    ///
    /// Returns the local path mirroring the key under the cache root.
    pub async fn get_file(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let local_path = self.root.join(key);

        // Single-flight per key: the second caller waits here, then takes
        // the hit path below instead of downloading again.
        let key_lock = self.key_lock(key).await;
        let _guard = key_lock.lock().await;

        // Hit: file present under the cache root.
        if let Ok(meta) = tokio::fs::metadata(&local_path).await {
            if meta.is_file() {
                let mut state = self.state.lock().await;
                state.touch(key, meta.len());
                debug!(key = key, "Cache hit");
                self.release_key_lock(key, &key_lock).await;
                return Ok(local_path);
            }
        }

        // Miss: download, cleaning up any partial file on failure so a
        // broken transfer is never reported as a hit later.
        if let Err(e) = self.store.download_file(key, &local_path).await {
            let _ = tokio::fs::remove_file(&local_path).await;
            self.release_key_lock(key, &key_lock).await;
            return Err(e);
        }

        let size = tokio::fs::metadata(&local_path)
            .await
            .map(|m| m.len())
            .map_err(|e| StorageError::download_failed(format!("stat cached object: {e}")))?;

        {
            let mut state = self.state.lock().await;
            state.touch(key, size);
            self.evict_over_budget(&mut state, key).await;
        }

        info!(key = key, bytes = size, "Cached remote object");
        self.release_key_lock(key, &key_lock).await;
        Ok(local_path)
    }

    /// Delete the whole cache tree, recreate it empty, and reset tracking.
    pub async fn clear_cache(&self) -> StorageResult<()> {
        let mut state = self.state.lock().await;

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        tokio::fs::create_dir_all(&self.root).await?;

        state.entries.clear();
        state.total_bytes = 0;

        info!(root = %self.root.display(), "Cleared object cache");
        Ok(())
    }

    /// Total tracked bytes (a snapshot, not a hard guarantee under races).
    pub async fn resident_bytes(&self) -> u64 {
        self.state.lock().await.total_bytes
    }

    /// Keys currently tracked.
    pub async fn tracked_keys(&self) -> Vec<String> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    /// Evict least-recently-used entries until under budget.
    ///
    /// Never evicts `just_inserted`: an object larger than the whole cache
    /// still gets cached as one oversized entry and is removed eagerly by a
    /// later unrelated insert.
    async fn evict_over_budget(&self, state: &mut CacheState, just_inserted: &str) {
        while state.total_bytes > self.capacity_bytes {
            let Some(victim) = state.lru_victim(just_inserted) else {
                break;
            };
            let path = self.root.join(&victim);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %victim, error = %e, "Failed to remove evicted cache file");
                }
            }
            state.untrack(&victim);
            debug!(key = %victim, "Evicted LRU cache entry");
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the per-key lock from the map once nobody else holds it.
    /// The strong-count check runs under the map lock, so a newcomer cannot
    /// clone the Arc between the check and the removal.
    async fn release_key_lock(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().await;
        if Arc::strong_count(lock) <= 2 {
            inflight.remove(key);
        }
    }
}

/// Keys mirror remote paths; reject anything that could escape the root.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::invalid_key(key));
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory store that counts downloads.
    struct FakeStore {
        objects: StdHashMap<String, Vec<u8>>,
        downloads: AtomicUsize,
    }

    impl FakeStore {
        fn new(objects: &[(&str, usize)]) -> Self {
            Self {
                objects: objects
                    .iter()
                    .map(|(k, size)| (k.to_string(), vec![0u8; *size]))
                    .collect(),
                downloads: AtomicUsize::new(0),
            }
        }

        fn download_count(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn upload_file(&self, _: &Path, _: &str, _: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn upload_bytes(&self, _: Vec<u8>, _: &str, _: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let bytes = self
                .objects
                .get(key)
                .ok_or_else(|| StorageError::not_found(key))?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes).await?;
            Ok(())
        }

        async fn exists(&self, key: &str) -> StorageResult<bool> {
            Ok(self.objects.contains_key(key))
        }

        async fn presigned_url(&self, key: &str, _: Duration) -> StorageResult<String> {
            Ok(format!("https://store.test/{key}"))
        }

        async fn check_connectivity(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn cache_with(
        store: Arc<FakeStore>,
        root: &Path,
        capacity: u64,
    ) -> RemoteObjectCache {
        RemoteObjectCache::new(
            store,
            ObjectCacheConfig {
                root: root.to_path_buf(),
                capacity_bytes: capacity,
            },
        )
    }

    #[tokio::test]
    async fn test_second_get_is_a_pure_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("ads/j1/scenes/scene_0.mp4", 10)]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 1000);

        let p1 = cache.get_file("ads/j1/scenes/scene_0.mp4").await.unwrap();
        let p2 = cache.get_file("ads/j1/scenes/scene_0.mp4").await.unwrap();

        assert_eq!(p1, p2);
        assert!(p1.exists());
        assert_eq!(store.download_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_for_same_key_download_once() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("ads/j1/audio/voiceover.mp3", 10)]));
        let cache = Arc::new(cache_with(Arc::clone(&store), tmp.path(), 1000));

        let a = Arc::clone(&cache);
        let b = Arc::clone(&cache);
        let (ra, rb) = tokio::join!(
            a.get_file("ads/j1/audio/voiceover.mp3"),
            b.get_file("ads/j1/audio/voiceover.mp3"),
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(store.download_count(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_keeps_most_recent_within_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("a", 60), ("b", 60)]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 100);

        cache.get_file("a").await.unwrap();
        cache.get_file("b").await.unwrap();

        let keys = cache.tracked_keys().await;
        assert_eq!(keys, vec!["b".to_string()]);
        assert!(cache.resident_bytes().await <= 100);
        assert!(!tmp.path().join("a").exists());
        assert!(tmp.path().join("b").exists());
    }

    #[tokio::test]
    async fn test_hit_refreshes_lru_position() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("a", 80), ("b", 80), ("c", 80)]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 200);

        cache.get_file("a").await.unwrap();
        cache.get_file("b").await.unwrap();
        // Touch "a" so "b" becomes the LRU entry.
        cache.get_file("a").await.unwrap();
        cache.get_file("c").await.unwrap();

        let mut keys = cache.tracked_keys().await;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_oversized_object_is_cached_then_evicted_by_next_insert() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("big", 100), ("small", 10)]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 50);

        // Larger than the whole cache: still cached, no deadlock.
        cache.get_file("big").await.unwrap();
        assert_eq!(cache.tracked_keys().await, vec!["big".to_string()]);

        // Next insert evicts it eagerly.
        cache.get_file("small").await.unwrap();
        let keys = cache.tracked_keys().await;
        assert_eq!(keys, vec!["small".to_string()]);
        assert!(!tmp.path().join("big").exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 100);

        let err = cache.get_file("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.tracked_keys().await.is_empty());
        assert!(!tmp.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_clear_cache_purges_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[("a", 10), ("b", 10)]));
        let cache = cache_with(Arc::clone(&store), tmp.path(), 100);

        cache.get_file("a").await.unwrap();
        cache.get_file("b").await.unwrap();
        cache.clear_cache().await.unwrap();

        assert!(cache.tracked_keys().await.is_empty());
        assert_eq!(cache.resident_bytes().await, 0);
        assert!(tmp.path().exists());
        assert!(!tmp.path().join("a").exists());

        // Re-fetch after clear downloads again.
        cache.get_file("a").await.unwrap();
        assert_eq!(store.download_count(), 3);
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::new(&[]));
        let cache = cache_with(store, tmp.path(), 100);

        for bad in ["../escape", "/abs", "a//b", "a/./b", "a/../b", ""] {
            let err = cache.get_file(bad).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "{bad:?}");
        }
    }
}
