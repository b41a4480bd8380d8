//! IdentityCache: one shared instance per key

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use ahash::RandomState;
use itemstore::{DataSource, Error, Item, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::loader::{Loader, PoolMiss, SourceLoader};
use crate::stats::CacheStats;

/// Per-key slot, empty until the first load succeeds.
///
/// The loader runs with the slot locked, so concurrent lookups of the same
/// key wait for that single load instead of starting their own.
type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

/// Error returned by every refused duplication
pub(crate) fn clone_refused(type_name: &str) -> Error {
    Error::IllegalOperation(format!("clone is not allowed against {}", type_name))
}

/// How a lookup was served
#[derive(Debug)]
pub enum Lookup<V> {
    /// This call ran the loader and stored the value
    Created(Arc<V>),
    /// An existing entry was returned
    Cached(Arc<V>),
}

impl<V> Lookup<V> {
    /// Whether this call created the entry
    pub fn is_created(&self) -> bool {
        matches!(self, Lookup::Created(_))
    }

    /// Whether the entry already existed
    pub fn is_cached(&self) -> bool {
        matches!(self, Lookup::Cached(_))
    }

    /// The shared instance
    pub fn into_inner(self) -> Arc<V> {
        match self {
            Lookup::Created(value) | Lookup::Cached(value) => value,
        }
    }
}

impl<V> Deref for Lookup<V> {
    type Target = V;

    fn deref(&self) -> &V {
        match self {
            Lookup::Created(value) | Lookup::Cached(value) => value,
        }
    }
}

/// Keyed cache that hands out the same instance for the same key
///
/// Values are created lazily by a [`Loader`] at most once per key and are
/// shared as `Arc<V>`; two lookups of one key return pointer-identical values
/// until the entry is invalidated or the cache cleared. The cache has no
/// capacity bound and never evicts on its own.
///
/// `IdentityCache` is not `Clone`. Construct it once and pass references (or
/// an `Arc`) to every consumer.
pub struct IdentityCache<K, V> {
    /// Key -> slot holding the shared instance
    entries: RwLock<HashMap<K, Slot<V>, RandomState>>,

    /// Creates values for missing keys
    loader: Box<dyn Loader<K, V>>,

    /// Cache statistics
    stats: CacheStats,
}

impl<K, V> IdentityCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
{
    /// Create an empty cache that builds missing values with `loader`
    pub fn new<L>(loader: L) -> Self
    where
        L: Loader<K, V> + 'static,
    {
        Self {
            entries: RwLock::new(HashMap::with_hasher(RandomState::new())),
            loader: Box::new(loader),
            stats: CacheStats::new(),
        }
    }

    /// Create a pool holding exactly `entries`
    ///
    /// Lookups outside the seed fail with `NotFound`; later duplicates of a
    /// key replace earlier ones.
    pub fn seeded<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: fmt::Display,
    {
        let cache = Self::new(PoolMiss);
        {
            let mut map = cache.entries.write();
            for (key, value) in entries {
                map.insert(key, Arc::new(Mutex::new(Some(Arc::new(value)))));
            }
            debug!(entries = map.len(), "seeded cache pool");
        }
        cache
    }

    /// Get the shared instance for `key`, loading it on first access
    ///
    /// # Returns
    /// * `Result<Arc<V>>` - The instance, or the loader's error (`NotFound`
    ///   for a key without a record). A failed load leaves the cache unchanged.
    pub fn get(&self, key: &K) -> Result<Arc<V>> {
        self.lookup(key).map(Lookup::into_inner)
    }

    /// Like [`get`](Self::get), also reporting whether the entry was created
    pub fn lookup(&self, key: &K) -> Result<Lookup<V>> {
        loop {
            let slot = self.slot(key);
            let mut guard = slot.lock();

            if let Some(value) = guard.as_ref() {
                self.stats.record_hit();
                trace!(?key, "cache hit");
                return Ok(Lookup::Cached(Arc::clone(value)));
            }

            // A failed load may have detached this slot while we waited on it
            if !self.is_attached(key, &slot) {
                continue;
            }

            self.stats.record_miss();
            return match self.loader.load(key) {
                Ok(value) => {
                    let value = Arc::new(value);
                    *guard = Some(Arc::clone(&value));
                    self.stats.record_creation();
                    debug!(?key, "created cache entry");
                    Ok(Lookup::Created(value))
                }
                Err(err) => {
                    drop(guard);
                    self.discard(key, &slot);
                    self.stats.record_failure();
                    debug!(?key, error = %err, "cache load failed");
                    Err(err)
                }
            };
        }
    }

    /// Get the instance for `key` if present, never running the loader
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.entries.read().get(key).cloned()?;
        let guard = slot.lock();
        guard.as_ref().map(Arc::clone)
    }

    /// Check whether `key` has an instance
    pub fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Remove the entry for `key`; the next lookup creates a new instance
    ///
    /// Callers still holding the old `Arc` keep it alive.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.stats.record_invalidation();
            debug!(?key, "invalidated cache entry");
        }
        removed
    }

    /// Remove every entry and reset statistics
    pub fn clear(&self) {
        self.entries.write().clear();
        self.stats.reset();
    }

    /// Get current number of entries
    ///
    /// Waits for loads in progress; keys whose load failed are not counted.
    pub fn len(&self) -> usize {
        self.filled().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cached keys, in no particular order
    ///
    /// Only keys holding an instance are listed, matching [`contains`](Self::contains).
    pub fn keys(&self) -> Vec<K> {
        self.filled()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Always fails with `IllegalOperation`
    ///
    /// A second cache would hand out a second instance per key. Share the
    /// cache by reference instead; its entries are left untouched.
    pub fn duplicate(&self) -> Result<Self> {
        Err(clone_refused("IdentityCache"))
    }

    fn slot(&self, key: &K) -> Slot<V> {
        if let Some(slot) = self.entries.read().get(key) {
            return Arc::clone(slot);
        }

        let mut entries = self.entries.write();
        Arc::clone(entries.entry(key.clone()).or_default())
    }

    /// Keys whose slot holds an instance
    ///
    /// Slots are locked only after the map lock is released.
    fn filled(&self) -> Vec<K> {
        let slots: Vec<(K, Slot<V>)> = self
            .entries
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(key, _)| key)
            .collect()
    }

    fn is_attached(&self, key: &K, slot: &Slot<V>) -> bool {
        self.entries
            .read()
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, slot))
    }

    /// Drop `slot` after a failed load unless another lookup filled or
    /// replaced it in the meantime.
    fn discard(&self, key: &K, slot: &Slot<V>) {
        let mut entries = self.entries.write();
        let vacant = match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                current.try_lock().map_or(false, |value| value.is_none())
            }
            _ => false,
        };
        if vacant {
            entries.remove(key);
        }
    }
}

impl IdentityCache<String, Item> {
    /// Memoizing proxy in front of `source`
    pub fn from_source<S>(source: S) -> Self
    where
        S: DataSource + 'static,
    {
        Self::new(SourceLoader::new(source))
    }

    /// Pool built by scanning all of `source` once
    ///
    /// Items are keyed by code. The source is not consulted again.
    pub fn from_pool<S>(source: &S) -> Result<Self>
    where
        S: DataSource + ?Sized,
    {
        let items = source.scan()?;
        Ok(Self::seeded(
            items
                .into_iter()
                .map(|item| (item.code().to_string(), item)),
        ))
    }
}

impl<K, V> fmt::Debug for IdentityCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCache")
            .field("len", &self.entries.read().len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore::{FixedWidthFile, MemorySource, MockSource, TsvFile};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn catalogue() -> MemorySource {
        vec![
            Item::with_price("ABC0001", "Pencil", 120),
            Item::with_price("ABC0002", "Eraser", 80),
        ]
        .into_iter()
        .collect()
    }

    /// Cache over `source` whose loader counts its calls
    fn counted(source: MemorySource) -> (IdentityCache<String, Item>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = IdentityCache::new(move |key: &String| -> Result<Item> {
            counter.fetch_add(1, Ordering::SeqCst);
            source.find(key)
        });
        (cache, calls)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_identity_stable() {
        let (cache, _) = counted(catalogue());

        let first = cache.get(&key("ABC0001")).unwrap();
        let second = cache.get(&key("ABC0001")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "Pencil");
    }

    #[test]
    fn test_single_creation() {
        let (cache, calls) = counted(catalogue());

        for _ in 0..10 {
            cache.get(&key("ABC0002")).unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().creations(), 1);
        assert_eq!(cache.stats().hits(), 9);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_seeded_pool_identity() {
        let cache = IdentityCache::from_pool(&catalogue()).unwrap();

        let a = cache.get(&key("ABC0001")).unwrap();
        let b = cache.get(&key("ABC0001")).unwrap();
        let other = cache.get(&key("ABC0002")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_seeded_pool_miss() {
        let cache = IdentityCache::from_pool(&catalogue()).unwrap();

        let result = cache.get(&key("ABC0003"));
        assert!(matches!(result, Err(Error::NotFound(k)) if k == "ABC0003"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_empty_source_not_found() {
        let cache = IdentityCache::from_source(MemorySource::new());

        let result = cache.get(&key("X"));
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_load_leaves_cache_unchanged() {
        let (cache, calls) = counted(catalogue());
        cache.get(&key("ABC0001")).unwrap();

        assert!(cache.get(&key("missing")).is_err());
        assert!(cache.get(&key("missing")).is_err());

        assert_eq!(cache.keys(), vec![key("ABC0001")]);
        assert!(!cache.contains(&key("missing")));
        // Absent keys are not remembered, each lookup asks the source
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().failures(), 2);
    }

    #[test]
    fn test_duplicate_refused() {
        let (cache, _) = counted(catalogue());
        let before = cache.get(&key("ABC0001")).unwrap();

        let result = cache.duplicate();
        assert!(matches!(result, Err(Error::IllegalOperation(_))));

        let after = cache.get(&key("ABC0001")).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lookup_reports_creation() {
        let (cache, _) = counted(catalogue());

        let first = cache.lookup(&key("ABC0001")).unwrap();
        let second = cache.lookup(&key("ABC0001")).unwrap();

        assert!(first.is_created());
        assert!(second.is_cached());
        assert_eq!(second.price(), Some(120));
        assert!(Arc::ptr_eq(&first.into_inner(), &second.into_inner()));
    }

    #[test]
    fn test_peek_does_not_load() {
        let (cache, calls) = counted(catalogue());

        assert!(cache.peek(&key("ABC0001")).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let loaded = cache.get(&key("ABC0001")).unwrap();
        let peeked = cache.peek(&key("ABC0001")).unwrap();
        assert!(Arc::ptr_eq(&loaded, &peeked));
    }

    #[test]
    fn test_invalidate_recreates() {
        let (cache, calls) = counted(catalogue());

        let old = cache.get(&key("ABC0001")).unwrap();
        assert!(cache.invalidate(&key("ABC0001")));
        assert!(!cache.invalidate(&key("ABC0001")));

        let new = cache.get(&key("ABC0001")).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(old.name(), new.name());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().invalidations(), 1);
    }

    #[test]
    fn test_clear() {
        let (cache, calls) = counted(catalogue());

        cache.get(&key("ABC0001")).unwrap();
        cache.get(&key("ABC0002")).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits(), 0);
        cache.get(&key("ABC0001")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_concurrent_single_creation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: IdentityCache<String, Item> =
            IdentityCache::new(move |key: &String| -> Result<Item> {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(Item::new(key.as_str(), "fresh"))
            });
        let barrier = Barrier::new(2);

        let (a, b) = thread::scope(|s| {
            let first = s.spawn(|| {
                barrier.wait();
                cache.get(&key("K")).unwrap()
            });
            let second = s.spawn(|| {
                barrier.wait();
                cache.get(&key("K")).unwrap()
            });
            (first.join().unwrap(), second.join().unwrap())
        });

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_retry_after_failed_load() {
        for _ in 0..200 {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let cache: IdentityCache<String, Item> =
                IdentityCache::new(move |key: &String| -> Result<Item> {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        thread::sleep(Duration::from_millis(1));
                        return Err(Error::Io(std::io::Error::new(
                            std::io::ErrorKind::Interrupted,
                            "transient",
                        )));
                    }
                    Ok(Item::new(key.as_str(), "fresh"))
                });
            let barrier = Barrier::new(2);

            let results: Vec<Result<Arc<Item>>> = thread::scope(|s| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            cache.get(&key("K"))
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let loaded: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
            let current = cache.get(&key("K")).unwrap();

            for value in &loaded {
                assert!(Arc::ptr_eq(value, &current));
            }
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn test_keys_wait_for_failing_load() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        let cache: IdentityCache<String, Item> =
            IdentityCache::new(move |key: &String| -> Result<Item> {
                started_tx.lock().send(()).unwrap();
                thread::sleep(Duration::from_millis(20));
                Err(Error::not_found(key))
            });

        thread::scope(|s| {
            let loader = s.spawn(|| cache.get(&key("K")));
            started_rx.recv().unwrap();

            assert!(cache.keys().is_empty());
            assert_eq!(cache.len(), 0);
            assert!(loader.join().unwrap().is_err());
        });

        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let (cache, calls) = counted(catalogue());

        thread::scope(|s| {
            for code in ["ABC0001", "ABC0002", "ABC0001", "ABC0002"] {
                let cache = &cache;
                s.spawn(move || cache.get(&key(code)).unwrap());
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_proxy_over_tsv_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ABC0001\tPencil\t120\nABC0002\tEraser\t80\n")
            .unwrap();
        file.flush().unwrap();

        let cache = IdentityCache::from_source(TsvFile::new(file.path()));
        let item = cache.get(&key("ABC0002")).unwrap();

        assert_eq!(item.price(), Some(80));
        assert!(Arc::ptr_eq(&item, &cache.get(&key("ABC0002")).unwrap()));
    }

    #[test]
    fn test_proxy_over_fixed_width_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ID        NAME\n0000000001Pencil\n0000000002Eraser\n")
            .unwrap();
        file.flush().unwrap();

        let cache = IdentityCache::from_source(FixedWidthFile::new(file.path()));
        let first = cache.get(&key("2")).unwrap();

        assert_eq!(first.name(), "Eraser");
        assert_eq!(cache.stats().misses(), 1);
        cache.get(&key("2")).unwrap();
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn test_proxy_over_mock() {
        let cache = IdentityCache::from_source(MockSource::new());

        for id in 1..=3 {
            let item = cache.get(&id.to_string()).unwrap();
            assert_eq!(item.name(), itemstore::DUMMY_ITEM_NAME);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_source_errors_propagate() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = IdentityCache::from_source(TsvFile::new(dir.path().join("absent.txt")));

        assert!(matches!(cache.get(&key("ABC0001")), Err(Error::Io(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_integer_keys() {
        let cache: IdentityCache<u64, String> =
            IdentityCache::new(|id: &u64| -> Result<String> {
                if *id < 100 {
                    Ok(format!("row {}", id))
                } else {
                    Err(Error::not_found(id))
                }
            });

        let a = cache.get(&7).unwrap();
        assert!(Arc::ptr_eq(&a, &cache.get(&7).unwrap()));
        assert!(cache.get(&100).unwrap_err().is_not_found());
    }
}
