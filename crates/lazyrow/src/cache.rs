use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use lazyrow_store::SuperColumn;

/// Identifies one row's cached super column pages.
///
/// Derived from `(keyspace, row)` only: every container addressing the same
/// row shares its entries, whatever column family it reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(keyspace: &str, row: &str) -> Self {
        Self(format!("{keyspace}:{row}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw super column data fetched from the store, shared across containers.
///
/// Entries are never invalidated by writes made through a container: a row
/// saved by one container is still served stale to the next until the entry
/// is evicted (by `clear`, or by expiry in [`TtlPageCache`]).
pub trait PageCache: Send + Sync {
    fn get(&self, key: &CacheKey, column_family: &str, super_column: &str) -> Option<Arc<SuperColumn>>;
    fn put(&self, key: &CacheKey, column_family: &str, entry: Arc<SuperColumn>);
    fn clear(&self);
}

type Page<V> = HashMap<(String, String), V>;

/// Unbounded in-process cache behind a `RwLock`.
#[derive(Default)]
pub struct SharedPageCache {
    rows: RwLock<HashMap<CacheKey, Page<Arc<SuperColumn>>>>,
}

impl SharedPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance used by clients that are not given a cache.
    pub fn global() -> Arc<SharedPageCache> {
        static GLOBAL: OnceLock<Arc<SharedPageCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SharedPageCache::new())))
    }

    pub fn len(&self) -> usize {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for SharedPageCache {
    fn get(&self, key: &CacheKey, column_family: &str, super_column: &str) -> Option<Arc<SuperColumn>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(key)?
            .get(&(column_family.to_string(), super_column.to_string()))
            .cloned()
    }

    fn put(&self, key: &CacheKey, column_family: &str, entry: Arc<SuperColumn>) {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.entry(key.clone())
            .or_default()
            .insert((column_family.to_string(), entry.name.clone()), entry);
    }

    fn clear(&self) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Caches nothing; every lookup goes to the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPageCache;

impl PageCache for NoopPageCache {
    fn get(&self, _key: &CacheKey, _column_family: &str, _super_column: &str) -> Option<Arc<SuperColumn>> {
        None
    }

    fn put(&self, _key: &CacheKey, _column_family: &str, _entry: Arc<SuperColumn>) {}

    fn clear(&self) {}
}

/// Like [`SharedPageCache`], but entries stop being served `ttl` after they were stored.
pub struct TtlPageCache {
    ttl: Duration,
    rows: RwLock<HashMap<CacheKey, Page<(Instant, Arc<SuperColumn>)>>>,
}

impl TtlPageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl PageCache for TtlPageCache {
    fn get(&self, key: &CacheKey, column_family: &str, super_column: &str) -> Option<Arc<SuperColumn>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let (stored_at, entry) = rows
            .get(key)?
            .get(&(column_family.to_string(), super_column.to_string()))?;
        (stored_at.elapsed() < self.ttl).then(|| Arc::clone(entry))
    }

    fn put(&self, key: &CacheKey, column_family: &str, entry: Arc<SuperColumn>) {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let page = rows.entry(key.clone()).or_default();
        page.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        page.insert(
            (column_family.to_string(), entry.name.clone()),
            (Instant::now(), entry),
        );
    }

    fn clear(&self) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
