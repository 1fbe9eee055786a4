use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CachedData<T> {
    fetched_at: Instant,
    data: T,
}

/// A single-slot TTL cache keyed implicitly by whatever the caller
/// associates with it (one `TtlCache` per key, or wrap in a map).
pub struct TtlCache<T> {
    data: Mutex<Option<CachedData<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: Mutex::new(None),
            ttl,
        }
    }

    pub fn get(&self) -> Option<T> {
        let guard = self.data.lock().unwrap();
        guard
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.data.clone())
    }

    pub fn set(&self, data: T) {
        let mut guard = self.data.lock().unwrap();
        *guard = Some(CachedData {
            fetched_at: Instant::now(),
            data,
        });
    }

    pub fn invalidate(&self) {
        let mut guard = self.data.lock().unwrap();
        *guard = None;
    }
}

/// A keyed TTL cache: each key gets its own freshness window.
/// Used for the pane-id cache and the codex best-path cache, both of
/// which are keyed by session/worktree identity rather than being a
/// single global value.
pub struct KeyedTtlCache<K, V> {
    entries: Mutex<HashMap<K, CachedData<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> KeyedTtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.lock().unwrap();
        guard
            .get(key)
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.data.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let mut guard = self.entries.lock().unwrap();
        guard.insert(
            key,
            CachedData {
                fetched_at: Instant::now(),
                data: value,
            },
        );
    }

    pub fn evict(&self, key: &K) {
        let mut guard = self.entries.lock().unwrap();
        guard.remove(key);
    }
}

/// A bounded least-recently-used cache with no TTL, capped at a fixed
/// entry count. Used for the codex per-file `(size, mtime) -> cwd`
/// cache, where staleness is governed by the (size, mtime) key itself
/// rather than wall-clock time.
pub struct LruCache<K, V> {
    capacity: usize,
    map: Mutex<(HashMap<K, V>, VecDeque<K>)>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            map: Mutex::new((HashMap::new(), VecDeque::new())),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.map.lock().unwrap();
        let value = guard.0.get(key).cloned();
        if value.is_some() {
            let (_, order) = &mut *guard;
            order.retain(|k| k != key);
            order.push_back(key.clone());
        }
        value
    }

    pub fn put(&self, key: K, value: V) {
        let mut guard = self.map.lock().unwrap();
        let (map, order) = &mut *guard;
        if map.contains_key(&key) {
            order.retain(|k| k != &key);
        } else if map.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }
        order.push_back(key.clone());
        map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().0.len()
    }
}
