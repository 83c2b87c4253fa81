//! Generic reader-biased TTL cache.
//!
//! Grounded on the original enricher's `ttlCache` (mutex + map with
//! `expires` per entry, lazily evicted on lookup): the combined geo/asn
//! cache and the separate rDNS cache both use this type, kept distinct so a
//! miss in one never evicts the other (§3 invariant).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Shared-read / exclusive-write TTL cache. Cloning shares the same
/// backing map via `Arc`.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    inner: Arc<RwLock<HashMap<K, Entry<V>>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached value if present and not expired. A plain shared
    /// read lock; never performs network I/O, never mutates on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.read();
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Inserts or overwrites `key` with a fresh TTL starting now.
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.write();
        guard.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops expired entries. Not required for correctness (`get` already
    /// treats expired entries as a miss) but keeps long-running processes
    /// from growing the map unboundedly.
    pub fn evict_expired(&self) {
        let mut guard = self.inner.write();
        let now = Instant::now();
        guard.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The 24h TTL shared by every enrichment cache (§3).
pub const ENRICHMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_insert() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("8.8.8.8".to_string(), 42);
        assert_eq!(cache.get(&"8.8.8.8".to_string()), Some(42));
    }

    #[test]
    fn miss_before_insert() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"1.1.1.1".to_string()), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("8.8.8.8".to_string(), 42);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"8.8.8.8".to_string()), None);
    }

    #[test]
    fn evict_expired_drops_stale_entries() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("8.8.8.8".to_string(), 42);
        std::thread::sleep(Duration::from_millis(10));
        cache.evict_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn clone_shares_backing_map() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        let clone = cache.clone();
        cache.insert("8.8.8.8".to_string(), 42);
        assert_eq!(clone.get(&"8.8.8.8".to_string()), Some(42));
    }
}
