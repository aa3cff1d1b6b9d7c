use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agcensus_shared::{JoinMode, Selection};
use bytes::Bytes;
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoroplethKey {
    pub selection: Selection,
    pub join_mode: JoinMode,
}

/// Serialized choropleth response for one key.
#[derive(Debug, Clone)]
pub struct CachedChoropleth {
    pub json: Arc<Bytes>,
    pub etag: String,
}

#[derive(Debug)]
struct Entry {
    payload: CachedChoropleth,
    last_used: u64,
}

/// Bounded least-recently-used cache of computed choropleths.
///
/// Inputs are immutable after startup, so entries never go stale; they only
/// leave when the cache is full. A capacity of zero disables caching.
#[derive(Debug)]
pub struct ChoroplethCache {
    entries: DashMap<ChoroplethKey, Entry>,
    capacity: usize,
    clock: AtomicU64,
}

impl ChoroplethCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &ChoroplethKey) -> Option<CachedChoropleth> {
        let mut entry = self.entries.get_mut(key)?;
        entry.last_used = self.tick();
        Some(entry.payload.clone())
    }

    pub fn insert(&self, key: ChoroplethKey, payload: CachedChoropleth) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }

        let last_used = self.tick();
        self.entries.insert(key, Entry { payload, last_used });
    }

    fn evict_least_recent(&self) -> bool {
        let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone())
        else {
            return false;
        };
        self.entries.remove(&oldest).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(year: &str) -> ChoroplethKey {
        ChoroplethKey {
            selection: Selection::new(year, "FARMS"),
            join_mode: JoinMode::Inner,
        }
    }

    fn payload(tag: &str) -> CachedChoropleth {
        CachedChoropleth {
            json: Arc::new(Bytes::from(tag.to_owned())),
            etag: format!("\"{tag}\""),
        }
    }

    #[test]
    fn evicts_least_recently_used_entry() {
        let cache = ChoroplethCache::new(2);
        cache.insert(key("2011"), payload("a"));
        cache.insert(key("2016"), payload("b"));

        // Touch 2011 so 2016 becomes the eviction candidate.
        assert!(cache.get(&key("2011")).is_some());
        cache.insert(key("2021"), payload("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("2016")).is_none());
        assert_eq!(cache.get(&key("2011")).unwrap().etag, "\"a\"");
        assert_eq!(cache.get(&key("2021")).unwrap().etag, "\"c\"");
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let cache = ChoroplethCache::new(2);
        cache.insert(key("2011"), payload("a"));
        cache.insert(key("2016"), payload("b"));
        cache.insert(key("2011"), payload("a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("2011")).unwrap().etag, "\"a2\"");
        assert!(cache.get(&key("2016")).is_some());
    }

    #[test]
    fn join_mode_is_part_of_the_key() {
        let cache = ChoroplethCache::new(4);
        cache.insert(key("2011"), payload("inner"));
        let left = ChoroplethKey {
            join_mode: JoinMode::Left,
            ..key("2011")
        };
        assert!(cache.get(&left).is_none());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ChoroplethCache::new(0);
        cache.insert(key("2011"), payload("a"));
        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key("2011")).is_none());
    }
}
