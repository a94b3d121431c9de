//! In-memory LRU cache of rendered clips
//!
//! Lookups take the read lock and bump an atomic access tick, so concurrent
//! hits never serialise on each other. Inserts take the write lock and evict
//! the least recently used entry once capacity is reached.

use super::model::ClipPayload;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct CacheEntry {
    payload: Arc<ClipPayload>,
    last_access: AtomicU64,
}

/// Cache counters, as reported by `/stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ClipCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ClipCache {
    /// A capacity of 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &str) -> Option<Arc<ClipPayload>> {
        let corrupt = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.payload.is_complete() => {
                    entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.payload));
                }
                Some(_) => true,
                None => false,
            }
        };

        if corrupt {
            warn!(key, "Dropping incomplete cache entry");
            self.entries.write().remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: String, payload: Arc<ClipPayload>) {
        if self.capacity == 0 || !payload.is_complete() {
            return;
        }

        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %oldest, "Evicted clip from cache");
            }
        }

        entries.insert(
            key,
            CacheEntry {
                payload,
                last_access: AtomicU64::new(self.next_tick()),
            },
        );
    }

    /// Remove every entry; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
