//! Single-slot TTL cache for discovery results
//!
//! Holds at most one value. Readers share a read lock, so a warm cache never
//! blocks concurrent callers; `store` and `invalidate` take the write lock
//! only long enough to swap the slot. Nothing here performs I/O, so no lock
//! is ever held across a network call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// A cached value with the instant it was stored
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Lookups served from the cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing fresh
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Thread-safe single-value cache with TTL expiry
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Entry<T>>>,
    stats: CacheStats,
}

impl<T: Clone> TtlCache<T> {
    /// Create an empty cache
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
            stats: CacheStats::default(),
        }
    }

    /// Copy of the cached value if its age is below the TTL
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.read();
        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Age of the cached value, fresh or not
    pub fn age(&self) -> Option<Duration> {
        self.slot.read().as_ref().map(|e| e.stored_at.elapsed())
    }

    /// Replace the cached value
    pub fn store(&self, value: T) {
        *self.slot.write() = Some(Entry {
            value,
            stored_at: Instant::now(),
        });
    }

    /// Drop the cached value; the next `get` misses
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }

    /// Hit/miss counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
