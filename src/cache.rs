//! Bounded, TTL-aware cache shared across requests.
//!
//! This is the only state that concurrent safety requests share. The contract
//! is deliberately small:
//!
//! - `get` enforces TTL lazily at read time; there is no background sweep.
//! - `set` stores a value with a per-entry TTL.
//! - Capacity is bounded; inserting into a full cache evicts the least
//!   recently used entry.
//!
//! The clock is injected so TTL behavior is testable without sleeping.
//! A last-write-wins race between two requests caching the same key is
//! acceptable; this is a best-effort-fresh store, not a consistency-critical
//! one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;

/// TTL for avalanche zone/map-layer feed responses.
pub const AVALANCHE_FEED_TTL_SECS: i64 = 10 * 60;
/// TTL for station-list lookups, which change rarely.
pub const STATION_LIST_TTL_SECS: i64 = 12 * 60 * 60;
/// TTL for rainfall archive responses.
pub const RAINFALL_ARCHIVE_TTL_SECS: i64 = 60 * 60;

/// Source of "now" for the cache. Injected so tests can advance time
/// manually.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct Entry {
    value: Value,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
    last_access: DateTime<Utc>,
}

/// Process-local cache keyed by namespaced strings
/// (`{provider}:{lat-bucket}:{lon-bucket}:{time-bucket}`).
#[derive(Clone)]
pub struct SafetyCache {
    entries: Arc<DashMap<String, Entry>>,
    capacity: usize,
    clock: Arc<dyn TimeSource>,
}

impl SafetyCache {
    /// Create a cache with the given capacity bound and clock.
    pub fn new(capacity: usize, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Create a cache using the system clock.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity, Arc::new(SystemClock))
    }

    /// Look up a key. Returns the value and its age in seconds.
    ///
    /// Entries past their TTL are removed and reported as absent. Use
    /// [`SafetyCache::get_stale`] to read past-TTL entries for stale-tier
    /// fallbacks.
    pub fn get(&self, key: &str) -> Option<(Value, i64)> {
        let now = self.clock.now();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                let age = now - entry.inserted_at;
                if age <= entry.ttl {
                    entry.last_access = now;
                    return Some((entry.value.clone(), age.num_seconds()));
                }
                true
            }
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Look up a key without enforcing TTL.
    ///
    /// Returns the value, its age in seconds, and whether it is past TTL.
    /// Stale-tier fallbacks use this to prefer old data over no data.
    pub fn get_stale(&self, key: &str) -> Option<(Value, i64, bool)> {
        let now = self.clock.now();
        let mut entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        let age = now - entry.inserted_at;
        Some((entry.value.clone(), age.num_seconds(), age > entry.ttl))
    }

    /// Store a value with the given TTL.
    pub fn set(&self, key: &str, value: Value, ttl_secs: i64) {
        let now = self.clock.now();
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
                ttl: Duration::seconds(ttl_secs),
                last_access: now,
            },
        );
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict the least recently accessed entry. Linear scan; capacities here
    /// are small (hundreds of entries, not millions).
    fn evict_lru(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_access)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

/// Build a namespaced cache key from a provider name and request coordinates.
///
/// Coordinates are bucketed to ~1 km so nearby requests share entries.
pub fn cache_key(provider: &str, latitude: f64, longitude: f64, time_bucket: &str) -> String {
    format!(
        "{}:{:.2}:{:.2}:{}",
        provider, latitude, longitude, time_bucket
    )
}
