//! Time-to-live cache for loaded specs.
//!
//! Owned by whatever composes clients; there is no process-wide instance.
//! Concurrent misses on the same key may build twice. The cache only
//! promises that a fresh entry is reused until its TTL runs out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::spec::Spec;

/// Source of the current time, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: Arc<T>,
    expires: Instant,
}

/// Values keyed by string with a per-entry time to live.
pub struct TtlCache<T> {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

/// Cache of loaded specs keyed by source.
pub type SpecCache = TtlCache<Spec>;

impl<T> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached value for `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let now = self.clock.now();
        let entries = lock(&self.entries);
        entries
            .get(key)
            .filter(|e| e.expires > now)
            .map(|e| Arc::clone(&e.value))
    }

    /// Return the cached value for `key`, or build, store and return a new one.
    ///
    /// The lock is not held while `build` runs. A failed build leaves the
    /// cache untouched.
    pub fn get_or_build<E>(
        &self,
        key: &str,
        ttl: Duration,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(hit) = self.get(key) {
            tracing::debug!(key, "cache hit");
            return Ok(hit);
        }

        tracing::debug!(key, ?ttl, "cache miss, building");
        let value = Arc::new(build()?);
        let expires = self.clock.now() + ttl;
        lock(&self.entries).insert(
            key.to_string(),
            Entry {
                value: Arc::clone(&value),
                expires,
            },
        );
        Ok(value)
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = lock(&self.entries).remove(key).is_some();
        if removed {
            tracing::debug!(key, "cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
