//! Shared in-memory cache and clock abstraction.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::version::VersionStore;

/// How long a cache entry is served without a network round trip.
pub fn cache_ttl() -> Duration {
  Duration::minutes(30)
}

/// Clock abstraction so TTL, throttle and interval logic can be tested
/// without real timers.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// System clock used outside of tests.
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Manually advanced clock for tests.
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap();
    *now += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap()
  }
}

// Lets a test keep a handle to a ManualClock that is also owned by the store.
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
  fn now(&self) -> DateTime<Utc> {
    (**self).now()
  }
}

struct CacheEntry {
  data: Value,
  timestamp: DateTime<Utc>,
}

/// Process-wide cache shared by every subscription, plus the durable version
/// counters and the injected clock.
///
/// Writes are last-write-wins across subscriptions. The data is human-edited
/// configuration-like content, so the shared map carries no ordering guarantee
/// beyond the per-subscription superseded-request rule. Callers that need to
/// detect a concurrent overwrite can compare [`SyncStore::generation`]
/// snapshots.
pub struct SyncStore {
  cache: Mutex<HashMap<String, CacheEntry>>,
  versions: Box<dyn VersionStore>,
  clock: Box<dyn Clock>,
  generation: AtomicU64,
}

impl SyncStore {
  pub fn new(versions: Box<dyn VersionStore>, clock: Box<dyn Clock>) -> Self {
    Self {
      cache: Mutex::new(HashMap::new()),
      versions,
      clock,
      generation: AtomicU64::new(0),
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Current value for a key, if present and fresh. Expired entries are
  /// purged on the way out.
  pub fn get(&self, key: &str) -> Option<Value> {
    // The map holds plain values with no cross-entry invariant, so a lock
    // poisoned by a panicking peer is recovered, not propagated
    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = cache.get(key)?;
    if self.now() - entry.timestamp > cache_ttl() {
      cache.remove(key);
      return None;
    }
    Some(entry.data.clone())
  }

  pub fn insert(&self, key: &str, data: Value) {
    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
    cache.insert(
      key.to_string(),
      CacheEntry {
        data,
        timestamp: self.clock.now(),
      },
    );
    self.generation.fetch_add(1, Ordering::Relaxed);
  }

  pub fn remove(&self, key: &str) {
    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
    if cache.remove(key).is_some() {
      self.generation.fetch_add(1, Ordering::Relaxed);
    }
  }

  /// Drop every expired entry. Called periodically from the event loop; the
  /// lazy purge in [`SyncStore::get`] covers reads in between sweeps.
  pub fn purge_expired(&self) {
    let now = self.now();
    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
    cache.retain(|_, entry| now - entry.timestamp <= cache_ttl());
  }

  /// Epoch of the shared cache, bumped on every insert or remove.
  pub fn generation(&self) -> u64 {
    self.generation.load(Ordering::Relaxed)
  }

  pub fn version(&self, key: &str) -> u64 {
    self.versions.get(key)
  }

  /// Bump the durable version counter for a key. Monotonically non-decreasing
  /// per key, local to this machine: the guarantee is that this client sees
  /// its own writes promptly, not global consistency.
  pub fn bump_version(&self, key: &str) -> u64 {
    self.versions.bump(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::version::MemoryVersionStore;
  use serde_json::json;
  use std::sync::Arc;

  fn store_at(start: DateTime<Utc>) -> (SyncStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let store = SyncStore::new(
      Box::new(MemoryVersionStore::new()),
      Box::new(Arc::clone(&clock)),
    );
    (store, clock)
  }

  fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  #[test]
  fn test_fresh_entry_is_served() {
    let (store, clock) = store_at(start());
    store.insert("k", json!({"a": 1}));

    clock.advance(Duration::minutes(29));
    assert_eq!(store.get("k"), Some(json!({"a": 1})));
  }

  #[test]
  fn test_expired_entry_is_purged_on_read() {
    let (store, clock) = store_at(start());
    store.insert("k", json!(1));

    clock.advance(Duration::minutes(31));
    assert_eq!(store.get("k"), None);
    // Entry was removed, not just hidden
    clock.advance(Duration::minutes(-31));
    assert_eq!(store.get("k"), None);
  }

  #[test]
  fn test_periodic_sweep_keeps_fresh_entries() {
    let (store, clock) = store_at(start());
    store.insert("old", json!(1));
    clock.advance(Duration::minutes(20));
    store.insert("new", json!(2));
    clock.advance(Duration::minutes(15));

    store.purge_expired();
    assert_eq!(store.get("old"), None);
    assert_eq!(store.get("new"), Some(json!(2)));
  }

  #[test]
  fn test_generation_tracks_writes() {
    let (store, _clock) = store_at(start());
    let g0 = store.generation();
    store.insert("k", json!(1));
    assert!(store.generation() > g0);

    let g1 = store.generation();
    store.remove("k");
    assert!(store.generation() > g1);

    // Removing an absent key is not a write
    let g2 = store.generation();
    store.remove("k");
    assert_eq!(store.generation(), g2);
  }

  #[test]
  fn test_reads_survive_a_poisoned_lock() {
    let (store, _clock) = store_at(start());
    store.insert("k", json!(1));

    // Panic while holding the cache lock to poison it
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      let _guard = store.cache.lock().unwrap();
      panic!("poisoning");
    }));

    assert_eq!(store.get("k"), Some(json!(1)));
    store.insert("k", json!(2));
    assert_eq!(store.get("k"), Some(json!(2)));
  }

  #[test]
  fn test_versions_are_monotonic() {
    let (store, _clock) = store_at(start());
    assert_eq!(store.version("k"), 0);
    assert_eq!(store.bump_version("k"), 1);
    assert_eq!(store.bump_version("k"), 2);
    assert_eq!(store.version("k"), 2);
    assert_eq!(store.version("other"), 0);
  }
}
