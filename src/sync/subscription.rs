//! Per-resource subscription: the stale-while-revalidate "hook".
//!
//! A `Subscription<T>` tracks one remote JSON document and exposes
//! `data`/`loading`/`error` plus `mutate` and `revalidate`, the way a
//! client-side data hook would. It is driven by its host's event loop:
//! `tick()` advances time-based work (polling, the delayed follow-up
//! refetch), `poll()` commits completed fetches, and `notify()` feeds it
//! external revalidation triggers (window focus in a browser, SIGHUP here).
//!
//! Within one subscription only the most recently issued fetch may commit;
//! starting a new fetch aborts the previous in-flight one. Across
//! subscriptions on the same key, reconciliation happens through the shared
//! [`SyncStore`] cache, last write wins.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::fetch::{FetchOutcome, JsonFetch};
use super::store::SyncStore;

/// External events that should force a revalidation, throttled to one
/// refetch per 30 seconds per subscription. The variants mirror the browser
/// lifecycle events the protocol was designed around; a non-browser host maps
/// whatever it has (a signal, a file watch) onto them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
  /// Focus regained.
  Focus,
  /// Document became visible again.
  Visible,
  /// Session restored from a suspended state (back-forward cache).
  Restored,
}

/// Options for [`SyncHandle::subscribe`].
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
  /// Force a foreground network fetch even when a fresh cache entry exists.
  pub no_cache: bool,
  /// Silent refetch cadence. `None` means the 5 minute default; a zero
  /// duration disables polling.
  pub interval: Option<Duration>,
}

/// Entry point to the sync layer: owns the shared store, the fetcher and the
/// public base URL, and hands out subscriptions.
#[derive(Clone)]
pub struct SyncHandle {
  store: Arc<SyncStore>,
  fetcher: Arc<dyn JsonFetch>,
  base: Option<String>,
}

impl SyncHandle {
  pub fn new(store: Arc<SyncStore>, fetcher: Arc<dyn JsonFetch>, base: Option<String>) -> Self {
    let base = base.map(|b| b.trim_end_matches('/').to_string());
    if base.is_none() {
      warn!("blob base URL is not set; all reads will report no data");
    }
    Self {
      store,
      fetcher,
      base,
    }
  }

  pub fn store(&self) -> &Arc<SyncStore> {
    &self.store
  }

  /// Fully-qualified resource key for a path (base URL + normalized path).
  pub fn key_for(&self, path: &str) -> String {
    let normalized = if path.starts_with('/') {
      path.to_string()
    } else {
      format!("/{}", path)
    };
    match &self.base {
      Some(base) => format!("{}{}", base, normalized),
      None => normalized,
    }
  }

  /// Subscribe to a resource path.
  ///
  /// A fresh cache entry is returned immediately (`loading == false`) and a
  /// silent cache-busting refetch is started in the background. Without a
  /// usable entry the subscription starts in `loading` with a foreground
  /// fetch.
  pub fn subscribe<T: DeserializeOwned + Serialize>(
    &self,
    path: &str,
    opts: SubscribeOptions,
  ) -> Subscription<T> {
    let key = self.key_for(path);
    let interval = opts.interval.unwrap_or_else(|| Duration::minutes(5));

    let mut sub = Subscription {
      key,
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
      data: None,
      loading: false,
      error: None,
      rx: None,
      task: None,
      interval,
      last_poll: self.store.now(),
      last_trigger: None,
      followup_at: None,
    };

    // A cached null is a committed "no data yet", which is just as valid a
    // hit as a real document. An entry that no longer decodes as T counts
    // as a miss.
    let hit: Option<Option<T>> = match self.store.get(&sub.key) {
      None => None,
      Some(Value::Null) => Some(None),
      Some(value) => serde_json::from_value(value).ok().map(Some),
    };

    match hit {
      Some(data) if !opts.no_cache => {
        sub.data = data;
        sub.start_fetch(true, true);
      }
      _ => {
        sub.start_fetch(false, false);
      }
    }

    sub
  }
}

/// Subscriber state for one remote JSON document. See the module docs for
/// the driving protocol.
pub struct Subscription<T> {
  key: String,
  store: Arc<SyncStore>,
  fetcher: Arc<dyn JsonFetch>,
  data: Option<T>,
  loading: bool,
  error: Option<String>,
  rx: Option<mpsc::UnboundedReceiver<FetchOutcome>>,
  task: Option<JoinHandle<()>>,
  interval: Duration,
  last_poll: DateTime<Utc>,
  last_trigger: Option<DateTime<Utc>>,
  followup_at: Option<DateTime<Utc>>,
}

const TRIGGER_THROTTLE_SECS: i64 = 30;

impl<T: DeserializeOwned + Serialize> Subscription<T> {
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Advance time-based work: the scheduled follow-up refetch and the
  /// polling interval. Call this from the event loop tick.
  pub fn tick(&mut self) {
    let now = self.store.now();

    if let Some(at) = self.followup_at {
      if now >= at {
        self.followup_at = None;
        self.store.bump_version(&self.key);
        self.start_fetch(true, true);
      }
    }

    if self.interval > Duration::zero() && now - self.last_poll >= self.interval {
      self.last_poll = now;
      self.start_fetch(true, true);
    }
  }

  /// Commit a completed fetch, if one finished. Returns `true` when the
  /// visible state changed.
  pub fn poll(&mut self) -> bool {
    let rx = match &mut self.rx {
      Some(rx) => rx,
      None => return false,
    };

    match rx.try_recv() {
      Ok(outcome) => {
        self.rx = None;
        self.task = None;
        self.commit(outcome);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Aborted or superseded fetch: swallowed, never surfaced.
        self.rx = None;
        self.task = None;
        false
      }
    }
  }

  /// Await the in-flight fetch, if any, and commit its outcome. For
  /// one-shot callers that need a settled value rather than an event loop.
  pub async fn settle(&mut self) {
    if let Some(mut rx) = self.rx.take() {
      if let Some(outcome) = rx.recv().await {
        self.commit(outcome);
      }
      self.task = None;
    }
  }

  /// Feed an external revalidation trigger. Accepted triggers bump the
  /// version counter and start a silent cache-busting refetch; returns
  /// whether the trigger was accepted or throttled away.
  pub fn notify(&mut self, trigger: Trigger) -> bool {
    let now = self.store.now();
    if let Some(last) = self.last_trigger {
      if now - last < Duration::seconds(TRIGGER_THROTTLE_SECS) {
        return false;
      }
    }
    self.last_trigger = Some(now);

    debug!("revalidating {} on {:?}", self.key, trigger);
    self.store.bump_version(&self.key);
    self.start_fetch(true, true);
    true
  }

  /// Bump the version counter, refetch silently now, and schedule exactly
  /// one follow-up refetch two minutes out to catch slow edge-cache
  /// propagation. The follow-up dies with the subscription.
  pub fn revalidate(&mut self) {
    self.store.bump_version(&self.key);
    self.start_fetch(true, true);
    self.followup_at = Some(self.store.now() + Duration::minutes(2));
  }

  /// Optimistically overwrite (or, with `None`, clear) both the shared
  /// cache entry and the visible state, then bump the version counter.
  /// Used right after a successful write so the UI reflects the change
  /// before the CDN does.
  pub fn mutate(&mut self, next: Option<T>) {
    match &next {
      Some(value) => match serde_json::to_value(value) {
        Ok(json) => self.store.insert(&self.key, json),
        Err(e) => warn!("mutate for {} not cached: {}", self.key, e),
      },
      None => self.store.remove(&self.key),
    }
    self.data = next;
    self.loading = false;
    self.error = None;
    self.store.bump_version(&self.key);
  }

  fn commit(&mut self, outcome: FetchOutcome) {
    match outcome {
      Ok(Some(value)) => {
        self.store.insert(&self.key, value.clone());
        if value.is_null() {
          self.data = None;
          self.error = None;
        } else {
          match serde_json::from_value(value) {
            Ok(data) => {
              self.data = Some(data);
              self.error = None;
            }
            Err(e) => {
              // Parse failure: prior data stays visible.
              self.error = Some(format!("invalid payload for {}: {}", self.key, e));
            }
          }
        }
        self.loading = false;
      }
      Ok(None) => {
        // Missing document is a valid "no data yet" state. Cached so
        // sibling subscriptions see the same answer without a refetch.
        self.store.insert(&self.key, Value::Null);
        self.data = None;
        self.error = None;
        self.loading = false;
      }
      Err(message) => {
        self.error = Some(message);
        self.loading = false;
      }
    }
  }

  fn start_fetch(&mut self, busted: bool, silent: bool) {
    if !silent {
      self.loading = true;
    }

    // Supersede: only the latest issued fetch may commit.
    if let Some(task) = self.task.take() {
      task.abort();
    }
    self.rx = None;

    let url = if busted {
      with_version(&self.key, self.store.version(&self.key))
    } else {
      self.key.clone()
    };

    let (tx, rx) = mpsc::unbounded_channel();
    self.rx = Some(rx);

    let future = self.fetcher.fetch_json(url);
    self.task = Some(tokio::spawn(async move {
      let outcome = future.await;
      // Receiver may have been dropped by a newer fetch
      let _ = tx.send(outcome);
    }));
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

/// Version-stamped URL: a distinct URL per invalidation epoch, so an edge
/// cache cannot answer a forced refetch with bytes from a prior epoch.
fn with_version(url: &str, version: u64) -> String {
  let sep = if url.contains('?') { '&' } else { '?' };
  format!("{}{}v={}", url, sep, version)
}
