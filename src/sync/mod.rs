//! Stale-while-revalidate synchronization layer for remote JSON documents.
//!
//! The remote store has no push channel and sits behind an edge cache that may
//! serve stale bytes, so this module provides:
//! - a process-wide in-memory cache with a 30 minute TTL
//! - per-subscription background refetching (polling + external triggers)
//! - optimistic local mutation
//! - durable per-key version counters used as cache-busting query parameters

mod fetch;
mod store;
mod subscription;
mod version;

pub use fetch::{FetchOutcome, HttpFetch, JsonFetch, OfflineFetch};
pub use store::{cache_ttl, Clock, ManualClock, SyncStore, SystemClock};
pub use subscription::{SubscribeOptions, Subscription, SyncHandle, Trigger};
pub use version::{MemoryVersionStore, SqliteVersionStore, VersionStore};
