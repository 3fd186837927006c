//! Durable per-key version counters.
//!
//! Each counter is bumped on local mutation, manual revalidation and
//! user-return triggers, and is appended as a `?v=` query parameter on
//! cache-bypassing refetches so an edge cache can never answer a forced
//! refetch from a previous epoch. Counters survive restarts but are local to
//! this machine.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Persisted monotonic counters, one per resource key.
///
/// Counter access is infallible by design: the sync layer must never crash on
/// a storage hiccup, so a failed read is reported as version 0 and a failed
/// bump returns the last known value.
pub trait VersionStore: Send + Sync {
  fn get(&self, key: &str) -> u64;

  /// Increment and return the counter for a key.
  fn bump(&self, key: &str) -> u64;
}

/// In-memory counters. Not durable; used in tests and when no data directory
/// is available.
pub struct MemoryVersionStore {
  versions: Mutex<HashMap<String, u64>>,
}

impl MemoryVersionStore {
  pub fn new() -> Self {
    Self {
      versions: Mutex::new(HashMap::new()),
    }
  }
}

impl Default for MemoryVersionStore {
  fn default() -> Self {
    Self::new()
  }
}

impl VersionStore for MemoryVersionStore {
  fn get(&self, key: &str) -> u64 {
    let versions = self
      .versions
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    versions.get(key).copied().unwrap_or(0)
  }

  fn bump(&self, key: &str) -> u64 {
    let mut versions = self
      .versions
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let next = versions.get(key).copied().unwrap_or(0) + 1;
    versions.insert(key.to_string(), next);
    next
  }
}

/// SQLite-backed counters stored in the per-user data directory.
pub struct SqliteVersionStore {
  conn: Mutex<Connection>,
}

const VERSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resource_version (
    key TEXT PRIMARY KEY,
    version INTEGER NOT NULL DEFAULT 0
);
"#;

impl SqliteVersionStore {
  /// Open the version database at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open version database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open the version database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open version database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(VERSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run version store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("l2dex").join("versions.db"))
  }

  fn try_get(&self, key: &str) -> Result<u64> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

    let mut stmt = conn
      .prepare("SELECT version FROM resource_version WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare version query: {}", e))?;

    let version: Option<u64> = stmt.query_row(params![key], |row| row.get(0)).ok();
    Ok(version.unwrap_or(0))
  }

  fn try_bump(&self, key: &str) -> Result<u64> {
    let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

    let version: u64 = conn
      .query_row(
        "INSERT INTO resource_version (key, version) VALUES (?, 1)
         ON CONFLICT(key) DO UPDATE SET version = version + 1
         RETURNING version",
        params![key],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to bump version: {}", e))?;

    Ok(version)
  }
}

impl VersionStore for SqliteVersionStore {
  fn get(&self, key: &str) -> u64 {
    match self.try_get(key) {
      Ok(version) => version,
      Err(e) => {
        warn!("version read failed for {}: {}", key, e);
        0
      }
    }
  }

  fn bump(&self, key: &str) -> u64 {
    match self.try_bump(key) {
      Ok(version) => version,
      Err(e) => {
        warn!("version bump failed for {}: {}", key, e);
        self.try_get(key).unwrap_or(0)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_memory_counters_are_monotonic_per_key() {
    let store = MemoryVersionStore::new();
    assert_eq!(store.get("a"), 0);
    assert_eq!(store.bump("a"), 1);
    assert_eq!(store.bump("a"), 2);
    assert_eq!(store.bump("b"), 1);
    assert_eq!(store.get("a"), 2);
  }

  #[test]
  fn test_sqlite_counters() {
    let conn = Connection::open_in_memory().unwrap();
    let store = SqliteVersionStore::from_connection(conn).unwrap();

    assert_eq!(store.get("servers.json"), 0);
    assert_eq!(store.bump("servers.json"), 1);
    assert_eq!(store.bump("servers.json"), 2);
    assert_eq!(store.get("servers.json"), 2);
    assert_eq!(store.get("banner-data.json"), 0);
  }

  #[test]
  fn test_sqlite_counters_survive_reopen() {
    let path = std::env::temp_dir().join(format!("l2dex-ver-{}.db", uuid::Uuid::new_v4()));

    {
      let store = SqliteVersionStore::open_at(&path).unwrap();
      store.bump("k");
      store.bump("k");
    }

    let store = SqliteVersionStore::open_at(&path).unwrap();
    assert_eq!(store.get("k"), 2);

    let _ = std::fs::remove_file(&path);
  }
}
