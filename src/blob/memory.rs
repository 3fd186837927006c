//! In-memory object store for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::sync::{FetchOutcome, JsonFetch};

use super::{BlobError, BlobInfo, ObjectStore, Result};

/// Object store backed by a `HashMap`. Doubles as a [`JsonFetch`]
/// implementation that resolves the public URLs it hands out, so tests can
/// exercise the whole read/write path without a network.
pub struct MemoryObjectStore {
  blobs: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
  public_base: String,
}

impl MemoryObjectStore {
  pub fn new() -> Self {
    Self {
      blobs: Mutex::new(HashMap::new()),
      public_base: "memory://store".to_string(),
    }
  }

  pub fn public_base(&self) -> &str {
    &self.public_base
  }

  fn url_for(&self, key: &str) -> String {
    format!("{}/{}", self.public_base, key)
  }

  /// Number of stored blobs, for test assertions.
  pub fn len(&self) -> usize {
    self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, key: &str) -> bool {
    self.blobs.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
  }
}

impl Default for MemoryObjectStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
  async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
    let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
    let mut infos: Vec<BlobInfo> = blobs
      .iter()
      .filter(|(key, _)| key.starts_with(prefix))
      .map(|(key, (_, uploaded_at))| BlobInfo {
        url: self.url_for(key),
        pathname: key.clone(),
        uploaded_at: *uploaded_at,
      })
      .collect();
    infos.sort_by(|a, b| a.pathname.cmp(&b.pathname));
    Ok(infos)
  }

  async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
    let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
    blobs.insert(key.to_string(), (bytes, Utc::now()));
    Ok(self.url_for(key))
  }

  async fn delete(&self, pathname: &str) -> Result<()> {
    let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
    blobs
      .remove(pathname)
      .map(|_| ())
      .ok_or_else(|| BlobError::NotFound(pathname.to_string()))
  }
}

impl JsonFetch for MemoryObjectStore {
  fn fetch_json(&self, url: String) -> BoxFuture<'static, FetchOutcome> {
    let outcome = match url.strip_prefix(&format!("{}/", self.public_base)) {
      None => Ok(None),
      Some(key) => {
        // Busted URLs carry a ?v= suffix the store does not know about
        let key = key.split('?').next().unwrap_or(key);
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        match blobs.get(key) {
          None => Ok(None),
          Some((bytes, _)) => serde_json::from_slice::<Value>(bytes)
            .map(Some)
            .map_err(|e| format!("GET {} returned invalid JSON: {}", url, e)),
        }
      }
    };
    Box::pin(async move { outcome })
  }
}
