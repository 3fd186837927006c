//! Remote object store client.
//!
//! The store holds opaque blobs at stable public URLs. Only the admin
//! mutation flows talk to it through this trait; the sync layer reads the
//! public URLs directly and stays decoupled from store semantics.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("object store request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("object store responded {status} for {url}")]
  Status {
    status: reqwest::StatusCode,
    url: String,
  },
  #[error("blob not found: {0}")]
  NotFound(String),
  #[error("invalid object store response: {0}")]
  Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// One stored blob, as reported by `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
  /// Stable public URL serving the blob's bytes.
  pub url: String,
  /// Store-side path, the handle used for deletion.
  pub pathname: String,
  pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Blobs whose pathname starts with `prefix`.
  async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>>;

  /// Store bytes under `key` with public access; returns the public URL.
  async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

  async fn delete(&self, pathname: &str) -> Result<()>;
}
