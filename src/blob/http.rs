//! HTTP implementation of the object store client.
//!
//! Wire surface: `GET {api}/list?prefix=` returning `{"blobs": [...]}`,
//! `PUT {api}/{key}?access=public` with the raw bytes, and
//! `DELETE {api}/{pathname}`. Writes authenticate with a bearer token.

use async_trait::async_trait;
use tracing::debug;

use super::{BlobError, BlobInfo, ObjectStore, Result};

pub struct HttpObjectStore {
  client: reqwest::Client,
  api_url: String,
  token: String,
}

#[derive(serde::Deserialize)]
struct ListResponse {
  blobs: Vec<BlobInfo>,
}

#[derive(serde::Deserialize)]
struct PutResponse {
  url: String,
}

impl HttpObjectStore {
  pub fn new(api_url: &str, token: String) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.trim_end_matches('/').to_string(),
      token,
    }
  }

  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.api_url, path.trim_start_matches('/'))
  }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
  async fn list(&self, prefix: &str) -> Result<Vec<BlobInfo>> {
    let url = self.endpoint("list");
    let res = self
      .client
      .get(&url)
      .query(&[("prefix", prefix)])
      .bearer_auth(&self.token)
      .send()
      .await?;

    if !res.status().is_success() {
      return Err(BlobError::Status {
        status: res.status(),
        url,
      });
    }

    let body: ListResponse = res.json().await?;
    Ok(body.blobs)
  }

  async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
    let url = self.endpoint(key);
    debug!("PUT {} ({} bytes)", url, bytes.len());

    let res = self
      .client
      .put(&url)
      .query(&[("access", "public")])
      .bearer_auth(&self.token)
      .header(reqwest::header::CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await?;

    if !res.status().is_success() {
      return Err(BlobError::Status {
        status: res.status(),
        url,
      });
    }

    let body: PutResponse = res.json().await?;
    Ok(body.url)
  }

  async fn delete(&self, pathname: &str) -> Result<()> {
    let url = self.endpoint(pathname);
    debug!("DELETE {}", url);

    let res = self
      .client
      .delete(&url)
      .bearer_auth(&self.token)
      .send()
      .await?;

    if res.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(BlobError::NotFound(pathname.to_string()));
    }
    if !res.status().is_success() {
      return Err(BlobError::Status {
        status: res.status(),
        url,
      });
    }

    Ok(())
  }
}
