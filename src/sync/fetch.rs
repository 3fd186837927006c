//! JSON fetch abstraction over plain HTTP GET.
//!
//! The sync layer only ever needs "GET a stable public URL returns the current
//! JSON document", so the trait is deliberately tiny. HTTP 404 is a valid
//! "no data yet" answer, not an error.

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

/// Outcome of a single GET: `Ok(Some(..))` for a JSON body, `Ok(None)` for a
/// missing document, `Err(..)` for transport or parse failures. The error is
/// a plain message because subscriptions surface it verbatim through their
/// `error` field, never as a panic or a propagated failure.
pub type FetchOutcome = Result<Option<Value>, String>;

pub trait JsonFetch: Send + Sync {
  fn fetch_json(&self, url: String) -> BoxFuture<'static, FetchOutcome>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetch {
  client: reqwest::Client,
}

impl HttpFetch {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for HttpFetch {
  fn default() -> Self {
    Self::new()
  }
}

impl JsonFetch for HttpFetch {
  fn fetch_json(&self, url: String) -> BoxFuture<'static, FetchOutcome> {
    let client = self.client.clone();
    Box::pin(async move {
      debug!("GET {}", url);

      let res = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("GET {} failed: {}", url, e))?;

      if res.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
      }
      if !res.status().is_success() {
        return Err(format!("GET {} -> {}", url, res.status()));
      }

      let json = res
        .json::<Value>()
        .await
        .map_err(|e| format!("GET {} returned invalid JSON: {}", url, e))?;

      Ok(Some(json))
    })
  }
}

/// Fetcher used when no blob base URL is configured: every read degrades to
/// "no data" instead of failing.
pub struct OfflineFetch;

impl JsonFetch for OfflineFetch {
  fn fetch_json(&self, _url: String) -> BoxFuture<'static, FetchOutcome> {
    Box::pin(async { Ok(None) })
  }
}
