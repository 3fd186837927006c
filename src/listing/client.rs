//! Admin mutation flows: read-modify-write of the listing document and
//! replacement of promotional media in the object store.
//!
//! The store has no read-modify-write primitive, so every mutation re-reads
//! the current document from its public URL, applies the change and writes
//! the whole document back. Acceptable for human-paced admin edits.

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::blob::{BlobError, ObjectStore};
use crate::sync::JsonFetch;

use super::types::{sort_listing, PromoImage, Server, ServerDraft};

pub const SERVERS_KEY: &str = "servers.json";
pub const WALLPAPER_DATA_KEY: &str = "wallpaper-data.json";
pub const BANNER_DATA_KEY: &str = "banner-data.json";

const WALLPAPER_PREFIX: &str = "wallpaper-";
const BANNER_PREFIX: &str = "banner-";

#[derive(Debug, Error)]
pub enum ListingError {
  #[error("server {0} not found")]
  NotFound(String),
  #[error("no image file provided")]
  MissingFile,
  #[error(transparent)]
  Blob(#[from] BlobError),
  #[error("{0}")]
  Fetch(String),
  #[error("invalid document: {0}")]
  Document(#[from] serde_json::Error),
  #[error("object store API is not configured")]
  NotConfigured,
}

pub type Result<T> = std::result::Result<T, ListingError>;

/// An image file submitted for upload.
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: String,
  pub bytes: Vec<u8>,
  pub content_type: String,
}

/// Client for the admin write endpoints. Reads go through the same public
/// URLs the sync layer uses.
pub struct DirectoryClient {
  store: Arc<dyn ObjectStore>,
  fetch: Arc<dyn JsonFetch>,
}

impl DirectoryClient {
  pub fn new(store: Arc<dyn ObjectStore>, fetch: Arc<dyn JsonFetch>) -> Self {
    Self { store, fetch }
  }

  /// Current document at `key`, or `None` when absent.
  async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let blobs = self.store.list(key).await?;
    let Some(blob) = blobs.first() else {
      return Ok(None);
    };

    match self.fetch.fetch_json(blob.url.clone()).await {
      Ok(Some(value)) if !value.is_null() => Ok(Some(serde_json::from_value(value)?)),
      Ok(Some(_)) => Ok(None),
      // The store listed the document but its URL did not serve it. Calling
      // that "absent" would let a read-modify-write clobber the stored
      // collection, so it is an error instead.
      Ok(None) => Err(ListingError::Fetch(format!(
        "{} is listed but could not be read",
        blob.url
      ))),
      Err(message) => Err(ListingError::Fetch(message)),
    }
  }

  async fn write_servers(&self, servers: &[Server]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(servers)?;
    self
      .store
      .put(SERVERS_KEY, bytes, "application/json")
      .await?;
    Ok(())
  }

  /// The full listing, VIP first. A missing document is an empty listing.
  pub async fn servers(&self) -> Result<Vec<Server>> {
    let mut servers = self
      .read_json::<Vec<Server>>(SERVERS_KEY)
      .await?
      .unwrap_or_default();
    sort_listing(&mut servers);
    Ok(servers)
  }

  pub async fn add_server(&self, draft: ServerDraft) -> Result<Server> {
    let mut servers = self
      .read_json::<Vec<Server>>(SERVERS_KEY)
      .await?
      .unwrap_or_default();

    let server = Server {
      id: Uuid::new_v4().to_string(),
      name: draft.name,
      url: draft.url,
      rate: draft.rate,
      chronicle: draft.chronicle,
      opening_date: draft.opening_date,
      is_vip: draft.is_vip,
      created_at: Utc::now(),
    };

    servers.push(server.clone());
    self.write_servers(&servers).await?;
    Ok(server)
  }

  /// Remove a listing by id and return what remains. An unknown id is a
  /// distinct not-found condition and the stored collection is left
  /// untouched.
  pub async fn delete_server(&self, id: &str) -> Result<Vec<Server>> {
    let servers = self
      .read_json::<Vec<Server>>(SERVERS_KEY)
      .await?
      .unwrap_or_default();

    if !servers.iter().any(|s| s.id == id) {
      return Err(ListingError::NotFound(id.to_string()));
    }

    let remaining: Vec<Server> = servers.into_iter().filter(|s| s.id != id).collect();
    self.write_servers(&remaining).await?;
    Ok(remaining)
  }

  pub async fn wallpaper(&self) -> Result<Option<PromoImage>> {
    self.read_json(WALLPAPER_DATA_KEY).await
  }

  pub async fn banner(&self) -> Result<Option<PromoImage>> {
    self.read_json(BANNER_DATA_KEY).await
  }

  pub async fn set_wallpaper(
    &self,
    image: Option<Upload>,
    link_url: Option<String>,
    valid_until: Option<NaiveDate>,
  ) -> Result<PromoImage> {
    self
      .set_media(WALLPAPER_PREFIX, WALLPAPER_DATA_KEY, image, link_url, valid_until)
      .await
  }

  pub async fn set_banner(
    &self,
    image: Option<Upload>,
    link_url: Option<String>,
    valid_until: Option<NaiveDate>,
  ) -> Result<PromoImage> {
    self
      .set_media(BANNER_PREFIX, BANNER_DATA_KEY, image, link_url, valid_until)
      .await
  }

  pub async fn clear_wallpaper(&self) -> Result<()> {
    self.clear_media(WALLPAPER_PREFIX, WALLPAPER_DATA_KEY).await
  }

  pub async fn clear_banner(&self) -> Result<()> {
    self.clear_media(BANNER_PREFIX, BANNER_DATA_KEY).await
  }

  async fn set_media(
    &self,
    prefix: &str,
    data_key: &str,
    image: Option<Upload>,
    link_url: Option<String>,
    valid_until: Option<NaiveDate>,
  ) -> Result<PromoImage> {
    let image = image.ok_or(ListingError::MissingFile)?;

    // Replace, never accumulate: drop every previous image first
    for blob in self.store.list(prefix).await? {
      self.store.delete(&blob.pathname).await?;
    }

    let key = format!(
      "{}{}-{}",
      prefix,
      Utc::now().timestamp_millis(),
      image.filename
    );
    let url = self.store.put(&key, image.bytes, &image.content_type).await?;

    let data = PromoImage {
      url,
      link_url,
      valid_until,
      uploaded_at: Utc::now(),
    };
    let bytes = serde_json::to_vec(&data)?;
    self.store.put(data_key, bytes, "application/json").await?;

    Ok(data)
  }

  async fn clear_media(&self, prefix: &str, data_key: &str) -> Result<()> {
    for blob in self.store.list(prefix).await? {
      self.store.delete(&blob.pathname).await?;
    }
    for blob in self.store.list(data_key).await? {
      self.store.delete(&blob.pathname).await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blob::MemoryObjectStore;
  use crate::sync::OfflineFetch;

  fn client() -> (DirectoryClient, Arc<MemoryObjectStore>) {
    let store = Arc::new(MemoryObjectStore::new());
    let as_store: Arc<dyn ObjectStore> = Arc::clone(&store) as _;
    let as_fetch: Arc<dyn JsonFetch> = Arc::clone(&store) as _;
    (DirectoryClient::new(as_store, as_fetch), store)
  }

  fn draft(name: &str, opening: &str, vip: bool) -> ServerDraft {
    ServerDraft {
      name: name.to_string(),
      url: format!("https://{}.example", name),
      rate: "x10".to_string(),
      chronicle: "Interlude".to_string(),
      opening_date: opening.parse().unwrap(),
      is_vip: vip,
    }
  }

  #[tokio::test]
  async fn test_missing_listing_document_is_empty_listing() {
    let (client, _store) = client();
    assert_eq!(client.servers().await.unwrap(), vec![]);
  }

  #[tokio::test]
  async fn test_add_server_assigns_id_and_created_at() {
    let (client, _store) = client();

    let before = Utc::now();
    let server = client.add_server(draft("aria", "2025-09-01", false)).await.unwrap();

    assert!(!server.id.is_empty());
    assert!(server.created_at >= before);
    assert_eq!(server.name, "aria");

    let listed = client.servers().await.unwrap();
    assert_eq!(listed, vec![server]);
  }

  #[tokio::test]
  async fn test_listing_is_sorted_vip_first() {
    let (client, _store) = client();
    client.add_server(draft("plain", "2025-07-01", false)).await.unwrap();
    client.add_server(draft("vip", "2025-09-01", true)).await.unwrap();

    let listed = client.servers().await.unwrap();
    let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["vip", "plain"]);
  }

  #[tokio::test]
  async fn test_delete_unknown_server_is_not_found_and_keeps_listing() {
    let (client, _store) = client();
    let server = client.add_server(draft("aria", "2025-09-01", false)).await.unwrap();

    let err = client.delete_server("no-such-id").await.unwrap_err();
    assert!(matches!(err, ListingError::NotFound(_)));
    assert_eq!(client.servers().await.unwrap(), vec![server.clone()]);

    let remaining = client.delete_server(&server.id).await.unwrap();
    assert_eq!(remaining, vec![]);
    assert_eq!(client.servers().await.unwrap(), vec![]);
  }

  #[tokio::test]
  async fn test_unreadable_listing_document_fails_instead_of_clobbering() {
    let (client, store) = client();
    let existing = client
      .add_server(draft("existing", "2025-08-01", false))
      .await
      .unwrap();

    // Same store, but a fetcher that cannot resolve the listed document.
    // The write must fail rather than treat the listing as absent and
    // replace it with just the new record.
    let broken = DirectoryClient::new(
      Arc::clone(&store) as Arc<dyn ObjectStore>,
      Arc::new(OfflineFetch),
    );
    let err = broken
      .add_server(draft("new", "2025-09-01", false))
      .await
      .unwrap_err();
    assert!(matches!(err, ListingError::Fetch(_)));

    assert_eq!(client.servers().await.unwrap(), vec![existing]);
  }

  #[tokio::test]
  async fn test_set_wallpaper_replaces_old_image() {
    let (client, store) = client();
    store
      .put("wallpaper-0-old.png", b"old".to_vec(), "image/png")
      .await
      .unwrap();

    let before = Utc::now();
    let data = client
      .set_wallpaper(
        Some(Upload {
          filename: "new.png".to_string(),
          bytes: b"new".to_vec(),
          content_type: "image/png".to_string(),
        }),
        Some("https://x.example".to_string()),
        Some("2025-12-31".parse().unwrap()),
      )
      .await
      .unwrap();

    assert_eq!(data.link_url.as_deref(), Some("https://x.example"));
    assert_eq!(data.valid_until, Some("2025-12-31".parse().unwrap()));
    assert!(data.uploaded_at >= before);
    assert!(data.url.contains("new.png"));

    // Old image gone, exactly one image blob left
    assert!(!store.contains("wallpaper-0-old.png"));
    let images = store.list("wallpaper-").await.unwrap();
    let images: Vec<_> = images
      .iter()
      .filter(|b| b.pathname != WALLPAPER_DATA_KEY)
      .collect();
    assert_eq!(images.len(), 1);

    // Subsequent read returns the same metadata
    assert_eq!(client.wallpaper().await.unwrap(), Some(data));
  }

  #[tokio::test]
  async fn test_set_wallpaper_without_file_is_rejected() {
    let (client, _store) = client();
    let err = client.set_wallpaper(None, None, None).await.unwrap_err();
    assert!(matches!(err, ListingError::MissingFile));
  }

  #[tokio::test]
  async fn test_clear_banner_removes_image_and_metadata() {
    let (client, store) = client();
    client
      .set_banner(
        Some(Upload {
          filename: "b.png".to_string(),
          bytes: b"img".to_vec(),
          content_type: "image/png".to_string(),
        }),
        None,
        None,
      )
      .await
      .unwrap();
    assert!(client.banner().await.unwrap().is_some());

    client.clear_banner().await.unwrap();
    assert_eq!(client.banner().await.unwrap(), None);
    assert!(store.is_empty());
  }
}
