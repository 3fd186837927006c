//! Directory facade combining the sync-layer subscriptions with the admin
//! write client.
//!
//! Reads always come from the subscriptions; every successful write is
//! followed by `revalidate()` and an optimistic `mutate()` so the visible
//! state reflects the change before the edge cache catches up.

use crate::sync::{SubscribeOptions, Subscription, SyncHandle, Trigger};

use super::client::{
  DirectoryClient, ListingError, Result, Upload, BANNER_DATA_KEY, SERVERS_KEY, WALLPAPER_DATA_KEY,
};
use super::types::{sort_listing, PromoImage, Server, ServerDraft};
use chrono::NaiveDate;

pub struct SyncedDirectory {
  client: Option<DirectoryClient>,
  servers: Subscription<Vec<Server>>,
  wallpaper: Subscription<PromoImage>,
  banner: Subscription<PromoImage>,
}

impl SyncedDirectory {
  pub fn new(sync: &SyncHandle, opts: SubscribeOptions) -> Self {
    Self {
      client: None,
      servers: sync.subscribe(SERVERS_KEY, opts.clone()),
      wallpaper: sync.subscribe(WALLPAPER_DATA_KEY, opts.clone()),
      banner: sync.subscribe(BANNER_DATA_KEY, opts),
    }
  }

  /// Attach the write client. Without it every mutation reports
  /// [`ListingError::NotConfigured`].
  pub fn with_client(mut self, client: DirectoryClient) -> Self {
    self.client = Some(client);
    self
  }

  fn client(&self) -> Result<&DirectoryClient> {
    self.client.as_ref().ok_or(ListingError::NotConfigured)
  }

  /// Advance time-based refetch work on all subscriptions.
  pub fn tick(&mut self) {
    self.servers.tick();
    self.wallpaper.tick();
    self.banner.tick();
  }

  /// Commit any completed fetches; true when something visible changed.
  pub fn poll(&mut self) -> bool {
    // Non-short-circuiting: every subscription gets its poll
    self.servers.poll() | self.wallpaper.poll() | self.banner.poll()
  }

  /// Forward an external revalidation trigger to every subscription.
  pub fn notify(&mut self, trigger: Trigger) {
    self.servers.notify(trigger);
    self.wallpaper.notify(trigger);
    self.banner.notify(trigger);
  }

  /// Await all in-flight fetches; for one-shot CLI commands.
  pub async fn settle(&mut self) {
    self.servers.settle().await;
    self.wallpaper.settle().await;
    self.banner.settle().await;
  }

  pub fn servers(&self) -> Vec<Server> {
    let mut servers = self.servers.data().cloned().unwrap_or_default();
    sort_listing(&mut servers);
    servers
  }

  pub fn servers_error(&self) -> Option<&str> {
    self.servers.error()
  }

  pub fn servers_loading(&self) -> bool {
    self.servers.is_loading()
  }

  pub fn wallpaper(&self) -> Option<PromoImage> {
    self.wallpaper.data().cloned()
  }

  pub fn banner(&self) -> Option<PromoImage> {
    self.banner.data().cloned()
  }

  pub async fn add_server(&mut self, draft: ServerDraft) -> Result<Server> {
    let server = self.client()?.add_server(draft).await?;

    self.servers.revalidate();
    let mut next = self.servers.data().cloned().unwrap_or_default();
    next.push(server.clone());
    sort_listing(&mut next);
    self.servers.mutate(Some(next));

    Ok(server)
  }

  pub async fn delete_server(&mut self, id: &str) -> Result<()> {
    let remaining = self.client()?.delete_server(id).await?;

    self.servers.revalidate();
    self.servers.mutate(Some(remaining));
    Ok(())
  }

  pub async fn set_wallpaper(
    &mut self,
    image: Option<Upload>,
    link_url: Option<String>,
    valid_until: Option<NaiveDate>,
  ) -> Result<PromoImage> {
    let data = self.client()?.set_wallpaper(image, link_url, valid_until).await?;

    self.wallpaper.revalidate();
    self.wallpaper.mutate(Some(data.clone()));
    Ok(data)
  }

  pub async fn clear_wallpaper(&mut self) -> Result<()> {
    self.client()?.clear_wallpaper().await?;

    self.wallpaper.revalidate();
    self.wallpaper.mutate(None);
    Ok(())
  }

  pub async fn set_banner(
    &mut self,
    image: Option<Upload>,
    link_url: Option<String>,
    valid_until: Option<NaiveDate>,
  ) -> Result<PromoImage> {
    let data = self.client()?.set_banner(image, link_url, valid_until).await?;

    self.banner.revalidate();
    self.banner.mutate(Some(data.clone()));
    Ok(data)
  }

  pub async fn clear_banner(&mut self) -> Result<()> {
    self.client()?.clear_banner().await?;

    self.banner.revalidate();
    self.banner.mutate(None);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::blob::{MemoryObjectStore, ObjectStore};
  use crate::sync::{JsonFetch, ManualClock, MemoryVersionStore, SyncStore};
  use chrono::{DateTime, Utc};
  use std::sync::Arc;

  fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  fn directory() -> (SyncedDirectory, SyncHandle) {
    let store = Arc::new(MemoryObjectStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let sync_store = Arc::new(SyncStore::new(
      Box::new(MemoryVersionStore::new()),
      Box::new(clock),
    ));
    let handle = SyncHandle::new(
      sync_store,
      Arc::clone(&store) as Arc<dyn JsonFetch>,
      Some(store.public_base().to_string()),
    );
    let client = DirectoryClient::new(
      Arc::clone(&store) as Arc<dyn ObjectStore>,
      Arc::clone(&store) as Arc<dyn JsonFetch>,
    );
    let dir = SyncedDirectory::new(&handle, SubscribeOptions::default()).with_client(client);
    (dir, handle)
  }

  fn draft(name: &str) -> ServerDraft {
    ServerDraft {
      name: name.to_string(),
      url: format!("https://{}.example", name),
      rate: "x10".to_string(),
      chronicle: "Interlude".to_string(),
      opening_date: "2025-09-01".parse().unwrap(),
      is_vip: false,
    }
  }

  #[tokio::test]
  async fn test_empty_store_reads_as_empty_listing() {
    let (mut dir, _handle) = directory();
    dir.settle().await;

    assert_eq!(dir.servers(), vec![]);
    assert!(!dir.servers_loading());
    assert_eq!(dir.servers_error(), None);
    assert_eq!(dir.wallpaper(), None);
  }

  #[tokio::test]
  async fn test_add_server_is_visible_before_refetch_lands() {
    let (mut dir, handle) = directory();
    dir.settle().await;

    let server = dir.add_server(draft("aria")).await.unwrap();

    // Optimistic mutate: visible immediately, no settle needed
    assert_eq!(dir.servers(), vec![server]);

    // Revalidate and mutate both bumped the listing's version counter
    let key = handle.key_for(SERVERS_KEY);
    assert_eq!(handle.store().version(&key), 2);
  }

  #[tokio::test]
  async fn test_delete_server_not_found_leaves_state_alone() {
    let (mut dir, _handle) = directory();
    dir.settle().await;
    let server = dir.add_server(draft("aria")).await.unwrap();

    let err = dir.delete_server("missing").await.unwrap_err();
    assert!(matches!(err, ListingError::NotFound(_)));
    assert_eq!(dir.servers(), vec![server.clone()]);

    dir.delete_server(&server.id).await.unwrap();
    assert_eq!(dir.servers(), vec![]);
  }

  #[tokio::test]
  async fn test_wallpaper_set_and_clear() {
    let (mut dir, _handle) = directory();
    dir.settle().await;

    let data = dir
      .set_wallpaper(
        Some(Upload {
          filename: "w.png".to_string(),
          bytes: b"img".to_vec(),
          content_type: "image/png".to_string(),
        }),
        Some("https://x.example".to_string()),
        None,
      )
      .await
      .unwrap();

    assert_eq!(dir.wallpaper(), Some(data));

    dir.clear_wallpaper().await.unwrap();
    assert_eq!(dir.wallpaper(), None);
  }

  #[tokio::test]
  async fn test_mutations_without_client_are_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let sync_store = Arc::new(SyncStore::new(
      Box::new(MemoryVersionStore::new()),
      Box::new(clock),
    ));
    let handle = SyncHandle::new(
      sync_store,
      Arc::clone(&store) as Arc<dyn JsonFetch>,
      Some(store.public_base().to_string()),
    );

    let mut dir = SyncedDirectory::new(&handle, SubscribeOptions::default());
    dir.settle().await;

    let err = dir.delete_server("x").await.unwrap_err();
    assert!(matches!(err, ListingError::NotConfigured));
  }
}
