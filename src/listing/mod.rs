//! Server directory domain: listing types, admin mutation flows, and the
//! synced facade that ties them to the sync layer.

mod client;
mod synced;
mod types;

pub use client::{
  DirectoryClient, ListingError, Upload, BANNER_DATA_KEY, SERVERS_KEY, WALLPAPER_DATA_KEY,
};
pub use synced::SyncedDirectory;
pub use types::{sort_listing, PromoImage, Server, ServerDraft, CHRONICLES, RATES};
