mod app;
mod blob;
mod config;
mod listing;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blob::HttpObjectStore;
use config::Config;
use listing::{
  DirectoryClient, ListingError, ServerDraft, SyncedDirectory, Upload, CHRONICLES, RATES,
};
use sync::{
  HttpFetch, JsonFetch, OfflineFetch, SqliteVersionStore, SubscribeOptions, SyncHandle, SyncStore,
  SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "l2dex")]
#[command(about = "Lineage II private-server directory client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/l2dex/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the current server listing
  List,
  /// Keep the listing on screen, refreshing in the background
  Watch,
  /// Add a server listing
  AddServer {
    #[arg(long)]
    name: String,
    #[arg(long)]
    url: String,
    /// Experience rate tier, e.g. x10
    #[arg(long)]
    rate: String,
    /// Chronicle version, e.g. Interlude
    #[arg(long)]
    chronicle: String,
    /// Opening date (YYYY-MM-DD)
    #[arg(long)]
    opening_date: chrono::NaiveDate,
    /// Mark the listing as VIP
    #[arg(long)]
    vip: bool,
  },
  /// Delete a server listing by id
  DeleteServer { id: String },
  /// Upload the home wallpaper
  SetWallpaper {
    /// Image file to upload
    file: PathBuf,
    /// URL the wallpaper links to
    #[arg(long)]
    link_url: Option<String>,
    /// Last day the image should be shown (YYYY-MM-DD)
    #[arg(long)]
    valid_until: Option<chrono::NaiveDate>,
  },
  /// Remove the home wallpaper
  ClearWallpaper,
  /// Upload the side banner
  SetBanner {
    /// Image file to upload
    file: PathBuf,
    /// URL the banner links to
    #[arg(long)]
    link_url: Option<String>,
    /// Last day the image should be shown (YYYY-MM-DD)
    #[arg(long)]
    valid_until: Option<chrono::NaiveDate>,
  },
  /// Remove the side banner
  ClearBanner,
}

impl Command {
  fn needs_write_access(&self) -> bool {
    !matches!(self, Command::List | Command::Watch)
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;

  let versions = SqliteVersionStore::open()?;
  let store = Arc::new(SyncStore::new(Box::new(versions), Box::new(SystemClock)));

  let fetcher: Arc<dyn JsonFetch> = if config.blob_base_url.is_some() {
    Arc::new(HttpFetch::new())
  } else {
    Arc::new(OfflineFetch)
  };

  let sync = SyncHandle::new(
    Arc::clone(&store),
    Arc::clone(&fetcher),
    config.blob_base_url.clone(),
  );

  let opts = SubscribeOptions {
    no_cache: false,
    interval: config
      .poll_interval_secs
      .map(|secs| chrono::Duration::seconds(secs as i64)),
  };
  let mut dir = SyncedDirectory::new(&sync, opts);

  if args.command.needs_write_access() {
    let api_url = config.blob_api_url.as_deref().ok_or_else(|| {
      eyre!("blob_api_url is not configured; set it in the config file or L2DEX_BLOB_API_URL")
    })?;
    let token = Config::store_token()?;
    let object_store = Arc::new(HttpObjectStore::new(api_url, token));
    // The write client reads via the URLs `list` returns, not the public
    // base URL, so it always gets a real HTTP fetcher. The offline fallback
    // would report every document as absent and the read-modify-write flows
    // would overwrite the stored collection.
    dir = dir.with_client(DirectoryClient::new(object_store, Arc::new(HttpFetch::new())));
  }

  match args.command {
    Command::List => {
      dir.settle().await;
      if let Some(err) = dir.servers_error() {
        return Err(eyre!("failed to load listing: {}", err));
      }
      app::print_listing(&dir.servers());
    }

    Command::Watch => app::run(dir, store).await?,

    Command::AddServer {
      name,
      url,
      rate,
      chronicle,
      opening_date,
      vip,
    } => {
      if !RATES.contains(&rate.as_str()) {
        return Err(eyre!("unknown rate {:?}; known rates: {}", rate, RATES.join(", ")));
      }
      if !CHRONICLES.contains(&chronicle.as_str()) {
        return Err(eyre!(
          "unknown chronicle {:?}; known chronicles: {}",
          chronicle,
          CHRONICLES.join(", ")
        ));
      }

      dir.settle().await;
      let server = dir
        .add_server(ServerDraft {
          name,
          url,
          rate,
          chronicle,
          opening_date,
          is_vip: vip,
        })
        .await
        .map_err(|e| eyre!("failed to add server: {}", e))?;
      println!("added {} ({})", server.name, server.id);
    }

    Command::DeleteServer { id } => {
      dir.settle().await;
      match dir.delete_server(&id).await {
        Ok(()) => println!("deleted {}", id),
        Err(ListingError::NotFound(_)) => {
          return Err(eyre!("no listing with id {}", id));
        }
        Err(e) => return Err(eyre!("failed to delete server: {}", e)),
      }
    }

    Command::SetWallpaper {
      file,
      link_url,
      valid_until,
    } => {
      dir.settle().await;
      let upload = read_upload(&file)?;
      let data = dir
        .set_wallpaper(Some(upload), link_url, valid_until)
        .await
        .map_err(|e| eyre!("failed to upload wallpaper: {}", e))?;
      println!("wallpaper set: {}", data.url);
    }

    Command::ClearWallpaper => {
      dir.settle().await;
      dir
        .clear_wallpaper()
        .await
        .map_err(|e| eyre!("failed to clear wallpaper: {}", e))?;
      println!("wallpaper cleared");
    }

    Command::SetBanner {
      file,
      link_url,
      valid_until,
    } => {
      dir.settle().await;
      let upload = read_upload(&file)?;
      let data = dir
        .set_banner(Some(upload), link_url, valid_until)
        .await
        .map_err(|e| eyre!("failed to upload banner: {}", e))?;
      println!("banner set: {}", data.url);
    }

    Command::ClearBanner => {
      dir.settle().await;
      dir
        .clear_banner()
        .await
        .map_err(|e| eyre!("failed to clear banner: {}", e))?;
      println!("banner cleared");
    }
  }

  Ok(())
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("l2dex");
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::daily(&log_dir, "l2dex.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn read_upload(path: &Path) -> Result<Upload> {
  let bytes =
    std::fs::read(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;

  let filename = path
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("image")
    .to_string();

  let content_type = match path.extension().and_then(|e| e.to_str()) {
    Some("png") => "image/png",
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "application/octet-stream",
  }
  .to_string();

  Ok(Upload {
    filename,
    bytes,
    content_type,
  })
}
