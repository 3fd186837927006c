use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Public root of the object store (the CDN-served base URL)
  pub blob_base_url: Option<String>,
  /// Write API root of the object store
  pub blob_api_url: Option<String>,
  /// Silent refetch cadence in seconds (default: 5 minutes; 0 disables)
  pub poll_interval_secs: Option<u64>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./l2dex.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/l2dex/config.yaml
  ///
  /// No config file is not an error: the defaults apply and reads degrade
  /// to "no data" until a blob base URL is configured.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    // Environment overrides the file
    if let Ok(base) = std::env::var("L2DEX_BLOB_BASE_URL") {
      config.blob_base_url = Some(base);
    }
    if let Ok(api) = std::env::var("L2DEX_BLOB_API_URL") {
      config.blob_api_url = Some(api);
    }

    if let Some(base) = &config.blob_base_url {
      if Url::parse(base).is_err() {
        warn!("ignoring invalid blob base URL: {}", base);
        config.blob_base_url = None;
      }
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("l2dex.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("l2dex").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the object store write token from the environment.
  pub fn store_token() -> Result<String> {
    std::env::var("L2DEX_BLOB_TOKEN").map_err(|_| {
      eyre!("Object store token not found. Set the L2DEX_BLOB_TOKEN environment variable.")
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_config_yaml() {
    let config: Config = serde_yaml::from_str(
      "blob_base_url: https://cdn.example\nblob_api_url: https://api.example/store\n",
    )
    .unwrap();

    assert_eq!(config.blob_base_url.as_deref(), Some("https://cdn.example"));
    assert_eq!(
      config.blob_api_url.as_deref(),
      Some("https://api.example/store")
    );
    assert_eq!(config.poll_interval_secs, None);
  }

  #[test]
  fn test_empty_config_is_valid() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.blob_base_url, None);
    assert_eq!(config.blob_api_url, None);
  }
}
