use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the agent serves, e.g. `http://localhost:8080`
  pub origin: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub queue: QueueConfig,
  /// Directory holding the cache and queue databases (defaults to the XDG data dir)
  pub storage_dir: Option<PathBuf>,
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
  /// Optional log file; rotated daily
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current cache generation
  pub version: String,
  /// Root-relative paths fetched at install time
  pub assets: Vec<String>,
  /// Page served to navigation requests that fail at the network layer
  pub offline_page: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "drawchat-v1".to_string(),
      assets: [
        "/",
        "/index.html",
        "/styles.css",
        "/app.js",
        "/manifest.json",
        "/offline-page.html",
        "/NoahCapstone.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      offline_page: "/offline-page.html".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Path queued messages are POSTed to
  pub endpoint: String,
  /// Sync tag that triggers a flush
  pub sync_tag: String,
  pub store_name: String,
  pub store_version: u32,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      endpoint: "/api/messages".to_string(),
      sync_tag: "sync-messages".to_string(),
      store_name: "MessageQueue".to_string(),
      store_version: 1,
    }
  }
}

fn default_request_timeout() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./drawchat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/drawchat/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/drawchat/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("drawchat.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("drawchat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;

    let paths = self
      .cache
      .assets
      .iter()
      .chain([&self.cache.offline_page, &self.queue.endpoint]);
    for path in paths {
      if !path.starts_with('/') {
        return Err(eyre!("Path must be root-relative: {}", path));
      }
    }

    if self.cache.version.is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    Ok(())
  }

  /// The configured origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    let url =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if !url.has_host() {
      return Err(eyre!("Origin has no host: {}", self.origin));
    }
    Ok(url)
  }

  /// Directory for the SQLite stores.
  pub fn storage_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.storage_dir {
      return Ok(dir.clone());
    }
    crate::db::default_dir()
  }

  pub fn cache_db_path(&self) -> Result<PathBuf> {
    Ok(self.storage_dir()?.join("cache.db"))
  }

  pub fn queue_db_path(&self) -> Result<PathBuf> {
    Ok(
      self
        .storage_dir()?
        .join(format!("{}.db", self.queue.store_name)),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("origin: http://localhost:8080\n").unwrap();
    assert_eq!(config.cache.version, "drawchat-v1");
    assert_eq!(config.cache.assets.len(), 7);
    assert_eq!(config.cache.offline_page, "/offline-page.html");
    assert_eq!(config.queue.endpoint, "/api/messages");
    assert_eq!(config.queue.sync_tag, "sync-messages");
    assert_eq!(config.request_timeout_secs, 30);
  }

  #[test]
  fn test_partial_section_keeps_other_defaults() {
    let yaml = "origin: https://chat.example\ncache:\n  version: drawchat-v2\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.cache.version, "drawchat-v2");
    assert_eq!(config.cache.offline_page, "/offline-page.html");
  }

  #[test]
  fn test_missing_origin_is_rejected() {
    assert!(Config::from_yaml("cache:\n  version: v1\n").is_err());
  }

  #[test]
  fn test_relative_asset_is_rejected() {
    let yaml = "origin: http://localhost\ncache:\n  assets: [\"index.html\"]\n";
    assert!(Config::from_yaml(yaml).is_err());
  }

  #[test]
  fn test_queue_db_path_uses_store_name() {
    let yaml = "origin: http://localhost\nstorage_dir: /tmp/dc\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(
      config.queue_db_path().unwrap(),
      PathBuf::from("/tmp/dc/MessageQueue.db")
    );
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
    assert_eq!(config.origin, "http://localhost:8080");
    assert_eq!(config.queue.store_version, 1);
  }

  #[test]
  fn test_explicit_missing_path_errors() {
    assert!(Config::load(Some(Path::new("/nonexistent/drawchat.yaml"))).is_err());
  }
}
