use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CacheSettings, FetchPolicy};
use crate::db::Database;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Where the task and cache databases live (defaults to $XDG_DATA_HOME/tasklet)
  pub data_dir: Option<PathBuf>,
  pub cache: CacheConfig,
  pub connectivity: ConnectivityConfig,
  pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is cached and every request goes to the network
  pub enabled: bool,
  /// Bucket name; bump it to invalidate everything cached so far
  pub name: String,
  /// Origin the proxy forwards to and manifest paths are resolved against
  pub origin: String,
  /// Assets pre-cached at install time
  pub manifest: Vec<String>,
  /// Page served when both cache and network fail (should be in the manifest)
  pub offline_page: String,
  pub policy: FetchPolicy,
  /// Network deadline per request; unset means wait indefinitely
  pub request_timeout_secs: Option<u64>,
  /// Address `tasklet serve` listens on
  pub listen: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      name: "todo-app-cache-v1".to_string(),
      origin: "http://localhost:5173".to_string(),
      manifest: [
        "/",
        "/index.html",
        "/todo.png",
        "/icon.png",
        "/manifest.json",
        "/src/main.tsx",
        "/src/App.tsx",
        "/offline.html",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      offline_page: "/offline.html".to_string(),
      policy: FetchPolicy::CacheFirst,
      request_timeout_secs: None,
      listen: "127.0.0.1:4173".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// URL probed for reachability (defaults to the cache origin)
  pub probe_url: Option<String>,
  pub interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_url: None,
      interval_secs: 5,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
  /// How long notifications stay on screen
  pub toast_secs: u64,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self { toast_secs: 3 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tasklet.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tasklet/config.yaml
  ///
  /// Without any config file the defaults are used.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tasklet.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tasklet").join("config.yaml");
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

    config
      .origin()
      .and(config.probe_url())
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => Database::default_dir(),
    }
  }

  pub fn tasks_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("tasks.db"))
  }

  pub fn cache_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("cache.db"))
  }

  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("logs"))
  }

  pub fn origin(&self) -> Result<Url> {
    Url::parse(&self.cache.origin)
      .map_err(|e| eyre!("Invalid cache origin '{}': {}", self.cache.origin, e))
  }

  pub fn cache_settings(&self) -> Result<CacheSettings> {
    Ok(CacheSettings {
      cache_name: self.cache.name.clone(),
      origin: self.origin()?,
      manifest: self.cache.manifest.clone(),
      offline_page: self.cache.offline_page.clone(),
      policy: self.cache.policy,
    })
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self.cache.request_timeout_secs.map(Duration::from_secs)
  }

  /// URL the connectivity observer probes; the cache origin unless overridden
  pub fn probe_url(&self) -> Result<Url> {
    match &self.connectivity.probe_url {
      Some(url) => Url::parse(url).map_err(|e| eyre!("Invalid probe url '{}': {}", url, e)),
      None => self.origin(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert!(config.cache.enabled);
    assert_eq!(config.cache.name, "todo-app-cache-v1");
    assert_eq!(config.cache.policy, FetchPolicy::CacheFirst);
    assert!(config.cache.manifest.contains(&config.cache.offline_page));
    assert_eq!(config.request_timeout(), None);
    assert_eq!(config.probe_url().unwrap(), config.origin().unwrap());
    assert_eq!(config.cache_settings().unwrap().origin.as_str(), "http://localhost:5173/");
    assert_eq!(config.ui.toast_secs, 3);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "data_dir: /tmp/tasklet-test\ncache:\n  name: todo-app-cache-v2\n  policy: network-first\n  request_timeout_secs: 10\n"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.name, "todo-app-cache-v2");
    assert_eq!(config.cache.policy, FetchPolicy::NetworkFirst);
    assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
    assert_eq!(config.cache.offline_page, "/offline.html");
    assert_eq!(
      config.tasks_db_path().unwrap(),
      PathBuf::from("/tmp/tasklet-test/tasks.db")
    );
    assert_eq!(config.connectivity.interval_secs, 5);
  }

  #[test]
  fn test_missing_explicit_file_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/tasklet.yaml"))).is_err());
  }

  #[test]
  fn test_invalid_origin_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache:\n  origin: not a url\n").unwrap();
    assert!(Config::load(Some(file.path())).is_err());
  }
}
