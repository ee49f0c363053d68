use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Override for the data directory (database, shell cache, logs).
  pub data_dir: Option<PathBuf>,
  #[serde(default)]
  pub timeouts: TimeoutConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub shell: ShellConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the story service, e.g. "https://stories.example.com/v1/".
  pub url: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
  /// Timeout for reads (fetching the story collection), in seconds.
  pub read_secs: u64,
  /// Timeout for uploads carrying binary payloads, in seconds.
  pub upload_secs: u64,
}

impl Default for TimeoutConfig {
  fn default() -> Self {
    Self {
      read_secs: 10,
      upload_secs: 30,
    }
  }
}

/// Retry policy shared by the sync engine's per-record attempts.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 2,
      delay_ms: 500,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
  /// Origin the app shell is served from, e.g. "http://localhost:8080".
  /// Required only by the shell-install command.
  pub origin: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storymap.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storymap/config.yaml
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
        "No configuration file found. Create one at ~/.config/storymap/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storymap.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storymap").join("config.yaml");
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

  /// Get the story service API token from environment variables.
  ///
  /// Checks STORYMAP_API_TOKEN first, then STORY_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("STORYMAP_API_TOKEN")
      .or_else(|_| std::env::var("STORY_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set STORYMAP_API_TOKEN or STORY_API_TOKEN environment variable.")
      })
  }

  /// Resolve the data directory: the configured override, or the platform
  /// data dir.
  pub fn resolve_data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("storymap"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}
