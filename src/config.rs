use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_SUFFIX: &str = "/api/v3";
const SECS_PER_HOUR: u64 = 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// Instance root, e.g. "https://lemmy.world". "/api/v3" is appended if absent.
  #[serde(default = "default_base_url", deserialize_with = "deserialize_base_url")]
  pub base_url: String,
  /// Communities to archive, as `name@instance`, synced in this order
  pub communities: Vec<String>,
  /// Directory holding one `posts_<community>.jsonl` per community
  #[serde(default = "default_data_dir")]
  pub data_dir: PathBuf,
  #[serde(default = "default_requests_file")]
  pub requests_file: PathBuf,
  /// Number of listing pages fetched per community per cycle
  #[serde(default = "default_max_page")]
  pub max_page: u32,
  /// Posts requested per listing page
  #[serde(default = "default_list_limit")]
  pub list_limit: u32,
  /// Hours between the end of one cycle and the start of the next
  #[serde(default = "default_sync_interval")]
  pub sync_interval: u64,
  /// Minimum seconds between two remote calls
  #[serde(default = "default_request_interval")]
  pub request_interval: u64,
  /// Posts younger than this many hours are left for a later cycle
  #[serde(default = "default_min_post_age")]
  pub min_post_age: i64,
  #[serde(default)]
  pub age_granularity: AgeGranularity,
  /// Seconds to wait after a community fails before moving on
  #[serde(default = "default_error_backoff")]
  pub error_backoff: u64,
  /// Optional directory for daily-rolled log files
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgeGranularity {
  /// Age is counted in whole elapsed hours
  #[default]
  Hours,
  /// Age is counted in whole elapsed days, then compared as days * 24 hours
  Days,
}

fn default_base_url() -> String {
  normalize_base_url("https://reddthat.com")
}

fn default_data_dir() -> PathBuf {
  PathBuf::from("data")
}

fn default_requests_file() -> PathBuf {
  PathBuf::from("data/requests.jsonl")
}

fn default_max_page() -> u32 {
  2
}

fn default_list_limit() -> u32 {
  50
}

fn default_sync_interval() -> u64 {
  12
}

fn default_request_interval() -> u64 {
  20
}

fn default_min_post_age() -> i64 {
  24
}

fn default_error_backoff() -> u64 {
  30
}

fn deserialize_base_url<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let s = String::deserialize(deserializer)?;
  Ok(normalize_base_url(&s))
}

/// Strip trailing slashes and make sure the URL ends with the v3 API prefix.
pub fn normalize_base_url(url: &str) -> String {
  let trimmed = url.trim().trim_end_matches('/');
  if trimmed.ends_with(API_SUFFIX) {
    trimmed.to_string()
  } else {
    format!("{}{}", trimmed, API_SUFFIX)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lemmy-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lemmy-sync/config.yaml
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
        "No configuration file found. Create ./lemmy-sync.yaml or \
         ~/.config/lemmy-sync/config.yaml listing at least `communities`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("lemmy-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lemmy-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.communities.is_empty() {
      return Err(eyre!("`communities` must list at least one community"));
    }
    if self.max_page == 0 {
      return Err(eyre!("`max_page` must be at least 1"));
    }
    if self.list_limit == 0 {
      return Err(eyre!("`list_limit` must be at least 1"));
    }
    if self.min_post_age < 0 {
      return Err(eyre!("`min_post_age` cannot be negative"));
    }
    if chrono::Duration::try_hours(self.min_post_age).is_none() {
      return Err(eyre!("`min_post_age` is out of range: {}", self.min_post_age));
    }
    if self.sync_interval.checked_mul(SECS_PER_HOUR).is_none() {
      return Err(eyre!("`sync_interval` is out of range: {}", self.sync_interval));
    }
    Ok(())
  }

  pub fn sync_interval(&self) -> Duration {
    Duration::from_secs(self.sync_interval.saturating_mul(SECS_PER_HOUR))
  }

  pub fn request_interval(&self) -> Duration {
    Duration::from_secs(self.request_interval)
  }

  pub fn error_backoff(&self) -> Duration {
    Duration::from_secs(self.error_backoff)
  }

  pub fn min_post_age(&self) -> chrono::Duration {
    chrono::Duration::try_hours(self.min_post_age).unwrap_or(chrono::Duration::MAX)
  }
}
