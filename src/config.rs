//! Configuration for ytrelay.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (YTRELAY_HOME, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID)
//! 2. Config file (`--config <path>` or .ytrelay/config.yaml)
//! 3. Defaults (~/.ytrelay)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ytrelay/config.yaml
//! - `paths.home` is relative to the .ytrelay/ directory; `downloads` and
//!   `history` are relative to home
//!
//! The result is resolved once at startup and handed to whoever needs it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::SplitPolicy;
use crate::domain::Quality;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub version: Option<String>,
    pub paths: PathsConfig,
    pub telegram: TelegramConfig,
    pub youtube: YouTubeConfig,
    pub fetcher: FetcherConfig,
    pub split: SplitPolicy,
    pub poller: PollerConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .ytrelay/)
    pub home: Option<String>,
    /// Download root (relative to home)
    pub downloads: Option<String>,
    /// Processed-item history file (relative to home)
    pub history: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// Send fatal errors to the chat before exiting
    pub report_errors: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            report_errors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    /// Latest uploads checked per subscribed channel
    pub uploads_per_channel: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            uploads_per_channel: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Downloader executable
    pub binary: String,
    /// Resolution cap for discovered uploads
    pub default_quality: Quality,
    /// Kill downloads running longer than this
    pub timeout_secs: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            default_quality: Quality::default(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub max_concurrent_pipelines: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 150,
            max_concurrent_pipelines: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Restarts after a fatal cycle error; 0 exits on the first one
    pub max_restarts: u32,
    pub restart_delay_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 0,
            restart_delay_secs: 30,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// State directory
    pub home: PathBuf,
    /// Root for per-pipeline working directories
    pub downloads_dir: PathBuf,
    /// Processed-item history file
    pub history_file: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub telegram: TelegramConfig,
    pub youtube: YouTubeConfig,
    pub fetcher: FetcherConfig,
    pub split: SplitPolicy,
    pub poller: PollerConfig,
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// An explicit path must exist; otherwise the current directory and its
    /// parents are searched.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".ytrelay");

        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        let file = match config_path {
            Some(path) => {
                let parsed = load_config_file(&path)?;
                Some((path, parsed))
            }
            None => None,
        };

        Ok(Self::resolve(file, default_home, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file, environment lookups and defaults
    pub fn resolve(
        file: Option<(PathBuf, ConfigFile)>,
        default_home: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let (config_file, parsed) = match file {
            Some((path, parsed)) => (Some(path), parsed),
            None => (None, ConfigFile::default()),
        };

        // home is relative to .ytrelay/
        let config_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));

        let home = if let Some(env_home) = env("YTRELAY_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = parsed.paths.home {
            resolve_path(config_dir, home_path)
        } else {
            default_home
        };

        let downloads_dir = parsed
            .paths
            .downloads
            .as_deref()
            .map(|p| resolve_path(&home, p))
            .unwrap_or_else(|| home.join("downloads"));

        let history_file = parsed
            .paths
            .history
            .as_deref()
            .map(|p| resolve_path(&home, p))
            .unwrap_or_else(|| home.join("history"));

        let mut telegram = parsed.telegram;
        if let Some(token) = env("TELEGRAM_BOT_TOKEN") {
            telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = env("TELEGRAM_CHAT_ID") {
            telegram.chat_id = Some(chat_id);
        }

        Self {
            home,
            downloads_dir,
            history_file,
            config_file,
            telegram,
            youtube: parsed.youtube,
            fetcher: parsed.fetcher,
            split: parsed.split,
            poller: parsed.poller,
            supervisor: parsed.supervisor,
        }
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "********".to_string());

        let mut shown = self.clone();
        shown.telegram.bot_token = mask(&self.telegram.bot_token);
        shown.youtube.client_secret = mask(&self.youtube.client_secret);
        shown.youtube.refresh_token = mask(&self.youtube.refresh_token);
        shown
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".ytrelay").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
