use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::feed::FeedSource;

pub const DEFAULT_IMAGE_URL: &str =
    "https://placehold.co/600x400/1a1a1a/e31010.png?text=CYBER+THREAT+ALERT";

pub const DEFAULT_FEEDS: [&str; 3] = [
    "https://feeds.feedburner.com/TheHackersNews",
    "https://www.cisa.gov/uscert/ncas/alerts.xml",
    "https://krebsonsecurity.com/feed/",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub feeds: FeedConfig,
    pub schedule: ScheduleConfig,
    pub images: ImageConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub channel_id: Option<String>,
    pub api_base_url: String,
    pub author_label: String,
    pub tags: String,
    pub footer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub sources: Vec<FeedSource>,
    pub max_entries_per_feed: usize,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub poll_interval_seconds: u64,
    pub send_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub default_url: String,
    pub max_download_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            feeds: FeedConfig::default(),
            schedule: ScheduleConfig::default(),
            images: ImageConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            api_base_url: "https://discord.com/api/v10".to_owned(),
            author_label: "🚨 NEW CYBER THREAT ALERT 🚨".to_owned(),
            tags: "#CyberSecurity #ThreatIntel".to_owned(),
            footer: "🛡️ Threat Feed Bot • Public cyber security sources".to_owned(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_FEEDS.iter().map(|url| FeedSource::from(*url)).collect(),
            max_entries_per_feed: 10,
            request_timeout_seconds: 30,
            retry_attempts: 2,
            retry_backoff_ms: 1_000,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 15 * 60,
            send_delay_seconds: 130,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default_url: DEFAULT_IMAGE_URL.to_owned(),
            max_download_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("threats.db"),
        }
    }
}

/// Source of override values, normally the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

impl AppConfig {
    /// `~/.config/threatfeed/config.json` on Linux.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("threatfeed").join("config.json"))
    }

    /// Load configuration from `path` (which must exist when given), else
    /// from the default location if present, else built-in defaults; then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &|key: &str| std::env::var(key).ok())
    }

    pub fn load_with_env(path: Option<&Path>, env: &impl EnvSource) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(default_path) => Self::from_file(&default_path)?,
                None => Self::default(),
            },
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl EnvSource) -> Result<(), ConfigError> {
        let var = |key: &str| env.get(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(token) = var("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(channel_id) = var("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = Some(channel_id);
        }
        if let Some(feeds) = var("THREATFEED_FEEDS") {
            self.feeds.sources = feeds
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(FeedSource::from)
                .collect();
        }
        if let Some(value) = var("THREATFEED_POLL_INTERVAL_SECS") {
            self.schedule.poll_interval_seconds =
                parse_secs("THREATFEED_POLL_INTERVAL_SECS", value)?;
        }
        if let Some(value) = var("THREATFEED_SEND_DELAY_SECS") {
            self.schedule.send_delay_seconds = parse_secs("THREATFEED_SEND_DELAY_SECS", value)?;
        }
        if let Some(url) = var("THREATFEED_DEFAULT_IMAGE_URL") {
            self.images.default_url = url;
        }
        if let Some(path) = var("THREATFEED_DB_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// A missing token is fatal. A missing channel only degrades to dry mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .discord
            .token
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            return Err(ConfigError::MissingToken);
        }
        if self.discord.channel_id.is_none() {
            warn!("DISCORD_CHANNEL_ID is not configured; entries will be tracked but not announced");
        }
        if self.feeds.sources.is_empty() {
            warn!("no feed sources configured");
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.schedule.poll_interval_seconds),
            send_delay: Duration::from_secs(self.schedule.send_delay_seconds),
            max_entries_per_feed: self.feeds.max_entries_per_feed,
            request_timeout: Duration::from_secs(self.feeds.request_timeout_seconds),
            max_retries: self.feeds.retry_attempts,
            retry_backoff_ms: self.feeds.retry_backoff_ms,
            default_image_url: self.images.default_url.clone(),
            max_image_bytes: self.images.max_download_bytes,
        }
    }
}

fn parse_secs(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

/// Runtime knobs for the poll coordinator.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Pause imposed between two successful deliveries.
    pub send_delay: Duration,
    pub max_entries_per_feed: usize,
    pub request_timeout: Duration,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
    pub default_image_url: String,
    pub max_image_bytes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        AppConfig::default().poll_config()
    }
}
