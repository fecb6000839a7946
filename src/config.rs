use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_DB_PATH, DEFAULT_INTERVAL_MINUTES, DEFAULT_LOG_DIR,
    DEFAULT_MAX_PAGES, DEFAULT_REQUESTS_PER_MIN, DEFAULT_TIMEOUT_SECONDS, DEFAULT_USER_AGENT,
    DISCORD_API_BASE,
};
use crate::error::{BotError, Result};
use crate::search::SearchQuery;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub search: SearchQuery,
    pub discord: DiscordConfig,
    pub schedule: ScheduleConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Browser service endpoint; pages are fetched directly when unset
    pub chrome_url: Option<String>,
    pub max_pages: u32,
    pub requests_per_min: u64,
    pub burst: u64,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chrome_url: None,
            max_pages: DEFAULT_MAX_PAGES,
            requests_per_min: DEFAULT_REQUESTS_PER_MIN,
            burst: 1,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Only ever taken from the environment
    #[serde(skip)]
    pub token: Option<String>,
    pub channel_id: Option<String>,
    pub api_base: String,
    pub notify_price_changes: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel_id: None,
            api_base: DISCORD_API_BASE.to_string(),
            notify_price_changes: true,
        }
    }
}

impl DiscordConfig {
    /// Token and channel, when both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.token, &self.channel_id) {
            (Some(token), Some(channel)) => Some((token.as_str(), channel.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    /// Post the summary line even when nothing new was found
    pub announce_empty_runs: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            announce_empty_runs: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Loads `path` (or `config.toml` when it exists), then applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Path::new(DEFAULT_CONFIG_PATH), |key| std::env::var(key).ok())
    }

    /// `load` with the fallback file and the environment supplied by the caller.
    /// A missing `default_path` yields defaults; a missing `path` is an error.
    pub fn load_from<F>(path: Option<&Path>, default_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (default_path, false),
        };

        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound && !explicit => Config::default(),
            Err(e) => {
                return Err(BotError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides file values with the deployment's environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get("DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = get("CHROME_URL") {
            self.scraper.chrome_url = Some(url);
        }
        if let Some(token) = get("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(channel) = get("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = Some(channel);
        }
        if let Some(minutes) = get("SCRAPE_INTERVAL_MINUTES") {
            self.schedule.interval_minutes = parse_env("SCRAPE_INTERVAL_MINUTES", &minutes)?;
        }
        if let Some(port) = get("METRICS_PORT") {
            self.metrics.port = Some(parse_env("METRICS_PORT", &port)?);
        }
        if let Some(dir) = get("LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.interval_minutes == 0 {
            return Err(BotError::Config("schedule.interval_minutes must be positive".into()));
        }
        if self.scraper.max_pages == 0 {
            return Err(BotError::Config("scraper.max_pages must be at least 1".into()));
        }
        if self.scraper.requests_per_min == 0 {
            return Err(BotError::Config("scraper.requests_per_min must be positive".into()));
        }
        if self.scraper.timeout_seconds == 0 {
            return Err(BotError::Config("scraper.timeout_seconds must be positive".into()));
        }
        if let (Some(min), Some(max)) = (self.search.price_min, self.search.price_max) {
            if min > max {
                return Err(BotError::Config(format!(
                    "search.price_min ({min}) is above search.price_max ({max})"
                )));
            }
        }
        if let Some(channel) = &self.discord.channel_id {
            if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_digit()) {
                return Err(BotError::Config(format!(
                    "discord.channel_id must be a numeric snowflake, got '{channel}'"
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BotError::Config(format!("{key} has an invalid value '{value}'")))
}
