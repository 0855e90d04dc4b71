//! Configuration management for the anime parsers workspace.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with defaults for every setting so a missing file is never fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Browser user agent the catalog sites expect.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fetch engine profiles
    #[serde(default)]
    pub fetch: FetchSection,

    /// Upstream catalog sites
    #[serde(default)]
    pub sites: SitesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory path
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// One fetch profile: how wide to fan out and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Parallel workers raced per request
    pub workers: usize,

    /// Attempts each worker makes before giving up
    pub max_attempts: u32,

    /// Timeout for a single attempt in milliseconds
    pub attempt_timeout_ms: u64,

    /// Pause between attempts of one worker in milliseconds (0 = retry immediately)
    #[serde(default)]
    pub retry_delay_ms: u64,
}

/// Fetch engine configuration.
///
/// Call sites pick a profile: `background` for secondary pages,
/// `interactive` for lookups a user is waiting on, `sequential` for the
/// non-racing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    #[serde(deserialize_with = "background_settings")]
    pub background: FetchSettings,
    #[serde(deserialize_with = "interactive_settings")]
    pub interactive: FetchSettings,
    #[serde(deserialize_with = "sequential_settings")]
    pub sequential: FetchSettings,

    /// Extra terminal statuses, e.g. `451 = "content_blocked"`
    #[serde(default)]
    pub terminal_statuses: BTreeMap<String, String>,
}

/// Upstream site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    /// Shikimori mirror domain
    pub shikimori_domain: String,

    /// AnimeGo mirror domain
    pub animego_domain: String,

    /// User-Agent sent to both sites
    pub user_agent: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: false,
            json_format: false,
        }
    }
}

impl FetchSettings {
    pub const BACKGROUND: FetchSettings = FetchSettings {
        workers: 3,
        max_attempts: 10,
        attempt_timeout_ms: 5_000,
        retry_delay_ms: 0,
    };

    pub const INTERACTIVE: FetchSettings = FetchSettings {
        workers: 3,
        max_attempts: 50,
        attempt_timeout_ms: 10_000,
        retry_delay_ms: 0,
    };

    pub const SEQUENTIAL: FetchSettings = FetchSettings {
        workers: 1,
        max_attempts: 50,
        attempt_timeout_ms: 10_000,
        retry_delay_ms: 0,
    };
}

/// A `[fetch.<profile>]` table as written; omitted keys keep the profile's default.
#[derive(Debug, Default, Deserialize)]
struct FetchSettingsOverride {
    workers: Option<usize>,
    max_attempts: Option<u32>,
    attempt_timeout_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
}

impl FetchSettingsOverride {
    fn over(self, base: FetchSettings) -> FetchSettings {
        FetchSettings {
            workers: self.workers.unwrap_or(base.workers),
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            attempt_timeout_ms: self.attempt_timeout_ms.unwrap_or(base.attempt_timeout_ms),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(base.retry_delay_ms),
        }
    }
}

fn background_settings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<FetchSettings, D::Error> {
    FetchSettingsOverride::deserialize(deserializer).map(|o| o.over(FetchSettings::BACKGROUND))
}

fn interactive_settings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<FetchSettings, D::Error> {
    FetchSettingsOverride::deserialize(deserializer).map(|o| o.over(FetchSettings::INTERACTIVE))
}

fn sequential_settings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<FetchSettings, D::Error> {
    FetchSettingsOverride::deserialize(deserializer).map(|o| o.over(FetchSettings::SEQUENTIAL))
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            background: FetchSettings::BACKGROUND,
            interactive: FetchSettings::INTERACTIVE,
            sequential: FetchSettings::SEQUENTIAL,
            terminal_statuses: BTreeMap::new(),
        }
    }
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            shikimori_domain: "shikimori.one".to_string(),
            animego_domain: "animego.me".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            fetch: FetchSection::default(),
            sites: SitesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file or create default if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.logging.log_dir)
    }
}
