//! Configuration file parser for the feed sync service.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::feed::Channel;

/// Directory created under the upload directory to hold the feed.
pub const FEEDS_DIR_NAME: &str = "shopping-feeds";

/// File name of the feed inside [`FEEDS_DIR_NAME`].
pub const FEED_FILE_NAME: &str = "g-shopping-feed.xml";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Channel header written at the top of the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub title: String,

    /// Storefront URL. Must be an absolute http(s) URL.
    pub link: String,

    pub description: String,
}

impl ChannelConfig {
    const KNOWN_KEYS: [&'static str; 3] = ["title", "link", "description"];
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            title: "MainProductsList".to_string(),
            link: "http://localhost".to_string(),
            description: "MainProductsList".to_string(),
        }
    }
}

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host upload directory; the feed lives in a subdirectory of it.
    pub upload_dir: PathBuf,

    /// Explicit feed location, overriding the path derived from `upload_dir`.
    pub feed_path: Option<PathBuf>,

    /// Attribute taxonomy holding the product brand.
    pub brand_attribute: String,

    pub channel: ChannelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            feed_path: None,
            brand_attribute: "pa_marca".to_string(),
            channel: ChannelConfig::default(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = ["upload_dir", "feed_path", "brand_attribute", "channel"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Invalid channel link or empty brand attribute → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in Self::unknown_keys(&raw) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            feed_path = %config.feed_file_path().display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Keys serde will silently skip, as dotted paths (`channel.titel`).
    fn unknown_keys(raw: &toml::Table) -> Vec<String> {
        let mut unknown: Vec<String> = raw
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();

        if let Some(channel) = raw.get("channel").and_then(toml::Value::as_table) {
            unknown.extend(
                channel
                    .keys()
                    .filter(|key| !ChannelConfig::KNOWN_KEYS.contains(&key.as_str()))
                    .map(|key| format!("channel.{key}")),
            );
        }
        unknown
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let link = Url::parse(&self.channel.link).map_err(|e| {
            ConfigError::Invalid(format!("channel.link '{}': {}", self.channel.link, e))
        })?;
        if !matches!(link.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "channel.link must use http or https, got '{}'",
                link.scheme()
            )));
        }
        if self.brand_attribute.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "brand_attribute must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the feed file lives: `feed_path` if set, otherwise
    /// `<upload_dir>/shopping-feeds/g-shopping-feed.xml`.
    pub fn feed_file_path(&self) -> PathBuf {
        self.feed_path.clone().unwrap_or_else(|| {
            self.upload_dir.join(FEEDS_DIR_NAME).join(FEED_FILE_NAME)
        })
    }

    /// Channel header for newly initialized feeds.
    pub fn channel(&self) -> Channel {
        Channel {
            title: self.channel.title.clone(),
            link: self.channel.link.clone(),
            description: self.channel.description.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
