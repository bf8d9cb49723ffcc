//! Configuration file parser for ~/.config/tributary/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! and the defaults reproduce the relay and image tables the aggregator
//! shipped with. Unknown keys are silently ignored by serde, though we log
//! a warning when the file contains potential typos.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes between scheduled refresh cycles.
    pub refresh_interval_minutes: u64,

    /// Per-source fetch timeout in seconds (connect through body read).
    pub fetch_timeout_secs: u64,

    /// Relay rewriting rules for sources flagged `relay_required`.
    pub relay: RelayConfig,

    /// Lead-image extraction rules and per-category defaults.
    pub images: ImageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 5,
            fetch_timeout_secs: 30,
            relay: RelayConfig::default(),
            images: ImageConfig::default(),
        }
    }
}

/// Relay rule table. All rules are host-based so new exceptions are
/// additive rows rather than code changes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Default relay template. `{url}` substitutes the raw feed URL,
    /// `{encoded}` its percent-encoded form.
    pub template: String,

    /// Hosts fetched directly even when a source is flagged
    /// `relay_required` (they already allow cross-origin fetches).
    pub direct_hosts: Vec<String>,

    /// Per-host template exceptions, tried before the default template.
    pub overrides: Vec<RelayOverride>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RelayOverride {
    pub host: String,
    pub template: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            template: "https://api.allorigins.win/raw?url={encoded}".to_string(),
            direct_hosts: vec!["news.google.com".to_string()],
            overrides: vec![RelayOverride {
                host: "hnrss.org".to_string(),
                template: "https://cors-anywhere.herokuapp.com/{url}".to_string(),
            }],
        }
    }
}

/// Image extraction tables: per-category default images and per-source
/// override rules, consulted by [`crate::feed::ImageExtractor`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Placeholder image per category, used when no image can be found.
    pub defaults: HashMap<String, String>,

    /// Per-source rules, keyed by source id.
    pub sources: Vec<SourceImageRule>,
}

/// One per-source image rule.
///
/// - `pattern` set → take the first match of that regex (a CDN the source
///   is known to embed images from)
/// - `default_category` set → skip extraction, use that category's default
/// - neither → skip extraction, use the item's own category default
#[derive(Clone, Debug, Deserialize)]
pub struct SourceImageRule {
    pub source: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub default_category: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        let defaults = HashMap::from([
            (
                "AI News".to_string(),
                "https://images.unsplash.com/photo-1677442136019-21780ecad995".to_string(),
            ),
            (
                "AI Research".to_string(),
                "https://images.unsplash.com/photo-1620712943543-bcc4688e7485".to_string(),
            ),
            (
                "AI Engineering".to_string(),
                "https://images.unsplash.com/photo-1555949963-ff9fe0c870eb".to_string(),
            ),
            (
                "Computer Vision".to_string(),
                "https://images.unsplash.com/photo-1561736778-92e52a7769ef".to_string(),
            ),
            (
                "NLP".to_string(),
                "https://images.unsplash.com/photo-1546410531-bb4caa6b424d".to_string(),
            ),
            (
                "Data Science".to_string(),
                "https://images.unsplash.com/photo-1551288049-bebda4e38f71".to_string(),
            ),
            (
                "Tech News".to_string(),
                "https://images.unsplash.com/photo-1488590528505-98d2b5aba04b".to_string(),
            ),
            (
                "AI Learning".to_string(),
                "https://images.unsplash.com/photo-1509869175650-a1d97972541a".to_string(),
            ),
        ]);

        // arXiv abstracts carry no images; Hacker News links out and gets
        // the tech placeholder; Medium properties embed from miro CDN
        let sources = vec![
            SourceImageRule {
                source: "arxiv-cv".to_string(),
                pattern: None,
                default_category: None,
            },
            SourceImageRule {
                source: "arxiv-nlp".to_string(),
                pattern: None,
                default_category: None,
            },
            SourceImageRule {
                source: "hackernews".to_string(),
                pattern: None,
                default_category: Some("Tech News".to_string()),
            },
            SourceImageRule {
                source: "medium-feeds".to_string(),
                pattern: Some(r#"https://miro\.medium\.com/[^"'\s]+"#.to_string()),
                default_category: None,
            },
            SourceImageRule {
                source: "towards-data-science".to_string(),
                pattern: Some(r#"https://miro\.medium\.com/[^"'\s]+"#.to_string()),
                default_category: None,
            },
            SourceImageRule {
                source: "pyimagesearch".to_string(),
                pattern: Some(r#"(?i)https://pyimagesearch[^"'\s]+\.(?:png|jpg|jpeg|gif)"#.to_string()),
                default_category: None,
            },
        ];

        Self { defaults, sources }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged
    ///   as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid slurping a corrupted or
        // hostile config file into memory.
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
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to flag probable typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "refresh_interval_minutes",
                "fetch_timeout_secs",
                "relay",
                "images",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
