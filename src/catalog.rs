//! Source catalog: the configured list of feeds the aggregator pulls from.
//!
//! Sources are declared in a TOML file and loaded read-only at startup;
//! creating and editing them is the catalog owner's problem, not ours.
//! Entries with unusable URLs are skipped with a warning rather than
//! failing the whole catalog (one bad row shouldn't take down the rest),
//! while duplicate ids are a configuration bug and fail hard.

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read sources file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in sources file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two sources share an id; downstream identity and image rules key on it.
    #[error("Duplicate source id '{0}'")]
    DuplicateId(String),
}

/// One configured feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    /// Unique, stable id assigned at configuration time.
    pub id: String,
    /// Human-readable display name.
    pub title: String,
    /// Declared feed URL (before any relay rewriting).
    pub url: String,
    /// Category every item from this source inherits.
    pub category: String,
    /// True when the environment cannot fetch this URL directly and the
    /// relay rules in [`crate::relay`] must rewrite it.
    #[serde(default)]
    pub relay_required: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Vec<Source>,
}

/// Loads and validates the source catalog from a TOML file.
///
/// - Unreadable file or invalid TOML → error
/// - Source with an unusable URL → skipped, warning logged
/// - Duplicate source id → [`CatalogError::DuplicateId`]
/// - Empty catalog → `Ok(vec![])`; the caller decides whether that's worth
///   complaining about
pub fn load_sources(path: &Path) -> Result<Vec<Source>, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    let sources = parse_catalog(&content)?;
    tracing::info!(path = %path.display(), count = sources.len(), "Loaded source catalog");
    Ok(sources)
}

fn parse_catalog(content: &str) -> Result<Vec<Source>, CatalogError> {
    let file: CatalogFile = toml::from_str(content)?;

    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::with_capacity(file.sources.len());
    for source in file.sources {
        if !seen.insert(source.id.clone()) {
            return Err(CatalogError::DuplicateId(source.id));
        }
        match validate_source_url(&source.url) {
            Ok(_) => sources.push(source),
            Err(e) => {
                tracing::warn!(source = %source.id, url = %source.url, error = %e, "Skipping source with unusable URL");
            }
        }
    }
    Ok(sources)
}

#[derive(Debug, Error)]
enum SourceUrlError {
    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("unsupported scheme '{0}' (only http/https)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("localhost and private addresses are not allowed")]
    PrivateAddress,
}

/// Feed URLs must be public http(s) endpoints. Loopback and private ranges
/// are rejected so a hostile catalog row can't point the fetcher (or the
/// relay) at internal services.
fn validate_source_url(raw: &str) -> Result<Url, SourceUrlError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SourceUrlError::UnsupportedScheme(scheme.to_string())),
    }

    let Some(host) = url.host_str() else {
        return Err(SourceUrlError::MissingHost);
    };
    if host == "localhost" {
        return Err(SourceUrlError::PrivateAddress);
    }

    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        let private = match ip {
            IpAddr::V4(v4) => {
                v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
            }
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
        if private {
            return Err(SourceUrlError::PrivateAddress);
        }
    }

    Ok(url)
}
