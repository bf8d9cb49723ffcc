use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use crate::config::ImageConfig;

/// A source-specific image rule failed to compile.
#[derive(Debug, Error)]
pub enum ImageRuleError {
    #[error("invalid image pattern for source '{source}': {error}")]
    InvalidPattern {
        source: String,
        #[source]
        error: regex::Error,
    },
}

/// One generic heuristic: a pattern plus which capture group holds the URL.
#[derive(Debug)]
struct Pattern {
    re: Regex,
    group: usize,
}

/// Per-source override, consulted before the generic heuristics.
#[derive(Debug)]
enum SourceRule {
    /// Skip extraction entirely and use a category default: either the
    /// item's own category (`None`) or a named one ("Tech News" for a
    /// source known to carry no images of its own).
    CategoryDefault(Option<String>),
    /// The source embeds images from a known CDN; take the first URL
    /// matching its pattern. A miss falls through to the generic chain.
    CdnPattern(Regex),
}

/// Best-effort lead-image locator.
///
/// Built once from [`ImageConfig`] (rules and defaults are table-driven so
/// new source exceptions are additive), then consulted per item. Attempt
/// order, first match wins:
///
/// 1. source-specific override rule
/// 2. `<img src="...">`
/// 3. `<media:content url="...">`
/// 4. `<media:thumbnail url="...">`
/// 5. `<enclosure url="..." type="image...">`
/// 6. `<meta property="og:image" content="...">`
/// 7. a bare URL ending in a known image extension
/// 8. the per-category default, if configured
///
/// Extraction never fails; the result is a plausible image URL or nothing.
#[derive(Debug)]
pub struct ImageExtractor {
    patterns: Vec<Pattern>,
    defaults: HashMap<String, String>,
    rules: HashMap<String, SourceRule>,
}

impl ImageExtractor {
    /// Compiles the generic heuristics and the configured source rules.
    ///
    /// # Errors
    ///
    /// Returns [`ImageRuleError::InvalidPattern`] when a user-supplied
    /// `pattern` in the config does not compile.
    pub fn from_config(config: &ImageConfig) -> Result<Self, ImageRuleError> {
        let patterns = vec![
            builtin(r#"<img[^>]+src="([^">]+)""#, 1)?,
            builtin(r#"<media:content[^>]+url="([^">]+)""#, 1)?,
            builtin(r#"<media:thumbnail[^>]+url="([^">]+)""#, 1)?,
            builtin(r#"<enclosure[^>]+url="([^">]+)"[^>]+type="image"#, 1)?,
            builtin(r#"<meta[^>]+property="og:image"[^>]+content="([^">]+)""#, 1)?,
            builtin(r#"(?i)https?://[^"\s]+\.(?:jpg|jpeg|png|gif|webp)"#, 0)?,
        ];

        let mut rules = HashMap::new();
        for rule in &config.sources {
            let compiled = match (&rule.pattern, &rule.default_category) {
                (Some(pattern), _) => {
                    let re = Regex::new(pattern).map_err(|error| {
                        ImageRuleError::InvalidPattern {
                            source: rule.source.clone(),
                            error,
                        }
                    })?;
                    SourceRule::CdnPattern(re)
                }
                (None, Some(category)) => SourceRule::CategoryDefault(Some(category.clone())),
                (None, None) => SourceRule::CategoryDefault(None),
            };
            rules.insert(rule.source.clone(), compiled);
        }

        Ok(Self {
            patterns,
            defaults: config.defaults.clone(),
            rules,
        })
    }

    /// Locates a representative image URL for an item, or nothing.
    pub fn extract(&self, content: &str, source_id: &str, category: &str) -> Option<String> {
        if let Some(rule) = self.rules.get(source_id) {
            match rule {
                SourceRule::CategoryDefault(named) => {
                    // Short-circuits: a source declared image-less never
                    // runs the generic heuristics over its content
                    let key = named.as_deref().unwrap_or(category);
                    return self.defaults.get(key).cloned();
                }
                SourceRule::CdnPattern(re) => {
                    if let Some(m) = re.find(content) {
                        return Some(m.as_str().to_string());
                    }
                }
            }
        }

        for pattern in &self.patterns {
            if let Some(caps) = pattern.re.captures(content) {
                if let Some(m) = caps.get(pattern.group) {
                    return Some(m.as_str().to_string());
                }
            }
        }

        self.defaults.get(category).cloned()
    }
}

fn builtin(pattern: &str, group: usize) -> Result<Pattern, ImageRuleError> {
    let re = Regex::new(pattern).map_err(|error| ImageRuleError::InvalidPattern {
        source: "<builtin>".to_string(),
        error,
    })?;
    Ok(Pattern { re, group })
}
