use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Source;
use crate::feed::document::{Document, Element};
use crate::feed::identity::assign_id;
use crate::feed::image::ImageExtractor;
use crate::util::summarize;

/// Content field fallback chain, first present wins.
const CONTENT_FIELDS: [&str; 4] = ["content:encoded", "content", "description", "summary"];

/// Published-timestamp fallback chain, first *parseable* wins.
const DATE_FIELDS: [&str; 3] = ["pubDate", "published", "updated"];

/// The parsed XML has no recognizable feed container.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unrecognized feed shape (root element <{root}>)")]
    UnrecognizedShape { root: String },
}

/// One normalized article, the canonical shape every feed dialect maps into.
///
/// Items are rebuilt from scratch on every refresh cycle; only `id` is
/// stable across cycles, which is what consumers key read/saved state on.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    /// Stable de-duplication id, see [`assign_id`](crate::feed::assign_id).
    pub id: String,
    pub title: String,
    pub link: String,
    /// Markup-free text capped at 300 chars (`...` appended when cut).
    pub summary: String,
    /// Original entry HTML, with the extracted lead image prepended as an
    /// `<img>` tag so consumers can re-extract it from this field alone.
    pub full_content: String,
    pub published_at: DateTime<Utc>,
    /// True when the feed carried no parseable date and `published_at` is
    /// the fetch time. Such items sort as newest on the cycle they first
    /// appear and drift on later cycles; the flag lets consumers reason
    /// about that instead of being surprised by it.
    #[serde(skip)]
    pub date_synthesized: bool,
    /// Category inherited from the source.
    pub category: String,
    /// Id of the source this item came from.
    pub source_id: String,
}

/// Maps a parsed feed document to canonical items.
///
/// Container resolution tries, in order: RSS (`rss` root → its `channel`
/// child), Atom (`feed` root), then the raw root itself; the last arm is
/// what lets RDF/RSS 1.0 feeds work, since their `item` elements sit
/// beside `channel` directly under `rdf:RDF`. Entries are `item` children
/// first, `entry` children second; a recognized container with zero
/// entries is a valid empty feed, not an error.
///
/// # Errors
///
/// [`NormalizeError::UnrecognizedShape`] when the document is neither an
/// RSS channel nor an Atom feed and its root holds no entries.
pub fn normalize(
    doc: &Document,
    source: &Source,
    images: &ImageExtractor,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<Item>, NormalizeError> {
    let root = doc.root();
    let (container, recognized) = match root.name() {
        "rss" => match root.child("channel") {
            Some(channel) => (channel, true),
            None => {
                return Err(NormalizeError::UnrecognizedShape {
                    root: root.name().to_string(),
                })
            }
        },
        "feed" => (root, true),
        _ => (root, false),
    };

    let mut entries = container.children("item");
    if entries.is_empty() {
        entries = container.children("entry");
    }
    if entries.is_empty() && !recognized {
        return Err(NormalizeError::UnrecognizedShape {
            root: root.name().to_string(),
        });
    }

    let items = entries
        .into_iter()
        .map(|entry| build_item(entry, source, images, fetched_at))
        .collect();
    Ok(items)
}

fn build_item(
    entry: &Element,
    source: &Source,
    images: &ImageExtractor,
    fetched_at: DateTime<Utc>,
) -> Item {
    let title = entry_title(entry).unwrap_or_else(|| "Untitled".to_string());
    let link = entry_link(entry).unwrap_or_default();
    let content = entry_content(entry).unwrap_or_else(|| title.clone());
    let (published_at, date_synthesized) = entry_published(entry, fetched_at);

    let image = images.extract(&content, &source.id, &source.category);
    let full_content = match image {
        Some(url) => format!("<img src=\"{}\" alt=\"{}\" />{}", url, title, content),
        None => content,
    };
    let summary = summarize(&full_content);
    let id = assign_id(&source.category, &title, &link, published_at);

    Item {
        id,
        title,
        link,
        summary,
        full_content,
        published_at,
        date_synthesized,
        category: source.category.clone(),
        source_id: source.id.clone(),
    }
}

/// Title: first `title` child's text. String, text-node-with-attributes,
/// and repeated-element shapes all collapse to this one accessor under the
/// generic document model.
fn entry_title(entry: &Element) -> Option<String> {
    entry
        .child("title")
        .and_then(|t| t.text())
        .map(str::to_string)
}

/// Link: the first `link` child: Atom's `href` attribute form first, then
/// the RSS text form. Later `link` siblings (Atom `rel="self"` and such)
/// are deliberately ignored.
fn entry_link(entry: &Element) -> Option<String> {
    let link = entry.child("link")?;
    link.attr("href")
        .or_else(|| link.text())
        .map(str::to_string)
}

fn entry_content(entry: &Element) -> Option<String> {
    CONTENT_FIELDS
        .iter()
        .find_map(|field| entry.child(field).and_then(|el| el.text()))
        .map(str::to_string)
}

/// Resolves the published timestamp. Each candidate field is parsed as
/// RFC 2822 (`Mon, 15 Jan 2024 10:30:00 +0000`) and then RFC 3339
/// (`2024-01-15T10:30:00Z`); the first candidate that parses wins. When
/// nothing parses the fetch time is substituted and flagged; a missing
/// date is feed sloppiness, not an error.
fn entry_published(entry: &Element, fetched_at: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    for field in DATE_FIELDS {
        if let Some(raw) = entry.child(field).and_then(|el| el.text()) {
            if let Some(parsed) = parse_date(raw) {
                return (parsed, false);
            }
            tracing::debug!(field = field, value = raw, "Unparseable entry date, trying next");
        }
    }
    (fetched_at, true)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
