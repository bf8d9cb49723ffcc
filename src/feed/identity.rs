use chrono::{DateTime, Utc};

/// Number of leading title characters folded into an item id.
const TITLE_PREFIX_CHARS: usize = 30;

/// Derives the stable de-duplication id for an item.
///
/// The id concatenates category, the first 30 characters of the title, the
/// last path segment of the link, and the published timestamp in epoch
/// milliseconds, then slugs the result: lowercase, every run of characters
/// outside `[a-z0-9]` collapsed to a single `-`, edges trimmed.
///
/// Deterministic by construction: the same upstream entry produces the
/// same id on every refresh, which is what lets consumers carry read/saved
/// state across cycles. Two distinct entries sharing title prefix, link
/// suffix, and timestamp will collide; that weakness is documented and
/// deliberately not papered over with a content hash.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use tributary::feed::assign_id;
///
/// let published = Utc.timestamp_millis_opt(1705314600000).unwrap();
/// let id = assign_id(
///     "AI Research",
///     "Hello, World!",
///     "https://example.com/posts/hello-world",
///     published,
/// );
/// assert_eq!(id, "ai-research-hello-world-hello-world-1705314600000");
/// ```
pub fn assign_id(
    category: &str,
    title: &str,
    link: &str,
    published_at: DateTime<Utc>,
) -> String {
    let title_prefix: String = title.chars().take(TITLE_PREFIX_CHARS).collect();
    // "https://a/b/c" -> "c"; a trailing slash yields an empty segment,
    // which the slug pass collapses away
    let link_segment = link.rsplit('/').next().unwrap_or("");

    let base = format!(
        "{}-{}-{}-{}",
        category,
        title_prefix,
        link_segment,
        published_at.timestamp_millis()
    );
    slugify(&base)
}

fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut prev_dash = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
