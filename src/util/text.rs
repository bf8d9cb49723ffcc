use std::borrow::Cow;

/// Ellipsis marker appended when a summary is truncated
const ELLIPSIS: &str = "...";

/// Maximum summary length in characters (excluding the ellipsis marker).
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Reduces feed entry HTML to plain display text.
///
/// Three passes, in the order they must happen:
/// 1. Markup tags (`<...>`) are replaced with a single space so adjacent
///    words don't fuse together.
/// 2. A small fixed set of HTML entities is decoded: `&nbsp;` `&amp;`
///    `&lt;` `&gt;` `&quot;`. Sequential replacement is intentional:
///    `&amp;lt;` decodes all the way to `<`, matching how most feed
///    readers end up treating double-escaped payloads.
/// 3. Whitespace runs collapse to single spaces and the result is trimmed.
///
/// # Examples
///
/// ```
/// use tributary::util::clean_content;
///
/// assert_eq!(
///     clean_content("<p>Hello&nbsp;<b>world</b></p>"),
///     "Hello world"
/// );
/// assert_eq!(clean_content("a &amp; b"), "a & b");
/// ```
pub fn clean_content(raw: &str) -> String {
    // Pass 1: strip tags, each tag becomes one space
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' if !in_tag => {
                in_tag = true;
                stripped.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    // Pass 2: the fixed entity set, in the original replacement order
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");

    // Pass 3: collapse whitespace runs, trim
    let mut out = String::with_capacity(decoded.len());
    let mut prev_space = false;
    for c in decoded.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Truncates a string to at most `max` characters, appending `...` when
/// anything was cut.
///
/// Counts characters, not bytes (never splits a UTF-8 sequence) and not
/// display columns; truncation mid-word is accepted lossy behavior.
/// Returns `Cow::Borrowed` when the input already fits.
///
/// # Examples
///
/// ```
/// use tributary::util::truncate_chars;
///
/// assert_eq!(truncate_chars("short", 300), "short");
/// let long = "x".repeat(305);
/// let cut = truncate_chars(&long, 300);
/// assert_eq!(cut.chars().count(), 303); // 300 chars + "..."
/// assert!(cut.ends_with("..."));
/// ```
pub fn truncate_chars(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        // A character exists past the limit: cut before it
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &s[..byte_idx], ELLIPSIS)),
        None => Cow::Borrowed(s),
    }
}

/// Produces the canonical item summary: cleaned plain text capped at
/// [`SUMMARY_MAX_CHARS`] characters.
pub fn summarize(raw: &str) -> String {
    truncate_chars(&clean_content(raw), SUMMARY_MAX_CHARS).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(clean_content("<p>Hello</p>"), "Hello");
        assert_eq!(clean_content("a<br/>b"), "a b");
        assert_eq!(
            clean_content("<div class=\"x\"><span>nested</span></div>"),
            "nested"
        );
    }

    #[test]
    fn test_entity_decode() {
        assert_eq!(clean_content("fish &amp; chips"), "fish & chips");
        assert_eq!(clean_content("1 &lt; 2 &gt; 0"), "1 < 2 > 0");
        assert_eq!(clean_content("say &quot;hi&quot;"), "say \"hi\"");
        assert_eq!(clean_content("a&nbsp;b"), "a b");
    }

    #[test]
    fn test_double_escaped_entity_decodes_fully() {
        // &amp;lt; -> &lt; -> < under sequential replacement
        assert_eq!(clean_content("&amp;lt;tag&amp;gt;"), "<tag>");
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(clean_content("a   b\n\t c"), "a b c");
        assert_eq!(clean_content("  padded  "), "padded");
    }

    #[test]
    fn test_tags_do_not_fuse_words() {
        assert_eq!(clean_content("one<p>two</p>three"), "one two three");
    }

    #[test]
    fn test_empty_and_tag_only_content() {
        assert_eq!(clean_content(""), "");
        assert_eq!(clean_content("<p></p><br/>"), "");
    }

    #[test]
    fn test_truncate_below_limit_unchanged() {
        let s = "y".repeat(299);
        let out = truncate_chars(&s, SUMMARY_MAX_CHARS);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.chars().count(), 299);
        assert!(!out.ends_with("..."));
    }

    #[test]
    fn test_truncate_at_limit_unchanged() {
        let s = "y".repeat(300);
        let out = truncate_chars(&s, SUMMARY_MAX_CHARS);
        assert_eq!(out, s.as_str());
    }

    #[test]
    fn test_truncate_past_limit_appends_marker() {
        let s = "y".repeat(305);
        let out = truncate_chars(&s, SUMMARY_MAX_CHARS);
        assert_eq!(out.chars().count(), 303);
        assert!(out.ends_with("..."));
        assert!(out.starts_with("yyy"));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        // 2-byte chars: must cut on a char boundary, not a byte offset
        let s = "é".repeat(400);
        let out = truncate_chars(&s, SUMMARY_MAX_CHARS);
        assert_eq!(out.chars().count(), 303);
    }

    #[test]
    fn test_summarize_end_to_end() {
        let html = format!("<p>{}</p>", "z".repeat(400));
        let out = summarize(&html);
        assert_eq!(out.chars().count(), 303);
        assert!(out.ends_with("..."));
    }
}
