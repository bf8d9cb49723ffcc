//! Source locator: decides which URL a source is actually fetched from.
//!
//! Some feeds cannot be fetched directly from the runtime environment and
//! must round-trip through an HTTP relay. The rules are table-driven from
//! [`RelayConfig`](crate::config::RelayConfig): default template, direct-
//! host allow-list, per-host template overrides, so new exceptions are an
//! added row, not a new call site.

use url::Url;

use crate::catalog::Source;
use crate::config::RelayConfig;

/// Resolves the URL a source should be fetched from. Pure, no I/O.
///
/// - `relay_required == false` → the declared URL, unchanged
/// - host on the allow-list → unchanged even when the flag is set (hosts
///   known to accept direct cross-origin fetches)
/// - host matching an override row → that row's template
/// - otherwise → the default relay template
///
/// Templates substitute `{url}` with the raw feed URL and `{encoded}` with
/// its percent-encoded form. A source URL that doesn't parse can't be
/// host-matched and falls through to the default template.
pub fn resolve_fetch_url(source: &Source, relay: &RelayConfig) -> String {
    if !source.relay_required {
        return source.url.clone();
    }

    let host = Url::parse(&source.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    if let Some(host) = &host {
        if relay.direct_hosts.iter().any(|h| host_matches(host, h)) {
            return source.url.clone();
        }
        for rule in &relay.overrides {
            if host_matches(host, &rule.host) {
                return apply_template(&rule.template, &source.url);
            }
        }
    }

    apply_template(&relay.template, &source.url)
}

/// Exact host or subdomain suffix match: `news.google.com` matches both
/// `news.google.com` and `rss.news.google.com`, never `fakenews.google.com.evil`.
fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{}", pattern))
}

fn apply_template(template: &str, url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    template.replace("{encoded}", &encoded).replace("{url}", url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayOverride;

    fn source(url: &str, relay_required: bool) -> Source {
        Source {
            id: "s".to_string(),
            title: "S".to_string(),
            url: url.to_string(),
            category: "C".to_string(),
            relay_required,
        }
    }

    fn relay() -> RelayConfig {
        RelayConfig {
            template: "https://relay.example.net/raw?url={encoded}".to_string(),
            direct_hosts: vec!["news.google.com".to_string()],
            overrides: vec![RelayOverride {
                host: "hnrss.org".to_string(),
                template: "https://passthrough.example.net/{url}".to_string(),
            }],
        }
    }

    #[test]
    fn test_flag_off_is_direct() {
        let s = source("https://blog.example.com/feed", false);
        assert_eq!(resolve_fetch_url(&s, &relay()), "https://blog.example.com/feed");
    }

    #[test]
    fn test_default_template_with_encoding() {
        let s = source("https://blog.example.com/feed?a=1&b=2", true);
        let resolved = resolve_fetch_url(&s, &relay());
        assert!(resolved.starts_with("https://relay.example.net/raw?url="));
        // The feed URL's own query must arrive encoded, not spliced in raw
        assert!(resolved.contains("%2F%2Fblog.example.com"));
        assert!(resolved.contains("%3Fa%3D1%26b%3D2"));
    }

    #[test]
    fn test_allow_listed_host_stays_direct() {
        let s = source("https://news.google.com/rss", true);
        assert_eq!(resolve_fetch_url(&s, &relay()), "https://news.google.com/rss");
    }

    #[test]
    fn test_allow_list_matches_subdomain() {
        let s = source("https://alerts.news.google.com/rss", true);
        assert_eq!(
            resolve_fetch_url(&s, &relay()),
            "https://alerts.news.google.com/rss"
        );
    }

    #[test]
    fn test_allow_list_rejects_suffix_spoof() {
        let s = source("https://news.google.com.evil.example/rss", true);
        let resolved = resolve_fetch_url(&s, &relay());
        assert!(resolved.starts_with("https://relay.example.net/"));
    }

    #[test]
    fn test_override_host_uses_its_template() {
        let s = source("https://hnrss.org/frontpage", true);
        assert_eq!(
            resolve_fetch_url(&s, &relay()),
            "https://passthrough.example.net/https://hnrss.org/frontpage"
        );
    }

    #[test]
    fn test_unparseable_url_falls_to_default_template() {
        let s = source("not a url at all", true);
        let resolved = resolve_fetch_url(&s, &relay());
        assert!(resolved.starts_with("https://relay.example.net/raw?url="));
    }

    #[test]
    fn test_default_rules_mirror_shipping_table() {
        let defaults = RelayConfig::default();
        let direct = source("https://news.google.com/rss/search?q=ai", true);
        assert_eq!(resolve_fetch_url(&direct, &defaults), direct.url);

        let hn = source("https://hnrss.org/frontpage", true);
        assert_eq!(
            resolve_fetch_url(&hn, &defaults),
            "https://cors-anywhere.herokuapp.com/https://hnrss.org/frontpage"
        );

        let other = source("https://blog.example.com/feed", true);
        assert!(resolve_fetch_url(&other, &defaults)
            .starts_with("https://api.allorigins.win/raw?url=https%3A%2F%2Fblog.example.com"));
    }
}
