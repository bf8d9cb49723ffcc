use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;

use crate::catalog::Source;
use crate::config::RelayConfig;
use crate::feed::document::{Document, DocumentError};
use crate::feed::image::ImageExtractor;
use crate::feed::normalize::{normalize, Item, NormalizeError};
use crate::relay::resolve_fetch_url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Everything that can go wrong for one source during a refresh cycle.
///
/// None of these abort the cycle; the aggregator logs them and the source
/// contributes zero items until the next cycle retries it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Fetch exceeded the per-source timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was empty or not well-formed XML
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// XML parsed but held no recognizable feed
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Runs the full pipeline for one source: resolve the fetch URL through
/// the relay rules, GET it under `timeout`, parse the body into a generic
/// document, normalize to canonical items.
///
/// The timeout covers the whole network phase (connect through body read);
/// parsing and normalization are synchronous and not under it.
pub async fn fetch_source(
    client: &reqwest::Client,
    source: &Source,
    relay: &RelayConfig,
    images: &ImageExtractor,
    timeout: Duration,
) -> Result<Vec<Item>, FetchError> {
    let fetch_url = resolve_fetch_url(source, relay);
    tracing::debug!(source = %source.id, url = %fetch_url, "Fetching feed");

    let bytes = tokio::time::timeout(timeout, fetch_bytes(client, &fetch_url))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let fetched_at = Utc::now();
    let doc = Document::parse(&bytes)?;
    let items = normalize(&doc, source, images, fetched_at)?;
    Ok(items)
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await.map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when the server sends one
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;
    use std::collections::HashMap;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item>
        <title>Test</title>
        <link>https://example.com/posts/test</link>
        <description>body text</description>
        <pubDate>Mon, 15 Jan 2024 10:30:00 +0000</pubDate>
    </item>
</channel></rss>"#;

    fn test_source(url: &str) -> Source {
        Source {
            id: "test".to_string(),
            title: "Test".to_string(),
            url: url.to_string(),
            category: "Tech".to_string(),
            relay_required: false,
        }
    }

    fn no_images() -> ImageExtractor {
        ImageExtractor::from_config(&ImageConfig {
            defaults: HashMap::new(),
            sources: Vec::new(),
        })
        .unwrap()
    }

    async fn fetch(url: &str) -> Result<Vec<Item>, FetchError> {
        let client = reqwest::Client::new();
        fetch_source(
            &client,
            &test_source(url),
            &RelayConfig::default(),
            &no_images(),
            Duration::from_secs(5),
        )
        .await
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let items = fetch(&format!("{}/feed", mock_server.uri())).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Test");
        assert_eq!(items[0].summary, "body text");
    }

    #[tokio::test]
    async fn test_fetch_404() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let err = fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Document(DocumentError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_distinct() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("   \n  "))
            .mount(&mock_server)
            .await;

        let err = fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Document(DocumentError::Empty)));
    }

    #[tokio::test]
    async fn test_fetch_unrecognized_shape() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"),
            )
            .mount(&mock_server)
            .await;

        let err = fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Normalize(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_source(
            &client,
            &test_source(&format!("{}/feed", mock_server.uri())),
            &RelayConfig::default(),
            &no_images(),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_fetch_empty_feed_yields_no_items() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let items = fetch(&format!("{}/feed", mock_server.uri())).await.unwrap();
        assert!(items.is_empty());
    }
}
