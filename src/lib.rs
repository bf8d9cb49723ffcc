//! tributary: merge many independently-operated RSS/Atom/RDF feeds into
//! one normalized, de-duplicated, chronologically ordered item stream.
//!
//! The crate is the ingestion pipeline of a feed reader: concurrent
//! retrieval of every configured source, tolerant parsing of divergent
//! feed dialects, normalization into one canonical item shape, stable
//! identity assignment, best-effort lead-image extraction, and a merged
//! newest-first result with per-source failure isolation. Presentation,
//! user state, and catalog management are somebody else's layers; they
//! consume [`AggregationResult`] snapshots and nothing more.
//!
//! # Example
//!
//! ```no_run
//! use tributary::{Aggregator, Config};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::default();
//! let sources = tributary::load_sources("sources.toml".as_ref())?;
//! let active: Vec<String> = sources.iter().map(|s| s.id.clone()).collect();
//!
//! let aggregator = Aggregator::from_config(&config)?;
//! let result = aggregator.refresh(&sources, &active).await?;
//! for item in &result.items {
//!     println!("{}  {}", item.published_at, item.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod feed;
pub mod relay;
pub mod util;

pub use aggregator::{AggregationResult, Aggregator, RefreshError, RefreshState};
pub use catalog::{load_sources, CatalogError, Source};
pub use config::{Config, ConfigError};
pub use feed::Item;
pub use relay::resolve_fetch_url;
