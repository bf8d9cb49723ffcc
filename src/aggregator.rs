//! The aggregator: fans one refresh cycle out across every active source,
//! isolates per-source failures, and merges the survivors into a single
//! chronological stream.
//!
//! All mutable aggregation state lives in one owned instance (an atomic
//! Idle/Running flag and the latest published snapshot) rather than flags
//! scattered across call sites. The no-overlap rule on the flag is the only
//! synchronization contract: each fetch task owns its own output slice, so
//! nothing else needs a lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Source;
use crate::config::{Config, RelayConfig};
use crate::feed::{fetch_source, DocumentError, FetchError, ImageExtractor, Item};

/// Bound on simultaneous in-flight fetches per cycle.
const MAX_CONCURRENT_FETCHES: usize = 10;

/// The only hard failure `refresh` can produce: the caller asked for a
/// source that isn't in the catalog. Transient network and format problems
/// never surface here; they degrade the result instead.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("active source id '{0}' is not present in the catalog")]
    UnknownSource(String),
}

/// Whether a refresh cycle is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Running,
}

/// One published snapshot: the merged item stream of a completed cycle.
///
/// Items are ordered newest-first by `published_at`; ties keep the source
/// iteration order of the cycle that produced them. Consumers always see a
/// whole snapshot; cycles replace it atomically, never patch it.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub items: Vec<Item>,
    pub refresh_started_at: DateTime<Utc>,
}

/// Owns the refresh state machine and the latest snapshot.
pub struct Aggregator {
    client: reqwest::Client,
    relay: RelayConfig,
    images: ImageExtractor,
    fetch_timeout: Duration,
    refreshing: AtomicBool,
    latest: RwLock<Arc<AggregationResult>>,
}

impl Aggregator {
    /// Builds an aggregator from configuration: HTTP client, relay table,
    /// compiled image rules, timeouts.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tributary/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let images = ImageExtractor::from_config(&config.images)
            .context("Failed to compile image extraction rules")?;

        Ok(Self {
            client,
            relay: config.relay.clone(),
            images,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            refreshing: AtomicBool::new(false),
            latest: RwLock::new(Arc::new(AggregationResult {
                items: Vec::new(),
                refresh_started_at: Utc::now(),
            })),
        })
    }

    /// The most recently published snapshot. Before the first completed
    /// cycle this is an empty result stamped at construction time.
    pub fn latest(&self) -> Arc<AggregationResult> {
        Arc::clone(&self.latest.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Current state of the refresh state machine.
    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::Acquire) {
            RefreshState::Running
        } else {
            RefreshState::Idle
        }
    }

    /// Runs one refresh cycle over the catalog filtered to `active_ids`.
    ///
    /// Fan-out is bounded and order-preserving: results are concatenated in
    /// source iteration order no matter which fetch finishes first, so the
    /// stable sort's tie-breaking is deterministic. Every per-source
    /// failure (network, timeout, empty body, malformed XML, unrecognized
    /// shape) is logged and contributes zero items without touching its
    /// siblings.
    ///
    /// A call while a cycle is already running is a no-op: it returns the
    /// current snapshot immediately and starts nothing, which is what keeps
    /// manual and scheduled triggers from racing on the result buffer.
    ///
    /// # Errors
    ///
    /// [`RefreshError::UnknownSource`] when `active_ids` references a
    /// source missing from `sources`, a caller bug, checked before the
    /// cycle starts.
    pub async fn refresh(
        &self,
        sources: &[Source],
        active_ids: &[String],
    ) -> Result<Arc<AggregationResult>, RefreshError> {
        for id in active_ids {
            if !sources.iter().any(|s| &s.id == id) {
                return Err(RefreshError::UnknownSource(id.clone()));
            }
        }

        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Refresh already running, trigger ignored");
            return Ok(self.latest());
        }

        let refresh_started_at = Utc::now();
        let active: Vec<&Source> = sources
            .iter()
            .filter(|s| active_ids.contains(&s.id))
            .collect();
        tracing::info!(sources = active.len(), "Refresh cycle started");

        let mut fetches = Vec::with_capacity(active.len());
        for source in active {
            fetches.push(self.fetch_isolated(source));
        }
        let per_source: Vec<Vec<Item>> = stream::iter(fetches)
            .buffered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut items: Vec<Item> = per_source.into_iter().flatten().collect();
        // Stable sort: equal timestamps keep their concatenation order,
        // which is the source iteration order
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        tracing::info!(items = items.len(), "Refresh cycle complete");
        let result = Arc::new(AggregationResult {
            items,
            refresh_started_at,
        });
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&result);
        self.refreshing.store(false, Ordering::Release);
        Ok(result)
    }

    /// One source's slice of the cycle. Failures are contained here; the
    /// only caller-visible effect of any error is a smaller merged set.
    async fn fetch_isolated(&self, source: &Source) -> Vec<Item> {
        match fetch_source(
            &self.client,
            source,
            &self.relay,
            &self.images,
            self.fetch_timeout,
        )
        .await
        {
            Ok(items) => {
                tracing::debug!(source = %source.id, items = items.len(), "Source refreshed");
                items
            }
            Err(e) => {
                log_fetch_error(source, &e);
                Vec::new()
            }
        }
    }

    /// Drives `refresh` on a fixed interval, sharing its no-overlap
    /// guarantee with manual triggers. The first cycle runs immediately.
    /// Only returns on an invariant violation.
    pub async fn run_periodic(
        &self,
        sources: &[Source],
        active_ids: &[String],
        period: Duration,
    ) -> Result<(), RefreshError> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.refresh(sources, active_ids).await?;
        }
    }
}

fn log_fetch_error(source: &Source, error: &FetchError) {
    match error {
        // Distinct from plain network failure: usually a relay returning
        // a blank 200 for a misconfigured target
        FetchError::Document(DocumentError::Empty) => {
            tracing::warn!(source = %source.id, "Empty response body (possible relay misconfiguration)");
        }
        FetchError::Document(DocumentError::Malformed { message, snippet }) => {
            tracing::warn!(source = %source.id, error = %message, payload = %snippet, "Malformed feed document");
        }
        FetchError::Normalize(e) => {
            tracing::warn!(source = %source.id, error = %e, "Feed shape not recognized");
        }
        FetchError::Timeout => {
            tracing::warn!(source = %source.id, "Fetch timed out");
        }
        e => {
            tracing::warn!(source = %source.id, error = %e, "Fetch failed");
        }
    }
}
