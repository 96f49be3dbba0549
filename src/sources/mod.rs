//! Paper feed plugins.
//!
//! This module defines the [`PaperFeed`] trait that every source implements.
//! A feed knows how to turn one network query into an ordered batch of
//! [`PaperRecord`]s and nothing else: it never looks at the seen set.
//!
//! # Available Feeds
//!
//! - [`RssFeed`] - any RSS 2.0 / Atom / JSON feed URL
//! - [`ArxivFeed`] - the arXiv export API, newest submissions first
//! - [`MockFeed`] - scripted responses for tests
//!
//! # Errors
//!
//! A failed fetch never yields partial results. Failures are split into
//! transient ones ([`FetchError::Transient`], [`FetchError::RateLimited`]),
//! which the caller retries on the next cycle, and [`FetchError::Parse`],
//! which signals that the source changed its response shape.

mod arxiv;
pub mod mock;
mod rss;

pub use arxiv::ArxivFeed;
pub use mock::MockFeed;
pub use rss::RssFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{FeedConfig, FeedKind, RetrySettings};
use crate::models::PaperRecord;
use crate::utils::{with_retry, HttpClient, RetryConfig, TransientError};

/// A source of candidate papers.
#[async_trait]
pub trait PaperFeed: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs (e.g. "rss", "arxiv")
    fn id(&self) -> &str;

    /// Human-readable name of this feed
    fn name(&self) -> &str;

    /// Fetch the current batch of candidate papers, in feed order
    async fn fetch(&self) -> Result<Vec<PaperRecord>, FetchError>;
}

/// Errors that can occur when fetching from a feed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Network or availability problem, expected to resolve on retry
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// The source asked us to slow down
    #[error("Rate limited by source")]
    RateLimited {
        /// Seconds from a Retry-After header, when present
        retry_after: Option<u64>,
    },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// The feed was configured with parameters the source rejects
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether the failure is expected to self-resolve
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match TransientError::from_reqwest_error(&err) {
            Some(TransientError::RateLimit(retry_after)) => FetchError::RateLimited { retry_after },
            Some(TransientError::Network) => FetchError::Transient(err.to_string()),
            None if err.is_decode() || err.is_body() => FetchError::Transient(err.to_string()),
            None => FetchError::InvalidRequest(err.to_string()),
        }
    }
}

/// Build the feed described by the configuration
pub fn build_feed(config: &FeedConfig, retry: &RetrySettings) -> Result<Box<dyn PaperFeed>, FetchError> {
    let client = HttpClient::with_timeout(
        crate::utils::DEFAULT_USER_AGENT,
        std::time::Duration::from_secs(config.timeout_seconds),
    )
    .map_err(|e| FetchError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;
    let window = FeedWindow::from_config(config);
    let retry = retry.to_retry_config();

    let feed: Box<dyn PaperFeed> = match config.kind {
        FeedKind::Rss => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| FetchError::InvalidRequest("feed.url is required for rss feeds".to_string()))?;
            Box::new(RssFeed::new(client, url, window, retry))
        }
        FeedKind::Arxiv => Box::new(
            ArxivFeed::new(client, window, retry)
                .with_categories(config.categories.clone())
                .with_terms(config.terms.clone())
                .with_endpoint(config.url.clone()),
        ),
    };

    Ok(feed)
}

/// Cutoff and size limits applied to every fetched batch
#[derive(Debug, Clone, Default)]
pub struct FeedWindow {
    /// Entries published at or before this instant are dropped
    pub published_after: Option<DateTime<Utc>>,
    /// Keep at most this many entries (feed order)
    pub max_items: Option<usize>,
}

impl FeedWindow {
    /// Window from the feed section of the config
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            published_after: config.published_after,
            max_items: Some(config.max_items).filter(|n| *n > 0),
        }
    }

    /// Apply the cutoff, then the size limit, preserving order
    pub fn apply(&self, records: Vec<PaperRecord>) -> Vec<PaperRecord> {
        let mut kept: Vec<PaperRecord> = match self.published_after {
            Some(cutoff) => records
                .into_iter()
                .filter(|r| r.published_at > cutoff)
                .collect(),
            None => records,
        };
        if let Some(max) = self.max_items {
            kept.truncate(max);
        }
        kept
    }
}

/// GET a feed document, retrying transient failures, and return its body
async fn get_feed_body(
    client: &HttpClient,
    url: &str,
    accept: &str,
    retry: RetryConfig,
) -> Result<Vec<u8>, FetchError> {
    with_retry(retry, move || async move {
        let response = client.get(url).header("Accept", accept).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("{} returned status {}", url, status)));
        }
        if !status.is_success() {
            return Err(FetchError::InvalidRequest(format!("{} returned status {}", url, status)));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    })
    .await
}
