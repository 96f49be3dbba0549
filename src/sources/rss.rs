//! Generic RSS / Atom feed source.

use async_trait::async_trait;
use chrono::Utc;
use feed_rs::model::{Entry, Link, Text};
use feed_rs::parser;

use crate::models::{PaperRecord, PaperRecordBuilder};
use crate::sources::{get_feed_body, FeedWindow, FetchError, PaperFeed};
use crate::utils::{collapse_whitespace, plain_text, HttpClient, RetryConfig};

const ACCEPT_FEED: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8";

/// A paper feed backed by any RSS 2.0, Atom or JSON Feed URL.
///
/// Entry ids come from the feed (`<guid>` / `<id>`). Entries without one are
/// identified by their first link, so re-fetching the same feed always
/// yields the same ids.
#[derive(Debug, Clone)]
pub struct RssFeed {
    client: HttpClient,
    url: String,
    window: FeedWindow,
    retry: RetryConfig,
}

impl RssFeed {
    /// Create a new feed source for `url`
    pub fn new(client: HttpClient, url: impl Into<String>, window: FeedWindow, retry: RetryConfig) -> Self {
        Self {
            client,
            url: url.into(),
            window,
            retry,
        }
    }

    /// Parse a feed document into records, in document order
    pub fn parse_document(body: &[u8]) -> Result<Vec<PaperRecord>, FetchError> {
        let feed = parser::Builder::new()
            .id_generator(link_as_id)
            .build()
            .parse(body)
            .map_err(|e| FetchError::Parse(format!("Failed to parse feed: {}", e)))?;

        feed.entries.iter().map(Self::parse_entry).collect()
    }

    fn parse_entry(entry: &Entry) -> Result<PaperRecord, FetchError> {
        let url = primary_link(&entry.links)
            .ok_or_else(|| FetchError::Parse(format!("Entry '{}' has no link", entry.id)))?;

        let id = if entry.id.trim().is_empty() {
            url.clone()
        } else {
            entry.id.trim().to_string()
        };

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Parse(format!("Entry '{}' has no title", id)))?;

        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .map(|s| plain_text(&s))
            .unwrap_or_default();

        let published_at = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

        Ok(PaperRecordBuilder::new(id, title, url, published_at)
            .authors(
                entry
                    .authors
                    .iter()
                    .map(|a| collapse_whitespace(&a.name))
                    .filter(|a| !a.is_empty()),
            )
            .summary(summary)
            .categories(entry.categories.iter().map(|c| c.term.clone()))
            .build())
    }
}

#[async_trait]
impl PaperFeed for RssFeed {
    fn id(&self) -> &str {
        "rss"
    }

    fn name(&self) -> &str {
        "RSS feed"
    }

    async fn fetch(&self) -> Result<Vec<PaperRecord>, FetchError> {
        let body = get_feed_body(&self.client, &self.url, ACCEPT_FEED, self.retry).await?;
        let records = Self::parse_document(&body)?;
        let total = records.len();
        let records = self.window.apply(records);

        tracing::debug!(
            "Parsed {} entries from {}, {} inside the fetch window",
            total,
            self.url,
            records.len()
        );
        Ok(records)
    }
}

/// Prefer the alternate (HTML page) link, then any link
fn primary_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Id for entries that carry none: their primary link
fn link_as_id(links: &[Link], _title: &Option<Text>, _uri: Option<&str>) -> String {
    primary_link(links).unwrap_or_default()
}
