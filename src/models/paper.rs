//! Paper model representing one announced-or-announceable feed entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A research paper as fetched from the source feed.
///
/// Records are immutable once fetched: the pipeline only reads them, and the
/// dedup store only ever looks at [`PaperRecord::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable unique identifier (arXiv id, feed entry id, or entry link)
    pub id: String,

    /// Paper title
    pub title: String,

    /// Authors in feed order
    pub authors: Vec<String>,

    /// Paper page URL
    pub url: String,

    /// Publication timestamp
    pub published_at: DateTime<Utc>,

    /// Abstract or feed summary, may be empty
    pub summary: String,

    /// Subject categories/tags
    pub categories: Vec<String>,
}

impl PaperRecord {
    /// Create a new record with required fields
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            url: url.into(),
            published_at,
            summary: String::new(),
            categories: Vec::new(),
        }
    }

    /// Authors joined for display, e.g. "Ada Lovelace, Alan Turing"
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }

    /// Returns true if the record carries a non-blank summary
    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

/// Builder for constructing PaperRecord objects
#[derive(Debug, Clone)]
pub struct PaperRecordBuilder {
    record: PaperRecord,
}

impl PaperRecordBuilder {
    /// Create a new builder with required fields
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record: PaperRecord::new(id, title, url, published_at),
        }
    }

    /// Append one author
    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.record.authors.push(name.into());
        self
    }

    /// Replace the author list
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set summary
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.record.summary = summary.into();
        self
    }

    /// Replace the category list
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Build the PaperRecord
    pub fn build(self) -> PaperRecord {
        self.record
    }
}
