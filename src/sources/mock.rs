//! Mock feed for testing purposes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::{PaperRecord, PaperRecordBuilder};
use crate::sources::{FetchError, PaperFeed};

/// A feed that returns scripted responses.
///
/// Queued responses are returned one per `fetch` call; once the queue is
/// empty the fallback batch is returned.
#[derive(Debug, Default)]
pub struct MockFeed {
    queued: Mutex<VecDeque<Result<Vec<PaperRecord>, FetchError>>>,
    fallback: Mutex<Vec<PaperRecord>>,
    calls: Mutex<usize>,
}

impl MockFeed {
    /// Create a new mock feed that returns an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock feed that always returns `records`.
    pub fn with_records(records: Vec<PaperRecord>) -> Self {
        let feed = Self::new();
        feed.set_records(records);
        feed
    }

    /// Set the batch returned when nothing is queued.
    pub fn set_records(&self, records: Vec<PaperRecord>) {
        let mut guard = self.fallback.lock().unwrap();
        *guard = records;
    }

    /// Queue a one-shot response.
    pub fn push_response(&self, response: Result<Vec<PaperRecord>, FetchError>) {
        self.queued.lock().unwrap().push_back(response);
    }

    /// Number of times `fetch` was called.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PaperFeed for MockFeed {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Feed"
    }

    async fn fetch(&self) -> Result<Vec<PaperRecord>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(response) = self.queued.lock().unwrap().pop_front() {
            return response;
        }
        Ok(self.fallback.lock().unwrap().clone())
    }
}

/// Helper function to create a paper record for testing.
pub fn make_record(id: &str, title: &str) -> PaperRecord {
    PaperRecordBuilder::new(
        id,
        title,
        format!("http://example.com/{}", id),
        chrono::Utc::now(),
    )
    .author("Test Author")
    .build()
}
