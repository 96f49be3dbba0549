//! Mock publisher for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::PaperRecord;
use crate::publish::{DeliveryError, PublishReceipt, Publisher};

/// A publisher that records every call and fails on demand.
#[derive(Debug, Default)]
pub struct MockPublisher {
    sent: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, DeliveryError>>,
}

impl MockPublisher {
    /// Create a publisher that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish of `id` fail with `error` until cleared.
    pub fn fail_on(&self, id: &str, error: DeliveryError) {
        self.failures.lock().unwrap().insert(id.to_string(), error);
    }

    /// Stop failing for `id`.
    pub fn clear_failure(&self, id: &str) {
        self.failures.lock().unwrap().remove(id);
    }

    /// Ids successfully published, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Ids of every publish attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(&self, record: &PaperRecord) -> Result<PublishReceipt, DeliveryError> {
        self.attempts.lock().unwrap().push(record.id.clone());
        if let Some(error) = self.failures.lock().unwrap().get(&record.id) {
            return Err(error.clone());
        }
        self.sent.lock().unwrap().push(record.id.clone());
        Ok(PublishReceipt::new(&record.id, self.name()))
    }
}
