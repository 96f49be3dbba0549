//! Dry-run publisher that writes notifications to the log.

use async_trait::async_trait;

use crate::models::PaperRecord;
use crate::publish::{format_text, DeliveryError, MessageStyle, PublishReceipt, Publisher};

/// Logs the formatted message instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher {
    style: MessageStyle,
}

impl LogPublisher {
    /// Create a log publisher with the given style
    pub fn new(style: MessageStyle) -> Self {
        Self { style }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, record: &PaperRecord) -> Result<PublishReceipt, DeliveryError> {
        let text = format_text(record, &self.style);
        tracing::info!(target: "latest_paper_bot::notification", "\n{}", text);
        Ok(PublishReceipt::new(&record.id, self.name()).with_detail(text))
    }
}
