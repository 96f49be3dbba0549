//! Notification publishers.
//!
//! A [`Publisher`] turns one [`PaperRecord`] into one outgoing message. It
//! must report every delivery failure: the pipeline only commits a record's
//! id after `publish` returned `Ok`, so a swallowed error would mark a paper
//! as announced when nobody saw it.
//!
//! - [`FeishuPublisher`] - Feishu / Lark custom bot webhook (interactive card)
//! - [`LogPublisher`] - writes the message to the log, for dry runs
//! - [`MockPublisher`] - scripted outcomes for tests

mod dry_run;
mod feishu;
mod format;
pub mod mock;

pub use dry_run::LogPublisher;
pub use feishu::{FeishuPublisher, FeishuSigner};
pub use format::{format_text, MessageStyle};
pub use mock::MockPublisher;

use async_trait::async_trait;

use crate::models::PaperRecord;

/// A channel that announces papers.
#[async_trait]
pub trait Publisher: Send + Sync + std::fmt::Debug {
    /// Channel name used in logs and receipts
    fn name(&self) -> &str;

    /// Format and send one notification for `record`
    async fn publish(&self, record: &PaperRecord) -> Result<PublishReceipt, DeliveryError>;
}

/// Proof of a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Id of the announced record
    pub record_id: String,
    /// Channel that accepted the message
    pub channel: String,
    /// Channel-specific detail (e.g. response message)
    pub detail: Option<String>,
}

impl PublishReceipt {
    /// Receipt without detail
    pub fn new(record_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            channel: channel.into(),
            detail: None,
        }
    }

    /// Attach channel detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Errors that can occur when delivering a notification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The channel is throttling us
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Credentials or signature were rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or HTTP transport error
    #[error("Network error: {0}")]
    Network(String),

    /// The channel answered but refused the message
    #[error("Rejected by channel (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The message could not be built
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err.to_string())
    }
}
