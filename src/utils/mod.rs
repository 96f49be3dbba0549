//! Utility modules shared by feeds and publishers.
//!
//! - [`HttpClient`]: shared `reqwest` client with the bot's user agent
//! - [`RetryConfig`]: configuration for retry logic with exponential backoff
//! - [`with_retry`]: execute a feed request with automatic retry on transient errors
//! - [`plain_text`]: strip markup from feed summaries
//! - [`truncate_chars`]: cut text on a character boundary
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use latest_paper_bot::sources::FetchError;
//! use latest_paper_bot::utils::{with_retry, HttpClient, RetryConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), FetchError> {
//! let client = HttpClient::new()?;
//! let body = with_retry(RetryConfig::default(), || async {
//!     let response = client.get("https://export.arxiv.org/api/query").send().await?;
//!     Ok(response.text().await?)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;
mod text;

pub use http::{HttpClient, DEFAULT_USER_AGENT};
pub use retry::{with_retry, RetryConfig, TransientError};
pub use text::{collapse_whitespace, plain_text, truncate_chars};
