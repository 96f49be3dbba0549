//! # Latest Paper Bot
//!
//! Watches a research paper feed and announces every newly published paper
//! to a chat webhook, exactly once.
//!
//! ## Architecture
//!
//! One cycle is fetch → filter → publish → commit:
//!
//! - [`sources`]: feeds that return the current batch of candidate papers
//! - [`store`]: the durable set of already-announced ids
//! - [`publish`]: channels that send one notification per paper
//! - [`pipeline`]: runs one cycle and reports its outcome
//! - [`scheduler`]: drives cycles on a fixed interval
//! - [`config`]: configuration management
//! - [`logging`]: tracing setup
//! - [`models`]: core data structures
//! - [`utils`]: HTTP client, retry and text helpers

pub mod config;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use models::PaperRecord;
pub use pipeline::{CycleReport, Pipeline};
pub use publish::Publisher;
pub use scheduler::Scheduler;
pub use sources::PaperFeed;
pub use store::SeenStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
