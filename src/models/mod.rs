//! Core data models for fetched papers.

mod paper;

pub use paper::{PaperRecord, PaperRecordBuilder};
