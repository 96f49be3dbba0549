//! The fetch → filter → publish → commit cycle.
//!
//! One [`Pipeline::run_cycle`] call is one cycle. Records are published one
//! at a time and each successful publish is committed to the store before
//! the next record is touched, so a crash or failure mid-batch keeps every
//! announcement that already went out and loses at most the in-flight one.
//!
//! Cycle errors never escape as `Err`: the outcome, including partial
//! progress, is returned in a [`CycleReport`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::PaperRecord;
use crate::publish::{DeliveryError, Publisher};
use crate::sources::{FetchError, PaperFeed};
use crate::store::{PersistenceError, SeenStore};

/// Stages of a running cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Fetching,
    Filtering,
    Publishing,
    Committing,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Fetching => "fetching",
            CycleStage::Filtering => "filtering",
            CycleStage::Publishing => "publishing",
            CycleStage::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Final state of a cycle
#[derive(Debug)]
pub enum CycleState {
    /// Every stage ran; individual deliveries may still have failed
    Done,
    /// The cycle stopped early
    Failed {
        stage: CycleStage,
        error: CycleError,
    },
}

/// Errors that end a cycle early
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The feed could not be fetched or parsed; nothing was published
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A published record could not be marked seen
    #[error("failed to commit {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: PersistenceError,
    },
}

/// Outcome of one cycle
#[derive(Debug)]
pub struct CycleReport {
    /// 1-based cycle number within this process
    pub cycle: u64,
    /// Records returned by the feed
    pub fetched: usize,
    /// Records not yet seen
    pub new: usize,
    /// Ids published and committed, in order
    pub published: Vec<String>,
    /// Ids whose delivery failed, with the reason
    pub failed: Vec<(String, DeliveryError)>,
    /// Ids not attempted because the channel throttled us
    pub deferred: Vec<String>,
    /// Final state
    pub state: CycleState,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            fetched: 0,
            new: 0,
            published: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            state: CycleState::Done,
        }
    }

    /// Whether the cycle ran to completion
    pub fn is_done(&self) -> bool {
        matches!(self.state, CycleState::Done)
    }

    /// Whether the cycle finished with nothing left to retry
    pub fn is_clean(&self) -> bool {
        self.is_done() && self.failed.is_empty() && self.deferred.is_empty()
    }

    fn fail(mut self, stage: CycleStage, error: CycleError) -> Self {
        self.state = CycleState::Failed { stage, error };
        self
    }
}

/// Tuning knobs for the publishing stage
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Pause between two consecutive messages
    pub publish_interval: Duration,
}

/// Fetcher, dedup store and publisher wired together.
#[derive(Debug)]
pub struct Pipeline<S: SeenStore> {
    feed: Arc<dyn PaperFeed>,
    store: S,
    publisher: Arc<dyn Publisher>,
    options: PipelineOptions,
    cycles: u64,
}

impl<S: SeenStore> Pipeline<S> {
    /// Wire a pipeline
    pub fn new(feed: Arc<dyn PaperFeed>, store: S, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            feed,
            store,
            publisher,
            options: PipelineOptions::default(),
            cycles: 0,
        }
    }

    /// Override the publishing options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// The dedup store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::new(self.cycles);
        let cycle = self.cycles;

        tracing::debug!(cycle, stage = %CycleStage::Fetching, "Fetching from {}", self.feed.name());
        let batch = match self.feed.fetch().await {
            Ok(batch) => batch,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(cycle, "Fetch failed, will retry next cycle: {}", e);
                } else {
                    tracing::error!(cycle, "Fetch failed, skipping cycle: {}", e);
                }
                return report.fail(CycleStage::Fetching, e.into());
            }
        };
        report.fetched = batch.len();

        tracing::debug!(cycle, stage = %CycleStage::Filtering, "Filtering {} records", batch.len());
        let fresh = self.store.filter_new(&batch);
        report.new = fresh.len();

        if fresh.is_empty() {
            tracing::info!(cycle, fetched = report.fetched, "No new papers");
            return report;
        }
        tracing::info!(
            cycle,
            fetched = report.fetched,
            new = report.new,
            "Found {} new papers",
            report.new
        );

        for (index, record) in fresh.iter().enumerate() {
            if index > 0 && !self.options.publish_interval.is_zero() {
                tokio::time::sleep(self.options.publish_interval).await;
            }

            match self.publish_one(record).await {
                Ok(()) => report.published.push(record.id.clone()),
                Err(PublishFailure::Delivery(error)) => {
                    let throttled = matches!(error, DeliveryError::RateLimited(_));
                    report.failed.push((record.id.clone(), error));
                    if throttled {
                        report.deferred = fresh[index + 1..].iter().map(|r| r.id.clone()).collect();
                        tracing::warn!(
                            cycle,
                            "Channel is rate limiting, deferring {} remaining papers",
                            report.deferred.len()
                        );
                        break;
                    }
                }
                Err(PublishFailure::Commit(error)) => {
                    tracing::error!(cycle, "Stopping cycle: {}", error);
                    return report.fail(CycleStage::Committing, error);
                }
            }
        }

        tracing::info!(
            cycle,
            published = report.published.len(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            seen = self.store.len(),
            "Cycle finished"
        );
        report
    }

    /// Publish a single record and commit its id on success
    async fn publish_one(&mut self, record: &PaperRecord) -> Result<(), PublishFailure> {
        tracing::debug!(stage = %CycleStage::Publishing, "Publishing {}: {}", record.id, record.title);

        if let Err(error) = self.publisher.publish(record).await {
            tracing::warn!(
                "Delivery of {} via {} failed, will retry next cycle: {}",
                record.id,
                self.publisher.name(),
                error
            );
            return Err(PublishFailure::Delivery(error));
        }

        tracing::debug!(stage = %CycleStage::Committing, "Committing {}", record.id);
        self.store
            .commit(std::slice::from_ref(&record.id))
            .map_err(|source| {
                PublishFailure::Commit(CycleError::Persistence {
                    id: record.id.clone(),
                    source,
                })
            })?;

        tracing::info!("Sent notification: {}", record.title);
        Ok(())
    }
}

enum PublishFailure {
    Delivery(DeliveryError),
    Commit(CycleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::MockPublisher;
    use crate::sources::mock::make_record;
    use crate::sources::MockFeed;
    use crate::store::MemorySeenStore;

    fn pipeline(
        records: Vec<PaperRecord>,
        store: MemorySeenStore,
    ) -> (Pipeline<MemorySeenStore>, Arc<MockFeed>, Arc<MockPublisher>) {
        let feed = Arc::new(MockFeed::with_records(records));
        let publisher = Arc::new(MockPublisher::new());
        let pipeline = Pipeline::new(feed.clone(), store, publisher.clone());
        (pipeline, feed, publisher)
    }

    #[tokio::test]
    async fn test_all_published_and_committed() {
        let (mut pipeline, _, publisher) = pipeline(
            vec![make_record("a", "A"), make_record("b", "B")],
            MemorySeenStore::new(),
        );

        let report = pipeline.run_cycle().await;

        assert!(report.is_clean());
        assert_eq!(report.published, vec!["a", "b"]);
        assert_eq!(publisher.sent(), vec!["a", "b"]);
        assert_eq!(pipeline.store().ids(), vec!["a", "b"]);
        // one commit per record, not one per batch
        assert_eq!(pipeline.store().commit_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_changes_nothing() {
        let (mut pipeline, feed, publisher) = pipeline(vec![], MemorySeenStore::new());
        feed.push_response(Err(FetchError::Transient("connection reset".into())));

        let report = pipeline.run_cycle().await;

        assert!(matches!(
            report.state,
            CycleState::Failed {
                stage: CycleStage::Fetching,
                error: CycleError::Fetch(FetchError::Transient(_))
            }
        ));
        assert!(publisher.attempts().is_empty());
        assert!(pipeline.store().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_is_reported_distinctly() {
        let (mut pipeline, feed, _) = pipeline(vec![], MemorySeenStore::new());
        feed.push_response(Err(FetchError::Parse("unexpected root".into())));

        let report = pipeline.run_cycle().await;
        assert!(matches!(
            report.state,
            CycleState::Failed {
                error: CycleError::Fetch(FetchError::Parse(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delivery_failure_skips_only_that_commit() {
        let (mut pipeline, _, publisher) = pipeline(
            vec![make_record("1", "One"), make_record("2", "Two"), make_record("3", "Three")],
            MemorySeenStore::new(),
        );
        publisher.fail_on("2", DeliveryError::Network("reset".into()));

        let report = pipeline.run_cycle().await;

        assert!(report.is_done());
        assert_eq!(report.published, vec!["1", "3"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "2");
        assert_eq!(pipeline.store().ids(), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_rate_limit_defers_remaining_records() {
        let (mut pipeline, _, publisher) = pipeline(
            vec![make_record("1", "One"), make_record("2", "Two"), make_record("3", "Three")],
            MemorySeenStore::new(),
        );
        publisher.fail_on("2", DeliveryError::RateLimited("frequency limited".into()));

        let report = pipeline.run_cycle().await;

        assert_eq!(report.published, vec!["1"]);
        assert_eq!(report.deferred, vec!["3"]);
        assert_eq!(publisher.attempts(), vec!["1", "2"]);
        assert_eq!(pipeline.store().ids(), vec!["1"]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_commit_failure_stops_cycle() {
        let mut store = MemorySeenStore::new();
        store.fail_commits(true);
        let (mut pipeline, _, publisher) =
            pipeline(vec![make_record("a", "A"), make_record("b", "B")], store);

        let report = pipeline.run_cycle().await;

        assert!(matches!(
            report.state,
            CycleState::Failed {
                stage: CycleStage::Committing,
                error: CycleError::Persistence { .. }
            }
        ));
        // "a" went out but could not be recorded; "b" was never attempted
        assert_eq!(publisher.attempts(), vec!["a"]);
        assert!(report.published.is_empty());
        assert!(pipeline.store().is_empty());
    }

    #[tokio::test]
    async fn test_seen_records_are_not_republished() {
        let (mut pipeline, _, publisher) = pipeline(
            vec![make_record("a", "A"), make_record("b", "B")],
            MemorySeenStore::with_ids(["a"]),
        );

        let report = pipeline.run_cycle().await;

        assert_eq!(report.fetched, 2);
        assert_eq!(report.new, 1);
        assert_eq!(publisher.attempts(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_cycle_counter() {
        let (mut pipeline, _, _) = pipeline(vec![], MemorySeenStore::new());
        assert_eq!(pipeline.run_cycle().await.cycle, 1);
        assert_eq!(pipeline.run_cycle().await.cycle, 2);
        assert_eq!(pipeline.cycles(), 2);
    }
}
