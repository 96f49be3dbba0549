//! Timer driving pipeline cycles.
//!
//! The first cycle starts immediately. Cycles never overlap: a cycle that
//! runs longer than the interval pushes the next tick back instead of
//! firing a burst of catch-up cycles. Shutdown is only observed between
//! cycles, so an in-flight publish and its commit always finish.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::pipeline::Pipeline;
use crate::store::SeenStore;

/// Totals over a scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles started
    pub cycles: u64,
    /// Cycles that ended early
    pub failed_cycles: u64,
    /// Papers published and committed
    pub published: usize,
}

/// Runs a pipeline on a fixed interval.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    max_cycles: Option<u64>,
}

impl Scheduler {
    /// Scheduler firing every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }

    /// Stop after `n` cycles
    pub fn with_max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }

    /// Run cycles until `shutdown` resolves or the cycle limit is hit
    pub async fn run<S, F>(&self, pipeline: &mut Pipeline<S>, shutdown: F) -> RunSummary
    where
        S: SeenStore,
        F: Future<Output = ()>,
    {
        let mut summary = RunSummary::default();
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("Scheduler started, interval {}s", self.interval.as_secs_f64());

        loop {
            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                tracing::info!("Reached {} cycles, stopping", summary.cycles);
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = timer.tick() => {}
            }

            let report = pipeline.run_cycle().await;
            summary.cycles += 1;
            summary.published += report.published.len();
            if !report.is_done() {
                summary.failed_cycles += 1;
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            failed = summary.failed_cycles,
            published = summary.published,
            "Scheduler stopped"
        );
        summary
    }
}

/// Resolves on Ctrl-C (and SIGTERM on unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::MockPublisher;
    use crate::sources::mock::make_record;
    use crate::sources::{FetchError, MockFeed};
    use crate::store::MemorySeenStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_requested_cycles() {
        let feed = Arc::new(MockFeed::with_records(vec![make_record("a", "A")]));
        let publisher = Arc::new(MockPublisher::new());
        let mut pipeline = Pipeline::new(feed.clone(), MemorySeenStore::new(), publisher.clone());

        let summary = Scheduler::new(Duration::from_millis(5))
            .with_max_cycles(3)
            .run(&mut pipeline, std::future::pending())
            .await;

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.published, 1);
        assert_eq!(feed.calls(), 3);
        assert_eq!(publisher.sent(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_loop() {
        let feed = Arc::new(MockFeed::with_records(vec![make_record("a", "A")]));
        feed.push_response(Err(FetchError::Transient("timeout".into())));
        let publisher = Arc::new(MockPublisher::new());
        let mut pipeline = Pipeline::new(feed.clone(), MemorySeenStore::new(), publisher.clone());

        let summary = Scheduler::new(Duration::from_millis(5))
            .with_max_cycles(2)
            .run(&mut pipeline, std::future::pending())
            .await;

        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.failed_cycles, 1);
        assert_eq!(publisher.sent(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick_runs_nothing() {
        let feed = Arc::new(MockFeed::new());
        let mut pipeline = Pipeline::new(
            feed.clone(),
            MemorySeenStore::new(),
            Arc::new(MockPublisher::new()),
        );

        let summary = Scheduler::new(Duration::from_secs(3600))
            .run(&mut pipeline, async {})
            .await;

        assert_eq!(summary.cycles, 0);
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_between_cycles() {
        let feed = Arc::new(MockFeed::new());
        let mut pipeline = Pipeline::new(
            feed.clone(),
            MemorySeenStore::new(),
            Arc::new(MockPublisher::new()),
        );

        let summary = Scheduler::new(Duration::from_secs(3600))
            .run(&mut pipeline, tokio::time::sleep(Duration::from_millis(50)))
            .await;

        // the first tick is immediate, the second is an hour away
        assert_eq!(summary.cycles, 1);
        assert_eq!(feed.calls(), 1);
    }

    /// Feed whose first fetch takes longer than the interval
    #[derive(Debug, Default)]
    struct SlowFeed {
        starts: std::sync::Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait::async_trait]
    impl crate::sources::PaperFeed for SlowFeed {
        fn id(&self) -> &str {
            "slow"
        }

        fn name(&self) -> &str {
            "Slow"
        }

        async fn fetch(&self) -> Result<Vec<crate::models::PaperRecord>, FetchError> {
            let first = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(tokio::time::Instant::now());
                starts.len() == 1
            };
            if first {
                tokio::time::sleep(Duration::from_secs(35)).await;
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_cycle_delays_next_tick_without_burst() {
        let feed = Arc::new(SlowFeed::default());
        let mut pipeline = Pipeline::new(
            feed.clone(),
            MemorySeenStore::new(),
            Arc::new(MockPublisher::new()),
        );

        Scheduler::new(Duration::from_secs(10))
            .with_max_cycles(4)
            .run(&mut pipeline, std::future::pending())
            .await;

        let starts = feed.starts.lock().unwrap().clone();
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        // the missed 10s and 20s ticks are not replayed back to back
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(35),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }
}
