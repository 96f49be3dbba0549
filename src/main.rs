use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use latest_paper_bot::config::{load_config, BotConfig, DEFAULT_CONFIG_FILE};
use latest_paper_bot::pipeline::{CycleError, CycleReport, CycleState, Pipeline, PipelineOptions};
use latest_paper_bot::publish::{FeishuPublisher, LogPublisher, Publisher};
use latest_paper_bot::scheduler::{shutdown_signal, Scheduler};
use latest_paper_bot::sources::{build_feed, PaperFeed};
use latest_paper_bot::store::{FileSeenStore, MemorySeenStore, SeenStore};
use latest_paper_bot::utils::{HttpClient, DEFAULT_USER_AGENT};
use latest_paper_bot::{logging, VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Latest Paper Bot - announce newly published papers to a chat webhook
#[derive(Parser, Debug)]
#[command(name = "latest-paper-bot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Watch a paper feed and announce new papers to a chat webhook", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug mode: short check interval and debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Log notifications instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Ignore papers published at or before this time
    /// (RFC 3339, or "YYYY-MM-DD HH:MM:SS" in the notifier's UTC offset)
    #[arg(long, global = true)]
    reference_time: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the feed on a fixed interval until interrupted (default)
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Run a single cycle and exit
    Once,

    /// Write a configuration file with default values
    InitConfig {
        /// Where to write the file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the ids already announced
    Seen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { max_cycles: None });

    if let Commands::InitConfig { path, force } = &command {
        return init_config(path, *force);
    }

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(reference) = &cli.reference_time {
        let offset = config.notifier.message_style().offset;
        config.feed.published_after = Some(parse_reference_time(reference, offset)?);
    }

    let level = if cli.quiet {
        Some("error")
    } else {
        match cli.verbose {
            0 if cli.debug => Some("debug"),
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    };
    logging::init(&config.logging, level).context("Failed to initialise logging")?;

    let store = FileSeenStore::open(&config.store.path).with_context(|| {
        format!("Failed to read seen ids from {}", config.store.path.display())
    })?;

    if let Commands::Seen = command {
        for id in store.ids() {
            println!("{}", id);
        }
        return Ok(());
    }

    config
        .validate(cli.dry_run)
        .context("Invalid configuration")?;

    tracing::info!("latest-paper-bot {} starting", VERSION);
    if let Some(cutoff) = config.feed.published_after {
        tracing::info!("Ignoring papers published at or before {}", cutoff);
    }

    let feed: Arc<dyn PaperFeed> =
        Arc::from(build_feed(&config.feed, &config.retry).context("Failed to set up feed")?);
    let publisher = build_publisher(&config, cli.dry_run)?;
    let options = PipelineOptions {
        publish_interval: config.notifier.publish_interval(),
    };
    let interval = config.schedule.interval(cli.debug);

    if cli.dry_run {
        // filter against the real state but never write it
        let snapshot = MemorySeenStore::with_ids(store.ids());
        let pipeline = Pipeline::new(feed, snapshot, publisher).with_options(options);
        drive(pipeline, command, interval).await
    } else {
        let pipeline = Pipeline::new(feed, store, publisher).with_options(options);
        drive(pipeline, command, interval).await
    }
}

async fn drive<S: SeenStore>(
    mut pipeline: Pipeline<S>,
    command: Commands,
    interval: Duration,
) -> Result<()> {
    match command {
        Commands::Once => once_outcome(&pipeline.run_cycle().await),
        Commands::Run { max_cycles } => {
            let mut scheduler = Scheduler::new(interval);
            if let Some(n) = max_cycles {
                scheduler = scheduler.with_max_cycles(n);
            }
            scheduler.run(&mut pipeline, shutdown_signal()).await;
            Ok(())
        }
        Commands::InitConfig { .. } | Commands::Seen => Ok(()),
    }
}

/// Only a lost commit fails `once`; fetch problems are retried by the next run
fn once_outcome(report: &CycleReport) -> Result<()> {
    match &report.state {
        CycleState::Failed {
            stage,
            error: error @ CycleError::Persistence { .. },
        } => bail!("Cycle failed while {}: {}", stage, error),
        CycleState::Failed { stage, error } => {
            tracing::warn!("Cycle ended while {}: {}", stage, error);
            Ok(())
        }
        CycleState::Done => Ok(()),
    }
}

fn build_publisher(config: &BotConfig, dry_run: bool) -> Result<Arc<dyn Publisher>> {
    let style = config.notifier.message_style();
    if dry_run {
        tracing::info!("Dry run: notifications are logged, not sent");
        return Ok(Arc::new(LogPublisher::new(style)));
    }

    let webhook_url = config
        .notifier
        .webhook_url
        .clone()
        .context("notifier.webhook_url is not set")?;
    let client = HttpClient::with_timeout(
        DEFAULT_USER_AGENT,
        Duration::from_secs(config.notifier.timeout_seconds),
    )
    .context("Failed to build HTTP client")?;

    let mut publisher = FeishuPublisher::new(client, webhook_url, style);
    if let Some(secret) = config.notifier.signing_secret() {
        publisher = publisher.with_secret(secret);
    }
    Ok(Arc::new(publisher))
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    BotConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    println!("Set feed.url and notifier.webhook_url (or FEISHU_WEBHOOK_URL) before running.");
    Ok(())
}

fn parse_reference_time(value: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("Invalid --reference-time: {}", value))?;
    match offset.from_local_datetime(&naive).single() {
        Some(dt) => Ok(dt.with_timezone(&Utc)),
        None => bail!("Ambiguous --reference-time: {}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latest_paper_bot::pipeline::CycleStage;
    use latest_paper_bot::sources::FetchError;
    use latest_paper_bot::store::PersistenceError;

    #[test]
    fn test_reference_time_formats() {
        let beijing = FixedOffset::east_opt(8 * 3600).unwrap();

        let local = parse_reference_time("2024-12-22 19:19:22", beijing).unwrap();
        assert_eq!(local.to_rfc3339(), "2024-12-22T11:19:22+00:00");

        let rfc = parse_reference_time("2024-12-22T11:19:22Z", beijing).unwrap();
        assert_eq!(rfc, local);

        assert!(parse_reference_time("yesterday", beijing).is_err());
    }

    fn report(state: CycleState) -> CycleReport {
        CycleReport {
            cycle: 1,
            fetched: 0,
            new: 0,
            published: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            state,
        }
    }

    #[test]
    fn test_once_fails_only_on_lost_commit() {
        assert!(once_outcome(&report(CycleState::Done)).is_ok());

        let fetch = report(CycleState::Failed {
            stage: CycleStage::Fetching,
            error: CycleError::Fetch(FetchError::Transient("timeout".into())),
        });
        assert!(once_outcome(&fetch).is_ok());

        let commit = report(CycleState::Failed {
            stage: CycleStage::Committing,
            error: CycleError::Persistence {
                id: "a".into(),
                source: PersistenceError::Unavailable("disk full".into()),
            },
        });
        assert!(once_outcome(&commit).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["latest-paper-bot", "--dry-run", "once"]).unwrap();
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Some(Commands::Once)));

        let cli = Cli::try_parse_from(["latest-paper-bot", "run", "--max-cycles", "2", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Some(Commands::Run { max_cycles: Some(2) })));
    }
}
