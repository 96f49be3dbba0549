//! Configuration management.
//!
//! Settings come from a TOML file layered under environment variables.
//! Every key can be overridden as `LATEST_PAPER_BOT__<SECTION>__<KEY>`, e.g.
//! `LATEST_PAPER_BOT__FEED__URL`. The webhook credentials are also read from
//! `FEISHU_WEBHOOK_URL` and `FEISHU_SECRET`, which win over everything else.
//!
//! # Configuration File Format
//!
//! ```toml
//! [feed]
//! kind = "rss"
//! url = "https://example.org/feed.xml"
//! max_items = 50
//! published_after = "2024-12-22T11:19:22Z"
//!
//! [notifier]
//! webhook_url = "https://open.feishu.cn/open-apis/bot/v2/hook/..."
//! secret = ""
//! utc_offset_hours = 8
//! timeout_seconds = 10
//!
//! [store]
//! path = "state/seen_ids.json"
//!
//! [schedule]
//! interval_seconds = 3600
//!
//! [logging]
//! level = "info"
//! directory = "logs"
//!
//! [retry]
//! max_attempts = 3
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::publish::MessageStyle;
use crate::utils::RetryConfig;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "paper_bot.toml";

/// Prefix of the environment overrides
pub const ENV_PREFIX: &str = "LATEST_PAPER_BOT";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub retry: RetrySettings,
}

/// Which kind of source to poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Any RSS / Atom feed URL
    #[default]
    Rss,
    /// The arXiv export API
    Arxiv,
}

/// Feed section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub kind: FeedKind,

    /// Feed URL (rss) or API endpoint override (arxiv)
    #[serde(default)]
    pub url: Option<String>,

    /// arXiv categories, e.g. "cs.CL"
    #[serde(default)]
    pub categories: Vec<String>,

    /// arXiv free-text terms
    #[serde(default)]
    pub terms: Vec<String>,

    /// Page size; 0 keeps everything
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Ignore entries published at or before this instant
    #[serde(default)]
    pub published_after: Option<DateTime<Utc>>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            kind: FeedKind::default(),
            url: None,
            categories: Vec::new(),
            terms: Vec::new(),
            max_items: default_max_items(),
            published_after: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_max_items() -> usize {
    50
}

fn default_timeout() -> u64 {
    30
}

/// Notifier section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Feishu custom bot webhook
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Signing secret; empty disables signing
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_card_title")]
    pub card_title: String,

    /// Offset used to render publication times
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// 0 omits the summary
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Pause between two messages
    #[serde(default)]
    pub min_interval_ms: u64,

    /// Request timeout for webhook calls
    #[serde(default = "default_notifier_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            secret: None,
            card_title: default_card_title(),
            utc_offset_hours: default_utc_offset(),
            summary_max_chars: default_summary_max_chars(),
            min_interval_ms: 0,
            timeout_seconds: default_notifier_timeout(),
        }
    }
}

impl NotifierConfig {
    /// Message style for publishers
    pub fn message_style(&self) -> MessageStyle {
        MessageStyle {
            heading: self.card_title.clone(),
            summary_max_chars: self.summary_max_chars,
            ..MessageStyle::default()
        }
        .with_offset_hours(self.utc_offset_hours)
    }

    /// The signing secret, if one is set and non-empty
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Pause between two messages
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn default_notifier_timeout() -> u64 {
    10
}

fn default_card_title() -> String {
    "New Paper Notification".to_string()
}

fn default_utc_offset() -> i32 {
    8
}

fn default_summary_max_chars() -> usize {
    600
}

/// Store section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("state/seen_ids.json")
}

/// Schedule section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    /// Interval used with `--debug`
    #[serde(default = "default_debug_interval")]
    pub debug_interval_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            debug_interval_seconds: default_debug_interval(),
        }
    }
}

impl ScheduleConfig {
    /// Interval between cycle starts
    pub fn interval(&self, debug: bool) -> Duration {
        if debug {
            Duration::from_secs(self.debug_interval_seconds)
        } else {
            Duration::from_secs(self.interval_seconds)
        }
    }
}

fn default_interval() -> u64 {
    3600
}

fn default_debug_interval() -> u64 {
    60
}

/// Output format for stdout logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for `paper_bot.log`; unset disables the file log
    #[serde(default = "default_log_dir")]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

/// Retry section, applied to feed requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Backoff policy for [`crate::utils::with_retry`]
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl BotConfig {
    /// Check the settings needed to start.
    ///
    /// A webhook is only required when messages are actually sent.
    pub fn validate(&self, dry_run: bool) -> Result<(), ConfigError> {
        match (self.feed.kind, self.feed.url.as_deref()) {
            (FeedKind::Rss, None) => {
                return Err(ConfigError::Invalid(
                    "feed.url is required for rss feeds".to_string(),
                ))
            }
            (_, Some(url)) => check_url("feed.url", url)?,
            (FeedKind::Arxiv, None) => {}
        }

        if self.feed.kind == FeedKind::Arxiv
            && self.feed.categories.is_empty()
            && self.feed.terms.is_empty()
        {
            tracing::warn!("arxiv feed has no categories or terms, every new submission matches");
        }

        if !dry_run {
            match self.notifier.webhook_url.as_deref() {
                Some(url) if !url.trim().is_empty() => check_url("notifier.webhook_url", url)?,
                _ => {
                    return Err(ConfigError::Invalid(
                        "notifier.webhook_url (or FEISHU_WEBHOOK_URL) is required".to_string(),
                    ))
                }
            }
        }

        if self.schedule.interval_seconds == 0 || self.schedule.debug_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "schedule intervals must be greater than zero".to_string(),
            ));
        }
        if !(-12..=14).contains(&self.notifier.utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "notifier.utc_offset_hours out of range: {}",
                self.notifier.utc_offset_hours
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write as TOML to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{} is not a valid URL ({}): {}", key, e, value)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{} must be http or https, got {}",
            key, other
        ))),
    }
}

/// Load configuration from `path` (or [`DEFAULT_CONFIG_FILE`] when present)
/// with environment overrides
pub fn load_config(path: Option<&Path>) -> Result<BotConfig, ConfigError> {
    let mut config = build_config(path, None)?;
    apply_credential_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn build_config(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<BotConfig, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("feed.categories")
                .with_list_parse_key("feed.terms")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

fn apply_credential_overrides<F>(config: &mut BotConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("FEISHU_WEBHOOK_URL").filter(|v| !v.is_empty()) {
        config.notifier.webhook_url = Some(url);
    }
    if let Some(secret) = lookup("FEISHU_SECRET").filter(|v| !v.is_empty()) {
        config.notifier.secret = Some(secret);
    }
}
