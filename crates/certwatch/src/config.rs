//! Configuration management.
//!
//! Everything is environment-driven with sensible defaults; the CLI only
//! supplies the database connection string and the per-invocation switches.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Sync tuning defaults
// ============================================================================

/// Parallel downloaders per log.
pub const DEFAULT_DOWNLOADERS_PER_LOG: i64 = 30;

/// Shared parser workers.
pub const DEFAULT_PARSERS: usize = 4;

/// Bound of the downloader-to-parser queue.
pub const DEFAULT_PARSE_QUEUE_CAPACITY: usize = 1000;

/// Bound of the parser-to-inserter queue.
pub const DEFAULT_INSERT_QUEUE_CAPACITY: usize = 10_000;

/// Base retry wait in seconds; attempt N waits N times this.
pub const DEFAULT_RETRY_WAIT_SECS: u64 = 1;

/// Attempts before a batch is abandoned.
pub const DEFAULT_BATCH_ATTEMPTS: u32 = 10;

/// Soft sleep between get-entries requests within one batch. Empirical:
/// keeps the busier logs from throttling a full downloader fan-out.
pub const DEFAULT_BATCH_THROTTLE_SECS: u64 = 1;

/// Attempts before a failing get-sth aborts the run.
pub const DEFAULT_HEAD_ATTEMPTS: u32 = 50;

/// HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default dump file location.
pub const DEFAULT_DUMP_PATH: &str = "./certwatch-dump.jsonl";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub notify: NotifyConfig,
    pub dump_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment and validate it.
    pub fn load() -> anyhow::Result<Self> {
        let config = Config {
            sync: SyncConfig::from_env(),
            notify: NotifyConfig::from_env()?,
            dump_path: std::env::var("DUMP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DUMP_PATH)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.sync.validate()?;
        self.notify.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            notify: NotifyConfig::default(),
            dump_path: PathBuf::from(DEFAULT_DUMP_PATH),
        }
    }
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub downloaders_per_log: i64,
    pub parsers: usize,
    pub parse_queue_capacity: usize,
    pub insert_queue_capacity: usize,
    pub retry_wait_secs: u64,
    pub batch_attempts: u32,
    pub batch_throttle_secs: u64,
    pub head_attempts: u32,
    pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            downloaders_per_log: DEFAULT_DOWNLOADERS_PER_LOG,
            parsers: DEFAULT_PARSERS,
            parse_queue_capacity: DEFAULT_PARSE_QUEUE_CAPACITY,
            insert_queue_capacity: DEFAULT_INSERT_QUEUE_CAPACITY,
            retry_wait_secs: DEFAULT_RETRY_WAIT_SECS,
            batch_attempts: DEFAULT_BATCH_ATTEMPTS,
            batch_throttle_secs: DEFAULT_BATCH_THROTTLE_SECS,
            head_attempts: DEFAULT_HEAD_ATTEMPTS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Read overrides from `SYNC_*` environment variables. Unparseable
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            downloaders_per_log: env_parse("SYNC_DOWNLOADERS_PER_LOG", DEFAULT_DOWNLOADERS_PER_LOG),
            parsers: env_parse("SYNC_PARSERS", DEFAULT_PARSERS),
            parse_queue_capacity: env_parse("SYNC_PARSE_QUEUE", DEFAULT_PARSE_QUEUE_CAPACITY),
            insert_queue_capacity: env_parse("SYNC_INSERT_QUEUE", DEFAULT_INSERT_QUEUE_CAPACITY),
            retry_wait_secs: env_parse("SYNC_RETRY_WAIT_SECS", DEFAULT_RETRY_WAIT_SECS),
            batch_attempts: env_parse("SYNC_BATCH_ATTEMPTS", DEFAULT_BATCH_ATTEMPTS),
            batch_throttle_secs: env_parse("SYNC_BATCH_THROTTLE_SECS", DEFAULT_BATCH_THROTTLE_SECS),
            head_attempts: env_parse("SYNC_HEAD_ATTEMPTS", DEFAULT_HEAD_ATTEMPTS),
            http_timeout_secs: env_parse("SYNC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.downloaders_per_log <= 0 {
            anyhow::bail!("downloaders_per_log must be greater than 0");
        }
        if self.parsers == 0 {
            anyhow::bail!("parsers must be greater than 0");
        }
        if self.parse_queue_capacity == 0 || self.insert_queue_capacity == 0 {
            anyhow::bail!("queue capacities must be greater than 0");
        }
        if self.batch_attempts == 0 || self.head_attempts == 0 {
            anyhow::bail!("retry attempt budgets must be greater than 0");
        }
        Ok(())
    }
}

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyTransport {
    #[default]
    Smtp,
    Sendmail,
}

impl std::str::FromStr for NotifyTransport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smtp" => Ok(NotifyTransport::Smtp),
            "sendmail" => Ok(NotifyTransport::Sendmail),
            _ => Err(anyhow::anyhow!("invalid notify transport: {}", s)),
        }
    }
}

/// Email notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub transport: NotifyTransport,
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    pub from_address: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: NotifyTransport::Smtp,
            smtp_host: "localhost".to_string(),
            smtp_port: None,
            from_address: "no-reply@localhost".to_string(),
        }
    }
}

impl NotifyConfig {
    /// Read overrides from `NOTIFY_*` / `SMTP_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("NOTIFY_ENABLED") {
            config.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(transport) = std::env::var("NOTIFY_TRANSPORT") {
            config.transport = transport.parse()?;
        }
        if let Ok(host) = std::env::var("SMTP_HOST") {
            config.smtp_host = host;
        }
        if let Ok(port) = std::env::var("SMTP_PORT") {
            config.smtp_port = port.parse().ok();
        }
        if let Ok(from) = std::env::var("NOTIFY_FROM") {
            config.from_address = from;
        }

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.from_address.is_empty() {
            anyhow::bail!("NOTIFY_FROM cannot be empty when notifications are enabled");
        }
        if self.transport == NotifyTransport::Smtp && self.smtp_host.is_empty() {
            anyhow::bail!("SMTP_HOST cannot be empty for the smtp transport");
        }
        Ok(())
    }
}
