//! Bootstrap configuration loading
//!
//! Configuration file location follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PEERBOOK_CONFIG` environment variable
//! 3. `~/.config/peerbook/config.toml` (platform config directory)
//! 4. Built-in defaults (no file at all)
//!
//! An explicitly named file (CLI or environment) must exist. The
//! platform-default file is optional.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "PEERBOOK_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP API port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ens: EnsConfig,

    #[serde(default)]
    pub account_directory: AccountDirectoryConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
            ens: EnsConfig::default(),
            account_directory: AccountDirectoryConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Ethereum JSON-RPC endpoint used for ENS resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

impl Default for EnsConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
        }
    }
}

/// Loopring account directory REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub base_url: String,

    /// API key sent with every request (environment variable takes priority)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for AccountDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            api_key: None,
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// When the enrichment worker stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Park when idle and keep running until shut down
    #[default]
    RunForever,
    /// Exit once the backlog and the batch are both empty
    UntilDrained,
}

/// Enrichment worker and persistence tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Records per storage flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum ingestion queue capacity (grown to the startup backlog)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub termination: TerminationPolicy,

    /// Upper bound for each external lookup
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Attempts for the account id lookup
    #[serde(default = "default_account_id_attempts")]
    pub account_id_attempts: u32,

    /// Consecutive failed flushes before a batch is dropped
    #[serde(default = "default_max_flush_attempts")]
    pub max_flush_attempts: u32,

    /// Pause between retries of a failed flush while idle
    #[serde(default = "default_flush_retry_interval_ms")]
    pub flush_retry_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            termination: TerminationPolicy::default(),
            call_timeout_ms: default_call_timeout_ms(),
            account_id_attempts: default_account_id_attempts(),
            max_flush_attempts: default_max_flush_attempts(),
            flush_retry_interval_ms: default_flush_retry_interval_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn flush_retry_interval(&self) -> Duration {
        Duration::from_millis(self.flush_retry_interval_ms)
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("peerbook.db")
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_url() -> String {
    "https://cloudflare-eth.com".to_string()
}

fn default_directory_url() -> String {
    "https://api3.loopring.io".to_string()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_batch_size() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_account_id_attempts() -> u32 {
    3
}

fn default_max_flush_attempts() -> u32 {
    5
}

fn default_flush_retry_interval_ms() -> u64 {
    5_000
}

impl TomlConfig {
    /// Reject values the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        let worker = &self.worker;
        if worker.batch_size == 0 {
            return Err(Error::Config("worker.batch_size must be greater than 0".to_string()));
        }
        if worker.queue_capacity == 0 {
            return Err(Error::Config(
                "worker.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if worker.account_id_attempts == 0 {
            return Err(Error::Config(
                "worker.account_id_attempts must be greater than 0".to_string(),
            ));
        }
        if worker.max_flush_attempts == 0 {
            return Err(Error::Config(
                "worker.max_flush_attempts must be greater than 0".to_string(),
            ));
        }
        if self.account_directory.requests_per_second == 0 {
            return Err(Error::Config(
                "account_directory.requests_per_second must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` argument or `PEERBOOK_CONFIG`; the file must exist
    Explicit(PathBuf),
    /// Platform config directory; used only if present
    PlatformDefault(PathBuf),
    /// No file, built-in defaults
    BuiltIn,
}

/// Pick the configuration file following the priority order above
pub fn resolve_config_path(cli_arg: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    match dirs::config_dir().map(|d| d.join("peerbook").join("config.toml")) {
        Some(path) => ConfigSource::PlatformDefault(path),
        None => ConfigSource::BuiltIn,
    }
}

/// Parse and validate a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    config.validate()?;
    Ok(config)
}

/// Load configuration from the resolved source
pub fn load_config(source: &ConfigSource) -> Result<TomlConfig> {
    match source {
        ConfigSource::Explicit(path) => {
            let config = load_toml_config(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        ConfigSource::PlatformDefault(path) if path.exists() => {
            let config = load_toml_config(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        ConfigSource::PlatformDefault(path) => {
            debug!("No config file at {}, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        ConfigSource::BuiltIn => Ok(TomlConfig::default()),
    }
}
