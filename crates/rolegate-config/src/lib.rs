//! # Rolegate Config - Configuration Management
//!
//! Loads process configuration from an optional file and `ROLEGATE__`
//! environment variables, in that order of precedence (environment wins).
//! Every field has a serde default, so an empty or missing file is a valid
//! configuration.
//!
//! ```yaml
//! threads: 4
//! logging: "info"
//! storage:
//!   backend: "memory"
//!   page_size: 100
//! resolver:
//!   max_concurrency: 10
//!   timeout_ms: 2000
//! effective_permissions:
//!   enabled: true
//!   queue_capacity: 1024
//! cascade:
//!   max_transaction_items: 100
//!   sweep_batch_size: 25
//! ```
//!
//! Nested keys map to environment variables with a double underscore, e.g.
//! `ROLEGATE__RESOLVER__MAX_CONCURRENCY=32`.

pub mod validation;

use std::{path::Path, time::Duration};

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ROLEGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of worker threads for the async runtime
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_logging")]
    pub logging: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub effective_permissions: EffectivePermissionsConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            logging: default_logging(),
            json_logs: false,
            storage: StorageConfig::default(),
            resolver: ResolverConfig::default(),
            effective_permissions: EffectivePermissionsConfig::default(),
            cascade: CascadeConfig::default(),
        }
    }
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_logging() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend; only `memory` ships with this workspace
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Items requested per page when draining a partition or index
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: default_backend(), page_size: default_page_size() }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_page_size() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Role permission lookups in flight at once during a check
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound on a single resolution, in milliseconds. Unset means the
    /// caller's deadline alone applies.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_concurrency: default_max_concurrency(), timeout_ms: None }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn default_max_concurrency() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePermissionsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bound on queued maintenance tasks; overflow is dropped with a warning
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EffectivePermissionsConfig {
    fn default() -> Self {
        Self { enabled: false, queue_capacity: default_queue_capacity() }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Deletes at most this large run as one transaction
    #[serde(default = "default_max_transaction_items")]
    pub max_transaction_items: usize,

    /// Edge deletes per transaction during a sweep
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_transaction_items: default_max_transaction_items(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_max_transaction_items() -> usize {
    rolegate_store::MAX_TRANSACTION_ITEMS
}

fn default_sweep_batch_size() -> usize {
    25
}

/// Load configuration from a file with environment variable overrides
///
/// A missing file is not an error; defaults and environment still apply.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));

    builder.build()?.try_deserialize()
}

/// Load configuration, falling back to defaults on any error
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    match load(path.as_ref()) {
        Ok(config) => {
            tracing::info!(path = ?path.as_ref(), "Configuration loaded");
            config
        },
        Err(e) => {
            tracing::warn!(
                path = ?path.as_ref(),
                error = %e,
                "Failed to load configuration, using defaults"
            );
            Config::default()
        },
    }
}
