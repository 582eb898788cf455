//! # Rolegate Observe - Observability Layer
//!
//! Structured logging through `tracing` and metric helpers over the
//! `metrics` facade. No exporter is installed here; a host process that
//! wants metrics installs its own recorder.

#![deny(unsafe_code)]

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub mod metrics;

/// Filter used when `RUST_LOG` is unset and no level is configured.
pub const DEFAULT_FILTER: &str = "info,rolegate=debug";

/// Configuration for log output
#[derive(Debug, Clone, bon::Builder)]
#[builder(on(String, into))]
pub struct TracingConfig {
    /// Service name recorded in the startup event
    #[builder(default = "rolegate".to_string())]
    pub service_name: String,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    #[builder(default = DEFAULT_FILTER.to_string())]
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines
    #[builder(default = false)]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Initialize the global subscriber.
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return `Ok`.
pub fn init_tracing_with_config(config: TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let initialized = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json().with_target(false)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).try_init()
    };

    if initialized.is_err() {
        tracing::debug!("Tracing already initialized, skipping");
        return Ok(());
    }

    tracing::info!(service = config.service_name, json = config.json, "Tracing initialized");
    Ok(())
}

/// Initialize tracing with default configuration
pub fn init_tracing() -> Result<()> {
    init_tracing_with_config(TracingConfig::default())
}

/// Initialize tracing and register metric descriptions
pub fn init(config: TracingConfig) -> Result<()> {
    init_tracing_with_config(config)?;
    metrics::init_metrics_descriptions();
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::Once;

    use super::*;

    static INIT: Once = Once::new();

    #[test]
    fn test_init_tracing_twice() {
        INIT.call_once(|| {
            init_tracing().unwrap();
        });
        // second call must not fail
        init_tracing_with_config(TracingConfig::builder().json(true).build()).unwrap();
    }

    #[test]
    fn test_tracing_config_defaults() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "rolegate");
        assert_eq!(config.filter, DEFAULT_FILTER);
        assert!(!config.json);

        let custom = TracingConfig::builder().service_name("rolegate-cli").filter("warn").build();
        assert_eq!(custom.service_name, "rolegate-cli");
        assert_eq!(custom.filter, "warn");
    }
}
