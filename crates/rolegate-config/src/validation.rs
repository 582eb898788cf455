//! Configuration validation
//!
//! Checks every section and reports all problems at once.

use rolegate_store::MAX_TRANSACTION_ITEMS;
use thiserror::Error;

use crate::{CascadeConfig, Config, EffectivePermissionsConfig, ResolverConfig, StorageConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid thread count: {0} (must be > 0)")]
    InvalidThreads(usize),

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid backend: {0} (must be: memory)")]
    InvalidBackend(String),

    #[error("Invalid {field}: {value} (must be between {min} and {max})")]
    OutOfRange { field: &'static str, value: u64, min: u64, max: u64 },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

fn in_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value, min, max })
    }
}

/// Validate complete configuration
pub fn validate(config: &Config) -> Result<()> {
    let errors: Vec<ValidationError> = [
        validate_threads(config.threads),
        validate_logging(&config.logging),
        validate_storage(&config.storage),
        validate_resolver(&config.resolver),
        validate_effective_permissions(&config.effective_permissions),
        validate_cascade(&config.cascade),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();

    let mut errors = errors.into_iter();
    match (errors.next(), errors.next()) {
        (None, _) => Ok(()),
        (Some(only), None) => Err(only),
        (Some(first), Some(second)) => {
            let mut all = vec![first, second];
            all.extend(errors);
            Err(ValidationError::Multiple(all))
        },
    }
}

pub fn validate_threads(threads: usize) -> Result<()> {
    if threads == 0 {
        return Err(ValidationError::InvalidThreads(threads));
    }
    Ok(())
}

pub fn validate_logging(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::InvalidLogLevel(level.to_string())),
    }
}

pub fn validate_storage(config: &StorageConfig) -> Result<()> {
    if config.backend != "memory" {
        return Err(ValidationError::InvalidBackend(config.backend.clone()));
    }
    in_range("storage.page_size", config.page_size as u64, 1, 10_000)
}

pub fn validate_resolver(config: &ResolverConfig) -> Result<()> {
    in_range("resolver.max_concurrency", config.max_concurrency as u64, 1, 1_000)?;
    if let Some(timeout_ms) = config.timeout_ms {
        in_range("resolver.timeout_ms", timeout_ms, 1, 600_000)?;
    }
    Ok(())
}

pub fn validate_effective_permissions(config: &EffectivePermissionsConfig) -> Result<()> {
    if config.enabled {
        in_range("effective_permissions.queue_capacity", config.queue_capacity as u64, 1, 1 << 20)?;
    }
    Ok(())
}

pub fn validate_cascade(config: &CascadeConfig) -> Result<()> {
    let max = MAX_TRANSACTION_ITEMS as u64;
    in_range("cascade.max_transaction_items", config.max_transaction_items as u64, 1, max)?;
    in_range("cascade.sweep_batch_size", config.sweep_batch_size as u64, 1, max)
}
