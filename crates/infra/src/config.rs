//! Configuration loading from the process environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::processor::ProcessorConfig;

pub const BATCH_SIZE_VAR: &str = "EVENT_PROCESSOR_BATCH_SIZE";
pub const POLL_INTERVAL_VAR: &str = "EVENT_PROCESSOR_POLL_INTERVAL_MS";
pub const MAX_IDLE_POLLS_VAR: &str = "EVENT_PROCESSOR_MAX_IDLE_POLLS";
pub const BACKOFF_MULTIPLIER_VAR: &str = "EVENT_PROCESSOR_BACKOFF_MULTIPLIER";
pub const MAX_BACKOFF_VAR: &str = "EVENT_PROCESSOR_MAX_BACKOFF_MS";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_VAR: &str = "DATABASE_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Settings for the worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub processor: ProcessorConfig,
    /// Absent means in-memory stores (development only).
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults with a
    /// warning; malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ProcessorConfig::default();

        let processor = ProcessorConfig {
            batch_size: read(&lookup, BATCH_SIZE_VAR, defaults.batch_size)?,
            poll_interval: Duration::from_millis(read(
                &lookup,
                POLL_INTERVAL_VAR,
                defaults.poll_interval.as_millis() as u64,
            )?),
            max_idle_polls: read(&lookup, MAX_IDLE_POLLS_VAR, defaults.max_idle_polls)?,
            idle_backoff_multiplier: read(&lookup, BACKOFF_MULTIPLIER_VAR, defaults.idle_backoff_multiplier)?,
            max_backoff: Duration::from_millis(read(
                &lookup,
                MAX_BACKOFF_VAR,
                defaults.max_backoff.as_millis() as u64,
            )?),
        };
        processor.validate()?;

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            tracing::warn!("{DATABASE_URL_VAR} not set; events and notifications will be kept in memory");
        }

        let database_max_connections = read(&lookup, DATABASE_MAX_CONNECTIONS_VAR, DEFAULT_MAX_CONNECTIONS)?;
        if database_max_connections == 0 {
            return Err(ConfigError::invalid(
                DATABASE_MAX_CONNECTIONS_VAR,
                "0",
                "must be at least 1",
            ));
        }

        Ok(Self {
            processor,
            database_url,
            database_max_connections,
        })
    }
}

fn read<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(key, raw.clone(), err.to_string())),
        None => {
            tracing::warn!("{key} not set; using default {default}");
            Ok(default)
        }
    }
}
