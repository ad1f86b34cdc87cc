//! Processor configuration, per-event outcomes and runtime statistics.

use std::time::Duration;

use thiserror::Error;

use shopdesk_notifications::Audience;

use crate::config::ConfigError;
use crate::event_store::EventStoreError;
use crate::notifications::SinkError;

/// Event processor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Maximum events fetched per poll
    pub batch_size: usize,
    /// Baseline sleep between polls
    pub poll_interval: Duration,
    /// Consecutive empty polls before the interval starts growing
    pub max_idle_polls: u32,
    /// Growth factor applied to the interval on each further empty poll
    pub idle_backoff_multiplier: f64,
    /// Ceiling for the grown interval
    pub max_backoff: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_millis(5_000),
            max_idle_polls: 10,
            idle_backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(60_000),
        }
    }
}

impl ProcessorConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_idle_polls(mut self, max_idle_polls: u32) -> Self {
        self.max_idle_polls = max_idle_polls;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_backoff: Duration) -> Self {
        self.idle_backoff_multiplier = multiplier;
        self.max_backoff = max_backoff;
        self
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "0", "must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval", "0ms", "must be positive"));
        }
        if !self.idle_backoff_multiplier.is_finite() || self.idle_backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "idle_backoff_multiplier",
                self.idle_backoff_multiplier.to_string(),
                "must be a finite number >= 1",
            ));
        }
        if self.max_backoff < self.poll_interval {
            return Err(ConfigError::invalid(
                "max_backoff",
                format!("{}ms", self.max_backoff.as_millis()),
                format!("must be >= poll_interval ({}ms)", self.poll_interval.as_millis()),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of the processor loop. There is no paused state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Running,
}

/// Why a single event could not be completed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{audience} notification sink failed: {source}")]
    Sink {
        audience: Audience,
        #[source]
        source: SinkError,
    },

    #[error("failed to acknowledge event: {0}")]
    Acknowledge(#[source] EventStoreError),

    #[error("event task aborted: {0}")]
    Aborted(String),
}

/// Result of one attempt at an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// Notifications persisted and the event acknowledged.
    Processed,
    /// Failure recorded; the event stays pending.
    Retrying { retry_count: u32 },
    /// Budget exhausted; snapshotted into the dead-letter queue.
    DeadLettered,
    /// The failure itself could not be recorded; the event is retried unchanged.
    FailureNotRecorded,
}

impl EventOutcome {
    /// Whether the event has left the pending set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::DeadLettered)
    }

    pub fn is_retriable(&self) -> bool {
        !self.is_terminal()
    }
}

/// Summary of one `process_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchReport {
    pub fetched: usize,
    pub processed: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
    pub unrecorded: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Processed => self.processed += 1,
            EventOutcome::Retrying { .. } => self.retrying += 1,
            EventOutcome::DeadLettered => self.dead_lettered += 1,
            EventOutcome::FailureNotRecorded => self.unrecorded += 1,
        }
    }
}

/// Processor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessorStats {
    pub polls: u64,
    pub empty_polls: u64,
    pub events_processed: u64,
    pub events_retried: u64,
    pub events_dead_lettered: u64,
    pub failures_unrecorded: u64,
    pub store_errors: u64,
}

impl ProcessorStats {
    pub(crate) fn record_batch(&mut self, report: &BatchReport) {
        self.polls += 1;
        if report.fetched == 0 {
            self.empty_polls += 1;
        }
        self.events_processed += report.processed as u64;
        self.events_retried += report.retrying as u64;
        self.events_dead_lettered += report.dead_lettered as u64;
        self.failures_unrecorded += report.unrecorded as u64;
    }

    pub(crate) fn record_store_error(&mut self) {
        self.polls += 1;
        self.store_errors += 1;
    }
}
