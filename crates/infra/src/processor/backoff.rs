//! Poll pacing: idle tracking, interval growth and the injectable sleeper.

use std::time::Duration;

use super::types::ProcessorConfig;

/// Loop progression between polls.
///
/// Pure value: the loop feeds it the number of events each poll fetched and
/// sleeps for the resulting `interval`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Consecutive polls that fetched nothing.
    pub idle_polls: u32,
    /// How long to sleep before the next poll.
    pub interval: Duration,
}

impl PollState {
    /// Baseline state every run starts from.
    pub fn initial(config: &ProcessorConfig) -> Self {
        Self {
            idle_polls: 0,
            interval: config.poll_interval,
        }
    }

    /// State after a poll that fetched `processed` events.
    ///
    /// Work resets to baseline. An empty poll bumps the idle counter; once it
    /// reaches `max_idle_polls` every further empty poll multiplies the
    /// interval, capped at `max_backoff`.
    pub fn advance(self, processed: usize, config: &ProcessorConfig) -> Self {
        if processed > 0 {
            return Self::initial(config);
        }

        let idle_polls = self.idle_polls.saturating_add(1);
        let interval = if idle_polls >= config.max_idle_polls {
            grow(self.interval, config)
        } else {
            self.interval
        };

        Self {
            idle_polls,
            interval,
        }
    }
}

fn grow(interval: Duration, config: &ProcessorConfig) -> Duration {
    let cap = config.max_backoff;
    let nanos = interval.as_nanos() as f64 * config.idle_backoff_multiplier;
    let grown = if nanos.is_finite() && nanos < cap.as_nanos() as f64 {
        Duration::from_nanos(nanos.round() as u64)
    } else {
        cap
    };
    // Never shrink while idle.
    grown.max(interval).min(cap)
}

/// Source of inter-poll delays.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
