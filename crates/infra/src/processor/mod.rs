//! Background event processor.
//!
//! Polls the event store, turns each pending event into notifications and
//! records the outcome. See [`EventProcessor`] for the delivery guarantees.

mod backoff;
mod executor;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use backoff::{PollState, Sleeper, TokioSleeper};
pub use executor::{EventPipeline, EventProcessor, ProcessorHandle};
pub use types::{BatchReport, EventOutcome, ProcessError, ProcessorConfig, ProcessorStats, RunState};
