//! The event processor control loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shopdesk_core::EventId;
use shopdesk_events::Event;
use shopdesk_notifications::{Audience, NotificationGenerator};

use crate::event_store::{EventStore, EventStoreError};
use crate::notifications::{PlatformNotificationSink, TenantNotificationSink};

use super::backoff::{PollState, Sleeper, TokioSleeper};
use super::types::{BatchReport, EventOutcome, ProcessError, ProcessorConfig, ProcessorStats, RunState};

/// Everything one event needs: the store, both sinks and the generator.
///
/// Cheap to clone; each in-flight event task owns a clone.
pub struct EventPipeline<S, P, T> {
    store: Arc<S>,
    platform: Arc<P>,
    tenant: Arc<T>,
    generator: Arc<NotificationGenerator>,
}

impl<S, P, T> Clone for EventPipeline<S, P, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            platform: self.platform.clone(),
            tenant: self.tenant.clone(),
            generator: self.generator.clone(),
        }
    }
}

impl<S, P, T> EventPipeline<S, P, T>
where
    S: EventStore,
    P: PlatformNotificationSink,
    T: TenantNotificationSink,
{
    /// Generate, persist and acknowledge one event, handling any failure.
    pub async fn process_event(&self, event: Event) -> EventOutcome {
        match self.deliver(&event).await {
            Ok(()) => {
                debug!(event_id = %event.id, event_type = %event.event_type, "event processed");
                EventOutcome::Processed
            }
            Err(err) => self.handle_failure(&event, &err).await,
        }
    }

    /// Platform drafts first, then tenant drafts, then the acknowledgement.
    ///
    /// Drafts already written when a later step fails stay written; the sinks'
    /// natural key makes the retry overwrite rather than duplicate them.
    async fn deliver(&self, event: &Event) -> Result<(), ProcessError> {
        let generated = self.generator.generate(event);
        if generated.is_empty() {
            debug!(event_id = %event.id, event_type = %event.event_type, "no notifications for event");
        }

        for draft in generated.platform {
            self.platform
                .create(draft)
                .await
                .map_err(|source| ProcessError::Sink {
                    audience: Audience::Platform,
                    source,
                })?;
        }

        for draft in generated.tenant {
            self.tenant
                .create(draft)
                .await
                .map_err(|source| ProcessError::Sink {
                    audience: Audience::Tenant,
                    source,
                })?;
        }

        self.store
            .mark_processed(event.id)
            .await
            .map_err(ProcessError::Acknowledge)
    }

    /// Record the failure; escalate to dead-letter once the budget is spent.
    pub async fn handle_failure(&self, event: &Event, err: &ProcessError) -> EventOutcome {
        let message = err.to_string();

        let retry_count = match self.store.record_failure(event.id, &message).await {
            Ok(count) => count,
            Err(store_err) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %message,
                    store_error = %store_err,
                    "failed to record event failure"
                );
                return EventOutcome::FailureNotRecorded;
            }
        };

        if !event.exhausts_budget(retry_count) {
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                retry_count,
                max_retries = event.max_retries,
                error = %message,
                "event processing failed; will retry"
            );
            return EventOutcome::Retrying { retry_count };
        }

        match self.store.move_to_dead_letter(event.id).await {
            Ok(entry) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    tenant_id = %event.tenant_id,
                    retry_count = entry.retry_count,
                    error = %message,
                    "event moved to dead-letter queue"
                );
                EventOutcome::DeadLettered
            }
            Err(store_err) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retry_count,
                    store_error = %store_err,
                    "failed to move event to dead-letter queue"
                );
                EventOutcome::Retrying { retry_count }
            }
        }
    }
}

/// Run ownership and counters shared by the processor and its handles.
///
/// Every run gets its own cancellation token; `current` holds the token of the
/// run that owns the processor. A loop holds `exclusive` for its whole life, so
/// a run started right after a stop waits for the old loop (and its in-flight
/// batch) to finish before polling.
#[derive(Debug, Default)]
struct Control {
    current: Mutex<Option<CancellationToken>>,
    exclusive: Arc<tokio::sync::Mutex<()>>,
    stats: Mutex<ProcessorStats>,
}

impl Control {
    /// Claim the processor for a new run; `None` while a run is live.
    fn try_begin(&self) -> Option<CancellationToken> {
        let Ok(mut current) = self.current.lock() else {
            error!("event processor run state poisoned; refusing to start");
            return None;
        };
        if current.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return None;
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Some(token)
    }

    fn is_running(&self) -> bool {
        self.current
            .lock()
            .map(|current| current.as_ref().is_some_and(|token| !token.is_cancelled()))
            .unwrap_or(false)
    }

    fn stop(&self) {
        if let Ok(current) = self.current.lock() {
            if let Some(token) = current.as_ref() {
                cancel_run(token);
            }
        }
    }

    fn stats(&self) -> ProcessorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update_stats(&self, f: impl FnOnce(&mut ProcessorStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

fn cancel_run(token: &CancellationToken) {
    if !token.is_cancelled() {
        info!("event processor stop requested");
        token.cancel();
    }
}

/// Handle to a processor loop running on a tokio task.
///
/// A handle returned while another run was live owns no loop: it reports
/// not running and its shutdown returns immediately.
#[derive(Debug)]
pub struct ProcessorHandle {
    control: Arc<Control>,
    run: Option<CancellationToken>,
    join: Option<JoinHandle<()>>,
}

impl ProcessorHandle {
    /// Stop this handle's loop and wait for its in-flight batch (if any) to settle.
    pub async fn shutdown(mut self) {
        if let Some(token) = &self.run {
            cancel_run(token);
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "event processor task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|token| !token.is_cancelled())
    }

    /// Get current processor statistics.
    pub fn stats(&self) -> ProcessorStats {
        self.control.stats()
    }
}

/// Polls the event store and fans events out into the notification sinks.
///
/// - at-least-once: an event leaves the pending set only once acknowledged or
///   dead-lettered
/// - events of one batch run concurrently and independently; a failing (or
///   panicking) event never affects its neighbours
/// - no error escapes the loop; store outages are logged and the loop keeps
///   polling at its current pace
pub struct EventProcessor<S, P, T> {
    pipeline: EventPipeline<S, P, T>,
    config: ProcessorConfig,
    sleeper: Arc<dyn Sleeper>,
    control: Arc<Control>,
}

impl<S, P, T> EventProcessor<S, P, T>
where
    S: EventStore + 'static,
    P: PlatformNotificationSink + 'static,
    T: TenantNotificationSink + 'static,
{
    /// Processor with default configuration, all built-in notification
    /// handlers and a real-time sleeper.
    pub fn new(store: S, platform: P, tenant: T) -> Self {
        Self {
            pipeline: EventPipeline {
                store: Arc::new(store),
                platform: Arc::new(platform),
                tenant: Arc::new(tenant),
                generator: Arc::new(NotificationGenerator::new()),
            },
            config: ProcessorConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            control: Arc::new(Control::default()),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_generator(mut self, generator: NotificationGenerator) -> Self {
        self.pipeline.generator = Arc::new(generator);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        if self.control.is_running() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        self.control.stats()
    }

    /// Run the loop until [`stop`](Self::stop) is called.
    ///
    /// No-op when a run is already live. After a stop, a new run waits for
    /// the previous loop to exit before its first poll.
    pub async fn start(&self) {
        let Some(token) = self.control.try_begin() else {
            debug!("event processor already running");
            return;
        };
        self.run(token).await;
    }

    /// Ask the live run to exit. Takes effect at its next iteration; a
    /// sleeping loop wakes immediately, an in-flight batch is never interrupted.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Run the loop on a tokio task.
    pub fn spawn(self: Arc<Self>) -> ProcessorHandle {
        let control = self.control.clone();
        let Some(token) = control.try_begin() else {
            warn!("event processor already running; not spawning a second loop");
            return ProcessorHandle {
                control,
                run: None,
                join: None,
            };
        };

        let run = token.clone();
        let join = tokio::spawn(async move { self.run(run).await });
        ProcessorHandle {
            control,
            run: Some(token),
            join: Some(join),
        }
    }

    async fn run(&self, token: CancellationToken) {
        let _exclusive = tokio::select! {
            guard = self.control.exclusive.clone().lock_owned() => guard,
            _ = token.cancelled() => {
                debug!("event processor stopped before its loop began");
                return;
            }
        };

        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "event processor started"
        );

        let mut poll = PollState::initial(&self.config);
        loop {
            if token.is_cancelled() {
                break;
            }

            let fetched = match self.process_batch().await {
                Ok(report) => report.fetched,
                Err(err) => {
                    error!(error = %err, "failed to fetch pending events");
                    self.control.update_stats(|s| s.record_store_error());
                    0
                }
            };

            poll = poll.advance(fetched, &self.config);

            if token.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.sleeper.sleep(poll.interval) => {}
                _ = token.cancelled() => {}
            }
        }

        info!("event processor stopped");
    }

    /// Fetch one batch, process every event concurrently and wait for all of
    /// them to settle.
    ///
    /// Only a failed fetch is an error; per-event failures are recorded and
    /// reported through the returned [`BatchReport`].
    pub async fn process_batch(&self) -> Result<BatchReport, EventStoreError> {
        let events = self.pipeline.store.fetch_pending(self.config.batch_size).await?;

        let mut report = BatchReport {
            fetched: events.len(),
            ..BatchReport::default()
        };
        if events.is_empty() {
            self.control.update_stats(|s| s.record_batch(&report));
            return Ok(report);
        }

        debug!(count = events.len(), "processing event batch");

        let mut unsettled: HashMap<EventId, Event> = HashMap::with_capacity(events.len());
        let mut tasks = JoinSet::new();
        for event in events {
            unsettled.insert(event.id, event.clone());
            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let event_id = event.id;
                (event_id, pipeline.process_event(event).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((event_id, outcome)) => {
                    unsettled.remove(&event_id);
                    report.record(outcome);
                }
                Err(err) => {
                    error!(error = %err, "event task failed");
                }
            }
        }

        // Tasks that panicked never reported back; count them as failed attempts.
        for (_, event) in unsettled {
            let err = ProcessError::Aborted("event task panicked".to_string());
            report.record(self.pipeline.handle_failure(&event, &err).await);
        }

        debug!(
            fetched = report.fetched,
            processed = report.processed,
            retrying = report.retrying,
            dead_lettered = report.dead_lettered,
            unrecorded = report.unrecorded,
            "event batch settled"
        );
        self.control.update_stats(|s| s.record_batch(&report));
        Ok(report)
    }
}
