//! Fakes for exercising the processor loop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use shopdesk_core::{EventId, NotificationId, TenantId, UserId};
use shopdesk_events::{DeadLetterEntry, Event, EventDraft};
use shopdesk_notifications::{
    PlatformNotification, PlatformNotificationDraft, TenantNotification, TenantNotificationDraft,
};

use super::backoff::Sleeper;
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore};
use crate::notifications::{
    InMemoryPlatformNotifications, InMemoryTenantNotifications, PlatformNotificationSink, SinkError,
    TenantNotificationSink,
};

/// Records every requested delay instead of sleeping.
///
/// Calls before the limit return after a yield; the call that reaches the
/// limit signals [`wait_until_reached`](Self::wait_until_reached) and then
/// never completes, parking the loop until it is stopped.
#[derive(Clone)]
pub struct ScriptedSleeper {
    limit: usize,
    recorded: Arc<Mutex<Vec<Duration>>>,
    reached: Arc<Notify>,
}

impl ScriptedSleeper {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            recorded: Arc::new(Mutex::new(Vec::new())),
            reached: Arc::new(Notify::new()),
        }
    }

    pub async fn wait_until_reached(&self) {
        self.reached.notified().await;
    }

    pub fn recorded_millis(&self) -> Vec<u64> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

#[async_trait::async_trait]
impl Sleeper for ScriptedSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.push(duration);
            recorded.len()
        };
        if count >= self.limit {
            self.reached.notify_one();
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
    }
}

/// Sleeper that parks every call until the loop drops it, counting how many
/// loops are parked at once.
#[derive(Clone, Default)]
pub struct ParkingSleeper {
    state: Arc<ParkingState>,
}

#[derive(Default)]
struct ParkingState {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    slept: Notify,
}

struct Parked(Arc<ParkingState>);

impl Drop for Parked {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ParkingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_for_sleep(&self) {
        self.state.slept.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Sleeper for ParkingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        let _parked = Parked(self.state.clone());
        self.state.slept.notify_one();
        std::future::pending::<()>().await;
    }
}

/// In-memory store whose fetch and failure recording can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryEventStore,
    pub fail_fetch: AtomicBool,
    pub fail_record: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn outage() -> EventStoreError {
        EventStoreError::Storage("connection refused".to_string())
    }
}

#[async_trait::async_trait]
impl EventStore for FlakyStore {
    async fn publish(&self, draft: EventDraft) -> Result<Event, EventStoreError> {
        self.inner.publish(draft).await
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Event>, EventStoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.fetch_pending(limit).await
    }

    async fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        self.inner.mark_processed(event_id).await
    }

    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<u32, EventStoreError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.record_failure(event_id, error).await
    }

    async fn move_to_dead_letter(&self, event_id: EventId) -> Result<DeadLetterEntry, EventStoreError> {
        self.inner.move_to_dead_letter(event_id).await
    }

    async fn get(&self, event_id: EventId) -> Result<Option<Event>, EventStoreError> {
        self.inner.get(event_id).await
    }

    async fn find_by_entity(&self, entity_type: &str, entity_id: Uuid) -> Result<Vec<Event>, EventStoreError> {
        self.inner.find_by_entity(entity_type, entity_id).await
    }

    async fn find_by_tenant(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Event>, EventStoreError> {
        self.inner.find_by_tenant(tenant_id, limit).await
    }

    async fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, EventStoreError> {
        self.inner.list_dead_letters(tenant_id, limit).await
    }
}

/// Tenant sink that rejects drafts of chosen events, or the next N drafts.
#[derive(Default)]
pub struct FailingTenantSink {
    inner: InMemoryTenantNotifications,
    failing_events: Mutex<HashSet<EventId>>,
    fail_next: AtomicUsize,
}

impl FailingTenantSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, event_id: EventId) {
        self.failing_events.lock().unwrap().insert(event_id);
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryTenantNotifications {
        &self.inner
    }

    fn should_fail(&self, event_id: EventId) -> bool {
        if self.failing_events.lock().unwrap().contains(&event_id) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl TenantNotificationSink for FailingTenantSink {
    async fn create(&self, draft: TenantNotificationDraft) -> Result<TenantNotification, SinkError> {
        if self.should_fail(draft.source_event_id) {
            return Err(SinkError::Storage("tenant sink unavailable".to_string()));
        }
        self.inner.create(draft).await
    }

    async fn find_unread(
        &self,
        tenant_id: TenantId,
        user: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<TenantNotification>, SinkError> {
        self.inner.find_unread(tenant_id, user, limit).await
    }

    async fn mark_read(&self, tenant_id: TenantId, id: NotificationId) -> Result<(), SinkError> {
        self.inner.mark_read(tenant_id, id).await
    }

    async fn mark_all_read(&self, tenant_id: TenantId, user: Option<UserId>) -> Result<u64, SinkError> {
        self.inner.mark_all_read(tenant_id, user).await
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<TenantNotification>, SinkError> {
        self.inner.find_by_source_event(event_id).await
    }
}

/// Platform sink that panics on drafts of chosen events.
#[derive(Default)]
pub struct PanickingPlatformSink {
    inner: InMemoryPlatformNotifications,
    doomed: Mutex<HashSet<EventId>>,
}

impl PanickingPlatformSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panic_for(&self, event_id: EventId) {
        self.doomed.lock().unwrap().insert(event_id);
    }
}

#[async_trait::async_trait]
impl PlatformNotificationSink for PanickingPlatformSink {
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError> {
        let doomed = self.doomed.lock().unwrap().contains(&draft.source_event_id);
        if doomed {
            panic!("sink exploded for event {}", draft.source_event_id);
        }
        self.inner.create(draft).await
    }

    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError> {
        self.inner.find_unread(recipient, limit).await
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError> {
        self.inner.mark_read(id).await
    }

    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError> {
        self.inner.mark_all_read(recipient).await
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError> {
        self.inner.find_by_source_event(event_id).await
    }
}

/// Platform sink that holds every create until [`open`](Self::open) is called.
pub struct GatedPlatformSink {
    inner: InMemoryPlatformNotifications,
    gate: Semaphore,
    entered: Notify,
}

impl GatedPlatformSink {
    pub fn new() -> Self {
        Self {
            inner: InMemoryPlatformNotifications::new(),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.close();
    }
}

#[async_trait::async_trait]
impl PlatformNotificationSink for GatedPlatformSink {
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError> {
        self.entered.notify_one();
        // A closed gate lets every caller through.
        let _ = self.gate.acquire().await;
        self.inner.create(draft).await
    }

    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError> {
        self.inner.find_unread(recipient, limit).await
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError> {
        self.inner.mark_read(id).await
    }

    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError> {
        self.inner.mark_all_read(recipient).await
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError> {
        self.inner.find_by_source_event(event_id).await
    }
}
