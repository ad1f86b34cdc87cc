use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use shopdesk_core::{EventId, TenantId};
use shopdesk_events::{DeadLetterEntry, Event, EventDraft};

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, connectivity, encoding) as
/// opposed to domain errors (validation).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("event not found: {0}")]
    NotFound(EventId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable, append-only log of domain events.
///
/// The store is the **only** source of truth for what work exists. It owns the
/// event and dead-letter lifecycles; the processor drives them through the
/// operations below.
///
/// ## Pending set
///
/// An event is pending iff `processed_at` is unset **and**
/// `retry_count < max_retries`. `fetch_pending` returns pending events oldest
/// first.
///
/// ## Implementation requirements
///
/// - `publish` is idempotent on the idempotency key: a duplicate returns the
///   existing event and never creates a second one
/// - `mark_processed` never clears or moves an existing `processed_at`
/// - `record_failure` is a single atomic increment-and-fetch (no read-then-write),
///   safe under concurrent callers
/// - `move_to_dead_letter` snapshots the event and marks it processed as one
///   operation; repeating it returns the existing snapshot
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a new event (no-op returning the existing event on duplicate key).
    async fn publish(&self, draft: EventDraft) -> Result<Event, EventStoreError>;

    /// Pending events, ascending by creation time, at most `limit`.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Event>, EventStoreError>;

    /// Acknowledge an event. Idempotent.
    async fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError>;

    /// Atomically bump `retry_count` and store `error`; returns the new count.
    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<u32, EventStoreError>;

    /// Snapshot the event into the dead-letter queue and mark it processed.
    async fn move_to_dead_letter(&self, event_id: EventId) -> Result<DeadLetterEntry, EventStoreError>;

    async fn get(&self, event_id: EventId) -> Result<Option<Event>, EventStoreError>;

    /// Audit query: every event about one entity, newest first.
    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Audit query: a tenant's most recent events, newest first.
    async fn find_by_tenant(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// A tenant's dead-lettered events, newest first.
    async fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, EventStoreError>;
}

#[async_trait::async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn publish(&self, draft: EventDraft) -> Result<Event, EventStoreError> {
        (**self).publish(draft).await
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Event>, EventStoreError> {
        (**self).fetch_pending(limit).await
    }

    async fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        (**self).mark_processed(event_id).await
    }

    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<u32, EventStoreError> {
        (**self).record_failure(event_id, error).await
    }

    async fn move_to_dead_letter(&self, event_id: EventId) -> Result<DeadLetterEntry, EventStoreError> {
        (**self).move_to_dead_letter(event_id).await
    }

    async fn get(&self, event_id: EventId) -> Result<Option<Event>, EventStoreError> {
        (**self).get(event_id).await
    }

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<Event>, EventStoreError> {
        (**self).find_by_entity(entity_type, entity_id).await
    }

    async fn find_by_tenant(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        (**self).find_by_tenant(tenant_id, limit).await
    }

    async fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, EventStoreError> {
        (**self).list_dead_letters(tenant_id, limit).await
    }
}
