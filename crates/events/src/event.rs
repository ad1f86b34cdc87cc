use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopdesk_core::{EventId, TenantId, UserId};

/// Retry budget given to events that do not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Untyped event payload.
///
/// Payload shape is owned by the emitting bounded context; consumers project the
/// fields they need and default the rest.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Reference to the business entity an event (or notification) is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: Uuid,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: Uuid) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
        }
    }
}

/// A logged domain event.
///
/// Events are:
/// - **immutable facts** about something that happened inside one tenant
/// - **never deleted**: terminal failures are snapshotted into a
///   [`DeadLetterEntry`](crate::DeadLetterEntry) and the event is marked processed
/// - mutated only by the processor (`processed_at`, `retry_count`, `last_error`)
///
/// `processed_at` is monotonic: once set it is never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Unique per logical occurrence; duplicate publishes collapse onto one event.
    pub idempotency_key: String,
    /// Namespaced tag, `<domain>.<action>` (e.g. `payment.received`).
    pub event_type: String,
    pub tenant_id: TenantId,
    pub entity: EntityRef,
    pub actor_id: Option<UserId>,
    pub payload: Payload,

    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Whether the event belongs to the pending set.
    ///
    /// Pending means: not yet acknowledged, and retry budget left.
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none() && !self.exhausts_budget(self.retry_count)
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Whether `retry_count` recorded failures leave no retry budget.
    pub fn exhausts_budget(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Acknowledge the event. No-op if it was already acknowledged.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        if self.processed_at.is_none() {
            self.processed_at = Some(at);
        }
    }

    /// Record a failed processing attempt; returns the new retry count.
    pub fn record_failure(&mut self, error: impl Into<String>) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> Event {
        Event {
            id: EventId::new(),
            idempotency_key: "job.created:job:1".to_string(),
            event_type: "job.created".to_string(),
            tenant_id: TenantId::new(),
            entity: EntityRef::new("job", Uuid::now_v7()),
            actor_id: None,
            payload: Payload::new(),
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn fresh_event_is_pending() {
        let event = test_event();
        assert!(event.is_pending());
        assert!(!event.is_processed());
    }

    #[test]
    fn processed_event_leaves_pending_set() {
        let mut event = test_event();
        event.mark_processed(Utc::now());
        assert!(!event.is_pending());
    }

    #[test]
    fn processed_at_is_never_overwritten() {
        let mut event = test_event();
        let first = Utc::now();
        event.mark_processed(first);
        event.mark_processed(first + chrono::Duration::seconds(10));
        assert_eq!(event.processed_at, Some(first));
    }

    #[test]
    fn exhausted_budget_leaves_pending_set() {
        let mut event = test_event();
        assert_eq!(event.record_failure("boom"), 1);
        assert_eq!(event.record_failure("boom"), 2);
        assert!(event.is_pending());
        assert!(!event.exhausts_budget(event.retry_count));
        assert!(event.exhausts_budget(event.retry_count + 1));

        assert_eq!(event.record_failure("still broken"), 3);
        assert!(!event.is_pending());
        assert_eq!(event.last_error.as_deref(), Some("still broken"));
    }
}
