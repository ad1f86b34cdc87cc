use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_core::{EventId, TenantId};

use crate::event::{EntityRef, Event, Payload};

/// Snapshot of an event that exhausted its retry budget.
///
/// Taken exactly once, at escalation time, and never mutated afterwards. The
/// original event stays in the log (marked processed) for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub event_id: EventId,
    pub event_type: String,
    pub tenant_id: TenantId,
    pub entity: EntityRef,
    pub payload: Payload,
    pub last_error: Option<String>,
    /// Retry count at the moment of escalation.
    pub retry_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn from_event(event: &Event, dead_lettered_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            tenant_id: event.tenant_id,
            entity: event.entity.clone(),
            payload: event.payload.clone(),
            last_error: event.last_error.clone(),
            retry_count: event.retry_count,
            dead_lettered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventDraft;
    use serde_json::json;

    #[test]
    fn snapshot_preserves_failure_context() {
        let mut event = EventDraft::new(
            "payment.received",
            TenantId::new(),
            EntityRef::new("payment", uuid::Uuid::now_v7()),
            json!({"amount": 120}),
        )
        .unwrap()
        .into_event(EventId::new(), Utc::now());
        event.record_failure("sink unavailable");

        let entry = DeadLetterEntry::from_event(&event, Utc::now());

        assert_eq!(entry.event_id, event.id);
        assert_eq!(entry.event_type, "payment.received");
        assert_eq!(entry.tenant_id, event.tenant_id);
        assert_eq!(entry.entity, event.entity);
        assert_eq!(entry.payload, event.payload);
        assert_eq!(entry.last_error.as_deref(), Some("sink unavailable"));
        assert_eq!(entry.retry_count, 1);
    }
}
