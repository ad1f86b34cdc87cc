use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use shopdesk_core::{DomainError, DomainResult, EventId, TenantId, UserId};

use crate::event::{DEFAULT_MAX_RETRIES, EntityRef, Event, Payload};
use crate::types::validate_event_type;

/// An event ready to be published (not yet assigned an id or timestamps).
///
/// Construction validates the type tag and the payload shape, so a draft that
/// exists is always publishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    event_type: String,
    tenant_id: TenantId,
    entity: EntityRef,
    actor_id: Option<UserId>,
    payload: Payload,
    idempotency_key: Option<String>,
    /// Identifies this occurrence; clones of the draft share it.
    occurrence_id: Uuid,
    dedup_on_payload: bool,
    max_retries: u32,
}

impl EventDraft {
    /// Create a draft.
    ///
    /// `payload` must be a JSON object (or `null`, treated as empty).
    pub fn new(
        event_type: impl Into<String>,
        tenant_id: TenantId,
        entity: EntityRef,
        payload: JsonValue,
    ) -> DomainResult<Self> {
        let event_type = event_type.into();
        validate_event_type(&event_type)?;

        let payload = match payload {
            JsonValue::Object(map) => map,
            JsonValue::Null => Payload::new(),
            other => {
                return Err(DomainError::validation(format!(
                    "event payload must be a JSON object, got {other}"
                )));
            }
        };

        Ok(Self {
            event_type,
            tenant_id,
            entity,
            actor_id: None,
            payload,
            idempotency_key: None,
            occurrence_id: Uuid::now_v7(),
            dedup_on_payload: false,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Use a caller-supplied idempotency key instead of the derived one.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Derive the key from the payload instead of the occurrence, so any
    /// draft with the same type, subject and payload collapses onto one event.
    ///
    /// Only for facts that can happen at most once per subject (an invoice
    /// being generated); repeatable transitions must not opt in.
    pub fn with_payload_dedup(mut self) -> Self {
        self.dedup_on_payload = true;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The effective idempotency key.
    ///
    /// Derived keys combine type, subject entity and the draft's occurrence
    /// id: republishing the same draft (or a clone) is a no-op, while two
    /// drafts built separately stay two events even with equal payloads. With
    /// [`with_payload_dedup`](Self::with_payload_dedup) the occurrence id is
    /// replaced by a name-based UUID over the canonical (key-sorted) payload.
    pub fn idempotency_key(&self) -> String {
        if let Some(key) = &self.idempotency_key {
            return key.clone();
        }

        let discriminator = if self.dedup_on_payload {
            let canonical = serde_json::to_vec(&self.payload).unwrap_or_default();
            Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical)
        } else {
            self.occurrence_id
        };
        format!(
            "{}:{}:{}:{}",
            self.event_type, self.entity.entity_type, self.entity.entity_id, discriminator
        )
    }

    /// Materialise the draft as a freshly logged event.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        let idempotency_key = self.idempotency_key();
        Event {
            id,
            idempotency_key,
            event_type: self.event_type,
            tenant_id: self.tenant_id,
            entity: self.entity,
            actor_id: self.actor_id,
            payload: self.payload,
            retry_count: 0,
            max_retries: self.max_retries,
            last_error: None,
            created_at,
            processed_at: None,
        }
    }
}
