use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use shopdesk_core::TenantId;
use shopdesk_events::{EntityRef, Event, EventDraft};

use super::r#trait::EventStore;

/// Fire-and-forget entry point for business transactions.
///
/// `publish` **never returns an error**. A store failure (or an invalid draft,
/// for [`publish_new`](Self::publish_new)) is logged at `warn` and swallowed,
/// so emitting an event can never abort the transaction that triggered it.
/// Callers that need the stored event get it back as `Some`; `None` means the
/// event was dropped and is visible only in the logs.
#[derive(Debug, Clone)]
pub struct EventPublisher<S> {
    store: S,
}

impl<S> EventPublisher<S>
where
    S: EventStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Publish a validated draft. Duplicates return the existing event.
    pub async fn publish(&self, draft: EventDraft) -> Option<Event> {
        let event_type = draft.event_type().to_string();
        let tenant_id = draft.tenant_id();

        match self.store.publish(draft).await {
            Ok(event) => {
                debug!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    tenant_id = %event.tenant_id,
                    "event published"
                );
                Some(event)
            }
            Err(err) => {
                warn!(
                    event_type = %event_type,
                    tenant_id = %tenant_id,
                    error = %err,
                    "failed to publish event; dropping it"
                );
                None
            }
        }
    }

    /// Build and publish a draft in one call.
    pub async fn publish_new(
        &self,
        event_type: &str,
        tenant_id: TenantId,
        entity: EntityRef,
        payload: JsonValue,
    ) -> Option<Event> {
        match EventDraft::new(event_type, tenant_id, entity, payload) {
            Ok(draft) => self.publish(draft).await,
            Err(err) => {
                warn!(
                    event_type = %event_type,
                    tenant_id = %tenant_id,
                    error = %err,
                    "invalid event draft; dropping it"
                );
                None
            }
        }
    }
}
