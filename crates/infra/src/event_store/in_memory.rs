use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use shopdesk_core::{EventId, TenantId};
use shopdesk_events::{DeadLetterEntry, Event, EventDraft};

use super::r#trait::{EventStore, EventStoreError};

/// Events in insertion order (which is also `created_at` order) plus indexes.
#[derive(Debug, Default)]
struct Log {
    events: Vec<Event>,
    by_id: HashMap<EventId, usize>,
    by_idempotency_key: HashMap<String, usize>,
    dead_letters: HashMap<EventId, DeadLetterEntry>,
}

impl Log {
    fn get_mut(&mut self, event_id: EventId) -> Result<&mut Event, EventStoreError> {
        let idx = *self
            .by_id
            .get(&event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        Ok(&mut self.events[idx])
    }
}

/// In-memory event log.
///
/// Intended for tests/dev. Not optimized for performance. A single lock guards
/// events and dead letters so every operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Log>, EventStoreError> {
        self.log
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Log>, EventStoreError> {
        self.log
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn publish(&self, draft: EventDraft) -> Result<Event, EventStoreError> {
        let key = draft.idempotency_key();
        let mut log = self.write()?;

        if let Some(&idx) = log.by_idempotency_key.get(&key) {
            return Ok(log.events[idx].clone());
        }

        let event = draft.into_event(EventId::new(), Utc::now());
        let idx = log.events.len();
        log.by_id.insert(event.id, idx);
        log.by_idempotency_key.insert(key, idx);
        log.events.push(event.clone());
        Ok(event)
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Event>, EventStoreError> {
        let log = self.read()?;
        Ok(log
            .events
            .iter()
            .filter(|e| e.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        self.write()?.get_mut(event_id)?.mark_processed(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<u32, EventStoreError> {
        Ok(self.write()?.get_mut(event_id)?.record_failure(error))
    }

    async fn move_to_dead_letter(&self, event_id: EventId) -> Result<DeadLetterEntry, EventStoreError> {
        let mut log = self.write()?;
        let now = Utc::now();

        let event = log.get_mut(event_id)?;
        let snapshot = DeadLetterEntry::from_event(event, now);
        event.mark_processed(now);

        let entry = log.dead_letters.entry(event_id).or_insert(snapshot);
        Ok(entry.clone())
    }

    async fn get(&self, event_id: EventId) -> Result<Option<Event>, EventStoreError> {
        let log = self.read()?;
        Ok(log.by_id.get(&event_id).map(|&idx| log.events[idx].clone()))
    }

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<Event>, EventStoreError> {
        let log = self.read()?;
        Ok(log
            .events
            .iter()
            .rev()
            .filter(|e| e.entity.entity_type == entity_type && e.entity.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_by_tenant(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let log = self.read()?;
        Ok(log
            .events
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, EventStoreError> {
        let log = self.read()?;
        let mut entries: Vec<_> = log
            .dead_letters
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.dead_lettered_at.cmp(&a.dead_lettered_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use shopdesk_events::EntityRef;

    use super::*;

    fn draft(tenant: TenantId, event_type: &str, payload: serde_json::Value) -> EventDraft {
        EventDraft::new(event_type, tenant, EntityRef::new("job", Uuid::now_v7()), payload).unwrap()
    }

    #[tokio::test]
    async fn duplicate_publish_returns_existing_event() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();

        let first = store
            .publish(draft(tenant, "job.created", json!({"job_number": "J-1"})).with_idempotency_key("job-1-created"))
            .await
            .unwrap();
        let second = store
            .publish(draft(tenant, "job.created", json!({"job_number": "J-1"})).with_idempotency_key("job-1-created"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.find_by_tenant(tenant, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_is_fifo_and_limited() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();

        let mut ids = Vec::new();
        for i in 0..5 {
            let e = store
                .publish(draft(tenant, "job.created", json!({"i": i})))
                .await
                .unwrap();
            ids.push(e.id);
        }

        let pending = store.fetch_pending(3).await.unwrap();
        let fetched: Vec<_> = pending.iter().map(|e| e.id).collect();
        assert_eq!(fetched, ids[..3].to_vec());
    }

    #[tokio::test]
    async fn pending_excludes_processed_and_exhausted_events() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();

        let processed = store.publish(draft(tenant, "job.created", json!({"n": 1}))).await.unwrap();
        let exhausted = store
            .publish(draft(tenant, "job.created", json!({"n": 2})).with_max_retries(1))
            .await
            .unwrap();
        let live = store.publish(draft(tenant, "job.created", json!({"n": 3}))).await.unwrap();

        store.mark_processed(processed.id).await.unwrap();
        store.record_failure(exhausted.id, "boom").await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, live.id);
        for e in &pending {
            assert!(e.processed_at.is_none());
            assert!(e.retry_count < e.max_retries);
        }
    }

    #[tokio::test]
    async fn mark_processed_is_idempotent() {
        let store = InMemoryEventStore::new();
        let e = store
            .publish(draft(TenantId::new(), "job.created", json!({})))
            .await
            .unwrap();

        store.mark_processed(e.id).await.unwrap();
        let first = store.get(e.id).await.unwrap().unwrap().processed_at;
        store.mark_processed(e.id).await.unwrap();
        let second = store.get(e.id).await.unwrap().unwrap().processed_at;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let store = Arc::new(InMemoryEventStore::new());
        let e = store
            .publish(draft(TenantId::new(), "job.created", json!({})).with_max_retries(1000))
            .await
            .unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64 {
            let store = store.clone();
            tasks.spawn(async move { store.record_failure(e.id, &format!("attempt {i}")).await });
        }

        let mut counts = Vec::new();
        while let Some(result) = tasks.join_next().await {
            counts.push(result.unwrap().unwrap());
        }
        counts.sort_unstable();

        assert_eq!(counts, (1..=64).collect::<Vec<u32>>());
        assert_eq!(store.get(e.id).await.unwrap().unwrap().retry_count, 64);
    }

    #[tokio::test]
    async fn dead_letter_snapshots_and_acknowledges() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let e = store
            .publish(draft(tenant, "payment.received", json!({"amount": 10})))
            .await
            .unwrap();
        store.record_failure(e.id, "sink down").await.unwrap();

        let entry = store.move_to_dead_letter(e.id).await.unwrap();
        assert_eq!(entry.event_id, e.id);
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("sink down"));
        assert_eq!(entry.payload, e.payload);

        let stored = store.get(e.id).await.unwrap().unwrap();
        assert!(stored.processed_at.is_some());
        assert!(store.fetch_pending(10).await.unwrap().is_empty());

        // Repeating the move keeps the original snapshot.
        let again = store.move_to_dead_letter(e.id).await.unwrap();
        assert_eq!(again, entry);
        assert_eq!(store.list_dead_letters(tenant, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let store = InMemoryEventStore::new();
        let missing = EventId::new();

        assert!(matches!(
            store.mark_processed(missing).await,
            Err(EventStoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.record_failure(missing, "x").await,
            Err(EventStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.move_to_dead_letter(missing).await,
            Err(EventStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn audit_queries_scope_by_entity_and_tenant() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let other_tenant = TenantId::new();
        let job = EntityRef::new("job", Uuid::now_v7());

        for status in ["in_progress", "completed"] {
            let d = EventDraft::new("job.status_changed", tenant, job.clone(), json!({"new_status": status}))
                .unwrap();
            store.publish(d).await.unwrap();
        }
        store.publish(draft(other_tenant, "job.created", json!({}))).await.unwrap();

        let about_job = store.find_by_entity("job", job.entity_id).await.unwrap();
        assert_eq!(about_job.len(), 2);
        assert!(about_job[0].created_at >= about_job[1].created_at);

        assert_eq!(store.find_by_tenant(tenant, 10).await.unwrap().len(), 2);
        assert_eq!(store.find_by_tenant(tenant, 1).await.unwrap().len(), 1);
        assert_eq!(store.find_by_tenant(other_tenant, 10).await.unwrap().len(), 1);
        assert!(store.list_dead_letters(tenant, 10).await.unwrap().is_empty());
    }
}
