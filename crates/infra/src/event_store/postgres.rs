//! Postgres-backed event store implementation.
//!
//! Schema lives in `migrations/` and is applied by [`ensure_schema`]. Every
//! lifecycle operation is a single statement (or one transaction), so the
//! store stays correct when more than one processor touches the same rows.
//!
//! ## Error Mapping
//!
//! | SQLx Error | EventStoreError |
//! |------------|-----------------|
//! | Database (any code) | `Storage` |
//! | PoolClosed | `Storage` |
//! | Row decode / JSON shape | `Serialization` |
//! | Other (network, TLS, ...) | `Storage` |
//!
//! Missing rows are reported as `NotFound` by the callers, never by the mapper.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use shopdesk_core::{EventId, TenantId, UserId};
use shopdesk_events::{DeadLetterEntry, EntityRef, Event, EventDraft, Payload};

use super::r#trait::{EventStore, EventStoreError};

const EVENT_COLUMNS: &str = "id, idempotency_key, event_type, tenant_id, entity_type, entity_id, \
     actor_id, payload, retry_count, max_retries, last_error, created_at, processed_at";

const DEAD_LETTER_COLUMNS: &str = "event_id, event_type, tenant_id, entity_type, entity_id, \
     payload, last_error, retry_count, dead_lettered_at";

/// Apply the pipeline schema (events, dead letters, notifications).
///
/// Safe to call on every start; already-applied migrations are skipped.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), EventStoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| EventStoreError::Storage(format!("schema migration failed: {e}")))
}

/// Postgres-backed event log.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is `Send + Sync`; clones share it.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        ensure_schema(&self.pool).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Event, EventStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_idempotency_key", e))?;

        decode_event(&row)
    }
}

#[async_trait::async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(
        skip(self, draft),
        fields(
            event_type = %draft.event_type(),
            tenant_id = %draft.tenant_id(),
            duplicate = tracing::field::Empty
        ),
        err
    )]
    async fn publish(&self, draft: EventDraft) -> Result<Event, EventStoreError> {
        let event = draft.into_event(EventId::new(), Utc::now());

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO events (
                id, idempotency_key, event_type, tenant_id, entity_type, entity_id,
                actor_id, payload, retry_count, max_retries, last_error, created_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, NULL, $10, NULL)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id.as_uuid())
        .bind(&event.idempotency_key)
        .bind(&event.event_type)
        .bind(event.tenant_id.as_uuid())
        .bind(&event.entity.entity_type)
        .bind(event.entity.entity_id)
        .bind(event.actor_id.map(|id| *id.as_uuid()))
        .bind(Json(&event.payload))
        .bind(to_db_count(event.max_retries))
        .bind(event.created_at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("publish", e))?;

        match inserted {
            Some(row) => decode_event(&row),
            None => {
                Span::current().record("duplicate", true);
                self.find_by_idempotency_key(&event.idempotency_key).await
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Event>, EventStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE processed_at IS NULL AND retry_count < max_retries
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#
        ))
        .bind(to_db_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_pending", e))?;

        rows.iter().map(decode_event).collect()
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        let result = sqlx::query(
            "UPDATE events SET processed_at = COALESCE(processed_at, NOW()) WHERE id = $1",
        )
        .bind(event_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_processed", e))?;

        if result.rows_affected() == 0 {
            return Err(EventStoreError::NotFound(event_id));
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(event_id = %event_id), err)]
    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<u32, EventStoreError> {
        // Increment-and-fetch in one statement; concurrent callers serialize on the row lock.
        let row = sqlx::query(
            r#"
            UPDATE events
            SET retry_count = retry_count + 1, last_error = $2
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(error)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_failure", e))?
        .ok_or(EventStoreError::NotFound(event_id))?;

        let count: i32 = row
            .try_get("retry_count")
            .map_err(|e| EventStoreError::Serialization(format!("failed to read retry_count: {e}")))?;
        Ok(from_db_count(count))
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn move_to_dead_letter(&self, event_id: EventId) -> Result<DeadLetterEntry, EventStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Snapshot before acknowledging; a second move keeps the first snapshot.
        sqlx::query(
            r#"
            INSERT INTO event_dead_letters (
                event_id, event_type, tenant_id, entity_type, entity_id,
                payload, last_error, retry_count, dead_lettered_at
            )
            SELECT id, event_type, tenant_id, entity_type, entity_id,
                   payload, last_error, retry_count, NOW()
            FROM events
            WHERE id = $1
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_dead_letter", e))?;

        let acknowledged = sqlx::query(
            "UPDATE events SET processed_at = COALESCE(processed_at, NOW()) WHERE id = $1",
        )
        .bind(event_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("acknowledge_dead_letter", e))?;

        if acknowledged.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::NotFound(event_id));
        }

        let row = sqlx::query(&format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM event_dead_letters WHERE event_id = $1"
        ))
        .bind(event_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_dead_letter", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        decode_dead_letter(&row)
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn get(&self, event_id: EventId) -> Result<Option<Event>, EventStoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(decode_event).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<Event>, EventStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_entity", e))?;

        rows.iter().map(decode_event).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_by_tenant(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(to_db_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_tenant", e))?;

        rows.iter().map(decode_event).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, EventStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DEAD_LETTER_COLUMNS}
            FROM event_dead_letters
            WHERE tenant_id = $1
            ORDER BY dead_lettered_at DESC
            LIMIT $2
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(to_db_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_dead_letters", e))?;

        rows.iter().map(decode_dead_letter).collect()
    }
}

/// Map SQLx errors to EventStoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            EventStoreError::Storage(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            EventStoreError::Serialization(format!("decode error in {operation}: {err}"))
        }
        _ => EventStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

pub(crate) fn to_db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn from_db_count(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

fn decode_event(row: &PgRow) -> Result<Event, EventStoreError> {
    EventRow::from_row(row)
        .map_err(|e| EventStoreError::Serialization(format!("failed to decode event row: {e}")))
        .map(Event::from)
}

fn decode_dead_letter(row: &PgRow) -> Result<DeadLetterEntry, EventStoreError> {
    DeadLetterRow::from_row(row)
        .map_err(|e| EventStoreError::Serialization(format!("failed to decode dead-letter row: {e}")))
        .map(DeadLetterEntry::from)
}

// SQLx row types

#[derive(Debug)]
struct EventRow {
    id: Uuid,
    idempotency_key: String,
    event_type: String,
    tenant_id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    actor_id: Option<Uuid>,
    payload: Json<Payload>,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            idempotency_key: row.try_get("idempotency_key")?,
            event_type: row.try_get("event_type")?,
            tenant_id: row.try_get("tenant_id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            actor_id: row.try_get("actor_id")?,
            payload: row.try_get("payload")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: EventId::from_uuid(row.id),
            idempotency_key: row.idempotency_key,
            event_type: row.event_type,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            entity: EntityRef::new(row.entity_type, row.entity_id),
            actor_id: row.actor_id.map(UserId::from_uuid),
            payload: row.payload.0,
            retry_count: from_db_count(row.retry_count),
            max_retries: from_db_count(row.max_retries),
            last_error: row.last_error,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[derive(Debug)]
struct DeadLetterRow {
    event_id: Uuid,
    event_type: String,
    tenant_id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    payload: Json<Payload>,
    last_error: Option<String>,
    retry_count: i32,
    dead_lettered_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DeadLetterRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DeadLetterRow {
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            tenant_id: row.try_get("tenant_id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            payload: row.try_get("payload")?,
            last_error: row.try_get("last_error")?,
            retry_count: row.try_get("retry_count")?,
            dead_lettered_at: row.try_get("dead_lettered_at")?,
        })
    }
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetterEntry {
            event_id: EventId::from_uuid(row.event_id),
            event_type: row.event_type,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            entity: EntityRef::new(row.entity_type, row.entity_id),
            payload: row.payload.0,
            last_error: row.last_error,
            retry_count: from_db_count(row.retry_count),
            dead_lettered_at: row.dead_lettered_at,
        }
    }
}
