//! Postgres-backed notification sinks.
//!
//! Tables are created by the pipeline migration (see
//! [`ensure_schema`](crate::event_store::ensure_schema)). Both tables carry a
//! unique constraint on `(source_event_id, ordinal)`; `create` upserts on it
//! and returns whichever row won, so retried events never duplicate.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use shopdesk_core::{EventId, NotificationId, TenantId, UserId};
use shopdesk_events::EntityRef;
use shopdesk_notifications::{
    DeliveryStatus, PlatformNotification, PlatformNotificationDraft, TenantNotification,
    TenantNotificationDraft,
};

use super::r#trait::{PlatformNotificationSink, SinkError, TenantNotificationSink};

const PLATFORM_COLUMNS: &str = "id, source_event_id, ordinal, recipient_id, tenant_id, title, \
     message, category, severity, entity_type, entity_id, is_read, created_at, read_at";

const TENANT_COLUMNS: &str = "id, source_event_id, ordinal, tenant_id, user_id, customer_id, \
     job_id, title, message, channel, category, severity, entity_type, entity_id, \
     delivery_status, is_read, created_at, read_at";

/// Platform-operator notifications stored in `platform_notifications`.
#[derive(Debug, Clone)]
pub struct PostgresPlatformNotifications {
    pool: Arc<PgPool>,
}

impl PostgresPlatformNotifications {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl PlatformNotificationSink for PostgresPlatformNotifications {
    #[instrument(
        skip(self, draft),
        fields(source_event_id = %draft.source_event_id, ordinal = draft.ordinal),
        err
    )]
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO platform_notifications (
                id, source_event_id, ordinal, recipient_id, tenant_id, title, message,
                category, severity, entity_type, entity_id, is_read, created_at, read_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, $12, NULL)
            ON CONFLICT (source_event_id, ordinal)
            DO UPDATE SET source_event_id = EXCLUDED.source_event_id
            RETURNING {PLATFORM_COLUMNS}
            "#
        ))
        .bind(NotificationId::new().as_uuid())
        .bind(draft.source_event_id.as_uuid())
        .bind(to_db_ordinal(draft.ordinal))
        .bind(draft.recipient_id.map(|id| *id.as_uuid()))
        .bind(draft.tenant_id.map(|id| *id.as_uuid()))
        .bind(&draft.title)
        .bind(&draft.message)
        .bind(draft.category.as_str())
        .bind(draft.severity.as_str())
        .bind(draft.entity.as_ref().map(|e| e.entity_type.as_str()))
        .bind(draft.entity.as_ref().map(|e| e.entity_id))
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_platform_notification", e))?;

        decode_platform(&row)
    }

    #[instrument(skip(self), err)]
    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PLATFORM_COLUMNS}
            FROM platform_notifications
            WHERE is_read = FALSE AND (recipient_id IS NULL OR recipient_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(recipient.map(|id| *id.as_uuid()))
        .bind(to_db_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_unread_platform", e))?;

        rows.iter().map(decode_platform).collect()
    }

    #[instrument(skip(self), fields(notification_id = %id), err)]
    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError> {
        let result = sqlx::query(
            r#"
            UPDATE platform_notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_read_platform", e))?;

        if result.rows_affected() == 0 {
            return Err(SinkError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError> {
        let result = sqlx::query(
            r#"
            UPDATE platform_notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE is_read = FALSE AND (recipient_id IS NULL OR recipient_id = $1)
            "#,
        )
        .bind(recipient.map(|id| *id.as_uuid()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_all_read_platform", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLATFORM_COLUMNS} FROM platform_notifications \
             WHERE source_event_id = $1 ORDER BY ordinal ASC"
        ))
        .bind(event_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_platform_by_source_event", e))?;

        rows.iter().map(decode_platform).collect()
    }
}

/// Tenant-user notifications stored in `tenant_notifications`.
///
/// Every read-path query filters on `tenant_id`.
#[derive(Debug, Clone)]
pub struct PostgresTenantNotifications {
    pool: Arc<PgPool>,
}

impl PostgresTenantNotifications {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl TenantNotificationSink for PostgresTenantNotifications {
    #[instrument(
        skip(self, draft),
        fields(
            tenant_id = %draft.tenant_id,
            source_event_id = %draft.source_event_id,
            ordinal = draft.ordinal
        ),
        err
    )]
    async fn create(&self, draft: TenantNotificationDraft) -> Result<TenantNotification, SinkError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tenant_notifications (
                id, source_event_id, ordinal, tenant_id, user_id, customer_id, job_id,
                title, message, channel, category, severity, entity_type, entity_id,
                delivery_status, is_read, created_at, read_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE, $16, NULL)
            ON CONFLICT (source_event_id, ordinal)
            DO UPDATE SET source_event_id = EXCLUDED.source_event_id
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(NotificationId::new().as_uuid())
        .bind(draft.source_event_id.as_uuid())
        .bind(to_db_ordinal(draft.ordinal))
        .bind(draft.tenant_id.as_uuid())
        .bind(draft.user_id.map(|id| *id.as_uuid()))
        .bind(draft.customer_id)
        .bind(draft.job_id)
        .bind(&draft.title)
        .bind(&draft.message)
        .bind(draft.channel.as_str())
        .bind(draft.category.as_str())
        .bind(draft.severity.as_str())
        .bind(&draft.entity.entity_type)
        .bind(draft.entity.entity_id)
        .bind(DeliveryStatus::initial_for(draft.channel).as_str())
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_tenant_notification", e))?;

        decode_tenant(&row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn find_unread(
        &self,
        tenant_id: TenantId,
        user: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<TenantNotification>, SinkError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TENANT_COLUMNS}
            FROM tenant_notifications
            WHERE tenant_id = $1
                AND is_read = FALSE
                AND (user_id IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(user.map(|id| *id.as_uuid()))
        .bind(to_db_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_unread_tenant", e))?;

        rows.iter().map(decode_tenant).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, notification_id = %id), err)]
    async fn mark_read(&self, tenant_id: TenantId, id: NotificationId) -> Result<(), SinkError> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_read_tenant", e))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Distinguish "missing" from "owned by another tenant".
        let owner: Option<Uuid> = sqlx::query("SELECT tenant_id FROM tenant_notifications WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_read_tenant_owner", e))?
            .map(|row| row.try_get::<Uuid, _>("tenant_id"))
            .transpose()
            .map_err(|e| SinkError::Serialization(format!("failed to read tenant_id: {e}")))?;

        match owner {
            Some(_) => Err(SinkError::TenantIsolation(format!(
                "notification {id} does not belong to tenant {tenant_id}"
            ))),
            None => Err(SinkError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn mark_all_read(&self, tenant_id: TenantId, user: Option<UserId>) -> Result<u64, SinkError> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE tenant_id = $1
                AND is_read = FALSE
                AND (user_id IS NULL OR user_id = $2)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user.map(|id| *id.as_uuid()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_all_read_tenant", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<TenantNotification>, SinkError> {
        let rows = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant_notifications \
             WHERE source_event_id = $1 ORDER BY ordinal ASC"
        ))
        .bind(event_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_tenant_by_source_event", e))?;

        rows.iter().map(decode_tenant).collect()
    }
}

/// Map SQLx errors to SinkError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SinkError {
    match err {
        sqlx::Error::Database(db_err) => SinkError::Storage(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => SinkError::Storage(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            SinkError::Serialization(format!("decode error in {operation}: {err}"))
        }
        _ => SinkError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn to_db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn to_db_ordinal(ordinal: u32) -> i32 {
    i32::try_from(ordinal).unwrap_or(i32::MAX)
}

fn parse_text<T: FromStr<Err = shopdesk_core::DomainError>>(column: &str, value: &str) -> Result<T, SinkError> {
    value
        .parse()
        .map_err(|e| SinkError::Serialization(format!("invalid {column} '{value}': {e}")))
}

fn decode_platform(row: &PgRow) -> Result<PlatformNotification, SinkError> {
    let row = PlatformRow::from_row(row)
        .map_err(|e| SinkError::Serialization(format!("failed to decode platform notification: {e}")))?;

    let entity = match (row.entity_type, row.entity_id) {
        (Some(entity_type), Some(entity_id)) => Some(EntityRef::new(entity_type, entity_id)),
        _ => None,
    };

    Ok(PlatformNotification {
        id: NotificationId::from_uuid(row.id),
        source_event_id: EventId::from_uuid(row.source_event_id),
        ordinal: u32::try_from(row.ordinal).unwrap_or(0),
        recipient_id: row.recipient_id.map(UserId::from_uuid),
        tenant_id: row.tenant_id.map(TenantId::from_uuid),
        title: row.title,
        message: row.message,
        category: parse_text("category", &row.category)?,
        severity: parse_text("severity", &row.severity)?,
        entity,
        is_read: row.is_read,
        created_at: row.created_at,
        read_at: row.read_at,
    })
}

fn decode_tenant(row: &PgRow) -> Result<TenantNotification, SinkError> {
    let row = TenantRow::from_row(row)
        .map_err(|e| SinkError::Serialization(format!("failed to decode tenant notification: {e}")))?;

    Ok(TenantNotification {
        id: NotificationId::from_uuid(row.id),
        source_event_id: EventId::from_uuid(row.source_event_id),
        ordinal: u32::try_from(row.ordinal).unwrap_or(0),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        user_id: row.user_id.map(UserId::from_uuid),
        customer_id: row.customer_id,
        job_id: row.job_id,
        title: row.title,
        message: row.message,
        channel: parse_text("channel", &row.channel)?,
        category: parse_text("category", &row.category)?,
        severity: parse_text("severity", &row.severity)?,
        entity: EntityRef::new(row.entity_type, row.entity_id),
        delivery_status: parse_text("delivery_status", &row.delivery_status)?,
        is_read: row.is_read,
        created_at: row.created_at,
        read_at: row.read_at,
    })
}

// SQLx row types

#[derive(Debug)]
struct PlatformRow {
    id: Uuid,
    source_event_id: Uuid,
    ordinal: i32,
    recipient_id: Option<Uuid>,
    tenant_id: Option<Uuid>,
    title: String,
    message: String,
    category: String,
    severity: String,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for PlatformRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PlatformRow {
            id: row.try_get("id")?,
            source_event_id: row.try_get("source_event_id")?,
            ordinal: row.try_get("ordinal")?,
            recipient_id: row.try_get("recipient_id")?,
            tenant_id: row.try_get("tenant_id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            category: row.try_get("category")?,
            severity: row.try_get("severity")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
            read_at: row.try_get("read_at")?,
        })
    }
}

#[derive(Debug)]
struct TenantRow {
    id: Uuid,
    source_event_id: Uuid,
    ordinal: i32,
    tenant_id: Uuid,
    user_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    job_id: Option<Uuid>,
    title: String,
    message: String,
    channel: String,
    category: String,
    severity: String,
    entity_type: String,
    entity_id: Uuid,
    delivery_status: String,
    is_read: bool,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TenantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TenantRow {
            id: row.try_get("id")?,
            source_event_id: row.try_get("source_event_id")?,
            ordinal: row.try_get("ordinal")?,
            tenant_id: row.try_get("tenant_id")?,
            user_id: row.try_get("user_id")?,
            customer_id: row.try_get("customer_id")?,
            job_id: row.try_get("job_id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            channel: row.try_get("channel")?,
            category: row.try_get("category")?,
            severity: row.try_get("severity")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            delivery_status: row.try_get("delivery_status")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
            read_at: row.try_get("read_at")?,
        })
    }
}
