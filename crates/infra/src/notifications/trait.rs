use std::sync::Arc;

use thiserror::Error;

use shopdesk_core::{EventId, NotificationId, TenantId, UserId};
use shopdesk_notifications::{
    PlatformNotification, PlatformNotificationDraft, TenantNotification, TenantNotificationDraft,
};

/// Notification sink operation error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Destination for notifications addressed to platform operators.
///
/// `create` is keyed on `(source_event_id, ordinal)`: persisting a draft that
/// was already persisted returns the stored notification untouched, so a
/// retried event never duplicates what an earlier attempt wrote.
#[async_trait::async_trait]
pub trait PlatformNotificationSink: Send + Sync {
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError>;

    /// Unread notifications addressed to `recipient` plus broadcasts, newest first.
    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError>;

    /// Mark one notification read. Idempotent.
    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError>;

    /// Mark everything visible to `recipient` read; returns how many changed.
    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError>;

    /// Everything derived from one event, by ordinal.
    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError>;
}

/// Destination for notifications addressed to one tenant's users.
///
/// Same idempotency contract as [`PlatformNotificationSink`]. Read-path
/// operations are always scoped to a tenant.
#[async_trait::async_trait]
pub trait TenantNotificationSink: Send + Sync {
    async fn create(&self, draft: TenantNotificationDraft) -> Result<TenantNotification, SinkError>;

    /// Unread notifications of `tenant_id` addressed to `user` plus tenant broadcasts.
    async fn find_unread(
        &self,
        tenant_id: TenantId,
        user: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<TenantNotification>, SinkError>;

    /// Mark one notification read; it must belong to `tenant_id`.
    async fn mark_read(&self, tenant_id: TenantId, id: NotificationId) -> Result<(), SinkError>;

    async fn mark_all_read(&self, tenant_id: TenantId, user: Option<UserId>) -> Result<u64, SinkError>;

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<TenantNotification>, SinkError>;
}

#[async_trait::async_trait]
impl<S> PlatformNotificationSink for Arc<S>
where
    S: PlatformNotificationSink + ?Sized,
{
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError> {
        (**self).create(draft).await
    }

    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError> {
        (**self).find_unread(recipient, limit).await
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError> {
        (**self).mark_read(id).await
    }

    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError> {
        (**self).mark_all_read(recipient).await
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError> {
        (**self).find_by_source_event(event_id).await
    }
}

#[async_trait::async_trait]
impl<S> TenantNotificationSink for Arc<S>
where
    S: TenantNotificationSink + ?Sized,
{
    async fn create(&self, draft: TenantNotificationDraft) -> Result<TenantNotification, SinkError> {
        (**self).create(draft).await
    }

    async fn find_unread(
        &self,
        tenant_id: TenantId,
        user: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<TenantNotification>, SinkError> {
        (**self).find_unread(tenant_id, user, limit).await
    }

    async fn mark_read(&self, tenant_id: TenantId, id: NotificationId) -> Result<(), SinkError> {
        (**self).mark_read(tenant_id, id).await
    }

    async fn mark_all_read(&self, tenant_id: TenantId, user: Option<UserId>) -> Result<u64, SinkError> {
        (**self).mark_all_read(tenant_id, user).await
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<TenantNotification>, SinkError> {
        (**self).find_by_source_event(event_id).await
    }
}
