use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use shopdesk_core::{EventId, NotificationId, TenantId, UserId};
use shopdesk_notifications::{
    NotificationKey, PlatformNotification, PlatformNotificationDraft, TenantNotification,
    TenantNotificationDraft,
};

use super::r#trait::{PlatformNotificationSink, SinkError, TenantNotificationSink};

trait Record: Clone {
    fn id(&self) -> NotificationId;
    fn key(&self) -> NotificationKey;
    fn is_read(&self) -> bool;
    fn set_read(&mut self, at: DateTime<Utc>);
}

impl Record for PlatformNotification {
    fn id(&self) -> NotificationId {
        self.id
    }
    fn key(&self) -> NotificationKey {
        PlatformNotification::key(self)
    }
    fn is_read(&self) -> bool {
        self.is_read
    }
    fn set_read(&mut self, at: DateTime<Utc>) {
        self.is_read = true;
        self.read_at = Some(at);
    }
}

impl Record for TenantNotification {
    fn id(&self) -> NotificationId {
        self.id
    }
    fn key(&self) -> NotificationKey {
        TenantNotification::key(self)
    }
    fn is_read(&self) -> bool {
        self.is_read
    }
    fn set_read(&mut self, at: DateTime<Utc>) {
        self.is_read = true;
        self.read_at = Some(at);
    }
}

/// Notifications in creation order, indexed by id and natural key.
#[derive(Debug)]
struct Records<T> {
    items: Vec<T>,
    by_id: HashMap<NotificationId, usize>,
    by_key: HashMap<NotificationKey, usize>,
}

impl<T> Default for Records<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            by_id: HashMap::new(),
            by_key: HashMap::new(),
        }
    }
}

impl<T: Record> Records<T> {
    /// Insert the record built by `build` unless `key` is already stored.
    fn insert_once(&mut self, key: NotificationKey, build: impl FnOnce() -> T) -> T {
        if let Some(&idx) = self.by_key.get(&key) {
            return self.items[idx].clone();
        }
        let record = build();
        let idx = self.items.len();
        self.by_id.insert(record.id(), idx);
        self.by_key.insert(key, idx);
        self.items.push(record.clone());
        record
    }

    fn get_mut(&mut self, id: NotificationId) -> Result<&mut T, SinkError> {
        let idx = *self.by_id.get(&id).ok_or(SinkError::NotFound(id))?;
        Ok(&mut self.items[idx])
    }

    fn newest_unread<'a>(
        &'a self,
        visible: impl Fn(&T) -> bool + 'a,
    ) -> impl Iterator<Item = &'a T> + 'a {
        self.items
            .iter()
            .rev()
            .filter(move |n| !n.is_read() && visible(*n))
    }

    fn mark_all_read(&mut self, visible: impl Fn(&T) -> bool) -> u64 {
        let now = Utc::now();
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.is_read() && visible(&**n)) {
            n.set_read(now);
            changed += 1;
        }
        changed
    }

    fn by_source_event(&self, event_id: EventId) -> Vec<T> {
        let mut found: Vec<T> = self
            .items
            .iter()
            .filter(|n| n.key().source_event_id == event_id)
            .cloned()
            .collect();
        found.sort_by_key(|n| n.key().ordinal);
        found
    }
}

fn poisoned() -> SinkError {
    SinkError::Storage("lock poisoned".to_string())
}

/// In-memory platform notification sink. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPlatformNotifications {
    records: RwLock<Records<PlatformNotification>>,
}

impl InMemoryPlatformNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records<PlatformNotification>>, SinkError> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records<PlatformNotification>>, SinkError> {
        self.records.write().map_err(|_| poisoned())
    }

    /// Every stored notification, oldest first.
    pub fn all(&self) -> Result<Vec<PlatformNotification>, SinkError> {
        Ok(self.read()?.items.clone())
    }
}

#[async_trait::async_trait]
impl PlatformNotificationSink for InMemoryPlatformNotifications {
    async fn create(&self, draft: PlatformNotificationDraft) -> Result<PlatformNotification, SinkError> {
        let key = draft.key();
        Ok(self.write()?.insert_once(key, || {
            PlatformNotification::from_draft(draft, NotificationId::new(), Utc::now())
        }))
    }

    async fn find_unread(
        &self,
        recipient: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<PlatformNotification>, SinkError> {
        let records = self.read()?;
        Ok(records
            .newest_unread(|n| n.is_visible_to(recipient))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), SinkError> {
        let mut records = self.write()?;
        let notification = records.get_mut(id)?;
        if !notification.is_read {
            notification.set_read(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, recipient: Option<UserId>) -> Result<u64, SinkError> {
        Ok(self.write()?.mark_all_read(|n| n.is_visible_to(recipient)))
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<PlatformNotification>, SinkError> {
        Ok(self.read()?.by_source_event(event_id))
    }
}

/// In-memory tenant notification sink. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTenantNotifications {
    records: RwLock<Records<TenantNotification>>,
}

impl InMemoryTenantNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records<TenantNotification>>, SinkError> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records<TenantNotification>>, SinkError> {
        self.records.write().map_err(|_| poisoned())
    }

    /// Every stored notification, oldest first.
    pub fn all(&self) -> Result<Vec<TenantNotification>, SinkError> {
        Ok(self.read()?.items.clone())
    }
}

#[async_trait::async_trait]
impl TenantNotificationSink for InMemoryTenantNotifications {
    async fn create(&self, draft: TenantNotificationDraft) -> Result<TenantNotification, SinkError> {
        let key = draft.key();
        Ok(self.write()?.insert_once(key, || {
            TenantNotification::from_draft(draft, NotificationId::new(), Utc::now())
        }))
    }

    async fn find_unread(
        &self,
        tenant_id: TenantId,
        user: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<TenantNotification>, SinkError> {
        let records = self.read()?;
        Ok(records
            .newest_unread(|n| n.tenant_id == tenant_id && n.is_visible_to(user))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, tenant_id: TenantId, id: NotificationId) -> Result<(), SinkError> {
        let mut records = self.write()?;
        let notification = records.get_mut(id)?;
        if notification.tenant_id != tenant_id {
            return Err(SinkError::TenantIsolation(format!(
                "notification {id} does not belong to tenant {tenant_id}"
            )));
        }
        if !notification.is_read {
            notification.set_read(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, tenant_id: TenantId, user: Option<UserId>) -> Result<u64, SinkError> {
        Ok(self
            .write()?
            .mark_all_read(|n| n.tenant_id == tenant_id && n.is_visible_to(user)))
    }

    async fn find_by_source_event(&self, event_id: EventId) -> Result<Vec<TenantNotification>, SinkError> {
        Ok(self.read()?.by_source_event(event_id))
    }
}
