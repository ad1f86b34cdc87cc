//! Notification drafts and persisted notifications for both audiences.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopdesk_core::{DomainError, EventId, NotificationId, TenantId, UserId};
use shopdesk_events::{EntityRef, Event};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(DomainError::validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Which bounded context a notification is about.
    Category {
        Job => "job",
        Billing => "billing",
        Subscription => "subscription",
        Tenant => "tenant",
        Inventory => "inventory",
        System => "system",
    }
);

text_enum!(
    Severity {
        Info => "info",
        Warning => "warning",
        Critical => "critical",
    }
);

text_enum!(
    DeliveryChannel {
        InApp => "in_app",
        Email => "email",
        Sms => "sms",
    }
);

text_enum!(
    DeliveryStatus {
        Pending => "pending",
        Sent => "sent",
        Delivered => "delivered",
        Failed => "failed",
    }
);

text_enum!(
    /// The two disjoint notification destinations.
    Audience {
        Platform => "platform",
        Tenant => "tenant",
    }
);

impl DeliveryStatus {
    /// Status a notification starts in when first persisted on `channel`.
    ///
    /// In-app notifications are visible as soon as they are stored.
    pub fn initial_for(channel: DeliveryChannel) -> Self {
        match channel {
            DeliveryChannel::InApp => Self::Delivered,
            DeliveryChannel::Email | DeliveryChannel::Sms => Self::Pending,
        }
    }
}

/// Natural key of a notification inside its sink.
///
/// Regenerating drafts for the same event yields the same keys, so a retried
/// event overwrites (rather than duplicates) what an earlier attempt wrote.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub source_event_id: EventId,
    pub ordinal: u32,
}

/// Unpersisted notification for platform operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformNotificationDraft {
    pub source_event_id: EventId,
    /// Position among the platform drafts of the source event.
    pub ordinal: u32,
    /// `None` broadcasts to every platform operator.
    pub recipient_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub severity: Severity,
    pub entity: Option<EntityRef>,
}

impl PlatformNotificationDraft {
    /// Draft addressed to all operators, carrying the event's tenant and subject.
    pub fn for_event(
        event: &Event,
        title: impl Into<String>,
        message: impl Into<String>,
        category: Category,
        severity: Severity,
    ) -> Self {
        Self {
            source_event_id: event.id,
            ordinal: 0,
            recipient_id: None,
            tenant_id: Some(event.tenant_id),
            title: title.into(),
            message: message.into(),
            category,
            severity,
            entity: Some(event.entity.clone()),
        }
    }

    pub fn with_recipient(mut self, recipient_id: UserId) -> Self {
        self.recipient_id = Some(recipient_id);
        self
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            source_event_id: self.source_event_id,
            ordinal: self.ordinal,
        }
    }
}

/// Unpersisted notification for a tenant's own users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNotificationDraft {
    pub source_event_id: EventId,
    /// Position among the tenant drafts of the source event.
    pub ordinal: u32,
    pub tenant_id: TenantId,
    /// `None` broadcasts to every user of the tenant.
    pub user_id: Option<UserId>,
    pub customer_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub channel: DeliveryChannel,
    pub category: Category,
    pub severity: Severity,
    pub entity: EntityRef,
}

impl TenantNotificationDraft {
    /// In-app broadcast to the event's tenant about the event's subject.
    pub fn for_event(
        event: &Event,
        title: impl Into<String>,
        message: impl Into<String>,
        category: Category,
        severity: Severity,
    ) -> Self {
        Self {
            source_event_id: event.id,
            ordinal: 0,
            tenant_id: event.tenant_id,
            user_id: None,
            customer_id: None,
            job_id: None,
            title: title.into(),
            message: message.into(),
            channel: DeliveryChannel::InApp,
            category,
            severity,
            entity: event.entity.clone(),
        }
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_customer(mut self, customer_id: Option<Uuid>) -> Self {
        self.customer_id = customer_id;
        self
    }

    pub fn with_job(mut self, job_id: Option<Uuid>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            source_event_id: self.source_event_id,
            ordinal: self.ordinal,
        }
    }
}

/// Persisted platform notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformNotification {
    pub id: NotificationId,
    pub source_event_id: EventId,
    pub ordinal: u32,
    pub recipient_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub severity: Severity,
    pub entity: Option<EntityRef>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl PlatformNotification {
    pub fn from_draft(draft: PlatformNotificationDraft, id: NotificationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            source_event_id: draft.source_event_id,
            ordinal: draft.ordinal,
            recipient_id: draft.recipient_id,
            tenant_id: draft.tenant_id,
            title: draft.title,
            message: draft.message,
            category: draft.category,
            severity: draft.severity,
            entity: draft.entity,
            is_read: false,
            created_at,
            read_at: None,
        }
    }

    /// Whether `recipient` should see this notification (directly or via broadcast).
    pub fn is_visible_to(&self, recipient: Option<UserId>) -> bool {
        match (self.recipient_id, recipient) {
            (None, _) => true,
            (Some(addressed), Some(reader)) => addressed == reader,
            (Some(_), None) => false,
        }
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            source_event_id: self.source_event_id,
            ordinal: self.ordinal,
        }
    }
}

/// Persisted tenant notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNotification {
    pub id: NotificationId,
    pub source_event_id: EventId,
    pub ordinal: u32,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub customer_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub channel: DeliveryChannel,
    pub category: Category,
    pub severity: Severity,
    pub entity: EntityRef,
    pub delivery_status: DeliveryStatus,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl TenantNotification {
    pub fn from_draft(draft: TenantNotificationDraft, id: NotificationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            source_event_id: draft.source_event_id,
            ordinal: draft.ordinal,
            tenant_id: draft.tenant_id,
            user_id: draft.user_id,
            customer_id: draft.customer_id,
            job_id: draft.job_id,
            title: draft.title,
            message: draft.message,
            channel: draft.channel,
            category: draft.category,
            severity: draft.severity,
            entity: draft.entity,
            delivery_status: DeliveryStatus::initial_for(draft.channel),
            is_read: false,
            created_at,
            read_at: None,
        }
    }

    /// Whether `user` of this notification's tenant should see it.
    pub fn is_visible_to(&self, user: Option<UserId>) -> bool {
        match (self.user_id, user) {
            (None, _) => true,
            (Some(addressed), Some(reader)) => addressed == reader,
            (Some(_), None) => false,
        }
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            source_event_id: self.source_event_id,
            ordinal: self.ordinal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_strings() {
        for category in [
            Category::Job,
            Category::Billing,
            Category::Subscription,
            Category::Tenant,
            Category::Inventory,
            Category::System,
        ] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("in_app".parse::<DeliveryChannel>().unwrap(), DeliveryChannel::InApp);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn serde_matches_text_form() {
        let json = serde_json::to_string(&DeliveryChannel::InApp).unwrap();
        assert_eq!(json, "\"in_app\"");
    }

    #[test]
    fn in_app_starts_delivered() {
        assert_eq!(DeliveryStatus::initial_for(DeliveryChannel::InApp), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::initial_for(DeliveryChannel::Email), DeliveryStatus::Pending);
    }

    #[test]
    fn broadcast_is_visible_to_everyone() {
        let draft = PlatformNotificationDraft {
            source_event_id: EventId::new(),
            ordinal: 0,
            recipient_id: None,
            tenant_id: None,
            title: "t".into(),
            message: "m".into(),
            category: Category::System,
            severity: Severity::Info,
            entity: None,
        };
        let operator = UserId::new();
        let broadcast = PlatformNotification::from_draft(draft.clone(), NotificationId::new(), Utc::now());
        assert!(broadcast.is_visible_to(Some(operator)));
        assert!(broadcast.is_visible_to(None));

        let direct = PlatformNotification::from_draft(
            draft.with_recipient(operator),
            NotificationId::new(),
            Utc::now(),
        );
        assert!(direct.is_visible_to(Some(operator)));
        assert!(!direct.is_visible_to(Some(UserId::new())));
        assert!(!direct.is_read);
    }
}
