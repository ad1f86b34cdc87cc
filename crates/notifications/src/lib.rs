//! `shopdesk-notifications`: notification model and the pure event → draft
//! generator.
//!
//! Two disjoint audiences:
//! - **platform**: operators of the hosted service
//! - **tenant**: users of one service shop
//!
//! Nothing in this crate performs I/O; sinks live in `shopdesk-infra`.

pub mod generator;
pub mod model;

pub use generator::{GeneratedNotifications, NotificationGenerator, NotificationHandler};
pub use model::{
    Audience, Category, DeliveryChannel, DeliveryStatus, NotificationKey, PlatformNotification,
    PlatformNotificationDraft, Severity, TenantNotification, TenantNotificationDraft,
};
