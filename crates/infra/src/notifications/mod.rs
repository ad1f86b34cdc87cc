//! Notification sinks: where generated drafts are persisted, per audience.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryPlatformNotifications, InMemoryTenantNotifications};
pub use postgres::{PostgresPlatformNotifications, PostgresTenantNotifications};
pub use r#trait::{PlatformNotificationSink, SinkError, TenantNotificationSink};
