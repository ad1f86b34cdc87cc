//! Tenant (shop account) lifecycle notifications. Operators only.

use shopdesk_events::Event;
use shopdesk_events::types::tenants;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, PlatformNotificationDraft, Severity};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(tenants::CREATED, tenant_created);
    generator.register(tenants::STATUS_CHANGED, tenant_status_changed);
}

pub fn tenant_created(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let tenant_name = fields::text(p, "tenant_name");
    let tier = fields::text(p, "subscription_tier");

    let platform = PlatformNotificationDraft::for_event(
        event,
        "New tenant registered",
        format!("{tenant_name} signed up on the {tier} plan."),
        Category::Tenant,
        Severity::Info,
    );

    GeneratedNotifications::empty().with_platform(platform)
}

/// Suspensions are critical; every other transition is informational.
pub fn tenant_status_changed(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let tenant_name = fields::text(p, "tenant_name");
    let old_status = fields::text(p, "old_status");
    let new_status = fields::text(p, "new_status");

    let severity = if new_status == "suspended" {
        Severity::Critical
    } else {
        Severity::Info
    };

    let platform = PlatformNotificationDraft::for_event(
        event,
        "Tenant status changed",
        format!("{tenant_name} changed status from {old_status} to {new_status}."),
        Category::Tenant,
        severity,
    );

    GeneratedNotifications::empty().with_platform(platform)
}
