//! Subscription (platform plan) notifications.

use shopdesk_events::Event;
use shopdesk_events::types::subscriptions;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, PlatformNotificationDraft, Severity, TenantNotificationDraft};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(subscriptions::EXPIRING, subscription_expiring);
    generator.register(subscriptions::TIER_CHANGED, subscription_tier_changed);
}

/// Plan about to lapse: the shop is asked to renew, operators are told who
/// is at risk.
pub fn subscription_expiring(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let tier = fields::text(p, "subscription_tier");
    let ends = fields::text(p, "subscription_end");
    let tenant_name = fields::text(p, "tenant_name");

    let tenant = TenantNotificationDraft::for_event(
        event,
        "Subscription expiring soon",
        format!("Your {tier} plan expires on {ends}. Renew to keep uninterrupted access."),
        Category::Subscription,
        Severity::Warning,
    );

    let platform = PlatformNotificationDraft::for_event(
        event,
        "Tenant subscription expiring",
        format!("{tenant_name}'s {tier} subscription expires on {ends}."),
        Category::Subscription,
        Severity::Warning,
    );

    GeneratedNotifications::empty()
        .with_tenant(tenant)
        .with_platform(platform)
}

/// Plan changed: operators only.
pub fn subscription_tier_changed(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let old_tier = fields::text(p, "old_tier");
    let new_tier = fields::text(p, "new_tier");
    let tenant_name = fields::text(p, "tenant_name");

    let platform = PlatformNotificationDraft::for_event(
        event,
        "Subscription tier changed",
        format!("{tenant_name} moved from the {old_tier} plan to the {new_tier} plan."),
        Category::Subscription,
        Severity::Info,
    );

    GeneratedNotifications::empty().with_platform(platform)
}
