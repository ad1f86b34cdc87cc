//! Job (work order) notifications.

use shopdesk_events::Event;
use shopdesk_events::types::jobs;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, Severity, TenantNotificationDraft};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(jobs::CREATED, job_created);
    generator.register(jobs::STATUS_CHANGED, job_status_changed);
}

/// New job opened: tenant-only, informational.
pub fn job_created(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let job_number = fields::text(p, "job_number");
    let customer_name = fields::text(p, "customer_name");

    let draft = TenantNotificationDraft::for_event(
        event,
        "New job created",
        format!("Job {job_number} was opened for {customer_name}."),
        Category::Job,
        Severity::Info,
    )
    .with_job(Some(event.entity.entity_id))
    .with_customer(fields::uuid(p, "customer_id"))
    .with_user(fields::user(p, "assigned_to"));

    GeneratedNotifications::empty().with_tenant(draft)
}

/// Job moved between statuses: tenant-only. Cancellations warn.
pub fn job_status_changed(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let job_number = fields::text(p, "job_number");
    let old_status = fields::text(p, "old_status");
    let new_status = fields::text(p, "new_status");

    let severity = if new_status == "cancelled" {
        Severity::Warning
    } else {
        Severity::Info
    };

    let draft = TenantNotificationDraft::for_event(
        event,
        "Job status updated",
        format!("Job {job_number} moved from {old_status} to {new_status}."),
        Category::Job,
        severity,
    )
    .with_job(Some(event.entity.entity_id))
    .with_customer(fields::uuid(p, "customer_id"))
    .with_user(fields::user(p, "assigned_to"));

    GeneratedNotifications::empty().with_tenant(draft)
}
