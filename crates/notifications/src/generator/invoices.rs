//! Invoice notifications.

use shopdesk_events::Event;
use shopdesk_events::types::invoices;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, Severity, TenantNotificationDraft};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(invoices::GENERATED, invoice_generated);
}

/// Invoice issued: tenant-only, informational.
pub fn invoice_generated(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let invoice_number = fields::text(p, "invoice_number");
    let customer_name = fields::text(p, "customer_name");
    let total = fields::money(fields::number(p, "total"));

    let draft = TenantNotificationDraft::for_event(
        event,
        "Invoice generated",
        format!("Invoice {invoice_number} for {customer_name} totalling {total} is ready."),
        Category::Billing,
        Severity::Info,
    )
    .with_customer(fields::uuid(p, "customer_id"))
    .with_job(fields::uuid(p, "job_id"));

    GeneratedNotifications::empty().with_tenant(draft)
}
