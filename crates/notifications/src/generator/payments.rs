//! Payment notifications.

use shopdesk_events::Event;
use shopdesk_events::types::payments;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, PlatformNotificationDraft, Severity, TenantNotificationDraft};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(payments::RECEIVED, payment_received);
}

/// Payment taken.
///
/// Fans out to both audiences: the shop sees the payment, operators get a
/// revenue-tracking record.
pub fn payment_received(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let amount = fields::money(fields::number(p, "amount"));
    let method = fields::text(p, "payment_method");

    let tenant = TenantNotificationDraft::for_event(
        event,
        "Payment received",
        format!("Payment of {amount} received via {method}."),
        Category::Billing,
        Severity::Info,
    )
    .with_customer(fields::uuid(p, "customer_id"))
    .with_job(fields::uuid(p, "job_id"));

    let platform = PlatformNotificationDraft::for_event(
        event,
        "Revenue: payment processed",
        format!("Tenant {} processed a payment of {amount} via {method}.", event.tenant_id),
        Category::Billing,
        Severity::Info,
    );

    GeneratedNotifications::empty()
        .with_tenant(tenant)
        .with_platform(platform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::event;
    use serde_json::json;

    #[test]
    fn card_payment_reaches_both_audiences() {
        let e = event(
            payments::RECEIVED,
            "payment",
            json!({"amount": 500, "payment_method": "card"}),
        );
        let out = payment_received(&e);

        assert_eq!(out.tenant.len(), 1);
        assert_eq!(out.platform.len(), 1);
        assert_eq!(out.tenant[0].message, "Payment of 500.00 received via card.");
        assert_eq!(out.platform[0].tenant_id, Some(e.tenant_id));
        assert_eq!(out.platform[0].recipient_id, None);
        assert_eq!(out.platform[0].category, Category::Billing);
        assert_eq!(out.platform[0].severity, Severity::Info);
    }

    #[test]
    fn missing_amount_defaults_to_zero() {
        let out = payment_received(&event(payments::RECEIVED, "payment", json!({})));
        assert_eq!(out.tenant[0].message, "Payment of 0.00 received via .");
    }
}
