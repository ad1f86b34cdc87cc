//! Inventory notifications.

use shopdesk_events::Event;
use shopdesk_events::types::inventory;

use super::fields;
use super::{GeneratedNotifications, NotificationGenerator};
use crate::model::{Category, Severity, TenantNotificationDraft};

pub(crate) fn register(generator: &mut NotificationGenerator) {
    generator.register(inventory::LOW_STOCK, low_stock);
}

/// Part at or below its reorder level: tenant-only warning.
pub fn low_stock(event: &Event) -> GeneratedNotifications {
    let p = &event.payload;
    let part_name = fields::text(p, "part_name");
    let on_hand = fields::quantity(fields::number(p, "current_quantity"));
    let reorder_level = fields::quantity(fields::number(p, "reorder_level"));

    let draft = TenantNotificationDraft::for_event(
        event,
        "Low stock alert",
        format!("{part_name} is down to {on_hand} in stock (reorder level {reorder_level})."),
        Category::Inventory,
        Severity::Warning,
    );

    GeneratedNotifications::empty().with_tenant(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::event;
    use serde_json::json;

    #[test]
    fn low_stock_warns_the_shop() {
        let out = low_stock(&event(
            inventory::LOW_STOCK,
            "part",
            json!({"part_name": "Brake pads", "current_quantity": 2, "reorder_level": 5}),
        ));

        assert!(out.platform.is_empty());
        assert_eq!(out.tenant.len(), 1);
        assert_eq!(out.tenant[0].severity, Severity::Warning);
        assert_eq!(out.tenant[0].category, Category::Inventory);
        assert_eq!(
            out.tenant[0].message,
            "Brake pads is down to 2 in stock (reorder level 5)."
        );
    }
}
