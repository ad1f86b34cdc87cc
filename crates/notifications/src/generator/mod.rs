//! Event → notification drafts.
//!
//! ## Design
//!
//! - **Pure**: no I/O, no clock, no hidden state. The same event always yields
//!   the same drafts, so handlers are testable without a store or sink.
//! - **Registry dispatch**: an explicit table maps event type tags to handlers.
//!   Handlers are grouped by bounded context (one module each).
//! - **Unknown types are not errors**: an unregistered tag yields an empty set
//!   for both audiences, and the caller still acknowledges the event.
//! - **Defensive projection**: payload fields are read through [`fields`];
//!   missing or malformed values fall back to neutral defaults.

use std::collections::HashMap;

use serde::Serialize;

use shopdesk_events::Event;

use crate::model::{PlatformNotificationDraft, TenantNotificationDraft};

pub mod fields;
pub mod inventory;
pub mod invoices;
pub mod jobs;
pub mod payments;
pub mod subscriptions;
pub mod tenants;

/// Handler building the drafts for one event type.
pub type NotificationHandler = fn(&Event) -> GeneratedNotifications;

/// Drafts produced for one event, per audience.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedNotifications {
    pub platform: Vec<PlatformNotificationDraft>,
    pub tenant: Vec<TenantNotificationDraft>,
}

impl GeneratedNotifications {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a platform draft, assigning its ordinal.
    pub fn push_platform(&mut self, mut draft: PlatformNotificationDraft) {
        draft.ordinal = self.platform.len() as u32;
        self.platform.push(draft);
    }

    /// Append a tenant draft, assigning its ordinal.
    pub fn push_tenant(&mut self, mut draft: TenantNotificationDraft) {
        draft.ordinal = self.tenant.len() as u32;
        self.tenant.push(draft);
    }

    pub fn with_platform(mut self, draft: PlatformNotificationDraft) -> Self {
        self.push_platform(draft);
        self
    }

    pub fn with_tenant(mut self, draft: TenantNotificationDraft) -> Self {
        self.push_tenant(draft);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_empty() && self.tenant.is_empty()
    }

    pub fn len(&self) -> usize {
        self.platform.len() + self.tenant.len()
    }
}

/// Registry of notification handlers keyed by event type.
#[derive(Debug, Clone)]
pub struct NotificationGenerator {
    handlers: HashMap<&'static str, NotificationHandler>,
}

impl NotificationGenerator {
    /// Generator with every built-in handler registered.
    pub fn new() -> Self {
        let mut generator = Self::empty();
        jobs::register(&mut generator);
        invoices::register(&mut generator);
        payments::register(&mut generator);
        subscriptions::register(&mut generator);
        tenants::register(&mut generator);
        inventory::register(&mut generator);
        generator
    }

    /// Generator with no handlers; every event yields nothing.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register (or replace) the handler for an event type.
    pub fn register(&mut self, event_type: &'static str, handler: NotificationHandler) {
        self.handlers.insert(event_type, handler);
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Registered event types, sorted.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Build the drafts for `event`.
    pub fn generate(&self, event: &Event) -> GeneratedNotifications {
        match self.handlers.get(event.event_type.as_str()) {
            Some(handler) => handler(event),
            None => GeneratedNotifications::empty(),
        }
    }
}

impl Default for NotificationGenerator {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::event;
    use super::*;
    use crate::model::{Category, Severity};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn payment_received_fans_out_to_both_audiences() {
        let generator = NotificationGenerator::new();
        let out = generator.generate(&event(
            "payment.received",
            "payment",
            json!({"amount": 500, "payment_method": "card"}),
        ));

        assert_eq!(out.tenant.len(), 1);
        assert_eq!(out.platform.len(), 1);
        assert_eq!(out.tenant[0].category, Category::Billing);
        assert_eq!(out.tenant[0].severity, Severity::Info);
        assert_eq!(out.platform[0].category, Category::Billing);
        assert_eq!(out.platform[0].severity, Severity::Info);
    }

    #[test]
    fn subscription_expiring_warns_both_audiences() {
        let generator = NotificationGenerator::new();
        let out = generator.generate(&event(
            "subscription.expiring",
            "subscription",
            json!({"subscription_tier": "pro", "subscription_end": "2025-01-01", "tenant_name": "Acme"}),
        ));

        assert_eq!(out.tenant.len(), 1);
        assert_eq!(out.platform.len(), 1);
        assert_eq!(out.tenant[0].severity, Severity::Warning);
        assert_eq!(out.platform[0].severity, Severity::Warning);
        assert_ne!(out.tenant[0].message, out.platform[0].message);
    }

    #[test]
    fn tenant_suspension_is_critical_and_platform_only() {
        let generator = NotificationGenerator::new();
        let suspended = generator.generate(&event(
            "tenant.status_changed",
            "tenant",
            json!({"old_status": "active", "new_status": "suspended"}),
        ));
        assert!(suspended.tenant.is_empty());
        assert_eq!(suspended.platform.len(), 1);
        assert_eq!(suspended.platform[0].severity, Severity::Critical);

        let trial = generator.generate(&event(
            "tenant.status_changed",
            "tenant",
            json!({"old_status": "active", "new_status": "trial"}),
        ));
        assert_eq!(trial.platform.len(), 1);
        assert_eq!(trial.platform[0].severity, Severity::Info);
    }

    #[test]
    fn unknown_type_yields_nothing() {
        let generator = NotificationGenerator::new();
        let out = generator.generate(&event("unknown.type", "thing", json!({"x": 1})));
        assert!(out.is_empty());
        assert!(!generator.handles("unknown.type"));
    }

    #[test]
    fn empty_generator_handles_nothing() {
        let generator = NotificationGenerator::empty();
        assert!(generator.registered_types().is_empty());
        let out = generator.generate(&event("payment.received", "payment", json!({"amount": 1})));
        assert!(out.is_empty());
    }

    #[test]
    fn registry_lists_every_bounded_context() {
        let generator = NotificationGenerator::new();
        assert_eq!(
            generator.registered_types(),
            vec![
                "inventory.low_stock",
                "invoice.generated",
                "job.created",
                "job.status_changed",
                "payment.received",
                "subscription.expiring",
                "subscription.tier_changed",
                "tenant.created",
                "tenant.status_changed",
            ]
        );
    }

    #[test]
    fn registered_handler_can_be_replaced() {
        fn silent(_: &Event) -> GeneratedNotifications {
            GeneratedNotifications::empty()
        }

        let mut generator = NotificationGenerator::new();
        generator.register("payment.received", silent);
        let out = generator.generate(&event("payment.received", "payment", json!({"amount": 5})));
        assert!(out.is_empty());
    }

    #[test]
    fn ordinals_follow_push_order() {
        let e = event("job.created", "job", json!({}));
        let draft = crate::model::TenantNotificationDraft::for_event(
            &e,
            "a",
            "b",
            Category::Job,
            Severity::Info,
        );
        let out = GeneratedNotifications::empty()
            .with_tenant(draft.clone())
            .with_tenant(draft);
        assert_eq!(out.tenant[0].ordinal, 0);
        assert_eq!(out.tenant[1].ordinal, 1);
        assert_eq!(out.len(), 2);
    }

    fn known_type() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "inventory.low_stock",
            "invoice.generated",
            "job.created",
            "job.status_changed",
            "payment.received",
            "subscription.expiring",
            "subscription.tier_changed",
            "tenant.created",
            "tenant.status_changed",
            "unknown.type",
        ])
    }

    fn payload_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(serde_json::Value::Null),
            any::<i64>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(|b| json!(b)),
            "[a-z_ ]{0,12}".prop_map(|s| json!(s)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: generating twice from the same event yields identical drafts.
        #[test]
        fn generation_is_pure(
            event_type in known_type(),
            fields in prop::collection::btree_map(
                prop::sample::select(vec![
                    "amount", "payment_method", "new_status", "old_status", "tenant_name",
                    "subscription_tier", "subscription_end", "job_number", "part_name",
                    "current_quantity", "reorder_level", "customer_id", "total",
                ]),
                payload_value(),
                0..8,
            )
        ) {
            let payload: serde_json::Map<String, serde_json::Value> =
                fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            let e = event(event_type, "subject", serde_json::Value::Object(payload));
            let generator = NotificationGenerator::new();

            let first = generator.generate(&e);
            let second = generator.generate(&e);
            prop_assert_eq!(&first, &second);

            for draft in &first.platform {
                prop_assert_eq!(draft.source_event_id, e.id);
            }
            for draft in &first.tenant {
                prop_assert_eq!(draft.source_event_id, e.id);
                prop_assert_eq!(draft.tenant_id, e.tenant_id);
            }
        }
    }
}
