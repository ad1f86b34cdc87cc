//! Catalogue of event type tags, grouped by bounded context.
//!
//! Tags are namespaced as `<domain>.<action>`. Producers may emit tags that are
//! not listed here; consumers simply ignore what they do not recognise.

use shopdesk_core::{DomainError, DomainResult};

pub mod jobs {
    pub const CREATED: &str = "job.created";
    pub const STATUS_CHANGED: &str = "job.status_changed";
}

pub mod invoices {
    pub const GENERATED: &str = "invoice.generated";
}

pub mod payments {
    pub const RECEIVED: &str = "payment.received";
}

pub mod subscriptions {
    pub const EXPIRING: &str = "subscription.expiring";
    pub const TIER_CHANGED: &str = "subscription.tier_changed";
}

pub mod tenants {
    pub const CREATED: &str = "tenant.created";
    pub const STATUS_CHANGED: &str = "tenant.status_changed";
}

pub mod inventory {
    pub const LOW_STOCK: &str = "inventory.low_stock";
}

/// Validate an event type tag.
///
/// A tag is exactly two non-empty segments joined by one `.`; segments use
/// lowercase ASCII letters, digits and `_`.
pub fn validate_event_type(tag: &str) -> DomainResult<()> {
    let Some((domain, action)) = tag.split_once('.') else {
        return Err(DomainError::validation(format!(
            "event type '{tag}' must be namespaced as <domain>.<action>"
        )));
    };

    let segment_ok = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };

    if !segment_ok(domain) || !segment_ok(action) {
        return Err(DomainError::validation(format!(
            "event type '{tag}' has an empty or malformed segment"
        )));
    }

    Ok(())
}
