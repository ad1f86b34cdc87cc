//! Defensive projection of named fields out of an untyped payload.
//!
//! Handlers never fail on payload shape: a missing or mistyped field falls back
//! to a neutral default (empty text, zero, `None`).

use serde_json::Value as JsonValue;
use uuid::Uuid;

use shopdesk_core::UserId;
use shopdesk_events::Payload;

/// Field rendered as text. Numbers and booleans are stringified; anything
/// else (missing, null, arrays, objects) is empty.
pub fn text(payload: &Payload, key: &str) -> String {
    match payload.get(key) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Field as a number. Numeric strings are accepted; anything else is `0`.
pub fn number(payload: &Payload, key: &str) -> f64 {
    match payload.get(key) {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Field as a UUID; `None` when missing or malformed.
pub fn uuid(payload: &Payload, key: &str) -> Option<Uuid> {
    match payload.get(key) {
        Some(JsonValue::String(s)) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn user(payload: &Payload, key: &str) -> Option<UserId> {
    uuid(payload, key).map(UserId::from_uuid)
}

/// Monetary amount with two decimals.
pub fn money(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Quantity without a trailing `.0` for whole numbers.
pub fn quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: JsonValue) -> Payload {
        match value {
            JsonValue::Object(map) => map,
            _ => Payload::new(),
        }
    }

    #[test]
    fn missing_fields_default() {
        let p = payload(json!({}));
        assert_eq!(text(&p, "tenant_name"), "");
        assert_eq!(number(&p, "amount"), 0.0);
        assert_eq!(uuid(&p, "customer_id"), None);
    }

    #[test]
    fn mistyped_fields_default() {
        let p = payload(json!({"amount": "lots", "tenant_name": ["a"], "customer_id": 12}));
        assert_eq!(number(&p, "amount"), 0.0);
        assert_eq!(text(&p, "tenant_name"), "");
        assert_eq!(uuid(&p, "customer_id"), None);
    }

    #[test]
    fn numeric_strings_and_numbers_are_accepted() {
        let p = payload(json!({"amount": "42.5", "total": 10, "job_number": 1042}));
        assert_eq!(number(&p, "amount"), 42.5);
        assert_eq!(number(&p, "total"), 10.0);
        assert_eq!(text(&p, "job_number"), "1042");
    }

    #[test]
    fn formats_money_and_quantities() {
        assert_eq!(money(500.0), "500.00");
        assert_eq!(money(19.999), "20.00");
        assert_eq!(quantity(3.0), "3");
        assert_eq!(quantity(2.5), "2.5");
    }
}
