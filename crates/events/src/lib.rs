//! Durable domain events and the records derived from them.
//!
//! Events are appended by business transactions (through the publisher in
//! `shopdesk-infra`) and drained by the event processor. This crate only holds
//! the data model; it performs no I/O.

pub mod dead_letter;
pub mod draft;
pub mod event;
pub mod types;

pub use dead_letter::DeadLetterEntry;
pub use draft::EventDraft;
pub use event::{DEFAULT_MAX_RETRIES, EntityRef, Event, Payload};
pub use types::validate_event_type;
