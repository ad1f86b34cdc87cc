//! Durable event log boundary.
//!
//! The [`EventStore`] contract is the only channel between the business
//! transactions that emit events and the processor that drains them.

pub mod in_memory;
pub mod postgres;
pub mod publisher;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::{PostgresEventStore, ensure_schema};
pub use publisher::EventPublisher;
pub use r#trait::{EventStore, EventStoreError};
