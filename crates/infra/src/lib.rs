//! Infrastructure layer: event store, notification sinks, the background
//! event processor and configuration.

pub mod config;
pub mod event_store;
pub mod notifications;
pub mod processor;
