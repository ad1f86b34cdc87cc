//! `shopdesk-core`: shared building blocks for the shop platform.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! strongly-typed identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, NotificationId, TenantId, UserId};
