//! Audit

pub mod records;
pub mod service;

pub use records::{Actor, ActorKind, AuditEntry};
pub use service::{AuditError, AuditLog, MockAuditLog, StoreAuditLog};
