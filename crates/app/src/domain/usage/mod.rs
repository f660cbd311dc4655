//! Usage Ledger

mod errors;
pub mod service;

pub use errors::{UsageError, UsageQuota};
pub use service::{MockUsageLedger, StoreUsageLedger, UsageLedger, UsageListRequest};
