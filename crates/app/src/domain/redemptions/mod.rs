//! Redemptions

mod errors;
pub mod records;
pub mod service;

pub use errors::{NotEligibleReason, RedemptionError};
pub use records::{Redemption, RedemptionIntent, RedemptionReceipt};
pub use service::{MockRedemptionService, RedemptionService, StoreRedemptionService};
