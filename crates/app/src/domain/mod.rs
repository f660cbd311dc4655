//! Promotion Engine Domain Concerns

pub mod audit;
pub(crate) mod evaluation;
pub mod promotions;
pub mod redemptions;
pub mod usage;
pub mod validation;
