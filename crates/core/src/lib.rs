//! Hanko Promotions
//!
//! The pure half of the promotion engine: money arithmetic, the promotion
//! aggregate and its lifecycle, per-cart rule evaluation, discount math and the
//! stacking resolver. Nothing in this crate performs I/O; persistence,
//! transactions and audit trails live in `hanko-promotions-app`.

pub mod cart;
pub mod discounts;
pub mod errors;
pub mod ids;
pub mod locale;
pub mod money;
pub mod promotions;
pub mod rules;
pub mod stacking;
pub mod usage;
