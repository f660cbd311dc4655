//! Promotions Catalog

mod errors;
pub mod models;
pub mod service;

pub use errors::CatalogError;
pub use models::{BulkAction, BulkReport, SkippedPromotion};
pub use service::{MockPromotionsService, PromotionsService, StorePromotionsService};
