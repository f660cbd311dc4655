//! Validation

mod errors;
pub mod models;
pub mod service;

pub use errors::ValidationError;
pub use models::ValidationOutcome;
pub use service::{MockValidationService, StoreValidationService, ValidationService};
