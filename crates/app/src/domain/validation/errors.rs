//! Validation errors.

use hanko_promotions::{
    cart::CartError, discounts::DiscountError, errors::ErrorKind, promotions::CodeError,
};
use thiserror::Error;

use crate::guard::CallError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid cart")]
    Cart(#[from] CartError),

    #[error("invalid promotion code")]
    InvalidCode(#[from] CodeError),

    #[error("at least one promotion code is required")]
    NoCodes,

    #[error("promotion {0} not found")]
    NotFound(String),

    #[error("discount calculation failed")]
    Discount(#[from] DiscountError),

    #[error("promotion store unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,
}

impl ValidationError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Cart(_) | Self::InvalidCode(_) | Self::NoCodes | Self::Discount(_) => {
                ErrorKind::InvalidInput
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<CallError> for ValidationError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Cancelled => Self::Cancelled,
            CallError::TimedOut(limit) => Self::Unavailable(format!("timed out after {limit:?}")),
            CallError::Store(error) => Self::Unavailable(error.to_string()),
        }
    }
}
