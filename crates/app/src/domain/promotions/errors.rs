//! Catalog errors.

use hanko_promotions::{
    errors::ErrorKind,
    promotions::{CodeError, InvalidPromotion, PatchError, Version},
};
use thiserror::Error;

use crate::{guard::CallError, pagination::PageTokenError, store::StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("promotion not found")]
    NotFound,

    #[error("promotion already exists")]
    AlreadyExists,

    #[error("code {0} is already in use")]
    DuplicateCode(String),

    #[error("invalid promotion code")]
    InvalidCode(#[from] CodeError),

    #[error(transparent)]
    Invalid(#[from] InvalidPromotion),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("promotion is at {actual}, expected {expected}")]
    Stale { expected: Version, actual: Version },

    #[error("promotion was modified concurrently")]
    Conflict,

    #[error("invalid page token")]
    PageToken(#[from] PageTokenError),

    #[error("promotion store unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidCode(_) | Self::Invalid(_) | Self::Patch(_) | Self::PageToken(_) => {
                ErrorKind::InvalidInput
            }
            Self::AlreadyExists | Self::DuplicateCode(_) | Self::Stale { .. } | Self::Conflict => {
                ErrorKind::Conflict
            }
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AlreadyExists => Self::AlreadyExists,
            StoreError::DuplicateCode(code) => Self::DuplicateCode(code),
            StoreError::PreconditionFailed(_) | StoreError::IdempotencyKeyExists => Self::Conflict,
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
        }
    }
}

impl From<CallError> for CatalogError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Store(error) => error.into(),
            CallError::TimedOut(limit) => Self::Unavailable(format!("timed out after {limit:?}")),
            CallError::Cancelled => Self::Unavailable("cancelled".to_string()),
        }
    }
}
