//! Document store errors.

use hanko_promotions::errors::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document already exists")]
    AlreadyExists,

    #[error("code {0} is already in use")]
    DuplicateCode(String),

    #[error("precondition failed on {0}")]
    PreconditionFailed(&'static str),

    #[error("idempotency key already recorded")]
    IdempotencyKeyExists,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists
            | Self::DuplicateCode(_)
            | Self::PreconditionFailed(_)
            | Self::IdempotencyKeyExists => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}
