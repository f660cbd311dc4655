//! Usage ledger errors.

use std::fmt::{Display, Formatter, Result as FmtResult};

use hanko_promotions::errors::ErrorKind;
use thiserror::Error;

use crate::{guard::CallError, pagination::PageTokenError, store::StoreError};

/// The cap that refused a usage increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageQuota {
    Total,
    PerCustomer,
    Blocked,
}

impl Display for UsageQuota {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Total => "total usage limit",
            Self::PerCustomer => "per-customer usage limit",
            Self::Blocked => "customer block",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("promotion not found")]
    PromotionNotFound,

    #[error("usage row not found")]
    NotFound,

    #[error("{0} reached")]
    QuotaExhausted(UsageQuota),

    #[error("invalid page token")]
    PageToken(#[from] PageTokenError),

    #[error("usage write still conflicted after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("usage store unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,
}

impl UsageError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::PageToken(_) => ErrorKind::InvalidInput,
            Self::PromotionNotFound | Self::NotFound => ErrorKind::NotFound,
            Self::QuotaExhausted(_) => ErrorKind::QuotaExhausted,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<CallError> for UsageError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Cancelled => Self::Cancelled,
            CallError::TimedOut(limit) => Self::Unavailable(format!("timed out after {limit:?}")),
            CallError::Store(StoreError::PreconditionFailed(_)) => Self::Conflict { attempts: 1 },
            CallError::Store(error) => Self::Unavailable(error.to_string()),
        }
    }
}
