//! Redemption Errors

use hanko_promotions::{
    cart::CartError, discounts::DiscountError, errors::ErrorKind, promotions::CodeError,
};
use thiserror::Error;

use crate::{guard::CallError, store::StoreError};

/// Why a promotion was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligibleReason {
    /// Unknown, deleted or not live.
    NotFound,

    /// A blocking rule failed.
    Rules,
}

impl NotEligibleReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Rules => "rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedemptionError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid promotion code")]
    InvalidCode(#[from] CodeError),

    #[error("invalid cart")]
    Cart(#[from] CartError),

    #[error("promotion not applied: {summary}")]
    NotEligible {
        reason: NotEligibleReason,
        summary: String,
        blockers: Vec<String>,
    },

    /// A usage cap was already reached before this attempt.
    #[error("promotion quota exhausted: {summary}")]
    QuotaExhausted {
        summary: String,
        blockers: Vec<String>,

        /// Redemptions left under the total limit, when one is set.
        remaining: Option<u64>,
    },

    /// A usage cap was reached by a concurrent redemption while this one retried.
    #[error("promotion quota taken by a concurrent redemption: {summary}")]
    LostRace {
        summary: String,
        blockers: Vec<String>,
        remaining: Option<u64>,
    },

    #[error("order {order_ref} already redeemed this promotion")]
    OrderAlreadyRedeemed { order_ref: String },

    #[error("redemption still conflicted after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("promotion store unavailable: {0}")]
    Unavailable(String),

    #[error("discount calculation failed")]
    Discount(#[from] DiscountError),

    #[error("cancelled")]
    Cancelled,
}

impl RedemptionError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidCode(_) | Self::Cart(_) | Self::Discount(_) => {
                ErrorKind::InvalidInput
            }
            Self::NotEligible { .. } => ErrorKind::NotEligible,
            Self::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            Self::LostRace { .. } => ErrorKind::LostRace,
            Self::OrderAlreadyRedeemed { .. } | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether a usage cap stopped the redemption, first pass or re-check.
    pub const fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. } | Self::LostRace { .. })
    }
}

impl From<CallError> for RedemptionError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Cancelled => Self::Cancelled,
            CallError::TimedOut(limit) => Self::Unavailable(format!("timed out after {limit:?}")),
            CallError::Store(StoreError::PreconditionFailed(_) | StoreError::IdempotencyKeyExists) => {
                Self::Conflict { attempts: 1 }
            }
            CallError::Store(error) => Self::Unavailable(error.to_string()),
        }
    }
}
