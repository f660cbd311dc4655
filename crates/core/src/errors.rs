//! Error taxonomy shared by every engine surface.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Semantic error classes callers branch on.
///
/// Concrete error enums in this workspace map onto one of these through a
/// `kind()` accessor so transports can pick status codes without matching on
/// every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input.
    InvalidInput,

    /// Unknown promotion id or code.
    NotFound,

    /// Optimistic version mismatch, or transaction retries exhausted.
    Conflict,

    /// Rule evaluation rejected the cart.
    NotEligible,

    /// A usage cap (total, per user or budget) has been reached.
    QuotaExhausted,

    /// A quota re-check failed after the initial eligibility pass.
    LostRace,

    /// Transient datastore failure; safe to retry.
    Unavailable,

    /// The idempotency key was already used; the stored receipt is returned.
    AlreadyApplied,

    /// The caller cancelled the operation before it committed.
    Cancelled,
}

impl ErrorKind {
    /// Stable snake case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::NotEligible => "not_eligible",
            Self::QuotaExhausted => "quota_exhausted",
            Self::LostRace => "lost_race",
            Self::Unavailable => "unavailable",
            Self::AlreadyApplied => "already_applied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a retry of the same request can reasonably succeed.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::Conflict | Self::LostRace)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
