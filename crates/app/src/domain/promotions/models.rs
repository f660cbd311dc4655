//! Catalog Models

use std::fmt::{Display, Formatter, Result as FmtResult};

use hanko_promotions::promotions::PromotionId;
use serde::{Deserialize, Serialize};

/// Action applied to several promotions at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Activate,
    Pause,

    /// Copy each promotion into a new draft.
    Clone,

    /// Soft delete.
    Delete,
}

impl BulkAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Pause => "pause",
            Self::Clone => "clone",
            Self::Delete => "delete",
        }
    }
}

impl Display for BulkAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A promotion a bulk action left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPromotion {
    pub id: PromotionId,
    pub reason: String,
}

/// Outcome of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub action: BulkAction,

    /// Promotions the action was applied to.
    pub affected: Vec<PromotionId>,

    pub skipped: Vec<SkippedPromotion>,

    /// Drafts created by [`BulkAction::Clone`], in the order of `affected`.
    pub created: Vec<PromotionId>,
}

impl BulkReport {
    pub(crate) const fn new(action: BulkAction) -> Self {
        Self {
            action,
            affected: Vec::new(),
            skipped: Vec::new(),
            created: Vec::new(),
        }
    }

    pub(crate) fn skip(&mut self, id: PromotionId, reason: impl Into<String>) {
        self.skipped.push(SkippedPromotion {
            id,
            reason: reason.into(),
        });
    }
}
