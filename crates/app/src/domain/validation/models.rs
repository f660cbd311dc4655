//! Validation Models

use hanko_promotions::{
    promotions::{PromotionCode, PromotionId},
    rules::RenderedRule,
};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Dry-run verdict for one promotion against one cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub promotion_id: PromotionId,
    pub promotion_code: PromotionCode,
    pub promotion_name: String,
    pub eligible: bool,

    /// Localised one-line summary.
    pub summary: String,

    /// Messages of the blocking failures, in rule order.
    pub blockers: Vec<String>,

    pub rules: Vec<RenderedRule>,
    pub executed_at: Timestamp,

    /// Projected item discount; zero when ineligible or not selected.
    pub discount_minor: i64,
    pub shipping_discount_minor: i64,
    pub affected_line_ids: Vec<String>,

    /// Serialised trace for admin display and audit.
    pub raw: serde_json::Value,
}

impl ValidationOutcome {
    pub fn total_minor(&self) -> i64 {
        self.discount_minor
            .saturating_add(self.shipping_discount_minor)
    }
}
