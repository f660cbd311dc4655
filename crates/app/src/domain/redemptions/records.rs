//! Redemption Records

use hanko_promotions::{
    cart::CartContext,
    discounts::LineDiscount,
    money::CurrencyCode,
    promotions::{PromotionCode, PromotionId, Version},
    rules::RuleKey,
};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A request to apply a promotion to a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionIntent {
    pub promotion_code: String,

    /// Caller chosen key; repeated intents with the same key return the first receipt.
    pub idempotency_key: String,

    /// Acting party, recorded in the audit trail.
    pub actor_ref: String,

    pub order_ref: String,
    pub cart: CartContext,
}

/// Durable proof of an applied redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub promotion_id: PromotionId,
    pub promotion_code: PromotionCode,
    pub idempotency_key: String,
    pub order_ref: String,
    pub user_id: String,
    pub currency: CurrencyCode,
    pub discount_minor: i64,
    pub shipping_discount_minor: i64,
    pub line_discounts: Vec<LineDiscount>,
    pub applied_at: Timestamp,
    pub rules_passed: Vec<RuleKey>,

    /// Promotion version written by this redemption.
    pub version: Version,
}

impl RedemptionReceipt {
    /// Item and shipping discount together.
    pub fn total_minor(&self) -> i64 {
        self.discount_minor
            .saturating_add(self.shipping_discount_minor)
    }
}

/// Result of a successful redeem call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "receipt", rename_all = "snake_case")]
pub enum Redemption {
    /// Counters were updated by this call.
    Applied(RedemptionReceipt),

    /// The idempotency key was seen before; nothing changed.
    AlreadyApplied(RedemptionReceipt),
}

impl Redemption {
    pub const fn receipt(&self) -> &RedemptionReceipt {
        match self {
            Self::Applied(receipt) | Self::AlreadyApplied(receipt) => receipt,
        }
    }

    pub fn into_receipt(self) -> RedemptionReceipt {
        match self {
            Self::Applied(receipt) | Self::AlreadyApplied(receipt) => receipt,
        }
    }

    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}
