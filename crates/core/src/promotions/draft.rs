//! Promotion drafts: the input to catalog creation.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{cart::Channel, money::CurrencyCode};

use super::{
    Benefit, Conditions, Promotion, PromotionCode, PromotionId, PromotionStatus, Schedule,
    Stacking, Version,
};

/// Every problem found with a promotion definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid promotion: {}", problems.join("; "))]
pub struct InvalidPromotion {
    /// Human readable problems, in a stable order.
    pub problems: Vec<String>,
}

/// A promotion as submitted for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionDraft {
    /// Identifier; generated when absent.
    #[serde(default)]
    pub id: Option<PromotionId>,

    /// Raw code; normalised on creation.
    pub code: String,

    /// Internal name.
    pub name: String,

    /// Internal description.
    #[serde(default)]
    pub description: String,

    /// Customer facing description.
    #[serde(default)]
    pub public_description: String,

    /// Initial status.
    #[serde(default = "default_status")]
    pub status: PromotionStatus,

    /// Discount formula and value.
    pub benefit: Benefit,

    /// Currency of amount-carrying benefits.
    #[serde(default)]
    pub currency: Option<CurrencyCode>,

    /// Channels the promotion is offered in.
    pub channels: BTreeSet<Channel>,

    /// Targeted customer segment.
    #[serde(default)]
    pub segment_key: Option<String>,

    /// Eligibility tokens.
    #[serde(default)]
    pub eligibility_rules: BTreeSet<String>,

    /// Structured predicates.
    #[serde(default)]
    pub conditions: Conditions,

    /// Stacking behaviour.
    #[serde(default)]
    pub stacking: Stacking,

    /// Validity window.
    pub schedule: Schedule,

    /// Total redemptions allowed; `0` is unlimited.
    #[serde(default)]
    pub usage_limit_total: u64,

    /// Redemptions allowed per customer; `0` is unlimited.
    #[serde(default)]
    pub usage_limit_per_customer: u64,

    /// Spend cap in minor units.
    #[serde(default)]
    pub budget_minor: Option<i64>,
}

const fn default_status() -> PromotionStatus {
    PromotionStatus::Draft
}

impl PromotionDraft {
    /// Validate the draft and build the promotion it describes.
    ///
    /// Counters start at zero and the version at [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPromotion`] listing every problem found.
    pub fn into_promotion(self, now: Timestamp) -> Result<Promotion, InvalidPromotion> {
        let mut problems = Vec::new();

        if self.status == PromotionStatus::Expired {
            problems.push("promotions cannot be created expired".to_string());
        }

        let code = PromotionCode::parse(&self.code).unwrap_or_else(|error| {
            problems.push(error.to_string());
            PromotionCode::unchecked(self.code.clone())
        });

        let promotion = Promotion {
            id: self.id.unwrap_or_default(),
            code,
            name: self.name.trim().to_string(),
            description: self.description,
            public_description: self.public_description,
            status: self.status,
            benefit: self.benefit,
            currency: self.currency,
            channels: self.channels,
            segment_key: self.segment_key.filter(|segment| !segment.trim().is_empty()),
            eligibility_rules: self.eligibility_rules,
            conditions: self.conditions,
            stacking: self.stacking,
            schedule: self.schedule,
            usage_limit_total: self.usage_limit_total,
            usage_limit_per_customer: self.usage_limit_per_customer,
            usage_count: 0,
            budget_minor: self.budget_minor,
            budget_spent_minor: 0,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        problems.extend(promotion.problems());

        if problems.is_empty() {
            Ok(promotion)
        } else {
            Err(InvalidPromotion { problems })
        }
    }

    /// A draft reproducing `promotion`'s definition, without counters.
    pub fn from_promotion(promotion: &Promotion) -> Self {
        Self {
            id: None,
            code: promotion.code.to_string(),
            name: promotion.name.clone(),
            description: promotion.description.clone(),
            public_description: promotion.public_description.clone(),
            status: PromotionStatus::Draft,
            benefit: promotion.benefit,
            currency: promotion.currency,
            channels: promotion.channels.clone(),
            segment_key: promotion.segment_key.clone(),
            eligibility_rules: promotion.eligibility_rules.clone(),
            conditions: promotion.conditions.clone(),
            stacking: promotion.stacking,
            schedule: promotion.schedule,
            usage_limit_total: promotion.usage_limit_total,
            usage_limit_per_customer: promotion.usage_limit_per_customer,
            budget_minor: promotion.budget_minor,
        }
    }
}
