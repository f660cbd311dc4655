//! Promotions

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{cart::Channel, ids::TypedUuid, money::CurrencyCode};

pub mod benefit;
pub mod code;
pub mod conditions;
pub mod draft;
pub mod patch;
pub mod status;

pub use benefit::{Benefit, DiscountBase, PromotionKind};
pub use code::{CodeError, PromotionCode};
pub use conditions::{Conditions, SizeRange};
pub use draft::{InvalidPromotion, PromotionDraft};
pub use patch::{PatchError, PromotionPatch};
pub use status::PromotionStatus;

/// Promotion identifier.
pub type PromotionId = TypedUuid<Promotion>;

/// Optimistic locking token, bumped on every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version assigned on creation.
    pub const INITIAL: Self = Self(1);

    /// Wrap a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The version after one more write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "v{}", self.0)
    }
}

/// Validity window: `[starts_at, ends_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Inclusive start.
    pub starts_at: Timestamp,

    /// Exclusive end.
    pub ends_at: Timestamp,
}

impl Schedule {
    /// Whether `now` falls in the window.
    pub fn contains(&self, now: Timestamp) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

/// How a promotion combines with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stacking {
    /// Whether the promotion may be combined with others.
    pub combinable: bool,

    /// Whether the promotion applies to carts containing sale items.
    #[serde(default)]
    pub with_sale_price: bool,

    /// Largest combination this promotion may be part of.
    #[serde(default)]
    pub max_stack: Option<u32>,
}

impl Default for Stacking {
    fn default() -> Self {
        Self {
            combinable: true,
            with_sale_price: false,
            max_stack: None,
        }
    }
}

/// A promotion definition and its counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    /// Identifier.
    pub id: PromotionId,

    /// Redemption code.
    pub code: PromotionCode,

    /// Internal name.
    pub name: String,

    /// Internal description.
    pub description: String,

    /// Customer facing description.
    pub public_description: String,

    /// Stored lifecycle state; see [`Promotion::effective_status`].
    pub status: PromotionStatus,

    /// Discount formula and value.
    pub benefit: Benefit,

    /// Currency of amount-carrying benefits and of the budget.
    pub currency: Option<CurrencyCode>,

    /// Channels the promotion is offered in.
    pub channels: BTreeSet<Channel>,

    /// Targeted customer segment.
    pub segment_key: Option<String>,

    /// Eligibility tokens the cart must carry.
    pub eligibility_rules: BTreeSet<String>,

    /// Structured predicates.
    pub conditions: Conditions,

    /// Stacking behaviour.
    pub stacking: Stacking,

    /// Validity window.
    pub schedule: Schedule,

    /// Total redemptions allowed; `0` is unlimited.
    pub usage_limit_total: u64,

    /// Redemptions allowed per customer; `0` is unlimited.
    pub usage_limit_per_customer: u64,

    /// Redemptions so far.
    pub usage_count: u64,

    /// Spend cap in minor units.
    pub budget_minor: Option<i64>,

    /// Discount awarded so far in minor units.
    pub budget_spent_minor: i64,

    /// Optimistic locking token.
    pub version: Version,

    /// Creation time.
    pub created_at: Timestamp,

    /// Last write time.
    pub updated_at: Timestamp,

    /// Soft deletion time.
    pub deleted_at: Option<Timestamp>,
}

impl Promotion {
    /// The formula family.
    pub const fn kind(&self) -> PromotionKind {
        self.benefit.kind()
    }

    /// Whether the promotion has been soft deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Status with the schedule applied at `now`.
    pub fn effective_status(&self, now: Timestamp) -> PromotionStatus {
        self.status.settle(&self.schedule, now)
    }

    /// A copy whose status has been settled against `now`.
    #[must_use]
    pub fn settled(mut self, now: Timestamp) -> Self {
        self.status = self.effective_status(now);
        self
    }

    /// Whether the promotion can be offered to a cart at `now`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        matches!(
            self.effective_status(now),
            PromotionStatus::Active | PromotionStatus::Scheduled
        ) && self.schedule.contains(now)
    }

    /// Remaining total redemptions, `None` when unlimited.
    pub fn remaining_total(&self) -> Option<u64> {
        (self.usage_limit_total > 0)
            .then(|| self.usage_limit_total.saturating_sub(self.usage_count))
    }

    /// Remaining budget, `None` when uncapped.
    pub fn remaining_budget(&self) -> Option<i64> {
        self.budget_minor
            .filter(|budget| *budget > 0)
            .map(|budget| budget.saturating_sub(self.budget_spent_minor).max(0))
    }

    /// Every problem with the definition, in a stable order.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        self.benefit.problems(&mut problems);

        if self.kind().carries_amount() && self.currency.is_none() {
            problems.push(format!("currency is required for {} promotions", self.kind()));
        }

        if self.budget_minor.is_some() && self.currency.is_none() {
            problems.push("currency is required when a budget is set".to_string());
        }

        if self.name.trim().is_empty() {
            problems.push("name is required".to_string());
        }

        if self.channels.is_empty() {
            problems.push("at least one channel is required".to_string());
        }

        if self.schedule.starts_at >= self.schedule.ends_at {
            problems.push("startsAt must be before endsAt".to_string());
        }

        if self.usage_limit_total > 0
            && self.usage_limit_per_customer > self.usage_limit_total
        {
            problems.push("per-customer limit must not exceed the total limit".to_string());
        }

        if self.budget_minor.is_some_and(|budget| budget < 0) {
            problems.push("budget must not be negative".to_string());
        }

        if self.stacking.max_stack == Some(0) {
            problems.push("maxStack must be at least 1".to_string());
        }

        self.conditions.problems(&mut problems);

        problems
    }
}
