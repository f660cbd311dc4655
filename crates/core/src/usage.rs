//! Per-customer usage aggregates.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// How often one customer has redeemed one promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionUsage {
    /// Customer.
    pub user_id: String,

    /// Redemptions recorded.
    pub times: u64,

    /// First redemption.
    pub first_used_at: Option<Timestamp>,

    /// Latest redemption.
    pub last_used_at: Option<Timestamp>,

    /// Orders the promotion was applied to.
    pub order_refs: BTreeSet<String>,

    /// Manually suppressed.
    pub blocked: bool,

    /// Staff notes.
    pub notes: String,
}

impl PromotionUsage {
    /// An empty row for `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            times: 0,
            first_used_at: None,
            last_used_at: None,
            order_refs: BTreeSet::new(),
            blocked: false,
            notes: String::new(),
        }
    }

    /// Record a redemption for `order_ref` at `at`.
    ///
    /// Returns `false`, leaving the row untouched, when the order was already
    /// recorded.
    pub fn record(&mut self, order_ref: &str, at: Timestamp) -> bool {
        if !self.order_refs.insert(order_ref.to_string()) {
            return false;
        }

        self.times = self.times.saturating_add(1);
        self.first_used_at.get_or_insert(at);
        self.last_used_at = Some(self.last_used_at.map_or(at, |last| last.max(at)));

        true
    }

    /// Reverse a redemption for `order_ref`.
    ///
    /// Returns `false`, leaving the row untouched, when the order was never
    /// recorded.
    pub fn forget(&mut self, order_ref: &str) -> bool {
        if !self.order_refs.remove(order_ref) {
            return false;
        }

        self.times = self.times.saturating_sub(1);

        true
    }

    /// Whether `order_ref` has been recorded.
    pub fn has_order(&self, order_ref: &str) -> bool {
        self.order_refs.contains(order_ref)
    }
}

/// The usage facts rule evaluation reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// This customer's redemptions of the promotion being evaluated.
    pub user_times: u64,

    /// Whether this customer is blocked from the promotion.
    pub user_blocked: bool,

    /// This customer's redemptions across every promotion.
    pub prior_redemptions: u64,
}

impl UsageSnapshot {
    /// Build a snapshot from an optional usage row.
    pub fn from_usage(usage: Option<&PromotionUsage>, prior_redemptions: u64) -> Self {
        Self {
            user_times: usage.map_or(0, |usage| usage.times),
            user_blocked: usage.is_some_and(|usage| usage.blocked),
            prior_redemptions,
        }
    }
}
