//! Rule evaluation
//!
//! Decides whether one promotion applies to one cart. Every rule in [`RULES`]
//! runs, in order, even after a blocking failure, so the report always shows
//! the full picture.

use jiff::Timestamp;

use crate::{cart::CartContext, promotions::Promotion, usage::UsageSnapshot};

mod checks;
pub mod messages;
pub mod report;

pub use checks::*;
pub use messages::RuleMessage;
pub use report::{RenderedRule, RuleKey, RuleOutcome, RuleReport, Severity};

/// Tunables for rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationSettings {
    /// Remaining budget, as a percentage of the budget, below which
    /// `budget_remaining` warns.
    pub budget_warn_percent: u8,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            budget_warn_percent: 10,
        }
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// Promotion under evaluation.
    pub promotion: &'a Promotion,

    /// Cart under evaluation.
    pub cart: &'a CartContext,

    /// Evaluation time.
    pub now: Timestamp,

    /// Usage counters for the cart's customer.
    pub usage: UsageSnapshot,

    /// Tunables.
    pub settings: EvaluationSettings,
}

/// A single eligibility rule.
pub trait Rule: Send + Sync {
    /// Which rule this is.
    fn key(&self) -> RuleKey;

    /// Evaluate against `input`. Never fails; problems are reported as outcomes.
    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome;
}

/// Every rule, in evaluation order.
pub static RULES: [&dyn Rule; 14] = [
    &StatusLive,
    &ChannelMatch,
    &CurrencyMatch,
    &SegmentMatch,
    &EligibilityFlags,
    &MinSubtotal,
    &CountryAllow,
    &CurrencyAllow,
    &ProductAllow,
    &NewCustomerOnly,
    &UsageTotalRemaining,
    &UsagePerUserRemaining,
    &BudgetRemaining,
    &SalePriceCompatible,
];

/// Run every rule against `input`.
pub fn evaluate(input: &RuleInput<'_>) -> RuleReport {
    RuleReport {
        outcomes: RULES.iter().map(|rule| rule.evaluate(input)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_are_in_fixed_order() {
        let keys: Vec<&str> = RULES.iter().map(|rule| rule.key().as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "status_live",
                "channel_match",
                "currency_match",
                "segment_match",
                "eligibility_flags",
                "min_subtotal",
                "country_allow",
                "currency_allow",
                "product_allow",
                "new_customer_only",
                "usage_total_remaining",
                "usage_per_user_remaining",
                "budget_remaining",
                "sale_price_compatible",
            ]
        );
    }
}
