//! Rule outcomes and reports.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::locale::Locale;

use super::messages::RuleMessage;

/// Identifies one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKey {
    /// Status and schedule window.
    StatusLive,
    /// Cart channel.
    ChannelMatch,
    /// Cart currency against the promotion's currency.
    CurrencyMatch,
    /// Customer segment.
    SegmentMatch,
    /// Eligibility tokens.
    EligibilityFlags,
    /// Minimum subtotal.
    MinSubtotal,
    /// Shipping country.
    CountryAllow,
    /// Cart currency against the allowed list.
    CurrencyAllow,
    /// Item filters.
    ProductAllow,
    /// First-time customers only.
    NewCustomerOnly,
    /// Total usage cap.
    UsageTotalRemaining,
    /// Per-customer usage cap.
    UsagePerUserRemaining,
    /// Spend cap.
    BudgetRemaining,
    /// Sale items.
    SalePriceCompatible,
}

impl RuleKey {
    /// Stable snake case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusLive => "status_live",
            Self::ChannelMatch => "channel_match",
            Self::CurrencyMatch => "currency_match",
            Self::SegmentMatch => "segment_match",
            Self::EligibilityFlags => "eligibility_flags",
            Self::MinSubtotal => "min_subtotal",
            Self::CountryAllow => "country_allow",
            Self::CurrencyAllow => "currency_allow",
            Self::ProductAllow => "product_allow",
            Self::NewCustomerOnly => "new_customer_only",
            Self::UsageTotalRemaining => "usage_total_remaining",
            Self::UsagePerUserRemaining => "usage_per_user_remaining",
            Self::BudgetRemaining => "budget_remaining",
            Self::SalePriceCompatible => "sale_price_compatible",
        }
    }

    /// Whether a failure of this rule means a quota has been reached.
    pub const fn is_quota(self) -> bool {
        matches!(
            self,
            Self::UsageTotalRemaining | Self::UsagePerUserRemaining | Self::BudgetRemaining
        )
    }

    /// Short display label.
    pub const fn label(self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ja => match self {
                Self::StatusLive => "公開状態",
                Self::ChannelMatch => "チャネル",
                Self::CurrencyMatch => "通貨",
                Self::SegmentMatch => "対象セグメント",
                Self::EligibilityFlags => "適用条件",
                Self::MinSubtotal => "最低購入金額",
                Self::CountryAllow => "配送国",
                Self::CurrencyAllow => "利用可能通貨",
                Self::ProductAllow => "対象商品",
                Self::NewCustomerOnly => "新規顧客限定",
                Self::UsageTotalRemaining => "利用上限",
                Self::UsagePerUserRemaining => "顧客ごとの利用上限",
                Self::BudgetRemaining => "予算",
                Self::SalePriceCompatible => "セール品との併用",
            },
            Locale::En => match self {
                Self::StatusLive => "Status",
                Self::ChannelMatch => "Channel",
                Self::CurrencyMatch => "Currency",
                Self::SegmentMatch => "Segment",
                Self::EligibilityFlags => "Eligibility",
                Self::MinSubtotal => "Minimum subtotal",
                Self::CountryAllow => "Country",
                Self::CurrencyAllow => "Allowed currencies",
                Self::ProductAllow => "Products",
                Self::NewCustomerOnly => "New customers only",
                Self::UsageTotalRemaining => "Usage limit",
                Self::UsagePerUserRemaining => "Per-customer limit",
                Self::BudgetRemaining => "Budget",
                Self::SalePriceCompatible => "Sale items",
            },
        }
    }
}

impl Display for RuleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Outcome severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Passed.
    Info,
    /// Passed, but worth a look.
    Warn,
    /// Failed.
    Error,
}

/// The result of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Rule evaluated.
    pub key: RuleKey,

    /// Whether the rule is satisfied.
    pub passed: bool,

    /// Whether a failure makes the cart ineligible.
    pub blocking: bool,

    /// Severity.
    pub severity: Severity,

    /// Message template and its context.
    pub message: RuleMessage,
}

impl RuleOutcome {
    /// A passing, blocking-class outcome.
    pub const fn pass(key: RuleKey, message: RuleMessage) -> Self {
        Self {
            key,
            passed: true,
            blocking: true,
            severity: Severity::Info,
            message,
        }
    }

    /// A failing, blocking outcome.
    pub const fn fail(key: RuleKey, message: RuleMessage) -> Self {
        Self {
            key,
            passed: false,
            blocking: true,
            severity: Severity::Error,
            message,
        }
    }

    /// A passing, non-blocking warning.
    pub const fn warn(key: RuleKey, message: RuleMessage) -> Self {
        Self {
            key,
            passed: true,
            blocking: false,
            severity: Severity::Warn,
            message,
        }
    }

    /// Whether this outcome makes the cart ineligible.
    pub const fn blocks(&self) -> bool {
        self.blocking && !self.passed
    }

    /// Render for display.
    pub fn render(&self, locale: Locale) -> RenderedRule {
        RenderedRule {
            key: self.key,
            label: self.key.label(locale).to_string(),
            passed: self.passed,
            blocking: self.blocking,
            severity: self.severity,
            message: self.message.render(locale),
        }
    }
}

/// A rule outcome ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedRule {
    /// Rule key.
    pub key: RuleKey,

    /// Localised label.
    pub label: String,

    /// Whether the rule passed.
    pub passed: bool,

    /// Whether a failure blocks eligibility.
    pub blocking: bool,

    /// Severity.
    pub severity: Severity,

    /// Localised message.
    pub message: String,
}

/// Every rule's outcome, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    /// Outcomes in fixed rule order.
    pub outcomes: Vec<RuleOutcome>,
}

impl RuleReport {
    /// No blocking rule failed.
    pub fn eligible(&self) -> bool {
        !self.outcomes.iter().any(RuleOutcome::blocks)
    }

    /// Blocking failures, in order.
    pub fn blockers(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.blocks())
    }

    /// The first blocking failure.
    pub fn first_blocker(&self) -> Option<&RuleOutcome> {
        self.blockers().next()
    }

    /// Whether the cart is ineligible only because of quota rules.
    pub fn blocked_by_quota_only(&self) -> bool {
        let mut blockers = self.blockers().peekable();

        blockers.peek().is_some() && blockers.all(|outcome| outcome.key.is_quota())
    }

    /// Outcome of a specific rule.
    pub fn outcome(&self, key: RuleKey) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|outcome| outcome.key == key)
    }

    /// Keys of the rules that passed.
    pub fn passed_keys(&self) -> Vec<RuleKey> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.passed)
            .map(|outcome| outcome.key)
            .collect()
    }

    /// Localised one-line summary.
    pub fn summary(&self, locale: Locale) -> String {
        match (self.eligible(), locale) {
            (true, Locale::Ja) => "カートはプロモーション適用対象です。".to_string(),
            (false, Locale::Ja) => {
                "条件を満たしていないため、プロモーションは適用されません。".to_string()
            }
            (true, Locale::En) => "The cart qualifies for this promotion.".to_string(),
            (false, Locale::En) => {
                "The promotion does not apply because the cart does not meet its conditions."
                    .to_string()
            }
        }
    }

    /// Localised messages of the blocking failures, in order.
    pub fn blocker_messages(&self, locale: Locale) -> Vec<String> {
        self.blockers()
            .map(|outcome| outcome.message.render(locale))
            .collect()
    }

    /// Render every outcome.
    pub fn render(&self, locale: Locale) -> Vec<RenderedRule> {
        self.outcomes
            .iter()
            .map(|outcome| outcome.render(locale))
            .collect()
    }
}
