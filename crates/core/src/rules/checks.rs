//! The individual rules.

use crate::{
    discounts,
    money::Money,
    promotions::PromotionStatus,
};

use super::{Rule, RuleInput, RuleKey, RuleMessage, RuleOutcome};

/// Status is active or scheduled and `now` is inside the window.
#[derive(Debug, Clone, Copy)]
pub struct StatusLive;

impl Rule for StatusLive {
    fn key(&self) -> RuleKey {
        RuleKey::StatusLive
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let promotion = input.promotion;
        let schedule = promotion.schedule;

        if !matches!(
            promotion.status,
            PromotionStatus::Active | PromotionStatus::Scheduled
        ) {
            return RuleOutcome::fail(
                self.key(),
                RuleMessage::NotLive {
                    status: promotion.status,
                },
            );
        }

        if input.now < schedule.starts_at {
            return RuleOutcome::fail(
                self.key(),
                RuleMessage::NotStarted {
                    starts_at: schedule.starts_at,
                },
            );
        }

        if input.now >= schedule.ends_at {
            return RuleOutcome::fail(
                self.key(),
                RuleMessage::Ended {
                    ends_at: schedule.ends_at,
                },
            );
        }

        RuleOutcome::pass(
            self.key(),
            RuleMessage::Live {
                ends_at: schedule.ends_at,
            },
        )
    }
}

/// The cart's channel is one of the promotion's channels.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMatch;

impl Rule for ChannelMatch {
    fn key(&self) -> RuleKey {
        RuleKey::ChannelMatch
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let channel = input.cart.channel;

        if input.promotion.channels.contains(&channel) {
            RuleOutcome::pass(self.key(), RuleMessage::ChannelAllowed { channel })
        } else {
            RuleOutcome::fail(self.key(), RuleMessage::ChannelNotAllowed { channel })
        }
    }
}

/// The cart's currency equals the promotion's, when it has one.
#[derive(Debug, Clone, Copy)]
pub struct CurrencyMatch;

impl Rule for CurrencyMatch {
    fn key(&self) -> RuleKey {
        RuleKey::CurrencyMatch
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let found = input.cart.currency;

        match input.promotion.currency {
            None => RuleOutcome::pass(self.key(), RuleMessage::AnyCurrency),
            Some(expected) if expected == found => RuleOutcome::pass(
                self.key(),
                RuleMessage::CurrencyMatches { currency: found },
            ),
            Some(expected) => RuleOutcome::fail(
                self.key(),
                RuleMessage::CurrencyMismatch { expected, found },
            ),
        }
    }
}

/// The promotion targets no segment, or the cart's segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentMatch;

impl Rule for SegmentMatch {
    fn key(&self) -> RuleKey {
        RuleKey::SegmentMatch
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let Some(expected) = input
            .promotion
            .segment_key
            .as_deref()
            .filter(|segment| !segment.is_empty())
        else {
            return RuleOutcome::pass(self.key(), RuleMessage::AllSegments);
        };

        if input.cart.segment_key.as_deref() == Some(expected) {
            RuleOutcome::pass(
                self.key(),
                RuleMessage::SegmentMatches {
                    segment: expected.to_string(),
                },
            )
        } else {
            RuleOutcome::fail(
                self.key(),
                RuleMessage::SegmentMismatch {
                    expected: expected.to_string(),
                },
            )
        }
    }
}

/// Every eligibility token is set on the cart.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityFlags;

impl Rule for EligibilityFlags {
    fn key(&self) -> RuleKey {
        RuleKey::EligibilityFlags
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let tokens = &input.promotion.eligibility_rules;

        if tokens.is_empty() {
            return RuleOutcome::pass(self.key(), RuleMessage::NoEligibilityRules);
        }

        let missing: Vec<String> = tokens
            .iter()
            .filter(|token| !input.cart.flag(token))
            .cloned()
            .collect();

        if missing.is_empty() {
            RuleOutcome::pass(
                self.key(),
                RuleMessage::EligibilitySatisfied {
                    tokens: tokens.iter().cloned().collect(),
                },
            )
        } else {
            RuleOutcome::fail(self.key(), RuleMessage::EligibilityMissing { missing })
        }
    }
}

/// The cart subtotal reaches the minimum.
#[derive(Debug, Clone, Copy)]
pub struct MinSubtotal;

impl Rule for MinSubtotal {
    fn key(&self) -> RuleKey {
        RuleKey::MinSubtotal
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let Some(minimum) = input
            .promotion
            .conditions
            .min_subtotal_minor
            .filter(|minimum| *minimum > 0)
        else {
            return RuleOutcome::pass(self.key(), RuleMessage::NoMinimum);
        };

        let currency = input.cart.currency;
        let subtotal = input.cart.subtotal_minor;

        if subtotal >= minimum {
            RuleOutcome::pass(
                self.key(),
                RuleMessage::SubtotalMet {
                    minimum: Money::new(minimum, currency),
                },
            )
        } else {
            RuleOutcome::fail(
                self.key(),
                RuleMessage::SubtotalShort {
                    minimum: Money::new(minimum, currency),
                    shortfall: Money::new(minimum.saturating_sub(subtotal), currency),
                },
            )
        }
    }
}

/// The shipping country is allowed.
#[derive(Debug, Clone, Copy)]
pub struct CountryAllow;

impl Rule for CountryAllow {
    fn key(&self) -> RuleKey {
        RuleKey::CountryAllow
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let allowed = &input.promotion.conditions.country_in;

        if allowed.is_empty() {
            return RuleOutcome::pass(self.key(), RuleMessage::AnyCountry);
        }

        let country = input.cart.country.trim().to_ascii_uppercase();

        if allowed.contains(&country) {
            RuleOutcome::pass(self.key(), RuleMessage::CountryAllowed { country })
        } else {
            RuleOutcome::fail(self.key(), RuleMessage::CountryNotAllowed { country })
        }
    }
}

/// The cart currency is in the allowed list.
#[derive(Debug, Clone, Copy)]
pub struct CurrencyAllow;

impl Rule for CurrencyAllow {
    fn key(&self) -> RuleKey {
        RuleKey::CurrencyAllow
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let allowed = &input.promotion.conditions.currency_in;
        let currency = input.cart.currency;

        if allowed.is_empty() {
            RuleOutcome::pass(self.key(), RuleMessage::AnyCartCurrency)
        } else if allowed.contains(&currency) {
            RuleOutcome::pass(self.key(), RuleMessage::CartCurrencyAllowed { currency })
        } else {
            RuleOutcome::fail(self.key(), RuleMessage::CartCurrencyNotAllowed { currency })
        }
    }
}

/// At least one line satisfies the item filters. Empty carts never qualify.
#[derive(Debug, Clone, Copy)]
pub struct ProductAllow;

impl Rule for ProductAllow {
    fn key(&self) -> RuleKey {
        RuleKey::ProductAllow
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let items = &input.cart.items;
        let conditions = &input.promotion.conditions;

        if items.is_empty() {
            return RuleOutcome::fail(self.key(), RuleMessage::EmptyCart);
        }

        if !conditions.has_item_filters() {
            return RuleOutcome::pass(self.key(), RuleMessage::AnyProduct);
        }

        let matched = items
            .iter()
            .filter(|item| conditions.matches_item(item))
            .count();

        if matched > 0 {
            RuleOutcome::pass(
                self.key(),
                RuleMessage::ProductsMatched {
                    matched,
                    total: items.len(),
                },
            )
        } else {
            RuleOutcome::fail(self.key(), RuleMessage::NoProductsMatched)
        }
    }
}

/// Customers with any prior redemption are excluded when required.
#[derive(Debug, Clone, Copy)]
pub struct NewCustomerOnly;

impl Rule for NewCustomerOnly {
    fn key(&self) -> RuleKey {
        RuleKey::NewCustomerOnly
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if !input.promotion.conditions.new_customer_only {
            return RuleOutcome::pass(self.key(), RuleMessage::OpenToAllCustomers);
        }

        if input.cart.user_id.is_none() {
            return if input.cart.flag("new_customer") {
                RuleOutcome::pass(self.key(), RuleMessage::NewCustomer)
            } else {
                RuleOutcome::fail(self.key(), RuleMessage::GuestNotNewCustomer)
            };
        }

        match input.usage.prior_redemptions {
            0 => RuleOutcome::pass(self.key(), RuleMessage::NewCustomer),
            prior => RuleOutcome::fail(self.key(), RuleMessage::ReturningCustomer { prior }),
        }
    }
}

/// The total usage cap has room.
#[derive(Debug, Clone, Copy)]
pub struct UsageTotalRemaining;

impl Rule for UsageTotalRemaining {
    fn key(&self) -> RuleKey {
        RuleKey::UsageTotalRemaining
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let limit = input.promotion.usage_limit_total;

        match input.promotion.remaining_total() {
            None => RuleOutcome::pass(self.key(), RuleMessage::UnlimitedUsage),
            Some(0) => RuleOutcome::fail(self.key(), RuleMessage::UsageExhausted { limit }),
            Some(remaining) => RuleOutcome::pass(
                self.key(),
                RuleMessage::UsageRemaining { remaining, limit },
            ),
        }
    }
}

/// The customer's cap has room and the customer is not blocked.
#[derive(Debug, Clone, Copy)]
pub struct UsagePerUserRemaining;

impl Rule for UsagePerUserRemaining {
    fn key(&self) -> RuleKey {
        RuleKey::UsagePerUserRemaining
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if input.usage.user_blocked {
            return RuleOutcome::fail(self.key(), RuleMessage::CustomerBlocked);
        }

        let limit = input.promotion.usage_limit_per_customer;

        if limit == 0 {
            return RuleOutcome::pass(self.key(), RuleMessage::UnlimitedPerCustomer);
        }

        if input.cart.user_id.is_none() {
            return RuleOutcome::fail(self.key(), RuleMessage::GuestCannotRedeem);
        }

        match limit.saturating_sub(input.usage.user_times) {
            0 => RuleOutcome::fail(self.key(), RuleMessage::PerCustomerExhausted { limit }),
            remaining => RuleOutcome::pass(
                self.key(),
                RuleMessage::PerCustomerRemaining { remaining, limit },
            ),
        }
    }
}

/// The standalone discount for this cart fits in the remaining budget.
#[derive(Debug, Clone, Copy)]
pub struct BudgetRemaining;

impl Rule for BudgetRemaining {
    fn key(&self) -> RuleKey {
        RuleKey::BudgetRemaining
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        let promotion = input.promotion;

        let (Some(budget), Some(remaining)) = (promotion.budget_minor, promotion.remaining_budget())
        else {
            return RuleOutcome::pass(self.key(), RuleMessage::NoBudget);
        };

        let currency = promotion.currency.unwrap_or(input.cart.currency);

        // An estimate that cannot be computed is treated as unaffordable.
        let estimate = discounts::standalone(promotion, input.cart)
            .map_or(i64::MAX, |application| application.total_minor());

        if estimate > remaining {
            return RuleOutcome::fail(
                self.key(),
                RuleMessage::BudgetExceeded {
                    remaining: Money::new(remaining, currency),
                    estimate: Money::new(estimate, currency),
                },
            );
        }

        let after = remaining - estimate;
        let threshold = i128::from(budget) * i128::from(input.settings.budget_warn_percent);

        if i128::from(after) * 100 < threshold {
            RuleOutcome::warn(
                self.key(),
                RuleMessage::BudgetLow {
                    remaining: Money::new(after, currency),
                },
            )
        } else {
            RuleOutcome::pass(
                self.key(),
                RuleMessage::BudgetAvailable {
                    remaining: Money::new(remaining, currency),
                },
            )
        }
    }
}

/// Sale items are only discounted when the promotion allows it.
#[derive(Debug, Clone, Copy)]
pub struct SalePriceCompatible;

impl Rule for SalePriceCompatible {
    fn key(&self) -> RuleKey {
        RuleKey::SalePriceCompatible
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> RuleOutcome {
        if input.promotion.stacking.with_sale_price {
            return RuleOutcome::pass(self.key(), RuleMessage::SaleItemsAllowed);
        }

        match input.cart.items.iter().filter(|item| item.on_sale).count() {
            0 => RuleOutcome::pass(self.key(), RuleMessage::NoSaleItems),
            count => RuleOutcome::fail(self.key(), RuleMessage::SaleItemsPresent { count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use jiff::Timestamp;
    use testresult::TestResult;

    use crate::{
        cart::{CartContext, CartItem, Channel},
        locale::Locale,
        money::{CurrencyCode, MoneyError},
        promotions::{
            Promotion,
            test_support::{march_15, spring24},
        },
        rules::{EvaluationSettings, RuleReport, Severity, evaluate},
        usage::UsageSnapshot,
    };

    use super::*;

    fn cart(subtotal_minor: i64) -> Result<CartContext, MoneyError> {
        Ok(CartContext {
            user_id: Some("u-1".to_string()),
            currency: CurrencyCode::parse("JPY")?,
            channel: Channel::OnlineStore,
            country: "JP".to_string(),
            subtotal_minor,
            shipping_minor: 0,
            segment_key: None,
            items: vec![CartItem {
                line_id: None,
                sku: "A".to_string(),
                quantity: 1,
                price_minor: subtotal_minor,
                product_ref: Some("/products/seal".to_string()),
                material_ref: None,
                shape: None,
                size_mm: None,
                on_sale: false,
            }],
            flags: BTreeMap::new(),
        })
    }

    fn run(promotion: &Promotion, cart: &CartContext, usage: UsageSnapshot) -> RuleReport {
        run_at(promotion, cart, usage, march_15())
    }

    fn run_at(
        promotion: &Promotion,
        cart: &CartContext,
        usage: UsageSnapshot,
        now: Timestamp,
    ) -> RuleReport {
        evaluate(&RuleInput {
            promotion,
            cart,
            now,
            usage,
            settings: EvaluationSettings::default(),
        })
    }

    #[test]
    fn eligible_cart_passes_every_rule() -> TestResult {
        let report = run(&spring24(), &cart(10_000)?, UsageSnapshot::default());

        assert!(report.eligible(), "{report:?}");
        assert_eq!(report.passed_keys().len(), 14);
        assert_eq!(
            report.summary(Locale::Ja),
            "カートはプロモーション適用対象です。"
        );

        Ok(())
    }

    #[test]
    fn schedule_edges() -> TestResult {
        let promotion = spring24();
        let cart = cart(10_000)?;

        let at_start = run_at(&promotion, &cart, UsageSnapshot::default(), promotion.schedule.starts_at);
        let at_end = run_at(&promotion, &cart, UsageSnapshot::default(), promotion.schedule.ends_at);

        assert!(at_start.eligible(), "start is inclusive");
        assert_eq!(
            at_end.first_blocker().map(|outcome| outcome.key),
            Some(RuleKey::StatusLive)
        );

        Ok(())
    }

    #[test]
    fn paused_promotion_is_not_live() -> TestResult {
        let promotion = Promotion {
            status: PromotionStatus::Paused,
            ..spring24()
        };

        let report = run(&promotion, &cart(10_000)?, UsageSnapshot::default());

        assert_eq!(
            report.outcome(RuleKey::StatusLive).map(|outcome| &outcome.message),
            Some(&RuleMessage::NotLive {
                status: PromotionStatus::Paused
            })
        );

        Ok(())
    }

    #[test]
    fn failures_do_not_stop_later_rules() -> TestResult {
        let promotion = Promotion {
            channels: BTreeSet::from([Channel::Retail]),
            usage_limit_total: 1,
            usage_count: 1,
            ..spring24()
        };

        let report = run(&promotion, &cart(10_000)?, UsageSnapshot::default());
        let blockers: Vec<RuleKey> = report.blockers().map(|outcome| outcome.key).collect();

        assert_eq!(
            blockers,
            vec![RuleKey::ChannelMatch, RuleKey::UsageTotalRemaining]
        );
        assert_eq!(report.outcomes.len(), 14);
        assert!(!report.blocked_by_quota_only(), "channel is not a quota rule");

        Ok(())
    }

    #[test]
    fn empty_cart_fails_product_allow() -> TestResult {
        let mut cart = cart(0)?;
        cart.items.clear();

        let report = run(&spring24(), &cart, UsageSnapshot::default());

        assert_eq!(
            report.first_blocker().map(|outcome| outcome.key),
            Some(RuleKey::ProductAllow)
        );

        Ok(())
    }

    #[test]
    fn minimum_subtotal_reports_the_shortfall() -> TestResult {
        let mut promotion = spring24();
        promotion.conditions.min_subtotal_minor = Some(5_000);

        let report = run(&promotion, &cart(4_000)?, UsageSnapshot::default());
        let Some(outcome) = report.outcome(RuleKey::MinSubtotal) else {
            unreachable!("min_subtotal always runs");
        };

        assert!(!outcome.passed, "subtotal is short");
        assert!(
            outcome.message.render(Locale::En).contains("1,000"),
            "{}",
            outcome.message.render(Locale::En)
        );

        Ok(())
    }

    #[test]
    fn returning_customer_is_rejected_for_new_customer_offers() -> TestResult {
        let mut promotion = spring24();
        promotion.conditions.new_customer_only = true;

        let report = run(
            &promotion,
            &cart(10_000)?,
            UsageSnapshot {
                prior_redemptions: 1,
                ..UsageSnapshot::default()
            },
        );

        assert_eq!(
            report.first_blocker().map(|outcome| outcome.key),
            Some(RuleKey::NewCustomerOnly)
        );

        Ok(())
    }

    #[test]
    fn guest_needs_new_customer_flag() -> TestResult {
        let mut promotion = spring24();
        promotion.conditions.new_customer_only = true;

        let mut guest = cart(10_000)?;
        guest.user_id = None;

        assert!(!run(&promotion, &guest, UsageSnapshot::default()).eligible(), "unflagged guest");

        guest.flags.insert("new_customer".to_string(), true);

        assert!(run(&promotion, &guest, UsageSnapshot::default()).eligible(), "flagged guest");

        Ok(())
    }

    #[test]
    fn per_customer_cap_and_block() -> TestResult {
        let promotion = Promotion {
            usage_limit_per_customer: 1,
            ..spring24()
        };
        let cart = cart(10_000)?;

        let used = run(
            &promotion,
            &cart,
            UsageSnapshot {
                user_times: 1,
                ..UsageSnapshot::default()
            },
        );

        assert!(used.blocked_by_quota_only(), "{used:?}");

        let blocked = run(
            &spring24(),
            &cart,
            UsageSnapshot {
                user_blocked: true,
                ..UsageSnapshot::default()
            },
        );

        assert_eq!(
            blocked.first_blocker().map(|outcome| &outcome.message),
            Some(&RuleMessage::CustomerBlocked)
        );

        Ok(())
    }

    #[test]
    fn budget_edges() -> TestResult {
        let cart = cart(10_000)?;

        let exact = Promotion {
            budget_minor: Some(10_000),
            budget_spent_minor: 9_000,
            ..spring24()
        };
        let report = run(&exact, &cart, UsageSnapshot::default());
        let outcome = report.outcome(RuleKey::BudgetRemaining);

        assert!(report.eligible(), "reaching the budget exactly is allowed");
        assert_eq!(outcome.map(|outcome| outcome.severity), Some(Severity::Warn));

        let over = Promotion {
            budget_spent_minor: 9_001,
            ..exact
        };
        let report = run(&over, &cart, UsageSnapshot::default());

        assert!(report.blocked_by_quota_only(), "one unit over is rejected");

        let roomy = Promotion {
            budget_minor: Some(1_000_000),
            ..spring24()
        };
        let report = run(&roomy, &cart, UsageSnapshot::default());

        assert_eq!(
            report.outcome(RuleKey::BudgetRemaining).map(|outcome| outcome.severity),
            Some(Severity::Info)
        );

        Ok(())
    }

    #[test]
    fn sale_items_need_opt_in() -> TestResult {
        let mut cart = cart(10_000)?;

        for item in &mut cart.items {
            item.on_sale = true;
        }

        assert!(!run(&spring24(), &cart, UsageSnapshot::default()).eligible(), "sale items block");

        let mut promotion = spring24();
        promotion.stacking.with_sale_price = true;

        assert!(run(&promotion, &cart, UsageSnapshot::default()).eligible(), "opted in");

        Ok(())
    }

    #[test]
    fn product_filters_need_one_matching_line() -> TestResult {
        let mut promotion = spring24();
        promotion.conditions.product_refs_in = BTreeSet::from(["/products/ring".to_string()]);

        let cart = cart(10_000)?;

        assert!(!run(&promotion, &cart, UsageSnapshot::default()).eligible(), "no ring in cart");

        promotion.conditions.product_refs_in.insert("/products/seal".to_string());

        assert!(run(&promotion, &cart, UsageSnapshot::default()).eligible(), "seal matches");

        Ok(())
    }
}
