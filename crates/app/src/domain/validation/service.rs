//! Validation Service
//!
//! Dry runs never write: they read the catalog and usage rows, evaluate and
//! project the discount, and report.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use hanko_promotions::{
    cart::CartContext,
    discounts::Application,
    promotions::{Promotion, PromotionCode},
    rules::RuleReport,
    stacking::{self, StackResolution},
};
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::FxHashSet;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{Span, info};

use crate::{
    clock::Clock,
    domain::{
        evaluation::{evaluate_cart, find_promotion},
        validation::{ValidationError, models::ValidationOutcome},
    },
    settings::EngineSettings,
    store::DocumentStore,
};

#[derive(Clone)]
pub struct StoreValidationService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl StoreValidationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    async fn evaluate(
        &self,
        raw_code: &str,
        cart: &CartContext,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<(Promotion, RuleReport), ValidationError> {
        let code = PromotionCode::parse(raw_code)?;

        let promotion = find_promotion(self.store.as_ref(), &code, now, &self.settings, cancel)
            .await?
            .ok_or_else(|| ValidationError::NotFound(code.to_string()))?;

        let evaluation = evaluate_cart(
            self.store.as_ref(),
            &promotion,
            cart,
            now,
            &self.settings,
            cancel,
        )
        .await?;

        Ok((promotion, evaluation.report))
    }

    fn outcome(
        &self,
        promotion: &Promotion,
        report: &RuleReport,
        cart: &CartContext,
        resolution: &StackResolution,
        now: Timestamp,
    ) -> ValidationOutcome {
        let locale = self.settings.locale;
        let application = resolution.application_for(promotion.id);
        let rules = report.render(locale);

        let raw = json!({
            "promotionId": promotion.id,
            "promotionCode": promotion.code,
            "status": promotion.status,
            "version": promotion.version,
            "executedAt": now,
            "locale": locale.as_str(),
            "cart": {
                "userId": cart.user_id,
                "currency": cart.currency,
                "channel": cart.channel,
                "subtotalMinor": cart.subtotal_minor,
                "shippingMinor": cart.shipping_minor,
                "lines": cart.items.len(),
            },
            "eligible": report.eligible(),
            "rules": rules,
            "application": application,
            "stack": {
                "selected": resolution.selected,
                "discountMinor": resolution.discount_minor,
                "shippingDiscountMinor": resolution.shipping_discount_minor,
                "residualSubtotalMinor": resolution.residual_subtotal_minor,
                "residualShippingMinor": resolution.residual_shipping_minor,
            },
        });

        ValidationOutcome {
            promotion_id: promotion.id,
            promotion_code: promotion.code.clone(),
            promotion_name: promotion.name.clone(),
            eligible: report.eligible(),
            summary: report.summary(locale),
            blockers: report.blocker_messages(locale),
            rules,
            executed_at: now,
            discount_minor: application.map_or(0, |application| application.discount_minor),
            shipping_discount_minor: application
                .map_or(0, |application| application.shipping_discount_minor),
            affected_line_ids: application.map_or_else(Vec::new, Application::affected_line_ids),
            raw,
        }
    }
}

impl Debug for StoreValidationService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StoreValidationService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ValidationService for StoreValidationService {
    #[tracing::instrument(
        name = "validation.service.validate",
        skip(self, cart, cancel),
        fields(eligible = tracing::field::Empty, discount_minor = tracing::field::Empty),
        err
    )]
    async fn validate(
        &self,
        code: &str,
        cart: &CartContext,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, ValidationError> {
        cart.validate()?;

        let now = self.clock.now();

        let (promotion, report) = self.evaluate(code, cart, now, cancel).await?;

        let candidates = if report.eligible() { vec![&promotion] } else { Vec::new() };

        let resolution = stacking::resolve(&candidates, cart, &self.settings.stacking)?;

        let outcome = self.outcome(&promotion, &report, cart, &resolution, now);

        let span = Span::current();

        span.record("eligible", outcome.eligible);
        span.record("discount_minor", outcome.total_minor());

        Ok(outcome)
    }

    #[tracing::instrument(
        name = "validation.service.validate_many",
        skip(self, codes, cart, cancel),
        fields(requested = codes.len(), selected = tracing::field::Empty),
        err
    )]
    async fn validate_many(
        &self,
        codes: Vec<String>,
        cart: &CartContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationOutcome>, ValidationError> {
        if codes.iter().all(|code| code.trim().is_empty()) {
            return Err(ValidationError::NoCodes);
        }

        cart.validate()?;

        let now = self.clock.now();
        let mut seen = FxHashSet::default();
        let mut evaluated = Vec::with_capacity(codes.len());

        for code in codes.iter().filter(|code| !code.trim().is_empty()) {
            let (promotion, report) = self.evaluate(code, cart, now, cancel).await?;

            if seen.insert(promotion.id) {
                evaluated.push((promotion, report));
            }
        }

        let candidates: Vec<&Promotion> = evaluated
            .iter()
            .filter(|(_, report)| report.eligible())
            .map(|(promotion, _)| promotion)
            .collect();

        let resolution = stacking::resolve(&candidates, cart, &self.settings.stacking)?;

        Span::current().record("selected", resolution.selected.len());

        info!(
            evaluated = evaluated.len(),
            eligible = candidates.len(),
            discount_minor = resolution.total_minor(),
            "validated promotion codes"
        );

        Ok(evaluated
            .iter()
            .map(|(promotion, report)| self.outcome(promotion, report, cart, &resolution, now))
            .collect())
    }
}

#[automock]
#[async_trait]
/// Dry-run eligibility and discount projection.
pub trait ValidationService: Send + Sync {
    async fn validate(
        &self,
        code: &str,
        cart: &CartContext,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, ValidationError>;

    /// Validate several codes and project the best stack of the eligible ones.
    async fn validate_many(
        &self,
        codes: Vec<String>,
        cart: &CartContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationOutcome>, ValidationError>;
}

#[cfg(test)]
mod tests {
    use hanko_promotions::{
        cart::Channel,
        promotions::{Benefit, PromotionDraft},
        rules::RuleKey,
    };
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::test::{
        TestContext,
        helpers::{cart, limited, spring24},
    };

    use super::*;

    fn with_benefit(code: &str, benefit: Benefit) -> PromotionDraft {
        PromotionDraft {
            benefit,
            ..limited(code, 0, 0)
        }
    }

    #[tokio::test]
    async fn validate_projects_the_discount_of_an_eligible_cart() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        let outcome = ctx
            .validation
            .validate("spring24", &cart(Some("user-1"), 10_000), &CancellationToken::new())
            .await?;

        assert!(outcome.eligible, "cart qualifies");
        assert_eq!(outcome.promotion_id, promotion.id);
        assert_eq!(outcome.discount_minor, 1_000);
        assert_eq!(outcome.shipping_discount_minor, 0);
        assert_eq!(outcome.affected_line_ids, vec!["line-1".to_string()]);
        assert!(outcome.blockers.is_empty(), "no blockers");
        assert_eq!(outcome.raw["eligible"], true);

        Ok(())
    }

    #[tokio::test]
    async fn validate_reports_failed_rules_without_a_discount() -> TestResult {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;

        let mut retail = cart(Some("user-1"), 10_000);
        retail.channel = Channel::Retail;

        let outcome = ctx
            .validation
            .validate("SPRING24", &retail, &CancellationToken::new())
            .await?;

        assert!(!outcome.eligible, "retail carts do not qualify");
        assert_eq!(outcome.total_minor(), 0);
        assert_eq!(outcome.blockers.len(), 1);

        let channel = outcome
            .rules
            .iter()
            .find(|rule| rule.key == RuleKey::ChannelMatch)
            .ok_or("channel rule missing")?;

        assert!(!channel.passed, "channel rule failed");

        Ok(())
    }

    #[tokio::test]
    async fn validate_unknown_code_is_not_found() {
        let ctx = TestContext::new();

        let result = ctx
            .validation
            .validate("nope", &cart(None, 10_000), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(ValidationError::NotFound("NOPE".to_string())));
    }

    #[tokio::test]
    async fn validate_rejects_malformed_carts() {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;

        let mut broken = cart(None, 10_000);
        broken.shipping_minor = -1;

        let result = ctx
            .validation
            .validate("SPRING24", &broken, &CancellationToken::new())
            .await;

        assert!(
            matches!(result, Err(ValidationError::Cart(_))),
            "expected Cart, got {result:?}"
        );
    }

    #[tokio::test]
    async fn validate_never_writes() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        ctx.validation
            .validate("SPRING24", &cart(Some("user-1"), 10_000), &CancellationToken::new())
            .await?;

        let stored = ctx.promotions.get_promotion(promotion.id).await?;

        assert_eq!(stored.version, promotion.version);
        assert_eq!(stored.usage_count, 0);
        assert!(ctx.usage.get_usage(promotion.id, "user-1").await?.is_none(), "no usage row");

        Ok(())
    }

    #[tokio::test]
    async fn exhausted_quota_blocks_eligibility() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(limited("ONCE", 1, 0)).await;

        ctx.usage
            .increment_usage(promotion.id, "user-0", "order-0", ctx.now())
            .await?;

        let outcome = ctx
            .validation
            .validate("ONCE", &cart(Some("user-1"), 10_000), &CancellationToken::new())
            .await?;

        assert!(!outcome.eligible, "quota exhausted");

        let total = outcome
            .rules
            .iter()
            .find(|rule| rule.key == RuleKey::UsageTotalRemaining)
            .ok_or("quota rule missing")?;

        assert!(!total.passed, "quota rule failed");

        Ok(())
    }

    #[tokio::test]
    async fn validate_many_stacks_in_kind_order() -> TestResult {
        let ctx = TestContext::new();

        ctx.create(spring24()).await;
        ctx.create(with_benefit("YEN500", Benefit::FixedAmount { amount_minor: 500 }))
            .await;
        ctx.create(with_benefit("SHIPFREE", Benefit::FreeShipping)).await;

        let outcomes = ctx
            .validation
            .validate_many(
                vec!["spring24".into(), "yen500".into(), "shipfree".into()],
                &cart(Some("user-1"), 10_000),
                &CancellationToken::new(),
            )
            .await?;

        let discounts: Vec<(String, i64, i64)> = outcomes
            .iter()
            .map(|outcome| {
                (
                    outcome.promotion_code.to_string(),
                    outcome.discount_minor,
                    outcome.shipping_discount_minor,
                )
            })
            .collect();

        assert_eq!(
            discounts,
            vec![
                ("SPRING24".to_string(), 950, 0),
                ("YEN500".to_string(), 500, 0),
                ("SHIPFREE".to_string(), 0, 800),
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn validate_many_prefers_a_stronger_exclusive_promotion() -> TestResult {
        let ctx = TestContext::new();

        ctx.create(spring24()).await;
        ctx.create(with_benefit("YEN500", Benefit::FixedAmount { amount_minor: 500 }))
            .await;

        let mut exclusive = with_benefit(
            "TWENTY",
            Benefit::Percentage {
                percent: Decimal::from(20),
            },
        );
        exclusive.stacking.combinable = false;

        ctx.create(exclusive).await;

        let outcomes = ctx
            .validation
            .validate_many(
                vec!["SPRING24".into(), "YEN500".into(), "TWENTY".into()],
                &cart(Some("user-1"), 10_000),
                &CancellationToken::new(),
            )
            .await?;

        assert!(outcomes.iter().all(|outcome| outcome.eligible), "all eligible alone");

        let applied: Vec<(String, i64)> = outcomes
            .iter()
            .filter(|outcome| outcome.total_minor() > 0)
            .map(|outcome| (outcome.promotion_code.to_string(), outcome.discount_minor))
            .collect();

        assert_eq!(applied, vec![("TWENTY".to_string(), 2_000)]);

        Ok(())
    }

    #[tokio::test]
    async fn validate_many_deduplicates_and_requires_codes() -> TestResult {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;

        let outcomes = ctx
            .validation
            .validate_many(
                vec!["spring24".into(), " SPRING24 ".into(), String::new()],
                &cart(None, 10_000),
                &CancellationToken::new(),
            )
            .await?;

        assert_eq!(outcomes.len(), 1);

        let empty = ctx
            .validation
            .validate_many(vec![" ".into()], &cart(None, 10_000), &CancellationToken::new())
            .await;

        assert_eq!(empty, Err(ValidationError::NoCodes));

        Ok(())
    }

    #[tokio::test]
    async fn cancelled_validation_stops_before_reading() {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ctx
            .validation
            .validate("SPRING24", &cart(None, 10_000), &cancel)
            .await;

        assert_eq!(result, Err(ValidationError::Cancelled));
    }
}
