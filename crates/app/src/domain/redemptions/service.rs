//! Redemption Service

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use hanko_promotions::{
    cart::CartContext,
    locale::Locale,
    promotions::{Promotion, PromotionCode},
    rules::RuleReport,
    stacking,
    usage::PromotionUsage,
};
use mockall::automock;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{Span, info, warn};

use crate::{
    clock::Clock,
    domain::{
        audit::{Actor, AuditEntry, AuditLog, records::promotion_ref, service::record_quietly},
        evaluation::{evaluate_cart, find_stored_promotion},
        redemptions::{
            NotEligibleReason, RedemptionError,
            records::{Redemption, RedemptionIntent, RedemptionReceipt},
        },
    },
    guard::{CallError, backoff, bounded, guarded},
    settings::EngineSettings,
    store::{DocumentStore, IdempotencyWrite, StoreError, UsageWrite, WriteBatch},
};

#[derive(Clone)]
pub struct StoreRedemptionService {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl StoreRedemptionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            settings,
        }
    }

    fn not_found(&self) -> RedemptionError {
        let summary = match self.settings.locale {
            Locale::Ja => "プロモーションコードが見つからないか、現在は利用できません。",
            Locale::En => "The promotion code was not found or is not currently available.",
        };

        RedemptionError::NotEligible {
            reason: NotEligibleReason::NotFound,
            summary: summary.to_string(),
            blockers: Vec::new(),
        }
    }

    /// Map a failed report onto the matching error; quota failures seen on a
    /// retry were caused by a concurrent writer.
    fn rejection(&self, promotion: &Promotion, report: &RuleReport, retried: bool) -> RedemptionError {
        let locale = self.settings.locale;
        let summary = report.summary(locale);
        let blockers = report.blocker_messages(locale);

        if !report.blocked_by_quota_only() {
            return RedemptionError::NotEligible {
                reason: NotEligibleReason::Rules,
                summary,
                blockers,
            };
        }

        let remaining = promotion.remaining_total();

        if retried {
            RedemptionError::LostRace {
                summary,
                blockers,
                remaining,
            }
        } else {
            RedemptionError::QuotaExhausted {
                summary,
                blockers,
                remaining,
            }
        }
    }

    async fn audit_applied(&self, intent: &RedemptionIntent, receipt: &RedemptionReceipt) {
        let actor = if intent.actor_ref.trim().is_empty() {
            Actor::customer(receipt.user_id.clone())
        } else {
            Actor::customer(intent.actor_ref.trim())
        };

        let entry = AuditEntry::new(
            &actor,
            "marketing.promotion.redeem",
            promotion_ref(receipt.promotion_id),
            json!({
                "promotionCode": receipt.promotion_code,
                "orderRef": receipt.order_ref,
                "userId": receipt.user_id,
                "idempotencyKey": receipt.idempotency_key,
                "currency": receipt.currency,
                "discountMinor": receipt.discount_minor,
                "shippingDiscountMinor": receipt.shipping_discount_minor,
                "cartFingerprint": cart_fingerprint(&intent.cart),
                "version": receipt.version,
            }),
            receipt.applied_at,
        );

        record_quietly(self.audit.as_ref(), entry).await;
    }
}

impl Debug for StoreRedemptionService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StoreRedemptionService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// SHA-256 of the cart's canonical JSON.
pub(crate) fn cart_fingerprint(cart: &CartContext) -> String {
    let canonical = serde_json::to_vec(cart).unwrap_or_default();

    format!("{:x}", Sha256::digest(canonical))
}

fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, RedemptionError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(RedemptionError::MissingField(field));
    }

    Ok(value)
}

#[async_trait]
impl RedemptionService for StoreRedemptionService {
    #[tracing::instrument(
        name = "redemptions.service.redeem",
        skip(self, intent, cancel),
        fields(
            promotion_code = %intent.promotion_code,
            order_ref = %intent.order_ref,
            promotion_id = tracing::field::Empty,
            attempts = tracing::field::Empty,
            outcome = tracing::field::Empty
        ),
        err
    )]
    async fn redeem(
        &self,
        intent: RedemptionIntent,
        cancel: &CancellationToken,
    ) -> Result<Redemption, RedemptionError> {
        let idempotency_key = require("idempotencyKey", &intent.idempotency_key)?;
        let order_ref = require("orderRef", &intent.order_ref)?;
        let user_id = require("userId", intent.cart.user_id.as_deref().unwrap_or_default())?;
        let code = PromotionCode::parse(&intent.promotion_code)?;

        intent.cart.validate()?;

        let span = Span::current();
        let limit = self.settings.read_timeout;
        let mut attempt: u32 = 0;

        loop {
            span.record("attempts", attempt + 1);

            let now = self.clock.now();

            // Rules see the settled status; the write keeps the stored one.
            let Some(stored) =
                find_stored_promotion(self.store.as_ref(), &code, &self.settings, cancel)
                    .await?
                    .filter(|promotion| promotion.is_live(now))
            else {
                return Err(self.not_found());
            };

            let promotion = stored.clone().settled(now);

            span.record("promotion_id", tracing::field::display(promotion.id));

            let replay = guarded(
                cancel,
                limit,
                self.store.get_idempotency(promotion.id, idempotency_key),
            )
            .await?;

            if let Some(receipt) = replay {
                span.record("outcome", "already_applied");

                info!(promotion_id = %promotion.id, idempotency_key, "returned stored receipt");

                return Ok(Redemption::AlreadyApplied(receipt));
            }

            let evaluation = evaluate_cart(
                self.store.as_ref(),
                &promotion,
                &intent.cart,
                now,
                &self.settings,
                cancel,
            )
            .await?;

            if evaluation
                .usage
                .as_ref()
                .is_some_and(|record| record.usage.has_order(order_ref))
            {
                return Err(RedemptionError::OrderAlreadyRedeemed {
                    order_ref: order_ref.to_string(),
                });
            }

            if !evaluation.report.eligible() {
                let error = self.rejection(&promotion, &evaluation.report, attempt > 0);

                if matches!(error, RedemptionError::LostRace { .. }) {
                    warn!(promotion_id = %promotion.id, attempt, "quota taken by a concurrent redemption");
                }

                return Err(error);
            }

            let resolution = stacking::resolve(&[&promotion], &intent.cart, &self.settings.stacking)?;

            let mut usage = evaluation
                .usage
                .as_ref()
                .map_or_else(|| PromotionUsage::new(user_id), |record| record.usage.clone());

            usage.record(order_ref, now);

            let mut next = stored;

            next.usage_count = next.usage_count.saturating_add(1);
            next.budget_spent_minor = next
                .budget_spent_minor
                .saturating_add(resolution.total_minor());
            next.version = promotion.version.next();
            next.updated_at = now;

            let receipt = RedemptionReceipt {
                promotion_id: promotion.id,
                promotion_code: promotion.code.clone(),
                idempotency_key: idempotency_key.to_string(),
                order_ref: order_ref.to_string(),
                user_id: user_id.to_string(),
                currency: intent.cart.currency,
                discount_minor: resolution.discount_minor,
                shipping_discount_minor: resolution.shipping_discount_minor,
                line_discounts: resolution.line_discounts,
                applied_at: now,
                rules_passed: evaluation.report.passed_keys(),
                version: next.version,
            };

            let batch = WriteBatch::promotion(next, promotion.version)
                .with_usage(UsageWrite {
                    promotion_id: promotion.id,
                    usage,
                    expected_revision: evaluation.usage.as_ref().map(|record| record.revision),
                })
                .with_idempotency(IdempotencyWrite {
                    promotion_id: promotion.id,
                    key: idempotency_key.to_string(),
                    receipt: receipt.clone(),
                });

            if cancel.is_cancelled() {
                return Err(RedemptionError::Cancelled);
            }

            // Past this point the commit runs to completion; a late cancel is ignored.
            let error = match bounded(self.settings.transaction_timeout, self.store.commit(batch)).await {
                Ok(()) => {
                    span.record("outcome", "applied");

                    self.audit_applied(&intent, &receipt).await;

                    info!(
                        promotion_id = %receipt.promotion_id,
                        user_id,
                        order_ref,
                        discount_minor = receipt.total_minor(),
                        "redeemed promotion"
                    );

                    return Ok(Redemption::Applied(receipt));
                }
                Err(error) => error,
            };

            let retryable = matches!(
                error,
                CallError::TimedOut(_)
                    | CallError::Store(
                        StoreError::PreconditionFailed(_)
                            | StoreError::IdempotencyKeyExists
                            | StoreError::Unavailable(_)
                    )
            );

            if !retryable {
                return Err(error.into());
            }

            if attempt >= self.settings.max_transaction_retries {
                return Err(match error {
                    CallError::Store(StoreError::PreconditionFailed(_) | StoreError::IdempotencyKeyExists) => {
                        RedemptionError::Conflict {
                            attempts: attempt + 1,
                        }
                    }
                    other => other.into(),
                });
            }

            attempt += 1;

            warn!(promotion_id = %promotion.id, attempt, %error, "redemption commit failed, retrying");

            backoff(attempt).await;
        }
    }
}

#[automock]
#[async_trait]
/// Applies promotions to placed orders exactly once per idempotency key.
pub trait RedemptionService: Send + Sync {
    async fn redeem(
        &self,
        intent: RedemptionIntent,
        cancel: &CancellationToken,
    ) -> Result<Redemption, RedemptionError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hanko_promotions::{cart::Channel, promotions::PromotionStatus};
    use testresult::TestResult;

    use crate::{
        clock::FixedClock,
        domain::{audit::MockAuditLog, promotions::BulkAction},
        store::MockDocumentStore,
        test::{
            TestContext,
            helpers::{cart, intent, limited, spring24},
        },
    };

    use super::*;

    #[tokio::test]
    async fn redeem_applies_discount_and_updates_counters() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        let redemption = ctx
            .redemptions
            .redeem(
                intent("spring24", "key-1", "order-1", cart(Some("user-1"), 10_000)),
                &CancellationToken::new(),
            )
            .await?;

        assert!(redemption.is_applied(), "first call applies");

        let receipt = redemption.into_receipt();

        assert_eq!(receipt.discount_minor, 1_000);
        assert_eq!(receipt.user_id, "user-1");
        assert_eq!(receipt.version, promotion.version.next());

        let stored = ctx.promotions.get_promotion(promotion.id).await?;

        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.budget_spent_minor, 1_000);

        let usage = ctx
            .usage
            .get_usage(promotion.id, "user-1")
            .await?
            .ok_or("usage row missing")?;

        assert_eq!(usage.times, 1);
        assert!(usage.has_order("order-1"), "order recorded");

        let entries = ctx.audit_actions("marketing.promotion.redeem").await;

        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].metadata["cartFingerprint"],
            cart_fingerprint(&cart(Some("user-1"), 10_000))
        );

        Ok(())
    }

    #[tokio::test]
    async fn redeeming_a_scheduled_promotion_leaves_its_status_to_the_reaper() -> TestResult {
        let ctx = TestContext::new();

        let mut draft = spring24();
        draft.status = PromotionStatus::Scheduled;

        let promotion = ctx.create(draft).await;

        ctx.redemptions
            .redeem(
                intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)),
                &CancellationToken::new(),
            )
            .await?;

        let stored = ctx
            .store
            .get_promotion(promotion.id)
            .await?
            .ok_or("promotion missing")?;

        assert_eq!(stored.status, PromotionStatus::Scheduled);
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.version, promotion.version.next());

        Ok(())
    }

    #[tokio::test]
    async fn repeated_key_returns_the_original_receipt() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;
        let cancel = CancellationToken::new();

        let first = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await?;

        let second = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await?;

        assert!(!second.is_applied(), "replay does not apply again");
        assert_eq!(first.receipt(), second.receipt());
        assert_eq!(ctx.promotions.get_promotion(promotion.id).await?.usage_count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn same_order_under_a_new_key_is_rejected() -> TestResult {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;
        let cancel = CancellationToken::new();

        ctx.redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await?;

        let result = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-2", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await;

        assert_eq!(
            result,
            Err(RedemptionError::OrderAlreadyRedeemed {
                order_ref: "order-1".to_string()
            })
        );

        Ok(())
    }

    #[tokio::test]
    async fn per_customer_limit_is_reported_as_quota() -> TestResult {
        let ctx = TestContext::new();
        ctx.create(limited("ONCEEACH", 0, 1)).await;
        let cancel = CancellationToken::new();

        ctx.redemptions
            .redeem(intent("ONCEEACH", "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await?;

        let result = ctx
            .redemptions
            .redeem(intent("ONCEEACH", "key-2", "order-2", cart(Some("user-1"), 10_000)), &cancel)
            .await;

        assert!(
            matches!(result, Err(RedemptionError::QuotaExhausted { remaining: None, .. })),
            "expected QuotaExhausted, got {result:?}"
        );

        ctx.redemptions
            .redeem(intent("ONCEEACH", "key-3", "order-3", cart(Some("user-2"), 10_000)), &cancel)
            .await?;

        Ok(())
    }

    #[tokio::test]
    async fn ineligible_cart_is_rejected_with_blockers() {
        let ctx = TestContext::new();
        ctx.create(spring24()).await;

        let mut retail = cart(Some("user-1"), 10_000);
        retail.channel = Channel::Retail;

        let result = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", retail), &CancellationToken::new())
            .await;

        match result {
            Err(RedemptionError::NotEligible {
                reason: NotEligibleReason::Rules,
                blockers,
                ..
            }) => assert_eq!(blockers.len(), 1),
            other => panic!("expected NotEligible, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn paused_and_unknown_codes_are_not_found() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;
        let cancel = CancellationToken::new();

        ctx.promotions
            .bulk_transition(&Actor::staff("staff-1"), vec![promotion.id], BulkAction::Pause)
            .await?;

        assert_eq!(
            ctx.promotions.get_promotion(promotion.id).await?.status,
            PromotionStatus::Paused
        );

        for code in ["SPRING24", "UNKNOWN"] {
            let result = ctx
                .redemptions
                .redeem(intent(code, "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
                .await;

            assert!(
                matches!(
                    result,
                    Err(RedemptionError::NotEligible {
                        reason: NotEligibleReason::NotFound,
                        ..
                    })
                ),
                "expected NotFound for {code}, got {result:?}"
            );
        }

        Ok(())
    }

    #[tokio::test]
    async fn required_fields_are_checked_first() {
        let ctx = TestContext::new();
        let cancel = CancellationToken::new();

        let guest = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", cart(None, 10_000)), &cancel)
            .await;

        let no_key = ctx
            .redemptions
            .redeem(intent("SPRING24", " ", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await;

        assert_eq!(guest, Err(RedemptionError::MissingField("userId")));
        assert_eq!(no_key, Err(RedemptionError::MissingField("idempotencyKey")));
    }

    #[tokio::test]
    async fn cancelled_redemption_writes_nothing() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ctx
            .redemptions
            .redeem(intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)), &cancel)
            .await;

        assert_eq!(result, Err(RedemptionError::Cancelled));
        assert_eq!(ctx.promotions.get_promotion(promotion.id).await?.usage_count, 0);

        Ok(())
    }

    #[tokio::test]
    async fn persistent_commit_conflicts_give_up() -> TestResult {
        let promotion = spring24().into_promotion("2024-03-01T00:00:00Z".parse()?)?;
        let mut store = MockDocumentStore::new();

        store
            .expect_find_promotion_by_code()
            .returning(move |_| Ok(Some(promotion.clone())));
        store.expect_get_idempotency().returning(|_, _| Ok(None));
        store.expect_get_usage().returning(|_, _| Ok(None));
        store.expect_count_user_redemptions().returning(|_| Ok(0));
        store
            .expect_commit()
            .times(2)
            .returning(|_| Err(StoreError::PreconditionFailed("promotion")));

        let service = StoreRedemptionService::new(
            Arc::new(store),
            Arc::new(MockAuditLog::new()),
            Arc::new(FixedClock::new("2024-03-15T09:00:00Z".parse()?)),
            EngineSettings {
                max_transaction_retries: 1,
                ..EngineSettings::default()
            },
        );

        let result = service
            .redeem(
                intent("SPRING24", "key-1", "order-1", cart(Some("user-1"), 10_000)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result, Err(RedemptionError::Conflict { attempts: 2 }));

        Ok(())
    }
}
