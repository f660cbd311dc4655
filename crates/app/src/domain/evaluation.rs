//! Evaluation pipeline shared by the validator and redemption.

use hanko_promotions::{
    cart::CartContext,
    promotions::{Promotion, PromotionCode},
    rules::{self, RuleInput, RuleReport},
    usage::UsageSnapshot,
};
use jiff::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    guard::{CallError, guarded},
    settings::EngineSettings,
    store::{DocumentStore, UsageRecord},
};

/// Rule report and the usage facts it was computed from.
#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub(crate) usage: Option<UsageRecord>,
    pub(crate) report: RuleReport,
}

/// The non-deleted promotion holding `code`, as stored.
pub(crate) async fn find_stored_promotion(
    store: &dyn DocumentStore,
    code: &PromotionCode,
    settings: &EngineSettings,
    cancel: &CancellationToken,
) -> Result<Option<Promotion>, CallError> {
    guarded(
        cancel,
        settings.read_timeout,
        store.find_promotion_by_code(code),
    )
    .await
}

/// The non-deleted promotion holding `code`, settled at `now`.
pub(crate) async fn find_promotion(
    store: &dyn DocumentStore,
    code: &PromotionCode,
    now: Timestamp,
    settings: &EngineSettings,
    cancel: &CancellationToken,
) -> Result<Option<Promotion>, CallError> {
    let promotion = find_stored_promotion(store, code, settings, cancel).await?;

    Ok(promotion.map(|promotion| promotion.settled(now)))
}

/// Read the cart customer's usage and run every rule.
pub(crate) async fn evaluate_cart(
    store: &dyn DocumentStore,
    promotion: &Promotion,
    cart: &CartContext,
    now: Timestamp,
    settings: &EngineSettings,
    cancel: &CancellationToken,
) -> Result<Evaluation, CallError> {
    let (usage, prior_redemptions) = match cart.user_id.as_deref() {
        Some(user_id) => {
            let usage = guarded(
                cancel,
                settings.read_timeout,
                store.get_usage(promotion.id, user_id),
            )
            .await?;

            let prior = guarded(
                cancel,
                settings.read_timeout,
                store.count_user_redemptions(user_id),
            )
            .await?;

            (usage, prior)
        }
        None => (None, 0),
    };

    let report = rules::evaluate(&RuleInput {
        promotion,
        cart,
        now,
        usage: UsageSnapshot::from_usage(usage.as_ref().map(|record| &record.usage), prior_redemptions),
        settings: settings.evaluation,
    });

    debug!(
        promotion_code = %promotion.code,
        eligible = report.eligible(),
        blockers = report.blockers().count(),
        "evaluated promotion rules"
    );

    Ok(Evaluation { usage, report })
}
