//! Usage Ledger Service

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use hanko_promotions::{
    promotions::{Promotion, PromotionId},
    usage::PromotionUsage,
};
use jiff::Timestamp;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{Span, info, warn};

use crate::{
    clock::Clock,
    domain::usage::{UsageError, UsageQuota},
    guard::{CallError, backoff, bounded},
    pagination::{Page, PageRequest, PageTokenError, USAGE_PAGES, decode_token},
    settings::EngineSettings,
    store::{
        DocumentStore, PromotionWrite, StoreError, UsageCursor, UsageQuery, UsageSort, UsageWrite,
        WriteBatch,
    },
};

/// Usage listing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageListRequest {
    /// Only rows redeemed at least this often.
    pub min_times: u64,
    pub sort_by: UsageSort,
    pub descending: bool,
    pub page: PageRequest,
}

/// A change applied to one usage row.
#[derive(Debug, Clone, Copy)]
enum UsageChange<'a> {
    Record { order_ref: &'a str, at: Timestamp },
    Forget { order_ref: &'a str },
    Block { blocked: bool, notes: Option<&'a str> },
}

impl UsageChange<'_> {
    /// Refuse a new redemption that would break a cap of `promotion`.
    fn check_quota(self, promotion: &Promotion, usage: &PromotionUsage) -> Result<(), UsageError> {
        let Self::Record { order_ref, .. } = self else {
            return Ok(());
        };

        if usage.has_order(order_ref) {
            return Ok(());
        }

        if usage.blocked {
            return Err(UsageError::QuotaExhausted(UsageQuota::Blocked));
        }

        if promotion.remaining_total() == Some(0) {
            return Err(UsageError::QuotaExhausted(UsageQuota::Total));
        }

        if promotion.usage_limit_per_customer > 0
            && usage.times >= promotion.usage_limit_per_customer
        {
            return Err(UsageError::QuotaExhausted(UsageQuota::PerCustomer));
        }

        Ok(())
    }

    /// Apply to `usage`; returns the change in `times`, or `None` when nothing changed.
    fn apply(self, usage: &mut PromotionUsage) -> Option<i64> {
        match self {
            Self::Record { order_ref, at } => usage.record(order_ref, at).then_some(1),
            Self::Forget { order_ref } => usage.forget(order_ref).then_some(-1),
            Self::Block { blocked, notes } => {
                let notes_changed = notes.is_some_and(|notes| notes != usage.notes);

                if usage.blocked == blocked && !notes_changed {
                    return None;
                }

                usage.blocked = blocked;

                if let Some(notes) = notes {
                    notes.clone_into(&mut usage.notes);
                }

                Some(0)
            }
        }
    }
}

#[derive(Clone)]
pub struct StoreUsageLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl StoreUsageLedger {
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

    /// Read, change and conditionally write a usage row, retrying on conflict.
    async fn change(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        change: UsageChange<'_>,
    ) -> Result<PromotionUsage, UsageError> {
        let mut attempt = 0;

        loop {
            let limit = self.settings.read_timeout;

            let promotion = bounded(limit, self.store.get_promotion(promotion_id))
                .await?
                .ok_or(UsageError::PromotionNotFound)?;

            let record = bounded(limit, self.store.get_usage(promotion_id, user_id)).await?;

            let mut usage = match (&record, change) {
                (Some(record), _) => record.usage.clone(),
                (None, UsageChange::Forget { .. }) => return Err(UsageError::NotFound),
                (None, _) => PromotionUsage::new(user_id),
            };

            change.check_quota(&promotion, &usage)?;

            let Some(delta) = change.apply(&mut usage) else {
                return Ok(usage);
            };

            let usage_write = UsageWrite {
                promotion_id,
                usage: usage.clone(),
                expected_revision: record.as_ref().map(|record| record.revision),
            };

            let batch = if delta == 0 {
                WriteBatch {
                    usage: Some(usage_write),
                    ..WriteBatch::default()
                }
            } else {
                let mut next = promotion.clone();

                next.usage_count = if delta > 0 {
                    next.usage_count.saturating_add(1)
                } else {
                    next.usage_count.saturating_sub(1)
                };
                next.version = promotion.version.next();
                next.updated_at = self.clock.now();

                WriteBatch {
                    promotion: Some(PromotionWrite {
                        next,
                        expected: promotion.version,
                    }),
                    ..WriteBatch::default()
                }
                .with_usage(usage_write)
            };

            match bounded(self.settings.transaction_timeout, self.store.commit(batch)).await {
                Ok(()) => return Ok(usage),
                Err(CallError::Store(StoreError::PreconditionFailed(what)))
                    if attempt < self.settings.max_transaction_retries =>
                {
                    attempt += 1;

                    warn!(%promotion_id, attempt, conflict = what, "usage write conflicted, retrying");

                    backoff(attempt).await;
                }
                Err(CallError::Store(StoreError::PreconditionFailed(_))) => {
                    return Err(UsageError::Conflict {
                        attempts: attempt + 1,
                    });
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl Debug for StoreUsageLedger {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StoreUsageLedger")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, UsageError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(UsageError::MissingField(field));
    }

    Ok(value)
}

#[async_trait]
impl UsageLedger for StoreUsageLedger {
    #[tracing::instrument(
        name = "usage.ledger.increment_usage",
        skip(self),
        fields(times = tracing::field::Empty),
        err
    )]
    async fn increment_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        order_ref: &str,
        at: Timestamp,
    ) -> Result<PromotionUsage, UsageError> {
        let user_id = require("userId", user_id)?;
        let order_ref = require("orderRef", order_ref)?;

        let usage = self
            .change(promotion_id, user_id, UsageChange::Record { order_ref, at })
            .await?;

        Span::current().record("times", usage.times);

        info!(%promotion_id, user_id, order_ref, "incremented usage");

        Ok(usage)
    }

    #[tracing::instrument(
        name = "usage.ledger.remove_usage",
        skip(self),
        fields(times = tracing::field::Empty),
        err
    )]
    async fn remove_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        order_ref: &str,
    ) -> Result<PromotionUsage, UsageError> {
        let user_id = require("userId", user_id)?;
        let order_ref = require("orderRef", order_ref)?;

        let usage = self
            .change(promotion_id, user_id, UsageChange::Forget { order_ref })
            .await?;

        Span::current().record("times", usage.times);

        info!(%promotion_id, user_id, order_ref, "removed usage");

        Ok(usage)
    }

    #[tracing::instrument(name = "usage.ledger.set_blocked", skip(self, notes), err)]
    async fn set_blocked(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        blocked: bool,
        notes: Option<String>,
    ) -> Result<PromotionUsage, UsageError> {
        let user_id = require("userId", user_id)?;

        let change = UsageChange::Block {
            blocked,
            notes: notes.as_deref(),
        };

        let usage = self.change(promotion_id, user_id, change).await?;

        info!(%promotion_id, user_id, blocked, "updated usage flags");

        Ok(usage)
    }

    async fn get_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
    ) -> Result<Option<PromotionUsage>, UsageError> {
        let user_id = require("userId", user_id)?;

        let record = bounded(
            self.settings.read_timeout,
            self.store.get_usage(promotion_id, user_id),
        )
        .await?;

        Ok(record.map(|record| record.usage))
    }

    #[tracing::instrument(
        name = "usage.ledger.list_usage",
        skip(self, request),
        fields(sort_by = request.sort_by.as_str(), returned = tracing::field::Empty),
        err
    )]
    async fn list_usage(
        &self,
        promotion_id: PromotionId,
        request: UsageListRequest,
    ) -> Result<Page<PromotionUsage>, UsageError> {
        let size = request.page.size(USAGE_PAGES);

        let after = request
            .page
            .token()
            .map(|token| {
                let (sort_value, user_id) = decode_token(token)?;

                let sort_value = sort_value
                    .parse()
                    .map_err(|_error| PageTokenError::Malformed)?;

                Ok::<_, UsageError>(UsageCursor {
                    sort_value,
                    user_id,
                })
            })
            .transpose()?;

        let query = UsageQuery {
            promotion_id,
            min_times: request.min_times,
            sort: request.sort_by,
            descending: request.descending,
            after,
            limit: size.saturating_add(1),
        };

        let records = bounded(self.settings.read_timeout, self.store.list_usage(query)).await?;

        let sort = request.sort_by;

        let page = Page::from_overfetch(
            records.into_iter().map(|record| record.usage).collect(),
            size,
            |usage: &PromotionUsage| (sort.sort_value(usage).to_string(), usage.user_id.clone()),
        );

        Span::current().record("returned", page.items.len());

        Ok(page)
    }
}

#[automock]
#[async_trait]
/// The only writer of per-customer usage rows.
pub trait UsageLedger: Send + Sync {
    /// Record that `user_id` redeemed the promotion on `order_ref`. Recording
    /// the same order twice changes nothing; a new order past the total or
    /// per-customer limit, or for a blocked customer, is refused.
    async fn increment_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        order_ref: &str,
        at: Timestamp,
    ) -> Result<PromotionUsage, UsageError>;

    /// Reverse a recorded redemption, e.g. after an order is cancelled.
    async fn remove_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        order_ref: &str,
    ) -> Result<PromotionUsage, UsageError>;

    /// Suppress or re-allow one customer for one promotion.
    async fn set_blocked(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
        blocked: bool,
        notes: Option<String>,
    ) -> Result<PromotionUsage, UsageError>;

    async fn get_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
    ) -> Result<Option<PromotionUsage>, UsageError>;

    async fn list_usage(
        &self,
        promotion_id: PromotionId,
        request: UsageListRequest,
    ) -> Result<Page<PromotionUsage>, UsageError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jiff::ToSpan;
    use testresult::TestResult;

    use crate::{
        clock::FixedClock,
        store::MockDocumentStore,
        test::{
            TestContext,
            helpers::{limited, spring24},
        },
    };

    use super::*;

    #[tokio::test]
    async fn increment_usage_records_order_and_counts_once() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;
        let now = ctx.now();

        let usage = ctx
            .usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        assert_eq!(usage.times, 1);
        assert_eq!(usage.first_used_at, Some(now));

        let again = ctx
            .usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        assert_eq!(again.times, 1, "same order is recorded once");

        let stored = ctx.promotions.get_promotion(promotion.id).await?;

        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.version, promotion.version.next());

        Ok(())
    }

    #[tokio::test]
    async fn increment_usage_stops_at_the_total_limit() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(limited("ONCE1", 1, 1)).await;
        let now = ctx.now();

        ctx.usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        let again = ctx
            .usage
            .increment_usage(promotion.id, "user-1", "order-2", now)
            .await;

        assert_eq!(again, Err(UsageError::QuotaExhausted(UsageQuota::Total)));

        let other = ctx
            .usage
            .increment_usage(promotion.id, "user-2", "order-3", now)
            .await;

        assert_eq!(other, Err(UsageError::QuotaExhausted(UsageQuota::Total)));

        let replay = ctx
            .usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        assert_eq!(replay.times, 1, "recorded order is still a no-op");

        let stored = ctx.promotions.get_promotion(promotion.id).await?;

        assert_eq!(stored.usage_count, 1);
        assert_eq!(
            ctx.usage.get_usage(promotion.id, "user-1").await?.map(|usage| usage.times),
            Some(1)
        );

        Ok(())
    }

    #[tokio::test]
    async fn increment_usage_respects_per_customer_limit_and_blocks() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(limited("PER1", 0, 1)).await;
        let now = ctx.now();

        ctx.usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        let result = ctx
            .usage
            .increment_usage(promotion.id, "user-1", "order-2", now)
            .await;

        assert_eq!(result, Err(UsageError::QuotaExhausted(UsageQuota::PerCustomer)));

        ctx.usage.set_blocked(promotion.id, "user-2", true, None).await?;

        let blocked = ctx
            .usage
            .increment_usage(promotion.id, "user-2", "order-3", now)
            .await;

        assert_eq!(blocked, Err(UsageError::QuotaExhausted(UsageQuota::Blocked)));
        assert_eq!(
            blocked.map_err(|error| error.kind()),
            Err(hanko_promotions::errors::ErrorKind::QuotaExhausted)
        );
        assert_eq!(ctx.promotions.get_promotion(promotion.id).await?.usage_count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn remove_usage_restores_counters() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;
        let now = ctx.now();

        ctx.usage
            .increment_usage(promotion.id, "user-1", "order-1", now)
            .await?;

        let usage = ctx.usage.remove_usage(promotion.id, "user-1", "order-1").await?;

        assert_eq!(usage.times, 0);
        assert!(!usage.has_order("order-1"), "order is forgotten");
        assert_eq!(ctx.promotions.get_promotion(promotion.id).await?.usage_count, 0);

        Ok(())
    }

    #[tokio::test]
    async fn remove_usage_without_row_is_not_found() {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        let result = ctx.usage.remove_usage(promotion.id, "user-1", "order-1").await;

        assert!(
            matches!(result, Err(UsageError::NotFound)),
            "expected NotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn increment_usage_for_unknown_promotion_is_not_found() {
        let ctx = TestContext::new();

        let result = ctx
            .usage
            .increment_usage(PromotionId::new(), "user-1", "order-1", ctx.now())
            .await;

        assert!(
            matches!(result, Err(UsageError::PromotionNotFound)),
            "expected PromotionNotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn blank_identifiers_are_rejected() {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        let result = ctx
            .usage
            .increment_usage(promotion.id, " ", "order-1", ctx.now())
            .await;

        assert_eq!(result, Err(UsageError::MissingField("userId")));
    }

    #[tokio::test]
    async fn set_blocked_keeps_counters() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;

        ctx.usage
            .increment_usage(promotion.id, "user-1", "order-1", ctx.now())
            .await?;

        let usage = ctx
            .usage
            .set_blocked(promotion.id, "user-1", true, Some("chargeback".to_string()))
            .await?;

        assert!(usage.blocked, "row is blocked");
        assert_eq!(usage.notes, "chargeback");
        assert_eq!(usage.times, 1);
        assert_eq!(ctx.promotions.get_promotion(promotion.id).await?.usage_count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn list_usage_filters_sorts_and_pages() -> TestResult {
        let ctx = TestContext::new();
        let promotion = ctx.create(spring24()).await;
        let start = ctx.now();

        for (user, orders) in [("user-a", 1), ("user-b", 3), ("user-c", 2), ("user-d", 2)] {
            for order in 0..orders {
                let at = start.checked_add(order.hours())?;

                ctx.usage
                    .increment_usage(promotion.id, user, &format!("{user}-{order}"), at)
                    .await?;
            }
        }

        let mut users = Vec::new();
        let mut token = None;

        loop {
            let page = ctx
                .usage
                .list_usage(
                    promotion.id,
                    UsageListRequest {
                        min_times: 2,
                        sort_by: UsageSort::Times,
                        descending: true,
                        page: PageRequest { token, size: Some(2) },
                    },
                )
                .await?;

            users.extend(page.items.into_iter().map(|usage| usage.user_id));

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(users, vec!["user-b", "user-d", "user-c"]);

        Ok(())
    }

    #[tokio::test]
    async fn persistent_conflicts_are_reported() -> TestResult {
        let promotion = spring24().into_promotion("2024-03-01T00:00:00Z".parse()?)?;
        let mut store = MockDocumentStore::new();

        store
            .expect_get_promotion()
            .returning(move |_| Ok(Some(promotion.clone())));
        store.expect_get_usage().returning(|_, _| Ok(None));
        store
            .expect_commit()
            .times(3)
            .returning(|_| Err(StoreError::PreconditionFailed("promotion")));

        let ledger = StoreUsageLedger::new(
            Arc::new(store),
            Arc::new(FixedClock::new("2024-03-15T09:00:00Z".parse()?)),
            EngineSettings {
                max_transaction_retries: 2,
                ..EngineSettings::default()
            },
        );

        let result = ledger
            .increment_usage(PromotionId::new(), "user-1", "order-1", "2024-03-15T09:00:00Z".parse()?)
            .await;

        assert_eq!(result, Err(UsageError::Conflict { attempts: 3 }));

        Ok(())
    }

    #[tokio::test]
    async fn unavailable_store_is_not_retried() -> TestResult {
        let mut store = MockDocumentStore::new();

        store
            .expect_get_promotion()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("maintenance".to_string())));

        let ledger = StoreUsageLedger::new(
            Arc::new(store),
            Arc::new(FixedClock::new("2024-03-15T09:00:00Z".parse()?)),
            EngineSettings::default(),
        );

        let result = ledger
            .set_blocked(PromotionId::new(), "user-1", true, None)
            .await;

        assert!(
            matches!(result, Err(UsageError::Unavailable(_))),
            "expected Unavailable, got {result:?}"
        );

        Ok(())
    }
}
