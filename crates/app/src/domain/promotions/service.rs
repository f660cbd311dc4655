//! Promotions Service

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use hanko_promotions::promotions::{
    Promotion, PromotionCode, PromotionDraft, PromotionId, PromotionPatch, PromotionStatus,
    Version, code::MAX_CODE_LEN,
};
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value, json};
use tracing::{Span, info, warn};

use crate::{
    clock::Clock,
    domain::{
        audit::{Actor, AuditEntry, AuditLog, records::promotion_ref, service::record_quietly},
        promotions::{
            CatalogError,
            models::{BulkAction, BulkReport},
        },
    },
    guard::bounded,
    pagination::{CATALOG_PAGES, Page, PageRequest, PageTokenError, decode_token},
    settings::EngineSettings,
    store::{DocumentStore, PromotionCursor, PromotionFilter, PromotionQuery, WriteBatch},
};

/// Fields left out of audit diffs; they move on every write.
const UNAUDITED_FIELDS: [&str; 5] = [
    "version",
    "createdAt",
    "updatedAt",
    "usageCount",
    "budgetSpentMinor",
];

/// Copy codes tried before a clone gives up.
const MAX_COPY_ATTEMPTS: u32 = 50;

#[derive(Clone)]
pub struct StorePromotionsService {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl StorePromotionsService {
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

    /// The stored, non-deleted promotion.
    async fn load(&self, id: PromotionId) -> Result<Promotion, CatalogError> {
        bounded(self.settings.read_timeout, self.store.get_promotion(id))
            .await?
            .filter(|promotion| !promotion.is_deleted())
            .ok_or(CatalogError::NotFound)
    }

    /// Replace `current` with `next`, bumping version and timestamp.
    async fn replace(
        &self,
        current: &Promotion,
        mut next: Promotion,
        now: Timestamp,
    ) -> Result<Promotion, CatalogError> {
        next.version = current.version.next();
        next.updated_at = now;

        bounded(
            self.settings.transaction_timeout,
            self.store.commit(WriteBatch::promotion(next.clone(), current.version)),
        )
        .await?;

        Ok(next)
    }

    async fn set_status(
        &self,
        current: &Promotion,
        status: PromotionStatus,
        now: Timestamp,
    ) -> Result<Promotion, CatalogError> {
        let patch = PromotionPatch {
            status: Some(status),
            ..PromotionPatch::default()
        };

        let next = current.patched(patch, now)?;

        self.replace(current, next, now).await
    }

    async fn soft_delete(&self, current: &Promotion, now: Timestamp) -> Result<(), CatalogError> {
        let mut next = current.clone();
        next.deleted_at = Some(now);

        self.replace(current, next, now).await?;

        Ok(())
    }

    /// Insert a draft copy of `source` under the first free `-COPY` code.
    async fn clone_promotion(
        &self,
        source: &Promotion,
        now: Timestamp,
    ) -> Result<Promotion, CatalogError> {
        for attempt in 1..=MAX_COPY_ATTEMPTS {
            let code = PromotionCode::parse(&copy_code(&source.code, attempt))?;

            let taken = bounded(
                self.settings.read_timeout,
                self.store.find_promotion_by_code(&code),
            )
            .await?
            .is_some();

            if taken {
                continue;
            }

            let mut draft = PromotionDraft::from_promotion(source);
            draft.code = code.to_string();

            let copy = draft.into_promotion(now)?;

            match bounded(
                self.settings.transaction_timeout,
                self.store.insert_promotion(copy.clone()),
            )
            .await
            {
                Ok(()) => return Ok(copy),
                Err(error) => match CatalogError::from(error) {
                    CatalogError::DuplicateCode(_) => {}
                    error => return Err(error),
                },
            }
        }

        Err(CatalogError::DuplicateCode(copy_code(
            &source.code,
            MAX_COPY_ATTEMPTS,
        )))
    }

    async fn audit(
        &self,
        actor: &Actor,
        action: &str,
        target_ref: String,
        metadata: Value,
        at: Timestamp,
    ) {
        let entry = AuditEntry::new(actor, action, target_ref, metadata, at);

        record_quietly(self.audit.as_ref(), entry).await;
    }
}

impl Debug for StorePromotionsService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StorePromotionsService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// `<CODE>-COPY`, then `<CODE>-COPY-2` and so on, cut to fit the code length limit.
fn copy_code(code: &PromotionCode, attempt: u32) -> String {
    let suffix = if attempt <= 1 {
        "-COPY".to_string()
    } else {
        format!("-COPY-{attempt}")
    };

    let keep = MAX_CODE_LEN.saturating_sub(suffix.len());
    let base: String = code.as_str().chars().take(keep).collect();

    format!("{base}{suffix}")
}

/// Changed top-level fields as `{field: {from, to}}`.
fn field_diff(before: &Promotion, after: &Promotion) -> Value {
    let (Ok(Value::Object(before)), Ok(Value::Object(after))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return Value::Null;
    };

    let mut changes = Map::new();

    for (field, to) in &after {
        if UNAUDITED_FIELDS.contains(&field.as_str()) {
            continue;
        }

        let from = before.get(field).unwrap_or(&Value::Null);

        if from != to {
            changes.insert(field.clone(), json!({ "from": from, "to": to }));
        }
    }

    Value::Object(changes)
}

fn decode_cursor(token: &str) -> Result<PromotionCursor, PageTokenError> {
    let (starts_at, id) = decode_token(token)?;

    let starts_at = starts_at
        .parse::<Timestamp>()
        .map_err(|_error| PageTokenError::Malformed)?;

    let id = id.parse().map_err(|_error| PageTokenError::Malformed)?;

    Ok(PromotionCursor { starts_at, id })
}

#[async_trait]
impl PromotionsService for StorePromotionsService {
    #[tracing::instrument(
        name = "promotions.service.create_promotion",
        skip(self, draft),
        fields(
            actor = %actor,
            promotion_id = tracing::field::Empty,
            promotion_code = tracing::field::Empty,
            promotion_kind = tracing::field::Empty
        ),
        err
    )]
    async fn create_promotion(
        &self,
        actor: &Actor,
        draft: PromotionDraft,
    ) -> Result<Promotion, CatalogError> {
        let now = self.clock.now();

        let promotion = draft.into_promotion(now)?;

        let span = Span::current();

        span.record("promotion_id", tracing::field::display(promotion.id));
        span.record("promotion_code", tracing::field::display(&promotion.code));
        span.record("promotion_kind", tracing::field::display(promotion.kind()));

        bounded(
            self.settings.transaction_timeout,
            self.store.insert_promotion(promotion.clone()),
        )
        .await?;

        self.audit(
            actor,
            "marketing.promotion.create",
            promotion_ref(promotion.id),
            json!({ "code": promotion.code, "after": promotion }),
            now,
        )
        .await;

        info!(promotion_id = %promotion.id, promotion_code = %promotion.code, "created promotion");

        Ok(promotion.settled(now))
    }

    #[tracing::instrument(
        name = "promotions.service.update_promotion",
        skip(self, patch),
        fields(actor = %actor, promotion_id = %id, version = tracing::field::Empty),
        err
    )]
    async fn update_promotion(
        &self,
        actor: &Actor,
        id: PromotionId,
        patch: PromotionPatch,
        expected: Version,
    ) -> Result<Promotion, CatalogError> {
        let now = self.clock.now();

        let current = self.load(id).await?;

        if current.version != expected {
            return Err(CatalogError::Stale {
                expected,
                actual: current.version,
            });
        }

        let next = current.patched(patch, now)?;

        let updated = self.replace(&current, next, now).await?;

        Span::current().record("version", tracing::field::display(updated.version));

        self.audit(
            actor,
            "marketing.promotion.update",
            promotion_ref(id),
            json!({ "version": updated.version, "diff": field_diff(&current, &updated) }),
            now,
        )
        .await;

        info!(promotion_id = %id, version = %updated.version, "updated promotion");

        Ok(updated)
    }

    #[tracing::instrument(
        name = "promotions.service.delete_promotion",
        skip(self),
        fields(actor = %actor),
        err
    )]
    async fn delete_promotion(
        &self,
        actor: &Actor,
        id: PromotionId,
        expected: Version,
    ) -> Result<(), CatalogError> {
        let now = self.clock.now();

        let current = self.load(id).await?;

        if current.version != expected {
            return Err(CatalogError::Stale {
                expected,
                actual: current.version,
            });
        }

        self.soft_delete(&current, now).await?;

        self.audit(
            actor,
            "marketing.promotion.delete",
            promotion_ref(id),
            json!({ "code": current.code }),
            now,
        )
        .await;

        info!(promotion_id = %id, "deleted promotion");

        Ok(())
    }

    async fn get_promotion(&self, id: PromotionId) -> Result<Promotion, CatalogError> {
        let promotion = self.load(id).await?;

        Ok(promotion.settled(self.clock.now()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Promotion, CatalogError> {
        let code = PromotionCode::parse(code)?;

        let promotion = bounded(
            self.settings.read_timeout,
            self.store.find_promotion_by_code(&code),
        )
        .await?
        .ok_or(CatalogError::NotFound)?;

        Ok(promotion.settled(self.clock.now()))
    }

    #[tracing::instrument(
        name = "promotions.service.list_promotions",
        skip(self, filter, page),
        fields(returned = tracing::field::Empty),
        err
    )]
    async fn list_promotions(
        &self,
        filter: PromotionFilter,
        page: PageRequest,
    ) -> Result<Page<Promotion>, CatalogError> {
        let now = self.clock.now();
        let size = page.size(CATALOG_PAGES);
        let after = page.token().map(decode_cursor).transpose()?;

        let query = PromotionQuery {
            filter,
            now,
            after,
            limit: size.saturating_add(1),
        };

        let promotions = bounded(self.settings.read_timeout, self.store.list_promotions(query))
            .await?
            .into_iter()
            .map(|promotion| promotion.settled(now))
            .collect();

        let page = Page::from_overfetch(promotions, size, |promotion: &Promotion| {
            (
                promotion.schedule.starts_at.to_string(),
                promotion.id.to_string(),
            )
        });

        Span::current().record("returned", page.items.len());

        Ok(page)
    }

    #[tracing::instrument(
        name = "promotions.service.bulk_transition",
        skip(self, ids),
        fields(
            actor = %actor,
            requested = ids.len(),
            affected = tracing::field::Empty,
            skipped = tracing::field::Empty
        ),
        err
    )]
    async fn bulk_transition(
        &self,
        actor: &Actor,
        ids: Vec<PromotionId>,
        action: BulkAction,
    ) -> Result<BulkReport, CatalogError> {
        let now = self.clock.now();
        let mut report = BulkReport::new(action);
        let mut seen = FxHashSet::default();

        for id in ids {
            if !seen.insert(id) {
                continue;
            }

            let current = match self.load(id).await {
                Ok(current) => current,
                Err(CatalogError::NotFound) => {
                    report.skip(id, "promotion not found");
                    continue;
                }
                Err(error) => return Err(error),
            };

            let result = match action {
                BulkAction::Activate => self
                    .set_status(&current, PromotionStatus::Active, now)
                    .await
                    .map(|_| None),
                BulkAction::Pause => self
                    .set_status(&current, PromotionStatus::Paused, now)
                    .await
                    .map(|_| None),
                BulkAction::Delete => self.soft_delete(&current, now).await.map(|()| None),
                BulkAction::Clone => self
                    .clone_promotion(&current, now)
                    .await
                    .map(|copy| Some(copy.id)),
            };

            match result {
                Ok(created) => {
                    report.affected.push(id);
                    report.created.extend(created);
                }
                Err(error @ CatalogError::Unavailable(_)) => return Err(error),
                Err(error) => {
                    warn!(promotion_id = %id, %action, %error, "bulk action skipped promotion");

                    report.skip(id, error.to_string());
                }
            }
        }

        let span = Span::current();

        span.record("affected", report.affected.len());
        span.record("skipped", report.skipped.len());

        self.audit(
            actor,
            &format!("marketing.promotion.bulk.{action}"),
            "/promotions".to_string(),
            json!({
                "affected": report.affected,
                "skipped": report.skipped,
                "created": report.created,
            }),
            now,
        )
        .await;

        info!(%action, affected = report.affected.len(), "applied bulk action");

        Ok(report)
    }
}

#[automock]
#[async_trait]
/// The promotion catalog: definitions, lifecycle and listing.
pub trait PromotionsService: Send + Sync {
    async fn create_promotion(
        &self,
        actor: &Actor,
        draft: PromotionDraft,
    ) -> Result<Promotion, CatalogError>;

    /// Apply `patch` if the stored version is still `expected`.
    async fn update_promotion(
        &self,
        actor: &Actor,
        id: PromotionId,
        patch: PromotionPatch,
        expected: Version,
    ) -> Result<Promotion, CatalogError>;

    /// Soft delete; the code becomes free for new promotions.
    async fn delete_promotion(
        &self,
        actor: &Actor,
        id: PromotionId,
        expected: Version,
    ) -> Result<(), CatalogError>;

    async fn get_promotion(&self, id: PromotionId) -> Result<Promotion, CatalogError>;

    async fn find_by_code(&self, code: &str) -> Result<Promotion, CatalogError>;

    async fn list_promotions(
        &self,
        filter: PromotionFilter,
        page: PageRequest,
    ) -> Result<Page<Promotion>, CatalogError>;

    /// Apply `action` to each promotion; failures are reported per promotion.
    async fn bulk_transition(
        &self,
        actor: &Actor,
        ids: Vec<PromotionId>,
        action: BulkAction,
    ) -> Result<BulkReport, CatalogError>;
}
