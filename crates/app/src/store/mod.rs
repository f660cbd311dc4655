//! Document Store
//!
//! The persistence contract the engine consumes: a promotions collection
//! keyed by id with a secondary code lookup, per-promotion usage and
//! idempotency sub-collections, and an append-only audit collection. Multi
//! document writes go through [`DocumentStore::commit`], which applies a
//! [`WriteBatch`] atomically or not at all.

use async_trait::async_trait;
use hanko_promotions::{
    promotions::{Promotion, PromotionCode, PromotionId, Version},
    usage::PromotionUsage,
};
use mockall::automock;

use crate::domain::{audit::records::AuditEntry, redemptions::records::RedemptionReceipt};

mod errors;
pub mod memory;
pub mod query;

pub use errors::StoreError;
pub use memory::MemoryStore;
pub use query::{
    PromotionCursor, PromotionFilter, PromotionQuery, UsageCursor, UsageQuery, UsageSort,
};

/// A usage row together with its revision counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub promotion_id: PromotionId,
    pub usage: PromotionUsage,

    /// Bumped on every write; compared by [`UsageWrite::expected_revision`].
    pub revision: u64,
}

/// Replace a promotion if its stored version still matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionWrite {
    pub next: Promotion,
    pub expected: Version,
}

/// Replace a usage row if its revision still matches; `None` expects no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageWrite {
    pub promotion_id: PromotionId,
    pub usage: PromotionUsage,
    pub expected_revision: Option<u64>,
}

/// Record a receipt under a key that must not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyWrite {
    pub promotion_id: PromotionId,
    pub key: String,
    pub receipt: RedemptionReceipt,
}

/// Writes applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub promotion: Option<PromotionWrite>,
    pub usage: Option<UsageWrite>,
    pub idempotency: Option<IdempotencyWrite>,
}

impl WriteBatch {
    #[must_use]
    pub fn promotion(next: Promotion, expected: Version) -> Self {
        Self {
            promotion: Some(PromotionWrite { next, expected }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, write: UsageWrite) -> Self {
        self.usage = Some(write);
        self
    }

    #[must_use]
    pub fn with_idempotency(mut self, write: IdempotencyWrite) -> Self {
        self.idempotency = Some(write);
        self
    }
}

#[automock]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a promotion by id, including soft deleted ones.
    async fn get_promotion(&self, id: PromotionId) -> Result<Option<Promotion>, StoreError>;

    /// Fetch the non-deleted promotion holding `code`.
    async fn find_promotion_by_code(
        &self,
        code: &PromotionCode,
    ) -> Result<Option<Promotion>, StoreError>;

    /// Non-deleted promotions matching the query, ordered by `startsAt desc, id desc`.
    async fn list_promotions(&self, query: PromotionQuery) -> Result<Vec<Promotion>, StoreError>;

    /// Insert a new promotion; fails when the id or a live code is taken.
    async fn insert_promotion(&self, promotion: Promotion) -> Result<(), StoreError>;

    async fn get_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
    ) -> Result<Option<UsageRecord>, StoreError>;

    async fn list_usage(&self, query: UsageQuery) -> Result<Vec<UsageRecord>, StoreError>;

    /// Redemptions recorded for `user_id` across every promotion.
    async fn count_user_redemptions(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn get_idempotency(
        &self,
        promotion_id: PromotionId,
        key: &str,
    ) -> Result<Option<RedemptionReceipt>, StoreError>;

    /// Apply every write in `batch` atomically, checking all preconditions first.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Audit entries in append order, optionally restricted to one target.
    async fn list_audit(&self, target_ref: Option<String>) -> Result<Vec<AuditEntry>, StoreError>;
}
