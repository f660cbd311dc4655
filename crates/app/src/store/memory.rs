//! In-memory document store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hanko_promotions::promotions::{Promotion, PromotionCode, PromotionId};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::domain::{audit::records::AuditEntry, redemptions::records::RedemptionReceipt};

use super::{
    DocumentStore, PromotionCursor, PromotionQuery, StoreError, UsageQuery, UsageRecord,
    WriteBatch,
};

#[derive(Debug, Default)]
struct Collections {
    promotions: FxHashMap<PromotionId, Promotion>,
    usages: BTreeMap<(PromotionId, String), UsageRecord>,
    idempotency: FxHashMap<(PromotionId, String), RedemptionReceipt>,
    audit: Vec<AuditEntry>,
}

impl Collections {
    fn code_taken(&self, code: &PromotionCode, except: PromotionId) -> bool {
        self.promotions.values().any(|promotion| {
            promotion.id != except && !promotion.is_deleted() && promotion.code == *code
        })
    }

    fn check(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if let Some(write) = &batch.idempotency {
            if self
                .idempotency
                .contains_key(&(write.promotion_id, write.key.clone()))
            {
                return Err(StoreError::IdempotencyKeyExists);
            }
        }

        if let Some(write) = &batch.promotion {
            let current = self
                .promotions
                .get(&write.next.id)
                .ok_or(StoreError::PreconditionFailed("promotion"))?;

            if current.version != write.expected {
                return Err(StoreError::PreconditionFailed("promotion"));
            }

            if !write.next.is_deleted() && self.code_taken(&write.next.code, write.next.id) {
                return Err(StoreError::DuplicateCode(write.next.code.to_string()));
            }
        }

        if let Some(write) = &batch.usage {
            let revision = self
                .usages
                .get(&(write.promotion_id, write.usage.user_id.clone()))
                .map(|record| record.revision);

            if revision != write.expected_revision {
                return Err(StoreError::PreconditionFailed("usage"));
            }
        }

        Ok(())
    }
}

/// A [`DocumentStore`] held in process memory.
///
/// Every read takes a shared lock and every commit an exclusive one, so a
/// batch is checked and applied without interleaving.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_promotion(&self, id: PromotionId) -> Result<Option<Promotion>, StoreError> {
        Ok(self.collections.read().await.promotions.get(&id).cloned())
    }

    async fn find_promotion_by_code(
        &self,
        code: &PromotionCode,
    ) -> Result<Option<Promotion>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .promotions
            .values()
            .find(|promotion| !promotion.is_deleted() && promotion.code == *code)
            .cloned())
    }

    async fn list_promotions(&self, query: PromotionQuery) -> Result<Vec<Promotion>, StoreError> {
        let collections = self.collections.read().await;

        let mut promotions: Vec<&Promotion> = collections
            .promotions
            .values()
            .filter(|promotion| !promotion.is_deleted())
            .filter(|promotion| query.filter.matches(promotion, query.now))
            .filter(|promotion| {
                query
                    .after
                    .is_none_or(|cursor| cursor.precedes(promotion))
            })
            .collect();

        promotions.sort_by(|a, b| PromotionCursor::order(a, b));
        promotions.truncate(query.limit);

        Ok(promotions.into_iter().cloned().collect())
    }

    async fn insert_promotion(&self, promotion: Promotion) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;

        if collections.promotions.contains_key(&promotion.id) {
            return Err(StoreError::AlreadyExists);
        }

        if collections.code_taken(&promotion.code, promotion.id) {
            return Err(StoreError::DuplicateCode(promotion.code.to_string()));
        }

        collections.promotions.insert(promotion.id, promotion);

        Ok(())
    }

    async fn get_usage(
        &self,
        promotion_id: PromotionId,
        user_id: &str,
    ) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .usages
            .get(&(promotion_id, user_id.to_string()))
            .cloned())
    }

    async fn list_usage(&self, query: UsageQuery) -> Result<Vec<UsageRecord>, StoreError> {
        let collections = self.collections.read().await;

        let mut records: Vec<&UsageRecord> = collections
            .usages
            .range((query.promotion_id, String::new())..)
            .take_while(|((promotion_id, _), _)| *promotion_id == query.promotion_id)
            .map(|(_, record)| record)
            .filter(|record| query.admits(&record.usage))
            .collect();

        records.sort_by(|a, b| query.order(&a.usage, &b.usage));
        records.truncate(query.limit);

        Ok(records.into_iter().cloned().collect())
    }

    async fn count_user_redemptions(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .usages
            .values()
            .filter(|record| record.usage.user_id == user_id)
            .map(|record| record.usage.times)
            .sum())
    }

    async fn get_idempotency(
        &self,
        promotion_id: PromotionId,
        key: &str,
    ) -> Result<Option<RedemptionReceipt>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .idempotency
            .get(&(promotion_id, key.to_string()))
            .cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;

        collections.check(&batch)?;

        if let Some(write) = batch.promotion {
            collections.promotions.insert(write.next.id, write.next);
        }

        if let Some(write) = batch.usage {
            let revision = write.expected_revision.map_or(1, |revision| revision + 1);

            collections.usages.insert(
                (write.promotion_id, write.usage.user_id.clone()),
                UsageRecord {
                    promotion_id: write.promotion_id,
                    usage: write.usage,
                    revision,
                },
            );
        }

        if let Some(write) = batch.idempotency {
            collections
                .idempotency
                .insert((write.promotion_id, write.key), write.receipt);
        }

        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.collections.write().await.audit.push(entry);

        Ok(())
    }

    async fn list_audit(&self, target_ref: Option<String>) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .audit
            .iter()
            .filter(|entry| {
                target_ref
                    .as_deref()
                    .is_none_or(|target| entry.target_ref == target)
            })
            .cloned()
            .collect())
    }
}
