//! YAML fixture sets used to seed a store.

use std::{io, path::Path};

use hanko_promotions::{
    promotions::{CodeError, InvalidPromotion, Promotion, PromotionCode, PromotionDraft},
    usage::PromotionUsage,
};
use jiff::Timestamp;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::store::{DocumentStore, StoreError, UsageWrite, WriteBatch};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixtures from {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse fixtures")]
    Parse(#[from] serde_norway::Error),

    #[error("fixture promotion {code} is invalid")]
    Promotion {
        code: String,
        #[source]
        source: InvalidPromotion,
    },

    #[error("usage fixture refers to unknown promotion {0}")]
    UnknownCode(String),

    #[error("invalid promotion code in usage fixture")]
    InvalidCode(#[from] CodeError),

    #[error("failed to seed store")]
    Store(#[from] StoreError),
}

/// One recorded order in a usage fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureOrder {
    #[serde(rename = "ref")]
    pub order_ref: String,
    pub at: Timestamp,
}

/// Prior redemptions of one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureUsage {
    pub code: String,
    pub user_id: String,

    #[serde(default)]
    pub orders: Vec<FixtureOrder>,

    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixtureSet {
    pub promotions: Vec<PromotionDraft>,
    pub usages: Vec<FixtureUsage>,
}

impl FixtureSet {
    /// Parse a fixture set from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Parse`] for malformed YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, FixtureError> {
        Ok(serde_norway::from_str(yaml)?)
    }

    /// Read and parse a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();

        let yaml = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml(&yaml)
    }

    /// Insert every promotion and usage row; promotion counters include the
    /// seeded usage.
    ///
    /// # Errors
    ///
    /// Returns an error when a definition is invalid, a usage row names an
    /// unknown code, or the store rejects a write.
    pub async fn seed(
        self,
        store: &dyn DocumentStore,
        now: Timestamp,
    ) -> Result<Vec<Promotion>, FixtureError> {
        let mut promotions = Vec::with_capacity(self.promotions.len());
        let mut by_code = FxHashMap::default();

        for draft in self.promotions {
            let code = draft.code.clone();

            let promotion = draft
                .into_promotion(now)
                .map_err(|source| FixtureError::Promotion { code, source })?;

            by_code.insert(promotion.code.clone(), promotions.len());
            promotions.push(promotion);
        }

        let mut rows = Vec::with_capacity(self.usages.len());

        for fixture in self.usages {
            let code = PromotionCode::parse(&fixture.code)?;

            let promotion = by_code
                .get(&code)
                .and_then(|index| promotions.get_mut(*index))
                .ok_or_else(|| FixtureError::UnknownCode(code.to_string()))?;

            let mut usage = PromotionUsage::new(fixture.user_id);
            usage.blocked = fixture.blocked;

            for order in &fixture.orders {
                if usage.record(&order.order_ref, order.at) {
                    promotion.usage_count = promotion.usage_count.saturating_add(1);
                }
            }

            rows.push(UsageWrite {
                promotion_id: promotion.id,
                usage,
                expected_revision: None,
            });
        }

        for promotion in &promotions {
            store.insert_promotion(promotion.clone()).await?;
        }

        for row in rows {
            store
                .commit(WriteBatch {
                    usage: Some(row),
                    ..WriteBatch::default()
                })
                .await?;
        }

        info!(promotions = promotions.len(), "seeded fixtures");

        Ok(promotions)
    }
}
