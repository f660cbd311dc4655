//! App Context

use std::{path::Path, sync::Arc};

use thiserror::Error;

use crate::{
    clock::Clock,
    domain::{
        audit::{AuditLog, StoreAuditLog},
        promotions::{PromotionsService, StorePromotionsService},
        redemptions::{RedemptionService, StoreRedemptionService},
        usage::{StoreUsageLedger, UsageLedger},
        validation::{StoreValidationService, ValidationService},
    },
    fixtures::{FixtureError, FixtureSet},
    reaper::ScheduleReaper,
    settings::EngineSettings,
    store::{DocumentStore, MemoryStore},
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to load fixtures")]
    Fixtures(#[from] FixtureError),
}

/// Every engine service wired over one store and clock.
#[derive(Clone)]
pub struct AppContext {
    pub settings: EngineSettings,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditLog>,
    pub promotions: Arc<dyn PromotionsService>,
    pub validation: Arc<dyn ValidationService>,
    pub redemptions: Arc<dyn RedemptionService>,
    pub usage: Arc<dyn UsageLedger>,
    pub reaper: ScheduleReaper,
}

impl AppContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let audit: Arc<dyn AuditLog> = Arc::new(StoreAuditLog::new(Arc::clone(&store)));

        Self {
            promotions: Arc::new(StorePromotionsService::new(
                Arc::clone(&store),
                Arc::clone(&audit),
                Arc::clone(&clock),
                settings,
            )),
            validation: Arc::new(StoreValidationService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                settings,
            )),
            redemptions: Arc::new(StoreRedemptionService::new(
                Arc::clone(&store),
                Arc::clone(&audit),
                Arc::clone(&clock),
                settings,
            )),
            usage: Arc::new(StoreUsageLedger::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                settings,
            )),
            reaper: ScheduleReaper::new(Arc::clone(&store), Arc::clone(&clock), settings),
            audit,
            settings,
            store,
            clock,
        }
    }

    /// Services over a fresh, empty in-memory store.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self::new(Arc::new(MemoryStore::new()), clock, settings)
    }

    /// Services over an in-memory store seeded from a YAML fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error when the fixtures cannot be read, parsed or seeded.
    pub async fn from_fixtures(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Result<Self, AppInitError> {
        let context = Self::in_memory(clock, settings);

        FixtureSet::load(path)?
            .seed(context.store.as_ref(), context.clock.now())
            .await?;

        Ok(context)
    }
}
