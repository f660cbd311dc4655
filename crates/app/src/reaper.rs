//! Scheduled status reaper
//!
//! Reads settle promotion statuses on the fly; the reaper persists the same
//! transitions so stored documents catch up with their windows.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use hanko_promotions::promotions::PromotionStatus;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    guard::{CallError, bounded},
    settings::EngineSettings,
    store::{DocumentStore, PromotionCursor, PromotionFilter, PromotionQuery, StoreError, WriteBatch},
};

/// Promotions read per store round trip.
const SWEEP_BATCH: usize = 100;

/// Transitions persisted by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapReport {
    pub activated: usize,
    pub expired: usize,

    /// Promotions changed concurrently; picked up on the next sweep.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ScheduleReaper {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl ScheduleReaper {
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

    /// Persist every due status transition once.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be read or written.
    #[tracing::instrument(name = "reaper.sweep", skip(self), err)]
    pub async fn sweep(&self) -> Result<ReapReport, StoreError> {
        let now = self.clock.now();
        let mut report = ReapReport::default();
        let mut after = None;

        loop {
            let query = PromotionQuery {
                filter: PromotionFilter::default(),
                now,
                after,
                limit: SWEEP_BATCH,
            };

            let batch = bounded(self.settings.read_timeout, self.store.list_promotions(query))
                .await
                .map_err(into_store_error)?;

            let Some(last) = batch.last() else {
                break;
            };

            after = Some(PromotionCursor::of(last));

            let exhausted = batch.len() < SWEEP_BATCH;

            for promotion in batch {
                let settled = promotion.effective_status(now);

                if settled == promotion.status {
                    continue;
                }

                let mut next = promotion.clone();
                next.status = settled;
                next.version = promotion.version.next();
                next.updated_at = now;

                let write = WriteBatch::promotion(next, promotion.version);

                match bounded(self.settings.transaction_timeout, self.store.commit(write)).await {
                    Ok(()) => {
                        debug!(promotion_id = %promotion.id, from = %promotion.status, to = %settled, "persisted status");

                        match settled {
                            PromotionStatus::Active => report.activated += 1,
                            PromotionStatus::Expired => report.expired += 1,
                            _ => {}
                        }
                    }
                    Err(CallError::Store(StoreError::PreconditionFailed(_))) => {
                        report.skipped += 1;
                    }
                    Err(error) => return Err(into_store_error(error)),
                }
            }

            if exhausted {
                break;
            }
        }

        if report != ReapReport::default() {
            info!(
                activated = report.activated,
                expired = report.expired,
                skipped = report.skipped,
                "reaped promotion statuses"
            );
        }

        Ok(report)
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("schedule reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.sweep().await {
                        warn!(%error, "schedule sweep failed");
                    }
                }
            }
        }
    }
}

impl Debug for ScheduleReaper {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ScheduleReaper")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn into_store_error(error: CallError) -> StoreError {
    match error {
        CallError::Store(error) => error,
        other => StoreError::Unavailable(other.to_string()),
    }
}
