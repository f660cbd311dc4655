//! Engine Config

use std::time::Duration;

use clap::Args;
use hanko_promotions::{locale::Locale, rules::EvaluationSettings, stacking::StackingPolicy};
use hanko_promotions_app::settings::EngineSettings;

/// Engine tuning, mapped onto [`EngineSettings`].
#[derive(Debug, Args)]
pub(crate) struct EngineConfig {
    /// Timeout for single store reads, in milliseconds
    #[arg(long, env = "PROMO_READ_TIMEOUT_MS", default_value_t = 5_000, global = true)]
    pub read_timeout_ms: u64,

    /// Timeout for each commit attempt, in milliseconds
    #[arg(long, env = "PROMO_TRANSACTION_TIMEOUT_MS", default_value_t = 10_000, global = true)]
    pub transaction_timeout_ms: u64,

    /// Commit retries after an optimistic lock conflict
    #[arg(long, env = "PROMO_MAX_TRANSACTION_RETRIES", default_value_t = 5, global = true)]
    pub max_transaction_retries: u32,

    /// Locale of rule messages (ja, en)
    #[arg(long, env = "PROMO_LOCALE", default_value_t = Locale::Ja, global = true)]
    pub locale: Locale,

    /// Warn when a cart leaves less than this percentage of the budget
    #[arg(
        long,
        env = "PROMO_BUDGET_WARN_PERCENT",
        default_value_t = 10,
        value_parser = clap::value_parser!(u8).range(0..=100),
        global = true
    )]
    pub budget_warn_percent: u8,

    /// Pause between schedule reaper sweeps, in seconds
    #[arg(long, env = "PROMO_REAPER_INTERVAL_SECS", default_value_t = 60, global = true)]
    pub reaper_interval_secs: u64,
}

impl EngineConfig {
    pub(crate) fn settings(&self) -> EngineSettings {
        EngineSettings {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            transaction_timeout: Duration::from_millis(self.transaction_timeout_ms),
            max_transaction_retries: self.max_transaction_retries,
            locale: self.locale,
            evaluation: EvaluationSettings {
                budget_warn_percent: self.budget_warn_percent,
            },
            stacking: StackingPolicy::default(),
            reaper_interval: Duration::from_secs(self.reaper_interval_secs),
        }
    }
}
