//! Engine settings
//!
//! Plain values injected into every service at start-up. The services never
//! read the environment themselves.

use std::time::Duration;

use hanko_promotions::{locale::Locale, rules::EvaluationSettings, stacking::StackingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Bound on single reads.
    pub read_timeout: Duration,

    /// Bound on each commit attempt.
    pub transaction_timeout: Duration,

    /// Commit attempts after the first before giving up.
    pub max_transaction_retries: u32,

    /// Locale of rendered messages.
    pub locale: Locale,

    pub evaluation: EvaluationSettings,
    pub stacking: StackingPolicy,

    /// Pause between reaper sweeps.
    pub reaper_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(5_000),
            transaction_timeout: Duration::from_millis(10_000),
            max_transaction_retries: 5,
            locale: Locale::Ja,
            evaluation: EvaluationSettings::default(),
            stacking: StackingPolicy::default(),
            reaper_interval: Duration::from_secs(60),
        }
    }
}
