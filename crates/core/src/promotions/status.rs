//! Promotion lifecycle

use std::fmt::{Display, Formatter, Result as FmtResult};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Schedule;

/// Lifecycle state of a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    /// Being edited; never offered to carts.
    Draft,

    /// Approved and waiting for its window to open.
    Scheduled,

    /// Live.
    Active,

    /// Temporarily withdrawn.
    Paused,

    /// Finished. Terminal.
    Expired,
}

impl PromotionStatus {
    /// Stable snake case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Expired => "expired",
        }
    }

    /// Whether a promotion may move from `self` to `next`.
    ///
    /// Staying in the same state is always allowed. Any non-terminal state may
    /// jump straight to `expired`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self as u8 == next as u8 {
            return true;
        }

        matches!(
            (self, next),
            (Self::Draft, Self::Scheduled | Self::Active)
                | (Self::Scheduled, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (
                    Self::Draft | Self::Scheduled | Self::Active | Self::Paused,
                    Self::Expired
                )
        )
    }

    /// The status once the schedule has been applied at `now`.
    ///
    /// Scheduled promotions become active inside their window, and scheduled
    /// or active promotions expire once the window has closed. Other states
    /// are left alone.
    pub fn settle(self, schedule: &Schedule, now: Timestamp) -> Self {
        match self {
            Self::Scheduled | Self::Active if now >= schedule.ends_at => Self::Expired,
            Self::Scheduled if now >= schedule.starts_at => Self::Active,
            other => other,
        }
    }
}

impl Display for PromotionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use testresult::TestResult;

    use super::{PromotionStatus::*, *};

    #[test]
    fn allowed_transitions() {
        assert!(Draft.can_transition_to(Scheduled), "draft -> scheduled");
        assert!(Draft.can_transition_to(Active), "draft -> active");
        assert!(Scheduled.can_transition_to(Active), "scheduled -> active");
        assert!(Active.can_transition_to(Paused), "active -> paused");
        assert!(Paused.can_transition_to(Active), "paused -> active");
        assert!(Paused.can_transition_to(Expired), "paused -> expired");
        assert!(Active.can_transition_to(Active), "no-op");
    }

    #[test]
    fn forbidden_transitions() {
        assert!(!Active.can_transition_to(Draft), "active -> draft");
        assert!(!Expired.can_transition_to(Active), "expired is terminal");
        assert!(!Expired.can_transition_to(Draft), "expired is terminal");
        assert!(!Draft.can_transition_to(Paused), "draft -> paused");
        assert!(!Scheduled.can_transition_to(Paused), "scheduled -> paused");
    }

    #[test]
    fn settle_follows_the_window() -> TestResult {
        let starts_at: Timestamp = "2024-03-01T00:00:00Z".parse()?;
        let schedule = Schedule {
            starts_at,
            ends_at: starts_at.checked_add(24.hours())?,
        };

        assert_eq!(Scheduled.settle(&schedule, starts_at.checked_sub(1.second())?), Scheduled);
        assert_eq!(Scheduled.settle(&schedule, starts_at), Active);
        assert_eq!(Active.settle(&schedule, schedule.ends_at), Expired);
        assert_eq!(Scheduled.settle(&schedule, schedule.ends_at), Expired);
        assert_eq!(Paused.settle(&schedule, schedule.ends_at), Paused);
        assert_eq!(Draft.settle(&schedule, starts_at), Draft);

        Ok(())
    }
}
