//! Partial promotion updates.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{cart::Channel, money::CurrencyCode};

use super::{
    Benefit, Conditions, InvalidPromotion, Promotion, PromotionCode, PromotionStatus, Schedule,
    Stacking,
};

/// Reasons a patch cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patched promotion is not valid.
    #[error(transparent)]
    Invalid(#[from] InvalidPromotion),

    /// Fields frozen once the promotion has started were changed.
    #[error("fields cannot change after the promotion has started: {}", fields.join(", "))]
    Immutable {
        /// Changed frozen fields.
        fields: Vec<&'static str>,
    },

    /// The requested status change is not allowed.
    #[error("cannot transition from {from} to {to}")]
    Transition {
        /// Current (settled) status.
        from: PromotionStatus,

        /// Requested status.
        to: PromotionStatus,
    },
}

/// Fields to change; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionPatch {
    /// New raw code.
    pub code: Option<String>,

    /// New name.
    pub name: Option<String>,

    /// New internal description.
    pub description: Option<String>,

    /// New customer facing description.
    pub public_description: Option<String>,

    /// New status; must be a legal transition.
    pub status: Option<PromotionStatus>,

    /// New benefit.
    pub benefit: Option<Benefit>,

    /// New currency.
    pub currency: Option<CurrencyCode>,

    /// New channel set.
    pub channels: Option<BTreeSet<Channel>>,

    /// New segment; an empty string clears it.
    pub segment_key: Option<String>,

    /// New eligibility tokens.
    pub eligibility_rules: Option<BTreeSet<String>>,

    /// New conditions.
    pub conditions: Option<Conditions>,

    /// New stacking behaviour.
    pub stacking: Option<Stacking>,

    /// New window.
    pub schedule: Option<Schedule>,

    /// New total limit.
    pub usage_limit_total: Option<u64>,

    /// New per-customer limit.
    pub usage_limit_per_customer: Option<u64>,

    /// New budget; `0` removes the cap.
    pub budget_minor: Option<i64>,

    /// Permit changes to fields frozen after the start date.
    pub allow_immutable_changes: bool,
}

impl PromotionPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        Self {
            allow_immutable_changes: self.allow_immutable_changes,
            ..Self::default()
        } == *self
    }
}

impl Promotion {
    /// Apply `patch` at `now`, returning the updated promotion.
    ///
    /// The status transition is checked against the settled status. Once the
    /// window has opened, `code`, `benefit`, `currency`,
    /// `usageLimitPerCustomer` and `startsAt` are frozen unless the patch
    /// explicitly allows the change. Version and timestamps are left for the
    /// caller to bump.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchError`] when the transition is illegal, a frozen
    /// field changes, or the result fails validation.
    pub fn patched(&self, patch: PromotionPatch, now: Timestamp) -> Result<Self, PatchError> {
        let current = self.clone().settled(now);
        let mut next = current.clone();

        if let Some(status) = patch.status {
            if !current.status.can_transition_to(status) {
                return Err(PatchError::Transition {
                    from: current.status,
                    to: status,
                });
            }

            next.status = status;
        }

        let mut problems = Vec::new();

        if let Some(code) = patch.code {
            match PromotionCode::parse(&code) {
                Ok(code) => next.code = code,
                Err(error) => problems.push(error.to_string()),
            }
        }

        if let Some(name) = patch.name {
            next.name = name.trim().to_string();
        }

        if let Some(description) = patch.description {
            next.description = description;
        }

        if let Some(public_description) = patch.public_description {
            next.public_description = public_description;
        }

        if let Some(benefit) = patch.benefit {
            next.benefit = benefit;
        }

        if let Some(currency) = patch.currency {
            next.currency = Some(currency);
        }

        if let Some(channels) = patch.channels {
            next.channels = channels;
        }

        if let Some(segment_key) = patch.segment_key {
            next.segment_key = Some(segment_key).filter(|segment| !segment.trim().is_empty());
        }

        if let Some(eligibility_rules) = patch.eligibility_rules {
            next.eligibility_rules = eligibility_rules;
        }

        if let Some(conditions) = patch.conditions {
            next.conditions = conditions;
        }

        if let Some(stacking) = patch.stacking {
            next.stacking = stacking;
        }

        if let Some(schedule) = patch.schedule {
            next.schedule = schedule;
        }

        if let Some(limit) = patch.usage_limit_total {
            next.usage_limit_total = limit;
        }

        if let Some(limit) = patch.usage_limit_per_customer {
            next.usage_limit_per_customer = limit;
        }

        if let Some(budget) = patch.budget_minor {
            next.budget_minor = (budget != 0).then_some(budget);
        }

        if now >= self.schedule.starts_at && !patch.allow_immutable_changes {
            let fields = frozen_changes(&current, &next);

            if !fields.is_empty() {
                return Err(PatchError::Immutable { fields });
            }
        }

        problems.extend(next.problems());

        if problems.is_empty() {
            Ok(next)
        } else {
            Err(InvalidPromotion { problems }.into())
        }
    }
}

fn frozen_changes(before: &Promotion, after: &Promotion) -> Vec<&'static str> {
    let mut fields = Vec::new();

    if before.code != after.code {
        fields.push("code");
    }

    if before.benefit.kind() != after.benefit.kind() {
        fields.push("kind");
    }

    if before.benefit != after.benefit {
        fields.push("value");
    }

    if before.currency != after.currency {
        fields.push("currency");
    }

    if before.usage_limit_per_customer != after.usage_limit_per_customer {
        fields.push("usageLimitPerCustomer");
    }

    if before.schedule.starts_at != after.schedule.starts_at {
        fields.push("startsAt");
    }

    fields
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::promotions::test_support::{march_15, spring24};

    use super::*;

    #[test]
    fn renames_after_start() -> TestResult {
        let patched = spring24().patched(
            PromotionPatch {
                name: Some(" Spring sale 2024 ".to_string()),
                ..PromotionPatch::default()
            },
            march_15(),
        )?;

        assert_eq!(patched.name, "Spring sale 2024");

        Ok(())
    }

    #[test]
    fn benefit_is_frozen_after_start() {
        let result = spring24().patched(
            PromotionPatch {
                benefit: Some(Benefit::Percentage {
                    percent: Decimal::from(50),
                }),
                ..PromotionPatch::default()
            },
            march_15(),
        );

        assert_eq!(
            result,
            Err(PatchError::Immutable {
                fields: vec!["value"]
            })
        );
    }

    #[test]
    fn override_unfreezes_fields() -> TestResult {
        let patched = spring24().patched(
            PromotionPatch {
                code: Some("spring-50".to_string()),
                allow_immutable_changes: true,
                ..PromotionPatch::default()
            },
            march_15(),
        )?;

        assert_eq!(patched.code.as_str(), "SPRING-50");

        Ok(())
    }

    #[test]
    fn benefit_can_change_before_start() -> TestResult {
        let promotion = spring24();
        let before_start = promotion.schedule.starts_at.checked_sub(1.hour())?;

        let patched = promotion.patched(
            PromotionPatch {
                benefit: Some(Benefit::FixedAmount { amount_minor: 500 }),
                ..PromotionPatch::default()
            },
            before_start,
        )?;

        assert_eq!(patched.benefit, Benefit::FixedAmount { amount_minor: 500 });

        Ok(())
    }

    #[test]
    fn active_cannot_return_to_draft() {
        let result = spring24().patched(
            PromotionPatch {
                status: Some(PromotionStatus::Draft),
                ..PromotionPatch::default()
            },
            march_15(),
        );

        assert_eq!(
            result,
            Err(PatchError::Transition {
                from: PromotionStatus::Active,
                to: PromotionStatus::Draft
            })
        );
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let promotion = spring24();
        let schedule = Schedule {
            starts_at: promotion.schedule.starts_at,
            ends_at: promotion.schedule.starts_at,
        };

        let result = promotion.patched(
            PromotionPatch {
                schedule: Some(schedule),
                ..PromotionPatch::default()
            },
            march_15(),
        );

        assert!(matches!(result, Err(PatchError::Invalid(_))), "{result:?}");
    }

    #[test]
    fn empty_patch_detection() {
        assert!(PromotionPatch::default().is_empty(), "default patch is empty");
        assert!(
            !PromotionPatch {
                name: Some("x".to_string()),
                ..PromotionPatch::default()
            }
            .is_empty(),
            "named patch is not empty"
        );
    }
}
