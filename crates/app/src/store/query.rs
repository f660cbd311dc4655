//! Typed store queries and cursors.

use std::cmp::Ordering;

use hanko_promotions::{
    cart::Channel,
    promotions::{Promotion, PromotionId, PromotionKind, PromotionStatus},
    usage::PromotionUsage,
};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Catalog list filters; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionFilter {
    /// Effective status at query time.
    pub status: Option<PromotionStatus>,
    pub kind: Option<PromotionKind>,

    /// Only promotions whose window contains this instant.
    pub active_on: Option<Timestamp>,
    pub channel: Option<Channel>,
    pub segment: Option<String>,
}

impl PromotionFilter {
    pub fn matches(&self, promotion: &Promotion, now: Timestamp) -> bool {
        self.status
            .is_none_or(|status| promotion.effective_status(now) == status)
            && self.kind.is_none_or(|kind| promotion.kind() == kind)
            && self
                .active_on
                .is_none_or(|at| promotion.schedule.contains(at))
            && self
                .channel
                .is_none_or(|channel| promotion.channels.contains(&channel))
            && self
                .segment
                .as_deref()
                .is_none_or(|segment| promotion.segment_key.as_deref() == Some(segment))
    }
}

/// Position in the `startsAt desc, id desc` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionCursor {
    pub starts_at: Timestamp,
    pub id: PromotionId,
}

impl PromotionCursor {
    pub fn of(promotion: &Promotion) -> Self {
        Self {
            starts_at: promotion.schedule.starts_at,
            id: promotion.id,
        }
    }

    /// Catalog order: latest start first, then highest id.
    pub fn order(a: &Promotion, b: &Promotion) -> Ordering {
        Self::of(b).key().cmp(&Self::of(a).key())
    }

    /// Whether `promotion` comes strictly after this cursor.
    pub fn precedes(&self, promotion: &Promotion) -> bool {
        Self::of(promotion).key() < self.key()
    }

    fn key(self) -> (Timestamp, PromotionId) {
        (self.starts_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionQuery {
    pub filter: PromotionFilter,

    /// Instant used to settle statuses for the status filter.
    pub now: Timestamp,
    pub after: Option<PromotionCursor>,
    pub limit: usize,
}

/// Usage list sort field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSort {
    #[default]
    Times,
    LastUsedAt,
}

impl UsageSort {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Times => "times",
            Self::LastUsedAt => "last_used_at",
        }
    }

    /// Integer sort value of a row; never-used rows sort first.
    pub fn sort_value(self, usage: &PromotionUsage) -> i64 {
        match self {
            Self::Times => i64::try_from(usage.times).unwrap_or(i64::MAX),
            Self::LastUsedAt => usage
                .last_used_at
                .map_or(i64::MIN, Timestamp::as_millisecond),
        }
    }
}

/// Position in a usage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCursor {
    pub sort_value: i64,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageQuery {
    pub promotion_id: PromotionId,
    pub min_times: u64,
    pub sort: UsageSort,
    pub descending: bool,
    pub after: Option<UsageCursor>,
    pub limit: usize,
}

impl UsageQuery {
    /// Compare two rows in the requested order.
    pub fn order(&self, a: &PromotionUsage, b: &PromotionUsage) -> Ordering {
        let ordering = self.key(a).cmp(&self.key(b));

        if self.descending { ordering.reverse() } else { ordering }
    }

    /// Whether `usage` passes the filter and comes strictly after the cursor.
    pub fn admits(&self, usage: &PromotionUsage) -> bool {
        if usage.times < self.min_times {
            return false;
        }

        self.after.as_ref().is_none_or(|cursor| {
            let ordering = self
                .key(usage)
                .cmp(&(cursor.sort_value, cursor.user_id.as_str()));

            if self.descending {
                ordering == Ordering::Less
            } else {
                ordering == Ordering::Greater
            }
        })
    }

    pub fn cursor(&self, usage: &PromotionUsage) -> UsageCursor {
        UsageCursor {
            sort_value: self.sort.sort_value(usage),
            user_id: usage.user_id.clone(),
        }
    }

    fn key<'u>(&self, usage: &'u PromotionUsage) -> (i64, &'u str) {
        (self.sort.sort_value(usage), usage.user_id.as_str())
    }
}
