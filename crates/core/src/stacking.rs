//! Stacking resolver
//!
//! Picks the best legal combination of eligible promotions for a cart and
//! works out what each member contributes. Members of a combination are
//! applied through a single [`CartBalance`] in kind priority order, so every
//! promotion reads the values left behind by the ones before it.

use std::cmp::{Ordering, Reverse};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    cart::CartContext,
    discounts::{Application, CartBalance, DiscountError, LineDiscount, standalone},
    promotions::{Promotion, PromotionId},
};

/// Largest candidate pool enumerated exhaustively.
pub const MAX_CANDIDATES: usize = 12;

/// Limits applied while resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackingPolicy {
    /// Lowest merchandise total the cart may be discounted to.
    pub floor_minor: i64,

    /// Candidates kept before enumeration.
    pub max_candidates: usize,
}

impl Default for StackingPolicy {
    fn default() -> Self {
        Self {
            floor_minor: 0,
            max_candidates: MAX_CANDIDATES,
        }
    }
}

/// The winning combination and its effect on the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResolution {
    /// Selected promotions, in application order.
    pub selected: Vec<PromotionId>,

    /// Per-promotion effect, in application order.
    pub applications: Vec<Application>,

    /// Total merchandise discount.
    pub discount_minor: i64,

    /// Total shipping discount.
    pub shipping_discount_minor: i64,

    /// Merchandise discount per cart line, in cart order.
    pub line_discounts: Vec<LineDiscount>,

    /// Subtotal after discounts.
    pub residual_subtotal_minor: i64,

    /// Shipping after discounts.
    pub residual_shipping_minor: i64,
}

impl StackResolution {
    fn nothing(cart: &CartContext) -> Self {
        Self {
            selected: Vec::new(),
            applications: Vec::new(),
            discount_minor: 0,
            shipping_discount_minor: 0,
            line_discounts: Vec::new(),
            residual_subtotal_minor: cart.subtotal_minor,
            residual_shipping_minor: cart.shipping_minor.max(0),
        }
    }

    /// Items plus shipping discount.
    pub fn total_minor(&self) -> i64 {
        self.discount_minor.saturating_add(self.shipping_discount_minor)
    }

    /// Whether no promotion was selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// The effect of one selected promotion.
    pub fn application_for(&self, id: PromotionId) -> Option<&Application> {
        self.applications
            .iter()
            .find(|application| application.promotion_id == id)
    }
}

type Members = SmallVec<[usize; MAX_CANDIDATES]>;

#[derive(Debug)]
struct Combination {
    ids: Vec<PromotionId>,
    applications: Vec<Application>,
    discount_minor: i64,
    shipping_discount_minor: i64,
    residual_shipping_minor: i64,
}

impl Combination {
    fn total_minor(&self) -> i64 {
        self.discount_minor.saturating_add(self.shipping_discount_minor)
    }

    /// Bigger discount first, then fewer promotions, then smaller ids.
    fn rank(&self, other: &Self) -> Ordering {
        Reverse(self.total_minor())
            .cmp(&Reverse(other.total_minor()))
            .then_with(|| self.ids.len().cmp(&other.ids.len()))
            .then_with(|| self.ids.cmp(&other.ids))
    }
}

/// Choose the combination of `candidates` with the largest discount on `cart`.
///
/// Candidates are expected to have passed rule evaluation already.
///
/// # Errors
///
/// Propagates arithmetic errors from the discount math.
pub fn resolve(
    candidates: &[&Promotion],
    cart: &CartContext,
    policy: &StackingPolicy,
) -> Result<StackResolution, DiscountError> {
    let pool = trim(candidates, cart, policy.max_candidates)?;

    if pool.is_empty() {
        return Ok(StackResolution::nothing(cart));
    }

    let mut best: Option<Combination> = None;

    for mask in 1_u32..(1_u32 << pool.len()) {
        let members: Members = (0..pool.len())
            .filter(|idx| mask & (1 << idx) != 0)
            .collect();

        if !is_legal(&pool, &members) {
            continue;
        }

        let combination = apply(&pool, &members, cart, policy)?;

        let better = best
            .as_ref()
            .is_none_or(|current| combination.rank(current) == Ordering::Less);

        if better {
            best = Some(combination);
        }
    }

    Ok(best.map_or_else(|| StackResolution::nothing(cart), |best| finish(best, cart)))
}

/// Deduplicate, keep the strongest `limit` candidates, and order by id.
fn trim<'p>(
    candidates: &[&'p Promotion],
    cart: &CartContext,
    limit: usize,
) -> Result<Vec<&'p Promotion>, DiscountError> {
    let mut pool: Vec<&Promotion> = candidates.to_vec();

    pool.sort_by_key(|promotion| promotion.id);
    pool.dedup_by_key(|promotion| promotion.id);

    let limit = limit.min(MAX_CANDIDATES);

    if pool.len() > limit {
        let mut scored = pool
            .into_iter()
            .map(|promotion| Ok((standalone(promotion, cart)?.total_minor(), promotion)))
            .collect::<Result<Vec<_>, DiscountError>>()?;

        scored.sort_by_key(|(total, promotion)| (Reverse(*total), promotion.id));
        scored.truncate(limit);

        pool = scored.into_iter().map(|(_, promotion)| promotion).collect();
        pool.sort_by_key(|promotion| promotion.id);
    }

    Ok(pool)
}

fn is_legal(pool: &[&Promotion], members: &[usize]) -> bool {
    let promotions: SmallVec<[&Promotion; MAX_CANDIDATES]> = members
        .iter()
        .filter_map(|idx| pool.get(*idx).copied())
        .collect();

    let mut exclusive = promotions
        .iter()
        .filter(|promotion| !promotion.stacking.combinable);

    if let Some(first) = exclusive.next() {
        if exclusive.next().is_some() {
            return false;
        }

        let base = first.kind().base();
        let shares_base = promotions
            .iter()
            .any(|other| other.id != first.id && other.kind().base() == base);

        if shares_base {
            return false;
        }
    }

    let cap = promotions
        .iter()
        .filter_map(|promotion| promotion.stacking.max_stack)
        .min();

    cap.is_none_or(|cap| u32::try_from(promotions.len()).is_ok_and(|len| len <= cap))
}

fn apply(
    pool: &[&Promotion],
    members: &[usize],
    cart: &CartContext,
    policy: &StackingPolicy,
) -> Result<Combination, DiscountError> {
    let mut ordered: SmallVec<[&Promotion; MAX_CANDIDATES]> = members
        .iter()
        .filter_map(|idx| pool.get(*idx).copied())
        .collect();

    ordered.sort_by_key(|promotion| (promotion.kind().priority(), promotion.id));

    let mut balance = CartBalance::new(cart)?;
    let mut applications = ordered
        .iter()
        .map(|promotion| balance.apply(promotion))
        .collect::<Result<Vec<_>, _>>()?;

    // Keep the merchandise total at or above the floor, undoing the latest
    // applications first.
    let cap = cart.subtotal_minor.saturating_sub(policy.floor_minor).max(0);
    let mut excess = applications
        .iter()
        .map(|application| application.discount_minor)
        .sum::<i64>()
        .saturating_sub(cap);

    for application in applications.iter_mut().rev() {
        if excess <= 0 {
            break;
        }

        excess -= balance.refund(application, excess);
    }

    let mut ids: Vec<PromotionId> = ordered.iter().map(|promotion| promotion.id).collect();
    ids.sort_unstable();

    Ok(Combination {
        ids,
        discount_minor: applications
            .iter()
            .map(|application| application.discount_minor)
            .sum(),
        shipping_discount_minor: applications
            .iter()
            .map(|application| application.shipping_discount_minor)
            .sum(),
        residual_shipping_minor: balance.shipping_minor(),
        applications,
    })
}

fn finish(best: Combination, cart: &CartContext) -> StackResolution {
    let mut per_line: FxHashMap<&str, i64> = FxHashMap::default();

    for line in best.applications.iter().flat_map(|application| &application.lines) {
        *per_line.entry(line.line_id.as_str()).or_default() += line.discount_minor;
    }

    let line_discounts = cart
        .items
        .iter()
        .filter_map(|item| {
            per_line
                .get(item.line_id())
                .filter(|discount| **discount > 0)
                .map(|discount| LineDiscount {
                    line_id: item.line_id().to_string(),
                    discount_minor: *discount,
                })
        })
        .collect();

    StackResolution {
        selected: best
            .applications
            .iter()
            .map(|application| application.promotion_id)
            .collect(),
        residual_subtotal_minor: cart.subtotal_minor.saturating_sub(best.discount_minor),
        residual_shipping_minor: best.residual_shipping_minor,
        discount_minor: best.discount_minor,
        shipping_discount_minor: best.shipping_discount_minor,
        line_discounts,
        applications: best.applications,
    }
}
