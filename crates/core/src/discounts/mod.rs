//! Discount math
//!
//! Applies a single promotion's benefit to the running balance of a cart.
//! The stacking resolver threads one [`CartBalance`] through every member of
//! a combination so later promotions read the post-discount values left by
//! earlier ones.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cart::CartContext,
    money::{MoneyError, div_round_half_even, percent_of_minor, split_proportional},
    promotions::{Benefit, Conditions, Promotion, PromotionId, PromotionKind},
};

/// Errors specific to discount calculations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    /// A cart line total does not fit in minor units.
    #[error("line {0} total overflows")]
    LineOverflow(String),

    /// The cart's line totals do not sum within minor units.
    #[error("cart line totals overflow")]
    TotalOverflow,

    /// Wrapped money arithmetic error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Discount taken off one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDiscount {
    /// Cart line.
    pub line_id: String,

    /// Discount in minor units.
    pub discount_minor: i64,
}

/// The effect of one promotion on a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Promotion applied.
    pub promotion_id: PromotionId,

    /// Its kind.
    pub kind: PromotionKind,

    /// Discount on merchandise lines.
    pub discount_minor: i64,

    /// Discount on shipping.
    pub shipping_discount_minor: i64,

    /// Per-line breakdown of `discount_minor`, in cart order.
    pub lines: Vec<LineDiscount>,
}

impl Application {
    fn empty(promotion: &Promotion) -> Self {
        Self {
            promotion_id: promotion.id,
            kind: promotion.kind(),
            discount_minor: 0,
            shipping_discount_minor: 0,
            lines: Vec::new(),
        }
    }

    /// Items plus shipping discount.
    pub fn total_minor(&self) -> i64 {
        self.discount_minor.saturating_add(self.shipping_discount_minor)
    }

    /// Identifiers of the lines that received a discount.
    pub fn affected_line_ids(&self) -> Vec<String> {
        self.lines.iter().map(|line| line.line_id.clone()).collect()
    }
}

/// Running per-line and shipping values of a cart while discounts apply.
#[derive(Debug, Clone)]
pub struct CartBalance<'a> {
    cart: &'a CartContext,
    running: Vec<i64>,
    shipping: i64,
}

impl<'a> CartBalance<'a> {
    /// Start from the undiscounted cart.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError::LineOverflow`] when a line total overflows and
    /// [`DiscountError::TotalOverflow`] when the lines do not sum.
    pub fn new(cart: &'a CartContext) -> Result<Self, DiscountError> {
        let running = cart
            .items
            .iter()
            .map(|item| {
                item.line_total()
                    .ok_or_else(|| DiscountError::LineOverflow(item.line_id().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Running values only shrink, so every later sum of them fits too.
        running
            .iter()
            .try_fold(0_i64, |sum, line| sum.checked_add(*line))
            .ok_or(DiscountError::TotalOverflow)?;

        Ok(Self {
            cart,
            running,
            shipping: cart.shipping_minor.max(0),
        })
    }

    /// Current merchandise value.
    pub fn items_minor(&self) -> i64 {
        self.running.iter().fold(0, |sum, line| sum.saturating_add(*line))
    }

    /// Current shipping charge.
    pub const fn shipping_minor(&self) -> i64 {
        self.shipping
    }

    /// Apply `promotion` to the running values.
    ///
    /// # Errors
    ///
    /// Propagates money arithmetic errors.
    pub fn apply(&mut self, promotion: &Promotion) -> Result<Application, DiscountError> {
        let mut application = Application::empty(promotion);

        match promotion.benefit {
            Benefit::Percentage { percent } => {
                let affected = self.affected(&promotion.conditions);
                let base = self.base(&affected);
                let total = percent_of_minor(percent, base)?.clamp(0, base);

                application.lines = self.spread(&affected, total)?;
            }
            Benefit::FixedAmount { amount_minor } => {
                let affected = self.affected(&promotion.conditions);
                let base = self.base(&affected);

                application.lines = self.spread(&affected, amount_minor.clamp(0, base))?;
            }
            Benefit::Bundle {
                buy_qty,
                get_qty,
                discount_percent,
            } => {
                let affected = self.affected(&promotion.conditions);

                application.lines = self.bundle(&affected, buy_qty, get_qty, discount_percent)?;
            }
            Benefit::FreeShipping => {
                application.shipping_discount_minor = self.shipping;
                self.shipping = 0;
            }
            Benefit::FlatShipping { amount_minor } => {
                let discount = self.shipping.saturating_sub(amount_minor.max(0)).max(0);

                application.shipping_discount_minor = discount;
                self.shipping -= discount;
            }
        }

        application.discount_minor = application
            .lines
            .iter()
            .map(|line| line.discount_minor)
            .sum();

        Ok(application)
    }

    /// Give back up to `amount` of item discount taken from `application`,
    /// starting with its largest line discounts. Returns what was given back.
    pub(crate) fn refund(&mut self, application: &mut Application, amount: i64) -> i64 {
        let mut remaining = amount.max(0);

        let mut order: Vec<usize> = (0..application.lines.len()).collect();
        order.sort_by_key(|idx| {
            (
                std::cmp::Reverse(
                    application
                        .lines
                        .get(*idx)
                        .map_or(0, |line| line.discount_minor),
                ),
                *idx,
            )
        });

        for idx in order {
            if remaining == 0 {
                break;
            }

            let Some(line) = application.lines.get_mut(idx) else {
                continue;
            };

            let step = line.discount_minor.min(remaining);

            line.discount_minor -= step;
            remaining -= step;

            if let Some(position) = self.position_of(&line.line_id) {
                if let Some(value) = self.running.get_mut(position) {
                    *value += step;
                }
            }
        }

        application.lines.retain(|line| line.discount_minor > 0);

        let refunded = amount.max(0) - remaining;
        application.discount_minor -= refunded;

        refunded
    }

    fn position_of(&self, line_id: &str) -> Option<usize> {
        self.cart
            .items
            .iter()
            .position(|item| item.line_id() == line_id)
    }

    fn affected(&self, conditions: &Conditions) -> Vec<usize> {
        self.cart
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| conditions.matches_item(item))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn base(&self, affected: &[usize]) -> i64 {
        affected
            .iter()
            .filter_map(|idx| self.running.get(*idx))
            .fold(0, |sum, line| sum.saturating_add(*line))
    }

    /// Take `total` off `affected`, proportionally to their running values.
    fn spread(&mut self, affected: &[usize], total: i64) -> Result<Vec<LineDiscount>, DiscountError> {
        if total == 0 {
            return Ok(Vec::new());
        }

        let weights: Vec<i64> = affected
            .iter()
            .map(|idx| self.running.get(*idx).copied().unwrap_or_default())
            .collect();

        let shares = split_proportional(total, &weights)?;

        Ok(affected
            .iter()
            .zip(shares)
            .filter_map(|(idx, share)| self.take(*idx, share))
            .collect())
    }

    /// Discount the cheapest `get_qty` units of every `buy_qty + get_qty`
    /// group by `percent`.
    fn bundle(
        &mut self,
        affected: &[usize],
        buy_qty: u32,
        get_qty: u32,
        percent: Decimal,
    ) -> Result<Vec<LineDiscount>, DiscountError> {
        let group = u64::from(buy_qty) + u64::from(get_qty);

        if group == 0 || get_qty == 0 {
            return Ok(Vec::new());
        }

        let units: u64 = affected
            .iter()
            .filter_map(|idx| self.cart.items.get(*idx))
            .map(|item| u64::from(item.quantity))
            .sum();

        let mut remaining = (units / group) * u64::from(get_qty);

        let mut order: Vec<(usize, i64, u32)> = affected
            .iter()
            .filter_map(|idx| {
                let running = self.running.get(*idx)?;
                let item = self.cart.items.get(*idx)?;

                Some((*idx, *running, item.quantity))
            })
            .collect();

        // Cheapest running unit value first: compare a/q against b/r as a*r vs b*q.
        order.sort_by(|(a_idx, a_value, a_qty), (b_idx, b_value, b_qty)| {
            let left = i128::from(*a_value) * i128::from(*b_qty);
            let right = i128::from(*b_value) * i128::from(*a_qty);

            match left.cmp(&right) {
                Ordering::Equal => a_idx.cmp(b_idx),
                other => other,
            }
        });

        let mut lines = Vec::new();

        for (idx, running, quantity) in order {
            if remaining == 0 {
                break;
            }

            let take = remaining.min(u64::from(quantity));
            let selected = div_round_half_even(
                i128::from(running) * i128::from(take),
                i128::from(quantity),
            );
            let selected = i64::try_from(selected).map_err(|_err| MoneyError::Overflow)?;
            let discount = percent_of_minor(percent, selected)?.clamp(0, running);

            remaining -= take;

            if let Some(line) = self.take(idx, discount) {
                lines.push(line);
            }
        }

        lines.sort_by_key(|line| self.position_of(&line.line_id));

        Ok(lines)
    }

    fn take(&mut self, idx: usize, amount: i64) -> Option<LineDiscount> {
        if amount <= 0 {
            return None;
        }

        let item = self.cart.items.get(idx)?;
        let running = self.running.get_mut(idx)?;

        *running -= amount;

        Some(LineDiscount {
            line_id: item.line_id().to_string(),
            discount_minor: amount,
        })
    }
}

/// The discount `promotion` would award on `cart` on its own.
///
/// # Errors
///
/// Propagates arithmetic errors.
pub fn standalone(promotion: &Promotion, cart: &CartContext) -> Result<Application, DiscountError> {
    CartBalance::new(cart)?.apply(promotion)
}
