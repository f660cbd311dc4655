//! Promotion benefits: what a promotion takes off the cart.

use std::fmt::{Display, Formatter, Result as FmtResult};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discount formula family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    /// Percent off the affected lines.
    Percentage,

    /// Fixed amount off the affected lines.
    FixedAmount,

    /// Buy N, get M discounted.
    Bundle,

    /// Shipping waived.
    FreeShipping,

    /// Shipping charged at a flat amount.
    FlatShipping,
}

/// What a kind discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscountBase {
    /// Merchandise lines.
    Items,

    /// The shipping charge.
    Shipping,
}

impl PromotionKind {
    /// Stable snake case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
            Self::Bundle => "bundle",
            Self::FreeShipping => "free_shipping",
            Self::FlatShipping => "flat_shipping",
        }
    }

    /// Application order when stacking; lower applies first.
    pub const fn priority(self) -> u8 {
        match self {
            Self::FixedAmount => 0,
            Self::Percentage => 1,
            Self::Bundle => 2,
            Self::FreeShipping | Self::FlatShipping => 3,
        }
    }

    /// The part of the cart this kind discounts.
    pub const fn base(self) -> DiscountBase {
        match self {
            Self::Percentage | Self::FixedAmount | Self::Bundle => DiscountBase::Items,
            Self::FreeShipping | Self::FlatShipping => DiscountBase::Shipping,
        }
    }

    /// Whether the benefit is denominated in a currency.
    pub const fn carries_amount(self) -> bool {
        matches!(self, Self::FixedAmount | Self::FlatShipping)
    }
}

impl Display for PromotionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Kind plus value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Benefit {
    /// `percent`% off, `0 < percent <= 100`.
    Percentage {
        /// Percent off.
        percent: Decimal,
    },

    /// A fixed amount off, in minor units.
    FixedAmount {
        /// Amount off.
        amount_minor: i64,
    },

    /// For every `buy_qty + get_qty` units, the cheapest `get_qty` are
    /// discounted by `discount_percent`.
    Bundle {
        /// Units that must be bought.
        buy_qty: u32,

        /// Units discounted per group.
        get_qty: u32,

        /// Percent off the discounted units.
        discount_percent: Decimal,
    },

    /// Shipping waived.
    FreeShipping,

    /// Shipping charged at `amount_minor`.
    FlatShipping {
        /// Flat shipping charge.
        amount_minor: i64,
    },
}

impl Benefit {
    /// The formula family.
    pub const fn kind(&self) -> PromotionKind {
        match self {
            Self::Percentage { .. } => PromotionKind::Percentage,
            Self::FixedAmount { .. } => PromotionKind::FixedAmount,
            Self::Bundle { .. } => PromotionKind::Bundle,
            Self::FreeShipping => PromotionKind::FreeShipping,
            Self::FlatShipping { .. } => PromotionKind::FlatShipping,
        }
    }

    pub(crate) fn problems(&self, problems: &mut Vec<String>) {
        match *self {
            Self::Percentage { percent } => {
                if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                    problems.push("percentage must be greater than 0 and at most 100".to_string());
                }
            }
            Self::FixedAmount { amount_minor } => {
                if amount_minor <= 0 {
                    problems.push("fixed amount must be greater than 0".to_string());
                }
            }
            Self::Bundle {
                buy_qty,
                get_qty,
                discount_percent,
            } => {
                if buy_qty == 0 || get_qty == 0 {
                    problems.push("bundle buy and get quantities must be at least 1".to_string());
                }

                if discount_percent <= Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
                    problems.push(
                        "bundle discount percent must be greater than 0 and at most 100"
                            .to_string(),
                    );
                }
            }
            Self::FreeShipping => {}
            Self::FlatShipping { amount_minor } => {
                if amount_minor < 0 {
                    problems.push("flat shipping amount must not be negative".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn serialises_with_kind_tag() -> TestResult {
        let benefit = Benefit::Bundle {
            buy_qty: 2,
            get_qty: 1,
            discount_percent: Decimal::ONE_HUNDRED,
        };

        let value = serde_json::to_value(benefit)?;

        assert_eq!(value["kind"], "bundle");
        assert_eq!(value["buyQty"], 2);

        let back: Benefit = serde_json::from_value(value)?;

        assert_eq!(back.kind(), PromotionKind::Bundle);

        Ok(())
    }

    #[test]
    fn shipping_kinds_apply_last() {
        assert!(
            PromotionKind::FixedAmount.priority() < PromotionKind::Percentage.priority(),
            "fixed before percentage"
        );
        assert!(
            PromotionKind::Bundle.priority() < PromotionKind::FreeShipping.priority(),
            "bundle before shipping"
        );
        assert_eq!(PromotionKind::FlatShipping.base(), DiscountBase::Shipping);
    }

    #[test]
    fn percentage_bounds() {
        let mut problems = Vec::new();

        Benefit::Percentage {
            percent: Decimal::ZERO,
        }
        .problems(&mut problems);
        Benefit::Percentage {
            percent: Decimal::from(101),
        }
        .problems(&mut problems);
        Benefit::Percentage {
            percent: Decimal::ONE_HUNDRED,
        }
        .problems(&mut problems);

        assert_eq!(problems.len(), 2, "{problems:?}");
    }
}
