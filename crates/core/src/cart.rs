//! Cart context
//!
//! The engine's view of a shopping cart. Carts are supplied by the caller on
//! every call and are never persisted.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::CurrencyCode;

/// Sales channel a cart was built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Web storefront.
    OnlineStore,

    /// Physical store.
    Retail,

    /// Mobile app.
    App,
}

impl Channel {
    /// Stable snake case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnlineStore => "online_store",
            Self::Retail => "retail",
            Self::App => "app",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Unknown channel name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel {0:?}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "online_store" => Ok(Self::OnlineStore),
            "retail" => Ok(Self::Retail),
            "app" => Ok(Self::App),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Malformed cart input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// A line has a zero quantity.
    #[error("line {line_id} has zero quantity")]
    ZeroQuantity {
        /// Offending line.
        line_id: String,
    },

    /// A line has a negative unit price.
    #[error("line {line_id} has a negative price")]
    NegativePrice {
        /// Offending line.
        line_id: String,
    },

    /// Two lines share an identifier.
    #[error("line id {0} appears more than once")]
    DuplicateLine(String),

    /// Subtotal or shipping is negative.
    #[error("{field} must not be negative")]
    NegativeAmount {
        /// Offending field.
        field: &'static str,
    },

    /// A line total does not fit in minor units.
    #[error("line {line_id} total overflows")]
    Overflow {
        /// Offending line.
        line_id: String,
    },

    /// The sum of all line totals does not fit in minor units.
    #[error("cart line totals overflow")]
    TotalOverflow,
}

/// A cart as seen by the promotion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartContext {
    /// Resolved customer; `None` for guest checkouts.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Cart currency.
    pub currency: CurrencyCode,

    /// Channel the cart was built in.
    pub channel: Channel,

    /// Two letter shipping country.
    #[serde(default)]
    pub country: String,

    /// Merchandise subtotal in minor units.
    pub subtotal_minor: i64,

    /// Shipping charge in minor units.
    #[serde(default)]
    pub shipping_minor: i64,

    /// Customer segment.
    #[serde(default)]
    pub segment_key: Option<String>,

    /// Cart lines.
    #[serde(default)]
    pub items: Vec<CartItem>,

    /// Eligibility facts such as `new_customer` or `app_push`.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl CartContext {
    /// Check the cart is well formed.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), CartError> {
        if self.subtotal_minor < 0 {
            return Err(CartError::NegativeAmount {
                field: "subtotalMinor",
            });
        }

        if self.shipping_minor < 0 {
            return Err(CartError::NegativeAmount {
                field: "shippingMinor",
            });
        }

        let mut seen = FxHashSet::default();

        for item in &self.items {
            let line_id = item.line_id();

            if item.quantity == 0 {
                return Err(CartError::ZeroQuantity {
                    line_id: line_id.to_string(),
                });
            }

            if item.price_minor < 0 {
                return Err(CartError::NegativePrice {
                    line_id: line_id.to_string(),
                });
            }

            if item.line_total().is_none() {
                return Err(CartError::Overflow {
                    line_id: line_id.to_string(),
                });
            }

            if !seen.insert(line_id) {
                return Err(CartError::DuplicateLine(line_id.to_string()));
            }
        }

        if self.items_total().is_none() {
            return Err(CartError::TotalOverflow);
        }

        Ok(())
    }

    /// Sum of all line totals, `None` on overflow.
    pub fn items_total(&self) -> Option<i64> {
        self.items
            .iter()
            .try_fold(0_i64, |sum, item| sum.checked_add(item.line_total()?))
    }

    /// Whether an eligibility flag is present and true.
    pub fn flag(&self, token: &str) -> bool {
        self.flags.get(token).copied().unwrap_or(false)
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line identifier; falls back to the SKU.
    #[serde(default)]
    pub line_id: Option<String>,

    /// Stock keeping unit.
    pub sku: String,

    /// Number of units, at least one.
    pub quantity: u32,

    /// Unit price in minor units.
    pub price_minor: i64,

    /// `/products/{id}` reference.
    #[serde(default)]
    pub product_ref: Option<String>,

    /// `/materials/{id}` reference.
    #[serde(default)]
    pub material_ref: Option<String>,

    /// Seal shape, e.g. `round` or `square`.
    #[serde(default)]
    pub shape: Option<String>,

    /// Seal size in millimetres.
    #[serde(default, rename = "sizeMM")]
    pub size_mm: Option<u32>,

    /// Whether the line is already on sale.
    #[serde(default)]
    pub on_sale: bool,
}

impl CartItem {
    /// Identifier used in discount breakdowns.
    pub fn line_id(&self) -> &str {
        self.line_id.as_deref().unwrap_or(&self.sku)
    }

    /// `price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<i64> {
        self.price_minor.checked_mul(i64::from(self.quantity))
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn item(sku: &str, quantity: u32, price_minor: i64) -> CartItem {
        CartItem {
            line_id: None,
            sku: sku.to_string(),
            quantity,
            price_minor,
            product_ref: None,
            material_ref: None,
            shape: None,
            size_mm: None,
            on_sale: false,
        }
    }

    fn cart(items: Vec<CartItem>) -> Result<CartContext, crate::money::MoneyError> {
        Ok(CartContext {
            user_id: None,
            currency: CurrencyCode::parse("JPY")?,
            channel: Channel::OnlineStore,
            country: "JP".to_string(),
            subtotal_minor: 0,
            shipping_minor: 0,
            segment_key: None,
            items,
            flags: BTreeMap::new(),
        })
    }

    #[test]
    fn duplicate_line_ids_are_rejected() -> TestResult {
        let cart = cart(vec![item("A", 1, 100), item("A", 2, 100)])?;

        assert_eq!(cart.validate(), Err(CartError::DuplicateLine("A".to_string())));

        Ok(())
    }

    #[test]
    fn zero_quantity_is_rejected() -> TestResult {
        let cart = cart(vec![item("A", 0, 100)])?;

        assert!(matches!(cart.validate(), Err(CartError::ZeroQuantity { .. })));

        Ok(())
    }

    #[test]
    fn overflowing_cart_totals_are_rejected() -> TestResult {
        let half = i64::MAX / 2 + 1;
        let cart = cart(vec![item("A", 1, half), item("B", 1, half)])?;

        assert_eq!(cart.items_total(), None);
        assert_eq!(cart.validate(), Err(CartError::TotalOverflow));

        Ok(())
    }

    #[test]
    fn deserialises_camel_case_payloads() -> TestResult {
        let cart: CartContext = serde_json::from_str(
            r#"{
                "userId": "u-1",
                "currency": "jpy",
                "channel": "online_store",
                "subtotalMinor": 10000,
                "items": [{"sku": "A", "quantity": 1, "priceMinor": 10000, "sizeMM": 15}],
                "flags": {"new_customer": true}
            }"#,
        )?;

        assert_eq!(cart.currency.as_str(), "JPY");
        assert!(cart.flag("new_customer"), "flag should be read");
        assert_eq!(cart.items.first().and_then(|line| line.size_mm), Some(15));

        Ok(())
    }
}
