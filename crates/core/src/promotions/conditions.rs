//! Structured promotion conditions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{cart::CartItem, money::CurrencyCode};

/// Seal shapes the catalogue sells.
pub const SHAPES: [&str; 2] = ["round", "square"];

/// Inclusive size range in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    /// Smallest size.
    pub min: u32,

    /// Largest size.
    pub max: u32,
}

impl SizeRange {
    /// Whether `size` is within the range.
    pub const fn contains(&self, size: u32) -> bool {
        self.min <= size && size <= self.max
    }
}

/// Optional predicates, AND-combined. Empty sets mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Conditions {
    /// Minimum merchandise subtotal.
    pub min_subtotal_minor: Option<i64>,

    /// Allowed two letter shipping countries.
    pub country_in: BTreeSet<String>,

    /// Allowed cart currencies.
    pub currency_in: BTreeSet<CurrencyCode>,

    /// Allowed seal shapes.
    pub shape_in: BTreeSet<String>,

    /// Allowed seal sizes.
    #[serde(rename = "sizeMMBetween")]
    pub size_mm_between: Option<SizeRange>,

    /// Allowed `/products/{id}` references.
    pub product_refs_in: BTreeSet<String>,

    /// Allowed `/materials/{id}` references.
    pub material_refs_in: BTreeSet<String>,

    /// Only customers without any prior redemption qualify.
    pub new_customer_only: bool,
}

impl Conditions {
    /// Whether any per-item filter is set.
    pub fn has_item_filters(&self) -> bool {
        !self.product_refs_in.is_empty()
            || !self.material_refs_in.is_empty()
            || !self.shape_in.is_empty()
            || self.size_mm_between.is_some()
    }

    /// Whether a line satisfies every item filter that is set.
    pub fn matches_item(&self, item: &CartItem) -> bool {
        let product = self.product_refs_in.is_empty()
            || item
                .product_ref
                .as_ref()
                .is_some_and(|reference| self.product_refs_in.contains(reference));

        let material = self.material_refs_in.is_empty()
            || item
                .material_ref
                .as_ref()
                .is_some_and(|reference| self.material_refs_in.contains(reference));

        let shape = self.shape_in.is_empty()
            || item
                .shape
                .as_ref()
                .is_some_and(|shape| self.shape_in.contains(&shape.to_lowercase()));

        let size = self
            .size_mm_between
            .is_none_or(|range| item.size_mm.is_some_and(|size| range.contains(size)));

        product && material && shape && size
    }

    pub(crate) fn problems(&self, problems: &mut Vec<String>) {
        if self.min_subtotal_minor.is_some_and(|min| min < 0) {
            problems.push("minimum subtotal must not be negative".to_string());
        }

        for country in &self.country_in {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
                problems.push(format!("country code {country:?} must be two upper-case letters"));
            }
        }

        for shape in &self.shape_in {
            if !SHAPES.contains(&shape.as_str()) {
                problems.push(format!("shape {shape:?} must be one of round, square"));
            }
        }

        if let Some(range) = self.size_mm_between {
            if range.min > range.max {
                problems.push("size range minimum must not exceed maximum".to_string());
            }
        }

        for reference in &self.product_refs_in {
            if !is_reference(reference, "/products/") {
                problems.push(format!("product reference {reference:?} must look like /products/{{id}}"));
            }
        }

        for reference in &self.material_refs_in {
            if !is_reference(reference, "/materials/") {
                problems.push(format!("material reference {reference:?} must look like /materials/{{id}}"));
            }
        }
    }
}

/// `^{prefix}[^/]+$`
fn is_reference(reference: &str, prefix: &str) -> bool {
    reference
        .strip_prefix(prefix)
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CartItem {
        CartItem {
            line_id: None,
            sku: "SEAL-15".to_string(),
            quantity: 1,
            price_minor: 5_000,
            product_ref: Some("/products/seal".to_string()),
            material_ref: Some("/materials/boxwood".to_string()),
            shape: Some("Round".to_string()),
            size_mm: Some(15),
            on_sale: false,
        }
    }

    #[test]
    fn unset_filters_match_everything() {
        let conditions = Conditions::default();

        assert!(!conditions.has_item_filters(), "no filters set");
        assert!(conditions.matches_item(&item()), "no filters match");
    }

    #[test]
    fn filters_are_and_combined() {
        let conditions = Conditions {
            shape_in: BTreeSet::from(["round".to_string()]),
            size_mm_between: Some(SizeRange { min: 10, max: 12 }),
            ..Conditions::default()
        };

        assert!(!conditions.matches_item(&item()), "size is out of range");

        let conditions = Conditions {
            size_mm_between: Some(SizeRange { min: 10, max: 15 }),
            ..conditions
        };

        assert!(conditions.matches_item(&item()), "shape and size match");
    }

    #[test]
    fn malformed_references_are_reported() {
        let conditions = Conditions {
            product_refs_in: BTreeSet::from(["/products/".to_string(), "products/x".to_string()]),
            material_refs_in: BTreeSet::from(["/materials/a/b".to_string()]),
            country_in: BTreeSet::from(["jpn".to_string()]),
            ..Conditions::default()
        };

        let mut problems = Vec::new();
        conditions.problems(&mut problems);

        assert_eq!(problems.len(), 4, "{problems:?}");
    }
}
