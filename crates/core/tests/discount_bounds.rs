//! Property tests for the discount math.

use proptest::prelude::*;
use rust_decimal::Decimal;

use hanko_promotions::{
    cart::{CartContext, CartItem, Channel},
    money::{CurrencyCode, split_proportional},
    promotions::{Benefit, Promotion, PromotionDraft, PromotionStatus, Schedule, Stacking},
    stacking::{StackingPolicy, resolve},
};

fn item(idx: usize, quantity: u32, price_minor: i64) -> CartItem {
    CartItem {
        line_id: Some(format!("line-{idx}")),
        sku: format!("SKU-{idx}"),
        quantity,
        price_minor,
        product_ref: None,
        material_ref: None,
        shape: None,
        size_mm: None,
        on_sale: false,
    }
}

fn cart(lines: &[(u32, i64)], shipping_minor: i64) -> Option<CartContext> {
    let items: Vec<CartItem> = lines
        .iter()
        .enumerate()
        .map(|(idx, (quantity, price))| item(idx, *quantity, *price))
        .collect();

    Some(CartContext {
        user_id: None,
        currency: CurrencyCode::parse("JPY").ok()?,
        channel: Channel::OnlineStore,
        country: "JP".to_string(),
        subtotal_minor: items.iter().filter_map(CartItem::line_total).sum(),
        shipping_minor,
        segment_key: None,
        items,
        flags: Default::default(),
    })
}

fn promotion(code: &str, benefit: Benefit, combinable: bool) -> Option<Promotion> {
    let starts_at = "2024-03-01T00:00:00Z".parse().ok()?;
    let ends_at = "2024-04-01T00:00:00Z".parse().ok()?;

    PromotionDraft {
        id: None,
        code: code.to_string(),
        name: code.to_string(),
        description: String::new(),
        public_description: String::new(),
        status: PromotionStatus::Active,
        benefit,
        currency: CurrencyCode::parse("JPY").ok(),
        channels: [Channel::OnlineStore].into(),
        segment_key: None,
        eligibility_rules: Default::default(),
        conditions: Default::default(),
        stacking: Stacking {
            combinable,
            ..Stacking::default()
        },
        schedule: Schedule { starts_at, ends_at },
        usage_limit_total: 0,
        usage_limit_per_customer: 0,
        budget_minor: None,
    }
    .into_promotion(starts_at)
    .ok()
}

fn lines() -> impl Strategy<Value = Vec<(u32, i64)>> {
    prop::collection::vec((1_u32..5, 0_i64..50_000), 1..6)
}

proptest! {
    #[test]
    fn split_always_sums_to_total(
        total in 0_i64..1_000_000,
        weights in prop::collection::vec(1_i64..100_000, 1..8),
    ) {
        let shares = split_proportional(total, &weights).map_err(|err| TestCaseError::fail(err.to_string()))?;

        prop_assert_eq!(shares.iter().sum::<i64>(), total);
        prop_assert!(shares.iter().all(|share| *share >= 0), "negative share in {:?}", shares);
    }

    #[test]
    fn stacked_discount_stays_within_the_cart(
        lines in lines(),
        shipping in 0_i64..2_000,
        percent in 1_u32..=100,
        amount in 1_i64..100_000,
        exclusive in any::<bool>(),
    ) {
        let cart = cart(&lines, shipping).ok_or_else(|| TestCaseError::fail("cart"))?;

        let candidates = [
            promotion("PCT-OFF", Benefit::Percentage { percent: Decimal::from(percent) }, !exclusive),
            promotion("AMOUNT-OFF", Benefit::FixedAmount { amount_minor: amount }, true),
            promotion(
                "BUNDLE",
                Benefit::Bundle { buy_qty: 2, get_qty: 1, discount_percent: Decimal::from(percent) },
                true,
            ),
            promotion("SHIP-FREE", Benefit::FreeShipping, true),
        ]
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| TestCaseError::fail("promotion"))?;

        let refs: Vec<&Promotion> = candidates.iter().collect();
        let resolution = resolve(&refs, &cart, &StackingPolicy::default())
            .map_err(|err| TestCaseError::fail(err.to_string()))?;

        prop_assert!(resolution.discount_minor >= 0);
        prop_assert!(resolution.discount_minor <= cart.subtotal_minor);
        prop_assert!(resolution.residual_subtotal_minor >= 0);
        prop_assert_eq!(resolution.shipping_discount_minor, shipping);
        prop_assert_eq!(
            resolution.line_discounts.iter().map(|line| line.discount_minor).sum::<i64>(),
            resolution.discount_minor
        );
    }
}
