//! Test Helpers

use hanko_promotions::{
    cart::{CartContext, CartItem, Channel},
    money::CurrencyCode,
    promotions::PromotionDraft,
};

use crate::domain::redemptions::RedemptionIntent;

/// Parse a YAML promotion draft.
pub(crate) fn draft(yaml: &str) -> PromotionDraft {
    serde_norway::from_str(yaml).expect("valid draft YAML")
}

/// `SPRING24`: 10% off JPY online carts during March 2024.
pub(crate) fn spring24() -> PromotionDraft {
    draft(
        r#"
code: spring24
name: Spring sale
status: active
benefit:
  kind: percentage
  percent: "10"
currency: JPY
channels: [online_store]
schedule:
  startsAt: 2024-03-01T00:00:00Z
  endsAt: 2024-04-01T00:00:00Z
"#,
    )
}

/// `SPRING24` with the given code and limits.
pub(crate) fn limited(code: &str, total: u64, per_customer: u64) -> PromotionDraft {
    PromotionDraft {
        code: code.to_string(),
        usage_limit_total: total,
        usage_limit_per_customer: per_customer,
        ..spring24()
    }
}

pub(crate) fn jpy() -> CurrencyCode {
    CurrencyCode::parse("JPY").expect("valid currency")
}

/// One line of `subtotal` JPY in the online store.
pub(crate) fn cart(user_id: Option<&str>, subtotal: i64) -> CartContext {
    CartContext {
        user_id: user_id.map(ToString::to_string),
        currency: jpy(),
        channel: Channel::OnlineStore,
        country: "JP".to_string(),
        subtotal_minor: subtotal,
        shipping_minor: 800,
        segment_key: None,
        items: vec![CartItem {
            line_id: Some("line-1".to_string()),
            sku: "SEAL-ROUND-15".to_string(),
            quantity: 1,
            price_minor: subtotal,
            product_ref: Some("/products/seal-round".to_string()),
            material_ref: None,
            shape: Some("round".to_string()),
            size_mm: Some(15),
            on_sale: false,
        }],
        flags: Default::default(),
    }
}

pub(crate) fn intent(code: &str, key: &str, order_ref: &str, cart: CartContext) -> RedemptionIntent {
    RedemptionIntent {
        promotion_code: code.to_string(),
        idempotency_key: key.to_string(),
        actor_ref: String::new(),
        order_ref: order_ref.to_string(),
        cart,
    }
}
