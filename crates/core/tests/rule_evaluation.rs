//! Rule evaluation and stacking driven from promotion definitions.

use jiff::Timestamp;
use testresult::TestResult;

use hanko_promotions::{
    cart::CartContext,
    locale::Locale,
    promotions::{Promotion, PromotionDraft},
    rules::{EvaluationSettings, RuleInput, RuleKey, RuleReport, evaluate},
    stacking::{StackingPolicy, resolve},
    usage::{PromotionUsage, UsageSnapshot},
};

const PROMOTIONS: &str = r"
- code: welcome10
  name: Welcome
  status: active
  benefit: { kind: percentage, percent: 10 }
  currency: JPY
  channels: [online_store]
  conditions: { newCustomerOnly: true }
  schedule: { startsAt: '2024-03-01T00:00:00Z', endsAt: '2024-04-01T00:00:00Z' }
- code: BIG20
  name: Twenty off
  status: active
  benefit: { kind: percentage, percent: 20 }
  currency: JPY
  channels: [online_store]
  stacking: { combinable: false }
  schedule: { startsAt: '2024-03-01T00:00:00Z', endsAt: '2024-04-01T00:00:00Z' }
- code: TAKE500
  name: Five hundred off
  status: active
  benefit: { kind: fixed_amount, amountMinor: 500 }
  currency: JPY
  channels: [online_store]
  schedule: { startsAt: '2024-03-01T00:00:00Z', endsAt: '2024-04-01T00:00:00Z' }
- code: SHIPFREE
  name: Free shipping
  status: active
  benefit: { kind: free_shipping }
  channels: [online_store]
  schedule: { startsAt: '2024-03-01T00:00:00Z', endsAt: '2024-04-01T00:00:00Z' }
";

const CART: &str = r#"{
  "userId": "u-42",
  "currency": "JPY",
  "channel": "online_store",
  "country": "JP",
  "subtotalMinor": 10000,
  "shippingMinor": 800,
  "items": [{ "sku": "SEAL-15", "quantity": 1, "priceMinor": 10000 }]
}"#;

fn now() -> Result<Timestamp, jiff::Error> {
    "2024-03-15T09:00:00Z".parse()
}

fn promotions() -> TestResult<Vec<Promotion>> {
    let drafts: Vec<PromotionDraft> = serde_norway::from_str(PROMOTIONS)?;
    let now = now()?;

    Ok(drafts
        .into_iter()
        .map(|draft| draft.into_promotion(now))
        .collect::<Result<_, _>>()?)
}

fn by_code<'p>(promotions: &'p [Promotion], code: &str) -> TestResult<&'p Promotion> {
    Ok(promotions
        .iter()
        .find(|promotion| promotion.code.as_str() == code)
        .ok_or("missing promotion")?)
}

fn report(promotion: &Promotion, cart: &CartContext, usage: UsageSnapshot) -> TestResult<RuleReport> {
    Ok(evaluate(&RuleInput {
        promotion,
        cart,
        now: now()?,
        usage,
        settings: EvaluationSettings::default(),
    }))
}

#[test]
fn new_customer_offer_rejects_customers_with_usage_elsewhere() -> TestResult {
    let promotions = promotions()?;
    let welcome = by_code(&promotions, "WELCOME10")?;
    let cart: CartContext = serde_json::from_str(CART)?;

    // One redemption of a different promotion.
    let mut elsewhere = PromotionUsage::new("u-42");
    elsewhere.record("order-1", now()?);

    let report = report(
        welcome,
        &cart,
        UsageSnapshot::from_usage(None, elsewhere.times),
    )?;

    assert!(!report.eligible(), "returning customer must be rejected");
    assert_eq!(
        report.blockers().map(|outcome| outcome.key).collect::<Vec<_>>(),
        vec![RuleKey::NewCustomerOnly]
    );

    Ok(())
}

#[test]
fn rendered_report_lists_every_rule() -> TestResult {
    let promotions = promotions()?;
    let cart: CartContext = serde_json::from_str(CART)?;

    let report = report(by_code(&promotions, "TAKE500")?, &cart, UsageSnapshot::default())?;
    let rendered = serde_json::to_value(report.render(Locale::En))?;

    let keys: Vec<&str> = rendered
        .as_array()
        .ok_or("expected an array")?
        .iter()
        .filter_map(|rule| rule.get("key").and_then(|key| key.as_str()))
        .collect();

    assert_eq!(keys.len(), 14);
    assert_eq!(keys.first(), Some(&"status_live"));
    assert_eq!(keys.last(), Some(&"sale_price_compatible"));
    assert!(report.eligible(), "{report:?}");

    Ok(())
}

#[test]
fn eligible_promotions_resolve_to_the_best_stack() -> TestResult {
    let promotions = promotions()?;
    let cart: CartContext = serde_json::from_str(CART)?;

    let mut eligible = Vec::new();

    for promotion in &promotions {
        if report(promotion, &cart, UsageSnapshot::default())?.eligible() {
            eligible.push(promotion);
        }
    }

    let resolution = resolve(&eligible, &cart, &StackingPolicy::default())?;

    let big = by_code(&promotions, "BIG20")?;
    let welcome = by_code(&promotions, "WELCOME10")?;
    let shipping = by_code(&promotions, "SHIPFREE")?;

    // BIG20 is exclusive on items, so only shipping may join it. WELCOME10
    // and TAKE500 together only reach 1,450.
    assert_eq!(resolution.selected, vec![big.id, shipping.id]);
    assert!(resolution.application_for(welcome.id).is_none(), "excluded");
    assert_eq!(resolution.discount_minor, 2_000);
    assert_eq!(resolution.shipping_discount_minor, 800);

    Ok(())
}
