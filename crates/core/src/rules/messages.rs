//! Rule message templates.
//!
//! Rules never produce free text. Each outcome carries a [`RuleMessage`]
//! holding the facts the rule looked at, and the text is filled in per locale
//! when the outcome is rendered.

use jiff::Timestamp;
use serde::Serialize;

use crate::{cart::Channel, locale::Locale, money::{CurrencyCode, Money}, promotions::PromotionStatus};

/// A message template with its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "template", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RuleMessage {
    /// Inside the window.
    Live { ends_at: Timestamp },
    /// Window not open yet.
    NotStarted { starts_at: Timestamp },
    /// Window closed.
    Ended { ends_at: Timestamp },
    /// Status is not offerable.
    NotLive { status: PromotionStatus },

    /// Channel allowed.
    ChannelAllowed { channel: Channel },
    /// Channel not allowed.
    ChannelNotAllowed { channel: Channel },

    /// No promotion currency.
    AnyCurrency,
    /// Currencies agree.
    CurrencyMatches { currency: CurrencyCode },
    /// Currencies disagree.
    CurrencyMismatch { expected: CurrencyCode, found: CurrencyCode },

    /// No segment targeting.
    AllSegments,
    /// Segment matches.
    SegmentMatches { segment: String },
    /// Segment does not match.
    SegmentMismatch { expected: String },

    /// No eligibility tokens.
    NoEligibilityRules,
    /// Every token present.
    EligibilitySatisfied { tokens: Vec<String> },
    /// Tokens missing.
    EligibilityMissing { missing: Vec<String> },

    /// No minimum.
    NoMinimum,
    /// Minimum met.
    SubtotalMet { minimum: Money },
    /// Minimum not met.
    SubtotalShort { minimum: Money, shortfall: Money },

    /// No country restriction.
    AnyCountry,
    /// Country allowed.
    CountryAllowed { country: String },
    /// Country not allowed.
    CountryNotAllowed { country: String },

    /// No currency restriction.
    AnyCartCurrency,
    /// Currency allowed.
    CartCurrencyAllowed { currency: CurrencyCode },
    /// Currency not allowed.
    CartCurrencyNotAllowed { currency: CurrencyCode },

    /// Cart has no lines.
    EmptyCart,
    /// No item filters.
    AnyProduct,
    /// Some lines match.
    ProductsMatched { matched: usize, total: usize },
    /// No line matches.
    NoProductsMatched,

    /// Not restricted to new customers.
    OpenToAllCustomers,
    /// Customer has never redeemed.
    NewCustomer,
    /// Customer has redeemed before.
    ReturningCustomer { prior: u64 },
    /// Guest without a new-customer flag.
    GuestNotNewCustomer,

    /// No total cap.
    UnlimitedUsage,
    /// Redemptions left.
    UsageRemaining { remaining: u64, limit: u64 },
    /// Total cap reached.
    UsageExhausted { limit: u64 },

    /// No per-customer cap.
    UnlimitedPerCustomer,
    /// Customer redemptions left.
    PerCustomerRemaining { remaining: u64, limit: u64 },
    /// Customer cap reached.
    PerCustomerExhausted { limit: u64 },
    /// Customer manually blocked.
    CustomerBlocked,
    /// Guests cannot be tracked against a per-customer cap.
    GuestCannotRedeem,

    /// No budget.
    NoBudget,
    /// Budget comfortably available.
    BudgetAvailable { remaining: Money },
    /// Budget nearly spent.
    BudgetLow { remaining: Money },
    /// Budget would be exceeded.
    BudgetExceeded { remaining: Money, estimate: Money },

    /// Sale items allowed.
    SaleItemsAllowed,
    /// No sale items in the cart.
    NoSaleItems,
    /// Sale items present but not allowed.
    SaleItemsPresent { count: usize },
}

fn when(at: Timestamp) -> String {
    at.strftime("%Y-%m-%d %H:%M UTC").to_string()
}

impl RuleMessage {
    /// Fill the template for `locale`.
    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::Ja => self.render_ja(),
            Locale::En => self.render_en(),
        }
    }

    fn render_ja(&self) -> String {
        match self {
            Self::Live { ends_at } => {
                format!("現在の日時で適用可能な期間内です（{}まで）。", when(*ends_at))
            }
            Self::NotStarted { starts_at } => {
                format!("適用期間は{}から開始します。", when(*starts_at))
            }
            Self::Ended { ends_at } => format!("適用期間は{}に終了しました。", when(*ends_at)),
            Self::NotLive { status } => {
                format!("ステータスが「{status}」のため適用できません。")
            }
            Self::ChannelAllowed { channel } => format!("チャネル「{channel}」で利用できます。"),
            Self::ChannelNotAllowed { channel } => {
                format!("チャネル「{channel}」では利用できません。")
            }
            Self::AnyCurrency => "通貨の指定はありません。".to_string(),
            Self::CurrencyMatches { currency } => format!("通貨 {currency} が一致しています。"),
            Self::CurrencyMismatch { expected, found } => {
                format!("カートの通貨 {found} はプロモーションの通貨 {expected} と一致しません。")
            }
            Self::AllSegments => "すべての顧客セグメントが対象です。".to_string(),
            Self::SegmentMatches { segment } => format!("セグメント「{segment}」が対象です。"),
            Self::SegmentMismatch { expected } => {
                format!("セグメント「{expected}」の顧客のみが対象です。")
            }
            Self::NoEligibilityRules => "追加の適用条件はありません。".to_string(),
            Self::EligibilitySatisfied { tokens } => {
                format!("適用条件（{}）を満たしています。", tokens.join("、"))
            }
            Self::EligibilityMissing { missing } => {
                format!("適用条件（{}）を満たしていません。", missing.join("、"))
            }
            Self::NoMinimum => "最低購入金額の条件はありません。".to_string(),
            Self::SubtotalMet { minimum } => {
                format!("小計が最低購入金額 {minimum} 以上です。")
            }
            Self::SubtotalShort { minimum, shortfall } => {
                format!("最低購入金額 {minimum} まであと {shortfall} 必要です。")
            }
            Self::AnyCountry => "配送国の制限はありません。".to_string(),
            Self::CountryAllowed { country } => format!("配送国 {country} は対象です。"),
            Self::CountryNotAllowed { country } => format!("配送国 {country} は対象外です。"),
            Self::AnyCartCurrency => "通貨の制限はありません。".to_string(),
            Self::CartCurrencyAllowed { currency } => format!("通貨 {currency} は利用可能です。"),
            Self::CartCurrencyNotAllowed { currency } => {
                format!("通貨 {currency} は利用できません。")
            }
            Self::EmptyCart => "カートに商品がありません。".to_string(),
            Self::AnyProduct => "すべての商品が対象です。".to_string(),
            Self::ProductsMatched { matched, total } => {
                format!("{total}件中{matched}件の商品が対象です。")
            }
            Self::NoProductsMatched => "対象商品がカートに含まれていません。".to_string(),
            Self::OpenToAllCustomers => "すべての顧客が利用できます。".to_string(),
            Self::NewCustomer => "新規顧客であることを確認しました。".to_string(),
            Self::ReturningCustomer { prior } => {
                format!("過去に{prior}回プロモーションを利用しているため対象外です。")
            }
            Self::GuestNotNewCustomer => {
                "ゲスト購入では新規顧客であることを確認できません。".to_string()
            }
            Self::UnlimitedUsage => "利用回数の上限はありません。".to_string(),
            Self::UsageRemaining { remaining, limit } => {
                format!("利用上限{limit}回のうち残り{remaining}回です。")
            }
            Self::UsageExhausted { limit } => format!("利用上限{limit}回に達しています。"),
            Self::UnlimitedPerCustomer => "顧客ごとの利用上限はありません。".to_string(),
            Self::PerCustomerRemaining { remaining, limit } => {
                format!("顧客ごとの上限{limit}回のうち残り{remaining}回です。")
            }
            Self::PerCustomerExhausted { limit } => {
                format!("顧客ごとの利用上限{limit}回に達しています。")
            }
            Self::CustomerBlocked => "この顧客は利用停止中です。".to_string(),
            Self::GuestCannotRedeem => {
                "顧客ごとの利用上限があるため、ゲスト購入では利用できません。".to_string()
            }
            Self::NoBudget => "予算の上限はありません。".to_string(),
            Self::BudgetAvailable { remaining } => format!("予算残高は {remaining} です。"),
            Self::BudgetLow { remaining } => {
                format!("予算残高が少なくなっています（残り {remaining}）。")
            }
            Self::BudgetExceeded { remaining, estimate } => {
                format!("割引見込み額 {estimate} が予算残高 {remaining} を超えています。")
            }
            Self::SaleItemsAllowed => "セール品との併用が可能です。".to_string(),
            Self::NoSaleItems => "セール品は含まれていません。".to_string(),
            Self::SaleItemsPresent { count } => {
                format!("セール品が{count}件含まれているため併用できません。")
            }
        }
    }

    fn render_en(&self) -> String {
        match self {
            Self::Live { ends_at } => {
                format!("Within the active window (until {}).", when(*ends_at))
            }
            Self::NotStarted { starts_at } => format!("Starts at {}.", when(*starts_at)),
            Self::Ended { ends_at } => format!("Ended at {}.", when(*ends_at)),
            Self::NotLive { status } => format!("Not available while {status}."),
            Self::ChannelAllowed { channel } => format!("Available on {channel}."),
            Self::ChannelNotAllowed { channel } => format!("Not available on {channel}."),
            Self::AnyCurrency => "No currency restriction.".to_string(),
            Self::CurrencyMatches { currency } => format!("Cart currency {currency} matches."),
            Self::CurrencyMismatch { expected, found } => {
                format!("Cart currency {found} does not match {expected}.")
            }
            Self::AllSegments => "Open to every segment.".to_string(),
            Self::SegmentMatches { segment } => format!("Customer is in segment {segment}."),
            Self::SegmentMismatch { expected } => {
                format!("Only customers in segment {expected} qualify.")
            }
            Self::NoEligibilityRules => "No additional eligibility rules.".to_string(),
            Self::EligibilitySatisfied { tokens } => {
                format!("Eligibility satisfied: {}.", tokens.join(", "))
            }
            Self::EligibilityMissing { missing } => {
                format!("Eligibility not met: {}.", missing.join(", "))
            }
            Self::NoMinimum => "No minimum subtotal.".to_string(),
            Self::SubtotalMet { minimum } => format!("Subtotal meets the {minimum} minimum."),
            Self::SubtotalShort { minimum, shortfall } => {
                format!("Add {shortfall} more to reach the {minimum} minimum.")
            }
            Self::AnyCountry => "No country restriction.".to_string(),
            Self::CountryAllowed { country } => format!("Ships to {country}."),
            Self::CountryNotAllowed { country } => format!("Not available for {country}."),
            Self::AnyCartCurrency => "No currency list restriction.".to_string(),
            Self::CartCurrencyAllowed { currency } => format!("{currency} is accepted."),
            Self::CartCurrencyNotAllowed { currency } => format!("{currency} is not accepted."),
            Self::EmptyCart => "The cart is empty.".to_string(),
            Self::AnyProduct => "Every product qualifies.".to_string(),
            Self::ProductsMatched { matched, total } => {
                format!("{matched} of {total} lines qualify.")
            }
            Self::NoProductsMatched => "No qualifying products in the cart.".to_string(),
            Self::OpenToAllCustomers => "Open to all customers.".to_string(),
            Self::NewCustomer => "First-time customer confirmed.".to_string(),
            Self::ReturningCustomer { prior } => {
                format!("Customer has {prior} prior redemptions.")
            }
            Self::GuestNotNewCustomer => "Guest checkout is not confirmed as new.".to_string(),
            Self::UnlimitedUsage => "No total usage limit.".to_string(),
            Self::UsageRemaining { remaining, limit } => {
                format!("{remaining} of {limit} redemptions left.")
            }
            Self::UsageExhausted { limit } => format!("All {limit} redemptions used."),
            Self::UnlimitedPerCustomer => "No per-customer limit.".to_string(),
            Self::PerCustomerRemaining { remaining, limit } => {
                format!("{remaining} of {limit} redemptions left for this customer.")
            }
            Self::PerCustomerExhausted { limit } => {
                format!("Customer has used all {limit} redemptions.")
            }
            Self::CustomerBlocked => "Customer is blocked from this promotion.".to_string(),
            Self::GuestCannotRedeem => {
                "Guests cannot redeem a promotion with a per-customer limit.".to_string()
            }
            Self::NoBudget => "No budget cap.".to_string(),
            Self::BudgetAvailable { remaining } => format!("{remaining} of budget remaining."),
            Self::BudgetLow { remaining } => format!("Budget nearly spent: {remaining} left."),
            Self::BudgetExceeded { remaining, estimate } => {
                format!("Estimated discount {estimate} exceeds the remaining budget {remaining}.")
            }
            Self::SaleItemsAllowed => "Combines with sale prices.".to_string(),
            Self::NoSaleItems => "No sale items in the cart.".to_string(),
            Self::SaleItemsPresent { count } => {
                format!("{count} sale items cannot be combined with this promotion.")
            }
        }
    }
}
