//! Money
//!
//! Every monetary amount in the engine is an integer count of a currency's
//! minor unit. Percentages are [`Decimal`]s and results are rounded half to
//! even, so no floating point value ever reaches a money path.

use std::{
    cmp::Reverse,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::iso;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The code is not a known ISO 4217 currency.
    #[error("unknown currency code {0:?}")]
    UnknownCurrency(String),

    /// Two amounts in different currencies were combined.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// Currency of the left-hand side.
        expected: CurrencyCode,

        /// Currency of the right-hand side.
        found: CurrencyCode,
    },

    /// A negative amount or weight was supplied where only non-negative ones make sense.
    #[error("amount must not be negative: {0}")]
    Negative(i64),

    /// The result does not fit in an `i64`.
    #[error("money arithmetic overflowed")]
    Overflow,

    /// A non-zero amount was split across zero weights.
    #[error("cannot split {0} across an empty set of weights")]
    NothingToSplit(i64),
}

/// A validated, upper-case ISO 4217 currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Parse a code, ignoring surrounding whitespace and case.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::UnknownCurrency`] when the code is not three
    /// letters or is not an ISO 4217 currency.
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        let code = raw.trim().to_ascii_uppercase();

        let bytes: [u8; 3] = code
            .as_bytes()
            .try_into()
            .map_err(|_err| MoneyError::UnknownCurrency(code.clone()))?;

        if !bytes.iter().all(u8::is_ascii_uppercase) || iso::find(&code).is_none() {
            return Err(MoneyError::UnknownCurrency(code));
        }

        Ok(Self(bytes))
    }

    /// The three-letter code.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }

    /// The `rusty_money` currency definition backing this code.
    pub fn currency(&self) -> Option<&'static iso::Currency> {
        iso::find(self.as_str())
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.as_str().to_string()
    }
}

/// An amount in minor units of a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units.
    pub minor: i64,

    /// Currency the amount is denominated in.
    pub currency: CurrencyCode,
}

impl Money {
    /// Construct an amount.
    pub const fn new(minor: i64, currency: CurrencyCode) -> Self {
        Self { minor, currency }
    }

    /// Zero in the given currency.
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self::new(0, currency)
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;

        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MoneyError::Overflow)?;

        Ok(Self::new(minor, self.currency))
    }

    /// Subtract an amount of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;

        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or(MoneyError::Overflow)?;

        Ok(Self::new(minor, self.currency))
    }

    /// `percent`% of this amount, rounded half to even.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] when the result cannot be represented.
    pub fn percent(self, percent: Decimal) -> Result<Self, MoneyError> {
        Ok(Self::new(percent_of_minor(percent, self.minor)?, self.currency))
    }

    /// Split this amount across `weights`; see [`split_proportional`].
    ///
    /// # Errors
    ///
    /// Propagates errors from [`split_proportional`].
    pub fn split_proportional(self, weights: &[i64]) -> Result<Vec<Self>, MoneyError> {
        Ok(split_proportional(self.minor, weights)?
            .into_iter()
            .map(|minor| Self::new(minor, self.currency))
            .collect())
    }

    fn ensure_same_currency(self, other: Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            })
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.currency.currency() {
            Some(currency) => Display::fmt(&rusty_money::Money::from_minor(self.minor, currency), f),
            None => write!(f, "{} {}", self.minor, self.currency),
        }
    }
}

/// `percent`% of `minor`, rounded half to even.
///
/// # Errors
///
/// Returns [`MoneyError::Overflow`] when the intermediate product or the
/// result does not fit.
pub fn percent_of_minor(percent: Decimal, minor: i64) -> Result<i64, MoneyError> {
    Decimal::from(minor)
        .checked_mul(percent)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(MoneyError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .ok_or(MoneyError::Overflow)
}

/// Distribute `total` across `weights` proportionally.
///
/// Each share is rounded half to even. The rounding residual is then settled
/// against the largest weights first (lowest index on ties), never letting a
/// share exceed its weight when `total` fits within the weights, and never
/// letting a share go negative. The shares always sum to `total`.
///
/// # Errors
///
/// Returns an error for negative inputs, an empty weight set with a non-zero
/// total, or when all weights are zero but the total is not.
pub fn split_proportional(total: i64, weights: &[i64]) -> Result<Vec<i64>, MoneyError> {
    if total < 0 {
        return Err(MoneyError::Negative(total));
    }

    if let Some(&negative) = weights.iter().find(|weight| **weight < 0) {
        return Err(MoneyError::Negative(negative));
    }

    let weight_sum: i128 = weights.iter().map(|weight| i128::from(*weight)).sum();

    if total == 0 {
        return Ok(vec![0; weights.len()]);
    }

    if weight_sum == 0 {
        return Err(MoneyError::NothingToSplit(total));
    }

    let mut shares = weights
        .iter()
        .map(|weight| {
            let share = div_round_half_even(i128::from(total) * i128::from(*weight), weight_sum);

            i64::try_from(share).map_err(|_err| MoneyError::Overflow)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let capped = i128::from(total) <= weight_sum;

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by_key(|idx| (Reverse(weights.get(*idx).copied().unwrap_or_default()), *idx));

    let mut residual = total - shares.iter().sum::<i64>();

    for idx in order {
        if residual == 0 {
            break;
        }

        let (Some(share), Some(weight)) = (shares.get_mut(idx), weights.get(idx)) else {
            continue;
        };

        if residual > 0 {
            let room = if capped { weight - *share } else { residual };
            let step = room.min(residual);

            *share += step;
            residual -= step;
        } else {
            let step = (*share).min(-residual);

            *share -= step;
            residual += step;
        }
    }

    Ok(shares)
}

/// Integer division of non-negative operands, rounding half to even.
pub(crate) fn div_round_half_even(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    match (remainder * 2).cmp(&denominator) {
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 != 0 => quotient + 1,
        _ => quotient,
    }
}
