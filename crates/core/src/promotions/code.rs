//! Promotion codes

use std::{
    borrow::Borrow,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted code.
pub const MIN_CODE_LEN: usize = 4;

/// Longest accepted code.
pub const MAX_CODE_LEN: usize = 64;

/// Malformed promotion code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Length outside `4..=64`.
    #[error("code must be {MIN_CODE_LEN} to {MAX_CODE_LEN} characters, got {0}")]
    Length(usize),

    /// Character outside `A-Z`, `0-9` and `-`.
    #[error("code contains invalid character {0:?}")]
    Character(char),
}

/// A normalised promotion code: trimmed, upper-case, `^[A-Z0-9-]{4,64}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromotionCode(String);

impl PromotionCode {
    /// Normalise and validate a raw code.
    ///
    /// # Errors
    ///
    /// Returns a [`CodeError`] when the normalised code is malformed.
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        let code = raw.trim().to_uppercase();
        let len = code.chars().count();

        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return Err(CodeError::Length(len));
        }

        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(CodeError::Character(bad));
        }

        Ok(Self(code))
    }

    /// Wrap a string without validation; only used to report problems.
    pub(super) const fn unchecked(code: String) -> Self {
        Self(code)
    }

    /// The normalised code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PromotionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for PromotionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PromotionCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PromotionCode> for String {
    fn from(value: PromotionCode) -> Self {
        value.0
    }
}

impl Borrow<str> for PromotionCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}
