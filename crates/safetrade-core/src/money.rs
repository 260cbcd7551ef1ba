//! # Money: Currency Codes and Half-Up Rounding
//!
//! All amounts are `rust_decimal::Decimal`. Rounding is half-up in the
//! commercial sense (midpoint away from zero), so `0.005` rounds to `0.01`
//! and `-0.005` rounds to `-0.01`. Percentages are expressed in whole
//! percent (`19` means 19%).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing money primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Currency code is not three ASCII uppercase letters.
    #[error("invalid currency code {0:?}: expected three uppercase letters (ISO 4217)")]
    InvalidCurrency(String),
}

/// An ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Validate and wrap a currency code. Lowercase input is uppercased.
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let upper = code.trim().to_ascii_uppercase();
        if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(upper))
        } else {
            Err(MoneyError::InvalidCurrency(code.to_string()))
        }
    }

    /// The euro, the marketplace default.
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::eur()
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Round to `dp` decimal places, half-up (midpoint away from zero).
///
/// The result always carries exactly `dp` fractional digits, so
/// `round_half_up(190, 2)` renders as `190.00`.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// `amount * percent / 100`, rounded half-up to cents.
pub fn percentage_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_half_up(amount * percent / Decimal::ONE_HUNDRED, 2)
}
