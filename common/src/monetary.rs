//! Monetary types for fxpair.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currency code as reported by the rate provider (fiat or crypto).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Check if the code is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn eth() -> Self {
        Self::new("ETH")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Error for a rate that cannot be used in a rate table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRate {
    /// The rate text is not a decimal number.
    #[error("not a decimal number: {0:?}")]
    NotANumber(String),

    /// The rate is zero or negative.
    #[error("rate must be positive, got {0}")]
    NotPositive(Decimal),
}

/// Quantity of a currency equal to one unit of a table's base currency.
///
/// Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// The rate of a base currency against itself.
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// Create a rate, rejecting non-positive values.
    pub fn new(value: Decimal) -> Result<Self, InvalidRate> {
        if value <= Decimal::ZERO {
            return Err(InvalidRate::NotPositive(value));
        }
        Ok(Self(value))
    }

    /// Parse a rate from its decimal text.
    pub fn parse(text: &str) -> Result<Self, InvalidRate> {
        let trimmed = text.trim();
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| InvalidRate::NotANumber(text.to_string()))?;
        Self::new(value)
    }

    /// Get the decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = InvalidRate;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two amount fields of a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The "from" amount.
    #[default]
    From,
    /// The "to" amount.
    To,
}

impl Side {
    /// The other side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::From => Side::To,
            Side::To => Side::From,
        }
    }
}

/// An amount field: the text shown to the user and the number it stands for.
///
/// Text that does not parse as a decimal keeps its raw form for display but
/// counts as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountInput {
    /// Raw text as typed or as derived.
    pub text: String,
    /// Numeric value used for conversion.
    pub value: Decimal,
}

impl AmountInput {
    /// Create from text typed by the user.
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let value = parse_amount(&text).unwrap_or(Decimal::ZERO);
        Self { text, value }
    }

    /// Create from a computed value.
    pub fn from_value(value: Decimal) -> Self {
        let value = value.normalize();
        Self {
            text: value.to_string(),
            value,
        }
    }

    /// An empty field, worth zero.
    pub fn zero() -> Self {
        Self {
            text: String::new(),
            value: Decimal::ZERO,
        }
    }

    /// Check if the text is a valid number.
    pub fn is_numeric(&self) -> bool {
        parse_amount(&self.text).is_some()
    }
}

impl Default for AmountInput {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for AmountInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

fn parse_amount(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}
