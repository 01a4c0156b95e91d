//! Money types with integer minor-unit arithmetic
//!
//! This module provides a type-safe representation of monetary values as an
//! integer count of minor units (paise, cents). All arithmetic, comparison and
//! percentage math is done on integers. Decimal major-unit values only appear at
//! the system boundary through [`Money::from_major`] and [`Money::to_major`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    INR,
    USD,
    EUR,
    GBP,
    SGD,
    AED,
    JPY,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the number of minor units in one major unit
    pub fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.decimal_places())
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::SGD => "S$",
            Currency::AED => "AED",
            Currency::JPY => "¥",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::SGD => "SGD",
            Currency::AED => "AED",
            Currency::JPY => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "SGD" => Ok(Currency::SGD),
            "AED" => Ok(Currency::AED),
            "JPY" => Ok(Currency::JPY),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Negative amount not allowed: {0} minor units")]
    NegativeAmount(i64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A non-negative monetary amount held as integer minor units
///
/// Construction always goes through a validating constructor, including
/// deserialization, so a `Money` value can never be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    minor: i64,
    currency: Currency,
}

#[derive(Deserialize)]
struct RawMoney {
    minor: i64,
    currency: Currency,
}

impl TryFrom<RawMoney> for Money {
    type Error = MoneyError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::from_minor(raw.minor, raw.currency)
    }
}

impl Money {
    /// Creates Money from an integer amount in minor units (e.g., paise)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Result<Self, MoneyError> {
        if minor_units < 0 {
            return Err(MoneyError::NegativeAmount(minor_units));
        }
        Ok(Self {
            minor: minor_units,
            currency,
        })
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Converts a major-unit decimal (e.g. rupees) into minor units
    ///
    /// Rejects negative values and values with more fractional digits than
    /// the currency supports; nothing is silently rounded.
    pub fn from_major(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::InvalidAmount(format!(
                "{} is negative",
                amount
            )));
        }

        let scaled = amount
            .checked_mul(Decimal::from(currency.minor_per_major()))
            .ok_or(MoneyError::Overflow)?;

        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::InvalidAmount(format!(
                "{} has more than {} decimal places for {}",
                amount,
                currency.decimal_places(),
                currency
            )));
        }

        let minor = scaled.to_i64().ok_or(MoneyError::Overflow)?;

        Self::from_minor(minor, currency)
    }

    /// Returns the amount as a major-unit decimal for display
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.minor, self.currency.decimal_places())
    }

    /// Returns the amount in minor units
    pub fn minor_units(&self) -> i64 {
        self.minor
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }

    /// Checked addition that returns an error on currency mismatch or overflow
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MoneyError::Overflow)?;
        Self::from_minor(minor, self.currency)
    }

    /// Checked subtraction; a result below zero is an error, not a wrap
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Self::from_minor(self.minor - other.minor, self.currency)
    }

    /// Compares two amounts of the same currency
    pub fn compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// Returns the smaller of two amounts of the same currency
    pub fn min(&self, other: &Money) -> Result<Money, MoneyError> {
        Ok(match self.compare(other)? {
            Ordering::Greater => *other,
            _ => *self,
        })
    }

    /// Applies a rate in basis points (1/100 of a percent), rounding half up
    ///
    /// `percentage_bps(250)` is 2.5% of the amount.
    pub fn percentage_bps(&self, basis_points: u32) -> Result<Money, MoneyError> {
        let product = i128::from(self.minor) * i128::from(basis_points);
        let rounded = (product + 5_000) / 10_000;
        let minor = i64::try_from(rounded).map_err(|_| MoneyError::Overflow)?;
        Self::from_minor(minor, self.currency)
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency.symbol(), self.to_major())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(500_000, Currency::INR).unwrap();
        assert_eq!(m.minor_units(), 500_000);
        assert_eq!(m.to_major(), dec!(5000.00));
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(
            Money::from_minor(-1, Currency::INR),
            Err(MoneyError::NegativeAmount(-1))
        );
        assert!(Money::from_major(dec!(-0.01), Currency::INR).is_err());
    }

    #[test]
    fn test_from_major_exact() {
        let m = Money::from_major(dec!(1234.56), Currency::INR).unwrap();
        assert_eq!(m.minor_units(), 123_456);

        let whole = Money::from_major(dec!(2000), Currency::INR).unwrap();
        assert_eq!(whole.minor_units(), 200_000);
    }

    #[test]
    fn test_from_major_rejects_sub_minor_precision() {
        let result = Money::from_major(dec!(10.005), Currency::INR);
        assert!(matches!(result, Err(MoneyError::InvalidAmount(_))));
    }

    #[test]
    fn test_checked_sub_below_zero() {
        let a = Money::from_minor(100, Currency::INR).unwrap();
        let b = Money::from_minor(101, Currency::INR).unwrap();
        assert_eq!(a.checked_sub(&b), Err(MoneyError::NegativeAmount(-1)));
    }

    #[test]
    fn test_currency_mismatch() {
        let inr = Money::from_minor(100, Currency::INR).unwrap();
        let usd = Money::from_minor(100, Currency::USD).unwrap();

        assert!(matches!(inr.checked_add(&usd), Err(MoneyError::CurrencyMismatch(_, _))));
        assert_eq!(inr.partial_cmp(&usd), None);
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        let m = Money::from_minor(1_001, Currency::INR).unwrap();
        // 2% of 1001 = 20.02 -> 20
        assert_eq!(m.percentage_bps(200).unwrap().minor_units(), 20);
        // 50% of 1001 = 500.5 -> 501
        assert_eq!(m.percentage_bps(5_000).unwrap().minor_units(), 501);
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        let json = r#"{"minor":-5,"currency":"INR"}"#;
        assert!(serde_json::from_str::<Money>(json).is_err());

        let ok = r#"{"minor":5,"currency":"INR"}"#;
        let m: Money = serde_json::from_str(ok).unwrap();
        assert_eq!(m.minor_units(), 5);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn add_then_sub_is_identity(
            a in 0i64..1_000_000_000_000i64,
            b in 0i64..1_000_000_000_000i64,
        ) {
            let ma = Money::from_minor(a, Currency::INR).unwrap();
            let mb = Money::from_minor(b, Currency::INR).unwrap();
            let sum = ma.checked_add(&mb).unwrap();
            prop_assert_eq!(sum.checked_sub(&mb).unwrap(), ma);
        }

        #[test]
        fn major_minor_conversion_is_lossless(minor in 0i64..1_000_000_000_000i64) {
            let m = Money::from_minor(minor, Currency::INR).unwrap();
            let back = Money::from_major(m.to_major(), Currency::INR).unwrap();
            prop_assert_eq!(back, m);
        }
    }
}
