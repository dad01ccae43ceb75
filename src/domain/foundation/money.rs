//! Monetary amounts in integer minor units.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// ISO 4217 currency code, upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Creates a currency from a three-letter code (case-insensitive).
    pub fn new(code: impl AsRef<str>) -> Result<Self, ValidationError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "must be a 3-letter ISO code",
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of decimal digits in the currency's minor unit.
    pub fn minor_unit_digits(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-negative amount in minor units (e.g. fen, cents) with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates an amount, rejecting negative values.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, ValidationError> {
        if amount < 0 {
            return Err(ValidationError::out_of_range("amount", 0, i64::MAX, amount));
        }
        Ok(Self { amount, currency })
    }

    /// Amount in minor units.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Formats in major units with the currency's precision, e.g. `29.99`.
    ///
    /// Wallet providers exchange amounts in this form.
    pub fn format_major(&self) -> String {
        let digits = self.currency.minor_unit_digits();
        if digits == 0 {
            return self.amount.to_string();
        }
        let scale = 10_i64.pow(digits);
        format!(
            "{}.{:0width$}",
            self.amount / scale,
            self.amount % scale,
            width = digits as usize
        )
    }

    /// Parses a major-unit decimal string such as `29.99` into minor units.
    pub fn parse_major(value: &str, currency: Currency) -> Result<Self, ValidationError> {
        let digits = currency.minor_unit_digits() as usize;
        let invalid = || {
            ValidationError::invalid_format("amount", format!("'{}' is not a valid amount", value))
        };

        let value = value.trim();
        let (whole, fraction) = match value.split_once('.') {
            Some((w, f)) => (w, f),
            None => (value, ""),
        };
        if whole.is_empty()
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > digits
        {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let mut fraction_units: i64 = 0;
        if digits > 0 {
            let padded = format!("{:0<width$}", fraction, width = digits);
            fraction_units = padded.parse().map_err(|_| invalid())?;
        }
        let scale = 10_i64.pow(digits as u32);
        let amount = whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(fraction_units))
            .ok_or_else(invalid)?;

        Money::new(amount, currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_major(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cny() -> Currency {
        Currency::new("CNY").unwrap()
    }

    #[test]
    fn currency_is_normalized_to_upper_case() {
        assert_eq!(Currency::new("usd").unwrap().as_str(), "USD");
    }

    #[test]
    fn currency_rejects_bad_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("U$D").is_err());
    }

    #[test]
    fn money_rejects_negative_amount() {
        assert!(Money::new(-1, cny()).is_err());
    }

    #[test]
    fn format_major_uses_two_decimals() {
        assert_eq!(Money::new(2999, cny()).unwrap().format_major(), "29.99");
        assert_eq!(Money::new(5, cny()).unwrap().format_major(), "0.05");
        assert_eq!(Money::new(100, cny()).unwrap().format_major(), "1.00");
    }

    #[test]
    fn format_major_respects_zero_decimal_currencies() {
        let yen = Money::new(480, Currency::new("JPY").unwrap()).unwrap();
        assert_eq!(yen.format_major(), "480");
    }

    #[test]
    fn parse_major_reads_provider_amounts() {
        assert_eq!(Money::parse_major("29.99", cny()).unwrap().amount(), 2999);
        assert_eq!(Money::parse_major("29.9", cny()).unwrap().amount(), 2990);
        assert_eq!(Money::parse_major("30", cny()).unwrap().amount(), 3000);
    }

    #[test]
    fn parse_major_rejects_garbage() {
        assert!(Money::parse_major("", cny()).is_err());
        assert!(Money::parse_major("-1.00", cny()).is_err());
        assert!(Money::parse_major("1.999", cny()).is_err());
        assert!(Money::parse_major("abc", cny()).is_err());
    }

    #[test]
    fn display_includes_currency() {
        assert_eq!(Money::new(2999, cny()).unwrap().to_string(), "29.99 CNY");
    }
}
