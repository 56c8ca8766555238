//! Human-entered amount parsing and base-unit conversion.
//!
//! The native currency uses an 18-decimal fixed point. [`DisplayAmount`]
//! parses a human-typed decimal string, and [`DisplayAmount::to_base_units`]
//! converts it to a base-unit integer. The conversion is exact for any input
//! with at most 18 fractional digits and rejects inputs with more precision
//! rather than silently truncating them.

use alloy_primitives::U256;
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::ops::Mul;
use std::str::FromStr;
use std::sync::LazyLock;

/// Decimal places of the native currency.
pub const NATIVE_DECIMALS: u32 = 18;

/// A parsed, non-negative decimal amount as the user typed it.
///
/// [`scale`](DisplayAmount::scale) is the number of decimal places of the
/// original input and [`mantissa`](DisplayAmount::mantissa) the value as an
/// integer; `"12.5"` has scale 1 and mantissa 125.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayAmount(Decimal);

/// Errors that can occur when parsing or converting an amount.
#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    /// The input string could not be parsed as a number.
    #[error("invalid amount format")]
    InvalidFormat,
    /// The value is outside the allowed range.
    #[error("amount must be between 0 and {}", constants::MAX_STR)]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("negative amount is not allowed")]
    Negative,
    /// The input has more decimal places than the currency supports.
    #[error("too much precision: {given} fractional digits, at most {max} supported")]
    TooPrecise {
        /// Decimal places in the input.
        given: u32,
        /// Decimal places the currency supports.
        max: u32,
    },
}

mod constants {
    use super::*;

    pub const MAX_STR: &str = "999999999";

    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

impl DisplayAmount {
    /// Parses a human-typed amount string.
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing. The result must be a non-negative number within the
    /// allowed range.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        // Remove anything that isn't digit, dot, minus
        let cleaned = Regex::new(r"[^\d\.\-]+")
            .unwrap()
            .replace_all(input, "")
            .to_string();

        let parsed = Decimal::from_str(&cleaned).map_err(|_| AmountError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(AmountError::Negative);
        }
        if parsed > *constants::MAX {
            return Err(AmountError::OutOfRange);
        }

        Ok(DisplayAmount(parsed))
    }

    /// Returns the number of decimal places in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Returns the value as an unsigned integer without the decimal point.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Converts to a base-unit integer at the 18-decimal native scale.
    ///
    /// Exact for any input with at most [`NATIVE_DECIMALS`] fractional
    /// digits; inputs with more precision are rejected, never rounded.
    pub fn to_base_units(&self) -> Result<U256, AmountError> {
        let scale = self.scale();
        if scale > NATIVE_DECIMALS {
            return Err(AmountError::TooPrecise {
                given: scale,
                max: NATIVE_DECIMALS,
            });
        }
        let multiplier = U256::from(10).pow(U256::from(NATIVE_DECIMALS - scale));
        Ok(U256::from(self.mantissa()).mul(multiplier))
    }
}

impl FromStr for DisplayAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayAmount::parse(s)
    }
}

impl Display for DisplayAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Formats a base-unit integer as a decimal display string.
///
/// Trailing fractional zeros are trimmed; whole values render without a
/// decimal point, so `1_000_000_000_000_000_000` formats as `"1"`.
pub fn format_base_units(value: U256) -> String {
    let base = U256::from(10).pow(U256::from(NATIVE_DECIMALS));
    let whole = value / base;
    let frac = value % base;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = NATIVE_DECIMALS as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> U256 {
        DisplayAmount::parse(s).unwrap().to_base_units().unwrap()
    }

    #[test]
    fn converts_whole_number() {
        assert_eq!(base("100"), U256::from(100u64) * U256::from(10).pow(U256::from(18)));
    }

    #[test]
    fn converts_fractional_amount_exactly() {
        assert_eq!(base("12.5"), U256::from(12_500_000_000_000_000_000u128));
    }

    #[test]
    fn converts_smallest_unit() {
        assert_eq!(base("0.000000000000000001"), U256::from(1u64));
    }

    #[test]
    fn accepts_exactly_eighteen_fractional_digits() {
        assert_eq!(base("0.123456789012345678"), U256::from(123_456_789_012_345_678u128));
    }

    #[test]
    fn rejects_more_than_eighteen_fractional_digits() {
        let result = DisplayAmount::parse("0.1234567890123456789")
            .unwrap()
            .to_base_units();
        assert!(matches!(result, Err(AmountError::TooPrecise { given: 19, max: 18 })));
    }

    #[test]
    fn rejects_negative() {
        assert!(matches!(DisplayAmount::parse("-1"), Err(AmountError::Negative)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(DisplayAmount::parse("lunch"), Err(AmountError::InvalidFormat)));
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(DisplayAmount::parse("1000000000"), Err(AmountError::OutOfRange)));
    }

    #[test]
    fn strips_separators_and_symbols() {
        assert_eq!(base("1,000"), U256::from(1000u64) * U256::from(10).pow(U256::from(18)));
    }

    #[test]
    fn format_trims_trailing_zeros() {
        assert_eq!(format_base_units(U256::from(12_500_000_000_000_000_000u128)), "12.5");
        assert_eq!(format_base_units(U256::from(10).pow(U256::from(18))), "1");
        assert_eq!(format_base_units(U256::ZERO), "0");
        assert_eq!(format_base_units(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn conversion_is_round_trip_stable() {
        for input in ["12.5", "0.000001", "42", "999999999", "0.123456789012345678"] {
            let units = base(input);
            assert_eq!(base(&format_base_units(units)), units, "unstable for {input}");
        }
    }
}
