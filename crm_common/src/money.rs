use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The number of decimal places carried by [`Money`].
pub const MONEY_SCALE: u32 = 6;
const MONEY_FACTOR: i64 = 1_000_000;

//--------------------------------------       Money       -----------------------------------------------------------
/// A fixed-point monetary amount, stored as an integer number of micro-units (10^-6 of the major
/// unit). The payment gateway and the MT5 bridge both quote amounts as decimal strings ("10.00"),
/// which parse losslessly into this representation. Amounts with more than [`MONEY_SCALE`] decimal
/// places are rejected rather than silently rounded.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MoneyConversionError("empty amount".to_string()));
        }
        let (whole_str, frac_str) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if frac_str.len() > MONEY_SCALE as usize {
            return Err(MoneyConversionError(format!(
                "{trimmed} has more than {MONEY_SCALE} decimal places"
            )));
        }
        if !frac_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(format!("invalid fractional part in {trimmed}")));
        }
        let negative = whole_str.starts_with('-');
        let whole = whole_str
            .parse::<i64>()
            .map_err(|e| MoneyConversionError(format!("invalid amount {trimmed}: {e}")))?;
        let frac = if frac_str.is_empty() {
            0
        } else {
            frac_str
                .parse::<i64>()
                .map_err(|e| MoneyConversionError(format!("invalid amount {trimmed}: {e}")))?
        };
        let scale = 10_i64.pow(MONEY_SCALE - frac_str.len() as u32);
        let magnitude = (whole.unsigned_abs() as i64) * MONEY_FACTOR + frac * scale;
        Ok(Self(if negative { -magnitude } else { magnitude }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = (self.0 / MONEY_FACTOR).abs();
        let frac = (self.0 % MONEY_FACTOR).abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        let mut frac_str = format!("{frac:06}");
        while frac_str.len() > 2 && frac_str.ends_with('0') {
            frac_str.pop();
        }
        write!(f, "{sign}{whole}.{frac_str}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major_units(units: i64) -> Self {
        Self(units * MONEY_FACTOR)
    }

    /// The amount as a float, for APIs that insist on floating point (the MT5 bridge).
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / MONEY_FACTOR as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_gateway_decimal_strings() {
        assert_eq!("10.00".parse::<Money>().unwrap(), Money::from(10_000_000));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from(500_000));
        assert_eq!("25".parse::<Money>().unwrap(), Money::from_major_units(25));
        assert_eq!("1.234567".parse::<Money>().unwrap(), Money::from(1_234_567));
        assert!("1.0000001".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("10.".parse::<Money>().unwrap() == Money::from_major_units(10));
        assert!("ten".parse::<Money>().is_err());
        assert!("10.-5".parse::<Money>().is_err());
    }

    #[test]
    fn displays_with_at_least_two_decimals() {
        assert_eq!(Money::from(10_000_000).to_string(), "10.00");
        assert_eq!(Money::from(10_500_000).to_string(), "10.50");
        assert_eq!(Money::from(123_456).to_string(), "0.123456");
        assert_eq!(Money::from(-2_250_000).to_string(), "-2.25");
    }

    #[test]
    fn round_trips_through_display() {
        for raw in [0, 1, 990_000, 10_000_000, 123_456_789] {
            let m = Money::from(raw);
            assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
        }
    }

    #[test]
    fn arithmetic_delegates_to_inner_value() {
        let a = Money::from_major_units(10);
        let b = "2.50".parse::<Money>().unwrap();
        assert_eq!(a + b, Money::from(12_500_000));
        assert_eq!(a - b, Money::from(7_500_000));
        assert_eq!(-b, Money::from(-2_500_000));
        assert!((a.to_f64() - 10.0).abs() < f64::EPSILON);
    }
}
