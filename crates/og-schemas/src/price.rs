//! Arbitrary-precision price representation.
//!
//! Prices are non-negative integers in the feed's smallest unit (e.g. 1e-8 USD).
//! The scale is a caller contract: every submission for one feed must use the
//! same one. Statistics are computed in `f64` over the decimal value; the
//! integer itself is never rounded or mutated.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(BigUint);

/// Errors returned when parsing a price from text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PriceError {
    /// Input was empty or contained a non-digit character.
    NotAnInteger(String),
}

impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceError::NotAnInteger(raw) => {
                write!(f, "price is not a non-negative integer: {raw:?}")
            }
        }
    }
}

impl std::error::Error for PriceError {}

impl Price {
    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    pub fn from_biguint(v: BigUint) -> Self {
        Self(v)
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Decimal value as `f64`. Values beyond `f64` range saturate to `f64::MAX`.
    pub fn to_f64(&self) -> f64 {
        match self.0.to_f64() {
            Some(v) if v.is_finite() => v,
            _ => f64::MAX,
        }
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PriceError::NotAnInteger(s.to_string()));
        }
        BigUint::from_str(t)
            .map(Price)
            .map_err(|_| PriceError::NotAnInteger(s.to_string()))
    }
}

impl TryFrom<String> for Price {
    type Error = PriceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Price> for String {
    fn from(p: Price) -> Self {
        p.0.to_string()
    }
}

impl From<u64> for Price {
    fn from(v: u64) -> Self {
        Price::from_u64(v)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_beyond_u64() {
        let p: Price = "340282366920938463463374607431768211456".parse().unwrap();
        assert!(p.to_f64() > u64::MAX as f64);
        assert_eq!(p.to_string(), "340282366920938463463374607431768211456");
    }

    #[test]
    fn rejects_signs_decimals_and_empty() {
        assert!("-5".parse::<Price>().is_err());
        assert!("1.5".parse::<Price>().is_err());
        assert!("".parse::<Price>().is_err());
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let p = Price::from_u64(200_000_000_000);
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, "\"200000000000\"");
        let back: Price = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<Price>("\"abc\"").is_err());
    }
}
