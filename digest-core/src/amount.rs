//! Exact chain quantities.
//!
//! Balances and tallies arrive as decimal strings that routinely exceed
//! `u64`. They are held as `BigUint` and only ever turned back into a string
//! at a serialization boundary.

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(BigUint);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmountError {
    pub input: String,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not an unsigned integer amount", self.input)
    }
}

impl std::error::Error for ParseAmountError {}

impl Balance {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn into_biguint(self) -> BigUint {
        self.0
    }

    /// Renders the balance in whole token units, truncated to `places`
    /// fractional digits. Display only.
    pub fn to_units_string(&self, decimals: u32, places: u32) -> String {
        let digits = self.0.to_string();
        let decimals = decimals as usize;
        let (whole, frac) = if digits.len() > decimals {
            let split = digits.len() - decimals;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
        };
        let places = (places as usize).min(frac.len());
        if places == 0 {
            whole
        } else {
            format!("{}.{}", whole, &frac[..places])
        }
    }
}

impl From<u64> for Balance {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Balance {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl FromStr for Balance {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseAmountError {
            input: s.to_string(),
        };
        let parsed = if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(err());
            }
            BigUint::from_str_radix(hex, 16).map_err(|_| err())?
        } else {
            if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
                return Err(err());
            }
            BigUint::from_str_radix(trimmed, 10).map_err(|_| err())?
        };
        Ok(Self(parsed))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Balance> for &'a Balance {
    type Output = Balance;

    fn add(self, rhs: &'a Balance) -> Balance {
        Balance(&self.0 + &rhs.0)
    }
}

impl<'a> Mul<&'a Balance> for &'a Balance {
    type Output = Balance;

    fn mul(self, rhs: &'a Balance) -> Balance {
        Balance(&self.0 * &rhs.0)
    }
}

impl Sum for Balance {
    fn sum<I: Iterator<Item = Balance>>(iter: I) -> Self {
        iter.fold(Balance::zero(), |acc, b| acc + b)
    }
}

impl<'a> Sum<&'a Balance> for Balance {
    fn sum<I: Iterator<Item = &'a Balance>>(iter: I) -> Self {
        Balance(iter.fold(BigUint::zero(), |acc, b| acc + &b.0))
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct BalanceVisitor;

impl<'de> Visitor<'de> for BalanceVisitor {
    type Value = Balance;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal or 0x-hex string, or a non-negative integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Balance, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Balance, E> {
        Ok(Balance::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Balance, E> {
        u64::try_from(v)
            .map(Balance::from)
            .map_err(|_| E::custom(format!("negative amount {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Balance, E> {
        Err(E::custom(format!(
            "floating point amount {} would lose precision; send it as a string",
            v
        )))
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BalanceVisitor)
    }
}

/// Non-negative rational number compared by cross multiplication.
#[derive(Debug, Clone)]
pub struct Ratio {
    numer: BigUint,
    denom: BigUint,
}

impl Ratio {
    /// A zero denominator yields the ratio 0.
    pub fn new(numer: BigUint, denom: BigUint) -> Self {
        if denom.is_zero() {
            Self {
                numer: BigUint::zero(),
                denom: BigUint::from(1u32),
            }
        } else {
            Self { numer, denom }
        }
    }

    pub fn of(numer: &Balance, denom: &Balance) -> Self {
        Self::new(numer.0.clone(), denom.0.clone())
    }

    pub fn from_perbill(parts: u32) -> Self {
        Self::new(BigUint::from(parts), BigUint::from(1_000_000_000u32))
    }

    pub fn from_percent(percent: u32) -> Self {
        Self::new(BigUint::from(percent), BigUint::from(100u32))
    }

    /// Parses "2", "2.5", "0.125".
    pub fn from_decimal_str(s: &str) -> Result<Self, ParseAmountError> {
        let trimmed = s.trim();
        let err = || ParseAmountError {
            input: s.to_string(),
        };
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if (whole.is_empty() && frac.is_empty())
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(err());
        }
        let digits = format!("{}{}", whole, frac);
        let numer = BigUint::from_str_radix(&digits, 10).map_err(|_| err())?;
        let denom = BigUint::from(10u32).pow(frac.len() as u32);
        Ok(Self::new(numer, denom))
    }

    pub fn numer(&self) -> &BigUint {
        &self.numer
    }

    pub fn denom(&self) -> &BigUint {
        &self.denom
    }

    pub fn is_zero(&self) -> bool {
        self.numer.is_zero()
    }

    /// `self * (100 + margin_percent) / 100`
    pub fn with_margin(&self, margin_percent: u32) -> Self {
        Self::new(
            &self.numer * BigUint::from(100u32 + margin_percent),
            &self.denom * BigUint::from(100u32),
        )
    }

    /// Percentage with a fixed number of fractional digits, truncated.
    pub fn percent_string(&self, places: u32) -> String {
        let scale = BigUint::from(10u32).pow(places);
        let scaled = (&self.numer * BigUint::from(100u32) * &scale) / &self.denom;
        let whole = &scaled / &scale;
        if places == 0 {
            return format!("{}%", whole);
        }
        let frac = &scaled % &scale;
        format!(
            "{}.{:0>width$}%",
            whole,
            frac.to_string(),
            width = places as usize
        )
    }
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.numer * &other.denom).cmp(&(&other.numer * &self.denom))
    }
}
