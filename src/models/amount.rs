//! Fixed-point stake amounts.
//!
//! K_i: The ledger prints vesting shares with exactly six decimals
//! ("1234.567890 VESTS"), so every amount fits a `u128` of micro-units
//! without rounding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// Micro-units per whole VESTS.
pub const VESTS_SCALE: u128 = 1_000_000;

const VESTS_DECIMALS: usize = 6;

/// A non-negative vesting-share amount held as exact micro-units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Vests(u128);

impl Vests {
    pub const ZERO: Vests = Vests(0);

    pub fn from_micros(micros: u128) -> Self {
        Self(micros)
    }

    pub fn from_whole(whole: u64) -> Self {
        Self(u128::from(whole) * VESTS_SCALE)
    }

    /// Convert a decimal reading from a JSON number (the delegation API
    /// reports plain floats). Rounds to the nearest micro-unit.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() || value < 0.0 {
            return Err(AmountError::OutOfRange(value.to_string()));
        }
        format!("{value:.6}").parse()
    }

    pub fn micros(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: Vests) -> Vests {
        Vests(self.0.saturating_sub(other.0))
    }

    /// Lossy float view for ratios and log output.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / VESTS_SCALE as f64
    }

    /// `self / whole * 100`, or 0 when `whole` is zero.
    pub fn percent_of(self, whole: Vests) -> f64 {
        if whole.is_zero() {
            return 0.0;
        }
        self.0 as f64 / whole.0 as f64 * 100.0
    }
}

impl Add for Vests {
    type Output = Vests;

    fn add(self, rhs: Vests) -> Vests {
        Vests(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Vests {
    fn sum<I: Iterator<Item = Vests>>(iter: I) -> Vests {
        iter.fold(Vests::ZERO, Add::add)
    }
}

impl fmt::Display for Vests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06} VESTS",
            self.0 / VESTS_SCALE,
            self.0 % VESTS_SCALE
        )
    }
}

impl FromStr for Vests {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let number = parts
            .next()
            .ok_or_else(|| AmountError::Malformed(s.to_string()))?;

        match parts.next() {
            None | Some("VESTS") => {}
            Some(unit) => return Err(AmountError::UnexpectedUnit(unit.to_string())),
        }
        if parts.next().is_some() {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty()
            || frac.len() > VESTS_DECIMALS
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let whole: u128 = whole
            .parse()
            .map_err(|_| AmountError::OutOfRange(s.to_string()))?;
        let frac_micros: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = VESTS_DECIMALS);
            padded
                .parse()
                .map_err(|_| AmountError::Malformed(s.to_string()))?
        };

        whole
            .checked_mul(VESTS_SCALE)
            .and_then(|w| w.checked_add(frac_micros))
            .map(Vests)
            .ok_or_else(|| AmountError::OutOfRange(s.to_string()))
    }
}

impl TryFrom<String> for Vests {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Vests> for String {
    fn from(value: Vests) -> Self {
        value.to_string()
    }
}

/// Errors parsing a ledger amount string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AmountError {
    #[error("Malformed amount: '{0}'")]
    Malformed(String),

    #[error("Unexpected asset unit '{0}' (expected VESTS)")]
    UnexpectedUnit(String),

    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}
