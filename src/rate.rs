//! Reclaim rate value with 4 decimal places precision.
//!
//! Rates come off the rate master as decimal strings. They are kept in
//! `rust_decimal` at a fixed scale so that output never drifts through
//! floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// A reclaim rate held at exactly 4 decimal places.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use reclaim_cycle::ReclaimRate;
///
/// let rate = ReclaimRate::from_str("12.5").unwrap();
/// assert_eq!(rate.to_string(), "12.5000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReclaimRate(Decimal);

impl ReclaimRate {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    /// Creates a new `ReclaimRate`, normalizing to 4 decimal places.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        ReclaimRate(normalized)
    }
}

impl FromStr for ReclaimRate {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())?;
        Ok(ReclaimRate::new(decimal))
    }
}

impl fmt::Display for ReclaimRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl<'de> Deserialize<'de> for ReclaimRate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ReclaimRate::from_str(&s).map_err(serde::de::Error::custom)
    }
}
