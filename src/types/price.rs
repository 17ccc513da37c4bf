use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::fmt;
use std::str::FromStr;
use crate::error::Error;

/// One basis point is 0.01%.
pub const BPS_DENOMINATOR: i128 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(i64);  // Fixed-point with 8 decimal places

impl Price {
    pub const DECIMALS: u32 = 8;
    pub const MULTIPLIER: i64 = 100_000_000;  // 10^8

    pub fn from_raw(value: i64) -> Self {
        Price(value)
    }

    pub fn raw_value(&self) -> i64 {
        self.0
    }

    /// Whole units, e.g. `Price::from_units(3350)` is 3350.00000000.
    pub fn from_units(units: i64) -> Self {
        Price(units.saturating_mul(Self::MULTIPLIER))
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Self::MULTIPLIER as f64
    }

    pub fn zero() -> Self {
        Price(0)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Relative distance from `reference` in basis points, rounded down.
    /// A non-positive reference yields 0.
    pub fn deviation_bps(&self, reference: Price) -> u32 {
        if !reference.is_positive() {
            return 0;
        }
        let diff = (self.0 as i128 - reference.0 as i128).abs();
        let bps = diff * BPS_DENOMINATOR / reference.0 as i128;
        u32::try_from(bps).unwrap_or(u32::MAX)
    }

    /// Weighted mean of `(price, weight)` pairs. Returns `None` when the
    /// total weight is zero.
    pub fn weighted_mean<I>(entries: I) -> Option<Price>
    where
        I: IntoIterator<Item = (Price, u32)>,
    {
        let (sum, total) = entries.into_iter().fold((0i128, 0i128), |(sum, total), (price, weight)| {
            (sum + price.0 as i128 * weight as i128, total + weight as i128)
        });
        if total == 0 {
            return None;
        }
        i64::try_from(sum / total).ok().map(Price)
    }
}

impl Add for Price {
    type Output = Price;
    fn add(self, other: Price) -> Price {
        Price(self.0.saturating_add(other.0))
    }
}

impl Sub for Price {
    type Output = Price;
    fn sub(self, other: Price) -> Price {
        Price(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let multiplier = Self::MULTIPLIER as u64;
        write!(f, "{}{}.{:08}", sign, abs / multiplier, abs % multiplier)
    }
}

/// Parses decimal strings as exchanges send them ("3350.12") without going
/// through floating point. Digits past the eighth decimal are truncated.
impl FromStr for Price {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::InvalidPrice(s.to_string()));
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidPrice(s.to_string()));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| Error::InvalidPrice(s.to_string()))?
        };

        let mut frac: String = frac_part.chars().take(Self::DECIMALS as usize).collect();
        while frac.len() < Self::DECIMALS as usize {
            frac.push('0');
        }
        let frac: i64 = frac.parse().map_err(|_| Error::InvalidPrice(s.to_string()))?;

        let raw = whole
            .checked_mul(Self::MULTIPLIER)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| Error::InvalidPrice(s.to_string()))?;

        Ok(Price(if negative { -raw } else { raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exchange_decimal_strings() {
        assert_eq!("3350.12".parse::<Price>().unwrap(), Price::from_raw(335_012_000_000));
        assert_eq!("100".parse::<Price>().unwrap(), Price::from_units(100));
        assert_eq!(".5".parse::<Price>().unwrap(), Price::from_raw(50_000_000));
        assert_eq!("0.123456789".parse::<Price>().unwrap(), Price::from_raw(12_345_678));
        assert!("12a.0".parse::<Price>().is_err());
        assert!("".parse::<Price>().is_err());
    }

    #[test]
    fn display_is_exact() {
        assert_eq!(Price::from_raw(10_080_000_000).to_string(), "100.80000000");
        assert_eq!(Price::from_raw(-1).to_string(), "-0.00000001");
    }

    #[test]
    fn deviation_is_symmetric_in_magnitude() {
        let reference = Price::from_units(3350);
        assert_eq!(Price::from_units(3685).deviation_bps(reference), 1000);
        assert_eq!(Price::from_units(3015).deviation_bps(reference), 1000);
        assert_eq!(reference.deviation_bps(reference), 0);
    }

    #[test]
    fn weighted_mean_normalises_weights() {
        let mean = Price::weighted_mean([
            (Price::from_units(100), 6000),
            (Price::from_units(102), 4000),
        ]);
        assert_eq!(mean, Some(Price::from_raw(10_080_000_000)));

        // Same ratio, different scale
        let mean = Price::weighted_mean([
            (Price::from_units(100), 3),
            (Price::from_units(102), 2),
        ]);
        assert_eq!(mean, Some(Price::from_raw(10_080_000_000)));

        assert_eq!(Price::weighted_mean(Vec::new()), None);
    }
}
