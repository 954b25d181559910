//! Decimal128: a fixed-point decimal represented as a scaled 128-bit integer.
//!
//! `value = mantissa * 10^-scale`. This is narrower than the IEEE 754-2008
//! decimal128 format but carries the same role in the value universe: exact
//! base-10 arithmetic for the scales documents actually use (money, rates),
//! with comparison and promotion defined against the other numeric types.

use std::cmp::Ordering;
use std::fmt;

/// A base-10 fixed-point number: `mantissa * 10^-scale`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Decimal128 {
    mantissa: i128,
    scale: u32,
}

use serde::{Deserialize, Serialize};

impl Decimal128 {
    pub const ZERO: Decimal128 = Decimal128 {
        mantissa: 0,
        scale: 0,
    };

    pub fn new(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn from_i64(v: i64) -> Self {
        Self {
            mantissa: v as i128,
            scale: 0,
        }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Lossy conversion used for widest-type ("double") ordering/arithmetic.
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    pub fn from_f64(v: f64) -> Self {
        // 9 fractional digits is ample for the values this evaluator ever
        // promotes from doubles and keeps the mantissa well within i128.
        let scale = 9u32;
        let mantissa = (v * 10f64.powi(scale as i32)).round() as i128;
        Self { mantissa, scale }
    }

    /// Rescale both operands to a common scale, returning comparable mantissas.
    fn aligned(a: &Decimal128, b: &Decimal128) -> (i128, i128) {
        if a.scale == b.scale {
            (a.mantissa, b.mantissa)
        } else if a.scale < b.scale {
            let factor = 10i128.pow(b.scale - a.scale);
            (a.mantissa.saturating_mul(factor), b.mantissa)
        } else {
            let factor = 10i128.pow(a.scale - b.scale);
            (a.mantissa, b.mantissa.saturating_mul(factor))
        }
    }

    pub fn add(&self, other: &Decimal128) -> Decimal128 {
        let scale = self.scale.max(other.scale);
        let (a, b) = Self::aligned(self, other);
        Decimal128 {
            mantissa: a + b,
            scale,
        }
    }

    pub fn cmp_value(&self, other: &Decimal128) -> Ordering {
        let (a, b) = Self::aligned(self, other);
        a.cmp(&b)
    }

    pub fn eq_value(&self, other: &Decimal128) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl PartialEq for Decimal128 {
    fn eq(&self, other: &Self) -> bool {
        self.eq_value(other)
    }
}
impl Eq for Decimal128 {}

impl PartialOrd for Decimal128 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_value(other))
    }
}
impl Ord for Decimal128 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl std::hash::Hash for Decimal128 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash on the rendered value so that equal decimals at different
        // scales (1.0 vs 1.00) hash identically, matching eq_value.
        let rendered = format!("{self}");
        rendered.hash(state);
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let negative = self.mantissa < 0;
        let abs = self.mantissa.unsigned_abs();
        let divisor = 10u128.pow(self.scale);
        let int_part = abs / divisor;
        let frac_part = abs % divisor;
        if negative {
            write!(f, "-")?;
        }
        write!(f, "{int_part}.{frac_part:0width$}", width = self.scale as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_value_different_scale() {
        let a = Decimal128::new(10, 0);
        let b = Decimal128::new(1000, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_respects_scale() {
        let a = Decimal128::new(150, 1); // 15.0
        let b = Decimal128::new(1499, 2); // 14.99
        assert_eq!(a.cmp_value(&b), Ordering::Greater);
    }

    #[test]
    fn display_renders_fraction() {
        assert_eq!(Decimal128::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal128::new(-500, 2).to_string(), "-5.00");
    }
}
