//! SI dimensions for physical units.
//!
//! A [`Dimension`] is the SI form of a unit: seven base-unit exponents plus a
//! rational scalar kept in lowest terms. `cm` is length^1 with scalar 1/100,
//! `m/s` is length^1 * time^-1 with scalar 1. Unit spellings that appear in
//! protocol definitions resolve through [`string_to_dimension`].

use std::collections::HashMap;
use std::ops::{Div, Mul};

use once_cell::sync::Lazy;

/// Number of SI base units: meter, kilogram, second, ampere, kelvin, mole, candela.
pub const NUM_BASE_UNITS: usize = 7;

/// SI representation of a unit: base-unit exponents and a rational scalar.
///
/// Invariant: `gcd(numerator, denominator) == 1` and `denominator > 0` after
/// construction and after any algebraic operation. Equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub exponents: [i32; NUM_BASE_UNITS],
    pub numerator: i64,
    pub denominator: i64,
}

impl Dimension {
    /// The multiplicative identity: no exponents, scalar 1.
    pub const DIMENSIONLESS: Dimension = Dimension {
        exponents: [0; NUM_BASE_UNITS],
        numerator: 1,
        denominator: 1,
    };

    /// Builds a dimension reduced to lowest terms with a positive denominator.
    pub fn new(exponents: [i32; NUM_BASE_UNITS], numerator: i64, denominator: i64) -> Dimension {
        Dimension {
            exponents,
            numerator,
            denominator,
        }
        .reduced()
    }

    /// Shorthand for a pure length dimension with the given scalar.
    pub fn length(numerator: i64, denominator: i64) -> Dimension {
        Dimension::new([1, 0, 0, 0, 0, 0, 0], numerator, denominator)
    }

    fn reduced(mut self) -> Dimension {
        debug_assert!(self.denominator != 0, "dimension scalar denominator is zero");
        if self.denominator < 0 {
            self.numerator = -self.numerator;
            self.denominator = -self.denominator;
        }
        let g = gcd(self.numerator.unsigned_abs(), self.denominator.unsigned_abs());
        if g > 1 {
            self.numerator /= g as i64;
            self.denominator /= g as i64;
        }
        self
    }
}

impl Mul for Dimension {
    type Output = Dimension;

    fn mul(self, rhs: Dimension) -> Dimension {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e += r;
        }
        Dimension::new(
            exponents,
            self.numerator * rhs.numerator,
            self.denominator * rhs.denominator,
        )
    }
}

impl Div for Dimension {
    type Output = Dimension;

    fn div(self, rhs: Dimension) -> Dimension {
        debug_assert!(rhs.numerator != 0, "dividing by a zero-scalar dimension");
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e -= r;
        }
        Dimension::new(
            exponents,
            self.numerator * rhs.denominator,
            self.denominator * rhs.numerator,
        )
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return a.max(b);
    }
    let (mut greatest, mut smallest) = (a.max(b), a.min(b));
    while smallest != 0 {
        let remainder = greatest % smallest;
        greatest = smallest;
        smallest = remainder;
    }
    greatest
}

const LENGTH: [i32; NUM_BASE_UNITS] = [1, 0, 0, 0, 0, 0, 0];
const TIME: [i32; NUM_BASE_UNITS] = [0, 0, 1, 0, 0, 0, 0];
const VELOCITY: [i32; NUM_BASE_UNITS] = [1, 0, -1, 0, 0, 0, 0];
const ACCELERATION: [i32; NUM_BASE_UNITS] = [1, 0, -2, 0, 0, 0, 0];
const FREQUENCY: [i32; NUM_BASE_UNITS] = [0, 0, -1, 0, 0, 0, 0];

/// Known unit spellings, as they appear in MAVLink message definitions and in
/// prior files, mapped to their reduced SI form.
static UNIT_NAME_TO_DIMENSION: Lazy<HashMap<&'static str, Dimension>> = Lazy::new(|| {
    let table: &[(&str, [i32; NUM_BASE_UNITS], i64, i64)] = &[
        ("m", LENGTH, 1, 1),
        ("meter", LENGTH, 1, 1),
        ("meters", LENGTH, 1, 1),
        ("cm", LENGTH, 1, 100),
        ("centimeter", LENGTH, 1, 100),
        ("centimeters", LENGTH, 1, 100),
        ("mm", LENGTH, 1, 1000),
        ("km", LENGTH, 1000, 1),
        ("m/s", VELOCITY, 1, 1),
        ("cm/s", VELOCITY, 1, 100),
        ("mm/s", VELOCITY, 1, 1000),
        ("m/s/s", ACCELERATION, 1, 1),
        ("s", TIME, 1, 1),
        ("ds", TIME, 1, 10),
        ("cs", TIME, 1, 100),
        ("ms", TIME, 1, 1000),
        ("us", TIME, 1, 1_000_000),
        ("Hz", FREQUENCY, 1, 1),
    ];
    table
        .iter()
        .map(|&(name, exponents, num, den)| (name, Dimension::new(exponents, num, den)))
        .collect()
});

/// Tries to convert a unit spelling into its SI dimension.
pub fn string_to_dimension(spelling: &str) -> Option<Dimension> {
    UNIT_NAME_TO_DIMENSION.get(spelling).copied()
}
