// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Addable Utility Values
//!
//! All utility arithmetic in the engine is generic over [`Addable`]. The two
//! infinities act as the infeasibility sentinel: `+∞` when minimizing costs,
//! `−∞` when maximizing utilities. Infinities are absorbing, so an
//! infeasible tuple stays infeasible through any number of joins.
//!
//! Implemented for `i32`, `i64` (saturating, `MAX`/`MIN` as infinities) and
//! `f64` (IEEE infinities).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Debug, Display};

/// Numeric value type usable as a utility or a cost.
pub trait Addable:
    Copy + Debug + Display + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    fn zero() -> Self;

    fn plus_infinity() -> Self;

    fn minus_infinity() -> Self;

    /// Sum with absorbing infinities.
    fn add(self, other: Self) -> Self;

    fn subtract(self, other: Self) -> Self;

    fn multiply(self, other: Self) -> Self;

    /// Total order used by projections. Never fails, even for floats.
    fn compare(&self, other: &Self) -> Ordering;

    fn is_infinite(&self) -> bool {
        *self == Self::plus_infinity() || *self == Self::minus_infinity()
    }
}

macro_rules! impl_addable_for_int {
    ($($t:ty),*) => {$(
        impl Addable for $t {
            fn zero() -> Self {
                0
            }

            fn plus_infinity() -> Self {
                <$t>::MAX
            }

            fn minus_infinity() -> Self {
                <$t>::MIN
            }

            fn add(self, other: Self) -> Self {
                if self.is_infinite() {
                    return self;
                }
                if other.is_infinite() {
                    return other;
                }
                self.saturating_add(other)
            }

            fn subtract(self, other: Self) -> Self {
                if self.is_infinite() {
                    return self;
                }
                if other == <$t>::MAX {
                    return <$t>::MIN;
                }
                if other == <$t>::MIN {
                    return <$t>::MAX;
                }
                self.saturating_sub(other)
            }

            fn multiply(self, other: Self) -> Self {
                match (self.is_infinite(), other.is_infinite()) {
                    (true, _) if other < 0 => flip(self),
                    (true, _) => self,
                    (_, true) if self < 0 => flip(other),
                    (_, true) => other,
                    _ => self.saturating_mul(other),
                }
            }

            fn compare(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }
        }
    )*};
}

fn flip<T: Addable>(infinity: T) -> T {
    if infinity == T::plus_infinity() {
        T::minus_infinity()
    } else {
        T::plus_infinity()
    }
}

impl_addable_for_int!(i32, i64);

impl Addable for f64 {
    fn zero() -> Self {
        0.0
    }

    fn plus_infinity() -> Self {
        f64::INFINITY
    }

    fn minus_infinity() -> Self {
        f64::NEG_INFINITY
    }

    fn add(self, other: Self) -> Self {
        if self.is_infinite() {
            return self;
        }
        self + other
    }

    fn subtract(self, other: Self) -> Self {
        if self.is_infinite() {
            return self;
        }
        self - other
    }

    fn multiply(self, other: Self) -> Self {
        if self.is_infinite() && other == 0.0 {
            return self;
        }
        self * other
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }

    fn is_infinite(&self) -> bool {
        f64::is_infinite(*self)
    }
}

/// Optimization direction of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Costs; infeasible tuples are `+∞`.
    #[default]
    Minimize,
    /// Utilities; infeasible tuples are `−∞`.
    Maximize,
}

impl Direction {
    /// The infeasibility sentinel for this direction.
    pub fn infeasible<U: Addable>(self) -> U {
        match self {
            Direction::Minimize => U::plus_infinity(),
            Direction::Maximize => U::minus_infinity(),
        }
    }

    /// `true` iff `candidate` is strictly better than `incumbent`.
    pub fn is_better<U: Addable>(self, candidate: U, incumbent: U) -> bool {
        let ordering = candidate.compare(&incumbent);
        match self {
            Direction::Minimize => ordering == Ordering::Less,
            Direction::Maximize => ordering == Ordering::Greater,
        }
    }

    pub fn best<U: Addable>(self, a: U, b: U) -> U {
        if self.is_better(b, a) {
            b
        } else {
            a
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Minimize => write!(f, "minimize"),
            Direction::Maximize => write!(f, "maximize"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_infinity_is_absorbing() {
        let inf = i64::plus_infinity();
        assert_eq!(inf.add(5), inf);
        assert_eq!(5i64.add(inf), inf);
        assert_eq!(i64::minus_infinity().add(-3), i64::minus_infinity());
        assert_eq!(inf.subtract(1_000), inf);
    }

    #[test]
    fn test_integer_overflow_saturates_to_infinity() {
        assert_eq!((i32::MAX - 1).add(10), i32::plus_infinity());
        assert!((i32::MAX - 1).add(10).is_infinite());
    }

    #[test]
    fn test_multiply_flips_infinity_sign() {
        assert_eq!(i64::plus_infinity().multiply(-2), i64::minus_infinity());
        assert_eq!(3i64.multiply(i64::minus_infinity()), i64::minus_infinity());
        assert_eq!(4i64.multiply(-2), -8);
    }

    #[test]
    fn test_float_infinity_does_not_produce_nan() {
        let sum = f64::plus_infinity().add(f64::minus_infinity());
        assert_eq!(sum, f64::INFINITY);
        assert_eq!(2.5f64.add(1.5), 4.0);
    }

    #[test]
    fn test_direction_semantics() {
        assert_eq!(Direction::Minimize.infeasible::<i64>(), i64::MAX);
        assert_eq!(Direction::Maximize.infeasible::<i64>(), i64::MIN);
        assert!(Direction::Minimize.is_better(1i64, 2));
        assert!(!Direction::Minimize.is_better(2i64, 2));
        assert!(Direction::Maximize.is_better(3.0f64, 2.0));
        assert_eq!(Direction::Maximize.best(3i32, 7), 7);
    }
}
