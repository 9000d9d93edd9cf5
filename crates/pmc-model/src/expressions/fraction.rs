//! This module contains the implementation of the [`Fraction`] type.
//!
//! Fractions are used to report numeric model checking results in rational
//! form, e.g., `1/6` instead of `0.16666666666666666`. Fractions are always
//! stored in their simplified form.

use std::{
    fmt::{Debug, Display},
    ops,
};

/// Type representing a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    /// True if the fraction is smaller than 0
    negated: bool,
    /// Numerator
    numerator: u64,
    /// Denominator
    denominator: u64,
}

impl Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug_assert!(self.is_simplified());

        if let Ok(c) = i64::try_from(*self) {
            write!(f, "{c}")
        } else {
            if self.negated {
                write!(f, "-")?;
            }
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl Fraction {
    /// Create a new fraction
    ///
    /// Create a new fraction with the given numerator and denominator. Upon
    /// creation, the fraction is simplified to the maximal possible extent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pmc_model::expressions::fraction::Fraction;
    ///
    /// let f = Fraction::new(42, 2, false);
    ///
    /// assert_eq!(i64::try_from(f).unwrap(), 21);
    /// assert_eq!(f.is_negative(), false);
    /// assert_eq!(f.numerator(), 21);
    /// assert_eq!(f.denominator(), 1);
    /// ```
    pub fn new(numerator: u64, denominator: u64, negated: bool) -> Self {
        Self {
            negated,
            numerator,
            denominator,
        }
        .canonicalize()
    }

    /// Find the closest fraction to `value` whose denominator does not exceed
    /// `max_denominator`
    ///
    /// The approximation is computed from the convergents of the continued
    /// fraction expansion of `value`. Returns `None` if `value` is not finite
    /// or too large to be represented.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pmc_model::expressions::fraction::Fraction;
    ///
    /// let f = Fraction::approximate(1.0 / 6.0, 1_000_000).unwrap();
    /// assert_eq!(f, Fraction::new(1, 6, false));
    ///
    /// let f = Fraction::approximate(std::f64::consts::PI, 1000).unwrap();
    /// assert_eq!(f, Fraction::new(355, 113, false));
    /// ```
    pub fn approximate(value: f64, max_denominator: u64) -> Option<Self> {
        if !value.is_finite() || value.abs() >= u64::MAX as f64 {
            return None;
        }

        let negated = value < 0.0;
        let mut rest = value.abs();

        // convergents h_{n-1}/k_{n-1} and h_{n-2}/k_{n-2}
        let (mut h1, mut h2) = (1u64, 0u64);
        let (mut k1, mut k2) = (0u64, 1u64);

        loop {
            let a = rest.floor();
            let a_int = a as u64;

            let next = a_int
                .checked_mul(h1)
                .and_then(|x| x.checked_add(h2))
                .zip(a_int.checked_mul(k1).and_then(|x| x.checked_add(k2)));
            let Some((h, k)) = next else {
                break;
            };
            if k > max_denominator.max(1) {
                // the best semi-convergent may still be closer than h1/k1
                if k1 != 0 {
                    let t = (max_denominator.max(1) - k2) / k1;
                    let ks = t * k1 + k2;
                    let target = value.abs();
                    if let Some(hs) = t.checked_mul(h1).and_then(|x| x.checked_add(h2))
                        && t > 0
                        && (hs as f64 / ks as f64 - target).abs()
                            < (h1 as f64 / k1 as f64 - target).abs()
                    {
                        (h1, k1) = (hs, ks);
                    }
                }
                break;
            }

            (h2, h1) = (h1, h);
            (k2, k1) = (k1, k);

            let frac = rest - a;
            let approx = h1 as f64 / k1 as f64;
            if frac <= f64::EPSILON || (approx - value.abs()).abs() <= f64::EPSILON * value.abs() {
                break;
            }
            rest = 1.0 / frac;
        }

        if k1 == 0 {
            return None;
        }

        Some(Fraction::new(h1, k1, negated))
    }

    /// Returns true if the fraction is smaller than 0
    pub fn is_negative(&self) -> bool {
        debug_assert!(self.is_simplified());
        self.negated
    }

    /// Check whether the fraction represents an integer
    ///
    /// # Example
    ///
    /// ```rust
    /// use pmc_model::expressions::fraction::Fraction;
    ///
    /// assert!(!Fraction::new(1, 2, false).is_integer());
    /// assert!(Fraction::new(2, 2, false).is_integer());
    /// ```
    pub fn is_integer(&self) -> bool {
        self.denominator != 0 && self.numerator.is_multiple_of(self.denominator)
    }

    /// Check if the fraction is simplified
    fn is_simplified(&self) -> bool {
        num::integer::gcd(self.numerator, self.denominator) == 1
    }

    /// Simplify the fraction to the maximal possible extent and canonicalize its representation
    fn canonicalize(self) -> Self {
        // canonicalize when numerator = 0
        if self.numerator == 0 {
            return Self {
                negated: false,
                numerator: 0,
                denominator: 1,
            };
        }

        // canonicalize when denominator = 0
        if self.denominator == 0 {
            return Self {
                negated: false,
                numerator: 1,
                denominator: 0,
            };
        }

        let gcd = num::integer::gcd(self.numerator, self.denominator);

        Self {
            negated: self.negated,
            numerator: self.numerator / gcd,
            denominator: self.denominator / gcd,
        }
    }

    /// Get the denominator of the fraction
    pub fn denominator(&self) -> u64 {
        debug_assert!(self.is_simplified());
        self.denominator
    }

    /// Get the numerator of the fraction
    pub fn numerator(&self) -> u64 {
        debug_assert!(self.is_simplified());
        self.numerator
    }
}

impl ops::Neg for Fraction {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Fraction::new(self.numerator, self.denominator, !self.negated)
    }
}

impl TryFrom<Fraction> for i64 {
    type Error = ();

    /// Try to convert the fraction into an integer
    fn try_from(value: Fraction) -> Result<Self, Self::Error> {
        if !value.is_integer() {
            return Err(());
        }

        let res = i64::try_from(value.numerator / value.denominator).map_err(|_| ())?;
        if value.negated { Ok(-res) } else { Ok(res) }
    }
}

impl From<Fraction> for f64 {
    fn from(value: Fraction) -> Self {
        let res = value.numerator as f64 / value.denominator as f64;
        if value.negated { -res } else { res }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_getters() {
        let f = Fraction::new(4, 8, false);
        assert_eq!(f.numerator(), 1);
        assert_eq!(f.denominator(), 2);
        assert!(!f.is_negative());

        let f = Fraction::new(12, 9, true);
        assert_eq!(f.numerator(), 4);
        assert_eq!(f.denominator(), 3);
        assert!(f.is_negative());
    }

    #[test]
    fn test_fraction_canonical_zero() {
        assert_eq!(Fraction::new(0, 5, true), Fraction::new(0, 1, false));
        assert_eq!(Fraction::new(0, 5, true).to_string(), "0");
    }

    #[test]
    fn test_fraction_display() {
        assert_eq!(Fraction::new(1, 6, false).to_string(), "1/6");
        assert_eq!(Fraction::new(6, 4, true).to_string(), "-3/2");
        assert_eq!(Fraction::new(8, 2, false).to_string(), "4");
        assert_eq!((-Fraction::new(8, 2, false)).to_string(), "-4");
    }

    #[test]
    fn test_fraction_approximate() {
        assert_eq!(
            Fraction::approximate(11.0 / 3.0, 1_000_000),
            Some(Fraction::new(11, 3, false))
        );
        assert_eq!(
            Fraction::approximate(-0.75, 1_000_000),
            Some(Fraction::new(3, 4, true))
        );
        assert_eq!(
            Fraction::approximate(0.1, 1_000_000),
            Some(Fraction::new(1, 10, false))
        );
        assert_eq!(Fraction::approximate(3.0, 10), Some(Fraction::new(3, 1, false)));
        assert_eq!(Fraction::approximate(0.0, 10), Some(Fraction::new(0, 1, false)));
        assert_eq!(Fraction::approximate(f64::INFINITY, 10), None);
        assert_eq!(Fraction::approximate(f64::NAN, 10), None);
    }

    #[test]
    fn test_fraction_approximate_respects_max_denominator() {
        let f = Fraction::approximate(1.0 / 7.0, 5).unwrap();
        assert!(f.denominator() <= 5);
        assert_eq!(f, Fraction::new(1, 5, false));
    }

    #[test]
    fn test_fraction_into_f64() {
        assert_eq!(f64::from(Fraction::new(1, 4, true)), -0.25);
        assert_eq!(f64::from(Fraction::new(3, 1, false)), 3.0);
    }
}
