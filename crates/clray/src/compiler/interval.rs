//! Closed interval arithmetic over `f32`.
//!
//! Every operation returns an enclosure of the exact image of its operands, so
//! an interval that excludes zero proves the function has no root on the
//! input range. Rounding is not directed; the solver's epsilon absorbs it.

use std::{
    f32::consts::{FRAC_PI_2, PI},
    ops::{Add, Div, Mul, Neg, Sub},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub lo: f32,
    pub hi: f32,
}

impl Interval {
    pub const ENTIRE: Interval = Interval { lo: f32::NEG_INFINITY, hi: f32::INFINITY };

    pub fn new(lo: f32, hi: f32) -> Self {
        debug_assert!(!(lo > hi), "inverted interval [{lo}, {hi}]");
        Interval { lo, hi }
    }

    pub fn point(v: f32) -> Self {
        Interval { lo: v, hi: v }
    }

    pub fn width(self) -> f32 {
        self.hi - self.lo
    }

    pub fn center(self) -> f32 {
        0.5 * (self.lo + self.hi)
    }

    pub fn contains(self, v: f32) -> bool {
        self.lo <= v && v <= self.hi
    }

    pub fn contains_zero(self) -> bool {
        self.contains(0.0)
    }

    pub fn is_positive(self) -> bool {
        self.lo > 0.0
    }

    pub fn is_negative(self) -> bool {
        self.hi < 0.0
    }

    pub fn abs(self) -> Self {
        if self.lo >= 0.0 {
            self
        } else if self.hi <= 0.0 {
            -self
        } else {
            Interval::new(0.0, f32::max(-self.lo, self.hi))
        }
    }

    pub fn sqr(self) -> Self {
        let a = self.abs();
        Interval::new(a.lo * a.lo, a.hi * a.hi)
    }

    pub fn powi(self, n: i32) -> Self {
        match n {
            0 => Interval::point(1.0),
            1 => self,
            n if n < 0 => Interval::point(1.0) / self.powi(-n),
            n if n % 2 == 0 => {
                let a = self.abs();
                Interval::new(a.lo.powi(n), a.hi.powi(n))
            }
            // odd powers are monotonic
            n => Interval::new(self.lo.powi(n), self.hi.powi(n)),
        }
    }

    /// Square root of the non-negative part
    pub fn sqrt(self) -> Self {
        Interval::new(f32::max(self.lo, 0.0).sqrt(), f32::max(self.hi, 0.0).sqrt())
    }

    pub fn exp(self) -> Self {
        Interval::new(self.lo.exp(), self.hi.exp())
    }

    pub fn ln(self) -> Self {
        let lo = if self.lo <= 0.0 { f32::NEG_INFINITY } else { self.lo.ln() };
        let hi = if self.hi <= 0.0 { f32::NEG_INFINITY } else { self.hi.ln() };
        Interval::new(lo, hi)
    }

    pub fn sin(self) -> Self {
        // sin(x) = cos(x - pi/2)
        (self - Interval::point(FRAC_PI_2)).cos()
    }

    pub fn cos(self) -> Self {
        if !(self.width() < 2.0 * PI) {
            return Interval::new(-1.0, 1.0);
        }
        let (a, b) = (self.lo.cos(), self.hi.cos());
        let mut lo = f32::min(a, b);
        let mut hi = f32::max(a, b);
        // maxima at 2k*pi, minima at (2k+1)*pi
        let k_max = (self.lo / (2.0 * PI)).ceil();
        if k_max * 2.0 * PI <= self.hi {
            hi = 1.0;
        }
        let k_min = ((self.lo - PI) / (2.0 * PI)).ceil();
        if k_min * 2.0 * PI + PI <= self.hi {
            lo = -1.0;
        }
        Interval::new(lo, hi)
    }

    pub fn min(self, other: Self) -> Self {
        Interval::new(f32::min(self.lo, other.lo), f32::min(self.hi, other.hi))
    }

    pub fn max(self, other: Self) -> Self {
        Interval::new(f32::max(self.lo, other.lo), f32::max(self.hi, other.hi))
    }
}

impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Self) -> Self::Output {
        Interval::new(self.lo + rhs.lo, self.hi + rhs.hi)
    }
}

impl Sub for Interval {
    type Output = Interval;

    fn sub(self, rhs: Self) -> Self::Output {
        Interval::new(self.lo - rhs.hi, self.hi - rhs.lo)
    }
}

impl Mul for Interval {
    type Output = Interval;

    fn mul(self, rhs: Self) -> Self::Output {
        let products = [
            self.lo * rhs.lo,
            self.lo * rhs.hi,
            self.hi * rhs.lo,
            self.hi * rhs.hi,
        ];
        // 0 * inf shows up for unbounded operands; treat it as 0
        let products = products.map(|p| if p.is_nan() { 0.0 } else { p });
        Interval::new(
            products.iter().copied().fold(f32::INFINITY, f32::min),
            products.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        )
    }
}

impl Div for Interval {
    type Output = Interval;

    fn div(self, rhs: Self) -> Self::Output {
        if rhs.contains_zero() {
            return Interval::ENTIRE;
        }
        self * Interval::new(1.0 / rhs.hi, 1.0 / rhs.lo)
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Self::Output {
        Interval::new(-self.hi, -self.lo)
    }
}

impl Mul<f32> for Interval {
    type Output = Interval;

    fn mul(self, rhs: f32) -> Self::Output {
        self * Interval::point(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encloses(i: Interval, v: f32) -> bool {
        i.lo - 1e-5 <= v && v <= i.hi + 1e-5
    }

    #[test]
    fn products_and_quotients() {
        let a = Interval::new(-2.0, 3.0);
        let b = Interval::new(1.0, 4.0);
        assert_eq!(a * b, Interval::new(-8.0, 12.0));
        assert_eq!(a - b, Interval::new(-6.0, 2.0));
        assert_eq!(b / Interval::new(2.0, 4.0), Interval::new(0.25, 2.0));
        assert_eq!(b / a, Interval::ENTIRE);
    }

    #[test]
    fn even_powers_straddling_zero() {
        assert_eq!(Interval::new(-3.0, 2.0).sqr(), Interval::new(0.0, 9.0));
        assert_eq!(Interval::new(-3.0, 2.0).powi(3), Interval::new(-27.0, 8.0));
        assert_eq!(Interval::new(-1.0, -0.5).powi(2), Interval::new(0.25, 1.0));
    }

    #[test]
    fn trig_encloses_samples() {
        for (lo, hi) in [(-0.3, 0.4), (1.0, 2.5), (3.0, 7.0), (-5.0, -4.0), (0.1, 9.0)] {
            let i = Interval::new(lo, hi);
            let (s, c) = (i.sin(), i.cos());
            for k in 0..=100 {
                let x = lo + (hi - lo) * k as f32 / 100.0;
                assert!(encloses(s, x.sin()), "sin {x} not in {s:?}");
                assert!(encloses(c, x.cos()), "cos {x} not in {c:?}");
            }
        }
    }
}
