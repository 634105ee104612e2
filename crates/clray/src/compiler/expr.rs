//! Expression trees for implicit surfaces and distance fields.
//!
//! Expressions are built once at scene setup, differentiated symbolically, and
//! then either evaluated on the host (as `f32` or [`Interval`]) or handed to an
//! [`ExprEmitter`](super::emit::ExprEmitter) to become kernel source.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::geometry::Vec3;

use super::interval::Interval;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Var {
    X,
    Y,
    Z,
    /// ray parameter
    T,
    OriginX,
    OriginY,
    OriginZ,
    RayX,
    RayY,
    RayZ,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Func {
    Sqrt,
    Abs,
    Sin,
    Cos,
    Exp,
    Ln,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(f32),
    Var(Var),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Powi(Box<Expr>, i32),
    Call(Func, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    /// `if a < b { c } else { d }`
    IfLess(Box<[Expr; 4]>),
}

/// A number system the expression tree can be evaluated in
pub trait Domain:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self> + Neg<Output = Self>
{
    fn constant(c: f32) -> Self;
    fn powi(self, n: i32) -> Self;
    fn call(self, func: Func) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self;
}

impl Domain for f32 {
    fn constant(c: f32) -> Self {
        c
    }

    fn powi(self, n: i32) -> Self {
        f32::powi(self, n)
    }

    fn call(self, func: Func) -> Self {
        match func {
            Func::Sqrt => self.sqrt(),
            Func::Abs => self.abs(),
            Func::Sin => self.sin(),
            Func::Cos => self.cos(),
            Func::Exp => self.exp(),
            Func::Ln => self.ln(),
        }
    }

    fn min(self, other: Self) -> Self {
        f32::min(self, other)
    }

    fn max(self, other: Self) -> Self {
        f32::max(self, other)
    }

    fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self {
        if a < b { then } else { otherwise }
    }
}

impl Domain for Interval {
    fn constant(c: f32) -> Self {
        Interval::point(c)
    }

    fn powi(self, n: i32) -> Self {
        Interval::powi(self, n)
    }

    fn call(self, func: Func) -> Self {
        match func {
            Func::Sqrt => self.sqrt(),
            Func::Abs => self.abs(),
            Func::Sin => self.sin(),
            Func::Cos => self.cos(),
            Func::Exp => self.exp(),
            Func::Ln => self.ln(),
        }
    }

    fn min(self, other: Self) -> Self {
        Interval::min(self, other)
    }

    fn max(self, other: Self) -> Self {
        Interval::max(self, other)
    }

    fn if_less(a: Self, b: Self, then: Self, otherwise: Self) -> Self {
        if a.hi < b.lo {
            then
        } else if a.lo >= b.hi {
            otherwise
        } else {
            Interval::new(f32::min(then.lo, otherwise.lo), f32::max(then.hi, otherwise.hi))
        }
    }
}

impl Expr {
    pub fn constant(c: f32) -> Expr {
        Expr::Const(c)
    }

    pub fn var(v: Var) -> Expr {
        Expr::Var(v)
    }

    pub fn x() -> Expr {
        Expr::Var(Var::X)
    }

    pub fn y() -> Expr {
        Expr::Var(Var::Y)
    }

    pub fn z() -> Expr {
        Expr::Var(Var::Z)
    }

    fn as_const(&self) -> Option<f32> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn powi(self, n: i32) -> Expr {
        match (n, self.as_const()) {
            (0, _) => Expr::Const(1.0),
            (1, _) => self,
            (_, Some(c)) => Expr::Const(c.powi(n)),
            _ => Expr::Powi(Box::new(self), n),
        }
    }

    pub fn call(self, func: Func) -> Expr {
        match self.as_const() {
            Some(c) => Expr::Const(c.call(func)),
            None => Expr::Call(func, Box::new(self)),
        }
    }

    pub fn sqrt(self) -> Expr {
        self.call(Func::Sqrt)
    }

    pub fn abs(self) -> Expr {
        self.call(Func::Abs)
    }

    pub fn min(self, other: Expr) -> Expr {
        Expr::Min(Box::new(self), Box::new(other))
    }

    pub fn max(self, other: Expr) -> Expr {
        Expr::Max(Box::new(self), Box::new(other))
    }

    pub fn if_less(a: Expr, b: Expr, then: Expr, otherwise: Expr) -> Expr {
        if then == otherwise {
            return then;
        }
        Expr::IfLess(Box::new([a, b, then, otherwise]))
    }

    pub fn eval<D: Domain>(&self, env: &impl Fn(Var) -> D) -> D {
        match self {
            Expr::Const(c) => D::constant(*c),
            Expr::Var(v) => env(*v),
            Expr::Neg(a) => -a.eval(env),
            Expr::Add(a, b) => a.eval(env) + b.eval(env),
            Expr::Sub(a, b) => a.eval(env) - b.eval(env),
            Expr::Mul(a, b) => a.eval(env) * b.eval(env),
            Expr::Div(a, b) => a.eval(env) / b.eval(env),
            Expr::Powi(a, n) => a.eval(env).powi(*n),
            Expr::Call(func, a) => a.eval(env).call(*func),
            Expr::Min(a, b) => a.eval(env).min(b.eval(env)),
            Expr::Max(a, b) => a.eval(env).max(b.eval(env)),
            Expr::IfLess(args) => {
                let [a, b, then, otherwise] = args.as_ref();
                D::if_less(a.eval(env), b.eval(env), then.eval(env), otherwise.eval(env))
            }
        }
    }

    /// Evaluates at a point in space; other variables read as zero
    pub fn eval_point(&self, p: Vec3) -> f32 {
        self.eval(&|v| match v {
            Var::X => p.0,
            Var::Y => p.1,
            Var::Z => p.2,
            _ => 0.0,
        })
    }

    /// Replaces variables for which `f` returns an expression
    pub fn substitute(&self, f: &impl Fn(Var) -> Option<Expr>) -> Expr {
        let sub = |e: &Expr| e.substitute(f);
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Var(v) => f(*v).unwrap_or_else(|| self.clone()),
            Expr::Neg(a) => -sub(a),
            Expr::Add(a, b) => sub(a) + sub(b),
            Expr::Sub(a, b) => sub(a) - sub(b),
            Expr::Mul(a, b) => sub(a) * sub(b),
            Expr::Div(a, b) => sub(a) / sub(b),
            Expr::Powi(a, n) => sub(a).powi(*n),
            Expr::Call(func, a) => sub(a).call(*func),
            Expr::Min(a, b) => sub(a).min(sub(b)),
            Expr::Max(a, b) => sub(a).max(sub(b)),
            Expr::IfLess(args) => {
                let [a, b, c, d] = args.as_ref();
                Expr::if_less(sub(a), sub(b), sub(c), sub(d))
            }
        }
    }

    /// Symbolic derivative with respect to `var`
    pub fn diff(&self, var: Var) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Var(v) => Expr::Const(if *v == var { 1.0 } else { 0.0 }),
            Expr::Neg(a) => -a.diff(var),
            Expr::Add(a, b) => a.diff(var) + b.diff(var),
            Expr::Sub(a, b) => a.diff(var) - b.diff(var),
            Expr::Mul(a, b) => a.diff(var) * (**b).clone() + (**a).clone() * b.diff(var),
            Expr::Div(a, b) => {
                (a.diff(var) * (**b).clone() - (**a).clone() * b.diff(var)) / (**b).clone().powi(2)
            }
            Expr::Powi(a, n) => Expr::Const(*n as f32) * (**a).clone().powi(n - 1) * a.diff(var),
            Expr::Call(func, a) => {
                let u = (**a).clone();
                let du = a.diff(var);
                match func {
                    Func::Sqrt => du / (Expr::Const(2.0) * u.sqrt()),
                    Func::Abs => du * Expr::if_less(u, Expr::Const(0.0), Expr::Const(-1.0), Expr::Const(1.0)),
                    Func::Sin => u.call(Func::Cos) * du,
                    Func::Cos => -(u.call(Func::Sin)) * du,
                    Func::Exp => u.call(Func::Exp) * du,
                    Func::Ln => du / u,
                }
            }
            Expr::Min(a, b) => Expr::if_less((**a).clone(), (**b).clone(), a.diff(var), b.diff(var)),
            Expr::Max(a, b) => Expr::if_less((**a).clone(), (**b).clone(), b.diff(var), a.diff(var)),
            Expr::IfLess(args) => {
                let [a, b, c, d] = args.as_ref();
                Expr::if_less(a.clone(), b.clone(), c.diff(var), d.diff(var))
            }
        }
    }

    /// Rewrites the expression along the ray `origin + t * ray`
    pub fn along_ray(&self) -> Expr {
        self.substitute(&|v| {
            let (o, r) = match v {
                Var::X => (Var::OriginX, Var::RayX),
                Var::Y => (Var::OriginY, Var::RayY),
                Var::Z => (Var::OriginZ, Var::RayZ),
                _ => return None,
            };
            Some(Expr::Var(o) + Expr::Var(Var::T) * Expr::Var(r))
        })
    }

    /// Moves an expression authored around the origin to `center`, scaled by `scale`
    pub fn translated_scaled(&self, center: Vec3, scale: f32) -> Expr {
        self.substitute(&|v| {
            let c = match v {
                Var::X => center.0,
                Var::Y => center.1,
                Var::Z => center.2,
                _ => return None,
            };
            Some((Expr::Var(v) - Expr::Const(c)) / Expr::Const(scale))
        })
    }

    pub fn gradient(&self) -> [Expr; 3] {
        [self.diff(Var::X), self.diff(Var::Y), self.diff(Var::Z)]
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a + b),
            (Some(a), _) if a == 0.0 => rhs,
            (_, Some(b)) if b == 0.0 => self,
            _ => Expr::Add(Box::new(self), Box::new(rhs)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        match (self.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a - b),
            (Some(a), _) if a == 0.0 => -rhs,
            (_, Some(b)) if b == 0.0 => self,
            _ => Expr::Sub(Box::new(self), Box::new(rhs)),
        }
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a * b),
            (Some(a), _) | (_, Some(a)) if a == 0.0 => Expr::Const(0.0),
            (Some(a), _) if a == 1.0 => rhs,
            (_, Some(b)) if b == 1.0 => self,
            _ => Expr::Mul(Box::new(self), Box::new(rhs)),
        }
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        match (self.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a / b),
            (Some(a), _) if a == 0.0 => Expr::Const(0.0),
            (_, Some(b)) if b == 1.0 => self,
            _ => Expr::Div(Box::new(self), Box::new(rhs)),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(-c),
            Expr::Neg(inner) => *inner,
            other => Expr::Neg(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sphere() -> Expr {
        Expr::x().powi(2) + Expr::y().powi(2) + Expr::z().powi(2) - Expr::constant(1.0)
    }

    #[test]
    fn gradient_of_sphere() {
        let [gx, gy, gz] = unit_sphere().gradient();
        let p = Vec3(0.3, -0.2, 0.5);
        assert!((gx.eval_point(p) - 0.6).abs() < 1e-6);
        assert!((gy.eval_point(p) + 0.4).abs() < 1e-6);
        assert!((gz.eval_point(p) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn derivative_along_ray_matches_finite_difference() {
        let f = (Expr::x() * Expr::y().call(Func::Sin) + Expr::z().abs().sqrt()).along_ray();
        let df = f.diff(Var::T);
        let env = |t: f32| {
            move |v: Var| match v {
                Var::T => t,
                Var::OriginX => 0.1,
                Var::OriginY => 0.4,
                Var::OriginZ => 0.9,
                Var::RayX => 0.3,
                Var::RayY => -0.5,
                Var::RayZ => 0.8,
                _ => 0.0,
            }
        };
        let t = 0.7;
        let h = 1e-3;
        let numeric = (f.eval(&env(t + h)) - f.eval(&env(t - h))) / (2.0 * h);
        assert!((df.eval(&env(t)) - numeric).abs() < 1e-2);
    }

    #[test]
    fn interval_evaluation_encloses_point_values() {
        let f = unit_sphere().along_ray();
        let env_i = |v: Var| match v {
            Var::T => Interval::new(0.5, 1.5),
            Var::OriginZ => Interval::point(-3.0),
            Var::RayZ => Interval::point(1.0),
            _ => Interval::point(0.0),
        };
        let enclosure = f.eval(&env_i);
        for k in 0..=10 {
            let t = 0.5 + k as f32 * 0.1;
            let v = f.eval(&|v: Var| match v {
                Var::T => t,
                Var::OriginZ => -3.0,
                Var::RayZ => 1.0,
                _ => 0.0,
            });
            assert!(enclosure.lo - 1e-4 <= v && v <= enclosure.hi + 1e-4);
        }
    }

    #[test]
    fn folding_drops_trivial_terms() {
        assert_eq!(Expr::constant(0.0) * Expr::x() + Expr::y(), Expr::y());
        assert_eq!(Expr::x().diff(Var::Y), Expr::Const(0.0));
    }
}
