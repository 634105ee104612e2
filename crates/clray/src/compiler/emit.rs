//! OpenCL C emission for expression trees.
//!
//! The emitter is a strategy object handed to the tree walk: the same
//! expression becomes plain float code or interval code depending on which
//! emitter is used, and variable spelling is owned by the emitter instance.

use std::collections::BTreeMap;

use super::expr::{Expr, Func, Var};

pub trait ExprEmitter {
    fn constant(&self, c: f32) -> String;
    fn variable(&self, v: Var) -> String;
    fn unary(&self, op: &str, a: String) -> String;
    fn binary(&self, op: &str, a: String, b: String) -> String;
    fn powi(&self, a: String, n: i32) -> String;
    fn call(&self, func: Func, a: String) -> String;
    fn if_less(&self, args: [String; 4]) -> String;

    fn emit(&self, expr: &Expr) -> String {
        match expr {
            Expr::Const(c) => self.constant(*c),
            Expr::Var(v) => self.variable(*v),
            Expr::Neg(a) => self.unary("-", self.emit(a)),
            Expr::Add(a, b) => self.binary("+", self.emit(a), self.emit(b)),
            Expr::Sub(a, b) => self.binary("-", self.emit(a), self.emit(b)),
            Expr::Mul(a, b) => self.binary("*", self.emit(a), self.emit(b)),
            Expr::Div(a, b) => self.binary("/", self.emit(a), self.emit(b)),
            Expr::Powi(a, n) => self.powi(self.emit(a), *n),
            Expr::Call(func, a) => self.call(*func, self.emit(a)),
            Expr::Min(a, b) => self.binary("min", self.emit(a), self.emit(b)),
            Expr::Max(a, b) => self.binary("max", self.emit(a), self.emit(b)),
            Expr::IfLess(args) => self.if_less(args.each_ref().map(|e| self.emit(e))),
        }
    }
}

/// Formats an `f32` as an OpenCL float literal
pub fn float_literal(c: f32) -> String {
    if c.is_infinite() {
        return if c > 0.0 { "INFINITY".into() } else { "(-INFINITY)".into() };
    }
    let text = format!("{c:?}");
    if text.contains(['.', 'e', 'E']) {
        format!("{text}f")
    } else {
        format!("{text}.0f")
    }
}

fn func_name(func: Func) -> &'static str {
    match func {
        Func::Sqrt => "sqrt",
        Func::Abs => "fabs",
        Func::Sin => "sin",
        Func::Cos => "cos",
        Func::Exp => "exp",
        Func::Ln => "log",
    }
}

/// Emits plain `float` arithmetic
pub struct ScalarEmitter {
    names: BTreeMap<Var, String>,
}

impl ScalarEmitter {
    /// x, y, z read from the components of a float3 named `pos`
    pub fn for_position(pos: &str) -> Self {
        let names = [(Var::X, "x"), (Var::Y, "y"), (Var::Z, "z")]
            .into_iter()
            .map(|(v, c)| (v, format!("{pos}.{c}")))
            .collect();
        ScalarEmitter { names }
    }

    /// Expressions rewritten along a ray: scalar `t`, float3 `origin` and `ray`
    pub fn for_ray(t: &str, origin: &str, ray: &str) -> Self {
        let mut names = BTreeMap::new();
        names.insert(Var::T, t.to_string());
        for (o, r, c) in [
            (Var::OriginX, Var::RayX, "x"),
            (Var::OriginY, Var::RayY, "y"),
            (Var::OriginZ, Var::RayZ, "z"),
        ] {
            names.insert(o, format!("{origin}.{c}"));
            names.insert(r, format!("{ray}.{c}"));
        }
        ScalarEmitter { names }
    }
}

impl ExprEmitter for ScalarEmitter {
    fn constant(&self, c: f32) -> String {
        float_literal(c)
    }

    fn variable(&self, v: Var) -> String {
        self.names.get(&v).cloned().unwrap_or_else(|| "0.0f".to_string())
    }

    fn unary(&self, op: &str, a: String) -> String {
        format!("({op}{a})")
    }

    fn binary(&self, op: &str, a: String, b: String) -> String {
        match op {
            "min" => format!("fmin({a}, {b})"),
            "max" => format!("fmax({a}, {b})"),
            _ => format!("({a} {op} {b})"),
        }
    }

    fn powi(&self, a: String, n: i32) -> String {
        format!("pown({a}, {n})")
    }

    fn call(&self, func: Func, a: String) -> String {
        format!("{}({a})", func_name(func))
    }

    fn if_less(&self, [a, b, c, d]: [String; 4]) -> String {
        format!("(({a}) < ({b}) ? ({c}) : ({d}))")
    }
}

/// Emits calls into the `ia_*` interval prelude, where `interval` is a float2
pub struct IntervalEmitter {
    names: BTreeMap<Var, String>,
}

impl IntervalEmitter {
    /// `t` is an interval variable, origin and ray are exact float3s
    pub fn for_ray(t: &str, origin: &str, ray: &str) -> Self {
        let mut names = BTreeMap::new();
        names.insert(Var::T, t.to_string());
        for (o, r, c) in [
            (Var::OriginX, Var::RayX, "x"),
            (Var::OriginY, Var::RayY, "y"),
            (Var::OriginZ, Var::RayZ, "z"),
        ] {
            names.insert(o, format!("ia_point({origin}.{c})"));
            names.insert(r, format!("ia_point({ray}.{c})"));
        }
        IntervalEmitter { names }
    }
}

impl ExprEmitter for IntervalEmitter {
    fn constant(&self, c: f32) -> String {
        format!("ia_point({})", float_literal(c))
    }

    fn variable(&self, v: Var) -> String {
        self.names.get(&v).cloned().unwrap_or_else(|| "ia_point(0.0f)".to_string())
    }

    fn unary(&self, _op: &str, a: String) -> String {
        format!("ia_neg({a})")
    }

    fn binary(&self, op: &str, a: String, b: String) -> String {
        let name = match op {
            "+" => "ia_add",
            "-" => "ia_sub",
            "*" => "ia_mul",
            "/" => "ia_div",
            "min" => "ia_min",
            _ => "ia_max",
        };
        format!("{name}({a}, {b})")
    }

    fn powi(&self, a: String, n: i32) -> String {
        format!("ia_pown({a}, {n})")
    }

    fn call(&self, func: Func, a: String) -> String {
        let name = match func {
            Func::Sqrt => "ia_sqrt",
            Func::Abs => "ia_abs",
            Func::Sin => "ia_sin",
            Func::Cos => "ia_cos",
            Func::Exp => "ia_exp",
            Func::Ln => "ia_log",
        };
        format!("{name}({a})")
    }

    fn if_less(&self, [a, b, c, d]: [String; 4]) -> String {
        format!("ia_select_lt({a}, {b}, {c}, {d})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_float_typed() {
        assert_eq!(float_literal(1.0), "1.0f");
        assert_eq!(float_literal(0.25), "0.25f");
        assert!(float_literal(1e-7).ends_with('f'));
    }

    #[test]
    fn same_tree_two_strategies() {
        let e = Expr::x().powi(2) - Expr::constant(1.0);
        assert_eq!(ScalarEmitter::for_position("p").emit(&e), "(pown(p.x, 2) - 1.0f)");

        let along = e.along_ray();
        let code = IntervalEmitter::for_ray("t", "o", "r").emit(&along);
        assert!(code.starts_with("ia_sub(ia_pown("));
        assert!(code.contains("ia_mul(t, ia_point(r.x))"));
    }
}
