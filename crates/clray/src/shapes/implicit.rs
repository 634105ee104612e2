//! Surfaces given by an expression: implicit `f(x, y, z) = 0` surfaces solved
//! with interval arithmetic, and signed distance fields that are sphere traced.

use std::{
    fmt::Write,
    hash::{Hash, Hasher},
    sync::Arc,
};

use rustc_hash::FxHasher;

use crate::{
    compiler::{
        emit::{float_literal, ExprEmitter, IntervalEmitter, ScalarEmitter},
        expr::{Expr, Var},
        interval::Interval,
        parse::parse_expr,
    },
    error::ParseError,
    geometry::Vec3,
};

use super::{Hit, RayQuery};

/// Width the first step is clamped to when leaving the surface
const SELF_STEP: f32 = 0.1;
const BISECT_FRACTION: f32 = 0.5;

/// Procedure name for per-instance code: the class prefix and a hash of the body
pub fn unique_name(prefix: &str, code: &str) -> String {
    let mut hasher = FxHasher::default();
    code.hash(&mut hasher);
    format!("{prefix}_{:016x}", hasher.finish())
}

/// `f = 0`, negative inside. The equation is authored around the origin and
/// placed at `center`, uniformly scaled by `scale`.
#[derive(Clone, Debug)]
pub struct ImplicitSurface {
    pub equation: Expr,
    pub center: Vec3,
    pub scale: f32,
    /// in local units
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
}

impl ImplicitSurface {
    pub fn new(equation: Expr, center: Vec3, scale: f32, bounding_radius: f32) -> Self {
        ImplicitSurface { equation, center, scale, bounding_radius, max_iterations: 1500, precision: 0.001 }
    }

    pub fn parse(source: &str, center: Vec3, scale: f32, bounding_radius: f32) -> Result<Self, ParseError> {
        Ok(Self::new(parse_expr(source)?, center, scale, bounding_radius))
    }

    pub fn with_solver(mut self, max_iterations: u32, precision: f32) -> Self {
        self.max_iterations = max_iterations;
        self.precision = precision;
        self
    }

    pub fn program(&self) -> Arc<ImplicitProgram> {
        let world = self.equation.translated_scaled(self.center, self.scale);
        let f_ray = world.along_ray();
        Arc::new(ImplicitProgram {
            df_ray: f_ray.diff(Var::T),
            f_ray,
            gradient: world.gradient(),
            center: self.center,
            bounding_radius: self.bounding_radius * self.scale,
            max_iterations: self.max_iterations,
            precision: self.precision,
        })
    }

    pub(crate) fn intersect_code(&self) -> String {
        self.program().intersect_code()
    }

    pub(crate) fn normal_code(&self) -> String {
        gradient_normal_code(&self.program().gradient)
    }
}

/// Signed distance field, negative inside, sphere traced within its bounding sphere
#[derive(Clone, Debug)]
pub struct DistanceField {
    pub distance: Expr,
    pub center: Vec3,
    pub scale: f32,
    /// in local units
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
    /// allow a ray leaving the outside of the surface to hit it again
    pub self_intersection: bool,
}

impl DistanceField {
    pub fn new(distance: Expr, center: Vec3, scale: f32, bounding_radius: f32) -> Self {
        DistanceField {
            distance,
            center,
            scale,
            bounding_radius,
            max_iterations: 1000,
            precision: 1e-5,
            self_intersection: false,
        }
    }

    pub fn parse(source: &str, center: Vec3, scale: f32, bounding_radius: f32) -> Result<Self, ParseError> {
        Ok(Self::new(parse_expr(source)?, center, scale, bounding_radius))
    }

    pub fn with_tracing(mut self, max_iterations: u32, precision: f32, self_intersection: bool) -> Self {
        self.max_iterations = max_iterations;
        self.precision = precision;
        self.self_intersection = self_intersection;
        self
    }

    pub fn program(&self) -> Arc<DistanceProgram> {
        let sdf = self.distance.translated_scaled(self.center, self.scale) * Expr::constant(self.scale);
        Arc::new(DistanceProgram {
            gradient: sdf.gradient(),
            sdf,
            center: self.center,
            bounding_radius: self.bounding_radius * self.scale,
            max_iterations: self.max_iterations,
            precision: self.precision,
            self_intersection: self.self_intersection,
        })
    }

    pub(crate) fn intersect_code(&self) -> String {
        self.program().intersect_code()
    }

    pub(crate) fn normal_code(&self) -> String {
        gradient_normal_code(&self.program().gradient)
    }
}

/// World-space form of an [`ImplicitSurface`], ready to solve or emit
#[derive(Debug)]
pub struct ImplicitProgram {
    pub f_ray: Expr,
    pub df_ray: Expr,
    pub gradient: [Expr; 3],
    pub center: Vec3,
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
}

/// World-space form of a [`DistanceField`]
#[derive(Debug)]
pub struct DistanceProgram {
    pub sdf: Expr,
    pub gradient: [Expr; 3],
    pub center: Vec3,
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
    pub self_intersection: bool,
}

/// `[begin, end]` of the ray inside the bounding sphere, clipped to `[0, old]`
pub(super) fn bounding_interval(center: Vec3, radius: f32, q: &RayQuery) -> Option<(f32, f32)> {
    let rel = q.origin - center;
    let dotp = -Vec3::dot(q.ray, rel);
    let discr = dotp * dotp - rel.square_magnitude() + radius * radius;
    if discr < 0.0 {
        return None;
    }
    let begin = f32::max(dotp - discr.sqrt(), 0.0);
    let end = f32::min(dotp + discr.sqrt(), q.old_isec_dist);
    (begin <= end).then_some((begin, end))
}

pub(super) fn vec3_literal(v: Vec3) -> String {
    format!("(float3)({}, {}, {})", float_literal(v.0), float_literal(v.1), float_literal(v.2))
}

pub(super) fn bounding_code(center: Vec3, radius: f32) -> String {
    format!(
        "    float begin, bound_end;
    {{
        const float3 rel = origin - {};
        const float dotp = -dot(ray, rel);
        const float discr = dotp * dotp - dot(rel, rel) + {r} * {r};
        if (discr < 0.0f) return false;
        begin = fmax(dotp - sqrt(discr), 0.0f);
        bound_end = fmin(dotp + sqrt(discr), old_isec_dist);
    }}
",
        vec3_literal(center),
        r = float_literal(radius),
    )
}

fn gradient_normal_code(gradient: &[Expr; 3]) -> String {
    let emitter = ScalarEmitter::for_position("pos");
    let [gx, gy, gz] = gradient.each_ref().map(|g| emitter.emit(g));
    format!("    return normalize((float3)({gx}, {gy}, {gz}));\n")
}

fn gradient_normal(gradient: &[Expr; 3], pos: Vec3) -> Vec3 {
    let [x, y, z] = gradient.each_ref().map(|g| g.eval_point(pos));
    Vec3::normalized(Vec3(x, y, z))
}

impl ImplicitProgram {
    fn eval_interval(&self, expr: &Expr, q: &RayQuery, t: Interval) -> Interval {
        expr.eval(&|v| match v {
            Var::T => t,
            Var::OriginX => Interval::point(q.origin.0),
            Var::OriginY => Interval::point(q.origin.1),
            Var::OriginZ => Interval::point(q.origin.2),
            Var::RayX => Interval::point(q.ray.0),
            Var::RayY => Interval::point(q.ray.1),
            Var::RayZ => Interval::point(q.ray.2),
            _ => Interval::point(0.0),
        })
    }

    fn eval_at(&self, q: &RayQuery, t: f32) -> f32 {
        self.f_ray.eval(&|v| match v {
            Var::T => t,
            Var::OriginX => q.origin.0,
            Var::OriginY => q.origin.1,
            Var::OriginZ => q.origin.2,
            Var::RayX => q.ray.0,
            Var::RayY => q.ray.1,
            Var::RayZ => q.ray.2,
            _ => 0.0,
        })
    }

    /// Adaptive interval marching with bisection on demand
    pub fn intersect(&self, q: &RayQuery) -> Option<Hit> {
        let (begin, bound_end) = bounding_interval(self.center, self.bounding_radius, q)?;
        let eps = self.precision;
        let first_end = if q.origin_self { f32::min(bound_end, begin + SELF_STEP) } else { bound_end };
        let mut t = Interval::new(begin, first_end);
        let mut steps_since_subdiv = 0;

        for itr in 0..self.max_iterations {
            if t.lo >= bound_end {
                return None;
            }
            t.hi = f32::min(t.hi, bound_end);
            let step = t.width();
            let f = self.eval_interval(&self.f_ray, q, t);

            let maybe_root = if q.inside { f.hi > 0.0 } else { f.lo < 0.0 };
            if maybe_root {
                let df = self.eval_interval(&self.df_ray, q, t);
                let definite = !df.contains_zero();
                let leaving = if q.inside { df.hi < 0.0 } else { df.lo > 0.0 };
                if !(q.origin_self && definite && leaving) {
                    let (f_lo, f_hi) = (self.eval_at(q, t.lo), self.eval_at(q, t.hi));
                    let brackets = if q.inside { f_lo <= 0.0 && f_hi >= 0.0 } else { f_lo >= 0.0 && f_hi <= 0.0 };
                    let converged = definite && !leaving && step < eps && (brackets || step < 0.01 * eps);
                    if converged || itr + 1 == self.max_iterations {
                        let mid = t.center();
                        return (mid > 0.0 && mid < q.old_isec_dist).then_some(Hit { distance: mid, subobject: 0 });
                    }
                    t.hi = t.lo + step * BISECT_FRACTION;
                    steps_since_subdiv = 0;
                    continue;
                }
            }

            steps_since_subdiv += 1;
            let next = if steps_since_subdiv > 1 { 2.0 * step } else { step };
            let next = f32::max(next, 0.01 * eps);
            t = Interval::new(t.hi, t.hi + next);
        }
        None
    }

    pub fn normal(&self, pos: Vec3) -> Vec3 {
        gradient_normal(&self.gradient, pos)
    }

    pub fn intersect_code(&self) -> String {
        let ia = IntervalEmitter::for_ray("t", "origin", "ray");
        let f = ia.emit(&self.f_ray);
        let df = ia.emit(&self.df_ray);
        let f_lo = ScalarEmitter::for_ray("t_lo", "origin", "ray").emit(&self.f_ray);
        let f_hi = ScalarEmitter::for_ray("t_hi", "origin", "ray").emit(&self.f_ray);
        let eps = float_literal(self.precision);

        let mut code = bounding_code(self.center, self.bounding_radius);
        let _ = write!(
            code,
            "    interval t = (interval)(begin, origin_self ? fmin(bound_end, begin + {self_step}) : bound_end);
    int steps_since_subdiv = 0;
    for (int itr = 0; itr < {max_itr}; ++itr) {{
        if (t.x >= bound_end) return false;
        t.y = fmin(t.y, bound_end);
        const float step = t.y - t.x;
        const interval f = {f};
        if (inside ? f.y > 0.0f : f.x < 0.0f) {{
            const interval df = {df};
            const bool definite = df.x > 0.0f || df.y < 0.0f;
            const bool leaving = inside ? df.y < 0.0f : df.x > 0.0f;
            if (!(origin_self && definite && leaving)) {{
                const float t_lo = t.x;
                const float t_hi = t.y;
                const float f_lo = {f_lo};
                const float f_hi = {f_hi};
                const bool brackets = inside ? (f_lo <= 0.0f && f_hi >= 0.0f) : (f_lo >= 0.0f && f_hi <= 0.0f);
                if ((definite && !leaving && step < {eps} && (brackets || step < 0.01f * {eps})) || itr + 1 == {max_itr}) {{
                    const float mid = 0.5f * (t.x + t.y);
                    if (!(mid > 0.0f) || mid >= old_isec_dist) return false;
                    *p_isec_dist = mid;
                    *p_subobject = 0;
                    return true;
                }}
                t.y = t.x + step * {fraction};
                steps_since_subdiv = 0;
                continue;
            }}
        }}
        ++steps_since_subdiv;
        const float next = fmax(steps_since_subdiv > 1 ? 2.0f * step : step, 0.01f * {eps});
        t = (interval)(t.y, t.y + next);
    }}
    return false;
",
            self_step = float_literal(SELF_STEP),
            max_itr = self.max_iterations,
            fraction = float_literal(BISECT_FRACTION),
        );
        code
    }
}

impl DistanceProgram {
    pub fn intersect(&self, q: &RayQuery) -> Option<Hit> {
        let (begin, end) = bounding_interval(self.center, self.bounding_radius, q)?;
        if q.origin_self && !q.inside && !self.self_intersection {
            return None;
        }
        let mut t = if q.origin_self { begin + 10.0 * self.precision } else { begin };
        for _ in 0..self.max_iterations {
            if t >= end {
                return None;
            }
            let mut d = self.sdf.eval_point(q.origin + q.ray * t);
            if q.inside {
                d = -d;
            }
            if d < self.precision {
                return (t > 0.0).then_some(Hit { distance: t, subobject: 0 });
            }
            t += d;
        }
        None
    }

    pub fn normal(&self, pos: Vec3) -> Vec3 {
        gradient_normal(&self.gradient, pos)
    }

    pub fn intersect_code(&self) -> String {
        let dist = ScalarEmitter::for_position("p").emit(&self.sdf);
        let eps = float_literal(self.precision);
        let mut code = bounding_code(self.center, self.bounding_radius);
        let _ = write!(
            code,
            "    if (origin_self && !inside && !{self_isec}) return false;
    float t = origin_self ? begin + 10.0f * {eps} : begin;
    for (int itr = 0; itr < {max_itr}; ++itr) {{
        if (t >= bound_end) return false;
        const float3 p = origin + t * ray;
        float d = {dist};
        if (inside) d = -d;
        if (d < {eps}) {{
            if (!(t > 0.0f)) return false;
            *p_isec_dist = t;
            *p_subobject = 0;
            return true;
        }}
        t += d;
    }}
    return false;
",
            self_isec = self.self_intersection,
            max_itr = self.max_iterations,
        );
        code
    }
}

#[cfg(test)]
mod tests {
    use crate::sampling::{uniform_sphere, Sampler};

    use super::*;

    fn query(origin: Vec3, ray: Vec3, inside: bool, origin_self: bool) -> RayQuery {
        RayQuery { origin, ray, old_isec_dist: 100.0, inside, origin_self, last_subobject: 0 }
    }

    fn unit_sphere() -> ImplicitSurface {
        ImplicitSurface::parse("x^2 + y^2 + z^2 - 1", Vec3::zero(), 1.0, 1.5).unwrap()
    }

    #[test]
    fn implicit_sphere_entry_and_exit() {
        let program = unit_sphere().program();
        let hit = program.intersect(&query(Vec3(0.0, 0.0, -3.0), Vec3(0.0, 0.0, 1.0), false, false)).unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-3, "{}", hit.distance);

        let exit = program.intersect(&query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, 1.0), true, true)).unwrap();
        assert!((exit.distance - 2.0).abs() < 1e-3, "{}", exit.distance);

        assert!(program.intersect(&query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, -1.0), false, true)).is_none());
        assert!(program.intersect(&query(Vec3(0.0, 3.0, -3.0), Vec3(0.0, 0.0, 1.0), false, false)).is_none());

        let n = program.normal(Vec3(0.0, 0.0, -1.0));
        assert!((n - Vec3(0.0, 0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn random_rays_find_the_analytic_root() {
        let program = unit_sphere().program();
        let mut sampler = Sampler::new(31);
        let mut hits = 0;
        for _ in 0..2000 {
            let origin = uniform_sphere(sampler.uniform(), sampler.uniform()) * (2.0 + 2.0 * sampler.uniform());
            let target = uniform_sphere(sampler.uniform(), sampler.uniform()) * (1.3 * sampler.uniform());
            let ray = Vec3::normalized(target - origin);
            let b = Vec3::dot(origin, ray);
            let discr = b * b - origin.square_magnitude() + 1.0;
            if discr.abs() < 1e-3 {
                continue;
            }

            let hit = program.intersect(&query(origin, ray, false, false));
            if discr < 0.0 {
                assert!(hit.is_none(), "{origin:?} {ray:?}");
                continue;
            }
            let hit = hit.unwrap_or_else(|| panic!("missed {origin:?} {ray:?}"));
            let root = -b - discr.sqrt();
            assert!((hit.distance - root).abs() < 2e-3, "{} vs {root}", hit.distance);
            let p = origin + ray * hit.distance;
            assert!((p.square_magnitude() - 1.0).abs() < 5e-3);
            hits += 1;
        }
        assert!(hits > 500);
    }

    #[test]
    fn random_exits_from_inside() {
        let program = unit_sphere().program();
        let mut sampler = Sampler::new(37);
        for _ in 0..1000 {
            // leaving from the surface, into the body
            let origin = uniform_sphere(sampler.uniform(), sampler.uniform());
            let ray = uniform_sphere(sampler.uniform(), sampler.uniform());
            let cos = -Vec3::dot(origin, ray);
            if cos > 0.1 {
                let exit = program.intersect(&query(origin, ray, true, true)).unwrap();
                assert!((exit.distance - 2.0 * cos).abs() < 2e-3, "{} vs {}", exit.distance, 2.0 * cos);
            }

            // starting somewhere in the interior
            let start = origin * (0.9 * sampler.uniform());
            let b = Vec3::dot(start, ray);
            let root = -b + (b * b - start.square_magnitude() + 1.0).sqrt();
            let exit = program.intersect(&query(start, ray, true, false)).unwrap();
            assert!((exit.distance - root).abs() < 2e-3, "{} vs {root}", exit.distance);
        }
    }

    #[test]
    fn torus_hit_lies_on_the_surface() {
        let torus = ImplicitSurface::parse("(x^2 + y^2 + z^2 + 0.84)^2 - 4*(x^2 + y^2)", Vec3::zero(), 1.0, 1.5).unwrap();
        let origin = Vec3(1.0, 0.1, -3.0);
        let ray = Vec3::normalized(Vec3(0.05, 0.02, 1.0));
        let hit = torus.program().intersect(&query(origin, ray, false, false)).unwrap();
        let p = origin + ray * hit.distance;
        assert!(torus.equation.eval_point(p).abs() < 0.05, "f({p:?}) = {}", torus.equation.eval_point(p));
        assert!(hit.distance > 2.0 && hit.distance < 3.0);

        // down the hole
        assert!(torus.program().intersect(&query(Vec3(0.0, 0.0, -3.0), Vec3(0.0, 0.0, 1.0), false, false)).is_none());
    }

    #[test]
    fn placement_applies_center_and_scale() {
        let shape = ImplicitSurface::parse("x^2 + y^2 + z^2 - 1", Vec3(1.0, 0.0, 0.0), 2.0, 1.5).unwrap();
        let hit = shape.program().intersect(&query(Vec3(1.0, 0.0, -5.0), Vec3(0.0, 0.0, 1.0), false, false)).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-3);
    }

    #[test]
    fn distance_field_sphere_tracing() {
        let df = DistanceField::parse("sqrt(x^2 + y^2 + z^2) - 1", Vec3::zero(), 1.0, 1.5).unwrap();
        let program = df.program();
        let hit = program.intersect(&query(Vec3(0.0, 0.0, -3.0), Vec3(0.0, 0.0, 1.0), false, false)).unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-4);

        let exit = program.intersect(&query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, 1.0), true, true)).unwrap();
        assert!((exit.distance - 2.0).abs() < 1e-3);
        assert!(program.intersect(&query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, -1.0), false, true)).is_none());
    }

    #[test]
    fn names_follow_the_body() {
        let a = unit_sphere().intersect_code();
        let b = unit_sphere().intersect_code();
        assert_eq!(unique_name("ImplicitSurface_intersect", &a), unique_name("ImplicitSurface_intersect", &b));

        let c = unit_sphere().with_solver(10, 0.01).intersect_code();
        assert_ne!(unique_name("ImplicitSurface_intersect", &a), unique_name("ImplicitSurface_intersect", &c));
        assert!(a.contains("ia_mul") || a.contains("ia_pown"));
    }
}
