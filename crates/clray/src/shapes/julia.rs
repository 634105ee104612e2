//! Quaternion Julia sets of `z -> z^2 + c`, sphere traced with the
//! Hart-Sandin-Kauffman distance estimate.

use std::{fmt::Write, sync::Arc};

use crate::{compiler::emit::float_literal, geometry::Vec3};

use super::{
    implicit::{bounding_code, bounding_interval, vec3_literal},
    Hit, RayQuery,
};

type Quaternion = [f32; 4];

fn quaternion_mult(a: Quaternion, b: Quaternion) -> Quaternion {
    [
        a[0] * b[0] - a[1] * b[1] - a[2] * b[2] - a[3] * b[3],
        a[0] * b[1] + a[1] * b[0] + a[2] * b[3] - a[3] * b[2],
        a[0] * b[2] - a[1] * b[3] + a[2] * b[0] + a[3] * b[1],
        a[0] * b[3] + a[1] * b[2] - a[2] * b[1] + a[3] * b[0],
    ]
}

fn quaternion_square(q: Quaternion) -> Quaternion {
    [q[0] * q[0] - q[1] * q[1] - q[2] * q[2] - q[3] * q[3], 2.0 * q[0] * q[1], 2.0 * q[0] * q[2], 2.0 * q[0] * q[3]]
}

fn add(a: Quaternion, b: Quaternion) -> Quaternion {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn norm(q: Quaternion) -> f32 {
    (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt()
}

/// The 3D slice `w = 0` of a quaternion Julia set, placed at `center` and
/// uniformly scaled by `scale`
#[derive(Clone, Debug)]
pub struct JuliaSet {
    pub c: [f32; 4],
    pub julia_itr: u32,
    pub center: Vec3,
    pub scale: f32,
    /// in local units
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
    /// upper limit of a single tracing step, in world units
    pub max_step: f32,
}

impl JuliaSet {
    pub fn new(c: [f32; 4], julia_itr: u32, center: Vec3, scale: f32) -> Self {
        JuliaSet {
            c,
            julia_itr,
            center,
            scale,
            bounding_radius: 1.5,
            max_iterations: 100,
            precision: 0.001,
            max_step: 0.1,
        }
    }

    pub fn with_tracing(mut self, max_iterations: u32, precision: f32, max_step: f32) -> Self {
        self.max_iterations = max_iterations;
        self.precision = precision;
        self.max_step = max_step;
        self
    }

    pub fn program(&self) -> Arc<JuliaProgram> {
        Arc::new(JuliaProgram {
            c: self.c,
            julia_itr: self.julia_itr,
            center: self.center,
            scale: self.scale,
            bounding_radius: self.bounding_radius * self.scale,
            max_iterations: self.max_iterations,
            precision: self.precision,
            max_step: self.max_step,
        })
    }

    pub(crate) fn intersect_code(&self) -> String {
        self.program().intersect_code()
    }

    pub(crate) fn normal_code(&self) -> String {
        self.program().normal_code()
    }
}

/// World-space form of a [`JuliaSet`]
#[derive(Debug)]
pub struct JuliaProgram {
    pub c: [f32; 4],
    pub julia_itr: u32,
    pub center: Vec3,
    pub scale: f32,
    pub bounding_radius: f32,
    pub max_iterations: u32,
    pub precision: f32,
    pub max_step: f32,
}

impl JuliaProgram {
    fn local(&self, pos: Vec3) -> Quaternion {
        let p = (pos - self.center) / self.scale;
        [p.0, p.1, p.2, 0.0]
    }

    /// Lower bound on the world distance from `pos` to the set
    pub fn distance_estimate(&self, pos: Vec3) -> f32 {
        let mut q = self.local(pos);
        let mut qd = [1.0, 0.0, 0.0, 0.0];
        for _ in 0..self.julia_itr {
            qd = quaternion_mult(q, qd).map(|v| 2.0 * v);
            q = add(quaternion_square(q), self.c);
        }
        let l = norm(q);
        self.scale * 0.5 * l * l.ln() / norm(qd)
    }

    /// Rays leaving the surface never hit it again
    pub fn intersect(&self, q: &RayQuery) -> Option<Hit> {
        if q.origin_self {
            return None;
        }
        let (begin, end) = bounding_interval(self.center, self.bounding_radius, q)?;
        let mut t = begin;
        for _ in 0..self.max_iterations {
            let step = f32::min(self.distance_estimate(q.origin + q.ray * t), self.max_step);
            // also catches NaN, and points whose orbit never escapes
            if !(step >= self.precision) {
                let distance = t + step.max(0.0);
                return (distance > 0.0 && distance < q.old_isec_dist).then_some(Hit { distance, subobject: 0 });
            }
            t += step;
            if t > end {
                return None;
            }
        }
        None
    }

    /// Gradient of `|q|^2` after the last iteration
    pub fn normal(&self, pos: Vec3) -> Vec3 {
        let mut q = self.local(pos);
        let mut g = [Vec3(1.0, 0.0, 0.0), Vec3(0.0, 1.0, 0.0), Vec3(0.0, 0.0, 1.0), Vec3::zero()];
        for _ in 0..self.julia_itr {
            let [gr, gi, gj, gk] = g;
            g = [
                (gr * q[0] - gi * q[1] - gj * q[2] - gk * q[3]) * 2.0,
                (gr * q[1] + gi * q[0]) * 2.0,
                (gr * q[2] + gj * q[0]) * 2.0,
                (gr * q[3] + gk * q[0]) * 2.0,
            ];
            q = add(quaternion_square(q), self.c);
        }
        let n = Vec3::normalized(g[0] * q[0] + g[1] * q[1] + g[2] * q[2] + g[3] * q[3]);
        if n.is_finite() {
            n
        } else {
            Vec3(1.0, 0.0, 0.0)
        }
    }

    fn c_literal(&self) -> String {
        let [a, b, c, d] = self.c.map(float_literal);
        format!("(float4)({a}, {b}, {c}, {d})")
    }

    pub fn intersect_code(&self) -> String {
        let eps = float_literal(self.precision);
        let mut code = String::from("    if (origin_self) return false;\n");
        code += &bounding_code(self.center, self.bounding_radius);
        let _ = write!(
            code,
            "    const float4 c = {c};
    float t = begin;
    for (int itr = 0; itr < {max_itr}; ++itr) {{
        const float3 p = (origin + t * ray - {center}) / {scale};
        const float step = fmin({scale} * julia_distance(p, c, {julia_itr}), {max_step});
        if (!(step >= {eps})) {{
            const float d = t + fmax(step, 0.0f);
            if (!(d > 0.0f) || d >= old_isec_dist) return false;
            *p_isec_dist = d;
            *p_subobject = 0;
            return true;
        }}
        t += step;
        if (t > bound_end) return false;
    }}
    return false;
",
            c = self.c_literal(),
            max_itr = self.max_iterations,
            center = vec3_literal(self.center),
            scale = float_literal(self.scale),
            julia_itr = self.julia_itr,
            max_step = float_literal(self.max_step),
        );
        code
    }

    pub fn normal_code(&self) -> String {
        format!(
            "    return julia_normal((pos - {}) / {}, {}, {});\n",
            vec3_literal(self.center),
            float_literal(self.scale),
            self.c_literal(),
            self.julia_itr,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::sampling::Sampler;

    use super::*;

    fn query(origin: Vec3, ray: Vec3, origin_self: bool) -> RayQuery {
        RayQuery { origin, ray, old_isec_dist: 100.0, inside: false, origin_self, last_subobject: 0 }
    }

    /// With `c = 0` the set is the closed unit ball
    fn unit_ball() -> Arc<JuliaProgram> {
        JuliaSet::new([0.0; 4], 4, Vec3::zero(), 1.0).program()
    }

    #[test]
    fn quaternion_square_matches_the_product() {
        let q = [0.3, -1.2, 0.7, 2.0];
        let s = quaternion_square(q);
        let m = quaternion_mult(q, q);
        for i in 0..4 {
            assert!((s[i] - m[i]).abs() < 1e-5);
        }
        // i * j = k
        assert_eq!(quaternion_mult([0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn distance_estimate_bounds_the_unit_ball() {
        let julia = unit_ball();
        for r in [1.1f32, 1.3, 1.5] {
            let d = julia.distance_estimate(Vec3(r, 0.0, 0.0));
            assert!(d > 0.0 && d <= r - 1.0, "r = {r}: {d}");
        }
        assert!(julia.distance_estimate(Vec3(0.5, 0.0, 0.0)) < 0.0);
    }

    #[test]
    fn traced_hits_land_on_the_unit_ball() {
        let julia = unit_ball();
        let mut sampler = Sampler::new(23);
        for _ in 0..200 {
            let target = Vec3(sampler.uniform() - 0.5, sampler.uniform() - 0.5, sampler.uniform() - 0.5) * 0.8;
            let origin = Vec3(0.0, 0.0, -3.0);
            let ray = Vec3::normalized(target - origin);
            let hit = julia.intersect(&query(origin, ray, false)).unwrap();
            let p = origin + ray * hit.distance;
            assert!((p.length() - 1.0).abs() < 5e-3, "{p:?}");
            assert!(Vec3::dot(julia.normal(p), Vec3::normalized(p)) > 0.999);
        }
    }

    #[test]
    fn misses_and_departures() {
        let julia = unit_ball();
        assert!(julia.intersect(&query(Vec3(0.0, 2.0, -3.0), Vec3(0.0, 0.0, 1.0), false)).is_none());
        assert!(julia.intersect(&query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, 1.0), true)).is_none());

        let far = RayQuery { old_isec_dist: 1.5, ..query(Vec3(0.0, 0.0, -3.0), Vec3(0.0, 0.0, 1.0), false) };
        assert!(julia.intersect(&far).is_none());
    }

    #[test]
    fn code_depends_on_the_constant() {
        let a = JuliaSet::new([-0.2, -0.4, -0.4, -0.4], 4, Vec3::zero(), 1.0);
        let b = JuliaSet::new([-0.5, 0.4, -0.5, -0.1], 4, Vec3::zero(), 1.0);
        assert_ne!(a.intersect_code(), b.intersect_code());
        assert_eq!(a.intersect_code(), a.clone().intersect_code());
        assert!(a.intersect_code().contains("julia_distance(p, c, 4)"));
        assert!(a.normal_code().contains("julia_normal"));
    }
}
