use std::f32::consts::PI;

use crate::{compiler::procedure::FormalParam, geometry::Vec3, sampling::uniform_sphere};

use super::{Hit, ParamReader, ParamValue, RayQuery};

#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

pub(crate) const INTERSECT_CODE: &str = "    if (origin_self && !inside) return false;
    const float3 rel = center - origin;
    const float dotp = dot(ray, rel);
    if (dotp <= 0.0f && !inside) return false;
    const float discr = dotp * dotp - dot(rel, rel) + radius * radius;
    if (discr < 0.0f) return false;
    const float dist = inside ? dotp + sqrt(discr) : dotp - sqrt(discr);
    if (dist <= 0.0f || dist >= old_isec_dist) return false;
    *p_isec_dist = dist;
    *p_subobject = 0;
    return true;
";

pub(crate) const NORMAL_CODE: &str = "    return (pos - center) / radius;
";

impl Sphere {
    pub(crate) fn formal_params() -> Vec<FormalParam> {
        vec![FormalParam::vec3("center"), FormalParam::float("radius")]
    }

    pub(crate) fn parameter_values(&self) -> Vec<ParamValue> {
        vec![ParamValue::Vec3(self.center), ParamValue::Float(self.radius)]
    }

    pub fn surface_area(&self) -> f32 {
        4.0 * PI * self.radius * self.radius
    }

    pub fn sample_surface(&self, u1: f32, u2: f32) -> (Vec3, Vec3) {
        let n = uniform_sphere(u1, u2);
        (self.center + n * self.radius, n)
    }
}

pub(crate) fn intersect(params: &mut ParamReader, q: &RayQuery) -> Option<Hit> {
    let center = params.vec3();
    let radius = params.float();

    if q.origin_self && !q.inside {
        return None;
    }
    let rel = center - q.origin;
    let dotp = Vec3::dot(q.ray, rel);
    if dotp <= 0.0 && !q.inside {
        return None;
    }
    let discr = dotp * dotp - Vec3::dot(rel, rel) + radius * radius;
    if discr < 0.0 {
        return None;
    }
    let dist = if q.inside { dotp + discr.sqrt() } else { dotp - discr.sqrt() };
    (dist > 0.0 && dist < q.old_isec_dist).then_some(Hit { distance: dist, subobject: 0 })
}

pub(crate) fn normal(params: &mut ParamReader, pos: Vec3) -> Vec3 {
    let center = params.vec3();
    let radius = params.float();
    (pos - center) / radius
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(origin: Vec3, ray: Vec3, inside: bool, origin_self: bool) -> RayQuery {
        RayQuery { origin, ray, old_isec_dist: 100.0, inside, origin_self, last_subobject: 0 }
    }

    #[test]
    fn entering_and_exiting() {
        let floats = [0.0, 0.0, 0.0, 1.0];
        let hit = intersect(&mut ParamReader::new(&floats, &[], &[], &[]), &query(Vec3(0.0, 0.0, -3.0), Vec3(0.0, 0.0, 1.0), false, false)).unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-6);

        // refracted into the sphere from its own surface: the exit is found
        let exit = intersect(&mut ParamReader::new(&floats, &[], &[], &[]), &query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, 1.0), true, true)).unwrap();
        assert!((exit.distance - 2.0).abs() < 1e-5);

        // reflected off the outside: never re-hit
        assert!(intersect(&mut ParamReader::new(&floats, &[], &[], &[]), &query(Vec3(0.0, 0.0, -1.0), Vec3(0.0, 0.0, -1.0), false, true)).is_none());
    }
}
