use crate::{compiler::procedure::FormalParam, geometry::Vec3};

use super::{Hit, ParamReader, ParamValue, RayQuery};

/// Solid region `dot(p, normal) + offset <= 0`; the normal points out of it
#[derive(Clone, Debug, PartialEq)]
pub struct HalfSpace {
    pub normal: Vec3,
    pub offset: f32,
}

pub(crate) const INTERSECT_CODE: &str = "    if (origin_self) return false;
    const float slope = -dot(ray, normal);
    const float dist = (dot(origin, normal) + offset) / slope;
    if (!(dist > 0.0f) || dist >= old_isec_dist) return false;
    *p_isec_dist = dist;
    *p_subobject = 0;
    return true;
";

pub(crate) const NORMAL_CODE: &str = "    return normal;
";

impl HalfSpace {
    pub fn new(normal: Vec3, offset: f32) -> HalfSpace {
        HalfSpace { normal: Vec3::normalized(normal), offset }
    }

    pub(crate) fn formal_params() -> Vec<FormalParam> {
        vec![FormalParam::vec3("normal"), FormalParam::float("offset")]
    }

    pub(crate) fn parameter_values(&self) -> Vec<ParamValue> {
        vec![ParamValue::Vec3(self.normal), ParamValue::Float(self.offset)]
    }
}

pub(crate) fn intersect(params: &mut ParamReader, q: &RayQuery) -> Option<Hit> {
    let normal = params.vec3();
    let offset = params.float();

    // a plane is never re-hit from its own surface
    if q.origin_self {
        return None;
    }
    let slope = -Vec3::dot(q.ray, normal);
    let dist = (Vec3::dot(q.origin, normal) + offset) / slope;
    (dist > 0.0 && dist < q.old_isec_dist).then_some(Hit { distance: dist, subobject: 0 })
}

pub(crate) fn normal(params: &mut ParamReader) -> Vec3 {
    params.vec3()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_hit_from_above_and_below() {
        let floats = [0.0, 0.0, 1.0, 0.0];
        let mut q = RayQuery {
            origin: Vec3(0.0, 0.0, 2.0),
            ray: Vec3::normalized(Vec3(1.0, 0.0, -1.0)),
            old_isec_dist: 100.0,
            inside: false,
            origin_self: false,
            last_subobject: 0,
        };
        let hit = intersect(&mut ParamReader::new(&floats, &[], &[], &[]), &q).unwrap();
        assert!((hit.distance - 2.0 * 2f32.sqrt()).abs() < 1e-5);

        q.ray = Vec3(0.0, 0.0, 1.0);
        assert!(intersect(&mut ParamReader::new(&floats, &[], &[], &[]), &q).is_none());
    }
}
