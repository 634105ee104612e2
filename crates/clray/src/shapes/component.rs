//! Convex building blocks of a [`ConvexIntersection`](super::ConvexIntersection).
//!
//! A component reports the parametric interval the ray spends inside it. An
//! unbounded side is reported as an infinite bound, a miss as `None`.

use crate::{
    compiler::procedure::{CompiledProcedure, FormalParam, ProcedureKind, Template},
    geometry::Vec3,
};

use super::{ParamReader, ParamValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    HalfSpace,
    Layer,
    Sphere,
    Cylinder,
    Cone,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ComponentGeometry {
    /// `dot(p, normal) <= offset`
    HalfSpace { normal: Vec3, offset: f32 },
    /// `0 <= dot(p, axis) <= thickness`
    Layer { axis: Vec3, thickness: f32 },
    Sphere { radius: f32 },
    /// infinite along `axis`
    Cylinder { axis: Vec3, radius: f32 },
    /// semi-infinite, apex at the component position, opening along `axis`
    Cone { axis: Vec3, slope: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub position: Vec3,
    pub geometry: ComponentGeometry,
}

impl Component {
    pub fn half_space(position: Vec3, normal: Vec3, offset: f32) -> Component {
        Component { position, geometry: ComponentGeometry::HalfSpace { normal: Vec3::normalized(normal), offset } }
    }

    pub fn layer(position: Vec3, axis: Vec3, thickness: f32) -> Component {
        Component { position, geometry: ComponentGeometry::Layer { axis: Vec3::normalized(axis), thickness } }
    }

    pub fn sphere(position: Vec3, radius: f32) -> Component {
        Component { position, geometry: ComponentGeometry::Sphere { radius } }
    }

    pub fn cylinder(position: Vec3, axis: Vec3, radius: f32) -> Component {
        Component { position, geometry: ComponentGeometry::Cylinder { axis: Vec3::normalized(axis), radius } }
    }

    pub fn cone(position: Vec3, axis: Vec3, slope: f32) -> Component {
        Component { position, geometry: ComponentGeometry::Cone { axis: Vec3::normalized(axis), slope } }
    }

    pub fn kind(&self) -> ComponentKind {
        match self.geometry {
            ComponentGeometry::HalfSpace { .. } => ComponentKind::HalfSpace,
            ComponentGeometry::Layer { .. } => ComponentKind::Layer,
            ComponentGeometry::Sphere { .. } => ComponentKind::Sphere,
            ComponentGeometry::Cylinder { .. } => ComponentKind::Cylinder,
            ComponentGeometry::Cone { .. } => ComponentKind::Cone,
        }
    }

    /// Position first, then the kind's own parameters
    pub(crate) fn parameter_values(&self) -> Vec<ParamValue> {
        let mut values = vec![ParamValue::Vec3(self.position)];
        match self.geometry {
            ComponentGeometry::HalfSpace { normal, offset } => {
                values.extend([ParamValue::Vec3(normal), ParamValue::Float(offset)])
            }
            ComponentGeometry::Layer { axis, thickness } => {
                values.extend([ParamValue::Vec3(axis), ParamValue::Float(thickness)])
            }
            ComponentGeometry::Sphere { radius } => values.push(ParamValue::Float(radius)),
            ComponentGeometry::Cylinder { axis, radius } => {
                values.extend([ParamValue::Vec3(axis), ParamValue::Float(radius)])
            }
            ComponentGeometry::Cone { axis, slope } => {
                values.extend([ParamValue::Vec3(axis), ParamValue::Float(slope)])
            }
        }
        values
    }
}

/// Parametric interval a ray spends inside a component
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComponentInterval {
    pub begin: f32,
    pub end: f32,
    pub begin_sub: u32,
    pub end_sub: u32,
}

impl Default for ComponentInterval {
    fn default() -> Self {
        ComponentInterval { begin: f32::NEG_INFINITY, end: f32::INFINITY, begin_sub: 0, end_sub: 0 }
    }
}

const HALF_SPACE_INTERVAL: &str = "    const float slope = dot(ray, normal);
    const float dist = (offset - dot(rel, normal)) / slope;
    if (slope < 0.0f) { *p_begin = dist; *p_begin_sub = 0; }
    else if (slope > 0.0f) { *p_end = dist; *p_end_sub = 0; }
    else if (dot(rel, normal) > offset) return false;
    return true;
";

const LAYER_INTERVAL: &str = "    const float slope = dot(ray, axis);
    const float d0 = -dot(rel, axis);
    if (slope == 0.0f) return d0 <= 0.0f && d0 + thickness >= 0.0f;
    if (slope > 0.0f) {
        *p_begin = d0 / slope; *p_begin_sub = 0;
        *p_end = (d0 + thickness) / slope; *p_end_sub = 1;
    } else {
        *p_begin = (d0 + thickness) / slope; *p_begin_sub = 1;
        *p_end = d0 / slope; *p_end_sub = 0;
    }
    return true;
";

const SPHERE_INTERVAL: &str = "    const float dotp = -dot(ray, rel);
    const float discr = dotp * dotp - dot(rel, rel) + radius * radius;
    if (discr < 0.0f) return false;
    const float s = sqrt(discr);
    *p_begin = dotp - s;
    *p_end = dotp + s;
    return true;
";

const CYLINDER_INTERVAL: &str = "    const float3 perp = rel - dot(rel, axis) * axis;
    const float3 ray_perp = ray - dot(ray, axis) * axis;
    const float a = dot(ray_perp, ray_perp);
    const float hb = dot(perp, ray_perp);
    const float c = dot(perp, perp) - radius * radius;
    if (a == 0.0f) return c <= 0.0f;
    const float discr = hb * hb - a * c;
    if (discr < 0.0f) return false;
    const float s = sqrt(discr);
    *p_begin = (-hb - s) / a;
    *p_end = (-hb + s) / a;
    return true;
";

const CONE_INTERVAL: &str = "    const float s2 = slope * slope;
    const float z0 = dot(rel, axis);
    const float rz = dot(ray, axis);
    const float3 op = rel - z0 * axis;
    const float3 rp = ray - rz * axis;
    const float a = dot(rp, rp) - s2 * rz * rz;
    const float hb = dot(op, rp) - s2 * rz * z0;
    const float c = dot(op, op) - s2 * z0 * z0;
    const float discr = hb * hb - a * c;
    if (discr < 0.0f) return a < 0.0f && z0 > 0.0f;
    if (a == 0.0f) {
        if (hb == 0.0f) return c <= 0.0f && z0 > 0.0f;
        const float t0 = -c / (2.0f * hb);
        if (hb > 0.0f) {
            if (z0 + (t0 - 1.0f) * rz < 0.0f) return false;
            *p_end = t0;
        } else {
            if (z0 + (t0 + 1.0f) * rz < 0.0f) return false;
            *p_begin = t0;
        }
        return true;
    }
    const float sq = sqrt(discr);
    const float t1 = fmin((-hb - sq) / a, (-hb + sq) / a);
    const float t2 = fmax((-hb - sq) / a, (-hb + sq) / a);
    if (a > 0.0f) {
        if (z0 + 0.5f * (t1 + t2) * rz < 0.0f) return false;
        *p_begin = t1;
        *p_end = t2;
    } else if (z0 + (t2 + 1.0f) * rz >= 0.0f) {
        *p_begin = t2;
    } else {
        *p_end = t1;
    }
    return true;
";

impl ComponentKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            ComponentKind::HalfSpace => "HalfSpaceComponent",
            ComponentKind::Layer => "LayerComponent",
            ComponentKind::Sphere => "SphereComponent",
            ComponentKind::Cylinder => "CylinderComponent",
            ComponentKind::Cone => "ConeComponent",
        }
    }

    pub fn n_subobjects(&self) -> u32 {
        match self {
            ComponentKind::Layer => 2,
            _ => 1,
        }
    }

    pub fn formal_params(&self) -> Vec<FormalParam> {
        match self {
            ComponentKind::HalfSpace => vec![FormalParam::vec3("normal"), FormalParam::float("offset")],
            ComponentKind::Layer => vec![FormalParam::vec3("axis"), FormalParam::float("thickness")],
            ComponentKind::Sphere => vec![FormalParam::float("radius")],
            ComponentKind::Cylinder => vec![FormalParam::vec3("axis"), FormalParam::float("radius")],
            ComponentKind::Cone => vec![FormalParam::vec3("axis"), FormalParam::float("slope")],
        }
    }

    /// Floats taken by the kind's own parameters (position excluded)
    pub fn float_count(&self) -> usize {
        match self {
            ComponentKind::Sphere => 1,
            _ => 4,
        }
    }

    pub fn interval_name(&self) -> String {
        format!("{}_interval", self.class_name())
    }

    pub fn normal_name(&self) -> String {
        format!("{}_normal", self.class_name())
    }

    fn interval_code(&self) -> &'static str {
        match self {
            ComponentKind::HalfSpace => HALF_SPACE_INTERVAL,
            ComponentKind::Layer => LAYER_INTERVAL,
            ComponentKind::Sphere => SPHERE_INTERVAL,
            ComponentKind::Cylinder => CYLINDER_INTERVAL,
            ComponentKind::Cone => CONE_INTERVAL,
        }
    }

    fn normal_code(&self) -> &'static str {
        match self {
            ComponentKind::HalfSpace => "    return normal;\n",
            ComponentKind::Layer => "    return subobject == 1 ? axis : -axis;\n",
            ComponentKind::Sphere => "    return rel / radius;\n",
            ComponentKind::Cylinder => "    return (rel - dot(rel, axis) * axis) / radius;\n",
            ComponentKind::Cone => {
                "    const float z = dot(rel, axis);\n    return normalize(rel - z * axis - slope * slope * z * axis);\n"
            }
        }
    }

    pub fn procedures(&self) -> [CompiledProcedure; 2] {
        [
            CompiledProcedure::new(
                self.interval_name(),
                ProcedureKind::ComponentInterval,
                self.formal_params(),
                self.interval_code(),
                Template::Component(*self),
            ),
            CompiledProcedure::new(
                self.normal_name(),
                ProcedureKind::ComponentNormal,
                self.formal_params(),
                self.normal_code(),
                Template::Component(*self),
            ),
        ]
    }

    /// Reads this kind's parameters and intersects the ray, given relative to the component position
    pub fn interval(&self, params: &mut ParamReader, rel: Vec3, ray: Vec3) -> Option<ComponentInterval> {
        let mut out = ComponentInterval::default();
        match self {
            ComponentKind::HalfSpace => {
                let normal = params.vec3();
                let offset = params.float();
                let slope = Vec3::dot(ray, normal);
                let dist = (offset - Vec3::dot(rel, normal)) / slope;
                if slope < 0.0 {
                    out.begin = dist;
                } else if slope > 0.0 {
                    out.end = dist;
                } else if Vec3::dot(rel, normal) > offset {
                    return None;
                }
            }
            ComponentKind::Layer => {
                let axis = params.vec3();
                let thickness = params.float();
                let slope = Vec3::dot(ray, axis);
                let d0 = -Vec3::dot(rel, axis);
                if slope == 0.0 {
                    return (d0 <= 0.0 && d0 + thickness >= 0.0).then_some(out);
                }
                if slope > 0.0 {
                    out = ComponentInterval { begin: d0 / slope, end: (d0 + thickness) / slope, begin_sub: 0, end_sub: 1 };
                } else {
                    out = ComponentInterval { begin: (d0 + thickness) / slope, end: d0 / slope, begin_sub: 1, end_sub: 0 };
                }
            }
            ComponentKind::Sphere => {
                let radius = params.float();
                let dotp = -Vec3::dot(ray, rel);
                let discr = dotp * dotp - Vec3::dot(rel, rel) + radius * radius;
                if discr < 0.0 {
                    return None;
                }
                out.begin = dotp - discr.sqrt();
                out.end = dotp + discr.sqrt();
            }
            ComponentKind::Cylinder => {
                let axis = params.vec3();
                let radius = params.float();
                let perp = rel - Vec3::dot(rel, axis) * axis;
                let ray_perp = ray - Vec3::dot(ray, axis) * axis;
                let a = ray_perp.square_magnitude();
                let hb = Vec3::dot(perp, ray_perp);
                let c = perp.square_magnitude() - radius * radius;
                if a == 0.0 {
                    return (c <= 0.0).then_some(out);
                }
                let discr = hb * hb - a * c;
                if discr < 0.0 {
                    return None;
                }
                out.begin = (-hb - discr.sqrt()) / a;
                out.end = (-hb + discr.sqrt()) / a;
            }
            ComponentKind::Cone => {
                let axis = params.vec3();
                let slope = params.float();
                return cone_interval(axis, slope, rel, ray);
            }
        }
        Some(out)
    }

    pub fn normal(&self, params: &mut ParamReader, rel: Vec3, subobject: u32) -> Vec3 {
        match self {
            ComponentKind::HalfSpace => params.vec3(),
            ComponentKind::Layer => {
                let axis = params.vec3();
                if subobject == 1 { axis } else { -axis }
            }
            ComponentKind::Sphere => rel / params.float(),
            ComponentKind::Cylinder => {
                let axis = params.vec3();
                let radius = params.float();
                (rel - Vec3::dot(rel, axis) * axis) / radius
            }
            ComponentKind::Cone => {
                let axis = params.vec3();
                let slope = params.float();
                let z = Vec3::dot(rel, axis);
                Vec3::normalized(rel - z * axis - slope * slope * z * axis)
            }
        }
    }
}

fn cone_interval(axis: Vec3, slope: f32, rel: Vec3, ray: Vec3) -> Option<ComponentInterval> {
    let mut out = ComponentInterval::default();
    let s2 = slope * slope;
    let z0 = Vec3::dot(rel, axis);
    let rz = Vec3::dot(ray, axis);
    let op = rel - z0 * axis;
    let rp = ray - rz * axis;
    let a = rp.square_magnitude() - s2 * rz * rz;
    let hb = Vec3::dot(op, rp) - s2 * rz * z0;
    let c = op.square_magnitude() - s2 * z0 * z0;
    let discr = hb * hb - a * c;
    let z_at = |t: f32| z0 + t * rz;

    // no crossings: the whole line is on one side of the double cone
    if discr < 0.0 {
        return (a < 0.0 && z0 > 0.0).then_some(out);
    }
    if a == 0.0 {
        if hb == 0.0 {
            return (c <= 0.0 && z0 > 0.0).then_some(out);
        }
        let t0 = -c / (2.0 * hb);
        if hb > 0.0 {
            if z_at(t0 - 1.0) < 0.0 {
                return None;
            }
            out.end = t0;
        } else {
            if z_at(t0 + 1.0) < 0.0 {
                return None;
            }
            out.begin = t0;
        }
        return Some(out);
    }

    let sq = discr.sqrt();
    let t1 = f32::min((-hb - sq) / a, (-hb + sq) / a);
    let t2 = f32::max((-hb - sq) / a, (-hb + sq) / a);
    if a > 0.0 {
        // inside between the roots; reject the lower nappe
        if z_at(0.5 * (t1 + t2)) < 0.0 {
            return None;
        }
        out.begin = t1;
        out.end = t2;
    } else if z_at(t2 + 1.0) >= 0.0 {
        out.begin = t2;
    } else {
        out.end = t1;
    }
    Some(out)
}
