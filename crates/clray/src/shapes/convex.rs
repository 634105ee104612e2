use std::fmt::Write;

use crate::{
    compiler::procedure::{CompiledProcedure, FormalParam},
    geometry::Vec3,
};

use super::{
    component::{Component, ComponentKind},
    Hit, ParamReader, ParamValue, RayQuery,
};

const PHI: f32 = 1.618_034;
/// inradius over circumradius of the dodecahedron and the icosahedron
const DUAL_INRADIUS_RATIO: f32 = 0.794_654_5;

/// Intersection of convex components.
///
/// Component positions are relative to `position`. Subobjects are numbered
/// consecutively across components in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexIntersection {
    pub name: Option<String>,
    pub position: Vec3,
    pub components: Vec<Component>,
    pub bounding_radius: Option<f32>,
}

impl ConvexIntersection {
    pub fn new(position: Vec3, components: Vec<Component>) -> Self {
        ConvexIntersection { name: None, position, components, bounding_radius: None }
    }

    fn named(name: &str, position: Vec3, components: Vec<Component>, bounding_radius: f32) -> Self {
        ConvexIntersection {
            name: Some(name.to_string()),
            position,
            components,
            bounding_radius: Some(bounding_radius),
        }
    }

    pub fn with_bounding_radius(mut self, radius: f32) -> Self {
        self.bounding_radius = Some(radius);
        self
    }

    pub fn cylinder(bottom_center: Vec3, axis: Vec3, height: f32, radius: f32) -> Self {
        let axis = Vec3::normalized(axis);
        let half = axis * (height * 0.5);
        Self::named(
            "Cylinder",
            bottom_center + half,
            vec![Component::layer(-half, axis, height), Component::cylinder(Vec3::zero(), axis, radius)],
            (0.25 * height * height + radius * radius).sqrt(),
        )
    }

    /// Solid cone with its apex at `tip`, opening along `axis`
    pub fn cone(tip: Vec3, axis: Vec3, height: f32, radius: f32) -> Self {
        let axis = Vec3::normalized(axis);
        Self::named(
            "Cone",
            tip,
            vec![Component::layer(Vec3::zero(), axis, height), Component::cone(Vec3::zero(), axis, radius / height)],
            (height * height + radius * radius).sqrt(),
        )
    }

    /// Spanned by three edge vectors from `corner`
    pub fn parallelepiped(corner: Vec3, e1: Vec3, e2: Vec3, e3: Vec3) -> Self {
        let half_diagonal = (e1 + e2 + e3) * 0.5;
        let layer = |a: Vec3, b: Vec3, edge: Vec3| {
            let mut n = Vec3::normalized(Vec3::cross(a, b));
            if Vec3::dot(n, edge) < 0.0 {
                n = -n;
            }
            Component::layer(-half_diagonal, n, Vec3::dot(n, edge))
        };
        let bound = [e1 + e2 + e3, e1 + e2 - e3, e1 - e2 + e3, -e1 + e2 + e3]
            .iter()
            .map(|d| d.length() * 0.5)
            .fold(0.0, f32::max);
        Self::named(
            "Parallelepiped",
            corner + half_diagonal,
            vec![layer(e2, e3, e1), layer(e3, e1, e2), layer(e1, e2, e3)],
            bound,
        )
    }

    pub fn aligned_box(min: Vec3, max: Vec3) -> Self {
        let d = max - min;
        Self::parallelepiped(min, Vec3(d.0, 0.0, 0.0), Vec3(0.0, d.1, 0.0), Vec3(0.0, 0.0, d.2))
    }

    pub fn tetrahedron(center: Vec3, radius: f32) -> Self {
        let components = [Vec3(1.0, 1.0, 1.0), Vec3(1.0, -1.0, -1.0), Vec3(-1.0, 1.0, -1.0), Vec3(-1.0, -1.0, 1.0)]
            .into_iter()
            .map(|v| Component::half_space(Vec3::zero(), -v, radius / 3.0))
            .collect();
        Self::named("Tetrahedron", center, components, radius)
    }

    pub fn octahedron(center: Vec3, radius: f32) -> Self {
        let dirs = [Vec3(1.0, 1.0, 1.0), Vec3(1.0, 1.0, -1.0), Vec3(1.0, -1.0, 1.0), Vec3(-1.0, 1.0, 1.0)];
        Self::named("Octahedron", center, symmetric_layers(&dirs, radius / 3f32.sqrt()), radius)
    }

    pub fn dodecahedron(center: Vec3, radius: f32) -> Self {
        let dirs = [
            Vec3(0.0, 1.0, PHI),
            Vec3(0.0, 1.0, -PHI),
            Vec3(1.0, PHI, 0.0),
            Vec3(1.0, -PHI, 0.0),
            Vec3(PHI, 0.0, 1.0),
            Vec3(-PHI, 0.0, 1.0),
        ];
        Self::named("Dodecahedron", center, symmetric_layers(&dirs, radius * DUAL_INRADIUS_RATIO), radius)
    }

    pub fn icosahedron(center: Vec3, radius: f32) -> Self {
        let r = 1.0 / PHI;
        let dirs = [
            Vec3(1.0, 1.0, 1.0),
            Vec3(1.0, 1.0, -1.0),
            Vec3(1.0, -1.0, 1.0),
            Vec3(-1.0, 1.0, 1.0),
            Vec3(0.0, r, PHI),
            Vec3(0.0, r, -PHI),
            Vec3(r, PHI, 0.0),
            Vec3(r, -PHI, 0.0),
            Vec3(PHI, 0.0, r),
            Vec3(-PHI, 0.0, r),
        ];
        Self::named("Icosahedron", center, symmetric_layers(&dirs, radius * DUAL_INRADIUS_RATIO), radius)
    }

    pub fn component_kinds(&self) -> Vec<ComponentKind> {
        self.components.iter().map(Component::kind).collect()
    }

    pub fn class_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let mut name = "ConvexIntersection".to_string();
                for kind in self.component_kinds() {
                    let _ = write!(name, "_{kind:?}");
                }
                name
            }
        }
    }

    pub fn subobject_count(&self) -> u32 {
        self.components.iter().map(|c| c.kind().n_subobjects()).sum()
    }

    pub(crate) fn formal_params() -> Vec<FormalParam> {
        vec![FormalParam::vec3("position"), FormalParam::float("bounding_radius")]
    }

    pub(crate) fn parameter_values(&self) -> Vec<ParamValue> {
        let mut values = vec![
            ParamValue::Vec3(self.position),
            ParamValue::Float(self.bounding_radius.unwrap_or(f32::INFINITY)),
        ];
        for component in &self.components {
            values.extend(component.parameter_values());
        }
        values
    }

    pub(crate) fn component_procedures(&self) -> Vec<CompiledProcedure> {
        let mut kinds: Vec<ComponentKind> = Vec::new();
        for kind in self.component_kinds() {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds.iter().flat_map(ComponentKind::procedures).collect()
    }

    /// Float offset of each component's position in the parameter block
    fn float_offsets(&self) -> Vec<usize> {
        let mut offset = 4;
        self.components
            .iter()
            .map(|c| {
                let here = offset;
                offset += 3 + c.kind().float_count();
                here
            })
            .collect()
    }

    pub(crate) fn intersect_code(&self) -> String {
        let mut code = String::from(
            "    if (origin_self && !inside) return false;
    const float3 rel = origin - position;
    float ibegin, iend;
    {
        const float dotp = -dot(ray, rel);
        const float discr = dotp * dotp - dot(rel, rel) + bounding_radius * bounding_radius;
        if (discr < 0.0f) return false;
        ibegin = fmax(dotp - sqrt(discr), 0.0f);
        iend = fmin(dotp + sqrt(discr), old_isec_dist);
        if (ibegin > iend) return false;
    }
    uint begin_sub = 0, end_sub = 0;
    bool begin_set = false, end_set = false;
    float b, e;
    uint bs, es;
",
        );
        let mut sub_offset = 0;
        for (component, f) in self.components.iter().zip(self.float_offsets()) {
            let kind = component.kind();
            let _ = write!(
                code,
                "    b = -INFINITY; e = INFINITY; bs = 0; es = 0;
    if (!{name}(rel - (float3)(fp[{f0}], fp[{f1}], fp[{f2}]), ray, fp + {fk}, &b, &e, &bs, &es)) return false;
    if (b > ibegin) {{ ibegin = b; begin_sub = {sub_offset}u + bs; begin_set = true; }}
    if (e < iend) {{ iend = e; end_sub = {sub_offset}u + es; end_set = true; }}
    if (ibegin > iend) return false;
",
                name = kind.interval_name(),
                f0 = f,
                f1 = f + 1,
                f2 = f + 2,
                fk = f + 3,
            );
            sub_offset += kind.n_subobjects();
        }
        code.push_str(
            "    if (inside ? !end_set : !begin_set) return false;
    const float dist = inside ? iend : ibegin;
    if (dist <= 0.0f || dist >= old_isec_dist) return false;
    *p_isec_dist = dist;
    *p_subobject = inside ? end_sub : begin_sub;
    return true;
",
        );
        code
    }

    pub(crate) fn normal_code(&self) -> String {
        let mut code = String::from("    const float3 rel = pos - position;\n");
        let mut sub_offset = 0;
        let last = self.components.len().saturating_sub(1);
        for (i, (component, f)) in self.components.iter().zip(self.float_offsets()).enumerate() {
            let kind = component.kind();
            let call = format!(
                "{}(rel - (float3)(fp[{}], fp[{}], fp[{}]), subobject - {sub_offset}u, fp + {})",
                kind.normal_name(),
                f,
                f + 1,
                f + 2,
                f + 3
            );
            sub_offset += kind.n_subobjects();
            if i == last {
                let _ = writeln!(code, "    return {call};");
            } else {
                let _ = writeln!(code, "    if (subobject < {sub_offset}u) return {call};");
            }
        }
        if self.components.is_empty() {
            code.push_str("    return (float3)(0.0f, 0.0f, 1.0f);\n");
        }
        code
    }
}

/// Layers centred on the origin, one per direction, at the given inradius
fn symmetric_layers(dirs: &[Vec3], inradius: f32) -> Vec<Component> {
    dirs.iter()
        .map(|d| {
            let axis = Vec3::normalized(*d);
            Component::layer(-axis * inradius, axis, 2.0 * inradius)
        })
        .collect()
}

pub(crate) fn intersect(components: &[ComponentKind], params: &mut ParamReader, q: &RayQuery) -> Option<Hit> {
    let position = params.vec3();
    let bounding_radius = params.float();

    if q.origin_self && !q.inside {
        return None;
    }
    let rel = q.origin - position;
    let dotp = -Vec3::dot(q.ray, rel);
    let discr = dotp * dotp - rel.square_magnitude() + bounding_radius * bounding_radius;
    if discr < 0.0 {
        return None;
    }
    let mut ibegin = f32::max(dotp - discr.sqrt(), 0.0);
    let mut iend = f32::min(dotp + discr.sqrt(), q.old_isec_dist);
    if ibegin > iend {
        return None;
    }

    let mut begin_sub = None;
    let mut end_sub = None;
    let mut sub_offset = 0;
    for kind in components {
        let pos = params.vec3();
        let interval = kind.interval(params, rel - pos, q.ray)?;
        if interval.begin > ibegin {
            ibegin = interval.begin;
            begin_sub = Some(sub_offset + interval.begin_sub);
        }
        if interval.end < iend {
            iend = interval.end;
            end_sub = Some(sub_offset + interval.end_sub);
        }
        if ibegin > iend {
            return None;
        }
        sub_offset += kind.n_subobjects();
    }

    let (distance, subobject) = if q.inside { (iend, end_sub?) } else { (ibegin, begin_sub?) };
    (distance > 0.0 && distance < q.old_isec_dist).then_some(Hit { distance, subobject })
}

pub(crate) fn normal(components: &[ComponentKind], params: &mut ParamReader, pos: Vec3, subobject: u32) -> Vec3 {
    let rel = pos - params.vec3();
    params.skip_floats(1);
    let mut sub_offset = 0;
    for (i, kind) in components.iter().enumerate() {
        let component_pos = params.vec3();
        let n = kind.n_subobjects();
        if subobject < sub_offset + n || i + 1 == components.len() {
            return kind.normal(params, rel - component_pos, subobject - sub_offset.min(subobject));
        }
        params.skip_floats(kind.float_count());
        sub_offset += n;
    }
    Vec3(0.0, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use crate::{geometry::AABB, sampling::Sampler, shapes::flatten_params};

    use super::*;

    fn hit(shape: &ConvexIntersection, origin: Vec3, ray: Vec3, inside: bool, origin_self: bool) -> Option<Hit> {
        let (mut floats, mut ints) = (vec![], vec![]);
        flatten_params(&shape.parameter_values(), &mut floats, &mut ints);
        let q = RayQuery { origin, ray: Vec3::normalized(ray), old_isec_dist: 1e6, inside, origin_self, last_subobject: 0 };
        intersect(&shape.component_kinds(), &mut ParamReader::new(&floats, &ints, &[], &[]), &q)
    }

    fn normal_at(shape: &ConvexIntersection, pos: Vec3, sub: u32) -> Vec3 {
        let (mut floats, mut ints) = (vec![], vec![]);
        flatten_params(&shape.parameter_values(), &mut floats, &mut ints);
        normal(&shape.component_kinds(), &mut ParamReader::new(&floats, &ints, &[], &[]), pos, sub)
    }

    #[test]
    fn cylinder_side_and_cap() {
        let cyl = ConvexIntersection::cylinder(Vec3::zero(), Vec3(0.0, 0.0, 1.0), 2.0, 1.0);
        assert_eq!(cyl.subobject_count(), 3);

        let side = hit(&cyl, Vec3(-5.0, 0.0, 1.0), Vec3(1.0, 0.0, 0.0), false, false).unwrap();
        assert!((side.distance - 4.0).abs() < 1e-5);
        assert_eq!(side.subobject, 2);
        let n = normal_at(&cyl, Vec3(-1.0, 0.0, 1.0), side.subobject);
        assert!((n - Vec3(-1.0, 0.0, 0.0)).length() < 1e-5);

        let top = hit(&cyl, Vec3(0.2, 0.0, 5.0), Vec3(0.0, 0.0, -1.0), false, false).unwrap();
        assert!((top.distance - 3.0).abs() < 1e-5);
        assert_eq!(top.subobject, 1);
        assert!((normal_at(&cyl, Vec3(0.2, 0.0, 2.0), 1) - Vec3(0.0, 0.0, 1.0)).length() < 1e-6);

        // above the cap, missing the side
        assert!(hit(&cyl, Vec3(-5.0, 0.0, 3.0), Vec3(1.0, 0.0, 0.0), false, false).is_none());
    }

    #[test]
    fn exit_from_inside_and_self_reflection() {
        let cube = ConvexIntersection::aligned_box(Vec3(-1.0, -1.0, -1.0), Vec3(1.0, 1.0, 1.0));
        let exit = hit(&cube, Vec3(-1.0, 0.0, 0.0), Vec3(1.0, 0.0, 0.0), true, true).unwrap();
        assert!((exit.distance - 2.0).abs() < 1e-5);
        assert!(hit(&cube, Vec3(-1.0, 0.0, 0.0), Vec3(-1.0, 0.0, 0.0), false, true).is_none());
    }

    #[test]
    fn layer_merge_matches_the_slab_test() {
        let mut sampler = Sampler::new(17);
        let mut point = |scale: f32| {
            let u = [sampler.uniform(), sampler.uniform(), sampler.uniform()];
            Vec3(u[0] - 0.5, u[1] - 0.5, u[2] - 0.5) * scale
        };

        let mut compared = 0;
        while compared < 1000 {
            let (a, b) = (point(4.0), point(4.0));
            let bounds = AABB::new(Vec3::elementwise_min(a, b), Vec3::elementwise_max(a, b));
            let extent = bounds.extent();
            if extent.0.min(extent.1).min(extent.2) < 0.05 {
                continue;
            }
            let origin = point(12.0);
            let ray = point(2.0);
            if ray.near_zero() {
                continue;
            }
            let ray = Vec3::normalized(ray);

            let slab = bounds.ray_interval(origin, ray, 0.0, f32::INFINITY);
            // skip origins inside the box and grazing rays
            if slab.is_some_and(|(t0, t1)| t0 <= 0.0 || t1 - t0 < 1e-3) {
                continue;
            }
            let cube = ConvexIntersection::aligned_box(bounds.minimum, bounds.maximum);
            let merged = hit(&cube, origin, ray, false, false);
            match (slab, merged) {
                (Some((t0, _)), Some(h)) => assert!((h.distance - t0).abs() < 1e-3 * t0.max(1.0), "{t0} vs {}", h.distance),
                (None, None) => {}
                (slab, merged) => panic!("slab {slab:?} vs merged {merged:?} for {origin:?} {ray:?} in {bounds:?}"),
            }
            compared += 1;
        }
    }

    #[test]
    fn polyhedra_faces_at_inradius() {
        let r = 2.0;
        let octa = ConvexIntersection::octahedron(Vec3::zero(), r);
        let d = Vec3::normalized(Vec3(1.0, 1.0, 1.0));
        let h = hit(&octa, d * 10.0, -d, false, false).unwrap();
        assert!((h.distance - (10.0 - r / 3f32.sqrt())).abs() < 1e-4);

        let tetra = ConvexIntersection::tetrahedron(Vec3::zero(), r);
        let h = hit(&tetra, -d * 10.0, d, false, false).unwrap();
        assert!((h.distance - (10.0 - r / 3.0)).abs() < 1e-4);

        for shape in [ConvexIntersection::dodecahedron(Vec3::zero(), r), ConvexIntersection::icosahedron(Vec3::zero(), r)] {
            let h = hit(&shape, Vec3(0.0, 0.0, 10.0), Vec3(0.0, 0.0, -1.0), false, false).unwrap();
            let depth = 10.0 - h.distance;
            assert!(depth > r * DUAL_INRADIUS_RATIO - 1e-4 && depth <= r + 1e-4);
        }
    }

    #[test]
    fn generated_names_and_code() {
        let shape = ConvexIntersection::new(
            Vec3::zero(),
            vec![Component::sphere(Vec3::zero(), 1.0), Component::layer(Vec3::zero(), Vec3(0.0, 1.0, 0.0), 0.5)],
        );
        assert_eq!(shape.class_name(), "ConvexIntersection_Sphere_Layer");
        let code = shape.intersect_code();
        assert!(code.contains("SphereComponent_interval(rel - (float3)(fp[4], fp[5], fp[6]), ray, fp + 7"));
        assert!(code.contains("LayerComponent_interval(rel - (float3)(fp[8], fp[9], fp[10]), ray, fp + 11"));
        assert!(code.contains("end_sub = 1u + es"));
        assert_eq!(shape.component_procedures().len(), 4);
    }
}
