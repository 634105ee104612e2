//! Shape descriptions and their procedure templates.
//!
//! Each shape module owns both halves of its template: the OpenCL C code the
//! compiler emits, and the host routine a CPU back-end runs. Both read their
//! runtime parameters in the order given by `formal_params`.

pub mod component;
pub mod convex;
pub mod half_space;
pub mod implicit;
pub mod julia;
pub mod mesh;
pub mod sphere;

use std::sync::Arc;

use crate::{
    compiler::procedure::{CompiledProcedure, ParamType, ProcedureKind, Template},
    geometry::Vec3,
};

pub use component::{Component, ComponentGeometry, ComponentKind};
pub use convex::ConvexIntersection;
pub use half_space::HalfSpace;
pub use implicit::{DistanceField, ImplicitSurface};
pub use julia::JuliaSet;
pub use mesh::TriangleMesh;
pub use sphere::Sphere;

/// One ray against one shape
#[derive(Clone, Copy, Debug)]
pub struct RayQuery {
    pub origin: Vec3,
    pub ray: Vec3,
    /// current best distance; only hits strictly closer are reported
    pub old_isec_dist: f32,
    /// the ray travels inside this shape
    pub inside: bool,
    /// the ray starts on this shape's surface
    pub origin_self: bool,
    /// subobject the ray left from, meaningful with `origin_self`
    pub last_subobject: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub distance: f32,
    pub subobject: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vec3(Vec3),
    Int(i32),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Vec3(_) => ParamType::Vec3,
            ParamValue::Int(_) => ParamType::Int,
        }
    }
}

/// Large per-shape data, stored in the scene's shared auxiliary buffers
#[derive(Clone, Debug, Default)]
pub struct AuxiliaryData {
    pub vectors: Vec<Vec3>,
    pub ints: Vec<i32>,
}

/// Sequential view over one object's slice of the parameter buffers
pub struct ParamReader<'a> {
    floats: &'a [f32],
    ints: &'a [i32],
    pub aux_vec: &'a [Vec3],
    pub aux_int: &'a [i32],
    f: usize,
    i: usize,
}

impl<'a> ParamReader<'a> {
    pub fn new(floats: &'a [f32], ints: &'a [i32], aux_vec: &'a [Vec3], aux_int: &'a [i32]) -> Self {
        ParamReader { floats, ints, aux_vec, aux_int, f: 0, i: 0 }
    }

    pub fn float(&mut self) -> f32 {
        self.f += 1;
        self.floats[self.f - 1]
    }

    pub fn vec3(&mut self) -> Vec3 {
        Vec3(self.float(), self.float(), self.float())
    }

    pub fn int(&mut self) -> i32 {
        self.i += 1;
        self.ints[self.i - 1]
    }

    /// Reader over the float parameters from the current position on
    pub fn rest(&self) -> ParamReader<'a> {
        ParamReader {
            floats: &self.floats[self.f..],
            ints: &self.ints[self.i..],
            aux_vec: self.aux_vec,
            aux_int: self.aux_int,
            f: 0,
            i: 0,
        }
    }

    pub fn skip_floats(&mut self, n: usize) {
        self.f += n;
    }
}

/// Flattens parameter values the way `ParamReader` reads them back
pub fn flatten_params(values: &[ParamValue], floats: &mut Vec<f32>, ints: &mut Vec<i32>) {
    for value in values {
        match *value {
            ParamValue::Float(v) => floats.push(v),
            ParamValue::Vec3(v) => floats.extend([v.0, v.1, v.2]),
            ParamValue::Int(v) => ints.push(v),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Shape {
    Sphere(Sphere),
    HalfSpace(HalfSpace),
    Convex(ConvexIntersection),
    TriangleMesh(TriangleMesh),
    Implicit(ImplicitSurface),
    DistanceField(DistanceField),
    JuliaSet(JuliaSet),
}

impl Shape {
    pub fn sphere(center: Vec3, radius: f32) -> Shape {
        Shape::Sphere(Sphere { center, radius })
    }

    pub fn half_space(normal: Vec3, offset: f32) -> Shape {
        Shape::HalfSpace(HalfSpace::new(normal, offset))
    }

    pub fn cylinder(bottom_center: Vec3, axis: Vec3, height: f32, radius: f32) -> Shape {
        Shape::Convex(ConvexIntersection::cylinder(bottom_center, axis, height, radius))
    }

    pub fn cone(tip: Vec3, axis: Vec3, height: f32, radius: f32) -> Shape {
        Shape::Convex(ConvexIntersection::cone(tip, axis, height, radius))
    }

    /// Shared class name; per-instance shapes append a content hash to it
    pub fn class_name(&self) -> String {
        match self {
            Shape::Sphere(_) => "Sphere".into(),
            Shape::HalfSpace(_) => "HalfSpace".into(),
            Shape::Convex(c) => c.class_name(),
            Shape::TriangleMesh(m) => m.class_name().into(),
            Shape::Implicit(_) => "ImplicitSurface".into(),
            Shape::DistanceField(_) => "DistanceField".into(),
            Shape::JuliaSet(_) => "QuaternionJuliaSet".into(),
        }
    }

    pub fn template(&self) -> Template {
        match self {
            Shape::Sphere(_) => Template::Sphere,
            Shape::HalfSpace(_) => Template::HalfSpace,
            Shape::Convex(c) => Template::Convex(Arc::from(c.component_kinds())),
            Shape::TriangleMesh(m) => m.template(),
            Shape::Implicit(s) => Template::Implicit(s.program()),
            Shape::DistanceField(s) => Template::DistanceField(s.program()),
            Shape::JuliaSet(s) => Template::JuliaSet(s.program()),
        }
    }

    pub fn intersect_procedure(&self) -> CompiledProcedure {
        let (name, params, code) = match self {
            Shape::Sphere(_) => (
                "Sphere_intersect".to_string(),
                Sphere::formal_params(),
                sphere::INTERSECT_CODE.to_string(),
            ),
            Shape::HalfSpace(_) => (
                "HalfSpace_intersect".to_string(),
                HalfSpace::formal_params(),
                half_space::INTERSECT_CODE.to_string(),
            ),
            Shape::Convex(c) => (
                format!("{}_intersect", c.class_name()),
                ConvexIntersection::formal_params(),
                c.intersect_code(),
            ),
            Shape::TriangleMesh(m) => (
                format!("{}_intersect", m.class_name()),
                m.formal_params(),
                m.intersect_code().to_string(),
            ),
            Shape::Implicit(s) => {
                let code = s.intersect_code();
                (implicit::unique_name("ImplicitSurface_intersect", &code), vec![], code)
            }
            Shape::DistanceField(s) => {
                let code = s.intersect_code();
                (implicit::unique_name("DistanceField_intersect", &code), vec![], code)
            }
            Shape::JuliaSet(s) => {
                let code = s.intersect_code();
                (implicit::unique_name("QuaternionJuliaSet_intersect", &code), vec![], code)
            }
        };
        CompiledProcedure::new(name, ProcedureKind::Intersect, params, &code, self.template())
    }

    pub fn normal_procedure(&self) -> CompiledProcedure {
        let (name, params, code) = match self {
            Shape::Sphere(_) => (
                "Sphere_normal".to_string(),
                Sphere::formal_params(),
                sphere::NORMAL_CODE.to_string(),
            ),
            Shape::HalfSpace(_) => (
                "HalfSpace_normal".to_string(),
                HalfSpace::formal_params(),
                half_space::NORMAL_CODE.to_string(),
            ),
            Shape::Convex(c) => (
                format!("{}_normal", c.class_name()),
                ConvexIntersection::formal_params(),
                c.normal_code(),
            ),
            Shape::TriangleMesh(_) => (
                "TriangleMesh_normal".to_string(),
                vec![],
                mesh::NORMAL_CODE.to_string(),
            ),
            Shape::Implicit(s) => {
                let code = s.normal_code();
                (implicit::unique_name("ImplicitSurface_normal", &code), vec![], code)
            }
            Shape::DistanceField(s) => {
                let code = s.normal_code();
                (implicit::unique_name("DistanceField_normal", &code), vec![], code)
            }
            Shape::JuliaSet(s) => {
                let code = s.normal_code();
                (implicit::unique_name("QuaternionJuliaSet_normal", &code), vec![], code)
            }
        };
        CompiledProcedure::new(name, ProcedureKind::Normal, params, &code, self.template())
    }

    /// Procedures the intersect/normal pair calls into
    pub fn component_procedures(&self) -> Vec<CompiledProcedure> {
        match self {
            Shape::Convex(c) => c.component_procedures(),
            _ => vec![],
        }
    }

    /// Runtime arguments, in `formal_params` order
    pub fn parameter_values(&self) -> Vec<ParamValue> {
        match self {
            Shape::Sphere(s) => s.parameter_values(),
            Shape::HalfSpace(h) => h.parameter_values(),
            Shape::Convex(c) => c.parameter_values(),
            Shape::TriangleMesh(m) => m.parameter_values(),
            Shape::Implicit(_) | Shape::DistanceField(_) | Shape::JuliaSet(_) => vec![],
        }
    }

    pub fn subobject_count(&self) -> u32 {
        match self {
            Shape::Convex(c) => c.subobject_count(),
            Shape::TriangleMesh(m) => m.mesh.tris.len() as u32,
            _ => 1,
        }
    }

    pub fn is_convex(&self) -> bool {
        matches!(self, Shape::Sphere(_) | Shape::HalfSpace(_) | Shape::Convex(_))
    }

    pub fn auto_flip_normal(&self) -> bool {
        match self {
            Shape::TriangleMesh(m) => m.auto_flip_normal,
            _ => false,
        }
    }

    pub fn auxiliary_buffers(&self) -> Option<AuxiliaryData> {
        match self {
            Shape::TriangleMesh(m) => Some(m.auxiliary_buffers()),
            _ => None,
        }
    }

    /// Surface area, for shapes that can act as sampled lights
    pub fn surface_area(&self) -> Option<f32> {
        match self {
            Shape::Sphere(s) => Some(s.surface_area()),
            _ => None,
        }
    }

    /// Maps two uniform numbers to a surface point and its outward normal
    pub fn sample_surface(&self, u1: f32, u2: f32) -> Option<(Vec3, Vec3)> {
        match self {
            Shape::Sphere(s) => Some(s.sample_surface(u1, u2)),
            _ => None,
        }
    }
}
