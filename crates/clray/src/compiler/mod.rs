//! Shape compiler: turns shapes into named OpenCL procedures.
//!
//! Every shape yields an intersect and a normal procedure, plus any component
//! procedures they call. Identical procedures are emitted once; two different
//! bodies under one name are rejected.

pub mod emit;
pub mod expr;
pub mod interval;
pub mod parse;
pub mod procedure;

use tracing::{debug, info};

use crate::{error::CompileError, shapes::Shape};

pub use procedure::{CompiledProcedure, ProcedureKind, ProcedureTable, Template};

/// Procedure names a shape was compiled to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledShape {
    pub intersect: String,
    pub normal: String,
    pub components: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ShapeCompiler {
    table: ProcedureTable,
    shapes: usize,
}

impl ShapeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, shape: &Shape) -> Result<CompiledShape, CompileError> {
        let mut components = Vec::new();
        for procedure in shape.component_procedures() {
            components.push(procedure.name.clone());
            self.table.insert(procedure)?;
        }

        let intersect = shape.intersect_procedure();
        let normal = shape.normal_procedure();
        let compiled = CompiledShape { intersect: intersect.name.clone(), normal: normal.name.clone(), components };

        if self.table.insert(intersect)? {
            debug!("compiled {}", compiled.intersect);
        }
        if self.table.insert(normal)? {
            debug!("compiled {}", compiled.normal);
        }
        self.shapes += 1;
        Ok(compiled)
    }

    pub fn table(&self) -> &ProcedureTable {
        &self.table
    }

    pub fn finish(self) -> ProcedureTable {
        info!("compiled {} shapes into {} procedures", self.shapes, self.table.len());
        self.table
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        geometry::Vec3,
        shapes::{Component, ConvexIntersection, ImplicitSurface, JuliaSet},
    };

    use super::*;

    #[test]
    fn identical_classes_share_procedures() {
        let mut compiler = ShapeCompiler::new();
        let a = compiler.compile(&Shape::sphere(Vec3::zero(), 1.0)).unwrap();
        let b = compiler.compile(&Shape::sphere(Vec3(2.0, 0.0, 0.0), 0.5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.intersect, "Sphere_intersect");

        let c1 = compiler.compile(&Shape::cylinder(Vec3::zero(), Vec3(0.0, 0.0, 1.0), 1.0, 1.0)).unwrap();
        let c2 = compiler.compile(&Shape::cylinder(Vec3(1.0, 1.0, 1.0), Vec3(1.0, 0.0, 0.0), 3.0, 0.2)).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(c1.normal, "Cylinder_normal");
        assert_eq!(c1.components.len(), 4);

        // sphere pair, cylinder pair, layer and cylinder component pairs
        assert_eq!(compiler.finish().len(), 8);
    }

    #[test]
    fn per_instance_code_gets_hashed_names() {
        let mut compiler = ShapeCompiler::new();
        let unit = ImplicitSurface::parse("x^2 + y^2 + z^2 - 1", Vec3::zero(), 1.0, 1.5).unwrap();
        let moved = ImplicitSurface::parse("x^2 + y^2 + z^2 - 1", Vec3(0.0, 3.0, 0.0), 1.0, 1.5).unwrap();
        let a = compiler.compile(&Shape::Implicit(unit.clone())).unwrap();
        let b = compiler.compile(&Shape::Implicit(unit)).unwrap();
        let c = compiler.compile(&Shape::Implicit(moved)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.intersect, c.intersect);
        assert!(a.intersect.starts_with("ImplicitSurface_intersect_"));

        let julia = JuliaSet::new([-0.2, -0.4, -0.4, -0.4], 4, Vec3::zero(), 1.0);
        let j1 = compiler.compile(&Shape::JuliaSet(julia.clone())).unwrap();
        let j2 = compiler.compile(&Shape::JuliaSet(julia)).unwrap();
        assert_eq!(j1, j2);
        assert!(j1.normal.starts_with("QuaternionJuliaSet_normal_"));
    }

    #[test]
    fn conflicting_bodies_are_rejected() {
        let mut compiler = ShapeCompiler::new();
        let mut fake = ConvexIntersection::new(Vec3::zero(), vec![Component::sphere(Vec3::zero(), 1.0)]);
        fake.name = Some("Cylinder".into());
        compiler.compile(&Shape::cylinder(Vec3::zero(), Vec3(0.0, 0.0, 1.0), 1.0, 1.0)).unwrap();
        assert!(matches!(
            compiler.compile(&Shape::Convex(fake)),
            Err(CompileError::NameCollision { name }) if name == "Cylinder_intersect"
        ));
    }
}
