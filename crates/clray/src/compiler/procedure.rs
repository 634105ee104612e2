use std::{collections::BTreeMap, fmt::Write, sync::Arc};

use crate::{
    error::CompileError,
    geometry::Vec3,
    shapes::{
        self,
        component::ComponentKind,
        implicit::{DistanceProgram, ImplicitProgram},
        julia::JuliaProgram,
        Hit, ParamReader, RayQuery,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcedureKind {
    Intersect,
    Normal,
    ComponentInterval,
    ComponentNormal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Vec3,
    Int,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormalParam {
    pub name: &'static str,
    pub ty: ParamType,
}

impl FormalParam {
    pub const fn float(name: &'static str) -> Self {
        FormalParam { name, ty: ParamType::Float }
    }

    pub const fn vec3(name: &'static str) -> Self {
        FormalParam { name, ty: ParamType::Vec3 }
    }

    pub const fn int(name: &'static str) -> Self {
        FormalParam { name, ty: ParamType::Int }
    }
}

/// Host-side meaning of a procedure template.
///
/// The OpenCL body and this descriptor are produced together by the shape
/// that owns the template, so a host back-end running the descriptor and a
/// device running the body compute the same thing from the same parameters.
#[derive(Clone, Debug)]
pub enum Template {
    Sphere,
    HalfSpace,
    Component(ComponentKind),
    Convex(Arc<[ComponentKind]>),
    TriangleMesh,
    OctreeMesh,
    Implicit(Arc<ImplicitProgram>),
    DistanceField(Arc<DistanceProgram>),
    JuliaSet(Arc<JuliaProgram>),
}

impl Template {
    pub fn intersect(&self, params: &mut ParamReader, query: &RayQuery) -> Option<Hit> {
        match self {
            Template::Sphere => shapes::sphere::intersect(params, query),
            Template::HalfSpace => shapes::half_space::intersect(params, query),
            Template::Convex(components) => shapes::convex::intersect(components, params, query),
            Template::TriangleMesh => shapes::mesh::intersect_linear(params, query),
            Template::OctreeMesh => shapes::mesh::intersect_octree(params, query),
            Template::Implicit(program) => program.intersect(query),
            Template::DistanceField(program) => program.intersect(query),
            Template::JuliaSet(program) => program.intersect(query),
            // components are only reached through their composite
            Template::Component(_) => None,
        }
    }

    pub fn normal(&self, params: &mut ParamReader, pos: Vec3, subobject: u32) -> Vec3 {
        match self {
            Template::Sphere => shapes::sphere::normal(params, pos),
            Template::HalfSpace => shapes::half_space::normal(params),
            Template::Convex(components) => shapes::convex::normal(components, params, pos, subobject),
            Template::TriangleMesh | Template::OctreeMesh => shapes::mesh::normal(params, subobject),
            Template::Implicit(program) => program.normal(pos),
            Template::DistanceField(program) => program.normal(pos),
            Template::JuliaSet(program) => program.normal(pos),
            Template::Component(kind) => kind.normal(params, pos, subobject),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompiledProcedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub params: Vec<FormalParam>,
    /// function body, parameter loads included; the dedup/collision key
    pub body: String,
    pub template: Template,
}

impl CompiledProcedure {
    pub fn new(name: String, kind: ProcedureKind, params: Vec<FormalParam>, code: &str, template: Template) -> Self {
        let mut body = param_loads(&params);
        body.push_str(code);
        CompiledProcedure { name, kind, params, body, template }
    }

    pub fn signature(&self) -> String {
        let name = &self.name;
        match self.kind {
            ProcedureKind::Intersect => format!(
                "bool {name}(const float3 origin, const float3 ray, const float old_isec_dist, \
                 const bool inside, const bool origin_self, const uint last_subobject, \
                 __global const float *fp, __global const int *ip, \
                 __global const float3 *aux_vec, __global const int *aux_int, \
                 float *p_isec_dist, uint *p_subobject)"
            ),
            ProcedureKind::Normal => format!(
                "float3 {name}(const float3 pos, const uint subobject, \
                 __global const float *fp, __global const int *ip, \
                 __global const float3 *aux_vec, __global const int *aux_int)"
            ),
            ProcedureKind::ComponentInterval => format!(
                "bool {name}(const float3 rel, const float3 ray, __global const float *fp, \
                 float *p_begin, float *p_end, uint *p_begin_sub, uint *p_end_sub)"
            ),
            ProcedureKind::ComponentNormal => {
                format!("float3 {name}(const float3 rel, const uint subobject, __global const float *fp)")
            }
        }
    }

    /// Full OpenCL C definition
    pub fn definition(&self) -> String {
        format!("{}\n{{\n{}}}\n", self.signature(), self.body)
    }
}

/// Float and vector parameters come from `fp`, ints from `ip`, in declaration order
fn param_loads(params: &[FormalParam]) -> String {
    let mut out = String::new();
    let mut f = 0;
    let mut i = 0;
    for p in params {
        // writing into a String cannot fail
        let _ = match p.ty {
            ParamType::Float => {
                f += 1;
                writeln!(out, "    const float {} = fp[{}];", p.name, f - 1)
            }
            ParamType::Vec3 => {
                f += 3;
                writeln!(out, "    const float3 {} = (float3)(fp[{}], fp[{}], fp[{}]);", p.name, f - 3, f - 2, f - 1)
            }
            ParamType::Int => {
                i += 1;
                writeln!(out, "    const int {} = ip[{}];", p.name, i - 1)
            }
        };
    }
    out
}

/// Name-keyed table of every procedure the scene needs
#[derive(Clone, Debug, Default)]
pub struct ProcedureTable {
    procedures: BTreeMap<String, CompiledProcedure>,
    order: Vec<String>,
}

impl ProcedureTable {
    /// Inserts a procedure. Returns `Ok(false)` when an identical procedure is
    /// already present and fails when the name holds a different body.
    pub fn insert(&mut self, procedure: CompiledProcedure) -> Result<bool, CompileError> {
        if let Some(existing) = self.procedures.get(&procedure.name) {
            if existing.body.trim() != procedure.body.trim() || existing.kind != procedure.kind {
                return Err(CompileError::NameCollision { name: procedure.name });
            }
            return Ok(false);
        }
        self.order.push(procedure.name.clone());
        self.procedures.insert(procedure.name.clone(), procedure);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&CompiledProcedure> {
        self.procedures.get(name)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Procedures in insertion order; components precede the composites using them
    pub fn iter(&self) -> impl Iterator<Item = &CompiledProcedure> {
        self.order.iter().filter_map(|name| self.procedures.get(name))
    }
}
