//! Kernel registry shared by every back-end.
//!
//! A compiled scene names each kernel it will dispatch and says what the
//! kernel does with a `KernelDescriptor`. All ray-state kernels take the same
//! buffer bundle, in `BundleSlot` order, followed by their own scalars.

use std::collections::BTreeMap;

use crate::{
    backend::{Buffer, DType, Scalar},
    compiler::ProcedureTable,
    error::BackendError,
    geometry::{Matrix3x3, Vec3},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Volumetric,
    Emission,
    Reflection,
    Refraction,
    Diffuse,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 5] = [
        ShaderStage::Volumetric,
        ShaderStage::Emission,
        ShaderStage::Reflection,
        ShaderStage::Refraction,
        ShaderStage::Diffuse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShaderStage::Volumetric => "volumetric",
            ShaderStage::Emission => "emission",
            ShaderStage::Reflection => "reflection",
            ShaderStage::Refraction => "refraction",
            ShaderStage::Diffuse => "diffuse",
        }
    }

    pub fn kernel_name(&self) -> String {
        format!("shader_{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelDescriptor {
    /// nearest-hit update against one object
    Trace { procedure: String },
    /// normals for every ray whose hit lies in an object range
    Normal { procedure: String },
    /// occlusion of the light segment by one object
    Shadow { procedure: String },
    Advance,
    CameraTransform,
    DrawUniform,
    ScaleColor,
    Shader(ShaderStage),
}

impl KernelDescriptor {
    /// Checks the count and types of a dispatch's scalar arguments
    pub fn check_scalars(&self, kernel: &str, scalars: &[Scalar]) -> Result<(), BackendError> {
        let mut args = ScalarArgs::new(kernel, scalars);
        match self {
            KernelDescriptor::Trace { .. } => {
                args.u32()?;
            }
            KernelDescriptor::Normal { .. } => {
                GroupRange::from_scalars(&mut args)?;
            }
            KernelDescriptor::Shadow { .. } => {
                ShadowArgs::from_scalars(&mut args)?;
            }
            KernelDescriptor::CameraTransform => {
                CameraTransformArgs::from_scalars(&mut args)?;
            }
            KernelDescriptor::ScaleColor => {
                args.f32()?;
            }
            KernelDescriptor::Shader(_) => {
                ShaderArgs::from_scalars(&mut args)?;
            }
            KernelDescriptor::Advance | KernelDescriptor::DrawUniform => {}
        }
        args.finish()
    }
}

pub const ADVANCE_RAYS: &str = "advance_rays";
pub const CAMERA_TRANSFORM: &str = "camera_transform";
pub const DRAW_UNIFORM: &str = "draw_uniform";
pub const SCALE_COLOR: &str = "scale_color";

pub fn trace_kernel_name(procedure: &str) -> String {
    format!("trace_{procedure}")
}

pub fn normal_kernel_name(procedure: &str) -> String {
    format!("normal_{procedure}")
}

pub fn shadow_kernel_name(procedure: &str) -> String {
    format!("shadow_{procedure}")
}

macro_rules! bundle_slots {
    ($($slot:ident => $name:literal, $dtype:ident, $per_pixel:literal;)*) => {
        /// Canonical buffer argument order of ray-state kernels
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum BundleSlot {
            $($slot,)*
        }

        impl BundleSlot {
            pub const ALL: &'static [BundleSlot] = &[$(BundleSlot::$slot,)*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(BundleSlot::$slot => $name,)*
                }
            }

            pub fn dtype(&self) -> DType {
                match self {
                    $(BundleSlot::$slot => DType::$dtype,)*
                }
            }

            /// One element per pixel; otherwise the buffer is scene data
            pub fn is_per_pixel(&self) -> bool {
                match self {
                    $(BundleSlot::$slot => $per_pixel,)*
                }
            }
        }
    };
}

bundle_slots! {
    Pos => "pos", Vec3, true;
    Ray => "ray", Vec3, true;
    Normal => "normal", Vec3, true;
    IsecDist => "isec_dist", F32, true;
    WhichObject => "whichobject", U32, true;
    WhichSubobject => "which_subobject", U32, true;
    LastWhichObject => "last_whichobject", U32, true;
    LastWhichSubobject => "last_which_subobject", U32, true;
    Inside => "inside", U32, true;
    Throughput => "throughput", Vec3, true;
    Prob => "prob", F32, true;
    ShadowMask => "shadow_mask", F32, true;
    SuppressEmission => "suppress_emission", U32, true;
    Handled => "handled", U32, true;
    RngState => "rng_state", U32, true;
    Image => "image", Vec3, true;
    CameraDirs => "camera_dirs", Vec3, true;
    ParamsF32 => "params_f32", F32, false;
    ParamsI32 => "params_i32", I32, false;
    ParamOffsets => "param_offsets", I32, false;
    AuxVec => "aux_vec", Vec3, false;
    AuxInt => "aux_int", I32, false;
    ObjectFlags => "object_flags", U32, false;
    MaterialColors => "material_colors", Vec3, false;
    MaterialScalars => "material_scalars", F32, false;
}

impl BundleSlot {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Buffers bound to every bundle slot
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    buffers: Vec<Buffer>,
}

impl Bundle {
    /// `buffers` must be given in `BundleSlot::ALL` order
    pub fn new(buffers: Vec<Buffer>) -> Result<Self, BackendError> {
        if buffers.len() != BundleSlot::ALL.len() {
            return Err(BackendError::LengthMismatch(buffers.len(), BundleSlot::ALL.len()));
        }
        for (slot, buffer) in BundleSlot::ALL.iter().zip(&buffers) {
            if buffer.dtype != slot.dtype() {
                return Err(BackendError::TypeMismatch {
                    buffer: buffer.id,
                    expected: slot.dtype(),
                    found: buffer.dtype,
                });
            }
        }
        Ok(Bundle { buffers })
    }

    pub fn get(&self, slot: BundleSlot) -> Buffer {
        self.buffers[slot.index()]
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }
}

/// Everything a back-end needs to run a compiled scene
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub procedures: ProcedureTable,
    pub kernels: BTreeMap<String, KernelDescriptor>,
    /// rows of the material table: scene objects plus the default medium
    pub material_rows: u32,
}

impl Program {
    /// A program holding the static kernels and no scene procedures yet
    pub fn new(procedures: ProcedureTable) -> Self {
        let mut kernels = BTreeMap::new();
        kernels.insert(ADVANCE_RAYS.to_string(), KernelDescriptor::Advance);
        kernels.insert(CAMERA_TRANSFORM.to_string(), KernelDescriptor::CameraTransform);
        kernels.insert(DRAW_UNIFORM.to_string(), KernelDescriptor::DrawUniform);
        kernels.insert(SCALE_COLOR.to_string(), KernelDescriptor::ScaleColor);
        for stage in ShaderStage::ALL {
            kernels.insert(stage.kernel_name(), KernelDescriptor::Shader(stage));
        }
        Program { procedures, kernels, material_rows: 1 }
    }

    /// Registers trace and shadow kernels for an intersect procedure
    pub fn register_intersect(&mut self, procedure: &str) -> (String, String) {
        let trace = trace_kernel_name(procedure);
        let shadow = shadow_kernel_name(procedure);
        self.kernels.insert(trace.clone(), KernelDescriptor::Trace { procedure: procedure.to_string() });
        self.kernels.insert(shadow.clone(), KernelDescriptor::Shadow { procedure: procedure.to_string() });
        (trace, shadow)
    }

    pub fn register_normal(&mut self, procedure: &str) -> String {
        let name = normal_kernel_name(procedure);
        self.kernels.insert(name.clone(), KernelDescriptor::Normal { procedure: procedure.to_string() });
        name
    }

    pub fn kernel(&self, name: &str) -> Result<&KernelDescriptor, BackendError> {
        self.kernels.get(name).ok_or_else(|| BackendError::UnknownProcedure(name.to_string()))
    }
}

/// Sequential reader over a dispatch's scalar arguments
pub struct ScalarArgs<'a> {
    kernel: &'a str,
    scalars: &'a [Scalar],
    next: usize,
}

impl<'a> ScalarArgs<'a> {
    pub fn new(kernel: &'a str, scalars: &'a [Scalar]) -> Self {
        ScalarArgs { kernel, scalars, next: 0 }
    }

    fn take(&mut self) -> Result<Scalar, BackendError> {
        let value = *self.scalars.get(self.next).ok_or_else(|| BackendError::ArgumentCount {
            procedure: self.kernel.to_string(),
            expected: self.next + 1,
            found: self.scalars.len(),
        })?;
        self.next += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: DType, found: Scalar) -> BackendError {
        BackendError::TypeMismatch { buffer: self.next as u32 - 1, expected, found: found.dtype() }
    }

    pub fn u32(&mut self) -> Result<u32, BackendError> {
        match self.take()? {
            Scalar::U32(v) => Ok(v),
            other => Err(self.mismatch(DType::U32, other)),
        }
    }

    pub fn f32(&mut self) -> Result<f32, BackendError> {
        match self.take()? {
            Scalar::F32(v) => Ok(v),
            other => Err(self.mismatch(DType::F32, other)),
        }
    }

    pub fn vec3(&mut self) -> Result<Vec3, BackendError> {
        match self.take()? {
            Scalar::Vec3(v) => Ok(v),
            other => Err(self.mismatch(DType::Vec3, other)),
        }
    }

    /// Fails when arguments are left over
    pub fn finish(self) -> Result<(), BackendError> {
        if self.next != self.scalars.len() {
            return Err(BackendError::ArgumentCount {
                procedure: self.kernel.to_string(),
                expected: self.next,
                found: self.scalars.len(),
            });
        }
        Ok(())
    }
}

/// Scalars of `normal_<proc>`: the contiguous object id range of one group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupRange {
    pub first: u32,
    pub count: u32,
}

impl GroupRange {
    pub fn to_scalars(self) -> Vec<Scalar> {
        vec![Scalar::U32(self.first), Scalar::U32(self.count)]
    }

    pub fn from_scalars(args: &mut ScalarArgs) -> Result<Self, BackendError> {
        Ok(GroupRange { first: args.u32()?, count: args.u32()? })
    }

    pub fn contains(&self, id: u32) -> bool {
        id >= self.first && id < self.first + self.count
    }
}

/// Scalars of `shadow_<proc>`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowArgs {
    pub object_id: u32,
    pub light_id: u32,
    pub light_point: Vec3,
}

impl ShadowArgs {
    pub fn to_scalars(self) -> Vec<Scalar> {
        vec![Scalar::U32(self.object_id), Scalar::U32(self.light_id), Scalar::Vec3(self.light_point)]
    }

    pub fn from_scalars(args: &mut ScalarArgs) -> Result<Self, BackendError> {
        Ok(ShadowArgs { object_id: args.u32()?, light_id: args.u32()?, light_point: args.vec3()? })
    }
}

/// Per-sample camera state consumed by `camera_transform`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTransformArgs {
    /// jitter rotation applied to the base directions
    pub rotation: Matrix3x3,
    pub origin: Vec3,
    /// lens offset from the pinhole position
    pub dof_offset: Vec3,
    /// 0 disables refocusing
    pub sharp_distance: f32,
}

impl CameraTransformArgs {
    pub fn to_scalars(self) -> Vec<Scalar> {
        vec![
            Scalar::Vec3(self.rotation.row(0)),
            Scalar::Vec3(self.rotation.row(1)),
            Scalar::Vec3(self.rotation.row(2)),
            Scalar::Vec3(self.origin),
            Scalar::Vec3(self.dof_offset),
            Scalar::F32(self.sharp_distance),
        ]
    }

    pub fn from_scalars(args: &mut ScalarArgs) -> Result<Self, BackendError> {
        let rotation = Matrix3x3::from_rows(args.vec3()?, args.vec3()?, args.vec3()?);
        Ok(CameraTransformArgs {
            rotation,
            origin: args.vec3()?,
            dof_offset: args.vec3()?,
            sharp_distance: args.f32()?,
        })
    }

    /// Direction of the ray through a base direction
    pub fn apply(&self, base: Vec3) -> Vec3 {
        let dir = self.rotation.apply_vector(base);
        if self.sharp_distance > 0.0 {
            Vec3::normalized(dir * self.sharp_distance - self.dof_offset)
        } else {
            dir
        }
    }
}

/// Scalars shared by the `shader_*` stages of one bounce
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderArgs {
    pub bounce: u32,
    pub root_id: u32,
    /// sampled light for next-event estimation, 0 when none
    pub light_id: u32,
    pub light_area: f32,
    /// number of lights the sample was drawn from
    pub light_count: f32,
    pub light_point: Vec3,
    pub light_normal: Vec3,
    /// first-bounce point in [0, 1)^2, used when `quasirandom` is set
    pub quasi_point: (f32, f32),
    pub quasirandom: bool,
    pub rotation_seed: u32,
}

impl ShaderArgs {
    pub fn to_scalars(self) -> Vec<Scalar> {
        vec![
            Scalar::U32(self.bounce),
            Scalar::U32(self.root_id),
            Scalar::U32(self.light_id),
            Scalar::F32(self.light_area),
            Scalar::F32(self.light_count),
            Scalar::Vec3(self.light_point),
            Scalar::Vec3(self.light_normal),
            Scalar::F32(self.quasi_point.0),
            Scalar::F32(self.quasi_point.1),
            Scalar::U32(self.quasirandom as u32),
            Scalar::U32(self.rotation_seed),
        ]
    }

    pub fn from_scalars(args: &mut ScalarArgs) -> Result<Self, BackendError> {
        Ok(ShaderArgs {
            bounce: args.u32()?,
            root_id: args.u32()?,
            light_id: args.u32()?,
            light_area: args.f32()?,
            light_count: args.f32()?,
            light_point: args.vec3()?,
            light_normal: args.vec3()?,
            quasi_point: (args.f32()?, args.f32()?),
            quasirandom: args.u32()? != 0,
            rotation_seed: args.u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_kernels_are_registered() {
        let mut program = Program::new(ProcedureTable::default());
        assert_eq!(program.kernel("shader_diffuse").unwrap(), &KernelDescriptor::Shader(ShaderStage::Diffuse));
        assert!(program.kernel("trace_Sphere_intersect").is_err());

        let (trace, shadow) = program.register_intersect("Sphere_intersect");
        assert_eq!(trace, "trace_Sphere_intersect");
        assert_eq!(
            program.kernel(&shadow).unwrap(),
            &KernelDescriptor::Shadow { procedure: "Sphere_intersect".into() }
        );
    }

    #[test]
    fn bundle_checks_slot_types() {
        let buffers: Vec<Buffer> = BundleSlot::ALL
            .iter()
            .enumerate()
            .map(|(i, slot)| Buffer { id: i as u32, len: 4, dtype: slot.dtype() })
            .collect();
        let bundle = Bundle::new(buffers.clone()).unwrap();
        assert_eq!(bundle.get(BundleSlot::Image).dtype, DType::Vec3);

        let mut wrong = buffers;
        wrong[BundleSlot::Inside.index()].dtype = DType::F32;
        assert!(matches!(Bundle::new(wrong), Err(BackendError::TypeMismatch { .. })));
    }

    #[test]
    fn shader_args_survive_the_scalar_list() {
        let args = ShaderArgs {
            bounce: 2,
            root_id: 0,
            light_id: 7,
            light_area: 3.0,
            light_count: 1.0,
            light_point: Vec3(1.0, 2.0, 3.0),
            light_normal: Vec3(0.0, 0.0, 1.0),
            quasi_point: (0.25, 0.5),
            quasirandom: true,
            rotation_seed: 99,
        };
        let scalars = args.to_scalars();
        let mut reader = ScalarArgs::new("shader_diffuse", &scalars);
        assert_eq!(ShaderArgs::from_scalars(&mut reader).unwrap(), args);
        reader.finish().unwrap();

        let mut short = ScalarArgs::new("shader_diffuse", &scalars[..3]);
        assert!(matches!(ShaderArgs::from_scalars(&mut short), Err(BackendError::ArgumentCount { .. })));
    }

    #[test]
    fn descriptors_check_their_scalars() {
        let trace = KernelDescriptor::Trace { procedure: "Sphere_intersect".into() };
        trace.check_scalars("trace_Sphere_intersect", &[Scalar::U32(3)]).unwrap();
        assert!(matches!(
            trace.check_scalars("trace_Sphere_intersect", &[Scalar::F32(3.0)]),
            Err(BackendError::TypeMismatch { .. })
        ));
        assert!(matches!(
            KernelDescriptor::Advance.check_scalars(ADVANCE_RAYS, &[Scalar::U32(1)]),
            Err(BackendError::ArgumentCount { .. })
        ));
    }
}
