//! Typed views over the buffers of one dispatch.

use clray::{
    backend::{Buffer, BufferData},
    error::BackendError,
    geometry::Vec3,
    materials::MaterialView,
    renderer::kernels::BundleSlot,
    scene::OFFSETS_PER_OBJECT,
    shapes::ParamReader,
};

fn mismatch(buffer: Buffer, data: &BufferData) -> BackendError {
    BackendError::TypeMismatch { buffer: buffer.id, expected: buffer.dtype, found: data.dtype() }
}

fn per_pixel<T>(data: &mut [T], work_size: usize) -> Result<&mut [T], BackendError> {
    if data.len() < work_size {
        return Err(BackendError::LengthMismatch(data.len(), work_size));
    }
    Ok(&mut data[..work_size])
}

fn shared<T>(data: &mut [T]) -> &[T] {
    data
}

macro_rules! typed_slot {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name<'a>(buffer: Buffer, data: &'a mut BufferData) -> Result<&'a mut [$ty], BackendError> {
            match data {
                BufferData::$variant(v) => Ok(v.as_mut_slice()),
                other => Err(mismatch(buffer, other)),
            }
        }
    };
}

typed_slot!(f32_slot, F32, f32);
typed_slot!(u32_slot, U32, u32);
typed_slot!(i32_slot, I32, i32);
typed_slot!(vec3_slot, Vec3, Vec3);

/// Read-only scene tables
#[derive(Clone, Copy)]
pub struct SceneData<'a> {
    pub params_f32: &'a [f32],
    pub params_i32: &'a [i32],
    pub param_offsets: &'a [i32],
    pub aux_vec: &'a [Vec3],
    pub aux_int: &'a [i32],
    pub object_flags: &'a [u32],
    pub material_colors: &'a [Vec3],
    pub material_scalars: &'a [f32],
}

impl<'a> SceneData<'a> {
    /// Parameter reader positioned at object `id`'s slices
    pub fn params(&self, id: u32) -> ParamReader<'a> {
        let base = id as usize * OFFSETS_PER_OBJECT;
        let offset = |k: usize| self.param_offsets.get(base + k).map_or(0, |&o| o.max(0) as usize);
        ParamReader::new(
            self.params_f32.get(offset(0)..).unwrap_or(&[]),
            self.params_i32.get(offset(1)..).unwrap_or(&[]),
            self.aux_vec.get(offset(2)..).unwrap_or(&[]),
            self.aux_int.get(offset(3)..).unwrap_or(&[]),
        )
    }

    pub fn flags(&self, id: u32) -> u32 {
        self.object_flags.get(id as usize).copied().unwrap_or(0)
    }

    pub fn materials(&self) -> MaterialView<'a> {
        MaterialView { rows: self.object_flags.len(), colors: self.material_colors, scalars: self.material_scalars }
    }
}

/// Every bundle slot of a dispatch, per-pixel slots trimmed to the work size
pub struct RayState<'a> {
    pub pos: &'a mut [Vec3],
    pub ray: &'a mut [Vec3],
    pub normal: &'a mut [Vec3],
    pub isec_dist: &'a mut [f32],
    pub whichobject: &'a mut [u32],
    pub which_subobject: &'a mut [u32],
    pub last_whichobject: &'a mut [u32],
    pub last_which_subobject: &'a mut [u32],
    pub inside: &'a mut [u32],
    pub throughput: &'a mut [Vec3],
    pub prob: &'a mut [f32],
    pub shadow_mask: &'a mut [f32],
    pub suppress_emission: &'a mut [u32],
    pub handled: &'a mut [u32],
    pub rng_state: &'a mut [u32],
    pub image: &'a mut [Vec3],
    pub camera_dirs: &'a mut [Vec3],
    pub scene: SceneData<'a>,
}

impl<'a> RayState<'a> {
    /// `buffers` and `data` follow `BundleSlot::ALL` order
    pub fn bind(buffers: &[Buffer], data: &'a mut [BufferData], work_size: usize) -> Result<Self, BackendError> {
        if buffers.len() != BundleSlot::ALL.len() || data.len() != buffers.len() {
            return Err(BackendError::LengthMismatch(buffers.len(), BundleSlot::ALL.len()));
        }
        for (slot, buffer) in BundleSlot::ALL.iter().zip(buffers) {
            if buffer.dtype != slot.dtype() {
                return Err(BackendError::TypeMismatch { buffer: buffer.id, expected: slot.dtype(), found: buffer.dtype });
            }
        }

        let mut slots = buffers.iter().copied().zip(data.iter_mut());
        let mut next = || slots.next().ok_or(BackendError::LengthMismatch(0, BundleSlot::ALL.len()));

        macro_rules! pixel {
            ($typed:ident) => {{
                let (buffer, data) = next()?;
                per_pixel($typed(buffer, data)?, work_size)?
            }};
        }
        macro_rules! table {
            ($typed:ident) => {{
                let (buffer, data) = next()?;
                shared($typed(buffer, data)?)
            }};
        }

        // field order is BundleSlot order
        Ok(RayState {
            pos: pixel!(vec3_slot),
            ray: pixel!(vec3_slot),
            normal: pixel!(vec3_slot),
            isec_dist: pixel!(f32_slot),
            whichobject: pixel!(u32_slot),
            which_subobject: pixel!(u32_slot),
            last_whichobject: pixel!(u32_slot),
            last_which_subobject: pixel!(u32_slot),
            inside: pixel!(u32_slot),
            throughput: pixel!(vec3_slot),
            prob: pixel!(f32_slot),
            shadow_mask: pixel!(f32_slot),
            suppress_emission: pixel!(u32_slot),
            handled: pixel!(u32_slot),
            rng_state: pixel!(u32_slot),
            image: pixel!(vec3_slot),
            camera_dirs: pixel!(vec3_slot),
            scene: SceneData {
                params_f32: table!(f32_slot),
                params_i32: table!(i32_slot),
                param_offsets: table!(i32_slot),
                aux_vec: table!(vec3_slot),
                aux_int: table!(i32_slot),
                object_flags: table!(u32_slot),
                material_colors: table!(vec3_slot),
                material_scalars: table!(f32_slot),
            },
        })
    }
}
