//! Compute back-end interface.
//!
//! The integrator never touches ray data directly: it allocates device
//! buffers through a `ComputeBackend` and drives the kernels of a compiled
//! `Program` by name. Buffers are opaque handles owned by the back-end.

use crate::{error::BackendError, geometry::Vec3, renderer::kernels::Program};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    U32,
    I32,
    /// three floats, padded to four on devices that need it
    Vec3,
}

/// Handle to a back-end buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub id: u32,
    pub len: usize,
    pub dtype: DType,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BufferData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    Vec3(Vec<Vec3>),
}

impl BufferData {
    pub fn zeroed(len: usize, dtype: DType) -> Self {
        match dtype {
            DType::F32 => BufferData::F32(vec![0.0; len]),
            DType::U32 => BufferData::U32(vec![0; len]),
            DType::I32 => BufferData::I32(vec![0; len]),
            DType::Vec3 => BufferData::Vec3(vec![Vec3::zero(); len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BufferData::F32(v) => v.len(),
            BufferData::U32(v) => v.len(),
            BufferData::I32(v) => v.len(),
            BufferData::Vec3(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            BufferData::F32(_) => DType::F32,
            BufferData::U32(_) => DType::U32,
            BufferData::I32(_) => DType::I32,
            BufferData::Vec3(_) => DType::Vec3,
        }
    }

    /// Overwrites every element; the value must match the buffer type
    pub fn fill(&mut self, value: Scalar) -> Result<(), DType> {
        match (self, value) {
            (BufferData::F32(v), Scalar::F32(x)) => v.fill(x),
            (BufferData::U32(v), Scalar::U32(x)) => v.fill(x),
            (BufferData::I32(v), Scalar::I32(x)) => v.fill(x),
            (BufferData::Vec3(v), Scalar::Vec3(x)) => v.fill(x),
            (_, value) => return Err(value.dtype()),
        }
        Ok(())
    }

    pub fn as_vec3(&self) -> Option<&[Vec3]> {
        match self {
            BufferData::Vec3(v) => Some(v),
            _ => None,
        }
    }
}

/// Kernel argument passed by value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    F32(f32),
    U32(u32),
    I32(i32),
    Vec3(Vec3),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::F32(_) => DType::F32,
            Scalar::U32(_) => DType::U32,
            Scalar::I32(_) => DType::I32,
            Scalar::Vec3(_) => DType::Vec3,
        }
    }
}

/// A data-parallel executor for compiled scene programs.
///
/// Work submitted through `copy`, `fill` and `dispatch` runs in submission
/// order; the host only blocks in `synchronize` and `read`.
pub trait ComputeBackend {
    /// Installs the procedures and kernel registry of a compiled scene
    fn build_program(&mut self, program: &Program) -> Result<(), BackendError>;

    fn allocate(&mut self, len: usize, dtype: DType, zero_fill: bool) -> Result<Buffer, BackendError>;

    fn upload_constant(&mut self, data: BufferData) -> Result<Buffer, BackendError>;

    /// Copies all of `src` into `dst`; both must have the same type and length
    fn copy(&mut self, dst: Buffer, src: Buffer) -> Result<(), BackendError>;

    fn fill(&mut self, buffer: Buffer, value: Scalar) -> Result<(), BackendError>;

    /// Runs kernel `name` over `work_size` items
    fn dispatch(&mut self, name: &str, work_size: usize, buffers: &[Buffer], scalars: &[Scalar])
        -> Result<(), BackendError>;

    fn synchronize(&mut self) -> Result<(), BackendError>;

    fn read(&mut self, buffer: Buffer) -> Result<BufferData, BackendError>;
}
