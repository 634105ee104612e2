//! `ComputeBackend` over an OpenCL device.
//!
//! Vec3 buffers hold four floats per element to match `float3` alignment.
//! Zero-length buffers are allocated with one element since OpenCL rejects
//! empty allocations.

use std::{collections::HashMap, ptr};

use clray::{
    backend::{Buffer, BufferData, ComputeBackend, DType, Scalar},
    error::BackendError,
    geometry::Vec3,
    renderer::kernels::{BundleSlot, Program},
};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{get_all_devices, Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU},
    kernel::{ExecuteKernel, Kernel},
    memory::{Buffer as ClBuffer, CL_MEM_READ_WRITE},
    program::Program as ClProgram,
    types::{cl_float, cl_int, cl_uint, CL_BLOCKING},
};
use tracing::{debug, info};

use crate::source::program_source;

const BUILD_OPTIONS: &str = "-cl-std=CL1.2";

fn device_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Device(err.to_string())
}

enum DeviceBuffer {
    F32(ClBuffer<cl_float>),
    U32(ClBuffer<cl_uint>),
    I32(ClBuffer<cl_int>),
    /// xyz plus padding per element
    Vec3(ClBuffer<cl_float>),
}

struct Allocation {
    buffer: DeviceBuffer,
    len: usize,
    dtype: DType,
}

fn create<T>(context: &Context, count: usize) -> Result<ClBuffer<T>, BackendError> {
    // SAFETY: no host pointer is handed to the driver
    unsafe { ClBuffer::<T>::create(context, CL_MEM_READ_WRITE, count.max(1), ptr::null_mut()) }.map_err(device_error)
}

fn pad(v: &[Vec3]) -> Vec<cl_float> {
    v.iter().flat_map(|p| [p.0, p.1, p.2, 0.0]).collect()
}

/// Source and destination of a copy, borrowed together
fn pair(buffers: &mut [Allocation], dst: Buffer, src: Buffer) -> Result<(&Allocation, &mut Allocation), BackendError> {
    let (d, s) = (dst.id as usize, src.id as usize);
    if d >= buffers.len() {
        return Err(BackendError::InvalidBuffer(dst.id));
    }
    if s >= buffers.len() || s == d {
        return Err(BackendError::InvalidBuffer(src.id));
    }
    if s < d {
        let (left, right) = buffers.split_at_mut(d);
        Ok((&left[s], &mut right[0]))
    } else {
        let (left, right) = buffers.split_at_mut(s);
        Ok((&right[0], &mut left[d]))
    }
}

pub struct OpenClBackend {
    context: Context,
    queue: CommandQueue,
    device_name: String,
    registry: Option<Program>,
    kernels: HashMap<String, Kernel>,
    buffers: Vec<Allocation>,
}

impl OpenClBackend {
    /// Opens the first GPU, or the first device of any kind when there is none
    pub fn new() -> Result<Self, BackendError> {
        let mut ids = get_all_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
        if ids.is_empty() {
            ids = get_all_devices(CL_DEVICE_TYPE_ALL).map_err(device_error)?;
        }
        let id = ids.first().copied().ok_or_else(|| BackendError::Device("no OpenCL device found".into()))?;

        let device = Device::new(id);
        let device_name = device.name().unwrap_or_else(|_| "unknown device".into());
        let context = Context::from_device(&device).map_err(device_error)?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0).map_err(device_error)?;
        info!("using OpenCL device {device_name}");

        Ok(OpenClBackend {
            context,
            queue,
            device_name,
            registry: None,
            kernels: HashMap::new(),
            buffers: Vec::new(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn allocation(&self, buffer: Buffer) -> Result<&Allocation, BackendError> {
        self.buffers.get(buffer.id as usize).ok_or(BackendError::InvalidBuffer(buffer.id))
    }

    fn push(&mut self, buffer: DeviceBuffer, len: usize, dtype: DType) -> Buffer {
        let handle = Buffer { id: self.buffers.len() as u32, len, dtype };
        self.buffers.push(Allocation { buffer, len, dtype });
        handle
    }

    fn write(&mut self, buffer: Buffer, data: &BufferData) -> Result<(), BackendError> {
        if data.is_empty() {
            return Ok(());
        }
        let queue = &self.queue;
        let allocation = self.buffers.get_mut(buffer.id as usize).ok_or(BackendError::InvalidBuffer(buffer.id))?;
        // SAFETY: blocking writes of host slices no larger than the allocation
        let result = unsafe {
            match (&mut allocation.buffer, data) {
                (DeviceBuffer::F32(b), BufferData::F32(v)) => queue.enqueue_write_buffer(b, CL_BLOCKING, 0, v, &[]),
                (DeviceBuffer::U32(b), BufferData::U32(v)) => queue.enqueue_write_buffer(b, CL_BLOCKING, 0, v, &[]),
                (DeviceBuffer::I32(b), BufferData::I32(v)) => queue.enqueue_write_buffer(b, CL_BLOCKING, 0, v, &[]),
                (DeviceBuffer::Vec3(b), BufferData::Vec3(v)) => {
                    queue.enqueue_write_buffer(b, CL_BLOCKING, 0, &pad(v), &[])
                }
                _ => {
                    return Err(BackendError::TypeMismatch {
                        buffer: buffer.id,
                        expected: allocation.dtype,
                        found: data.dtype(),
                    })
                }
            }
        };
        result.map(|_| ()).map_err(device_error)
    }
}

impl ComputeBackend for OpenClBackend {
    fn build_program(&mut self, program: &Program) -> Result<(), BackendError> {
        let source = program_source(program);
        debug!("building {} bytes of OpenCL source", source.len());
        let built =
            ClProgram::create_and_build_from_source(&self.context, &source, BUILD_OPTIONS).map_err(BackendError::Device)?;

        let mut kernels = HashMap::with_capacity(program.kernels.len());
        for name in program.kernels.keys() {
            let kernel = Kernel::create(&built, name).map_err(|e| BackendError::Device(format!("{name}: {e}")))?;
            kernels.insert(name.clone(), kernel);
        }
        info!("built {} kernels on {}", kernels.len(), self.device_name);

        self.kernels = kernels;
        self.registry = Some(program.clone());
        Ok(())
    }

    fn allocate(&mut self, len: usize, dtype: DType, zero_fill: bool) -> Result<Buffer, BackendError> {
        let buffer = match dtype {
            DType::F32 => DeviceBuffer::F32(create(&self.context, len)?),
            DType::U32 => DeviceBuffer::U32(create(&self.context, len)?),
            DType::I32 => DeviceBuffer::I32(create(&self.context, len)?),
            DType::Vec3 => DeviceBuffer::Vec3(create(&self.context, 4 * len)?),
        };
        let handle = self.push(buffer, len, dtype);
        if zero_fill && len > 0 {
            let zero = match dtype {
                DType::F32 => Scalar::F32(0.0),
                DType::U32 => Scalar::U32(0),
                DType::I32 => Scalar::I32(0),
                DType::Vec3 => Scalar::Vec3(Vec3::zero()),
            };
            self.fill(handle, zero)?;
        }
        Ok(handle)
    }

    fn upload_constant(&mut self, data: BufferData) -> Result<Buffer, BackendError> {
        let buffer = self.allocate(data.len(), data.dtype(), false)?;
        self.write(buffer, &data)?;
        Ok(buffer)
    }

    fn copy(&mut self, dst: Buffer, src: Buffer) -> Result<(), BackendError> {
        if dst.id == src.id {
            return Ok(());
        }
        let queue = &self.queue;
        let (source, target) = pair(&mut self.buffers, dst, src)?;
        if source.dtype != target.dtype {
            return Err(BackendError::TypeMismatch { buffer: dst.id, expected: target.dtype, found: source.dtype });
        }
        if source.len != target.len {
            return Err(BackendError::LengthMismatch(target.len, source.len));
        }
        if source.len == 0 {
            return Ok(());
        }
        let words = source.len * if source.dtype == DType::Vec3 { 4 } else { 1 };
        let bytes = words * 4;
        // SAFETY: both buffers hold at least `bytes` bytes
        let result = unsafe {
            match (&source.buffer, &mut target.buffer) {
                (DeviceBuffer::F32(a), DeviceBuffer::F32(b)) | (DeviceBuffer::Vec3(a), DeviceBuffer::Vec3(b)) => {
                    queue.enqueue_copy_buffer(a, b, 0, 0, bytes, &[])
                }
                (DeviceBuffer::U32(a), DeviceBuffer::U32(b)) => queue.enqueue_copy_buffer(a, b, 0, 0, bytes, &[]),
                (DeviceBuffer::I32(a), DeviceBuffer::I32(b)) => queue.enqueue_copy_buffer(a, b, 0, 0, bytes, &[]),
                _ => return Err(BackendError::TypeMismatch { buffer: dst.id, expected: target.dtype, found: source.dtype }),
            }
        };
        result.map(|_| ()).map_err(device_error)
    }

    fn fill(&mut self, buffer: Buffer, value: Scalar) -> Result<(), BackendError> {
        let queue = &self.queue;
        let allocation = self.buffers.get_mut(buffer.id as usize).ok_or(BackendError::InvalidBuffer(buffer.id))?;
        if allocation.len == 0 {
            return Ok(());
        }
        let len = allocation.len;
        // SAFETY: patterns are 4 or 16 bytes and tile the allocation exactly
        let result = unsafe {
            match (&mut allocation.buffer, value) {
                (DeviceBuffer::F32(b), Scalar::F32(x)) => queue.enqueue_fill_buffer(b, &[x], 0, 4 * len, &[]),
                (DeviceBuffer::U32(b), Scalar::U32(x)) => queue.enqueue_fill_buffer(b, &[x], 0, 4 * len, &[]),
                (DeviceBuffer::I32(b), Scalar::I32(x)) => queue.enqueue_fill_buffer(b, &[x], 0, 4 * len, &[]),
                (DeviceBuffer::Vec3(b), Scalar::Vec3(v)) => {
                    queue.enqueue_fill_buffer(b, &[v.0, v.1, v.2, 0.0], 0, 16 * len, &[])
                }
                (_, value) => {
                    return Err(BackendError::TypeMismatch {
                        buffer: buffer.id,
                        expected: allocation.dtype,
                        found: value.dtype(),
                    })
                }
            }
        };
        result.map(|_| ()).map_err(device_error)
    }

    fn dispatch(&mut self, name: &str, work_size: usize, buffers: &[Buffer], scalars: &[Scalar])
        -> Result<(), BackendError> {
        let registry = self.registry.as_ref().ok_or(BackendError::NoProgram)?;
        registry.kernel(name)?.check_scalars(name, scalars)?;
        let kernel = self.kernels.get(name).ok_or_else(|| BackendError::UnknownProcedure(name.to_string()))?;

        if buffers.len() != BundleSlot::ALL.len() {
            return Err(BackendError::LengthMismatch(buffers.len(), BundleSlot::ALL.len()));
        }
        if work_size == 0 {
            return Ok(());
        }

        let mut exec = ExecuteKernel::new(kernel);
        for (slot, &handle) in BundleSlot::ALL.iter().zip(buffers) {
            let allocation = self.allocation(handle)?;
            if allocation.dtype != slot.dtype() {
                return Err(BackendError::TypeMismatch { buffer: handle.id, expected: slot.dtype(), found: allocation.dtype });
            }
            if slot.is_per_pixel() && allocation.len != work_size {
                return Err(BackendError::LengthMismatch(allocation.len, work_size));
            }
            // SAFETY: the argument order matches BUNDLE_PARAMS
            unsafe {
                match &allocation.buffer {
                    DeviceBuffer::F32(b) | DeviceBuffer::Vec3(b) => exec.set_arg(b),
                    DeviceBuffer::U32(b) => exec.set_arg(b),
                    DeviceBuffer::I32(b) => exec.set_arg(b),
                };
            }
        }
        for scalar in scalars {
            // SAFETY: argument values are copied by the driver when set
            unsafe {
                match scalar {
                    Scalar::F32(v) => exec.set_arg(v),
                    Scalar::U32(v) => exec.set_arg(v),
                    Scalar::I32(v) => exec.set_arg(v),
                    Scalar::Vec3(v) => exec.set_arg(&[v.0, v.1, v.2, 0.0f32]),
                };
            }
        }

        // SAFETY: every kernel argument has been set above
        unsafe { exec.set_global_work_size(work_size).enqueue_nd_range(&self.queue) }.map_err(device_error)?;
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), BackendError> {
        self.queue.finish().map_err(device_error)
    }

    fn read(&mut self, buffer: Buffer) -> Result<BufferData, BackendError> {
        let allocation = self.allocation(buffer)?;
        let len = allocation.len;
        if len == 0 {
            return Ok(BufferData::zeroed(0, allocation.dtype));
        }
        // SAFETY: blocking reads into host vectors sized to the allocation
        let data = unsafe {
            match &allocation.buffer {
                DeviceBuffer::F32(b) => {
                    let mut v = vec![0.0; len];
                    self.queue.enqueue_read_buffer(b, CL_BLOCKING, 0, &mut v, &[]).map_err(device_error)?;
                    BufferData::F32(v)
                }
                DeviceBuffer::U32(b) => {
                    let mut v = vec![0; len];
                    self.queue.enqueue_read_buffer(b, CL_BLOCKING, 0, &mut v, &[]).map_err(device_error)?;
                    BufferData::U32(v)
                }
                DeviceBuffer::I32(b) => {
                    let mut v = vec![0; len];
                    self.queue.enqueue_read_buffer(b, CL_BLOCKING, 0, &mut v, &[]).map_err(device_error)?;
                    BufferData::I32(v)
                }
                DeviceBuffer::Vec3(b) => {
                    let mut v = vec![0.0; 4 * len];
                    self.queue.enqueue_read_buffer(b, CL_BLOCKING, 0, &mut v, &[]).map_err(device_error)?;
                    BufferData::Vec3(v.chunks_exact(4).map(|c| Vec3(c[0], c[1], c[2])).collect())
                }
            }
        };
        Ok(data)
    }
}
