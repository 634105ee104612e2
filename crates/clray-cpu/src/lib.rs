//! Host compute back-end.
//!
//! Buffers live in an arena of owned vectors. A dispatch moves its argument
//! buffers out of the arena, runs the kernel over every pixel in order and
//! moves them back, so one buffer can never be bound twice.

use clray::{
    backend::{Buffer, BufferData, ComputeBackend, DType, Scalar},
    error::BackendError,
    renderer::kernels::{
        CameraTransformArgs, GroupRange, KernelDescriptor, Program, ScalarArgs, ShaderArgs, ShadowArgs,
    },
};
use tracing::debug;

use state::RayState;

mod kernels;
mod state;
#[cfg(test)]
mod utils;

#[cfg(test)]
mod tests;

#[derive(Default)]
pub struct HostBackend {
    buffers: Vec<Option<BufferData>>,
    program: Option<Program>,
    dispatches: u64,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful kernel launches since creation
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn slot(&self, buffer: Buffer) -> Result<&BufferData, BackendError> {
        self.buffers
            .get(buffer.id as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::InvalidBuffer(buffer.id))
    }

    fn slot_mut(&mut self, buffer: Buffer) -> Result<&mut BufferData, BackendError> {
        self.buffers
            .get_mut(buffer.id as usize)
            .and_then(Option::as_mut)
            .ok_or(BackendError::InvalidBuffer(buffer.id))
    }

    fn insert(&mut self, data: BufferData) -> Buffer {
        let buffer = Buffer { id: self.buffers.len() as u32, len: data.len(), dtype: data.dtype() };
        self.buffers.push(Some(data));
        buffer
    }

    /// Moves the argument buffers out; on failure everything taken goes back
    fn take_all(&mut self, buffers: &[Buffer]) -> Result<Vec<BufferData>, BackendError> {
        let mut taken = Vec::with_capacity(buffers.len());
        for &buffer in buffers {
            match self.buffers.get_mut(buffer.id as usize).and_then(Option::take) {
                Some(data) => taken.push(data),
                None => {
                    self.restore(&buffers[..taken.len()], taken);
                    return Err(BackendError::InvalidBuffer(buffer.id));
                }
            }
        }
        Ok(taken)
    }

    fn restore(&mut self, buffers: &[Buffer], data: Vec<BufferData>) {
        for (buffer, data) in buffers.iter().zip(data) {
            self.buffers[buffer.id as usize] = Some(data);
        }
    }

    fn dispatch_with(
        &mut self,
        program: &Program,
        name: &str,
        work_size: usize,
        buffers: &[Buffer],
        scalars: &[Scalar],
    ) -> Result<(), BackendError> {
        program.kernel(name)?;
        let mut data = self.take_all(buffers)?;
        let result = RayState::bind(buffers, &mut data, work_size)
            .and_then(|mut state| Self::run(program, name, &mut state, scalars));
        self.restore(buffers, data);
        result
    }

    fn run(
        program: &Program,
        name: &str,
        state: &mut RayState,
        scalars: &[Scalar],
    ) -> Result<(), BackendError> {
        let procedure = |procedure: &str| {
            program
                .procedures
                .get(procedure)
                .map(|p| p.template.clone())
                .ok_or_else(|| BackendError::UnknownProcedure(procedure.to_string()))
        };

        let mut args = ScalarArgs::new(name, scalars);
        match program.kernel(name)? {
            KernelDescriptor::Trace { procedure: p } => {
                let template = procedure(p)?;
                let id = args.u32()?;
                args.finish()?;
                kernels::trace(state, &template, id);
            }
            KernelDescriptor::Normal { procedure: p } => {
                let template = procedure(p)?;
                let range = GroupRange::from_scalars(&mut args)?;
                args.finish()?;
                kernels::normal(state, &template, range);
            }
            KernelDescriptor::Shadow { procedure: p } => {
                let template = procedure(p)?;
                let shadow = ShadowArgs::from_scalars(&mut args)?;
                args.finish()?;
                kernels::shadow(state, &template, shadow);
            }
            KernelDescriptor::Advance => {
                args.finish()?;
                kernels::advance(state);
            }
            KernelDescriptor::CameraTransform => {
                let camera = CameraTransformArgs::from_scalars(&mut args)?;
                args.finish()?;
                kernels::camera_transform(state, camera);
            }
            KernelDescriptor::DrawUniform => {
                args.finish()?;
                kernels::draw_uniform(state);
            }
            KernelDescriptor::ScaleColor => {
                let factor = args.f32()?;
                args.finish()?;
                kernels::scale_color(state, factor);
            }
            KernelDescriptor::Shader(stage) => {
                let shader = ShaderArgs::from_scalars(&mut args)?;
                args.finish()?;
                kernels::shader(state, *stage, &shader);
            }
        }
        Ok(())
    }
}

impl ComputeBackend for HostBackend {
    fn build_program(&mut self, program: &Program) -> Result<(), BackendError> {
        debug!(
            "host program: {} procedures, {} kernels",
            program.procedures.len(),
            program.kernels.len()
        );
        self.program = Some(program.clone());
        Ok(())
    }

    fn allocate(&mut self, len: usize, dtype: DType, _zero_fill: bool) -> Result<Buffer, BackendError> {
        // host memory is always initialized
        Ok(self.insert(BufferData::zeroed(len, dtype)))
    }

    fn upload_constant(&mut self, data: BufferData) -> Result<Buffer, BackendError> {
        Ok(self.insert(data))
    }

    fn copy(&mut self, dst: Buffer, src: Buffer) -> Result<(), BackendError> {
        let data = self.slot(src)?.clone();
        let target = self.slot_mut(dst)?;
        if target.dtype() != data.dtype() {
            return Err(BackendError::TypeMismatch { buffer: dst.id, expected: target.dtype(), found: data.dtype() });
        }
        if target.len() != data.len() {
            return Err(BackendError::LengthMismatch(target.len(), data.len()));
        }
        *target = data;
        Ok(())
    }

    fn fill(&mut self, buffer: Buffer, value: Scalar) -> Result<(), BackendError> {
        let data = self.slot_mut(buffer)?;
        let expected = data.dtype();
        data.fill(value).map_err(|found| BackendError::TypeMismatch { buffer: buffer.id, expected, found })
    }

    fn dispatch(
        &mut self,
        name: &str,
        work_size: usize,
        buffers: &[Buffer],
        scalars: &[Scalar],
    ) -> Result<(), BackendError> {
        let program = self.program.take().ok_or(BackendError::NoProgram)?;
        let result = self.dispatch_with(&program, name, work_size, buffers, scalars);
        self.program = Some(program);
        if result.is_ok() {
            self.dispatches += 1;
        }
        result
    }

    fn synchronize(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn read(&mut self, buffer: Buffer) -> Result<BufferData, BackendError> {
        Ok(self.slot(buffer)?.clone())
    }
}
