pub mod accel;
pub mod backend;
pub mod compiler;
pub mod error;
pub mod geometry;
pub mod materials;
pub mod renderer;
pub mod sampling;
pub mod scene;
pub mod shapes;

pub use backend::{Buffer, BufferData, ComputeBackend, DType, Scalar};
pub use error::RenderError;
