//! OpenCL compute back-end.
//!
//! `source` turns a compiled scene program into OpenCL C and is always
//! available; the device back-end itself needs the `opencl` feature and an
//! installed OpenCL runtime.

pub mod source;

#[cfg(feature = "opencl")]
mod device;

#[cfg(feature = "opencl")]
pub use device::OpenClBackend;
pub use source::program_source;

#[cfg(all(test, feature = "opencl"))]
mod tests;
