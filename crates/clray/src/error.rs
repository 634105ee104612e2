use thiserror::Error;

use crate::backend::DType;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("mesh has no vertices or faces")]
    Empty,
    #[error("face {face} has {vertices} vertices, only triangles are supported")]
    NonTriangularFace { face: usize, vertices: usize },
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count}")]
    IndexOutOfRange { face: usize, index: u32, vertex_count: usize },
    #[error("failed to load mesh: {0}")]
    Load(String),
}

#[derive(Debug, Error)]
pub enum OctreeError {
    #[error("octree max_depth {requested} exceeds the traversal limit {limit}")]
    DepthLimit { requested: u32, limit: u32 },
    #[error("octree blob is malformed at word {0}")]
    Malformed(usize),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected character {found:?} at {position}")]
    UnexpectedChar { position: usize, found: char },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown function or variable {0:?}")]
    UnknownIdentifier(String),
    #[error("exponent must be an integer literal, found {0}")]
    NonIntegerExponent(f32),
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("function name clash: {name} already holds a different body")]
    NameCollision { name: String },
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene has no objects")]
    Empty,
    #[error("object {0} is flagged as a light but only spheres can be sampled")]
    UnsupportedLight(usize),
    #[error("object {object} uses unknown material {material:?}")]
    UnknownMaterial { object: usize, material: String },
    #[error("root object {0} does not exist")]
    InvalidRoot(usize),
    #[error("unknown scene {0:?}")]
    UnknownScene(String),
    #[error("invalid render settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Octree(#[from] OctreeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no program has been built")]
    NoProgram,
    #[error("unknown procedure {0}")]
    UnknownProcedure(String),
    #[error("invalid buffer handle {0}")]
    InvalidBuffer(u32),
    #[error("buffer {buffer} holds {found:?}, expected {expected:?}")]
    TypeMismatch { buffer: u32, expected: DType, found: DType },
    #[error("buffer length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("procedure {procedure} expects {expected} arguments, got {found}")]
    ArgumentCount { procedure: String, expected: usize, found: usize },
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
