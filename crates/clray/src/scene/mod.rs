mod camera;
mod compiled;
mod scene;
pub mod test_scenes;

pub use camera::Camera;
pub use compiled::{CompiledScene, ObjectGroup, ParamOffsets, SceneLight, OFFSETS_PER_OBJECT};
pub use scene::{Scene, SceneBuilder, SceneObject};
