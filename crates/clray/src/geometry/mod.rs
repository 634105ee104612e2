mod aabb;
mod matrix3x3;
mod mesh;
mod vec2;
mod vec3;

pub use aabb::AABB;
pub use matrix3x3::Matrix3x3;
pub use mesh::{ray_triangle_intersect, Mesh, Vec3u};
pub use vec2::Vec2;
pub use vec3::Vec3;
