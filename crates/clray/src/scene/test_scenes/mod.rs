//! Built-in scenes, reachable by name from the CLI and used as smoke tests
//! for the back-ends.

use std::f32::consts::PI;

use crate::{
    accel::OctreeSettings,
    error::SceneError,
    geometry::{Mesh, Vec3},
    materials::Material,
    renderer::RenderSettings,
    shapes::{Component, ConvexIntersection, DistanceField, ImplicitSurface, JuliaSet, Shape, TriangleMesh},
};

use super::{Camera, Scene, SceneBuilder};

/// Latitude/longitude sphere; quads are split into triangle fans
pub fn uv_sphere(center: Vec3, radius: f32, rings: u32, segments: u32) -> Result<Mesh, SceneError> {
    let mut vertices = vec![center + Vec3(0.0, 0.0, radius)];
    for ring in 1..rings {
        let theta = PI * ring as f32 / rings as f32;
        for segment in 0..segments {
            let phi = 2.0 * PI * segment as f32 / segments as f32;
            let dir = Vec3(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            vertices.push(center + dir * radius);
        }
    }
    vertices.push(center - Vec3(0.0, 0.0, radius));

    let south = vertices.len() as u32 - 1;
    let at = |ring: u32, segment: u32| 1 + (ring - 1) * segments + segment % segments;
    let mut polygons = Vec::new();
    for s in 0..segments {
        polygons.push(vec![0, at(1, s), at(1, s + 1)]);
        for ring in 1..rings - 1 {
            polygons.push(vec![at(ring, s), at(ring + 1, s), at(ring + 1, s + 1), at(ring, s + 1)]);
        }
        polygons.push(vec![at(rings - 1, s + 1), at(rings - 1, s), south]);
    }
    Ok(Mesh::from_polygons(vertices, &polygons, true)?)
}

/// White walls, green floor and sky ceiling around the origin, lit by a warm bulb
fn box_room() -> SceneBuilder {
    let mut builder = SceneBuilder::new();
    let walls = builder.add_world_box("white", Vec3(3.0, 5.0, 2.0), Vec3(0.0, 0.0, 2.0));
    builder.set_material(walls[4], "green");
    builder.set_material(walls[5], "sky");
    builder.add_light(Shape::sphere(Vec3(-3.0, -1.0, 2.0), 0.5), "light");
    builder.add_camera(Camera::looking_at(Vec3(1.0, -5.0, 2.0), Vec3(0.0, 2.0, 0.5), 640, 480).with_fov(55.0));
    builder
}

pub fn box_scene() -> Result<Scene, SceneError> {
    box_room().build()
}

/// A single glowing sphere over a matte floor and nothing else
pub fn emissive_sphere_scene() -> Result<Scene, SceneError> {
    let mut builder = SceneBuilder::new();
    builder.add_material("matte", Material::diffuse(Vec3::splat(0.8)));
    builder.add_material("glow", Material { emission: Vec3(4.0, 2.0, 0.7), ..Material::diffuse(Vec3::splat(1.0)) });
    builder.add_named_object("floor", Shape::half_space(Vec3(0.0, 0.0, 1.0), 0.0), "matte");
    builder.add_light(Shape::sphere(Vec3(0.0, 0.0, 0.5), 0.5), "glow");
    builder.add_camera(Camera::looking_at(Vec3(0.0, -3.0, 1.5), Vec3(0.0, 0.0, 0.4), 32, 24).with_fov(55.0));
    builder.build()
}

pub fn three_objects_scene() -> Result<Scene, SceneError> {
    let mut builder = box_room();
    builder.add_material(
        "floor",
        Material { reflection: Vec3::splat(0.15), reflection_blur: 0.05, ..Material::diffuse(Vec3::splat(0.1)) },
    );
    if let Some(floor) = builder.object_named("floor") {
        builder.set_material(floor, "floor");
    }

    let rounded = ConvexIntersection::new(
        Vec3(-0.2, 2.5, 1.0),
        vec![
            Component::cylinder(Vec3::zero(), Vec3(1.0, 1.0, 0.0), 1.0),
            Component::cylinder(Vec3::zero(), Vec3(0.0, 1.0, 0.0), 1.0),
            Component::cylinder(Vec3::zero(), Vec3(1.0, 0.0, 1.0), 1.0),
        ],
    );
    builder.add_object(Shape::Convex(rounded), "mirror");

    let r = 0.4;
    let steinmetz = ConvexIntersection::new(
        Vec3(-0.7, -0.8, r),
        vec![
            Component::cylinder(Vec3::zero(), Vec3(1.0, 0.0, 0.0), r),
            Component::cylinder(Vec3::zero(), Vec3(0.0, 1.0, 0.0), r),
            Component::cylinder(Vec3::zero(), Vec3(0.0, 0.0, 1.0), r),
        ],
    );
    builder.add_object(Shape::Convex(steinmetz), "wax");

    let slab = ConvexIntersection::parallelepiped(
        Vec3(1.3, -0.5, 0.0),
        Vec3(1.0, 0.0, 0.0),
        Vec3(0.0, 1.3, 0.0),
        Vec3(0.0, 0.0, 0.6),
    );
    builder.add_object(Shape::Convex(slab), "red");
    builder.add_object(Shape::Convex(ConvexIntersection::dodecahedron(Vec3(1.8, 0.2, 1.1), 0.5)), "glass");

    let position = Vec3(-2.0, -3.0, 1.5);
    let focus = Vec3(1.8, 0.2, 1.1);
    builder.add_camera(
        Camera::looking_at(position, Vec3(0.0, 0.0, 0.5), 640, 480)
            .with_fov(60.0)
            .with_depth_of_field(0.02, (focus - position).length()),
    );
    builder.build()
}

pub fn solids_scene() -> Result<Scene, SceneError> {
    let mut builder = box_room();
    let solids = [
        ConvexIntersection::cylinder(Vec3(-1.5, 1.0, 0.0), Vec3(0.0, 0.0, 1.0), 1.0, 0.4),
        ConvexIntersection::cone(Vec3(-0.5, 2.0, 1.2), Vec3(0.0, 0.0, -1.0), 1.2, 0.5),
        ConvexIntersection::tetrahedron(Vec3(0.5, 1.0, 0.4), 0.4),
        ConvexIntersection::octahedron(Vec3(1.5, 1.5, 0.5), 0.5),
        ConvexIntersection::icosahedron(Vec3(0.0, 0.0, 0.45), 0.45),
        ConvexIntersection::aligned_box(Vec3(1.2, -0.8, 0.0), Vec3(1.8, -0.2, 0.6)),
    ];
    for (solid, material) in solids.into_iter().zip(["red", "white", "mirror", "brushed_metal", "glass", "green"]) {
        builder.add_object(Shape::Convex(solid), material);
    }
    builder.build()
}

pub fn mesh_scene() -> Result<Scene, SceneError> {
    let mut builder = box_room();
    let settings = OctreeSettings { max_depth: 4, max_faces_per_leaf: 8, plane_test: true };
    let ball = TriangleMesh::with_octree(uv_sphere(Vec3(0.5, 1.0, 0.8), 0.8, 24, 48)?, &settings)?;
    builder.add_object(Shape::TriangleMesh(ball), "brushed_metal");
    let pebble = TriangleMesh::new(uv_sphere(Vec3(-1.2, 0.0, 0.3), 0.3, 6, 8)?).auto_flip(true);
    builder.add_object(Shape::TriangleMesh(pebble), "red");
    builder.build()
}

pub fn implicit_scene() -> Result<Scene, SceneError> {
    let mut builder = box_room();
    let blob = ImplicitSurface::parse("x^4 + y^4 + z^4 - 1", Vec3(-0.8, 1.0, 0.6), 0.6, 1.5)?;
    builder.add_object(Shape::Implicit(blob), "glass");
    let torus = DistanceField::parse("sqrt((sqrt(x^2 + y^2) - 1)^2 + z^2) - 0.3", Vec3(1.0, 0.5, 0.3), 0.7, 1.4)?;
    builder.add_object(Shape::DistanceField(torus), "wax");
    let julia = JuliaSet::new([-0.2, -0.4, -0.4, -0.4], 4, Vec3(0.0, -0.9, 0.5), 0.5).with_tracing(200, 5e-4, 0.05);
    builder.add_object(Shape::JuliaSet(julia), "red");
    builder.build()
}

pub fn glass_scene() -> Result<Scene, SceneError> {
    let mut builder = box_room();
    builder.add_object(Shape::sphere(Vec3(-0.8, 0.5, 0.6), 0.6), "glass");
    builder.add_object(Shape::sphere(Vec3(0.8, 1.5, 0.6), 0.6), "mirror");
    builder.add_object(Shape::sphere(Vec3(0.3, -0.5, 0.3), 0.3), "wax");
    builder.build()
}

fn preview_settings() -> RenderSettings {
    RenderSettings { samples_per_pixel: 256, ..Default::default() }
}

pub struct TestScene {
    pub name: &'static str,
    pub scene_func: fn() -> Result<Scene, SceneError>,
    pub settings_func: fn() -> RenderSettings,
}

pub const fn all_test_scenes() -> &'static [TestScene] {
    &[
        TestScene {
            name: "box",
            scene_func: box_scene,
            settings_func: RenderSettings::default,
        },
        TestScene {
            name: "emissive_sphere",
            scene_func: emissive_sphere_scene,
            settings_func: || RenderSettings {
                samples_per_pixel: 100,
                min_bounces: 2,
                max_bounces: 4,
                ..Default::default()
            },
        },
        TestScene {
            name: "three_objects",
            scene_func: three_objects_scene,
            // the lens jitter already spreads the first bounce
            settings_func: || RenderSettings {
                quasirandom: false,
                max_bounces: 5,
                ..Default::default()
            },
        },
        TestScene {
            name: "solids",
            scene_func: solids_scene,
            settings_func: preview_settings,
        },
        TestScene {
            name: "mesh",
            scene_func: mesh_scene,
            settings_func: preview_settings,
        },
        TestScene {
            name: "implicit",
            scene_func: implicit_scene,
            settings_func: preview_settings,
        },
        TestScene {
            name: "glass",
            scene_func: glass_scene,
            settings_func: RenderSettings::default,
        },
    ]
}

pub fn find_test_scene(name: &str) -> Result<&'static TestScene, SceneError> {
    all_test_scenes()
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| SceneError::UnknownScene(name.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::scene::CompiledScene;

    use super::*;

    #[test]
    fn every_scene_builds_and_compiles() {
        for test_scene in all_test_scenes() {
            let scene = (test_scene.scene_func)().unwrap();
            (test_scene.settings_func)().validate().unwrap();
            CompiledScene::compile(&scene).unwrap_or_else(|e| panic!("{}: {e}", test_scene.name));
        }
    }

    #[test]
    fn box_scene_matches_the_classic_layout() {
        let scene = box_scene().unwrap();
        assert_eq!(scene.objects.len(), 7);
        assert_eq!(scene.lights().count(), 1);
        assert_eq!(scene.objects[4].material, "green");
        assert_eq!(scene.objects[5].material, "sky");
        assert_eq!(scene.camera.fov, 55.0);
        assert!(scene.root_object.is_none());
    }

    #[test]
    fn uv_sphere_is_closed() {
        let mesh = uv_sphere(Vec3::zero(), 1.0, 4, 6).unwrap();
        // 2 poles, 3 rings of 6
        assert_eq!(mesh.vertices.len(), 20);
        // cap fans plus two triangles per quad
        assert_eq!(mesh.tris.len(), 2 * 6 + 2 * 2 * 6);
        for face in 0..mesh.tris.len() {
            let (a, b, c) = mesh.triangle(face);
            let outward = Vec3::dot(mesh.face_normal(face), (a + b + c) / 3.0);
            assert!(outward > 0.0, "face {face} points inward");
        }
    }

    #[test]
    fn unknown_scene_names_are_reported() {
        assert!(find_test_scene("box").is_ok());
        assert!(matches!(find_test_scene("nope"), Err(SceneError::UnknownScene(_))));
    }
}
