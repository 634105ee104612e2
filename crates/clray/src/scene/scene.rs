use std::collections::BTreeMap;

use crate::{
    error::SceneError,
    geometry::Vec3,
    materials::Material,
    renderer::ObjectFlags,
    shapes::Shape,
};

use super::camera::Camera;

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: Option<String>,
    pub shape: Shape,
    pub material: String,
    pub flags: ObjectFlags,
}

/// Ordered objects with their materials, and the camera looking at them
#[derive(Debug, Clone)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub materials: BTreeMap<String, Material>,
    pub camera: Camera,
    /// object the camera sits inside, if any
    pub root_object: Option<usize>,
}

impl Scene {
    pub fn lights(&self) -> impl Iterator<Item = (usize, &SceneObject)> {
        self.objects.iter().enumerate().filter(|(_, o)| o.flags.contains(ObjectFlags::LIGHT))
    }

    pub fn object_named(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name.as_deref() == Some(name))
    }

    pub fn material_of(&self, object: usize) -> Option<&Material> {
        self.materials.get(&self.objects.get(object)?.material)
    }

    /// Material of the medium outside every object
    pub fn default_material(&self) -> Material {
        self.materials.get("default").copied().unwrap_or_else(Material::default_medium)
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if self.objects.is_empty() {
            return Err(SceneError::Empty);
        }
        for (i, object) in self.objects.iter().enumerate() {
            if !self.materials.contains_key(&object.material) {
                return Err(SceneError::UnknownMaterial { object: i, material: object.material.clone() });
            }
            if object.flags.contains(ObjectFlags::LIGHT) && object.shape.surface_area().is_none() {
                return Err(SceneError::UnsupportedLight(i));
            }
        }
        match self.root_object {
            Some(root) if root >= self.objects.len() => Err(SceneError::InvalidRoot(root)),
            _ => Ok(()),
        }
    }
}

pub struct SceneBuilder {
    objects: Vec<SceneObject>,
    materials: BTreeMap<String, Material>,
    camera: Option<Camera>,
    root_object: Option<usize>,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBuilder {
    /// Starts with the preset materials
    pub fn new() -> Self {
        SceneBuilder { objects: Vec::new(), materials: Material::presets(), camera: None, root_object: None }
    }

    pub fn add_material(&mut self, name: &str, material: Material) {
        self.materials.insert(name.to_string(), material);
    }

    pub fn add_object(&mut self, shape: Shape, material: &str) -> usize {
        self.push(None, shape, material, ObjectFlags::empty())
    }

    pub fn add_named_object(&mut self, name: &str, shape: Shape, material: &str) -> usize {
        self.push(Some(name.to_string()), shape, material, ObjectFlags::empty())
    }

    /// Adds an object that next-event estimation samples
    pub fn add_light(&mut self, shape: Shape, material: &str) -> usize {
        self.push(Some("light".to_string()), shape, material, ObjectFlags::LIGHT)
    }

    fn push(&mut self, name: Option<String>, shape: Shape, material: &str, flags: ObjectFlags) -> usize {
        self.objects.push(SceneObject { name, shape, material: material.to_string(), flags });
        self.objects.len() - 1
    }

    pub fn object_named(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name.as_deref() == Some(name))
    }

    pub fn set_material(&mut self, object: usize, material: &str) {
        if let Some(o) = self.objects.get_mut(object) {
            o.material = material.to_string();
        }
    }

    /// Six inward-facing walls of an axis-aligned box with half extents `dims`
    pub fn add_world_box(&mut self, material: &str, dims: Vec3, center: Vec3) -> [usize; 6] {
        let walls = [
            (Vec3(1.0, 0.0, 0.0), dims.0 - center.0, "wall"),
            (Vec3(-1.0, 0.0, 0.0), dims.0 + center.0, "wall"),
            (Vec3(0.0, 1.0, 0.0), dims.1 - center.1, "wall"),
            (Vec3(0.0, -1.0, 0.0), dims.1 + center.1, "wall"),
            (Vec3(0.0, 0.0, 1.0), dims.2 - center.2, "floor"),
            (Vec3(0.0, 0.0, -1.0), dims.2 + center.2, "ceiling"),
        ];
        walls.map(|(normal, offset, name)| self.add_named_object(name, Shape::half_space(normal, offset), material))
    }

    pub fn set_root(&mut self, object: usize) {
        self.root_object = Some(object);
    }

    pub fn add_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
    }

    pub fn build(self) -> Result<Scene, SceneError> {
        let scene = Scene {
            objects: self.objects,
            materials: self.materials,
            camera: self.camera.unwrap_or_default(),
            root_object: self.root_object,
        };
        scene.validate()?;
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_box_walls_face_inward() {
        let mut builder = SceneBuilder::new();
        let walls = builder.add_world_box("white", Vec3(3.0, 5.0, 2.0), Vec3(0.0, 0.0, 2.0));
        let scene = builder.build().unwrap();
        assert_eq!(scene.object_named("floor"), Some(walls[4]));

        // every wall's solid side excludes the box interior
        let inside = Vec3(0.5, -1.0, 2.0);
        for &w in &walls {
            let Shape::HalfSpace(h) = &scene.objects[w].shape else { panic!() };
            assert!(Vec3::dot(inside, h.normal) + h.offset > 0.0);
        }
        let Shape::HalfSpace(ceiling) = &scene.objects[walls[5]].shape else { panic!() };
        assert!((Vec3::dot(Vec3(0.0, 0.0, 4.0), ceiling.normal) + ceiling.offset).abs() < 1e-6);
    }

    #[test]
    fn validation() {
        assert!(matches!(SceneBuilder::new().build(), Err(SceneError::Empty)));

        let mut builder = SceneBuilder::new();
        builder.add_object(Shape::sphere(Vec3::zero(), 1.0), "chrome");
        assert!(matches!(builder.build(), Err(SceneError::UnknownMaterial { object: 0, .. })));

        let mut builder = SceneBuilder::new();
        builder.add_light(Shape::half_space(Vec3(0.0, 0.0, 1.0), 0.0), "light");
        assert!(matches!(builder.build(), Err(SceneError::UnsupportedLight(0))));

        let mut builder = SceneBuilder::new();
        builder.add_light(Shape::sphere(Vec3::zero(), 1.0), "light");
        builder.set_root(3);
        assert!(matches!(builder.build(), Err(SceneError::InvalidRoot(3))));
    }
}
