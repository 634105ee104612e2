//! Flattens a scene into the id-indexed tables the kernels read.
//!
//! Objects are ordered by intersect procedure so each procedure's objects
//! occupy one contiguous id range. Id 0 is the medium outside every object.

use tracing::{debug, info};

use crate::{
    backend::BufferData,
    compiler::ShapeCompiler,
    error::RenderError,
    geometry::Vec3,
    materials::{Material, MaterialTable},
    renderer::{
        kernels::{BundleSlot, GroupRange, Program},
        ObjectFlags,
    },
    shapes::{flatten_params, Shape},
};

use super::Scene;

/// Ints per id in the parameter offset table
pub const OFFSETS_PER_OBJECT: usize = 4;

/// Objects sharing one intersect procedure
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectGroup {
    pub intersect: String,
    pub normal: String,
    pub trace_kernel: String,
    pub shadow_kernel: String,
    pub normal_kernel: String,
    pub range: GroupRange,
}

impl ObjectGroup {
    pub fn ids(&self) -> impl Iterator<Item = u32> {
        self.range.first..self.range.first + self.range.count
    }
}

#[derive(Clone, Debug)]
pub struct SceneLight {
    pub id: u32,
    pub shape: Shape,
    pub area: f32,
}

/// Where one id's parameters start in the shared buffers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamOffsets {
    pub floats: usize,
    pub ints: usize,
    pub aux_vec: usize,
    pub aux_int: usize,
}

#[derive(Debug)]
pub struct CompiledScene {
    pub program: Program,
    pub groups: Vec<ObjectGroup>,
    /// id of each scene object, by scene index
    pub object_ids: Vec<u32>,
    pub lights: Vec<SceneLight>,
    /// id the camera starts in, 0 for the outer medium
    pub root_id: u32,

    pub params_f32: Vec<f32>,
    pub params_i32: Vec<i32>,
    pub param_offsets: Vec<i32>,
    pub aux_vec: Vec<Vec3>,
    pub aux_int: Vec<i32>,
    pub object_flags: Vec<u32>,
    pub materials: MaterialTable,
}

impl CompiledScene {
    pub fn compile(scene: &Scene) -> Result<CompiledScene, RenderError> {
        scene.validate()?;

        let mut compiler = ShapeCompiler::new();
        let compiled = scene
            .objects
            .iter()
            .map(|o| compiler.compile(&o.shape))
            .collect::<Result<Vec<_>, _>>()?;

        let mut order: Vec<usize> = (0..scene.objects.len()).collect();
        order.sort_by(|&a, &b| compiled[a].intersect.cmp(&compiled[b].intersect));

        let mut program = Program::new(compiler.finish());
        program.material_rows = scene.objects.len() as u32 + 1;
        let mut groups: Vec<ObjectGroup> = Vec::new();
        let mut object_ids = vec![0; scene.objects.len()];

        let mut params_f32 = Vec::new();
        let mut params_i32 = Vec::new();
        let mut param_offsets = vec![0; OFFSETS_PER_OBJECT];
        let mut aux_vec = Vec::new();
        let mut aux_int = Vec::new();
        let mut object_flags = vec![0];
        let mut materials: Vec<Material> = Vec::with_capacity(order.len());
        let mut lights = Vec::new();

        for (index, &object) in order.iter().enumerate() {
            let id = index as u32 + 1;
            object_ids[object] = id;
            let source = &scene.objects[object];
            let procs = &compiled[object];

            match groups.last_mut() {
                Some(group) if group.intersect == procs.intersect => group.range.count += 1,
                _ => {
                    let (trace_kernel, shadow_kernel) = program.register_intersect(&procs.intersect);
                    let normal_kernel = program.register_normal(&procs.normal);
                    groups.push(ObjectGroup {
                        intersect: procs.intersect.clone(),
                        normal: procs.normal.clone(),
                        trace_kernel,
                        shadow_kernel,
                        normal_kernel,
                        range: GroupRange { first: id, count: 1 },
                    });
                }
            }

            param_offsets.extend([params_f32.len(), params_i32.len(), aux_vec.len(), aux_int.len()].map(|o| o as i32));
            flatten_params(&source.shape.parameter_values(), &mut params_f32, &mut params_i32);
            if let Some(aux) = source.shape.auxiliary_buffers() {
                aux_vec.extend(aux.vectors);
                aux_int.extend(aux.ints);
            }

            let mut flags = source.flags;
            if source.shape.auto_flip_normal() {
                flags |= ObjectFlags::AUTO_FLIP_NORMAL;
            }
            object_flags.push(flags.bits());

            // validated above
            materials.push(scene.materials.get(&source.material).copied().unwrap_or_default());

            if flags.contains(ObjectFlags::LIGHT) {
                if let Some(area) = source.shape.surface_area() {
                    lights.push(SceneLight { id, shape: source.shape.clone(), area });
                }
            }
        }

        for group in &groups {
            debug!("{}: ids {}..{}", group.intersect, group.range.first, group.range.first + group.range.count);
        }

        let root_id = scene.root_object.map_or(0, |root| object_ids[root]);
        let materials = MaterialTable::new(&scene.default_material(), &materials);

        info!(
            "scene: {} objects in {} groups, {} lights, {} kernels",
            order.len(),
            groups.len(),
            lights.len(),
            program.kernels.len()
        );

        Ok(CompiledScene {
            program,
            groups,
            object_ids,
            lights,
            root_id,
            params_f32,
            params_i32,
            param_offsets,
            aux_vec,
            aux_int,
            object_flags,
            materials,
        })
    }

    pub fn object_count(&self) -> usize {
        self.object_ids.len()
    }

    pub fn offsets(&self, id: u32) -> ParamOffsets {
        let row = &self.param_offsets[id as usize * OFFSETS_PER_OBJECT..][..OFFSETS_PER_OBJECT];
        ParamOffsets {
            floats: row[0] as usize,
            ints: row[1] as usize,
            aux_vec: row[2] as usize,
            aux_int: row[3] as usize,
        }
    }

    /// Contents of a scene-data bundle slot; `None` for per-pixel slots
    pub fn slot_data(&self, slot: BundleSlot) -> Option<BufferData> {
        let data = match slot {
            BundleSlot::ParamsF32 => BufferData::F32(self.params_f32.clone()),
            BundleSlot::ParamsI32 => BufferData::I32(self.params_i32.clone()),
            BundleSlot::ParamOffsets => BufferData::I32(self.param_offsets.clone()),
            BundleSlot::AuxVec => BufferData::Vec3(self.aux_vec.clone()),
            BundleSlot::AuxInt => BufferData::I32(self.aux_int.clone()),
            BundleSlot::ObjectFlags => BufferData::U32(self.object_flags.clone()),
            BundleSlot::MaterialColors => BufferData::Vec3(self.materials.colors.clone()),
            BundleSlot::MaterialScalars => BufferData::F32(self.materials.scalars.clone()),
            _ => return None,
        };
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        materials::ColorProperty,
        renderer::kernels::KernelDescriptor,
        scene::SceneBuilder,
    };

    use super::*;

    fn mixed_scene() -> Scene {
        let mut builder = SceneBuilder::new();
        builder.add_object(Shape::sphere(Vec3(0.0, 0.0, 1.0), 1.0), "white");
        builder.add_object(Shape::half_space(Vec3(0.0, 0.0, 1.0), 0.0), "green");
        builder.add_light(Shape::sphere(Vec3(0.0, 0.0, 3.0), 0.5), "light");
        builder.add_object(Shape::cylinder(Vec3::zero(), Vec3(0.0, 0.0, 1.0), 1.0, 0.3), "red");
        builder.build().unwrap()
    }

    #[test]
    fn groups_are_contiguous() {
        let compiled = CompiledScene::compile(&mixed_scene()).unwrap();

        let names: Vec<&str> = compiled.groups.iter().map(|g| g.intersect.as_str()).collect();
        assert_eq!(names, ["Cylinder_intersect", "HalfSpace_intersect", "Sphere_intersect"]);
        assert_eq!(compiled.groups[2].range, GroupRange { first: 3, count: 2 });
        assert_eq!(compiled.object_ids, vec![3, 2, 4, 1]);

        for group in &compiled.groups {
            assert_eq!(
                compiled.program.kernel(&group.trace_kernel).unwrap(),
                &KernelDescriptor::Trace { procedure: group.intersect.clone() }
            );
            assert!(compiled.program.kernel(&group.normal_kernel).is_ok());
        }
    }

    #[test]
    fn tables_are_indexed_by_id() {
        let scene = mixed_scene();
        let compiled = CompiledScene::compile(&scene).unwrap();
        assert_eq!(compiled.object_flags.len(), 5);
        assert_eq!(compiled.param_offsets.len(), 5 * OFFSETS_PER_OBJECT);
        assert_eq!(compiled.offsets(0), ParamOffsets::default());

        // the light sphere follows the white one; each sphere carries 4 floats
        assert_eq!(compiled.lights.len(), 1);
        assert_eq!(compiled.lights[0].id, 4);
        let second = compiled.offsets(4);
        assert_eq!(second.floats, compiled.offsets(3).floats + 4);
        assert_eq!(compiled.params_f32[second.floats..second.floats + 4], [0.0, 0.0, 3.0, 0.5]);
        assert_eq!(compiled.object_flags[4], ObjectFlags::LIGHT.bits());

        let emission = compiled.materials.color(ColorProperty::Emission, 4);
        assert_eq!(emission, scene.materials["light"].emission);
        assert_eq!(compiled.root_id, 0);
    }

    #[test]
    fn root_object_maps_to_its_id() {
        let mut builder = SceneBuilder::new();
        builder.add_object(Shape::sphere(Vec3::zero(), 1.0), "white");
        let water = builder.add_object(Shape::half_space(Vec3(0.0, 0.0, 1.0), 0.0), "glass");
        builder.set_root(water);
        let compiled = CompiledScene::compile(&builder.build().unwrap()).unwrap();
        assert_eq!(compiled.root_id, 1);
        assert!(compiled.slot_data(BundleSlot::Pos).is_none());
        assert_eq!(compiled.slot_data(BundleSlot::ObjectFlags).map(|d| d.len()), Some(3));
    }
}
