use crate::{
    accel::{self, Octree, OctreeSettings, SerializedOctree},
    compiler::procedure::{FormalParam, Template},
    error::OctreeError,
    geometry::{ray_triangle_intersect, Mesh, Vec3},
};

use super::{AuxiliaryData, Hit, ParamReader, ParamValue, RayQuery};

/// Triangle mesh; vertices go to the shared vector buffer, faces to the int buffer
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    pub mesh: Mesh,
    pub octree: Option<MeshOctree>,
    pub auto_flip_normal: bool,
}

#[derive(Clone, Debug)]
pub struct MeshOctree {
    pub tree: Octree,
    pub blob: SerializedOctree,
}

pub(crate) const LINEAR_INTERSECT_CODE: &str = "    float best = old_isec_dist;
    int found = -1;
    for (int f = 0; f < n_faces; ++f) {
        if (origin_self && (uint)f == last_subobject) continue;
        float t;
        if (triangle_intersect(aux_vec[aux_int[3 * f]], aux_vec[aux_int[3 * f + 1]], aux_vec[aux_int[3 * f + 2]],
                origin, ray, &t) && t > 0.0f && t < best) {
            best = t;
            found = f;
        }
    }
    if (found < 0) return false;
    *p_isec_dist = best;
    *p_subobject = (uint)found;
    return true;
";

pub(crate) const OCTREE_INTERSECT_CODE: &str = "    __global const int *tree = aux_int + 3 * n_faces;
    int stack_node[OCTREE_STACK_SIZE];
    float3 stack_origin[OCTREE_STACK_SIZE];
    float stack_size[OCTREE_STACK_SIZE];
    stack_node[0] = root_data_offset;
    stack_origin[0] = octree_origin;
    stack_size[0] = octree_size;
    int top = 1;
    float best = old_isec_dist;
    int found = -1;
    while (top > 0) {
        --top;
        const int header = stack_node[top];
        const float3 node_origin = stack_origin[top];
        const float node_size = stack_size[top];
        const uint mask = (uint)tree[header];
        if (mask & 0x100u) continue;
        if (!box_interval(node_origin, node_origin + (float3)(node_size), origin, ray, best)) continue;
        const int data = tree[header + 1];
        if ((mask & 0xffu) == 0u) {
            const int count = tree[data];
            for (int k = 0; k < count; ++k) {
                const int f = tree[data + 1 + k];
                if (origin_self && (uint)f == last_subobject) continue;
                float t;
                if (triangle_intersect(aux_vec[aux_int[3 * f]], aux_vec[aux_int[3 * f + 1]], aux_vec[aux_int[3 * f + 2]],
                        origin, ray, &t) && t > 0.0f && t < best) {
                    best = t;
                    found = f;
                }
            }
        } else {
            const float half = 0.5f * node_size;
            for (int i = 0; i < 8; ++i) {
                if (mask & (1u << i)) {
                    stack_node[top] = data + 2 * i;
                    stack_origin[top] = node_origin
                        + half * (float3)((float)((i >> 2) & 1), (float)((i >> 1) & 1), (float)(i & 1));
                    stack_size[top] = half;
                    ++top;
                }
            }
        }
    }
    if (found < 0) return false;
    *p_isec_dist = best;
    *p_subobject = (uint)found;
    return true;
";

pub(crate) const NORMAL_CODE: &str = "    const float3 p0 = aux_vec[aux_int[3 * subobject]];
    const float3 p1 = aux_vec[aux_int[3 * subobject + 1]];
    const float3 p2 = aux_vec[aux_int[3 * subobject + 2]];
    return normalize(cross(p1 - p0, p2 - p0));
";

impl TriangleMesh {
    pub fn new(mesh: Mesh) -> Self {
        TriangleMesh { mesh, octree: None, auto_flip_normal: false }
    }

    pub fn with_octree(mesh: Mesh, settings: &OctreeSettings) -> Result<Self, OctreeError> {
        let tree = Octree::build(&mesh, settings)?;
        let blob = tree.serialize();
        Ok(TriangleMesh { mesh, octree: Some(MeshOctree { tree, blob }), auto_flip_normal: false })
    }

    pub fn auto_flip(mut self, enabled: bool) -> Self {
        self.auto_flip_normal = enabled;
        self
    }

    pub fn class_name(&self) -> &'static str {
        match self.octree {
            Some(_) => "OctreeMesh",
            None => "TriangleMesh",
        }
    }

    pub(crate) fn template(&self) -> Template {
        match self.octree {
            Some(_) => Template::OctreeMesh,
            None => Template::TriangleMesh,
        }
    }

    pub(crate) fn formal_params(&self) -> Vec<FormalParam> {
        match self.octree {
            Some(_) => vec![
                FormalParam::vec3("octree_origin"),
                FormalParam::float("octree_size"),
                FormalParam::int("n_faces"),
                FormalParam::int("root_data_offset"),
            ],
            None => vec![FormalParam::int("n_faces")],
        }
    }

    pub(crate) fn intersect_code(&self) -> &'static str {
        match self.octree {
            Some(_) => OCTREE_INTERSECT_CODE,
            None => LINEAR_INTERSECT_CODE,
        }
    }

    pub(crate) fn parameter_values(&self) -> Vec<ParamValue> {
        let n_faces = ParamValue::Int(self.mesh.tris.len() as i32);
        match &self.octree {
            Some(octree) => {
                let root = octree.tree.root();
                vec![
                    ParamValue::Vec3(root.origin),
                    ParamValue::Float(root.size),
                    n_faces,
                    ParamValue::Int(octree.blob.root_data_offset as i32),
                ]
            }
            None => vec![n_faces],
        }
    }

    /// Vertices; face indices followed by the octree blob
    pub(crate) fn auxiliary_buffers(&self) -> AuxiliaryData {
        let mut ints: Vec<i32> = self.mesh.tris.iter().flat_map(|t| [t.0 as i32, t.1 as i32, t.2 as i32]).collect();
        if let Some(octree) = &self.octree {
            ints.extend(octree.blob.data.iter().map(|&w| w as i32));
        }
        AuxiliaryData { vectors: self.mesh.vertices.clone(), ints }
    }
}

fn face_hit(params: &ParamReader, face: usize, q: &RayQuery) -> Option<f32> {
    if q.origin_self && face as u32 == q.last_subobject {
        return None;
    }
    let vertex = |k: usize| params.aux_vec[params.aux_int[3 * face + k] as usize];
    ray_triangle_intersect(vertex(0), vertex(1), vertex(2), q.origin, q.ray)
        .map(|h| h.0)
        .filter(|&t| t > 0.0)
}

pub(crate) fn intersect_linear(params: &mut ParamReader, q: &RayQuery) -> Option<Hit> {
    let n_faces = params.int() as usize;
    let mut best: Option<Hit> = None;
    for face in 0..n_faces {
        let bound = best.map_or(q.old_isec_dist, |h| h.distance);
        if let Some(t) = face_hit(params, face, q).filter(|&t| t < bound) {
            best = Some(Hit { distance: t, subobject: face as u32 });
        }
    }
    best
}

pub(crate) fn intersect_octree(params: &mut ParamReader, q: &RayQuery) -> Option<Hit> {
    let origin = params.vec3();
    let size = params.float();
    let n_faces = params.int() as usize;
    let root_data_offset = params.int() as usize;
    let tree = params.aux_int.get(3 * n_faces..).unwrap_or_default();

    let mut best: Option<Hit> = None;
    accel::traverse(tree, root_data_offset, origin, size, q.origin, q.ray, q.old_isec_dist, |face| {
        let bound = best.map_or(q.old_isec_dist, |h| h.distance);
        let t = face_hit(params, face as usize, q).filter(|&t| t < bound)?;
        best = Some(Hit { distance: t, subobject: face });
        Some(t)
    });
    best
}

pub(crate) fn normal(params: &mut ParamReader, subobject: u32) -> Vec3 {
    let face = subobject as usize;
    let vertex = |k: usize| params.aux_vec[params.aux_int[3 * face + k] as usize];
    let (p0, p1, p2) = (vertex(0), vertex(1), vertex(2));
    Vec3::normalized(Vec3::cross(p1 - p0, p2 - p0))
}
