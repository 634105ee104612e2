use std::rc::Rc;

use tracing::{debug, info};

use crate::{
    error::OctreeError,
    geometry::{Mesh, Vec3, AABB},
};

/// Deepest subdivision the device traversal stack can hold
pub const MAX_DEPTH: u32 = 7;
/// Header mask bit marking an empty node
pub const EMPTY: u32 = 0x100;
/// Traversal stack entries needed for `MAX_DEPTH`
pub const STACK_SIZE: usize = 8 * MAX_DEPTH as usize + 1;

#[derive(Clone, Copy, Debug)]
pub struct OctreeSettings {
    pub max_depth: u32,
    pub max_faces_per_leaf: usize,
    /// also require the node sphere to reach the face's supporting plane
    pub plane_test: bool,
}

impl Default for OctreeSettings {
    fn default() -> Self {
        OctreeSettings { max_depth: 3, max_faces_per_leaf: 5, plane_test: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OctreeNode {
    pub origin: Vec3,
    pub size: f32,
    pub parent: Option<usize>,
    pub children: Option<[usize; 8]>,
    pub faces: Vec<u32>,
}

impl OctreeNode {
    fn new(origin: Vec3, size: f32, parent: Option<usize>) -> Self {
        OctreeNode { origin, size, parent, children: None, faces: Vec::new() }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        (self.origin + Vec3::splat(self.size * 0.5), 3f32.sqrt() * self.size * 0.5)
    }

    pub fn bounds(&self) -> AABB {
        AABB::cube(self.origin, self.size)
    }
}

/// Offset of child `i` in units of half the parent size; x varies slowest
pub fn child_offset(i: usize) -> Vec3 {
    Vec3(((i >> 2) & 1) as f32, ((i >> 1) & 1) as f32, (i & 1) as f32)
}

/// Arena octree over a mesh's faces. Node 0 is the root.
#[derive(Clone, Debug)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
}

/// Flat form of an octree, see [`Octree::serialize`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedOctree {
    pub data: Vec<u32>,
    pub root_data_offset: u32,
}

struct FaceSphere {
    center: Vec3,
    radius: f32,
    normal: Vec3,
    v0: Vec3,
}

impl Octree {
    pub fn build(mesh: &Mesh, settings: &OctreeSettings) -> Result<Octree, OctreeError> {
        if settings.max_depth >= MAX_DEPTH {
            return Err(OctreeError::DepthLimit { requested: settings.max_depth, limit: MAX_DEPTH });
        }

        let bounds = mesh.bounds();
        let extent = bounds.extent();
        let size = extent.max_component() * 1.01;
        let origin = bounds.center() - Vec3::splat(size * 0.5);

        let spheres: Vec<FaceSphere> = (0..mesh.tris.len())
            .map(|face| {
                let (center, radius) = mesh.face_bounding_sphere(face);
                FaceSphere { center, radius, normal: mesh.face_normal(face), v0: mesh.triangle(face).0 }
            })
            .collect();

        let mut nodes = vec![OctreeNode::new(origin, size, None)];
        let mut active: Vec<(usize, Rc<[u32]>)> = vec![(0, (0..mesh.tris.len() as u32).collect())];
        let mut depth = 0;
        let mut leaves = 0;

        while !active.is_empty() {
            let mut next = Vec::new();
            let n_active = active.len();
            for (index, candidates) in active {
                let (node_center, node_radius) = nodes[index].bounding_sphere();
                let node_size = nodes[index].size;
                let faces: Vec<u32> = candidates
                    .iter()
                    .copied()
                    .filter(|&f| {
                        let s = &spheres[f as usize];
                        let overlap = (node_center - s.center).length() - node_radius - s.radius < 0.0;
                        overlap && (!settings.plane_test || Vec3::dot(s.normal, node_center - s.v0).abs() <= node_radius)
                    })
                    .collect();

                // large faces overlap every child; only small ones are worth splitting for
                let small = faces.iter().filter(|&&f| 2.0 * spheres[f as usize].radius < node_size * 0.5).count();
                if small <= settings.max_faces_per_leaf || depth == settings.max_depth {
                    nodes[index].faces = faces;
                    leaves += 1;
                    continue;
                }

                let faces: Rc<[u32]> = faces.into();
                let half = node_size * 0.5;
                let first = nodes.len();
                for i in 0..8 {
                    let child_origin = nodes[index].origin + child_offset(i) * half;
                    nodes.push(OctreeNode::new(child_origin, half, Some(index)));
                    next.push((first + i, faces.clone()));
                }
                nodes[index].children = Some(std::array::from_fn(|i| first + i));
            }
            debug!("octree depth {} active nodes {} total leaves {}", depth, n_active, leaves);
            active = next;
            depth += 1;
        }

        info!("built octree: {} nodes, {} leaves, {} faces", nodes.len(), leaves, mesh.tris.len());
        Ok(Octree { nodes })
    }

    pub fn root(&self) -> &OctreeNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> &OctreeNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    pub fn leaves(&self) -> impl Iterator<Item = &OctreeNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    pub fn depth(&self) -> u32 {
        self.nodes
            .iter()
            .map(|node| {
                let mut depth = 0;
                let mut parent = node.parent;
                while let Some(p) = parent {
                    depth += 1;
                    parent = self.nodes[p].parent;
                }
                depth
            })
            .max()
            .unwrap_or(0)
    }

    /// Writes the tree as `(mask, data_offset)` headers.
    ///
    /// Children are written before their parent. A non-empty leaf points at
    /// `[face_count, faces...]`, an internal node at its eight child headers.
    /// The root header is appended last, at `root_data_offset`.
    pub fn serialize(&self) -> SerializedOctree {
        let mut data = Vec::new();
        let root = self.write_node(0, &mut data);
        let root_data_offset = data.len() as u32;
        data.extend(root);
        SerializedOctree { data, root_data_offset }
    }

    fn is_vacant(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        match node.children {
            None => node.is_empty(),
            Some(children) => children.iter().all(|&c| self.is_vacant(c)),
        }
    }

    fn write_node(&self, index: usize, data: &mut Vec<u32>) -> [u32; 2] {
        let node = &self.nodes[index];
        let mut mask = 0;
        let mut payload = Vec::new();
        match node.children {
            // an internal node without geometry would be read back as a leaf
            _ if self.is_vacant(index) => mask = EMPTY,
            None => {
                payload.push(node.faces.len() as u32);
                payload.extend(&node.faces);
            }
            Some(children) => {
                for (i, &child) in children.iter().enumerate() {
                    if self.is_vacant(child) {
                        payload.extend([EMPTY, 0]);
                    } else {
                        mask |= 1 << i;
                        payload.extend(self.write_node(child, data));
                    }
                }
            }
        }
        let offset = data.len() as u32;
        data.extend(payload);
        [mask, offset]
    }
}

impl SerializedOctree {
    /// Rebuilds the arena tree; `origin` and `size` describe the root cube
    pub fn decode(&self, origin: Vec3, size: f32) -> Result<Octree, OctreeError> {
        let mut nodes = vec![OctreeNode::new(origin, size, None)];
        let mut pending = vec![(0, self.root_data_offset as usize)];
        while let Some((index, header)) = pending.pop() {
            let mask = self.word(header)?;
            let offset = self.word(header + 1)? as usize;
            if mask & EMPTY != 0 {
                continue;
            }
            if mask & 0xff == 0 {
                let count = self.word(offset)? as usize;
                let faces = self.data.get(offset + 1..offset + 1 + count).ok_or(OctreeError::Malformed(offset))?;
                nodes[index].faces = faces.to_vec();
                continue;
            }
            let half = nodes[index].size * 0.5;
            let first = nodes.len();
            for i in 0..8 {
                let child_origin = nodes[index].origin + child_offset(i) * half;
                nodes.push(OctreeNode::new(child_origin, half, Some(index)));
                if mask & (1 << i) != 0 {
                    pending.push((first + i, offset + 2 * i));
                }
            }
            nodes[index].children = Some(std::array::from_fn(|i| first + i));
        }
        Ok(Octree { nodes })
    }

    fn word(&self, index: usize) -> Result<u32, OctreeError> {
        self.data.get(index).copied().ok_or(OctreeError::Malformed(index))
    }
}

/// Walks a serialized octree along a ray.
///
/// `test_face` is called for every face of every leaf the ray reaches before
/// the current best distance, and returns the new best distance when the face
/// was hit closer. Words outside `blob` end the walk of that branch.
pub fn traverse(
    blob: &[i32],
    root_data_offset: usize,
    origin: Vec3,
    size: f32,
    ray_origin: Vec3,
    ray: Vec3,
    t_max: f32,
    mut test_face: impl FnMut(u32) -> Option<f32>,
) {
    let word = |i: usize| blob.get(i).map(|&w| w as u32);
    let mut best = t_max;
    let mut stack = Vec::with_capacity(STACK_SIZE);
    stack.push((root_data_offset, origin, size));

    while let Some((header, node_origin, node_size)) = stack.pop() {
        let (Some(mask), Some(offset)) = (word(header), word(header + 1)) else {
            continue;
        };
        let offset = offset as usize;
        if mask & EMPTY != 0 {
            continue;
        }
        if AABB::cube(node_origin, node_size).ray_interval(ray_origin, ray, 0.0, best).is_none() {
            continue;
        }
        if mask & 0xff == 0 {
            let count = word(offset).unwrap_or(0) as usize;
            for k in 0..count {
                let Some(face) = word(offset + 1 + k) else { break };
                if let Some(t) = test_face(face) {
                    best = best.min(t);
                }
            }
        } else {
            let half = node_size * 0.5;
            for i in 0..8 {
                if mask & (1 << i) != 0 {
                    stack.push((offset + 2 * i, node_origin + child_offset(i) * half, half));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::{ray_triangle_intersect, Vec3u};

    use super::*;

    /// Flat grid of `n` x `n` quads in the z = 0 plane
    fn grid(n: u32) -> Mesh {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vec3(x as f32, y as f32, (x * y) as f32 * 0.01));
            }
        }
        let mut polygons = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * (n + 1) + x;
                polygons.push(vec![i, i + 1, i + n + 2, i + n + 1]);
            }
        }
        Mesh::from_polygons(vertices, &polygons, true).unwrap()
    }

    #[test]
    fn rejects_deep_trees() {
        let settings = OctreeSettings { max_depth: 7, ..Default::default() };
        assert!(matches!(Octree::build(&grid(2), &settings), Err(OctreeError::DepthLimit { requested: 7, limit: 7 })));
    }

    #[test]
    fn every_face_reaches_a_leaf_holding_it() {
        let mesh = grid(8);
        let tree = Octree::build(&mesh, &OctreeSettings::default()).unwrap();
        assert!(tree.depth() >= 1 && tree.depth() <= 3);
        for face in 0..mesh.tris.len() as u32 {
            assert!(tree.leaves().any(|leaf| leaf.faces.contains(&face)), "face {face} lost");
        }
        for leaf in tree.leaves() {
            let small = leaf
                .faces
                .iter()
                .filter(|&&f| 2.0 * mesh.face_bounding_sphere(f as usize).1 < leaf.size * 0.5)
                .count();
            assert!(small <= 5);
        }
    }

    #[test]
    fn leaves_tile_the_root_cube() {
        let tree = Octree::build(&grid(8), &OctreeSettings::default()).unwrap();
        let root = tree.root();
        let volume: f64 = tree.leaves().map(|l| (l.size as f64).powi(3)).sum();
        assert!((volume - (root.size as f64).powi(3)).abs() < 1e-6 * volume);

        let pad = Vec3::splat(1e-4 * root.size);
        let bounds = AABB::new(root.origin - pad, root.origin + Vec3::splat(root.size) + pad);
        for leaf in tree.leaves() {
            assert!(bounds.contains(&leaf.bounds()));
        }
    }

    #[test]
    fn single_leaf_layout() {
        let mesh = Mesh::from_polygons(
            vec![Vec3(0.0, 0.0, 0.0), Vec3(1.0, 0.0, 0.0), Vec3(0.0, 1.0, 0.0)],
            &[vec![0, 1, 2]],
            false,
        )
        .unwrap();
        assert_eq!(mesh.tris, vec![Vec3u(0, 1, 2)]);
        let blob = Octree::build(&mesh, &OctreeSettings::default()).unwrap().serialize();
        assert_eq!(blob.data, vec![1, 0, 0, 0]);
        assert_eq!(blob.root_data_offset, 2);
    }

    #[test]
    fn decode_restores_structure() {
        let mesh = grid(8);
        let tree = Octree::build(&mesh, &OctreeSettings::default()).unwrap();
        let blob = tree.serialize();
        let root = tree.root();
        let decoded = blob.decode(root.origin, root.size).unwrap();

        let faces = |t: &Octree| {
            let mut all: Vec<(i64, i64, i64, Vec<u32>)> = t
                .leaves()
                .filter(|l| !l.is_empty())
                .map(|l| {
                    let key = l.origin * 1000.0;
                    (key.0 as i64, key.1 as i64, key.2 as i64, l.faces.clone())
                })
                .collect();
            all.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
            all
        };
        assert_eq!(faces(&tree), faces(&decoded));
        assert_eq!(decoded.serialize(), blob);

        assert!(matches!(
            SerializedOctree { data: vec![0, 40], root_data_offset: 0 }.decode(Vec3::zero(), 1.0),
            Err(OctreeError::Malformed(40))
        ));
    }

    #[test]
    fn traversal_matches_brute_force() {
        let mesh = grid(8);
        let tree = Octree::build(&mesh, &OctreeSettings::default()).unwrap();
        let blob = tree.serialize();
        let words: Vec<i32> = blob.data.iter().map(|&w| w as i32).collect();
        let root = tree.root();

        for k in 0..20 {
            let origin = Vec3(0.3 + k as f32 * 0.37, 0.5 + k as f32 * 0.29, 5.0);
            let ray = Vec3::normalized(Vec3(0.05, -0.02, -1.0));

            let closest = |faces: &mut dyn Iterator<Item = u32>| {
                faces
                    .filter_map(|f| {
                        let (p0, p1, p2) = mesh.triangle(f as usize);
                        ray_triangle_intersect(p0, p1, p2, origin, ray).map(|h| h.0).filter(|&t| t > 0.0)
                    })
                    .fold(f32::INFINITY, f32::min)
            };
            let brute = closest(&mut (0..mesh.tris.len() as u32));

            let mut best = f32::INFINITY;
            traverse(&words, blob.root_data_offset as usize, root.origin, root.size, origin, ray, 1e9, |face| {
                let t = closest(&mut std::iter::once(face));
                (t < best).then(|| {
                    best = t;
                    t
                })
            });
            assert_eq!(best, brute);
        }
    }
}
