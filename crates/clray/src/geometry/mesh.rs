use std::{fs::File, io::BufReader, path::Path};

use tracing::info;

use crate::error::MeshError;

use super::{Vec3, AABB};

#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd)]
pub struct Vec3u(pub u32, pub u32, pub u32);

#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub tris: Vec<Vec3u>,
}

impl Mesh {
    /// Builds a mesh from arbitrary polygons. Every polygon must be a triangle
    /// unless `triangulate` is set, in which case polygons are split into fans.
    pub fn from_polygons(
        vertices: Vec<Vec3>,
        polygons: &[Vec<u32>],
        triangulate: bool,
    ) -> Result<Mesh, MeshError> {
        if vertices.is_empty() || polygons.is_empty() {
            return Err(MeshError::Empty);
        }

        let mut tris = Vec::with_capacity(polygons.len());
        for (face, poly) in polygons.iter().enumerate() {
            if poly.len() < 3 || (poly.len() != 3 && !triangulate) {
                return Err(MeshError::NonTriangularFace { face, vertices: poly.len() });
            }
            if let Some(&index) = poly.iter().find(|&&i| i as usize >= vertices.len()) {
                return Err(MeshError::IndexOutOfRange { face, index, vertex_count: vertices.len() });
            }
            // fan around the first vertex
            for k in 1..poly.len() - 1 {
                tris.push(Vec3u(poly[0], poly[k], poly[k + 1]));
            }
        }

        Ok(Mesh { vertices, tris })
    }

    pub fn from_obj_file(path: &Path, triangulate: bool) -> Result<Mesh, MeshError> {
        let file = File::open(path).map_err(|e| MeshError::Load(e.to_string()))?;
        let data = obj::ObjData::load_buf(BufReader::new(file))
            .map_err(|e| MeshError::Load(e.to_string()))?;

        let vertices: Vec<Vec3> = data.position.iter().map(|&p| Vec3::from(p)).collect();
        let polygons: Vec<Vec<u32>> = data
            .objects
            .iter()
            .flat_map(|object| object.groups.iter())
            .flat_map(|group| group.polys.iter())
            .map(|poly| poly.0.iter().map(|index| index.0 as u32).collect())
            .collect();

        let mesh = Mesh::from_polygons(vertices, &polygons, triangulate)?;
        info!("loaded {} ({} vertices, {} triangles)", path.display(), mesh.vertices.len(), mesh.tris.len());
        Ok(mesh)
    }

    pub fn triangle(&self, face: usize) -> (Vec3, Vec3, Vec3) {
        let Vec3u(a, b, c) = self.tris[face];
        (self.vertices[a as usize], self.vertices[b as usize], self.vertices[c as usize])
    }

    pub fn bounds(&self) -> AABB {
        AABB::from_points(self.vertices.iter().copied()).unwrap_or_default()
    }

    /// Centroid and radius of the smallest centroid-centered sphere holding the face
    pub fn face_bounding_sphere(&self, face: usize) -> (Vec3, f32) {
        let (p0, p1, p2) = self.triangle(face);
        let center = (p0 + p1 + p2) / 3.0;
        let radius = [p0, p1, p2]
            .iter()
            .map(|&p| (p - center).length())
            .fold(0.0, f32::max);
        (center, radius)
    }

    pub fn face_normal(&self, face: usize) -> Vec3 {
        let (p0, p1, p2) = self.triangle(face);
        Vec3::normalized(Vec3::cross(p1 - p0, p2 - p0))
    }

    /// Uniformly rescales and recenters the mesh so it fits a sphere of `radius` about the origin
    pub fn auto_scale(&mut self, radius: f32) {
        let bounds = self.bounds();
        let center = bounds.center();
        let extent = self
            .vertices
            .iter()
            .map(|&v| (v - center).length())
            .fold(0.0, f32::max);
        if extent <= 0.0 {
            return;
        }
        for v in self.vertices.iter_mut() {
            *v = (*v - center) * (radius / extent);
        }
    }
}

// Moller-Trumbore; returns (t, u, v)
pub fn ray_triangle_intersect(
    p0: Vec3,
    p1: Vec3,
    p2: Vec3,
    origin: Vec3,
    direction: Vec3,
) -> Option<Vec3> {
    let e1 = p1 - p0;
    let e2 = p2 - p0;

    let p = Vec3::cross(direction, e2);
    let denom = Vec3::dot(p, e1);

    if denom == 0.0 {
        return None;
    }

    let t_vec = origin - p0;
    let u = Vec3::dot(p, t_vec) / denom;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = Vec3::cross(t_vec, e1);
    let v = Vec3::dot(q, direction) / denom;

    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = Vec3::dot(q, e2) / denom;
    Some(Vec3(t, u, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_quads_unless_triangulating() {
        let vertices = vec![Vec3(0.0, 0.0, 0.0), Vec3(1.0, 0.0, 0.0), Vec3(1.0, 1.0, 0.0), Vec3(0.0, 1.0, 0.0)];
        let quad = vec![vec![0, 1, 2, 3]];
        assert!(matches!(
            Mesh::from_polygons(vertices.clone(), &quad, false),
            Err(MeshError::NonTriangularFace { face: 0, vertices: 4 })
        ));
        let mesh = Mesh::from_polygons(vertices, &quad, true).unwrap();
        assert_eq!(mesh.tris, vec![Vec3u(0, 1, 2), Vec3u(0, 2, 3)]);
    }

    #[test]
    fn rejects_bad_indices() {
        let vertices = vec![Vec3(0.0, 0.0, 0.0), Vec3(1.0, 0.0, 0.0), Vec3(1.0, 1.0, 0.0)];
        assert!(matches!(
            Mesh::from_polygons(vertices, &[vec![0, 1, 7]], false),
            Err(MeshError::IndexOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn triangle_hit() {
        let hit = ray_triangle_intersect(
            Vec3(-1.0, -1.0, 0.0),
            Vec3(1.0, -1.0, 0.0),
            Vec3(0.0, 1.0, 0.0),
            Vec3(0.0, 0.0, 2.0),
            Vec3(0.0, 0.0, -1.0),
        )
        .unwrap();
        assert!((hit.0 - 2.0).abs() < 1e-6);
    }
}
