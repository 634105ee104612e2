use crate::{
    geometry::{Matrix3x3, Vec3},
    renderer::{kernels::CameraTransformArgs, PixelFilter},
    sampling::{tent, Sampler},
};

/// Spherical pinhole camera with an optional thin-lens aperture.
///
/// Base directions step by a constant angle per pixel in both image axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// horizontal field of view, degrees
    pub fov: f32,
    pub width: u32,
    pub height: u32,

    /// lens radius; 0 is a pinhole
    pub aperture: f32,
    /// distance of the plane in focus, 0 disables refocusing
    pub sharp_distance: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            position: Vec3::zero(),
            direction: Vec3(0.0, 1.0, 0.0),
            up: Vec3(0.0, 0.0, 1.0),
            fov: 55.0,
            width: 800,
            height: 600,
            aperture: 0.0,
            sharp_distance: 0.0,
        }
    }
}

impl Camera {
    pub fn looking_at(position: Vec3, target: Vec3, width: u32, height: u32) -> Camera {
        Camera { position, direction: target - position, width, height, ..Default::default() }
    }

    pub fn with_fov(mut self, fov: f32) -> Camera {
        self.fov = fov;
        self
    }

    pub fn with_depth_of_field(mut self, aperture: f32, sharp_distance: f32) -> Camera {
        self.aperture = aperture;
        self.sharp_distance = sharp_distance;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixel_angle(&self) -> f32 {
        self.fov.to_radians() / self.width as f32
    }

    /// Columns are right, image-down and forward
    pub fn basis(&self) -> Matrix3x3 {
        let forward = Vec3::normalized(self.direction);
        let right = Vec3::normalized(Vec3::cross(forward, self.up));
        let up = Vec3::cross(right, forward);
        Matrix3x3::from_rows(right, -up, forward).transposed()
    }

    /// World-space direction of every pixel center, row-major from the top left
    pub fn base_directions(&self) -> Vec<Vec3> {
        let basis = self.basis();
        let angle = self.pixel_angle();
        let half_x = angle * self.width as f32 / 2.0;
        let half_y = angle * self.height as f32 / 2.0;

        let mut dirs = Vec::with_capacity(self.pixel_count());
        for j in 0..self.height {
            let ya = (j as f32 + 0.5) * angle - half_y;
            for i in 0..self.width {
                let xa = (i as f32 + 0.5) * angle - half_x;
                let local = Vec3(xa.sin() * ya.cos(), ya.sin(), xa.cos() * ya.cos());
                dirs.push(basis.apply_vector(local));
            }
        }
        dirs
    }

    pub fn jitters(&self) -> bool {
        self.aperture > 0.0
    }

    /// Draws the subpixel and lens offsets of one sample
    pub fn sample(&self, filter: PixelFilter, sampler: &mut Sampler) -> CameraTransformArgs {
        let angle = self.pixel_angle();
        let (sx, sy) = match filter {
            PixelFilter::Tent => (tent(sampler.uniform()), tent(sampler.uniform())),
            PixelFilter::Box => (sampler.uniform() - 0.5, sampler.uniform() - 0.5),
            PixelFilter::None => (0.0, 0.0),
        };

        let basis = self.basis();
        let tilt = Matrix3x3::rotation_y(sx * angle) * Matrix3x3::rotation_x(sy * angle);
        let rotation = basis * tilt * basis.transposed();

        let dof_offset = if self.aperture > 0.0 {
            let d = sampler.unit_disk();
            (basis.column(0) * d.0 + basis.column(1) * d.1) * self.aperture
        } else {
            Vec3::zero()
        };

        CameraTransformArgs {
            rotation,
            origin: self.position + dof_offset,
            dof_offset,
            sharp_distance: if self.aperture > 0.0 { self.sharp_distance } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pixel_looks_forward() {
        let camera = Camera::looking_at(Vec3::zero(), Vec3(0.0, 5.0, 0.0), 3, 3);
        let dirs = camera.base_directions();
        assert_eq!(dirs.len(), 9);
        assert!((dirs[4] - Vec3(0.0, 1.0, 0.0)).length() < 1e-6);

        // top-left looks left and up
        assert!(dirs[0].0 < 0.0 && dirs[0].2 > 0.0);
        // bottom-right looks right and down
        assert!(dirs[8].0 > 0.0 && dirs[8].2 < 0.0);
        assert!(dirs.iter().all(|d| (d.length() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn neighbours_differ_by_the_pixel_angle() {
        let camera = Camera::looking_at(Vec3::zero(), Vec3(0.0, 1.0, 0.0), 100, 50);
        let dirs = camera.base_directions();
        let cos = Vec3::dot(dirs[2520], dirs[2521]);
        assert!((cos.acos() - camera.pixel_angle()).abs() < 1e-4);
    }

    #[test]
    fn unjittered_sample_is_the_identity() {
        let camera = Camera::looking_at(Vec3(1.0, -5.0, 2.0), Vec3(0.0, 2.0, 0.5), 8, 4);
        let args = camera.sample(PixelFilter::None, &mut Sampler::new(1));
        let d = camera.base_directions()[3];
        assert!((args.apply(d) - d).length() < 1e-6);
        assert_eq!(args.origin, camera.position);

        // jitter stays within the tent's two-pixel support
        let mut sampler = Sampler::new(2);
        for _ in 0..100 {
            let args = camera.sample(PixelFilter::Tent, &mut sampler);
            let moved = args.apply(d);
            assert!(Vec3::dot(moved, d).min(1.0).acos() <= 1.5 * camera.pixel_angle());
        }
    }

    #[test]
    fn lens_samples_refocus_on_the_sharp_plane() {
        let camera = Camera::looking_at(Vec3::zero(), Vec3(0.0, 1.0, 0.0), 4, 4).with_depth_of_field(0.2, 3.0);
        let args = camera.sample(PixelFilter::None, &mut Sampler::new(5));
        assert!(args.dof_offset.length() > 0.0);
        let d = camera.base_directions()[5];
        let ray = args.apply(d);
        // the refocused ray meets the pinhole ray at the sharp distance
        let target = d * 3.0;
        let reached = args.origin + ray * (target - args.origin).length();
        assert!((reached - target).length() < 1e-4);
    }
}
