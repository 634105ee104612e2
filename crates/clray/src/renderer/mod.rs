use bitflags::bitflags;

use crate::{error::SceneError, geometry::Vec3};

pub mod bsdf;
pub mod integrator;
pub mod kernels;

pub use integrator::{Integrator, RussianRoulette, RouletteDecision};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// sampled for next-event estimation
        const LIGHT = 1 << 0;
        /// normals are turned against the incoming ray
        const AUTO_FLIP_NORMAL = 1 << 1;
    }
}

/// Subpixel jitter of the camera rays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFilter {
    #[default]
    Tent,
    Box,
    /// every sample goes through the pixel center
    None,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub samples_per_pixel: u32,
    pub min_bounces: u32,
    pub max_bounces: u32,
    pub russian_roulette_prob: f32,
    pub max_ray_length: f32,

    pub pixel_filter: PixelFilter,
    /// Fermat spiral directions for the first diffuse bounce
    pub quasirandom: bool,
    /// next-event estimation toward flagged lights, when the scene has any
    pub bidirectional: bool,
    /// reuse the first hit across samples; needs a static camera
    pub cache_first_bounce: bool,

    pub seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            samples_per_pixel: 10000,
            min_bounces: 3,
            max_bounces: 4,
            russian_roulette_prob: 0.3,
            max_ray_length: 100.0,

            pixel_filter: PixelFilter::Tent,
            quasirandom: true,
            bidirectional: true,
            cache_first_bounce: false,

            seed: 0,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.max_bounces == 0 {
            return Err(SceneError::InvalidSettings("max_bounces must be at least 1".into()));
        }
        if self.min_bounces > self.max_bounces {
            return Err(SceneError::InvalidSettings(format!(
                "min_bounces {} exceeds max_bounces {}",
                self.min_bounces, self.max_bounces
            )));
        }
        if !(0.0..1.0).contains(&self.russian_roulette_prob) {
            return Err(SceneError::InvalidSettings(format!(
                "russian roulette probability {} is outside [0, 1)",
                self.russian_roulette_prob
            )));
        }
        if !(self.max_ray_length > 0.0) {
            return Err(SceneError::InvalidSettings("max_ray_length must be positive".into()));
        }
        Ok(())
    }
}

/// Accumulated radiance; every sample adds one estimate per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    /// running sum, row-major
    pub data: Vec<Vec3>,
}

impl Image {
    /// Per-pixel estimate: the running sum over the sample count
    pub fn averaged(&self) -> Vec<Vec3> {
        let scale = 1.0 / self.samples.max(1) as f32;
        self.data.iter().map(|&v| v * scale).collect()
    }

    /// Mean channel value of the running sum
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|v| v.mean()).sum::<f32>() / self.data.len() as f32
    }

    pub fn is_finite_and_non_negative(&self) -> bool {
        self.data.iter().all(|v| v.is_finite() && v.0 >= 0.0 && v.1 >= 0.0 && v.2 >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        RenderSettings::default().validate().unwrap();

        let bad = RenderSettings { min_bounces: 5, ..Default::default() };
        assert!(matches!(bad.validate(), Err(SceneError::InvalidSettings(_))));
        let bad = RenderSettings { russian_roulette_prob: 1.0, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn averaged_divides_by_samples() {
        let image = Image { width: 2, height: 1, samples: 4, data: vec![Vec3(4.0, 8.0, 0.0), Vec3::splat(2.0)] };
        assert_eq!(image.averaged(), vec![Vec3(1.0, 2.0, 0.0), Vec3::splat(0.5)]);
        assert!((image.mean() - 3.0).abs() < 1e-6);
        assert!(image.is_finite_and_non_negative());
    }
}
