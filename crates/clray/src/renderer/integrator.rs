//! Host-side orchestration of one render.
//!
//! Each sample shoots one camera ray per pixel and follows it for up to
//! `max_bounces` hits. Every step is a dispatch on the back-end; the host
//! only draws the per-sample random numbers (camera jitter, light choice,
//! roulette) that are shared by all pixels.

use tracing::{debug, info, warn};

use crate::{
    backend::{Buffer, BufferData, ComputeBackend, DType, Scalar},
    error::{BackendError, RenderError},
    geometry::Vec3,
    sampling::{fermat_spiral, Sampler},
    scene::{Camera, CompiledScene, SceneLight},
};

use super::{
    kernels::{
        Bundle, BundleSlot, ShaderArgs, ShaderStage, ShadowArgs, ADVANCE_RAYS, CAMERA_TRANSFORM, DRAW_UNIFORM,
        SCALE_COLOR,
    },
    Image, PixelFilter, RenderSettings,
};

/// Slots restored from the first-bounce cache
const CACHED_SLOTS: [BundleSlot; 9] = [
    BundleSlot::Pos,
    BundleSlot::Ray,
    BundleSlot::Normal,
    BundleSlot::IsecDist,
    BundleSlot::WhichObject,
    BundleSlot::WhichSubobject,
    BundleSlot::LastWhichObject,
    BundleSlot::LastWhichSubobject,
    BundleSlot::Inside,
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RussianRoulette {
    /// bounces that always continue
    pub min_bounces: u32,
    pub max_bounces: u32,
    /// termination probability once past `min_bounces`
    pub probability: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouletteDecision {
    /// the path ends after this bounce's emission
    pub is_last: bool,
    /// throughput factor for the surviving path
    pub scale: f32,
}

impl RussianRoulette {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        RussianRoulette {
            min_bounces: settings.min_bounces,
            max_bounces: settings.max_bounces,
            probability: settings.russian_roulette_prob,
        }
    }

    pub fn decide(&self, bounce: u32, u: f32) -> RouletteDecision {
        if bounce + 1 >= self.max_bounces {
            return RouletteDecision { is_last: true, scale: 1.0 };
        }
        if bounce < self.min_bounces {
            return RouletteDecision { is_last: false, scale: 1.0 };
        }
        if u < self.probability {
            RouletteDecision { is_last: true, scale: 1.0 }
        } else {
            RouletteDecision { is_last: false, scale: 1.0 / (1.0 - self.probability) }
        }
    }
}

struct FirstBounceCache {
    buffers: Vec<Buffer>,
    filled: bool,
}

/// Light picked for one bounce of next-event estimation
struct LightSample {
    id: u32,
    area: f32,
    point: Vec3,
    normal: Vec3,
}

pub struct Integrator<'b, B: ComputeBackend + ?Sized> {
    backend: &'b mut B,
    scene: &'b CompiledScene,
    camera: Camera,
    settings: RenderSettings,
    roulette: RussianRoulette,
    bundle: Bundle,
    sampler: Sampler,
    cache: Option<FirstBounceCache>,
    rotation_seed: u32,
    pixels: usize,
    samples: u32,
}

impl<'b, B: ComputeBackend + ?Sized> Integrator<'b, B> {
    /// Builds the scene program on `backend` and allocates the ray state
    pub fn new(
        backend: &'b mut B,
        scene: &'b CompiledScene,
        camera: &Camera,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        settings.validate()?;
        backend.build_program(&scene.program)?;

        let pixels = camera.pixel_count();
        let mut sampler = Sampler::new(settings.seed);

        let mut buffers = Vec::with_capacity(BundleSlot::ALL.len());
        for &slot in BundleSlot::ALL {
            let buffer = match slot {
                BundleSlot::CameraDirs => backend.upload_constant(BufferData::Vec3(camera.base_directions()))?,
                BundleSlot::RngState => backend.upload_constant(BufferData::U32(sampler.pixel_states(pixels)))?,
                _ => match scene.slot_data(slot) {
                    Some(data) => backend.upload_constant(data)?,
                    None => backend.allocate(pixels, slot.dtype(), true)?,
                },
            };
            buffers.push(buffer);
        }
        let bundle = Bundle::new(buffers)?;

        let cache = if !settings.cache_first_bounce {
            None
        } else if settings.pixel_filter != PixelFilter::None || camera.jitters() {
            warn!("first-bounce cache needs a fixed camera ray per pixel, disabling it");
            None
        } else {
            let buffers = CACHED_SLOTS
                .iter()
                .map(|slot| backend.allocate(pixels, slot.dtype(), false))
                .collect::<Result<Vec<_>, _>>()?;
            Some(FirstBounceCache { buffers, filled: false })
        };

        info!(
            "integrator: {}x{} pixels, bounces {}..{}, {} lights{}",
            camera.width,
            camera.height,
            settings.min_bounces,
            settings.max_bounces,
            scene.lights.len(),
            if cache.is_some() { ", first bounce cached" } else { "" }
        );

        Ok(Integrator {
            rotation_seed: sampler.next_u32(),
            roulette: RussianRoulette::from_settings(&settings),
            backend,
            scene,
            camera: camera.clone(),
            settings,
            bundle,
            sampler,
            cache,
            pixels,
            samples: 0,
        })
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn buffer(&self, slot: BundleSlot) -> Buffer {
        self.bundle.get(slot)
    }

    fn dispatch(&mut self, kernel: &str, scalars: &[Scalar]) -> Result<(), BackendError> {
        self.backend.dispatch(kernel, self.pixels, self.bundle.buffers(), scalars)
    }

    fn fill(&mut self, slot: BundleSlot, value: Scalar) -> Result<(), BackendError> {
        let buffer = self.buffer(slot);
        self.backend.fill(buffer, value)
    }

    fn copy(&mut self, dst: BundleSlot, src: BundleSlot) -> Result<(), BackendError> {
        let (dst, src) = (self.buffer(dst), self.buffer(src));
        self.backend.copy(dst, src)
    }

    /// Nearest hit of every ray, then the position and normal there
    fn trace(&mut self) -> Result<(), BackendError> {
        self.fill(BundleSlot::IsecDist, Scalar::F32(self.settings.max_ray_length))?;
        self.copy(BundleSlot::LastWhichObject, BundleSlot::WhichObject)?;
        self.copy(BundleSlot::LastWhichSubobject, BundleSlot::WhichSubobject)?;
        self.fill(BundleSlot::WhichObject, Scalar::U32(0))?;

        let scene = self.scene;
        for group in &scene.groups {
            for id in group.ids() {
                self.dispatch(&group.trace_kernel, &[Scalar::U32(id)])?;
            }
        }
        self.dispatch(ADVANCE_RAYS, &[])?;
        for group in &scene.groups {
            self.dispatch(&group.normal_kernel, &group.range.to_scalars())?;
        }
        Ok(())
    }

    fn first_bounce(&mut self) -> Result<(), BackendError> {
        let (cache, filled) = match &self.cache {
            Some(cache) => (cache.buffers.clone(), cache.filled),
            None => return self.trace(),
        };
        let live: Vec<Buffer> = CACHED_SLOTS.iter().map(|&s| self.buffer(s)).collect();

        if filled {
            for (dst, src) in live.into_iter().zip(cache) {
                self.backend.copy(dst, src)?;
            }
            return Ok(());
        }

        self.trace()?;
        for (dst, src) in cache.into_iter().zip(live) {
            self.backend.copy(dst, src)?;
        }
        if let Some(cache) = &mut self.cache {
            cache.filled = true;
        }
        Ok(())
    }

    /// Picks a light and masks out pixels that cannot see the sampled point
    fn sample_light(&mut self) -> Result<Option<LightSample>, BackendError> {
        let scene = self.scene;
        if scene.lights.is_empty() {
            return Ok(None);
        }
        let light: &SceneLight = &scene.lights[self.sampler.index(scene.lights.len())];
        let (u1, u2) = (self.sampler.uniform(), self.sampler.uniform());
        let Some((point, normal)) = light.shape.sample_surface(u1, u2) else {
            return Ok(None);
        };

        self.fill(BundleSlot::ShadowMask, Scalar::F32(1.0))?;
        for group in &scene.groups {
            for object_id in group.ids().filter(|&id| id != light.id) {
                let args = ShadowArgs { object_id, light_id: light.id, light_point: point };
                self.dispatch(&group.shadow_kernel, &args.to_scalars())?;
            }
        }
        Ok(Some(LightSample { id: light.id, area: light.area, point, normal }))
    }

    pub fn render_sample(&mut self) -> Result<(), RenderError> {
        let cached = self.cache.as_ref().is_some_and(|c| c.filled);
        if !cached {
            let args = self.camera.sample(self.settings.pixel_filter, &mut self.sampler);
            self.dispatch(CAMERA_TRANSFORM, &args.to_scalars())?;
        }

        self.fill(BundleSlot::Inside, Scalar::U32(self.scene.root_id))?;
        self.fill(BundleSlot::Throughput, Scalar::Vec3(Vec3::splat(1.0)))?;
        self.fill(BundleSlot::WhichObject, Scalar::U32(0))?;
        self.fill(BundleSlot::WhichSubobject, Scalar::U32(0))?;
        self.fill(BundleSlot::Normal, Scalar::Vec3(Vec3::zero()))?;
        self.fill(BundleSlot::SuppressEmission, Scalar::U32(0))?;

        let quasi_point = fermat_spiral(self.samples, self.settings.samples_per_pixel);

        for bounce in 0..self.settings.max_bounces {
            self.fill(BundleSlot::Handled, Scalar::U32(0))?;
            if bounce == 0 {
                self.first_bounce()?;
            } else {
                self.trace()?;
            }

            let decision = self.roulette.decide(bounce, self.sampler.uniform());
            let light = if self.settings.bidirectional && !decision.is_last {
                self.sample_light()?
            } else {
                None
            };

            let args = ShaderArgs {
                bounce,
                root_id: self.scene.root_id,
                light_id: light.as_ref().map_or(0, |l| l.id),
                light_area: light.as_ref().map_or(0.0, |l| l.area),
                light_count: self.scene.lights.len() as f32,
                light_point: light.as_ref().map_or(Vec3::zero(), |l| l.point),
                light_normal: light.as_ref().map_or(Vec3::zero(), |l| l.normal),
                quasi_point,
                quasirandom: self.settings.quasirandom,
                rotation_seed: self.rotation_seed,
            };
            let scalars = args.to_scalars();

            self.dispatch(DRAW_UNIFORM, &[])?;
            self.dispatch(&ShaderStage::Volumetric.kernel_name(), &scalars)?;
            self.dispatch(&ShaderStage::Emission.kernel_name(), &scalars)?;
            if decision.is_last {
                break;
            }
            if decision.scale != 1.0 {
                self.dispatch(SCALE_COLOR, &[Scalar::F32(decision.scale)])?;
            }
            for stage in [ShaderStage::Reflection, ShaderStage::Refraction, ShaderStage::Diffuse] {
                self.dispatch(&stage.kernel_name(), &scalars)?;
            }
        }

        self.samples += 1;
        debug!("sample {}/{}", self.samples, self.settings.samples_per_pixel);
        Ok(())
    }

    /// Adds `samples` more samples and returns the accumulated image
    pub fn render(&mut self, samples: u32) -> Result<Image, RenderError> {
        for _ in 0..samples {
            self.render_sample()?;
        }
        self.backend.synchronize()?;
        let image = self.image()?;
        info!("rendered {} samples, mean {:.4}", self.samples, image.mean() / self.samples.max(1) as f32);
        Ok(image)
    }

    /// Reads back the running sum
    pub fn image(&mut self) -> Result<Image, RenderError> {
        let buffer = self.buffer(BundleSlot::Image);
        let data = match self.backend.read(buffer)? {
            BufferData::Vec3(data) => data,
            other => {
                return Err(BackendError::TypeMismatch { buffer: buffer.id, expected: DType::Vec3, found: other.dtype() }
                    .into())
            }
        };
        let image = Image { width: self.camera.width, height: self.camera.height, samples: self.samples, data };
        if !image.is_finite_and_non_negative() {
            warn!("image holds non-finite or negative samples");
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roulette_is_unbiased() {
        let roulette = RussianRoulette { min_bounces: 1, max_bounces: 6, probability: 0.3 };
        let mut sampler = Sampler::new(7);
        let trials = 100_000;

        let mut total = 0.0f64;
        for _ in 0..trials {
            let mut throughput = 1.0f32;
            for bounce in 0..roulette.max_bounces {
                total += throughput as f64;
                let decision = roulette.decide(bounce, sampler.uniform());
                if decision.is_last {
                    break;
                }
                throughput *= decision.scale;
            }
        }
        let mean = total / trials as f64;
        assert!((mean - 6.0).abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn roulette_respects_the_bounce_limits() {
        let roulette = RussianRoulette { min_bounces: 2, max_bounces: 4, probability: 0.3 };
        assert_eq!(roulette.decide(0, 0.0), RouletteDecision { is_last: false, scale: 1.0 });
        assert_eq!(roulette.decide(1, 0.0), RouletteDecision { is_last: false, scale: 1.0 });
        assert!(roulette.decide(2, 0.1).is_last);
        let survived = roulette.decide(2, 0.9);
        assert!(!survived.is_last);
        assert!((survived.scale - 1.0 / 0.7).abs() < 1e-6);
        assert!(roulette.decide(3, 0.9).is_last);
    }
}
