//! Per-pixel shading events.
//!
//! One bounce runs the stages in `ShaderStage` order over every pixel. The
//! surface stages share a single uniform (`prob`) that falls in exactly one
//! event band, so at most one of them acts on a given pixel.

use std::f32::consts::PI;

use crate::{
    geometry::Vec3,
    materials::{ColorProperty, MaterialView, ScalarProperty},
    sampling::{cosine_hemisphere, cranley_patterson, pixel_rotation, to_world, uniform_sphere, xorshift32},
};

use super::{
    kernels::{ShaderArgs, ShaderStage},
    ObjectFlags,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Reflection,
    Refraction,
    Diffuse,
    /// residual band: the path ends at this surface
    Absorbed,
}

/// Widths of the reflection, refraction and diffuse bands, summing to at most 1
pub fn event_bands(reflection: Vec3, transparency: Vec3, diffuse: Vec3) -> [f32; 3] {
    let bands = [reflection.mean(), transparency.mean(), diffuse.mean()].map(|b| b.max(0.0));
    let total: f32 = bands.iter().sum();
    if total > 1.0 {
        bands.map(|b| b / total)
    } else {
        bands
    }
}

/// The event whose band holds `prob`, with the band's width
pub fn select_event(prob: f32, bands: [f32; 3]) -> (SurfaceEvent, f32) {
    let events = [SurfaceEvent::Reflection, SurfaceEvent::Refraction, SurfaceEvent::Diffuse];
    let mut edge = 0.0;
    for (event, band) in events.into_iter().zip(bands) {
        edge += band;
        if prob < edge {
            return (event, band);
        }
    }
    (SurfaceEvent::Absorbed, 1.0 - edge)
}

/// One pixel's slice of the ray state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathState {
    pub pos: Vec3,
    pub ray: Vec3,
    pub normal: Vec3,
    pub isec_dist: f32,
    pub whichobject: u32,
    pub inside: u32,
    pub throughput: Vec3,
    pub prob: f32,
    pub shadow_mask: f32,
    pub suppress_emission: bool,
    pub handled: bool,
    pub rng_state: u32,
}

impl PathState {
    fn uniform(&mut self) -> f32 {
        xorshift32(&mut self.rng_state)
    }

    fn random_direction(&mut self) -> Vec3 {
        let (u1, u2) = (self.uniform(), self.uniform());
        uniform_sphere(u1, u2)
    }
}

/// Scene data every stage reads
#[derive(Clone, Copy, Debug)]
pub struct ShadingContext<'a> {
    pub materials: MaterialView<'a>,
    pub flags: &'a [u32],
    pub args: &'a ShaderArgs,
}

impl ShadingContext<'_> {
    fn color(&self, property: ColorProperty, id: u32) -> Vec3 {
        self.materials.color(property, id)
    }

    fn scalar(&self, property: ScalarProperty, id: u32) -> f32 {
        self.materials.scalar(property, id)
    }

    fn is_light(&self, id: u32) -> bool {
        self.flags
            .get(id as usize)
            .is_some_and(|&f| ObjectFlags::from_bits_truncate(f).contains(ObjectFlags::LIGHT))
    }
}

/// Runs one stage on one pixel; returns the radiance to add to its image slot
pub fn shade(stage: ShaderStage, state: &mut PathState, ctx: &ShadingContext, pixel: u32) -> Vec3 {
    match stage {
        ShaderStage::Volumetric => {
            volumetric(state, ctx);
            Vec3::zero()
        }
        ShaderStage::Emission => emission(state, ctx),
        ShaderStage::Reflection => {
            if surface_event(state, ctx) == Some(SurfaceEvent::Reflection) {
                reflect(state, ctx);
            }
            Vec3::zero()
        }
        ShaderStage::Refraction => {
            if surface_event(state, ctx) == Some(SurfaceEvent::Refraction) {
                refract(state, ctx);
            }
            Vec3::zero()
        }
        ShaderStage::Diffuse => match surface_event(state, ctx) {
            Some(SurfaceEvent::Diffuse) => diffuse(state, ctx, pixel),
            Some(SurfaceEvent::Absorbed) => {
                state.throughput = Vec3::zero();
                Vec3::zero()
            }
            _ => Vec3::zero(),
        },
    }
}

fn volumetric(state: &mut PathState, ctx: &ShadingContext) {
    let medium = state.inside;
    let mut distance = state.isec_dist;

    let scattering = ctx.scalar(ScalarProperty::VolumeScattering, medium);
    if scattering > 0.0 {
        let free_flight = -(1.0 - state.uniform()).ln() / scattering;
        if free_flight < distance {
            state.pos = state.pos - state.ray * (distance - free_flight);
            distance = free_flight;

            let blur = ctx.scalar(ScalarProperty::VolumeScatteringBlur, medium);
            let isotropic = state.random_direction();
            let blended = state.ray * (1.0 - blur) + isotropic * blur;
            state.ray = if blended.near_zero() { isotropic } else { Vec3::normalized(blended) };
            // scattered inside the medium, not on a surface
            state.whichobject = 0;
            state.handled = true;
        }
    }

    let absorption = ctx.color(ColorProperty::VolumeAbsorption, medium);
    state.throughput *= Vec3::exp(absorption * -distance);
}

fn emission(state: &mut PathState, ctx: &ShadingContext) -> Vec3 {
    let suppressed = std::mem::take(&mut state.suppress_emission);
    if state.handled {
        return Vec3::zero();
    }

    let id = state.whichobject;
    if id == 0 {
        let sky = state.throughput * ctx.color(ColorProperty::Emission, 0);
        state.throughput = Vec3::zero();
        state.handled = true;
        return sky;
    }
    if suppressed && ctx.is_light(id) {
        return Vec3::zero();
    }
    state.throughput * ctx.color(ColorProperty::Emission, id)
}

fn surface_event(state: &PathState, ctx: &ShadingContext) -> Option<SurfaceEvent> {
    if state.handled || state.whichobject == 0 {
        return None;
    }
    let id = state.whichobject;
    let bands = event_bands(
        ctx.color(ColorProperty::Reflection, id),
        ctx.color(ColorProperty::Transparency, id),
        ctx.color(ColorProperty::Diffuse, id),
    );
    Some(select_event(state.prob, bands).0)
}

fn band_weight(state: &PathState, ctx: &ShadingContext, color: ColorProperty) -> Vec3 {
    let id = state.whichobject;
    let bands = event_bands(
        ctx.color(ColorProperty::Reflection, id),
        ctx.color(ColorProperty::Transparency, id),
        ctx.color(ColorProperty::Diffuse, id),
    );
    let (_, band) = select_event(state.prob, bands);
    ctx.color(color, id) / band
}

/// Perturbs `dir` by `blur` and keeps it on the side `side` points to
fn blurred(state: &mut PathState, dir: Vec3, blur: f32, side: Vec3) -> Vec3 {
    if blur <= 0.0 {
        return dir;
    }
    let mut out = Vec3::normalized(dir + state.random_direction() * blur);
    let d = Vec3::dot(out, side);
    if d < 0.0 {
        out = out - 2.0 * d * side;
    }
    out
}

fn reflect(state: &mut PathState, ctx: &ShadingContext) {
    let weight = band_weight(state, ctx, ColorProperty::Reflection);
    state.throughput *= weight;
    let n = state.normal;
    let mirror = Vec3::reflect(state.ray, n);
    let blur = ctx.scalar(ScalarProperty::ReflectionBlur, state.whichobject);
    state.ray = blurred(state, mirror, blur, n);
}

fn refract(state: &mut PathState, ctx: &ShadingContext) {
    let weight = band_weight(state, ctx, ColorProperty::Transparency);
    state.throughput *= weight;
    let id = state.whichobject;
    let n = state.normal;

    let (from, to) = if state.inside == id { (id, ctx.args.root_id) } else { (state.inside, id) };
    let eta = ctx.scalar(ScalarProperty::Ior, from) / ctx.scalar(ScalarProperty::Ior, to);

    match Vec3::refract(state.ray, n, eta) {
        Some(dir) => {
            let blur = ctx.scalar(ScalarProperty::TransparencyBlur, id);
            state.ray = blurred(state, dir, blur, -n);
            state.inside = to;
        }
        // total internal reflection
        None => state.ray = Vec3::reflect(state.ray, n),
    }
}

fn diffuse(state: &mut PathState, ctx: &ShadingContext, pixel: u32) -> Vec3 {
    let weight = band_weight(state, ctx, ColorProperty::Diffuse);
    state.throughput *= weight;
    let n = state.normal;
    let args = ctx.args;

    let (u1, u2) = if args.quasirandom && args.bounce == 0 {
        cranley_patterson(args.quasi_point, pixel_rotation(pixel, args.rotation_seed))
    } else {
        (state.uniform(), state.uniform())
    };
    state.ray = to_world(cosine_hemisphere(u1, u2), n);

    if args.light_id == 0 {
        return Vec3::zero();
    }
    state.suppress_emission = true;

    let to_light = args.light_point - state.pos;
    let d2 = to_light.square_magnitude();
    let w = to_light / d2.sqrt();
    let cos_x = Vec3::dot(n, w);
    let cos_y = -Vec3::dot(args.light_normal, w);
    if cos_x <= 0.0 || cos_y <= 0.0 || state.shadow_mask <= 0.0 {
        return Vec3::zero();
    }
    let le = ctx.color(ColorProperty::Emission, args.light_id);
    state.throughput * le * (cos_x * cos_y * args.light_area * args.light_count / (PI * d2) * state.shadow_mask)
}

#[cfg(test)]
mod tests {
    use crate::materials::{Material, MaterialTable};

    use super::*;

    fn args() -> ShaderArgs {
        ShaderArgs {
            bounce: 1,
            root_id: 0,
            light_id: 0,
            light_area: 0.0,
            light_count: 0.0,
            light_point: Vec3::zero(),
            light_normal: Vec3::zero(),
            quasi_point: (0.0, 0.0),
            quasirandom: false,
            rotation_seed: 0,
        }
    }

    fn state(whichobject: u32, prob: f32) -> PathState {
        PathState {
            pos: Vec3::zero(),
            ray: Vec3(0.0, 0.0, -1.0),
            normal: Vec3(0.0, 0.0, 1.0),
            isec_dist: 1.0,
            whichobject,
            inside: 0,
            throughput: Vec3::splat(1.0),
            prob,
            shadow_mask: 1.0,
            suppress_emission: false,
            handled: false,
            rng_state: 12345,
        }
    }

    #[test]
    fn bands_are_normalized_past_one() {
        let bands = event_bands(Vec3::splat(0.7), Vec3::splat(0.7), Vec3::splat(0.6));
        assert!((bands.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(select_event(0.99, bands).0, SurfaceEvent::Diffuse);

        let mirror = event_bands(Vec3::splat(0.7), Vec3::zero(), Vec3::splat(0.2));
        assert_eq!(select_event(0.5, mirror), (SurfaceEvent::Reflection, 0.7));
        assert_eq!(select_event(0.8, mirror).0, SurfaceEvent::Diffuse);
        let (event, band) = select_event(0.95, mirror);
        assert_eq!(event, SurfaceEvent::Absorbed);
        assert!((band - 0.1).abs() < 1e-6);
    }

    #[test]
    fn exactly_one_surface_stage_acts() {
        let table = MaterialTable::new(&Material::default_medium(), &[Material::preset("mirror").unwrap()]);
        let flags = [0, 0];
        let args = args();
        let ctx = ShadingContext { materials: table.view(), flags: &flags, args: &args };

        let mut s = state(1, 0.3);
        for stage in ShaderStage::ALL {
            shade(stage, &mut s, &ctx, 0);
        }
        // mirror reflection off the floor, weighted by color / band
        assert_eq!(s.ray, Vec3(0.0, 0.0, 1.0));
        assert!((s.throughput - Vec3::splat(1.0)).length() < 1e-6);

        let mut absorbed = state(1, 0.95);
        for stage in ShaderStage::ALL {
            shade(stage, &mut absorbed, &ctx, 0);
        }
        assert_eq!(absorbed.throughput, Vec3::zero());
    }

    #[test]
    fn refraction_enters_and_leaves() {
        let table = MaterialTable::new(&Material::default_medium(), &[Material {
            transparency: Vec3::splat(1.0),
            ior: 1.5,
            ..Default::default()
        }]);
        let flags = [0, 0];
        let args = args();
        let ctx = ShadingContext { materials: table.view(), flags: &flags, args: &args };

        let mut s = state(1, 0.5);
        s.ray = Vec3::normalized(Vec3(1.0, 0.0, -1.0));
        shade(ShaderStage::Refraction, &mut s, &ctx, 0);
        assert_eq!(s.inside, 1);
        assert!(s.ray.2 < 0.0);
        // bent toward the normal
        assert!(s.ray.0 < std::f32::consts::FRAC_1_SQRT_2);

        // grazing exit reflects internally
        let mut out = state(1, 0.5);
        out.inside = 1;
        out.ray = Vec3::normalized(Vec3(1.0, 0.0, -0.2));
        shade(ShaderStage::Refraction, &mut out, &ctx, 0);
        assert_eq!(out.inside, 1);
        assert!(out.ray.2 > 0.0);
    }

    #[test]
    fn misses_collect_the_medium_emission() {
        let medium = Material { emission: Vec3::splat(0.5), ..Material::default_medium() };
        let table = MaterialTable::new(&medium, &[]);
        let flags = [0];
        let args = args();
        let ctx = ShadingContext { materials: table.view(), flags: &flags, args: &args };

        let mut s = state(0, 0.5);
        s.throughput = Vec3::splat(2.0);
        shade(ShaderStage::Volumetric, &mut s, &ctx, 0);
        let added = shade(ShaderStage::Emission, &mut s, &ctx, 0);
        assert_eq!(added, Vec3::splat(1.0));
        assert_eq!(s.throughput, Vec3::zero());
        assert!(s.handled);
    }

    #[test]
    fn beer_lambert_and_suppressed_lights() {
        let fog = Material { volume_absorption: Vec3(1.0, 0.0, 0.0), ..Default::default() };
        let light = Material::preset("light").unwrap();
        let table = MaterialTable::new(&fog, &[light]);
        let flags = [0, ObjectFlags::LIGHT.bits()];
        let args = args();
        let ctx = ShadingContext { materials: table.view(), flags: &flags, args: &args };

        let mut s = state(1, 0.5);
        s.isec_dist = 2.0;
        s.suppress_emission = true;
        shade(ShaderStage::Volumetric, &mut s, &ctx, 0);
        assert!((s.throughput.0 - (-2f32).exp()).abs() < 1e-6);
        assert_eq!(s.throughput.1, 1.0);
        assert_eq!(shade(ShaderStage::Emission, &mut s, &ctx, 0), Vec3::zero());
        assert!(!s.suppress_emission);

        let seen = shade(ShaderStage::Emission, &mut s, &ctx, 0);
        assert!(seen.0 > 0.0);
    }

    #[test]
    fn next_event_estimate_matches_the_point_light_formula() {
        let table = MaterialTable::new(&Material::default_medium(), &[
            Material::diffuse(Vec3::splat(0.5)),
            Material::preset("light").unwrap(),
        ]);
        let flags = [0, 0, ObjectFlags::LIGHT.bits()];
        let args = ShaderArgs {
            light_id: 2,
            light_area: 0.5,
            light_count: 1.0,
            light_point: Vec3(0.0, 0.0, 2.0),
            light_normal: Vec3(0.0, 0.0, -1.0),
            ..args()
        };
        let ctx = ShadingContext { materials: table.view(), flags: &flags, args: &args };

        let mut s = state(1, 0.1);
        let added = shade(ShaderStage::Diffuse, &mut s, &ctx, 0);
        // throughput 0.5 / 0.5, cosines 1, d^2 = 4
        let expected = Vec3(4.0, 2.0, 0.7) * (0.5 / (PI * 4.0));
        assert!((added - expected).length() < 1e-5);
        assert!(s.suppress_emission);
        assert!(Vec3::dot(s.ray, s.normal) >= 0.0);

        let mut blocked = state(1, 0.1);
        blocked.shadow_mask = 0.0;
        assert_eq!(shade(ShaderStage::Diffuse, &mut blocked, &ctx, 0), Vec3::zero());
    }
}
