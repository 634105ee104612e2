//! Host versions of the registry kernels, one loop over the pixels each.

use clray::{
    compiler::Template,
    geometry::Vec3,
    renderer::{
        bsdf::{shade, PathState, ShadingContext},
        kernels::{CameraTransformArgs, GroupRange, ShaderArgs, ShaderStage, ShadowArgs},
        ObjectFlags,
    },
    sampling::xorshift32,
    shapes::RayQuery,
};

use crate::state::RayState;

/// Shadow rays stop this far short of the light point
const SHADOW_EPSILON: f32 = 1e-5;

pub fn trace(state: &mut RayState, template: &Template, id: u32) {
    for px in 0..state.pos.len() {
        let query = RayQuery {
            origin: state.pos[px],
            ray: state.ray[px],
            old_isec_dist: state.isec_dist[px],
            inside: state.inside[px] == id,
            origin_self: state.last_whichobject[px] == id,
            last_subobject: state.last_which_subobject[px],
        };
        let mut params = state.scene.params(id);
        if let Some(hit) = template.intersect(&mut params, &query) {
            if hit.distance < state.isec_dist[px] {
                state.isec_dist[px] = hit.distance;
                state.whichobject[px] = id;
                state.which_subobject[px] = hit.subobject;
            }
        }
    }
}

pub fn advance(state: &mut RayState) {
    for px in 0..state.pos.len() {
        if state.whichobject[px] != 0 {
            state.pos[px] += state.ray[px] * state.isec_dist[px];
        }
    }
}

pub fn normal(state: &mut RayState, template: &Template, range: GroupRange) {
    for px in 0..state.pos.len() {
        let id = state.whichobject[px];
        if !range.contains(id) {
            continue;
        }
        let mut params = state.scene.params(id);
        let mut n = template.normal(&mut params, state.pos[px], state.which_subobject[px]);
        if state.inside[px] == id {
            n = -n;
        }
        let flags = ObjectFlags::from_bits_truncate(state.scene.flags(id));
        if flags.contains(ObjectFlags::AUTO_FLIP_NORMAL) && Vec3::dot(n, state.ray[px]) > 0.0 {
            n = -n;
        }
        state.normal[px] = n;
    }
}

pub fn shadow(state: &mut RayState, template: &Template, args: ShadowArgs) {
    for px in 0..state.pos.len() {
        if state.whichobject[px] == 0 || state.shadow_mask[px] <= 0.0 {
            continue;
        }
        let to_light = args.light_point - state.pos[px];
        if Vec3::dot(state.normal[px], to_light) < 0.0 {
            state.shadow_mask[px] = 0.0;
            continue;
        }
        let distance = to_light.length();
        let query = RayQuery {
            origin: state.pos[px],
            ray: to_light / distance,
            old_isec_dist: distance - SHADOW_EPSILON,
            inside: state.inside[px] == args.object_id,
            origin_self: state.whichobject[px] == args.object_id,
            last_subobject: state.which_subobject[px],
        };
        let mut params = state.scene.params(args.object_id);
        if template.intersect(&mut params, &query).is_some() {
            state.shadow_mask[px] = 0.0;
        }
    }
}

pub fn camera_transform(state: &mut RayState, args: CameraTransformArgs) {
    for px in 0..state.pos.len() {
        state.pos[px] = args.origin;
        state.ray[px] = args.apply(state.camera_dirs[px]);
    }
}

pub fn draw_uniform(state: &mut RayState) {
    for (prob, rng) in state.prob.iter_mut().zip(state.rng_state.iter_mut()) {
        *prob = xorshift32(rng);
    }
}

pub fn scale_color(state: &mut RayState, factor: f32) {
    for throughput in state.throughput.iter_mut() {
        *throughput *= factor;
    }
}

pub fn shader(state: &mut RayState, stage: ShaderStage, args: &ShaderArgs) {
    let ctx = ShadingContext {
        materials: state.scene.materials(),
        flags: state.scene.object_flags,
        args,
    };
    for px in 0..state.pos.len() {
        let mut path = PathState {
            pos: state.pos[px],
            ray: state.ray[px],
            normal: state.normal[px],
            isec_dist: state.isec_dist[px],
            whichobject: state.whichobject[px],
            inside: state.inside[px],
            throughput: state.throughput[px],
            prob: state.prob[px],
            shadow_mask: state.shadow_mask[px],
            suppress_emission: state.suppress_emission[px] != 0,
            handled: state.handled[px] != 0,
            rng_state: state.rng_state[px],
        };
        let radiance = shade(stage, &mut path, &ctx, px as u32);

        state.pos[px] = path.pos;
        state.ray[px] = path.ray;
        state.normal[px] = path.normal;
        state.isec_dist[px] = path.isec_dist;
        state.whichobject[px] = path.whichobject;
        state.inside[px] = path.inside;
        state.throughput[px] = path.throughput;
        state.prob[px] = path.prob;
        state.shadow_mask[px] = path.shadow_mask;
        state.suppress_emission[px] = path.suppress_emission as u32;
        state.handled[px] = path.handled as u32;
        state.rng_state[px] = path.rng_state;
        state.image[px] += radiance;
    }
}
