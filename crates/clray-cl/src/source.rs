//! OpenCL C source for a compiled scene program.
//!
//! The source is assembled in dependency order: a generated header with the
//! table constants and the bundle parameter list, the helper prelude, every
//! scene procedure, the generated per-procedure kernels and finally the
//! static kernels.

use std::fmt::Write;

use clray::{
    accel::octree::{EMPTY, STACK_SIZE},
    backend::DType,
    materials::{ColorProperty, ScalarProperty},
    renderer::{
        kernels::{BundleSlot, KernelDescriptor, Program},
        ObjectFlags,
    },
};

const PRELUDE: &str = include_str!("../cl/prelude.cl");
const KERNELS: &str = include_str!("../cl/kernels.cl");

fn cl_type(dtype: DType) -> &'static str {
    match dtype {
        DType::F32 => "float",
        DType::U32 => "uint",
        DType::I32 => "int",
        DType::Vec3 => "float3",
    }
}

/// Kernel parameter declaration of a bundle slot
pub fn slot_param(slot: BundleSlot) -> String {
    let qualifier = if slot.is_per_pixel() { "" } else { "const " };
    format!("__global {qualifier}{} *{}", cl_type(slot.dtype()), slot.name())
}

fn header(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#define OCTREE_STACK_SIZE {STACK_SIZE}");
    let _ = writeln!(out, "#define OCTREE_EMPTY 0x{EMPTY:x}u");
    let _ = writeln!(out, "#define MATERIAL_ROWS {}u", program.material_rows);
    let _ = writeln!(out, "#define OBJECT_FLAG_LIGHT {}u", ObjectFlags::LIGHT.bits());
    for property in ColorProperty::ALL {
        let _ = writeln!(out, "#define COLOR_{} {}", property.constant_name(), property.index());
    }
    for property in ScalarProperty::ALL {
        let _ = writeln!(out, "#define SCALAR_{} {}", property.constant_name(), property.index());
    }

    let params: Vec<String> = BundleSlot::ALL.iter().map(|&s| slot_param(s)).collect();
    let args: Vec<&str> = BundleSlot::ALL.iter().map(|s| s.name()).collect();
    let _ = writeln!(out, "#define BUNDLE_PARAMS {}", params.join(", "));
    let _ = writeln!(out, "#define BUNDLE_ARGS {}", args.join(", "));
    out
}

/// Pointer arguments of object `id`'s parameter rows
const OBJECT_PARAMS: &str = "params_f32 + off.x, params_i32 + off.y, aux_vec + off.z, aux_int + off.w";

fn trace_kernel(name: &str, procedure: &str) -> String {
    format!(
        "__kernel void {name}(BUNDLE_PARAMS, const uint id) {{
    const size_t px = get_global_id(0);
    const int4 off = vload4(id, param_offsets);
    float dist;
    uint sub;
    if ({procedure}(pos[px], ray[px], isec_dist[px], inside[px] == id, last_whichobject[px] == id,
            last_which_subobject[px], {OBJECT_PARAMS}, &dist, &sub) && dist < isec_dist[px]) {{
        isec_dist[px] = dist;
        whichobject[px] = id;
        which_subobject[px] = sub;
    }}
}}
"
    )
}

fn normal_kernel(name: &str, procedure: &str) -> String {
    format!(
        "__kernel void {name}(BUNDLE_PARAMS, const uint first, const uint count) {{
    const size_t px = get_global_id(0);
    const uint id = whichobject[px];
    if (id < first || id >= first + count) return;
    const int4 off = vload4(id, param_offsets);
    float3 n = {procedure}(pos[px], which_subobject[px], {OBJECT_PARAMS});
    if (inside[px] == id) n = -n;
    if ((object_flags[id] & {flip}u) && dot(n, ray[px]) > 0.0f) n = -n;
    normal[px] = n;
}}
",
        flip = ObjectFlags::AUTO_FLIP_NORMAL.bits(),
    )
}

/// Shadow rays stop this far short of the light point
pub const SHADOW_EPSILON: f32 = 1e-5;

fn shadow_kernel(name: &str, procedure: &str) -> String {
    format!(
        "__kernel void {name}(BUNDLE_PARAMS, const uint object_id, const uint light_id, const float3 light_point) {{
    const size_t px = get_global_id(0);
    if (whichobject[px] == 0u || shadow_mask[px] <= 0.0f) return;
    const float3 to_light = light_point - pos[px];
    if (dot(normal[px], to_light) < 0.0f) {{
        shadow_mask[px] = 0.0f;
        return;
    }}
    const float seg_len = length(to_light);
    const int4 off = vload4(object_id, param_offsets);
    float dist;
    uint sub;
    if ({procedure}(pos[px], to_light / seg_len, seg_len - {epsilon}, inside[px] == object_id,
            whichobject[px] == object_id, which_subobject[px], {OBJECT_PARAMS}, &dist, &sub)) {{
        shadow_mask[px] = 0.0f;
    }}
}}
",
        epsilon = clray::compiler::emit::float_literal(SHADOW_EPSILON),
    )
}

/// Complete program source for `program`
pub fn program_source(program: &Program) -> String {
    let mut out = header(program);
    out.push('\n');
    out.push_str(PRELUDE);
    out.push('\n');

    // prototypes first, so definitions may appear in any order
    for procedure in program.procedures.iter() {
        let _ = writeln!(out, "{};", procedure.signature());
    }
    out.push('\n');
    for procedure in program.procedures.iter() {
        out.push_str(&procedure.definition());
        out.push('\n');
    }

    for (name, descriptor) in &program.kernels {
        let generated = match descriptor {
            KernelDescriptor::Trace { procedure } => trace_kernel(name, procedure),
            KernelDescriptor::Normal { procedure } => normal_kernel(name, procedure),
            KernelDescriptor::Shadow { procedure } => shadow_kernel(name, procedure),
            _ => continue,
        };
        out.push_str(&generated);
        out.push('\n');
    }

    out.push_str(KERNELS);
    out
}

#[cfg(test)]
mod tests {
    use clray::{
        renderer::kernels::ShaderStage,
        scene::{test_scenes, CompiledScene},
    };

    use super::*;

    fn box_program() -> Program {
        let scene = (test_scenes::find_test_scene("box").unwrap().scene_func)().unwrap();
        CompiledScene::compile(&scene).unwrap().program
    }

    #[test]
    fn header_sizes_the_material_table() {
        let program = box_program();
        let source = program_source(&program);
        assert!(source.contains(&format!("#define MATERIAL_ROWS {}u", program.material_rows)));
        assert!(source.contains("#define COLOR_VOLUME_ABSORPTION 4"));
        assert!(source.contains("#define SCALAR_IOR 0"));
        assert!(source.contains(&format!("#define OCTREE_STACK_SIZE {STACK_SIZE}")));
    }

    #[test]
    fn bundle_parameters_follow_slot_order() {
        let source = program_source(&Program::default());
        let line = source.lines().find(|l| l.starts_with("#define BUNDLE_PARAMS")).unwrap();
        assert!(line.contains("__global float3 *pos, __global float3 *ray"));
        assert!(line.contains("__global const float *params_f32"));
        assert!(line.ends_with("__global const float *material_scalars"));

        let hit = line.find("*whichobject").unwrap();
        let medium = line.find("*inside").unwrap();
        assert!(hit < medium);
    }

    #[test]
    fn every_registered_kernel_is_defined() {
        let program = box_program();
        let source = program_source(&program);
        for name in program.kernels.keys() {
            assert!(source.contains(&format!("__kernel void {name}(")), "missing kernel {name}");
        }
        for stage in ShaderStage::ALL {
            assert!(source.contains(&format!("__kernel void {}(", stage.kernel_name())));
        }
    }

    #[test]
    fn procedures_are_declared_before_use() {
        let scene = (test_scenes::find_test_scene("solids").unwrap().scene_func)().unwrap();
        let program = CompiledScene::compile(&scene).unwrap().program;
        let source = program_source(&program);
        for procedure in program.procedures.iter() {
            let prototype = source.find(&format!("{};", procedure.signature())).unwrap();
            let definition = source.find(&procedure.definition()).unwrap();
            assert!(prototype < definition, "{}", procedure.name);
        }
    }
}
