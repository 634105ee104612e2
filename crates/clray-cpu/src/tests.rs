use std::path::Path;

use clray::{
    backend::{BufferData, ComputeBackend, DType, Scalar},
    compiler::ProcedureTable,
    error::BackendError,
    renderer::{kernels::Program, Image, Integrator, PixelFilter, RenderSettings},
    scene::{test_scenes, Camera, CompiledScene, Scene},
};

use crate::HostBackend;

fn emissive_sphere() -> (Scene, RenderSettings) {
    let descriptor = test_scenes::find_test_scene("emissive_sphere").unwrap();
    ((descriptor.scene_func)().unwrap(), (descriptor.settings_func)())
}

/// Per-pixel RMS difference of two estimates
fn rms_difference(a: &Image, b: &Image) -> f32 {
    let (a, b) = (a.averaged(), b.averaged());
    let sum: f32 = a.iter().zip(&b).map(|(&x, &y)| (x - y).square_magnitude()).sum();
    (sum / a.len() as f32).sqrt()
}

#[test]
fn emissive_sphere_converges() {
    let (scene, settings) = emissive_sphere();
    assert_eq!((settings.min_bounces, settings.max_bounces), (2, 4));
    let compiled = CompiledScene::compile(&scene).unwrap();

    let mut backend_a = HostBackend::new();
    let mut backend_b = HostBackend::new();
    let mut a = Integrator::new(&mut backend_a, &compiled, &scene.camera, RenderSettings { seed: 1, ..settings.clone() })
        .unwrap();
    let mut b = Integrator::new(&mut backend_b, &compiled, &scene.camera, RenderSettings { seed: 2, ..settings })
        .unwrap();

    let early = (a.render(100).unwrap(), b.render(100).unwrap());
    assert!(early.0.is_finite_and_non_negative() && early.1.is_finite_and_non_negative());
    let late = (a.render(900).unwrap(), b.render(900).unwrap());
    assert_eq!(late.0.samples, 1000);
    assert!(late.0.is_finite_and_non_negative() && late.1.is_finite_and_non_negative());

    // the sphere is in view, so something reaches the camera
    assert!(early.0.mean() > 0.0);
    assert!(late.0.mean() > early.0.mean());

    // independent estimates agree about sqrt(10) times better
    let early_rms = rms_difference(&early.0, &early.1);
    let late_rms = rms_difference(&late.0, &late.1);
    assert!(early_rms > 0.0);
    assert!(late_rms < 0.6 * early_rms, "rms {early_rms} at 100 samples, {late_rms} at 1000");

    _ = std::fs::create_dir("test_output");
    crate::utils::save_png(&late.0, 1.0, Path::new("test_output/emissive_sphere.png"));
}

#[test]
fn light_sampling_keeps_the_estimate() {
    let (scene, settings) = emissive_sphere();
    let compiled = CompiledScene::compile(&scene).unwrap();

    let mut means = Vec::new();
    for bidirectional in [false, true] {
        let mut backend = HostBackend::new();
        let settings = RenderSettings { bidirectional, seed: 3, ..settings.clone() };
        let mut integrator = Integrator::new(&mut backend, &compiled, &scene.camera, settings).unwrap();
        let image = integrator.render(400).unwrap();
        means.push(image.mean() / image.samples as f32);
    }
    let relative = (means[0] - means[1]).abs() / means[0];
    assert!(relative < 0.1, "plain {} vs light sampled {}", means[0], means[1]);
}

#[test]
fn first_bounce_cache_reproduces_the_uncached_render() {
    let (scene, settings) = emissive_sphere();
    let compiled = CompiledScene::compile(&scene).unwrap();

    let mut images = Vec::new();
    let mut dispatches = Vec::new();
    for cache_first_bounce in [false, true] {
        let mut backend = HostBackend::new();
        let settings =
            RenderSettings { pixel_filter: PixelFilter::None, cache_first_bounce, seed: 11, ..settings.clone() };
        let mut integrator = Integrator::new(&mut backend, &compiled, &scene.camera, settings).unwrap();
        images.push(integrator.render(5).unwrap());
        drop(integrator);
        dispatches.push(backend.dispatch_count());
    }
    assert_eq!(images[0], images[1]);
    // later samples skip the camera, trace, advance and normal kernels
    assert!(dispatches[1] < dispatches[0]);
}

#[test]
fn cache_with_jitter_falls_back_to_tracing() {
    let (scene, settings) = emissive_sphere();
    let compiled = CompiledScene::compile(&scene).unwrap();
    let mut backend = HostBackend::new();
    let settings = RenderSettings { cache_first_bounce: true, ..settings };
    let mut integrator = Integrator::new(&mut backend, &compiled, &scene.camera, settings).unwrap();
    assert!(integrator.render(2).unwrap().is_finite_and_non_negative());
}

#[test]
fn sanity_tests() {
    _ = std::fs::create_dir("test_output");

    for test_scene in test_scenes::all_test_scenes() {
        let mut scene = (test_scene.scene_func)().unwrap();
        let settings = (test_scene.settings_func)();
        scene.camera = Camera { width: 24, height: 16, ..scene.camera.clone() };

        let compiled = CompiledScene::compile(&scene).unwrap();
        let mut backend = HostBackend::new();
        let mut integrator = Integrator::new(&mut backend, &compiled, &scene.camera, settings).unwrap();
        let image = integrator.render(4).unwrap();
        assert!(image.is_finite_and_non_negative(), "{} produced bad samples", test_scene.name);

        let filename = format!("test_output/{}.png", test_scene.name);
        crate::utils::save_png(&image, 1.0, Path::new(&filename));
    }
}

#[test]
fn arena_rejects_misuse() {
    let mut backend = HostBackend::new();
    let floats = backend.allocate(4, DType::F32, true).unwrap();
    let ints = backend.upload_constant(BufferData::U32(vec![1, 2, 3, 4])).unwrap();

    assert!(matches!(backend.copy(floats, ints), Err(BackendError::TypeMismatch { .. })));
    assert!(matches!(backend.fill(ints, Scalar::F32(1.0)), Err(BackendError::TypeMismatch { .. })));
    assert!(matches!(
        backend.dispatch("advance_rays", 4, &[floats], &[]),
        Err(BackendError::NoProgram)
    ));

    backend.build_program(&Program::new(ProcedureTable::default())).unwrap();
    assert!(matches!(
        backend.dispatch("trace_Nothing_intersect", 4, &[floats], &[]),
        Err(BackendError::UnknownProcedure(_))
    ));

    // binding one buffer twice fails without losing it
    assert!(matches!(
        backend.dispatch("advance_rays", 4, &[floats, floats], &[]),
        Err(BackendError::InvalidBuffer(_))
    ));
    backend.fill(floats, Scalar::F32(2.0)).unwrap();
    assert_eq!(backend.read(floats).unwrap(), BufferData::F32(vec![2.0; 4]));
    assert_eq!(backend.read(ints).unwrap(), BufferData::U32(vec![1, 2, 3, 4]));
}
