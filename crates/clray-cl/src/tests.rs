use clray::{
    backend::{BufferData, ComputeBackend, DType, Scalar},
    renderer::{Integrator, RenderSettings},
    scene::{test_scenes, CompiledScene},
};
use clray_cpu::HostBackend;

use crate::OpenClBackend;

#[test]
#[ignore = "needs an OpenCL device"]
fn buffers_round_trip_through_the_device() {
    let mut backend = OpenClBackend::new().unwrap();
    let points = BufferData::Vec3(vec![clray::geometry::Vec3(1.0, 2.0, 3.0); 5]);
    let constant = backend.upload_constant(points.clone()).unwrap();
    assert_eq!(backend.read(constant).unwrap(), points);

    let target = backend.allocate(5, DType::Vec3, true).unwrap();
    backend.copy(target, constant).unwrap();
    assert_eq!(backend.read(target).unwrap(), points);

    let counters = backend.allocate(3, DType::U32, false).unwrap();
    backend.fill(counters, Scalar::U32(7)).unwrap();
    assert_eq!(backend.read(counters).unwrap(), BufferData::U32(vec![7; 3]));
    assert!(backend.fill(counters, Scalar::F32(1.0)).is_err());
}

#[test]
#[ignore = "needs an OpenCL device"]
fn device_and_host_agree_on_the_emissive_sphere() {
    let descriptor = test_scenes::find_test_scene("emissive_sphere").unwrap();
    let scene = (descriptor.scene_func)().unwrap();
    let compiled = CompiledScene::compile(&scene).unwrap();
    let settings = RenderSettings { seed: 5, ..(descriptor.settings_func)() };

    let mut host = HostBackend::new();
    let host_mean = Integrator::new(&mut host, &compiled, &scene.camera, settings.clone())
        .unwrap()
        .render(200)
        .unwrap()
        .mean();

    let mut device = OpenClBackend::new().unwrap();
    let image = Integrator::new(&mut device, &compiled, &scene.camera, settings).unwrap().render(200).unwrap();
    assert!(image.is_finite_and_non_negative());

    let relative = (image.mean() - host_mean).abs() / host_mean;
    assert!(relative < 0.1, "device {} vs host {}", image.mean(), host_mean);
}
