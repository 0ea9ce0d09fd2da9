#![allow(dead_code)]

use image::{Rgba, Rgba32FImage, RgbaImage};
use screenfx::{CameraTargets, CameraTransform, CpuBackend, Entity, Host, RenderBackend};

/// A host over a CPU backend with one camera whose scene is a flat colour.
pub fn host(width: u32, height: u32, color: [u8; 4], depth: f32) -> (Host<CpuBackend>, Entity) {
    host_with(width, height, CameraTransform::default(), |_, _| color, |_, _| depth)
}

pub fn host_with(
    width: u32,
    height: u32,
    camera: CameraTransform,
    color: impl Fn(u32, u32) -> [u8; 4],
    depth: impl Fn(u32, u32) -> f32,
) -> (Host<CpuBackend>, Entity) {
    let mut backend = CpuBackend::new(width, height);
    let targets = targets(&mut backend, width, height, color, depth);
    let mut host = Host::new(backend);
    let camera = host.spawn_camera(camera, targets);
    (host, camera)
}

pub fn targets(
    backend: &mut CpuBackend,
    width: u32,
    height: u32,
    color: impl Fn(u32, u32) -> [u8; 4],
    depth: impl Fn(u32, u32) -> f32,
) -> CameraTargets {
    let scene = RgbaImage::from_fn(width, height, |x, y| Rgba(color(x, y)));
    let depth: Vec<f32> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| depth(x, y))
        .collect();
    CameraTargets {
        color: backend.upload_color(&scene, "scene").unwrap(),
        depth: Some(backend.upload_depth(width, height, &depth, "depth").unwrap()),
        display: backend.create_target(width, height, "display").unwrap(),
    }
}

pub fn display(host: &mut Host<CpuBackend>, camera: Entity) -> Rgba32FImage {
    host.read_display(camera).unwrap()
}

pub fn scene(host: &mut Host<CpuBackend>, camera: Entity) -> Rgba32FImage {
    let color = host
        .world()
        .get::<&CameraTargets>(camera)
        .unwrap()
        .color;
    host.backend_mut().read_pixels(color).unwrap()
}

pub fn assert_rgb(actual: [f32; 4], expected: [f32; 3], tolerance: f32) {
    for c in 0..3 {
        assert!(
            (actual[c] - expected[c]).abs() <= tolerance,
            "channel {c}: got {actual:?}, expected {expected:?}"
        );
    }
}
