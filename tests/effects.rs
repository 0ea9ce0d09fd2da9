//! Per-effect output checks through the host on the CPU backend.

mod common;

use common::{assert_rgb, display, host, host_with, scene};
use screenfx::kernels::{lut_index, quantize};
use screenfx::{AssetLoader, AttributeValue, CameraTransform, EffectKind, Vec3, identity_lut};

fn number(v: f32) -> AttributeValue {
    AttributeValue::Number(v)
}

fn white_fog() -> Vec<(String, AttributeValue)> {
    vec![("fogColor".into(), AttributeValue::Rgb([1.0, 1.0, 1.0]))]
}

/// Deterministic per-pixel colour that differs between neighbours.
fn noise(x: u32, y: u32) -> [u8; 4] {
    let h = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
    [(h % 251) as u8, (h / 7 % 241) as u8, (h / 13 % 239) as u8, 255]
}

#[test]
fn fog_endpoints() {
    // left half at the camera, right half at the fog distance
    let (mut host, camera) = host_with(
        4,
        2,
        CameraTransform::default(),
        |_, _| [51, 102, 153, 255],
        |x, _| if x < 2 { 0.0 } else { 10.0 },
    );
    host.attach_script(camera, EffectKind::Fog, white_fog()).unwrap();
    host.render_frame();

    let out = display(&mut host, camera);
    assert_rgb(out.get_pixel(0, 0).0, [0.2, 0.4, 0.6], 1e-5);
    assert_rgb(out.get_pixel(3, 1).0, [1.0, 1.0, 1.0], 1e-5);
}

#[test]
fn rotation_fog_follows_pitch_in_the_sky() {
    let (mut host, camera) = host_with(
        2,
        2,
        CameraTransform::default().with_euler_degrees(175.0, 0.0, 0.0),
        |_, _| [0, 0, 0, 255],
        |_, _| 1500.0,
    );
    host.attach_script(camera, EffectKind::RotationFog, white_fog()).unwrap();
    host.render_frame();

    let out = display(&mut host, camera);
    assert!((out.get_pixel(1, 1).0[0] - 0.972).abs() < 1e-3);
}

#[test]
fn height_fog_grows_with_depth_and_stays_bounded() {
    let render = |depth: f32| {
        let (mut host, camera) = host_with(
            4,
            4,
            CameraTransform::at(Vec3::new(0.0, 2.0, 5.0)),
            |_, _| [0, 0, 0, 255],
            move |_, _| depth,
        );
        host.attach_script(camera, EffectKind::HeightFog, white_fog()).unwrap();
        host.render_frame();
        display(&mut host, camera).get_pixel(2, 2).0[0]
    };

    let near = render(50.0);
    let far = render(500.0);
    assert!(near > 0.0 && near < 1.0, "near fog {near}");
    assert!(far > near);
    assert!(far <= 1.0);
}

#[test]
fn pixelate_fills_blocks_from_their_origin() {
    let (mut host, camera) = host_with(8, 8, CameraTransform::default(), noise, |_, _| 1.0);
    host.attach_script(
        camera,
        EffectKind::Pixelate,
        vec![
            ("amount".into(), number(4.0)),
            ("lowContrast".into(), number(1.0)),
            ("highContrast".into(), number(1.0)),
        ],
    )
    .unwrap();
    host.render_frame();

    let out = display(&mut host, camera);
    let input = scene(&mut host, camera);
    for y in 0..8 {
        for x in 0..8 {
            let origin = input.get_pixel(x / 4 * 4, y / 4 * 4).0;
            assert_eq!(out.get_pixel(x, y).0, origin, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn compress_quantizes_channels() {
    let (mut host, camera) = host_with(8, 8, CameraTransform::default(), noise, |_, _| 1.0);
    host.attach_script(
        camera,
        EffectKind::Compress,
        vec![("amount".into(), number(1.0)), ("steps".into(), number(3.0))],
    )
    .unwrap();
    host.render_frame();

    let out = display(&mut host, camera);
    let input = scene(&mut host, camera);
    for (x, y, pixel) in out.enumerate_pixels() {
        let source = input.get_pixel(x, y).0;
        let expected = quantize(Vec3::new(source[0], source[1], source[2]), 3.0);
        assert_rgb(pixel.0, expected.to_array(), 1e-6);
        for c in &pixel.0[..3] {
            assert!(
                [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0]
                    .iter()
                    .any(|level| (c - level).abs() < 1e-6)
            );
        }
    }
}

#[test]
fn saturation_of_one_is_identity() {
    let (mut host, camera) = host_with(8, 8, CameraTransform::default(), noise, |_, _| 1.0);
    host.attach_script(camera, EffectKind::Saturate, vec![]).unwrap();
    host.render_frame();

    let out = display(&mut host, camera);
    let input = scene(&mut host, camera);
    for (x, y, pixel) in out.enumerate_pixels() {
        let source = input.get_pixel(x, y).0;
        assert_rgb(pixel.0, [source[0], source[1], source[2]], 1e-5);
    }
}

#[test]
fn identity_lut_keeps_every_colour_in_its_cell() {
    let dir = std::env::temp_dir().join(format!("screenfx-grade-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    identity_lut().save(dir.join("identity.png")).unwrap();

    let (host, camera) = host_with(8, 8, CameraTransform::default(), noise, |_, _| 1.0);
    let mut host = host.with_assets(AssetLoader::new(&dir));
    host.attach_script(
        camera,
        EffectKind::LutPixelate,
        vec![
            ("amount".into(), number(1.0)),
            ("lowContrast".into(), number(1.0)),
            ("highContrast".into(), number(1.0)),
            ("textureAsset".into(), AttributeValue::Asset("identity.png".into())),
        ],
    )
    .unwrap();

    let mut drawn = false;
    for _ in 0..500 {
        if host.render_frame()[0].1.drawn() == 1 {
            drawn = true;
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(drawn, "LUT never finished loading");

    let out = display(&mut host, camera);
    let input = scene(&mut host, camera);
    for (x, y, pixel) in out.enumerate_pixels() {
        let source = input.get_pixel(x, y).0;
        assert_eq!(
            lut_index(Vec3::new(pixel.0[0], pixel.0[1], pixel.0[2])),
            lut_index(Vec3::new(source[0], source[1], source[2])),
            "pixel ({x}, {y})"
        );
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn empty_chain_presents_the_scene() {
    let (mut host, camera) = host(3, 3, [1, 2, 3, 255], 0.0);
    host.render_frame();
    assert_eq!(display(&mut host, camera), scene(&mut host, camera));
}
