//! Per-pixel transforms of the built-in effects.
//!
//! Every function here is a pure function of its inputs: no state survives
//! between pixels or frames. The CPU backend evaluates these directly, and the
//! WGSL programs in `src/shaders/` implement the same arithmetic line for line,
//! so a chain rendered on either backend agrees up to target precision.
//!
//! # Coordinates
//!
//! `uv` is the center of the output pixel mapped into the viewport
//! (`(pixel - origin + 0.5) / size`), with `y` growing downwards like texel
//! rows. Colour is fetched with nearest filtering through [`TexelSource`].

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Rec. 601 luma weights used for the contrast bands.
pub const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// Quantization levels per channel of the packed lookup table.
pub const LUT_LEVELS: u32 = 40;

/// Width and height of the packed lookup table texture.
pub const LUT_SIZE: u32 = 256;

/// Depth (world units) at which linear fog saturates.
pub const FOG_DISTANCE: f32 = 10.0;

/// Depth beyond which rotation fog switches to the pitch-driven factor.
pub const HORIZON_DEPTH: f32 = 1000.0;

/// Pitch (degrees) above which the horizon branch uses `pitch / 180`.
pub const STEEP_PITCH: f32 = 170.0;

/// Height fog scale applied to the exponential falloff.
pub const HEIGHT_FACTOR: f32 = 0.05;

/// Height fog density.
pub const FOG_DENSITY: f32 = 0.1;

/// Anything a kernel can fetch texels from.
///
/// Implemented by the CPU backend for its `Rgba32FImage` targets. Depth
/// sources store linear depth in the red channel.
pub trait TexelSource {
    /// Size of the source in texels.
    fn size(&self) -> UVec2;

    /// Fetch one texel. `p` is always inside [`size`](Self::size).
    fn texel(&self, p: UVec2) -> Vec4;

    /// Nearest-filtered fetch at a normalized coordinate, clamped to the edge.
    fn fetch(&self, uv: Vec2) -> Vec4 {
        let size = self.size();
        if size.x == 0 || size.y == 0 {
            return Vec4::ZERO;
        }
        let max = (size - UVec2::ONE).as_vec2();
        let p = (uv * size.as_vec2()).floor().clamp(Vec2::ZERO, max);
        self.texel(p.as_uvec2())
    }
}

/// GLSL/WGSL `mix`: exact at both ends of `t`.
pub fn mix(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a * (1.0 - t) + b * t
}

/// Top-left corner, in pixels, of the block containing `uv`.
pub fn block_origin(uv: Vec2, resolution: Vec2, amount: f32) -> Vec2 {
    let amount = amount.max(1.0);
    amount * (uv * resolution / amount).floor()
}

/// Colour of the block containing `uv`, read at the block origin's texel center.
pub fn block_sample(src: &dyn TexelSource, uv: Vec2, resolution: Vec2, amount: f32) -> Vec4 {
    let origin = block_origin(uv, resolution, amount);
    src.fetch((origin + 0.5) / resolution)
}

/// Rounds each colour channel to the nearest multiple of `1 / steps`.
///
/// `steps` intervals give `steps + 1` levels, black and white included.
pub fn quantize(color: Vec3, steps: f32) -> Vec3 {
    let steps = steps.max(1.0);
    (color * steps + 0.5).floor() / steps
}

/// Block-averaged position followed by per-channel quantization.
pub fn compress(src: &dyn TexelSource, uv: Vec2, resolution: Vec2, amount: f32, steps: f32) -> Vec4 {
    let color = block_sample(src, uv, resolution, amount);
    quantize(color.xyz(), steps).extend(1.0)
}

/// Scales mid-tones by `low` and highlights by `high`.
///
/// Luma in the open band (0.4, 0.6) uses `low`, (0.75, 1.0) uses `high`; the
/// rest passes through untouched.
pub fn contrast(color: Vec4, low: f32, high: f32) -> Vec4 {
    let brightness = color.xyz().dot(LUMA);
    if brightness > 0.4 && brightness < 0.6 {
        (color * low).clamp(Vec4::ZERO, Vec4::ONE)
    } else if brightness > 0.75 && brightness < 1.0 {
        (color * high).clamp(Vec4::ZERO, Vec4::ONE)
    } else {
        color
    }
}

pub fn pixelate_contrast(
    src: &dyn TexelSource,
    uv: Vec2,
    resolution: Vec2,
    amount: f32,
    low: f32,
    high: f32,
) -> Vec4 {
    contrast(block_sample(src, uv, resolution, amount), low, high)
}

/// Linear depth fog, fully fogged at [`FOG_DISTANCE`].
pub fn linear_fog(color: Vec4, depth: f32, fog: Vec3) -> Vec4 {
    let factor = (depth / FOG_DISTANCE).clamp(0.0, 1.0);
    mix(color, fog.extend(1.0), factor)
}

/// Blend factor of the rotation-aware fog.
///
/// Near geometry uses plain linear fog. Past [`HORIZON_DEPTH`] (the sky) the
/// factor follows camera pitch so looking straight up or down does not show a
/// seam where the fog would otherwise end.
pub fn rotation_fog_factor(depth: f32, pitch_degrees: f32) -> f32 {
    let pitch = if pitch_degrees < -89.0 {
        pitch_degrees + 180.0
    } else {
        pitch_degrees
    };
    if depth > HORIZON_DEPTH {
        if pitch > STEEP_PITCH {
            pitch / 180.0
        } else {
            1.0 - pitch / 180.0
        }
    } else {
        (depth / FOG_DISTANCE).clamp(0.0, 1.0)
    }
}

pub fn rotation_fog(color: Vec4, depth: f32, pitch_degrees: f32, fog: Vec3) -> Vec4 {
    mix(color, fog.extend(1.0), rotation_fog_factor(depth, pitch_degrees))
}

/// Exponential height fog factor for one pixel.
///
/// The far-plane point under `uv` is reconstructed through the inverse
/// view-projection and scaled by `depth / 1000` to get the shaded point.
pub fn height_fog_factor(uv: Vec2, depth: f32, camera: Vec3, inverse_view_projection: Mat4) -> f32 {
    let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let far = inverse_view_projection * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
    if far.w.abs() < f32::EPSILON {
        return 0.0;
    }
    let world = far.xyz() / far.w * (depth / 1000.0);
    let offset = world - camera;
    let distance = offset.length();
    let direction = offset.normalize_or_zero();
    let falloff = HEIGHT_FACTOR * (-camera.y * FOG_DENSITY).exp();

    let factor = if direction.y.abs() < 1e-5 {
        // limit of (1 - e^(-d*y*k)) / y as y -> 0
        falloff * distance * FOG_DENSITY
    } else {
        falloff * (1.0 - (-distance * direction.y * FOG_DENSITY).exp()) / direction.y
    };

    if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn height_fog(
    color: Vec4,
    uv: Vec2,
    depth: f32,
    fog: Vec3,
    camera: Vec3,
    inverse_view_projection: Mat4,
) -> Vec4 {
    let factor = height_fog_factor(uv, depth, camera, inverse_view_projection);
    mix(color, fog.extend(1.0), factor)
}

/// Packed LUT index of a colour: `r*1600 + g*40 + b` over 40 levels.
pub fn lut_index(color: Vec3) -> u32 {
    let top = (LUT_LEVELS - 1) as f32;
    let q = (color * LUT_LEVELS as f32).floor().clamp(Vec3::ZERO, Vec3::splat(top));
    let q = q.as_uvec3();
    q.x * LUT_LEVELS * LUT_LEVELS + q.y * LUT_LEVELS + q.z
}

/// Texel holding a LUT index inside the 256-wide packed table.
pub fn lut_texel(index: u32) -> UVec2 {
    UVec2::new(index % LUT_SIZE, index / LUT_SIZE)
}

/// Inverse of [`lut_texel`].
pub fn lut_index_at(texel: UVec2) -> u32 {
    texel.y * LUT_SIZE + texel.x
}

/// Normalized coordinate of the texel center for a LUT index.
pub fn lut_uv(index: u32) -> Vec2 {
    (lut_texel(index).as_vec2() + 0.5) / LUT_SIZE as f32
}

/// Pixelate + contrast, then replace the colour with its LUT entry.
pub fn lut_grade(
    src: &dyn TexelSource,
    lut: &dyn TexelSource,
    uv: Vec2,
    resolution: Vec2,
    amount: f32,
    low: f32,
    high: f32,
) -> Vec4 {
    let color = pixelate_contrast(src, uv, resolution, amount, low, high);
    let graded = lut.fetch(lut_uv(lut_index(color.xyz())));
    graded.xyz().extend(1.0)
}

fn fract(v: Vec3) -> Vec3 {
    v - v.floor()
}

/// Branch-free RGB to HSV conversion, all components in `[0, 1]`.
pub fn rgb_to_hsv(c: Vec3) -> Vec3 {
    const K: Vec4 = Vec4::new(0.0, -1.0 / 3.0, 2.0 / 3.0, -1.0);
    let p = if c.y >= c.z {
        Vec4::new(c.y, c.z, K.x, K.y)
    } else {
        Vec4::new(c.z, c.y, K.w, K.z)
    };
    let q = if c.x >= p.x {
        Vec4::new(c.x, p.y, p.z, p.x)
    } else {
        Vec4::new(p.x, p.y, p.w, c.x)
    };
    let d = q.x - q.w.min(q.y);
    let e = 1.0e-10;
    Vec3::new(
        (q.z + (q.w - q.y) / (6.0 * d + e)).abs(),
        d / (q.x + e),
        q.x,
    )
}

pub fn hsv_to_rgb(c: Vec3) -> Vec3 {
    const K: Vec4 = Vec4::new(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = (fract(Vec3::splat(c.x) + K.xyz()) * 6.0 - Vec3::splat(K.w)).abs();
    let chroma = (p - Vec3::ONE).clamp(Vec3::ZERO, Vec3::ONE);
    c.z * (Vec3::ONE * (1.0 - c.y) + chroma * c.y)
}

/// Scales HSV saturation by `multiplier`, clamped to `[0, 1]`.
pub fn saturate(color: Vec4, multiplier: f32) -> Vec4 {
    let mut hsv = rgb_to_hsv(color.xyz());
    hsv.y = (hsv.y * multiplier).clamp(0.0, 1.0);
    hsv_to_rgb(hsv).extend(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Grid {
        size: UVec2,
        texels: Vec<Vec4>,
    }

    impl Grid {
        fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Vec4) -> Self {
            let mut texels = Vec::with_capacity((width * height) as usize);
            for y in 0..height {
                for x in 0..width {
                    texels.push(f(x, y));
                }
            }
            Self {
                size: UVec2::new(width, height),
                texels,
            }
        }
    }

    impl TexelSource for Grid {
        fn size(&self) -> UVec2 {
            self.size
        }

        fn texel(&self, p: UVec2) -> Vec4 {
            self.texels[(p.y * self.size.x + p.x) as usize]
        }
    }

    fn uv_of(x: u32, y: u32, size: UVec2) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) / size.as_vec2()
    }

    fn noise(x: u32, y: u32) -> Vec4 {
        let h = x.wrapping_mul(374761393) ^ y.wrapping_mul(668265263);
        let r = (h % 251) as f32 / 250.0;
        let g = ((h >> 8) % 251) as f32 / 250.0;
        let b = ((h >> 16) % 251) as f32 / 250.0;
        Vec4::new(r, g, b, 1.0)
    }

    #[test]
    fn block_sampling_is_idempotent() {
        let src = Grid::from_fn(50, 37, noise);
        let res = src.size.as_vec2();
        let once = Grid::from_fn(50, 37, |x, y| block_sample(&src, uv_of(x, y, src.size), res, 12.0));
        let twice = Grid::from_fn(50, 37, |x, y| block_sample(&once, uv_of(x, y, once.size), res, 12.0));
        assert_eq!(once.texels, twice.texels);
    }

    #[test]
    fn block_sampling_reads_block_origin() {
        let src = Grid::from_fn(24, 24, |x, y| Vec4::new(x as f32, y as f32, 0.0, 1.0));
        let res = src.size.as_vec2();
        let c = block_sample(&src, uv_of(17, 5, src.size), res, 12.0);
        assert_eq!(c, Vec4::new(12.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn quantize_snaps_to_levels() {
        let q = quantize(Vec3::new(0.0, 0.49, 1.0), 3.0);
        assert_eq!(q, Vec3::new(0.0, 1.0 / 3.0, 1.0));
        assert_eq!(quantize(Vec3::splat(0.6), 3.0), Vec3::splat(2.0 / 3.0));
        // below one step everything snaps to black or white
        assert_eq!(quantize(Vec3::new(0.2, 0.8, 0.5), 0.0), Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn quantize_default_steps_has_nine_levels() {
        let mut levels = Vec::new();
        for i in 0..=1000 {
            let c = i as f32 / 1000.0;
            let q = quantize(Vec3::splat(c), 8.0).x;
            assert_eq!(q, (c * 8.0).round() / 8.0, "c = {c}");
            if !levels.contains(&q) {
                levels.push(q);
            }
        }
        assert_eq!(levels.len(), 9);
        assert_eq!(quantize(Vec3::splat(0.49), 8.0), Vec3::splat(0.5));
    }

    #[test]
    fn contrast_bands() {
        let mid = Vec4::new(0.5, 0.5, 0.5, 1.0);
        assert_eq!(contrast(mid, 0.5, 2.0), Vec4::new(0.25, 0.25, 0.25, 0.5));

        let bright = Vec4::new(0.8, 0.8, 0.8, 1.0);
        assert_eq!(contrast(bright, 0.5, 2.0), Vec4::ONE);

        let dark = Vec4::new(0.1, 0.1, 0.1, 1.0);
        assert_eq!(contrast(dark, 0.5, 2.0), dark);
    }

    #[test]
    fn linear_fog_endpoints() {
        let color = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let fog = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(linear_fog(color, 10.0, fog), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(linear_fog(color, 0.0, fog), color);
        assert_eq!(linear_fog(color, 250.0, fog), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn rotation_fog_uses_pitch_past_horizon() {
        let factor = rotation_fog_factor(1500.0, 175.0);
        assert!((factor - 175.0 / 180.0).abs() < 1e-6);
        assert!((factor - 0.972).abs() < 1e-3);

        // shallow pitch uses the complementary factor
        assert!((rotation_fog_factor(1500.0, 30.0) - (1.0 - 30.0 / 180.0)).abs() < 1e-6);
        // below the threshold depth it is plain linear fog
        assert!((rotation_fog_factor(5.0, 175.0) - 0.5).abs() < 1e-6);
        // steep negative pitch wraps around
        assert!((rotation_fog_factor(1500.0, -95.0) - (1.0 - 85.0 / 180.0)).abs() < 1e-6);
    }

    #[test]
    fn height_fog_is_bounded() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.5, 0.1, 1000.0);
        let inverse = (proj * view).inverse();
        for (uv, depth) in [
            (Vec2::new(0.5, 0.5), 0.0),
            (Vec2::new(0.1, 0.9), 40.0),
            (Vec2::new(0.9, 0.1), 900.0),
        ] {
            let f = height_fog_factor(uv, depth, Vec3::new(0.0, 2.0, 5.0), inverse);
            assert!((0.0..=1.0).contains(&f), "factor {f} out of range");
        }
    }

    #[test]
    fn height_fog_level_ray_uses_limit() {
        // far point straight ahead at camera height
        let camera = Vec3::new(0.0, 0.0, 0.0);
        let f = height_fog_factor(Vec2::new(0.5, 0.5), 1000.0, camera, Mat4::IDENTITY);
        assert!(f.is_finite());
        assert!(f > 0.0);
    }

    #[test]
    fn lut_index_round_trips() {
        for r in 0..LUT_LEVELS {
            for g in 0..LUT_LEVELS {
                for b in 0..LUT_LEVELS {
                    let index = r * 1600 + g * 40 + b;
                    let texel = lut_texel(index);
                    assert!(texel.x < LUT_SIZE && texel.y < LUT_SIZE);
                    assert_eq!(lut_index_at(texel), index);
                }
            }
        }
    }

    #[test]
    fn lut_index_quantizes_and_clamps() {
        assert_eq!(lut_index(Vec3::ZERO), 0);
        assert_eq!(lut_index(Vec3::ONE), 39 * 1600 + 39 * 40 + 39);
        assert_eq!(lut_index(Vec3::new(0.5, 0.25, 0.0)), 20 * 1600 + 10 * 40);
        assert_eq!(lut_uv(0), Vec2::splat(0.5 / 256.0));
    }

    #[test]
    fn saturation_one_is_identity() {
        for color in [
            Vec4::new(0.2, 0.4, 0.6, 1.0),
            Vec4::new(0.9, 0.1, 0.3, 1.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
            Vec4::new(1.0, 1.0, 0.0, 1.0),
        ] {
            let out = saturate(color, 1.0);
            assert!((out - color).abs().max_element() < 1e-5, "{color} -> {out}");
        }
    }

    #[test]
    fn saturation_zero_is_grey() {
        let out = saturate(Vec4::new(0.9, 0.1, 0.3, 1.0), 0.0);
        assert!((out.x - out.y).abs() < 1e-6 && (out.y - out.z).abs() < 1e-6);
        assert!((out.x - 0.9).abs() < 1e-5);
    }
}
