//! Static descriptors of the built-in effect programs.
//!
//! A [`ShaderProgram`] is what a backend compiles: the WGSL source, the
//! uniforms the program declares (name and type, in declaration order) and the
//! [`Kernel`] the CPU backend evaluates in place of the WGSL.
//!
//! Every program shares the prelude in `shaders/common.wgsl` (full-screen
//! triangle vertex stage `vs`, texel helpers) and exposes its fragment stage as
//! `fs`. Uniform binding 0 holds the non-texture uniforms packed with
//! [`UniformLayout`](crate::binding::UniformLayout); texture uniforms follow at
//! bindings 1, 2, ... in declaration order.

use crate::binding::{UniformDecl, UniformKind};

/// Viewport rectangle `(x, y, width, height)` in pixels. Declared first by every program.
pub const VIEWPORT: &str = "viewport";
/// Input colour of the stage.
pub const COLOR_BUFFER: &str = "colorBuffer";
/// Linear scene depth (fog variants).
pub const DEPTH_BUFFER: &str = "depthBuffer";
/// Packed 256x256 lookup table (LUT variant).
pub const LUT_TEXTURE: &str = "lutTexture";

/// Per-pixel transform a program performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Compress,
    Pixelate,
    Fog,
    HeightFog,
    RotationFog,
    LutGrade,
    Saturate,
}

/// A compilable effect program.
#[derive(Debug, PartialEq)]
pub struct ShaderProgram {
    pub label: &'static str,
    pub source: &'static str,
    pub uniforms: &'static [UniformDecl],
    pub kernel: Kernel,
}

impl ShaderProgram {
    /// Whether the program declares a uniform named `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.uniforms.iter().any(|u| u.name == name)
    }

    /// Texture uniforms in binding order.
    pub fn textures(&self) -> impl Iterator<Item = &'static UniformDecl> {
        self.uniforms.iter().filter(|u| u.kind == UniformKind::Texture)
    }
}

macro_rules! wgsl {
    ($file:literal) => {
        concat!(
            include_str!("shaders/common.wgsl"),
            "\n",
            include_str!(concat!("shaders/", $file))
        )
    };
}

const fn float(name: &'static str) -> UniformDecl {
    UniformDecl::new(name, UniformKind::Float)
}

const fn vec3(name: &'static str) -> UniformDecl {
    UniformDecl::new(name, UniformKind::Vec3)
}

const fn texture(name: &'static str) -> UniformDecl {
    UniformDecl::new(name, UniformKind::Texture)
}

const VIEWPORT_DECL: UniformDecl = UniformDecl::new(VIEWPORT, UniformKind::Vec4);

pub static COMPRESS: ShaderProgram = ShaderProgram {
    label: "compress",
    source: wgsl!("compress.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        float("amount"),
        float("steps"),
        texture(COLOR_BUFFER),
    ],
    kernel: Kernel::Compress,
};

pub static PIXELATE: ShaderProgram = ShaderProgram {
    label: "pixelate",
    source: wgsl!("pixelate.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        float("amount"),
        float("lowContrast"),
        float("highContrast"),
        texture(COLOR_BUFFER),
    ],
    kernel: Kernel::Pixelate,
};

pub static FOG: ShaderProgram = ShaderProgram {
    label: "fog",
    source: wgsl!("fog.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        vec3("fogColor"),
        texture(COLOR_BUFFER),
        texture(DEPTH_BUFFER),
    ],
    kernel: Kernel::Fog,
};

pub static HEIGHT_FOG: ShaderProgram = ShaderProgram {
    label: "height_fog",
    source: wgsl!("height_fog.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        vec3("fogColor"),
        vec3("cameraPosition"),
        UniformDecl::new("inverseViewProjection", UniformKind::Mat4),
        texture(COLOR_BUFFER),
        texture(DEPTH_BUFFER),
    ],
    kernel: Kernel::HeightFog,
};

pub static ROTATION_FOG: ShaderProgram = ShaderProgram {
    label: "rotation_fog",
    source: wgsl!("rotation_fog.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        vec3("fogColor"),
        float("cameraPitch"),
        texture(COLOR_BUFFER),
        texture(DEPTH_BUFFER),
    ],
    kernel: Kernel::RotationFog,
};

pub static LUT_GRADE: ShaderProgram = ShaderProgram {
    label: "lut_grade",
    source: wgsl!("lut.wgsl"),
    uniforms: &[
        VIEWPORT_DECL,
        float("amount"),
        float("lowContrast"),
        float("highContrast"),
        texture(COLOR_BUFFER),
        texture(LUT_TEXTURE),
    ],
    kernel: Kernel::LutGrade,
};

pub static SATURATE: ShaderProgram = ShaderProgram {
    label: "saturate",
    source: wgsl!("saturate.wgsl"),
    uniforms: &[VIEWPORT_DECL, float("satMult"), texture(COLOR_BUFFER)],
    kernel: Kernel::Saturate,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::UniformLayout;

    const ALL: [&ShaderProgram; 7] = [
        &COMPRESS,
        &PIXELATE,
        &FOG,
        &HEIGHT_FOG,
        &ROTATION_FOG,
        &LUT_GRADE,
        &SATURATE,
    ];

    #[test]
    fn every_program_declares_viewport_and_color() {
        for program in ALL {
            assert_eq!(program.uniforms[0].name, VIEWPORT, "{}", program.label);
            assert!(program.declares(COLOR_BUFFER), "{}", program.label);
            assert!(program.source.contains("fn vs("));
            assert!(program.source.contains("fn fs("));
        }
    }

    #[test]
    fn wgsl_names_match_declared_uniforms() {
        for program in ALL {
            for decl in program.uniforms {
                assert!(
                    program.source.contains(decl.name),
                    "{} does not mention {}",
                    program.label,
                    decl.name
                );
            }
        }
    }

    #[test]
    fn texture_bindings_follow_declaration_order() {
        let names: Vec<_> = LUT_GRADE.textures().map(|u| u.name).collect();
        assert_eq!(names, [COLOR_BUFFER, LUT_TEXTURE]);
        assert!(LUT_GRADE.source.contains("@binding(2) var lutTexture"));
        assert!(FOG.source.contains("@binding(2) var depthBuffer"));
    }

    #[test]
    fn layouts_fit_in_small_uniform_blocks() {
        assert_eq!(UniformLayout::new(COMPRESS.uniforms).size(), 32);
        assert_eq!(UniformLayout::new(SATURATE.uniforms).size(), 32);
        assert_eq!(UniformLayout::new(HEIGHT_FOG.uniforms).size(), 112);
    }
}
