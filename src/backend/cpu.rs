//! Software reference backend.

use std::collections::HashMap;

use glam::{UVec2, Vec2, Vec4};
use image::{DynamicImage, Rgba, Rgba32FImage, RgbaImage};

use super::{BackendError, RenderBackend};
use crate::binding::UniformScope;
use crate::compositor::Viewport;
use crate::ecs::{IdAllocator, ProgramId, TextureId};
use crate::kernels::{self, TexelSource};
use crate::shader::{COLOR_BUFFER, DEPTH_BUFFER, Kernel, LUT_TEXTURE, ShaderProgram};

impl TexelSource for Rgba32FImage {
    fn size(&self) -> UVec2 {
        UVec2::new(self.width(), self.height())
    }

    fn texel(&self, p: UVec2) -> Vec4 {
        Vec4::from_array(self.get_pixel(p.x, p.y).0)
    }
}

struct CpuProgram {
    program: &'static ShaderProgram,
    scope: UniformScope,
}

/// Renders effect programs on the CPU by evaluating their kernels per pixel.
///
/// Targets are `Rgba32FImage`s. Draw output is clamped to `[0, 1]` like a
/// unorm render target; uploaded depth is stored unclamped in the red channel.
///
/// # Example
///
/// ```
/// use screenfx::{CpuBackend, RenderBackend};
///
/// let mut backend = CpuBackend::new(64, 32);
/// let target = backend.create_target(64, 32, "scratch").unwrap();
/// assert_eq!(backend.texture_size(target), Some((64, 32)));
/// ```
pub struct CpuBackend {
    width: u32,
    height: u32,
    textures: HashMap<TextureId, Rgba32FImage>,
    programs: HashMap<ProgramId, CpuProgram>,
    texture_ids: IdAllocator,
    program_ids: IdAllocator,
    rejected: Vec<&'static str>,
    draws: usize,
}

impl CpuBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            textures: HashMap::new(),
            programs: HashMap::new(),
            texture_ids: IdAllocator::default(),
            program_ids: IdAllocator::default(),
            rejected: Vec::new(),
            draws: 0,
        }
    }

    /// Changes the output resolution. Ignores zero-sized dimensions.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    /// Makes later compiles of the program labelled `label` fail, the way a
    /// driver rejects a shader it cannot build.
    pub fn reject_program(&mut self, label: &'static str) {
        self.rejected.push(label);
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live programs.
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Full-screen draws issued so far.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    fn insert(&mut self, image: Rgba32FImage) -> TextureId {
        let id = TextureId(self.texture_ids.next());
        self.textures.insert(id, image);
        id
    }

    fn texture(&self, id: TextureId) -> Result<&Rgba32FImage, BackendError> {
        self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))
    }
}

/// Textures a draw reads, resolved from the program's texture uniforms.
struct Inputs<'a> {
    textures: Vec<(&'static str, &'a Rgba32FImage)>,
}

impl<'a> Inputs<'a> {
    fn get(&self, name: &'static str) -> Result<&'a Rgba32FImage, BackendError> {
        self.textures
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .ok_or(BackendError::UnboundTexture(name))
    }
}

fn shade(
    kernel: Kernel,
    scope: &UniformScope,
    inputs: &Inputs,
    uv: Vec2,
    resolution: Vec2,
) -> Result<Vec4, BackendError> {
    let color = inputs.get(COLOR_BUFFER)?;
    let out = match kernel {
        Kernel::Compress => kernels::compress(
            color,
            uv,
            resolution,
            scope.float("amount"),
            scope.float("steps"),
        ),
        Kernel::Pixelate => kernels::pixelate_contrast(
            color,
            uv,
            resolution,
            scope.float("amount"),
            scope.float("lowContrast"),
            scope.float("highContrast"),
        ),
        Kernel::Fog => {
            let depth = inputs.get(DEPTH_BUFFER)?.fetch(uv).x;
            kernels::linear_fog(color.fetch(uv), depth, scope.vec3("fogColor"))
        }
        Kernel::HeightFog => {
            let depth = inputs.get(DEPTH_BUFFER)?.fetch(uv).x;
            kernels::height_fog(
                color.fetch(uv),
                uv,
                depth,
                scope.vec3("fogColor"),
                scope.vec3("cameraPosition"),
                scope.mat4("inverseViewProjection"),
            )
        }
        Kernel::RotationFog => {
            let depth = inputs.get(DEPTH_BUFFER)?.fetch(uv).x;
            kernels::rotation_fog(
                color.fetch(uv),
                depth,
                scope.float("cameraPitch"),
                scope.vec3("fogColor"),
            )
        }
        Kernel::LutGrade => kernels::lut_grade(
            color,
            inputs.get(LUT_TEXTURE)?,
            uv,
            resolution,
            scope.float("amount"),
            scope.float("lowContrast"),
            scope.float("highContrast"),
        ),
        Kernel::Saturate => kernels::saturate(color.fetch(uv), scope.float("satMult")),
    };
    Ok(out)
}

impl RenderBackend for CpuBackend {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_target(&mut self, width: u32, height: u32, label: &str) -> Result<TextureId, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::Device(format!("'{label}' has zero size")));
        }
        Ok(self.insert(Rgba32FImage::new(width, height)))
    }

    fn upload_color(&mut self, image: &RgbaImage, _label: &str) -> Result<TextureId, BackendError> {
        let converted = DynamicImage::ImageRgba8(image.clone()).to_rgba32f();
        Ok(self.insert(converted))
    }

    fn upload_depth(
        &mut self,
        width: u32,
        height: u32,
        depth: &[f32],
        _label: &str,
    ) -> Result<TextureId, BackendError> {
        let expected = (width as usize) * (height as usize);
        if depth.len() != expected {
            return Err(BackendError::SizeMismatch {
                expected: (width, height),
                actual: (depth.len() as u32, 1),
            });
        }
        let image = Rgba32FImage::from_fn(width, height, |x, y| {
            let d = depth[(y * width + x) as usize];
            Rgba([d, 0.0, 0.0, 1.0])
        });
        Ok(self.insert(image))
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|t| t.dimensions())
    }

    fn compile_program(&mut self, program: &'static ShaderProgram) -> Result<ProgramId, BackendError> {
        if self.rejected.contains(&program.label) {
            return Err(BackendError::Compile {
                label: program.label,
                message: "rejected by backend".into(),
            });
        }
        let id = ProgramId(self.program_ids.next());
        self.programs.insert(
            id,
            CpuProgram {
                program,
                scope: UniformScope::new(program.uniforms),
            },
        );
        Ok(id)
    }

    fn release_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn uniforms(&mut self, program: ProgramId) -> Result<&mut UniformScope, BackendError> {
        self.programs
            .get_mut(&program)
            .map(|p| &mut p.scope)
            .ok_or(BackendError::UnknownProgram(program))
    }

    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        output: TextureId,
        viewport: Viewport,
    ) -> Result<(), BackendError> {
        let compiled = self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownProgram(program))?;

        let mut textures = Vec::new();
        for (name, bound) in compiled.scope.textures() {
            let id = bound.ok_or(BackendError::UnboundTexture(name))?;
            textures.push((name, self.texture(id)?));
        }
        let inputs = Inputs { textures };

        let target = self.texture(output)?;
        let (width, height) = target.dimensions();
        if viewport.x + viewport.width > width || viewport.y + viewport.height > height {
            return Err(BackendError::SizeMismatch {
                expected: (width, height),
                actual: (viewport.x + viewport.width, viewport.y + viewport.height),
            });
        }

        let mut rendered = target.clone();
        let resolution = Vec2::new(viewport.width as f32, viewport.height as f32);
        for y in 0..viewport.height {
            for x in 0..viewport.width {
                let uv = (Vec2::new(x as f32, y as f32) + 0.5) / resolution;
                let color = shade(compiled.program.kernel, &compiled.scope, &inputs, uv, resolution)?;
                let color = color.clamp(Vec4::ZERO, Vec4::ONE);
                rendered.put_pixel(viewport.x + x, viewport.y + y, Rgba(color.to_array()));
            }
        }

        self.textures.insert(output, rendered);
        self.draws += 1;
        Ok(())
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> Result<(), BackendError> {
        let source = self.texture(src)?;
        let target = self.texture(dst)?;
        if source.dimensions() != target.dimensions() {
            return Err(BackendError::SizeMismatch {
                expected: target.dimensions(),
                actual: source.dimensions(),
            });
        }
        let copy = source.clone();
        self.textures.insert(dst, copy);
        Ok(())
    }

    fn read_pixels(&mut self, id: TextureId) -> Result<Rgba32FImage, BackendError> {
        self.texture(id).cloned()
    }
}
