//! The renderer interface effects and queues draw through.
//!
//! [`RenderBackend`] is the whole surface the compositor needs from a host
//! renderer: create and release targets, compile programs, resolve uniforms by
//! name, issue one full-screen draw, copy a texture, and read pixels back.
//!
//! Two implementations ship with the crate:
//!
//! - [`CpuBackend`]: a software reference renderer over `image` buffers. It
//!   evaluates the [`kernels`](crate::kernels) directly and needs no device, so
//!   tests and the CLI run anywhere.
//! - [`WgpuBackend`]: a headless wgpu renderer that compiles the WGSL programs
//!   and draws them for real.

mod cpu;
mod gpu;

pub use cpu::CpuBackend;
pub use gpu::WgpuBackend;

use image::{Rgba32FImage, RgbaImage};

use crate::binding::UniformScope;
use crate::compositor::Viewport;
use crate::ecs::{ProgramId, TextureId};
use crate::shader::ShaderProgram;

/// Errors reported by a render backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),
    #[error("texture uniform '{0}' is not bound")]
    UnboundTexture(&'static str),
    #[error("size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("device error: {0}")]
    Device(String),
    #[error("failed to compile '{label}': {message}")]
    Compile { label: &'static str, message: String },
}

/// Host renderer capabilities consumed by effects and queues.
///
/// All methods run on the render thread. Handles stay valid until released;
/// using a released handle is an error, never undefined behaviour.
pub trait RenderBackend {
    /// Current output resolution in pixels.
    fn resolution(&self) -> (u32, u32);

    /// Allocates a colour render target that can also be read as an input.
    fn create_target(&mut self, width: u32, height: u32, label: &str) -> Result<TextureId, BackendError>;

    /// Uploads an 8-bit RGBA image as a colour texture.
    fn upload_color(&mut self, image: &RgbaImage, label: &str) -> Result<TextureId, BackendError>;

    /// Uploads linear depth, one `f32` per pixel in row-major order.
    fn upload_depth(
        &mut self,
        width: u32,
        height: u32,
        depth: &[f32],
        label: &str,
    ) -> Result<TextureId, BackendError>;

    /// Frees a texture. Unknown ids are ignored.
    fn release_texture(&mut self, id: TextureId);

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)>;

    /// Compiles a program and creates its uniform scope.
    fn compile_program(&mut self, program: &'static ShaderProgram) -> Result<ProgramId, BackendError>;

    /// Frees a program. Unknown ids are ignored.
    fn release_program(&mut self, id: ProgramId);

    /// Uniform table of a compiled program, for by-name binding.
    fn uniforms(&mut self, program: ProgramId) -> Result<&mut UniformScope, BackendError>;

    /// Runs `program` over `viewport` of `output` with the uniforms currently bound.
    fn draw_fullscreen(
        &mut self,
        program: ProgramId,
        output: TextureId,
        viewport: Viewport,
    ) -> Result<(), BackendError>;

    /// Copies `src` into `dst`. Both must have the same size.
    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> Result<(), BackendError>;

    /// Reads a texture back as floating point RGBA.
    fn read_pixels(&mut self, id: TextureId) -> Result<Rgba32FImage, BackendError>;
}
