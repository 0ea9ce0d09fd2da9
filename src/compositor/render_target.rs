//! Render targets and execution context for the effect queue.

use crate::backend::{BackendError, RenderBackend};
use crate::ecs::TextureId;

/// Pixel rectangle a stage draws into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Viewport covering a whole `width` x `height` target.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The `(x, y, width, height)` form programs receive as the `viewport` uniform.
    pub fn as_vec4(&self) -> glam::Vec4 {
        glam::Vec4::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

/// An off-screen render target used for intermediate stage results.
///
/// The backend owns the pixel storage; the target remembers its handle and the
/// size it was allocated at so the queue can detect resolution changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: TextureId,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Allocates a new target of the given size.
    ///
    /// # Arguments
    ///
    /// * `backend` - Renderer providing the storage
    /// * `label` - Debug label for the texture
    pub fn new(
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<Self, BackendError> {
        let id = backend.create_target(width, height, label)?;
        log::info!("allocated {label} at {width}x{height}");
        Ok(Self { id, width, height })
    }

    /// Recreates the target if its size differs from `width` x `height`.
    ///
    /// Returns `true` when the target was reallocated. The old texture is
    /// released only once its replacement exists, so a failed allocation
    /// leaves the target unchanged.
    pub fn ensure_size(
        &mut self,
        backend: &mut dyn RenderBackend,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<bool, BackendError> {
        if self.width == width && self.height == height {
            return Ok(false);
        }
        let replacement = Self::new(backend, width, height, label)?;
        backend.release_texture(std::mem::replace(self, replacement).id);
        Ok(true)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn release(self, backend: &mut dyn RenderBackend) {
        backend.release_texture(self.id);
    }
}

/// Execution context passed to each effect during a queue render.
///
/// Created fresh for each frame and passed through the whole chain.
pub struct RenderContext<'a> {
    /// Renderer the stages draw with.
    pub backend: &'a mut dyn RenderBackend,
    /// Scene depth of the camera being rendered, if it has one.
    pub depth: Option<TextureId>,
}

impl<'a> RenderContext<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend, depth: Option<TextureId>) -> Self {
        Self { backend, depth }
    }
}
