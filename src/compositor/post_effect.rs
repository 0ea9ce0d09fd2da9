//! The capability trait every queue stage implements.

use crate::backend::BackendError;
use crate::binding::BindingError;
use crate::compositor::{RenderContext, Viewport};
use crate::ecs::TextureId;

/// Why a stage did not draw. The queue passes its input through instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    /// The effect's program failed to compile.
    #[error("program unavailable")]
    ProgramUnavailable,
    /// A resource the effect needs is not there yet (LUT still loading, no depth buffer).
    #[error("{0} not ready")]
    ResourceNotReady(&'static str),
    /// The queue references an effect that no longer exists.
    #[error("effect missing from store")]
    MissingEffect,
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A full-screen image transform that can run as a queue stage.
///
/// `render` reads `input`, writes `output` over `viewport` and leaves every
/// other target untouched. It never allocates targets; the queue owns them.
///
/// # Implementing Custom Effects
///
/// ```ignore
/// struct Invert {
///     program: ProgramId,
/// }
///
/// impl PostEffect for Invert {
///     fn render(
///         &self,
///         ctx: &mut RenderContext,
///         input: TextureId,
///         output: TextureId,
///         viewport: Viewport,
///     ) -> Result<(), StageError> {
///         let scope = ctx.backend.uniforms(self.program)?;
///         scope.set("colorBuffer", UniformValue::Texture(input))?;
///         ctx.backend.draw_fullscreen(self.program, output, viewport)?;
///         Ok(())
///     }
/// }
/// ```
pub trait PostEffect {
    /// Draws this stage.
    ///
    /// # Errors
    ///
    /// Any [`StageError`]. The queue treats every error as "skip this stage".
    fn render(
        &self,
        ctx: &mut RenderContext,
        input: TextureId,
        output: TextureId,
        viewport: Viewport,
    ) -> Result<(), StageError>;
}
