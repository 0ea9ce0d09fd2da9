//! Post-effect compositing: chaining full-screen effects per camera.
//!
//! Each camera owns an [`EffectQueue`]. Once per frame the queue feeds the
//! scene colour through every queued effect in order, ping-ponging between two
//! scratch targets, and the last stage writes the display target.
//!
//! ```text
//! ┌─────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Scene  │───▶│ Effect 0 │───▶│ Effect 1 │───▶│ Effect 2 │───▶ display
//! │  color  │    └──────────┘    └──────────┘    └──────────┘
//! └─────────┘         │               │
//!                     ▼               ▼
//!                 Scratch A ◀──────▶ Scratch B   (ping-pong)
//! ```
//!
//! A stage that cannot draw (program failed to compile, LUT still loading, no
//! depth buffer) copies its input to its output instead; the frame always
//! completes and the [`FrameReport`] says which stages were skipped.
//!
//! # Example
//!
//! ```ignore
//! let mut queue = EffectQueue::new();
//! queue.add_effect(pixelate);
//! queue.add_effect(fog);
//!
//! let mut ctx = RenderContext::new(&mut backend, Some(depth));
//! let report = queue.render(&mut ctx, &store, scene_color, display)?;
//! ```

mod post_effect;
mod queue;
mod render_target;

pub use post_effect::{PostEffect, StageError};
pub use queue::{EffectQueue, FrameReport, StageOutcome};
pub use render_target::{RenderContext, RenderTarget, Viewport};
