//! Type-safe handles and the ECS components a camera carries.
//!
//! Effects, programs and textures are referred to by small `Copy` handles
//! rather than references. The queue stores [`EffectId`]s, the backend owns the
//! GPU or CPU storage behind [`TextureId`] and [`ProgramId`], and nothing holds
//! a borrow across frames.
//!
//! # Example
//!
//! ```ignore
//! use screenfx::*;
//!
//! let camera = host.spawn_camera(
//!     CameraTransform::at(Vec3::new(0.0, 2.0, 5.0)),
//!     CameraTargets { color, depth: Some(depth), display },
//! );
//! ```

/// Handle to a texture or render target owned by a backend.
///
/// Obtained from [`RenderBackend::create_target`](crate::RenderBackend::create_target)
/// and the upload methods. The newtype keeps texture handles from being mixed
/// up with program or effect handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Handle to a compiled shader program owned by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Identity of an effect inside an [`EffectStore`](crate::EffectStore).
///
/// Two queue entries refer to the same effect exactly when their ids are equal.
/// Ids are never reused by the store that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub(crate) u32);

/// Monotonic id source shared by the handle types.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Component holding the buffers a camera renders with.
///
/// `color` and `depth` are produced by the scene renderer every frame;
/// `display` is where the last effect (or the bypass copy) writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraTargets {
    /// Rendered scene colour.
    pub color: TextureId,
    /// Linear scene depth in world units, red channel. `None` when the camera
    /// has no outstanding [`DepthRequests`]; fog effects then skip.
    pub depth: Option<TextureId>,
    /// Final presentation target.
    pub display: TextureId,
}

/// Component counting the scripts on a camera that need its scene depth map.
///
/// Fog scripts take a request when they initialize and give it back when
/// destroyed. The scene renderer fills [`CameraTargets::depth`] while any
/// request is outstanding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthRequests(u32);

impl DepthRequests {
    pub fn request(&mut self) {
        self.0 += 1;
    }

    pub fn release(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn count(&self) -> u32 {
        self.0
    }

    pub fn wanted(&self) -> bool {
        self.0 > 0
    }
}

/// Component linking a script entity to the camera whose queue it feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachedTo(pub hecs::Entity);
