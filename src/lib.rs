//! # screenfx
//!
//! **Screen-space post effects, chained per camera.**
//!
//! Seven full-screen transforms (block compression, pixelation with contrast,
//! three depth fogs, LUT grading and saturation) run as an ordered chain over
//! a camera's rendered colour. The chain ping-pongs between two scratch targets
//! and the last stage writes the display target. Stages that cannot draw yet
//! pass their input through, so a frame always completes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use screenfx::*;
//!
//! let mut backend = CpuBackend::new(320, 240);
//! let scene = backend.create_target(320, 240, "scene").unwrap();
//! let depth = backend.upload_depth(320, 240, &vec![10.0; 320 * 240], "depth").unwrap();
//! let display = backend.create_target(320, 240, "display").unwrap();
//!
//! let mut host = Host::new(backend);
//! let camera = host.spawn_camera(
//!     CameraTransform::default(),
//!     CameraTargets { color: scene, depth: Some(depth), display },
//! );
//! host.attach_script(camera, EffectKind::Pixelate, vec![]).unwrap();
//! host.attach_script(
//!     camera,
//!     EffectKind::Fog,
//!     vec![("fogColor".into(), AttributeValue::Rgb([0.6, 0.7, 0.8]))],
//! )
//! .unwrap();
//!
//! let reports = host.render_frame();
//! let image = host.read_display(camera).unwrap();
//! ```
//!
//! ## Layers
//!
//! - [`kernels`]: the per-pixel maths, shared by the CPU backend and mirrored
//!   by the WGSL programs.
//! - [`RenderBackend`]: textures, programs, uniform scopes and full-screen
//!   draws. [`CpuBackend`] evaluates kernels on `image` buffers;
//!   [`WgpuBackend`] runs the WGSL programs headlessly.
//! - [`EffectQueue`]: per-camera ordered chain with ping-pong scratch targets.
//! - [`EffectScript`]: lifecycle adapter (initialize, enable/disable, update,
//!   destroy) that keeps an effect in its camera's queue.
//! - [`Host`]: a `hecs` world of cameras and scripts plus the frame loop.

mod assets;
mod backend;
mod binding;
mod camera;
mod compositor;
mod config;
mod ecs;
mod effect;
mod gpu;
mod host;
pub mod kernels;
mod params;
mod script;
mod shader;

pub use assets::{AssetError, AssetLoader, PendingTexture, Poll, identity_lut};
pub use backend::{BackendError, CpuBackend, RenderBackend, WgpuBackend};
pub use binding::{
    BindReport, BindingError, UniformDecl, UniformKind, UniformLayout, UniformScope, UniformValue,
    bind_parameters,
};
pub use camera::{CameraTransform, FrameInputs};
pub use compositor::{
    EffectQueue, FrameReport, PostEffect, RenderContext, RenderTarget, StageError, StageOutcome,
    Viewport,
};
pub use config::{BackendChoice, CameraConfig, ConfigError, EffectConfig, Resize, SessionConfig};
pub use ecs::{AttachedTo, CameraTargets, DepthRequests, EffectId, ProgramId, TextureId};
pub use effect::{Effect, EffectKind, EffectStore, TEXTURE_ASSET, TextureSlot};
pub use gpu::GpuContext;
pub use host::{Host, HostError, Notification, validate_attribute};
pub use params::{
    AttributeKind, AttributeSchema, AttributeValue, Parameter, ParameterError, ParameterSet,
    ParameterValue,
};
pub use script::{EffectScript, ScriptEnv, ScriptError, ScriptState};
pub use shader::{Kernel, ShaderProgram};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

pub use hecs::{Entity, World};
