//! Host-side lifecycle of one effect instance.
//!
//! An [`EffectScript`] is what the host attaches to a camera entity. It turns
//! the host's lifecycle events into effect and queue operations:
//!
//! ```text
//!                 initialize            set_enabled(false)
//! Uninitialized ─────────────▶ Active ◀──────────────────▶ Inactive
//!       │                        │       set_enabled(true)     │
//!       │                        ▼                             │
//!       └──────────────────▶ Destroyed ◀──────────────────────┘
//!            destroy                       destroy
//! ```
//!
//! Re-enabling appends the effect at the tail of the queue, so an effect that
//! was toggled off and on runs after everything added in the meantime.

use crate::assets::{AssetLoader, PendingTexture, Poll};
use crate::backend::RenderBackend;
use crate::camera::FrameInputs;
use crate::compositor::EffectQueue;
use crate::ecs::{DepthRequests, EffectId};
use crate::effect::{Effect, EffectKind, EffectStore, TEXTURE_ASSET};
use crate::params::{AttributeValue, ParameterError};

/// Lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script has not been initialized")]
    NotInitialized,
    #[error("script is already initialized")]
    AlreadyInitialized,
    #[error("script has been destroyed")]
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptState {
    Uninitialized,
    Active,
    Inactive,
    Destroyed,
}

/// Everything a script touches while handling one event.
pub struct ScriptEnv<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub store: &'a mut EffectStore,
    /// Queue of the camera the script is attached to.
    pub queue: &'a mut EffectQueue,
    /// Depth map requests of that camera.
    pub depth: &'a mut DepthRequests,
    pub assets: &'a AssetLoader,
}

/// Lifecycle state machine shared by every effect kind.
#[derive(Debug)]
pub struct EffectScript {
    kind: EffectKind,
    state: ScriptState,
    effect: Option<EffectId>,
    buffered: Vec<(String, AttributeValue)>,
    lut_load: Option<PendingTexture>,
    holds_depth: bool,
}

impl EffectScript {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            state: ScriptState::Uninitialized,
            effect: None,
            buffered: Vec::new(),
            lut_load: None,
            holds_depth: false,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    /// The effect this script created, once initialized and until destroyed.
    pub fn effect(&self) -> Option<EffectId> {
        self.effect
    }

    /// Whether a LUT load is still in flight.
    pub fn is_loading(&self) -> bool {
        self.lut_load.is_some()
    }

    /// Creates the effect from the kind's defaults overlaid with attribute
    /// values, stores it and appends it to the camera's queue. Depth-reading
    /// kinds also request the camera's scene depth map.
    pub fn initialize(
        &mut self,
        env: &mut ScriptEnv,
        attributes: Vec<(String, AttributeValue)>,
    ) -> Result<EffectId, ScriptError> {
        match self.state {
            ScriptState::Uninitialized => {}
            ScriptState::Destroyed => return Err(ScriptError::Destroyed),
            ScriptState::Active | ScriptState::Inactive => return Err(ScriptError::AlreadyInitialized),
        }

        let mut effect = Effect::new(self.kind, env.backend);
        let buffered = std::mem::take(&mut self.buffered);
        for (name, value) in buffered.into_iter().chain(attributes) {
            if let Some(load) = apply(self.kind, &mut effect, env.assets, &name, value) {
                self.lut_load = Some(load);
            }
        }

        let id = env.store.insert(effect);
        env.queue.add_effect(id);
        if self.kind.needs_depth() {
            env.depth.request();
            self.holds_depth = true;
        }
        self.effect = Some(id);
        self.state = ScriptState::Active;
        log::info!("{} effect {id:?} initialized", self.kind);
        Ok(id)
    }

    /// Applies an attribute change. Before initialization the value is kept
    /// and applied by [`initialize`](Self::initialize).
    pub fn set_attribute(
        &mut self,
        env: &mut ScriptEnv,
        name: &str,
        value: AttributeValue,
    ) -> Result<(), ScriptError> {
        match self.state {
            ScriptState::Destroyed => Err(ScriptError::Destroyed),
            ScriptState::Uninitialized => {
                self.buffered.push((name.to_string(), value));
                Ok(())
            }
            ScriptState::Active | ScriptState::Inactive => {
                let Some(id) = self.effect else {
                    return Err(ScriptError::NotInitialized);
                };
                let Some(effect) = env.store.get_mut(id) else {
                    log::warn!("{} effect {id:?} missing from store", self.kind);
                    return Ok(());
                };
                if let Some(load) = apply(self.kind, effect, env.assets, name, value) {
                    self.lut_load = Some(load);
                }
                Ok(())
            }
        }
    }

    /// Adds the effect to or removes it from the queue.
    pub fn set_enabled(&mut self, env: &mut ScriptEnv, enabled: bool) -> Result<(), ScriptError> {
        let id = match (self.state, self.effect) {
            (ScriptState::Destroyed, _) => return Err(ScriptError::Destroyed),
            (ScriptState::Uninitialized, _) | (_, None) => return Err(ScriptError::NotInitialized),
            (_, Some(id)) => id,
        };

        match (self.state, enabled) {
            (ScriptState::Active, false) => {
                env.queue.remove_effect(id);
                self.state = ScriptState::Inactive;
                log::info!("{} effect {id:?} disabled", self.kind);
            }
            (ScriptState::Inactive, true) => {
                env.queue.add_effect(id);
                self.state = ScriptState::Active;
                log::info!("{} effect {id:?} enabled", self.kind);
            }
            _ => {}
        }
        Ok(())
    }

    /// Per-frame update: derived camera parameters and LUT completion.
    ///
    /// Runs for inactive scripts too, so they resume with fresh values.
    pub fn update(&mut self, env: &mut ScriptEnv, frame: &FrameInputs) {
        let Some(id) = self.effect else {
            return;
        };
        let Some(effect) = env.store.get_mut(id) else {
            return;
        };
        effect.update_frame(frame);

        let Some(pending) = self.lut_load.as_mut() else {
            return;
        };
        match pending.poll() {
            Poll::Pending => {}
            Poll::Ready(image) => {
                let path = pending.path().display().to_string();
                self.lut_load = None;
                let Some(slot) = effect.lut() else {
                    return;
                };
                match env.backend.upload_color(&image, "lut texture") {
                    Ok(texture) => {
                        if slot.install(texture) {
                            log::info!("{} effect {id:?} installed LUT {path}", self.kind);
                        } else {
                            env.backend.release_texture(texture);
                        }
                    }
                    Err(err) => log::warn!("failed to upload LUT {path}: {err}"),
                }
            }
            Poll::Failed(err) => {
                log::warn!("{} effect {id:?} LUT load failed: {err}", self.kind);
                self.lut_load = None;
            }
        }
    }

    /// Removes the effect from the queue, frees its resources and drops its
    /// depth map request.
    pub fn destroy(&mut self, env: &mut ScriptEnv) -> Result<(), ScriptError> {
        if self.state == ScriptState::Destroyed {
            return Err(ScriptError::Destroyed);
        }
        if let Some(id) = self.effect.take() {
            env.queue.remove_effect(id);
            if let Some(effect) = env.store.remove(id) {
                effect.release(env.backend);
            }
            log::info!("{} effect {id:?} destroyed", self.kind);
        }
        if std::mem::take(&mut self.holds_depth) {
            env.depth.release();
        }
        self.lut_load = None;
        self.buffered.clear();
        self.state = ScriptState::Destroyed;
        Ok(())
    }
}

/// Writes one attribute into `effect`. Returns a LUT load to track when the
/// attribute names a new LUT image.
fn apply(
    kind: EffectKind,
    effect: &mut Effect,
    assets: &AssetLoader,
    name: &str,
    value: AttributeValue,
) -> Option<PendingTexture> {
    if name == TEXTURE_ASSET {
        match (&value, effect.lut()) {
            (AttributeValue::Asset(path), Some(slot)) if !slot.is_installed() => {
                return Some(assets.load(path));
            }
            (AttributeValue::Asset(path), Some(_)) => {
                log::debug!("{kind} already has a LUT, ignoring {path}");
            }
            _ => log::debug!("{kind} ignores {name}={value:?}"),
        }
        return None;
    }

    let Some(param) = value.to_parameter() else {
        log::debug!("{kind} ignores non-numeric value for {name}");
        return None;
    };
    match effect.set_parameter(name, param) {
        Ok(()) => {}
        Err(ParameterError::Unknown(_)) => log::debug!("{kind} has no attribute {name}"),
        Err(err) => log::warn!("{kind}: {err}"),
    }
    None
}
