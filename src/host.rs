//! A minimal host: cameras, attached effect scripts and the frame loop.
//!
//! Cameras and scripts are entities in a [`hecs::World`]. A camera carries a
//! [`CameraTransform`], its [`EffectQueue`], its [`CameraTargets`] and the
//! [`DepthRequests`] its fog scripts hold; a script
//! carries an [`EffectScript`] and an [`AttachedTo`] link to its camera.
//!
//! Attribute changes, enable/disable and destroy can be applied directly or
//! sent as [`Notification`]s from any thread through [`Host::notifier`]. Sent
//! notifications are applied at the start of the next [`Host::render_frame`],
//! so a change sent before frame N is visible in frame N.
//!
//! # Example
//!
//! ```ignore
//! let mut host = Host::new(CpuBackend::new(320, 240));
//! let camera = host.spawn_camera(CameraTransform::default(), targets);
//! let fog = host.attach_script(camera, EffectKind::Fog, vec![])?;
//!
//! host.notifier().send(Notification::SetEnabled { script: fog, enabled: false })?;
//! for (camera, report) in host.render_frame() {
//!     println!("{camera:?}: {} stages drawn", report.drawn());
//! }
//! ```

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use hecs::{ComponentError, Entity, World};
use image::Rgba32FImage;

use crate::assets::AssetLoader;
use crate::backend::{BackendError, RenderBackend};
use crate::camera::{CameraTransform, FrameInputs};
use crate::compositor::{EffectQueue, FrameReport, RenderContext};
use crate::ecs::{AttachedTo, CameraTargets, DepthRequests, EffectId};
use crate::effect::{EffectKind, EffectStore};
use crate::params::{AttributeKind, AttributeValue};
use crate::script::{EffectScript, ScriptEnv, ScriptError, ScriptState};

/// A lifecycle event for a script, deliverable from any thread.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    SetAttribute {
        script: Entity,
        name: String,
        value: AttributeValue,
    },
    SetEnabled {
        script: Entity,
        enabled: bool,
    },
    Destroy {
        script: Entity,
    },
}

/// Errors from host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no such entity {0:?}")]
    NoSuchEntity(Entity),
    #[error("{0:?} is not a camera")]
    NotACamera(Entity),
    #[error("{0:?} is not an effect script")]
    NotAScript(Entity),
    #[error("{kind} has no attribute '{name}'")]
    UnknownAttribute { kind: EffectKind, name: String },
    #[error("attribute '{name}' expects {expected:?}, got {found:?}")]
    AttributeKind {
        name: String,
        expected: AttributeKind,
        found: AttributeKind,
    },
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Checks `value` against the kind's schema and clamps it into range.
pub fn validate_attribute(
    kind: EffectKind,
    name: &str,
    value: AttributeValue,
) -> Result<AttributeValue, HostError> {
    let schema = kind.attribute(name).ok_or_else(|| HostError::UnknownAttribute {
        kind,
        name: name.to_string(),
    })?;
    if value.kind() != schema.kind {
        return Err(HostError::AttributeKind {
            name: name.to_string(),
            expected: schema.kind,
            found: value.kind(),
        });
    }
    Ok(schema.clamp(value))
}

/// Owns the backend, the world and every effect, and drives frames.
pub struct Host<B: RenderBackend> {
    backend: B,
    world: World,
    store: EffectStore,
    assets: AssetLoader,
    sender: Sender<Notification>,
    receiver: Receiver<Notification>,
}

impl<B: RenderBackend> Host<B> {
    pub fn new(backend: B) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            backend,
            world: World::new(),
            store: EffectStore::new(),
            assets: AssetLoader::default(),
            sender,
            receiver,
        }
    }

    /// Resolve asset paths (LUT images) against `assets`.
    pub fn with_assets(mut self, assets: AssetLoader) -> Self {
        self.assets = assets;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn store(&self) -> &EffectStore {
        &self.store
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Sender for notifications applied at the start of the next frame.
    pub fn notifier(&self) -> Sender<Notification> {
        self.sender.clone()
    }

    pub fn spawn_camera(&mut self, transform: CameraTransform, targets: CameraTargets) -> Entity {
        self.world.spawn((transform, EffectQueue::new(), targets, DepthRequests::default()))
    }

    /// Whether any script on `camera` needs the scene depth map.
    ///
    /// The scene renderer should provide [`CameraTargets::depth`] while this
    /// holds; depth-reading stages pass through without it.
    pub fn camera_wants_depth(&self, camera: Entity) -> Result<bool, HostError> {
        let requests = self
            .world
            .get::<&DepthRequests>(camera)
            .map_err(|e| camera_error(camera, e))?;
        Ok(requests.wanted())
    }

    pub fn set_camera_transform(
        &mut self,
        camera: Entity,
        transform: CameraTransform,
    ) -> Result<(), HostError> {
        let mut current = self
            .world
            .get::<&mut CameraTransform>(camera)
            .map_err(|e| camera_error(camera, e))?;
        *current = transform;
        Ok(())
    }

    pub fn set_camera_targets(&mut self, camera: Entity, targets: CameraTargets) -> Result<(), HostError> {
        let mut current = self
            .world
            .get::<&mut CameraTargets>(camera)
            .map_err(|e| camera_error(camera, e))?;
        *current = targets;
        Ok(())
    }

    /// Effect order of a camera's queue.
    pub fn queue(&self, camera: Entity) -> Result<Vec<EffectId>, HostError> {
        let queue = self
            .world
            .get::<&EffectQueue>(camera)
            .map_err(|e| camera_error(camera, e))?;
        Ok(queue.effects().to_vec())
    }

    /// Scratch target size of a camera's queue, once it has rendered.
    pub fn scratch_size(&self, camera: Entity) -> Result<Option<(u32, u32)>, HostError> {
        let queue = self
            .world
            .get::<&EffectQueue>(camera)
            .map_err(|e| camera_error(camera, e))?;
        Ok(queue.scratch_size())
    }

    pub fn script_state(&self, script: Entity) -> Result<ScriptState, HostError> {
        let state = self
            .world
            .get::<&EffectScript>(script)
            .map_err(|e| script_error(script, e))?;
        Ok(state.state())
    }

    pub fn script_effect(&self, script: Entity) -> Result<Option<EffectId>, HostError> {
        let state = self
            .world
            .get::<&EffectScript>(script)
            .map_err(|e| script_error(script, e))?;
        Ok(state.effect())
    }

    /// Whether the script is still waiting on a LUT image.
    pub fn script_loading(&self, script: Entity) -> Result<bool, HostError> {
        let state = self
            .world
            .get::<&EffectScript>(script)
            .map_err(|e| script_error(script, e))?;
        Ok(state.is_loading())
    }

    /// Creates a script of `kind` on `camera` and initializes it.
    ///
    /// Attribute values are validated and clamped first; nothing is created
    /// if any of them is rejected.
    pub fn attach_script(
        &mut self,
        camera: Entity,
        kind: EffectKind,
        attributes: Vec<(String, AttributeValue)>,
    ) -> Result<Entity, HostError> {
        self.world
            .get::<&EffectQueue>(camera)
            .map_err(|e| camera_error(camera, e))?;
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| {
                let value = validate_attribute(kind, &name, value)?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, HostError>>()?;

        let script = self.world.spawn((EffectScript::new(kind), AttachedTo(camera)));
        self.with_script(script, |state, env| state.initialize(env, attributes))??;
        Ok(script)
    }

    /// Validates, clamps and applies one attribute change.
    pub fn set_attribute(
        &mut self,
        script: Entity,
        name: &str,
        value: AttributeValue,
    ) -> Result<(), HostError> {
        let kind = self
            .world
            .get::<&EffectScript>(script)
            .map_err(|e| script_error(script, e))?
            .kind();
        let value = validate_attribute(kind, name, value)?;
        self.with_script(script, |state, env| state.set_attribute(env, name, value))??;
        Ok(())
    }

    pub fn set_enabled(&mut self, script: Entity, enabled: bool) -> Result<(), HostError> {
        self.with_script(script, |state, env| state.set_enabled(env, enabled))??;
        Ok(())
    }

    /// Destroys a script. The entity stays, in the destroyed state, until
    /// [`remove_script`](Self::remove_script).
    pub fn destroy_script(&mut self, script: Entity) -> Result<(), HostError> {
        self.with_script(script, |state, env| state.destroy(env))??;
        Ok(())
    }

    /// Destroys the script if needed and despawns its entity.
    pub fn remove_script(&mut self, script: Entity) -> Result<(), HostError> {
        if self.script_state(script)? != ScriptState::Destroyed {
            self.destroy_script(script)?;
        }
        self.world
            .despawn(script)
            .map_err(|_| HostError::NoSuchEntity(script))
    }

    /// Removes a camera, its scripts and its scratch targets.
    pub fn despawn_camera(&mut self, camera: Entity) -> Result<(), HostError> {
        let scripts: Vec<Entity> = self
            .world
            .query::<&AttachedTo>()
            .iter()
            .filter(|(_, link)| link.0 == camera)
            .map(|(entity, _)| entity)
            .collect();
        for script in scripts {
            self.remove_script(script)?;
        }

        let mut queue = self
            .world
            .remove_one::<EffectQueue>(camera)
            .map_err(|e| camera_error(camera, e))?;
        queue.release(&mut self.backend);
        self.world
            .despawn(camera)
            .map_err(|_| HostError::NoSuchEntity(camera))
    }

    /// Applies every queued notification. Failures are logged and dropped.
    pub fn process_notifications(&mut self) -> usize {
        let pending: Vec<Notification> = self.receiver.try_iter().collect();
        let count = pending.len();
        for notification in pending {
            let result = match &notification {
                Notification::SetAttribute {
                    script,
                    name,
                    value,
                } => self.set_attribute(*script, name, value.clone()),
                Notification::SetEnabled { script, enabled } => self.set_enabled(*script, *enabled),
                Notification::Destroy { script } => self.destroy_script(*script),
            };
            if let Err(err) = result {
                log::warn!("dropping {notification:?}: {err}");
            }
        }
        count
    }

    /// Runs one frame: notifications, script updates, then every camera's
    /// queue in entity order.
    ///
    /// A camera whose queue cannot allocate its scratch targets is presented
    /// unprocessed and left out of the returned reports.
    pub fn render_frame(&mut self) -> Vec<(Entity, FrameReport)> {
        self.process_notifications();

        let (width, height) = self.backend.resolution();
        let aspect = width as f32 / height.max(1) as f32;
        let frames: HashMap<Entity, FrameInputs> = self
            .world
            .query::<&CameraTransform>()
            .iter()
            .map(|(entity, transform)| (entity, FrameInputs::from_camera(transform, aspect)))
            .collect();

        let scripts: Vec<(Entity, Entity)> = self
            .world
            .query::<(&EffectScript, &AttachedTo)>()
            .iter()
            .map(|(entity, (_, link))| (entity, link.0))
            .collect();
        for (script, camera) in scripts {
            let Some(frame) = frames.get(&camera) else {
                continue;
            };
            if let Err(err) = self.with_script(script, |state, env| state.update(env, frame)) {
                log::warn!("update of {script:?} skipped: {err}");
            }
        }

        let mut cameras: Vec<Entity> = frames.keys().copied().collect();
        cameras.sort_by_key(|e| e.id());

        let mut reports = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let Ok(mut query) = self
                .world
                .query_one::<(&mut EffectQueue, &CameraTargets)>(camera)
            else {
                continue;
            };
            let Some((queue, targets)) = query.get() else {
                continue;
            };

            let mut ctx = RenderContext::new(&mut self.backend, targets.depth);
            match queue.render(&mut ctx, &self.store, targets.color, targets.display) {
                Ok(report) => {
                    if report.is_bypassed() {
                        present_scene(&mut self.backend, targets);
                    }
                    reports.push((camera, report));
                }
                Err(err) => {
                    log::error!("{camera:?} effect queue failed: {err}");
                    present_scene(&mut self.backend, targets);
                }
            }
        }
        reports
    }

    /// Reads back a camera's display target.
    pub fn read_display(&mut self, camera: Entity) -> Result<Rgba32FImage, HostError> {
        let display = self
            .world
            .get::<&CameraTargets>(camera)
            .map_err(|e| camera_error(camera, e))?
            .display;
        Ok(self.backend.read_pixels(display)?)
    }

    fn with_script<R>(
        &mut self,
        script: Entity,
        f: impl FnOnce(&mut EffectScript, &mut ScriptEnv) -> R,
    ) -> Result<R, HostError> {
        let camera = self
            .world
            .get::<&AttachedTo>(script)
            .map_err(|e| script_error(script, e))?
            .0;
        let mut state = self
            .world
            .get::<&mut EffectScript>(script)
            .map_err(|e| script_error(script, e))?;
        let mut queue = self
            .world
            .get::<&mut EffectQueue>(camera)
            .map_err(|e| camera_error(camera, e))?;
        let mut depth = self
            .world
            .get::<&mut DepthRequests>(camera)
            .map_err(|e| camera_error(camera, e))?;

        let mut env = ScriptEnv {
            backend: &mut self.backend,
            store: &mut self.store,
            queue: &mut *queue,
            depth: &mut *depth,
            assets: &self.assets,
        };
        Ok(f(&mut *state, &mut env))
    }
}

fn present_scene(backend: &mut dyn RenderBackend, targets: &CameraTargets) {
    if let Err(err) = backend.copy_texture(targets.color, targets.display) {
        log::warn!("could not present scene colour: {err}");
    }
}

fn camera_error(camera: Entity, err: ComponentError) -> HostError {
    match err {
        ComponentError::NoSuchEntity => HostError::NoSuchEntity(camera),
        ComponentError::MissingComponent(_) => HostError::NotACamera(camera),
    }
}

fn script_error(script: Entity, err: ComponentError) -> HostError {
    match err {
        ComponentError::NoSuchEntity => HostError::NoSuchEntity(script),
        ComponentError::MissingComponent(_) => HostError::NotAScript(script),
    }
}
