//! The per-camera effect queue.

use crate::backend::{BackendError, RenderBackend};
use crate::compositor::{PostEffect, RenderContext, RenderTarget, StageError, Viewport};
use crate::ecs::{EffectId, TextureId};
use crate::effect::EffectStore;

const SCRATCH_LABELS: [&str; 2] = ["effect scratch A", "effect scratch B"];

/// What happened to one stage of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Drawn,
    /// The stage's input was copied to its output unchanged.
    Skipped(StageError),
}

/// Result of one [`EffectQueue::render`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    /// The queue was empty; the scene colour was presented as is.
    Bypassed,
    /// Every queued effect ran as a stage, in queue order.
    Rendered { stages: Vec<(EffectId, StageOutcome)> },
}

impl FrameReport {
    pub fn is_bypassed(&self) -> bool {
        matches!(self, FrameReport::Bypassed)
    }

    /// Number of stages that drew.
    pub fn drawn(&self) -> usize {
        match self {
            FrameReport::Bypassed => 0,
            FrameReport::Rendered { stages } => stages
                .iter()
                .filter(|(_, outcome)| *outcome == StageOutcome::Drawn)
                .count(),
        }
    }

    /// Stages that were passed through, with the reason.
    pub fn skipped(&self) -> Vec<(EffectId, &StageError)> {
        match self {
            FrameReport::Bypassed => Vec::new(),
            FrameReport::Rendered { stages } => stages
                .iter()
                .filter_map(|(id, outcome)| match outcome {
                    StageOutcome::Skipped(err) => Some((*id, err)),
                    StageOutcome::Drawn => None,
                })
                .collect(),
        }
    }
}

/// Ordered chain of effects applied to one camera's image.
///
/// Each effect appears at most once and runs in the order it was added. The
/// queue owns two scratch targets and ping-pongs between them:
///
/// ```text
/// Stage 0: scene     → Scratch A
/// Stage 1: Scratch A → Scratch B
/// Stage 2: Scratch B → Scratch A
/// Stage 3: Scratch A → display
/// ```
///
/// A stage never reads the target it writes.
#[derive(Debug, Default)]
pub struct EffectQueue {
    effects: Vec<EffectId>,
    scratch: Option<[RenderTarget; 2]>,
}

impl EffectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` at the tail. Returns `false` if it is already queued.
    pub fn add_effect(&mut self, id: EffectId) -> bool {
        if self.effects.contains(&id) {
            log::debug!("{id:?} is already queued");
            return false;
        }
        self.effects.push(id);
        true
    }

    /// Removes `id`. Returns `false` if it was not queued.
    pub fn remove_effect(&mut self, id: EffectId) -> bool {
        match self.effects.iter().position(|e| *e == id) {
            Some(index) => {
                self.effects.remove(index);
                true
            }
            None => false,
        }
    }

    /// Queued effects in compositing order.
    pub fn effects(&self) -> &[EffectId] {
        &self.effects
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.effects.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Size the scratch targets were last allocated at.
    pub fn scratch_size(&self) -> Option<(u32, u32)> {
        self.scratch.as_ref().map(|[a, _]| a.size())
    }

    /// Handles of the scratch targets, once allocated.
    pub fn scratch_targets(&self) -> Option<[TextureId; 2]> {
        self.scratch.as_ref().map(|[a, b]| [a.id, b.id])
    }

    /// Runs every queued effect over `scene` and writes the result to `display`.
    ///
    /// An empty queue draws nothing and reports [`FrameReport::Bypassed`]; the
    /// caller presents the scene colour directly. Otherwise the scratch targets
    /// are matched to the backend resolution before the first stage, and a
    /// stage that cannot draw passes its input through so the chain always
    /// completes.
    ///
    /// # Errors
    ///
    /// Only when the scratch targets cannot be allocated.
    pub fn render(
        &mut self,
        ctx: &mut RenderContext,
        store: &EffectStore,
        scene: TextureId,
        display: TextureId,
    ) -> Result<FrameReport, BackendError> {
        if self.effects.is_empty() {
            return Ok(FrameReport::Bypassed);
        }

        let (width, height) = ctx.backend.resolution();
        let scratch = self.ensure_scratch(ctx, width, height)?;
        let viewport = Viewport::full(width, height);

        let mut stages = Vec::with_capacity(self.effects.len());
        let mut input = scene;
        for (i, &id) in self.effects.iter().enumerate() {
            let is_last = i == self.effects.len() - 1;
            let output = if is_last { display } else { scratch[i % 2] };

            let result = match store.get(id) {
                Some(effect) => effect.render(ctx, input, output, viewport),
                None => Err(StageError::MissingEffect),
            };

            let outcome = match result {
                Ok(()) => StageOutcome::Drawn,
                Err(err) => {
                    match &err {
                        StageError::ResourceNotReady(what) => {
                            log::debug!("stage {i} ({id:?}) skipped: {what} not ready")
                        }
                        other => log::warn!("stage {i} ({id:?}) skipped: {other}"),
                    }
                    if let Err(copy) = ctx.backend.copy_texture(input, output) {
                        log::warn!("pass-through copy for stage {i} failed: {copy}");
                    }
                    StageOutcome::Skipped(err)
                }
            };
            stages.push((id, outcome));
            input = output;
        }

        Ok(FrameReport::Rendered { stages })
    }

    fn ensure_scratch(
        &mut self,
        ctx: &mut RenderContext,
        width: u32,
        height: u32,
    ) -> Result<[TextureId; 2], BackendError> {
        if let Some(targets) = &mut self.scratch {
            for (target, label) in targets.iter_mut().zip(SCRATCH_LABELS) {
                target.ensure_size(ctx.backend, width, height, label)?;
            }
            return Ok([targets[0].id, targets[1].id]);
        }

        let a = RenderTarget::new(ctx.backend, width, height, SCRATCH_LABELS[0])?;
        let b = match RenderTarget::new(ctx.backend, width, height, SCRATCH_LABELS[1]) {
            Ok(b) => b,
            Err(err) => {
                a.release(ctx.backend);
                return Err(err);
            }
        };
        let targets = self.scratch.insert([a, b]);
        Ok([targets[0].id, targets[1].id])
    }

    /// Frees the scratch targets. The queue reallocates them on the next render.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(targets) = self.scratch.take() {
            for target in targets {
                target.release(backend);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::effect::{Effect, EffectKind};
    use image::{Rgba, RgbaImage};

    struct Fixture {
        backend: CpuBackend,
        store: EffectStore,
        queue: EffectQueue,
        scene: TextureId,
        display: TextureId,
    }

    impl Fixture {
        fn new(width: u32, height: u32) -> Self {
            let mut backend = CpuBackend::new(width, height);
            let scene = backend
                .upload_color(
                    &RgbaImage::from_pixel(width, height, Rgba([180, 90, 30, 255])),
                    "scene",
                )
                .unwrap();
            let display = backend.create_target(width, height, "display").unwrap();
            Self {
                backend,
                store: EffectStore::new(),
                queue: EffectQueue::new(),
                scene,
                display,
            }
        }

        fn add(&mut self, kind: EffectKind) -> EffectId {
            let id = self.store.insert(Effect::new(kind, &mut self.backend));
            self.queue.add_effect(id);
            id
        }

        fn render(&mut self) -> FrameReport {
            let mut ctx = RenderContext::new(&mut self.backend, None);
            self.queue
                .render(&mut ctx, &self.store, self.scene, self.display)
                .unwrap()
        }
    }

    #[test]
    fn add_is_ordered_and_unique() {
        let mut queue = EffectQueue::new();
        assert!(queue.add_effect(EffectId(2)));
        assert!(queue.add_effect(EffectId(1)));
        assert!(!queue.add_effect(EffectId(2)));
        assert_eq!(queue.effects(), &[EffectId(2), EffectId(1)]);

        assert!(queue.remove_effect(EffectId(2)));
        assert!(!queue.remove_effect(EffectId(2)));
        assert_eq!(queue.effects(), &[EffectId(1)]);
    }

    #[test]
    fn empty_queue_is_bypassed_without_scratch() {
        let mut fx = Fixture::new(4, 4);
        assert_eq!(fx.render(), FrameReport::Bypassed);
        assert_eq!(fx.queue.scratch_size(), None);
        assert_eq!(fx.backend.draw_count(), 0);
    }

    #[test]
    fn stages_run_in_order_into_scratch_then_display() {
        let mut fx = Fixture::new(8, 6);
        let a = fx.add(EffectKind::Saturate);
        let b = fx.add(EffectKind::Compress);

        let report = fx.render();
        assert_eq!(
            report,
            FrameReport::Rendered {
                stages: vec![(a, StageOutcome::Drawn), (b, StageOutcome::Drawn)]
            }
        );
        assert_eq!(fx.queue.scratch_size(), Some((8, 6)));
        assert_eq!(fx.backend.draw_count(), 2);

        // the scene target is only ever read
        let scene = fx.backend.read_pixels(fx.scene).unwrap();
        assert!((scene.get_pixel(0, 0).0[0] - 180.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn missing_effect_passes_input_through() {
        let mut fx = Fixture::new(4, 4);
        fx.queue.add_effect(EffectId(99));

        let report = fx.render();
        assert_eq!(report.drawn(), 0);
        assert_eq!(report.skipped(), vec![(EffectId(99), &StageError::MissingEffect)]);

        let display = fx.backend.read_pixels(fx.display).unwrap();
        assert_eq!(display, fx.backend.read_pixels(fx.scene).unwrap());
    }

    #[test]
    fn resize_reallocates_scratch_before_first_stage() {
        let mut fx = Fixture::new(800, 600);
        fx.queue.add_effect(EffectId(99));
        fx.render();
        let before = fx.queue.scratch_targets().unwrap();

        fx.backend.resize(1920, 1080);
        fx.render();
        assert_eq!(fx.queue.scratch_size(), Some((1920, 1080)));
        let after = fx.queue.scratch_targets().unwrap();
        assert_ne!(before, after);
        for id in after {
            assert_eq!(fx.backend.texture_size(id), Some((1920, 1080)));
        }
        for id in before {
            assert_eq!(fx.backend.texture_size(id), None);
        }
    }

    #[test]
    fn binding_mismatch_passes_input_through() {
        use crate::binding::{BindingError, UniformDecl, UniformKind};
        use crate::shader::{COLOR_BUFFER, Kernel, ShaderProgram, VIEWPORT};

        // saturate with `satMult` declared as a vector
        static MISDECLARED: ShaderProgram = ShaderProgram {
            label: "saturate (vec3 satMult)",
            source: "",
            uniforms: &[
                UniformDecl::new(VIEWPORT, UniformKind::Vec4),
                UniformDecl::new("satMult", UniformKind::Vec3),
                UniformDecl::new(COLOR_BUFFER, UniformKind::Texture),
            ],
            kernel: Kernel::Saturate,
        };

        let mut fx = Fixture::new(4, 4);
        let program = fx.backend.compile_program(&MISDECLARED).unwrap();
        let id = fx
            .store
            .insert(Effect::from_parts(EffectKind::Saturate, Some(program)));
        fx.queue.add_effect(id);

        let report = fx.render();
        assert_eq!(
            report.skipped(),
            vec![(
                id,
                &StageError::Binding(BindingError::TypeMismatch {
                    name: "satMult".into(),
                    expected: UniformKind::Vec3,
                    found: UniformKind::Float,
                })
            )]
        );
        assert_eq!(fx.backend.draw_count(), 0);
        let display = fx.backend.read_pixels(fx.display).unwrap();
        assert_eq!(display, fx.backend.read_pixels(fx.scene).unwrap());
    }

    #[test]
    fn release_frees_scratch() {
        let mut fx = Fixture::new(4, 4);
        fx.add(EffectKind::Saturate);
        fx.render();
        let textures = fx.backend.texture_count();

        fx.queue.release(&mut fx.backend);
        assert_eq!(fx.backend.texture_count(), textures - 2);
        assert_eq!(fx.queue.scratch_size(), None);
    }
}
