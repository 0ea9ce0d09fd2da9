//! The built-in effects and the store that owns them.
//!
//! All seven variants share one [`Effect`] struct tagged with an
//! [`EffectKind`]. The kind fixes the program, the parameter set and the
//! attribute schema; only parameter values change after construction.

use std::collections::HashMap;
use std::sync::OnceLock;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::RenderBackend;
use crate::binding::{UniformValue, bind_parameters};
use crate::camera::FrameInputs;
use crate::compositor::{PostEffect, RenderContext, StageError, Viewport};
use crate::ecs::{EffectId, IdAllocator, ProgramId, TextureId};
use crate::params::{AttributeSchema, ParameterError, ParameterSet, ParameterValue};
use crate::shader::{self, COLOR_BUFFER, DEPTH_BUFFER, LUT_TEXTURE, ShaderProgram, VIEWPORT};

/// Attribute naming the LUT image of [`EffectKind::LutPixelate`].
pub const TEXTURE_ASSET: &str = "textureAsset";

/// The seven screen-space transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    /// Pixelate and quantize each channel to a number of steps.
    Compress,
    /// Pixelate with a two-band contrast adjustment.
    Pixelate,
    /// Linear depth fog.
    Fog,
    /// Exponential fog that thins with camera height.
    HeightFog,
    /// Linear fog whose sky factor follows camera pitch.
    RotationFog,
    /// Pixelate, contrast, then a packed 3D colour lookup.
    LutPixelate,
    /// Scale HSV saturation.
    Saturate,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Compress,
        EffectKind::Pixelate,
        EffectKind::Fog,
        EffectKind::HeightFog,
        EffectKind::RotationFog,
        EffectKind::LutPixelate,
        EffectKind::Saturate,
    ];

    /// Script name the host uses for this effect.
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Compress => "compress",
            EffectKind::Pixelate => "pixelate",
            EffectKind::Fog => "fog",
            EffectKind::HeightFog => "heightFog",
            EffectKind::RotationFog => "rotationFog",
            EffectKind::LutPixelate => "lutPixelate",
            EffectKind::Saturate => "saturate",
        }
    }

    pub fn program(self) -> &'static ShaderProgram {
        match self {
            EffectKind::Compress => &shader::COMPRESS,
            EffectKind::Pixelate => &shader::PIXELATE,
            EffectKind::Fog => &shader::FOG,
            EffectKind::HeightFog => &shader::HEIGHT_FOG,
            EffectKind::RotationFog => &shader::ROTATION_FOG,
            EffectKind::LutPixelate => &shader::LUT_GRADE,
            EffectKind::Saturate => &shader::SATURATE,
        }
    }

    /// Whether the effect reads the scene depth buffer.
    pub fn needs_depth(self) -> bool {
        matches!(
            self,
            EffectKind::Fog | EffectKind::HeightFog | EffectKind::RotationFog
        )
    }

    /// Tunable attributes exposed to the host, in declaration order.
    pub fn schema(self) -> Vec<AttributeSchema> {
        let amount = || AttributeSchema::number("amount", "Amount", "The size of each pixel.", 12.0, 1.0, 64.0);
        let low = |default| {
            AttributeSchema::number("lowContrast", "Low Contrast", "The low contrast multiplier.", default, 0.0, 2.0)
        };
        let high = |default| {
            AttributeSchema::number("highContrast", "High Contrast", "The high contrast multiplier.", default, 0.0, 2.0)
        };
        let fog_color = || AttributeSchema::rgb("fogColor", "Fog Color", [0.0; 3]);

        match self {
            EffectKind::Compress => vec![
                amount(),
                AttributeSchema::number("steps", "Steps", "The steps for each channel.", 8.0, 1.0, 256.0),
            ],
            EffectKind::Pixelate => vec![amount(), low(1.1), high(0.9)],
            EffectKind::Fog | EffectKind::HeightFog | EffectKind::RotationFog => vec![fog_color()],
            EffectKind::LutPixelate => vec![
                amount(),
                low(0.9),
                high(1.1),
                AttributeSchema::asset(TEXTURE_ASSET, "LUT Texture", "256x256 packed lookup table image."),
            ],
            EffectKind::Saturate => vec![AttributeSchema::number(
                "satMult",
                "Saturation",
                "Saturation multiplier.",
                1.0,
                0.0,
                5.0,
            )],
        }
    }

    pub fn attribute(self, name: &str) -> Option<AttributeSchema> {
        self.schema().into_iter().find(|a| a.name == name)
    }

    /// Parameters at their defaults: every schema default, plus the values
    /// derived from the camera each frame.
    pub fn default_parameters(self) -> ParameterSet {
        let mut params = ParameterSet::new();
        for attribute in self.schema() {
            if let Some(value) = attribute.default.as_ref().and_then(|d| d.to_parameter()) {
                params.declare(attribute.name, value);
            }
        }
        match self {
            EffectKind::HeightFog => {
                params.declare("cameraPosition", ParameterValue::Vec3(Vec3::ZERO));
                params.declare("inverseViewProjection", ParameterValue::Mat4(Mat4::IDENTITY));
            }
            EffectKind::RotationFog => params.declare("cameraPitch", ParameterValue::Float(0.0)),
            _ => {}
        }
        params
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Write-once holder for a texture that arrives after the effect is created.
///
/// Readers see either nothing or the final handle.
#[derive(Debug, Default)]
pub struct TextureSlot(OnceLock<TextureId>);

impl TextureSlot {
    pub fn get(&self) -> Option<TextureId> {
        self.0.get().copied()
    }

    /// Installs `id`. Returns `false` and leaves the slot untouched if a
    /// texture is already installed.
    pub fn install(&self, id: TextureId) -> bool {
        self.0.set(id).is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.0.get().is_some()
    }
}

/// One screen-space effect: a program handle and its parameters.
#[derive(Debug)]
pub struct Effect {
    kind: EffectKind,
    program: Option<ProgramId>,
    params: ParameterSet,
    lut: Option<TextureSlot>,
}

impl Effect {
    /// Compiles the kind's program and sets every parameter to its default.
    ///
    /// A compile failure is logged and leaves the effect without a program;
    /// it then passes its input through on every frame.
    pub fn new(kind: EffectKind, backend: &mut dyn RenderBackend) -> Self {
        let program = match backend.compile_program(kind.program()) {
            Ok(id) => Some(id),
            Err(err) => {
                log::error!("{kind} effect disabled: {err}");
                None
            }
        };
        Self::from_parts(kind, program)
    }

    /// Builds an effect around an already compiled program (or none).
    pub fn from_parts(kind: EffectKind, program: Option<ProgramId>) -> Self {
        let lut = (kind == EffectKind::LutPixelate).then(TextureSlot::default);
        Self {
            kind,
            program,
            params: kind.default_parameters(),
            lut,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        self.params.set(name, value)
    }

    /// Pushes the per-frame camera values the kind derives its parameters from.
    pub fn update_frame(&mut self, frame: &FrameInputs) {
        let result = match self.kind {
            EffectKind::HeightFog => self
                .params
                .set("cameraPosition", ParameterValue::Vec3(frame.camera_position))
                .and_then(|()| {
                    self.params.set(
                        "inverseViewProjection",
                        ParameterValue::Mat4(frame.inverse_view_projection()),
                    )
                }),
            EffectKind::RotationFog => self
                .params
                .set("cameraPitch", ParameterValue::Float(frame.pitch())),
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("{} frame update failed: {err}", self.kind);
        }
    }

    /// LUT slot, for the kinds that have one.
    pub fn lut(&self) -> Option<&TextureSlot> {
        self.lut.as_ref()
    }

    /// Whether the effect has everything it needs to draw.
    pub fn is_ready(&self) -> bool {
        self.program.is_some() && self.lut.as_ref().is_none_or(TextureSlot::is_installed)
    }

    /// Frees the program and any installed LUT texture.
    pub fn release(self, backend: &mut dyn RenderBackend) {
        if let Some(program) = self.program {
            backend.release_program(program);
        }
        if let Some(texture) = self.lut.as_ref().and_then(TextureSlot::get) {
            backend.release_texture(texture);
        }
    }
}

impl PostEffect for Effect {
    fn render(
        &self,
        ctx: &mut RenderContext,
        input: TextureId,
        output: TextureId,
        viewport: Viewport,
    ) -> Result<(), StageError> {
        let program = self.program.ok_or(StageError::ProgramUnavailable)?;
        let lut = match &self.lut {
            Some(slot) => Some(slot.get().ok_or(StageError::ResourceNotReady("lut texture"))?),
            None => None,
        };
        let depth = if self.kind.needs_depth() {
            Some(ctx.depth.ok_or(StageError::ResourceNotReady("depth buffer"))?)
        } else {
            None
        };

        let scope = ctx.backend.uniforms(program)?;
        scope.set(VIEWPORT, UniformValue::Vec4(viewport.as_vec4()))?;
        scope.set(COLOR_BUFFER, UniformValue::Texture(input))?;
        if let Some(depth) = depth {
            scope.set(DEPTH_BUFFER, UniformValue::Texture(depth))?;
        }
        if let Some(lut) = lut {
            scope.set(LUT_TEXTURE, UniformValue::Texture(lut))?;
        }
        bind_parameters(&self.params, scope)?;

        ctx.backend.draw_fullscreen(program, output, viewport)?;
        Ok(())
    }
}

/// Owner of every live effect, keyed by [`EffectId`].
///
/// Ids are never reused, so a stale id held by a queue resolves to nothing
/// instead of to a different effect.
#[derive(Debug, Default)]
pub struct EffectStore {
    effects: HashMap<EffectId, Effect>,
    ids: IdAllocator,
}

impl EffectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, effect: Effect) -> EffectId {
        let id = EffectId(self.ids.next());
        self.effects.insert(id, effect);
        id
    }

    pub fn get(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(&id)
    }

    pub fn get_mut(&mut self, id: EffectId) -> Option<&mut Effect> {
        self.effects.get_mut(&id)
    }

    /// Removes the effect without releasing its resources.
    pub fn remove(&mut self, id: EffectId) -> Option<Effect> {
        self.effects.remove(&id)
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.effects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::camera::CameraTransform;
    use crate::params::AttributeKind;

    #[test]
    fn defaults_follow_schema() {
        let params = EffectKind::Compress.default_parameters();
        assert_eq!(params.get("amount"), Some(ParameterValue::Float(12.0)));
        assert_eq!(params.get("steps"), Some(ParameterValue::Float(8.0)));

        let params = EffectKind::Pixelate.default_parameters();
        assert_eq!(params.get("lowContrast"), Some(ParameterValue::Float(1.1)));
        assert_eq!(params.get("highContrast"), Some(ParameterValue::Float(0.9)));

        let params = EffectKind::LutPixelate.default_parameters();
        assert_eq!(params.get("lowContrast"), Some(ParameterValue::Float(0.9)));
        assert_eq!(params.get(TEXTURE_ASSET), None);

        let params = EffectKind::Saturate.default_parameters();
        assert_eq!(params.get("satMult"), Some(ParameterValue::Float(1.0)));
    }

    #[test]
    fn every_parameter_has_a_uniform() {
        for kind in EffectKind::ALL {
            let program = kind.program();
            for param in kind.default_parameters().iter() {
                assert!(program.declares(param.name), "{kind}: {}", param.name);
            }
        }
    }

    #[test]
    fn schema_kinds() {
        let lut = EffectKind::LutPixelate.attribute(TEXTURE_ASSET).unwrap();
        assert_eq!(lut.kind, AttributeKind::Asset);
        assert_eq!(lut.default, None);
        assert_eq!(
            EffectKind::RotationFog.attribute("fogColor").unwrap().kind,
            AttributeKind::Rgb
        );
        assert!(EffectKind::Fog.attribute("amount").is_none());
    }

    #[test]
    fn frame_update_sets_derived_values() {
        let camera = CameraTransform::at(Vec3::new(0.0, 3.0, 0.0)).with_euler_degrees(30.0, 0.0, 0.0);
        let frame = FrameInputs::from_camera(&camera, 1.0);

        let mut height = Effect::from_parts(EffectKind::HeightFog, None);
        height.update_frame(&frame);
        assert_eq!(
            height.params().get("cameraPosition"),
            Some(ParameterValue::Vec3(Vec3::new(0.0, 3.0, 0.0)))
        );

        let mut rotation = Effect::from_parts(EffectKind::RotationFog, None);
        rotation.update_frame(&frame);
        let pitch = rotation.params().get("cameraPitch").unwrap().as_f32();
        assert!((pitch - 30.0).abs() < 1e-3);
    }

    #[test]
    fn lut_slot_installs_once() {
        let effect = Effect::from_parts(EffectKind::LutPixelate, Some(ProgramId(0)));
        assert!(!effect.is_ready());
        let slot = effect.lut().unwrap();
        assert!(slot.install(TextureId(7)));
        assert!(!slot.install(TextureId(8)));
        assert_eq!(slot.get(), Some(TextureId(7)));
        assert!(effect.is_ready());
    }

    #[test]
    fn failed_compile_leaves_no_program() {
        let mut backend = CpuBackend::new(4, 4);
        backend.reject_program("saturate");
        let effect = Effect::new(EffectKind::Saturate, &mut backend);
        assert_eq!(effect.program(), None);

        let scene = backend.create_target(4, 4, "scene").unwrap();
        let out = backend.create_target(4, 4, "out").unwrap();
        let mut ctx = RenderContext::new(&mut backend, None);
        assert_eq!(
            effect.render(&mut ctx, scene, out, Viewport::full(4, 4)),
            Err(StageError::ProgramUnavailable)
        );
    }

    #[test]
    fn fog_without_depth_is_not_ready() {
        let mut backend = CpuBackend::new(4, 4);
        let effect = Effect::new(EffectKind::Fog, &mut backend);
        let scene = backend.create_target(4, 4, "scene").unwrap();
        let out = backend.create_target(4, 4, "out").unwrap();
        let mut ctx = RenderContext::new(&mut backend, None);
        assert_eq!(
            effect.render(&mut ctx, scene, out, Viewport::full(4, 4)),
            Err(StageError::ResourceNotReady("depth buffer"))
        );
    }

    #[test]
    fn release_frees_program() {
        let mut backend = CpuBackend::new(4, 4);
        let effect = Effect::new(EffectKind::Compress, &mut backend);
        assert_eq!(backend.program_count(), 1);
        effect.release(&mut backend);
        assert_eq!(backend.program_count(), 0);
    }

    #[test]
    fn store_ids_are_not_reused() {
        let mut store = EffectStore::new();
        let a = store.insert(Effect::from_parts(EffectKind::Fog, None));
        store.remove(a);
        let b = store.insert(Effect::from_parts(EffectKind::Fog, None));
        assert_ne!(a, b);
        assert!(store.get(a).is_none());
        assert_eq!(store.len(), 1);
    }
}
