//! Session description for the command-line renderer.
//!
//! A session is a JSON document listing the resolution, the camera pose and
//! the ordered effect chain:
//!
//! ```json
//! {
//!   "width": 320,
//!   "height": 240,
//!   "frames": 2,
//!   "camera": { "position": [0, 2, 6], "eulerDegrees": [-10, 0, 0] },
//!   "effects": [
//!     { "kind": "pixelate", "attributes": { "amount": 6 } },
//!     { "kind": "fog", "attributes": { "fogColor": [0.6, 0.7, 0.8] } }
//!   ]
//! }
//! ```
//!
//! Every field has a default, so `{}` is a valid (effect-less) session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::CameraTransform;
use crate::effect::EffectKind;
use crate::params::AttributeValue;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend unavailable: {0}")]
    Backend(String),
}

/// Which [`RenderBackend`](crate::RenderBackend) renders the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendChoice {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub euler_degrees: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 1.5, 6.0],
            euler_degrees: [-8.0, 0.0, 0.0],
            fov_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraConfig {
    pub fn transform(&self) -> CameraTransform {
        let [x, y, z] = self.euler_degrees;
        let mut camera = CameraTransform::at(self.position.into())
            .with_euler_degrees(x, y, z)
            .with_fov(self.fov_degrees);
        camera.near = self.near;
        camera.far = self.far;
        camera
    }
}

/// One entry of the effect chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectConfig {
    pub kind: EffectKind,
    /// Attribute overrides, applied in name order.
    #[serde(default)]
    pub attributes: std::collections::BTreeMap<String, AttributeValue>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            attributes: Default::default(),
            enabled: true,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A resolution change applied before the given frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    pub frame: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub resize: Vec<Resize>,
    pub camera: CameraConfig,
    pub effects: Vec<EffectConfig>,
    /// Directory LUT paths are resolved against.
    pub asset_root: PathBuf,
    pub output: PathBuf,
    pub backend: BackendChoice,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frames: 1,
            resize: Vec::new(),
            camera: CameraConfig::default(),
            effects: Vec::new(),
            asset_root: PathBuf::from("."),
            output: PathBuf::from("screenfx.png"),
            backend: BackendChoice::Cpu,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn frames(mut self, frames: u32) -> Self {
        self.frames = frames;
        self
    }

    pub fn resize_at(mut self, frame: u32, width: u32, height: u32) -> Self {
        self.resize.push(Resize {
            frame,
            width,
            height,
        });
        self
    }

    pub fn camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn effect(mut self, effect: EffectConfig) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    pub fn backend(mut self, backend: BackendChoice) -> Self {
        self.backend = backend;
        self
    }

    /// Resolution in effect at `frame`, after every resize scheduled at or
    /// before it.
    pub fn resolution_at(&self, frame: u32) -> (u32, u32) {
        let mut schedule: Vec<&Resize> = self.resize.iter().filter(|r| r.frame <= frame).collect();
        schedule.sort_by_key(|r| r.frame);
        schedule
            .last()
            .map_or((self.width, self.height), |r| (r.width, r.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
    }

    #[test]
    fn parses_effect_chain() {
        let config = SessionConfig::from_json(
            r#"{
                "width": 64, "height": 32,
                "effects": [
                    { "kind": "pixelate", "attributes": { "amount": 6 } },
                    { "kind": "heightFog", "attributes": { "fogColor": [0.5, 0.6, 0.7] }, "enabled": false },
                    { "kind": "lutPixelate", "attributes": { "textureAsset": "luts/warm.png" } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!((config.width, config.height), (64, 32));
        let kinds: Vec<_> = config.effects.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [EffectKind::Pixelate, EffectKind::HeightFog, EffectKind::LutPixelate]
        );
        assert_eq!(config.effects[0].attributes["amount"], AttributeValue::Number(6.0));
        assert!(!config.effects[1].enabled);
        assert_eq!(
            config.effects[2].attributes["textureAsset"],
            AttributeValue::Asset("luts/warm.png".into())
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = SessionConfig::from_json(r#"{ "effects": [{ "kind": "bloom" }] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn resize_schedule() {
        let config = SessionConfig::new()
            .size(800, 600)
            .resize_at(3, 1920, 1080)
            .resize_at(1, 1024, 768);
        assert_eq!(config.resolution_at(0), (800, 600));
        assert_eq!(config.resolution_at(2), (1024, 768));
        assert_eq!(config.resolution_at(5), (1920, 1080));
    }

    #[test]
    fn builder_round_trips_through_json() {
        let config = SessionConfig::new()
            .effect(EffectConfig::new(EffectKind::Saturate).attribute("satMult", AttributeValue::Number(2.0)))
            .backend(BackendChoice::Gpu);
        let parsed = SessionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
