//! Effect parameters and the attribute schema exposed to the host.
//!
//! Two layers live here:
//!
//! - [`ParameterSet`]: the typed, ordered values an [`Effect`](crate::Effect)
//!   pushes to its shader every frame.
//! - [`AttributeSchema`] / [`AttributeValue`]: what the host's attribute system
//!   shows to users (label, range, default) and sends in change notifications.
//!   Numbers become `Float` parameters, colours become `Vec3`, asset references
//!   are handled by the script adapter.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::binding::UniformKind;

/// Typed value of an effect parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Mat4(Mat4),
}

impl ParameterValue {
    /// Uniform type this value binds to.
    pub fn kind(&self) -> UniformKind {
        match self {
            ParameterValue::Float(_) => UniformKind::Float,
            ParameterValue::Vec2(_) => UniformKind::Vec2,
            ParameterValue::Vec3(_) => UniformKind::Vec3,
            ParameterValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Scalar view (0.0 for non-scalar values).
    pub fn as_f32(&self) -> f32 {
        match self {
            ParameterValue::Float(v) => *v,
            _ => 0.0,
        }
    }

    /// Vector view (zero for non-`Vec3` values).
    pub fn as_vec3(&self) -> Vec3 {
        match self {
            ParameterValue::Vec3(v) => *v,
            _ => Vec3::ZERO,
        }
    }
}

/// A named parameter and its current value.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn new(name: &'static str, value: ParameterValue) -> Self {
        Self { name, value }
    }
}

/// Errors when assigning a parameter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("no parameter named '{0}'")]
    Unknown(String),
    #[error("parameter '{name}' is {expected:?}, got {found:?}")]
    Kind {
        name: &'static str,
        expected: UniformKind,
        found: UniformKind,
    },
}

/// Ordered set of parameters; order is the declaration order of the effect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter. Declaring an existing name replaces its value
    /// and keeps its position.
    pub fn declare(&mut self, name: &'static str, value: ParameterValue) {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.params.push(Parameter::new(name, value)),
        }
    }

    pub fn with(mut self, name: &'static str, value: ParameterValue) -> Self {
        self.declare(name, value);
        self
    }

    /// Assigns a new value to a declared parameter of the same type.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        if param.value.kind() != value.kind() {
            return Err(ParameterError::Kind {
                name: param.name,
                expected: param.value.kind(),
                found: value.kind(),
            });
        }
        param.value = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.params.iter().find(|p| p.name == name).map(|p| p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Kind of value an attribute holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Number,
    Rgb,
    Asset,
}

/// Value carried by attribute-change notifications and session configs.
///
/// Serialized untagged so JSON reads naturally: `8`, `[1, 0, 0]`, `"lut.png"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f32),
    Rgb([f32; 3]),
    Asset(String),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Number(_) => AttributeKind::Number,
            AttributeValue::Rgb(_) => AttributeKind::Rgb,
            AttributeValue::Asset(_) => AttributeKind::Asset,
        }
    }

    /// Parameter form of this value; asset references have none.
    pub fn to_parameter(&self) -> Option<ParameterValue> {
        match self {
            AttributeValue::Number(v) => Some(ParameterValue::Float(*v)),
            AttributeValue::Rgb(c) => Some(ParameterValue::Vec3(Vec3::from_array(*c))),
            AttributeValue::Asset(_) => None,
        }
    }
}

/// Host-facing description of one tunable attribute.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub kind: AttributeKind,
    /// `None` for asset references, which have no default.
    pub default: Option<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

impl AttributeSchema {
    pub fn number(
        name: &'static str,
        label: &'static str,
        description: &'static str,
        default: f32,
        min: f32,
        max: f32,
    ) -> Self {
        Self {
            name,
            label,
            description,
            kind: AttributeKind::Number,
            default: Some(AttributeValue::Number(default)),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn rgb(name: &'static str, label: &'static str, default: [f32; 3]) -> Self {
        Self {
            name,
            label,
            description: "",
            kind: AttributeKind::Rgb,
            default: Some(AttributeValue::Rgb(default)),
            min: None,
            max: None,
        }
    }

    pub fn asset(name: &'static str, label: &'static str, description: &'static str) -> Self {
        Self {
            name,
            label,
            description,
            kind: AttributeKind::Asset,
            default: None,
            min: None,
            max: None,
        }
    }

    /// Clamps numbers into `[min, max]` and colour channels into `[0, 1]`.
    pub fn clamp(&self, value: AttributeValue) -> AttributeValue {
        match value {
            AttributeValue::Number(v) => {
                let lo = self.min.unwrap_or(f32::NEG_INFINITY);
                let hi = self.max.unwrap_or(f32::INFINITY);
                AttributeValue::Number(v.clamp(lo, hi))
            }
            AttributeValue::Rgb(c) => AttributeValue::Rgb(c.map(|v| v.clamp(0.0, 1.0))),
            other => other,
        }
    }
}
