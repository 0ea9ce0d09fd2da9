//! Parameter binding: named effect parameters to shader uniform slots.
//!
//! Every compiled program owns a [`UniformScope`] with one slot per uniform the
//! program declares. Before each draw the effect resolves its parameters into
//! that scope by name with [`bind_parameters`]:
//!
//! - a parameter the program does not declare is ignored (logged at debug);
//! - a declared uniform nobody sets keeps whatever value it had last frame;
//! - a parameter whose type disagrees with the declaration is a
//!   [`BindingError`], and the caller skips the stage.
//!
//! [`UniformLayout`] turns a scope into the bytes of a WGSL uniform buffer for
//! backends that need one.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::ecs::TextureId;
use crate::params::ParameterSet;

/// Type of a declared uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Texture,
}

impl UniformKind {
    /// `(align, size)` in bytes in the WGSL uniform address space.
    /// Textures occupy no buffer space.
    pub fn layout(self) -> Option<(usize, usize)> {
        match self {
            UniformKind::Float => Some((4, 4)),
            UniformKind::Vec2 => Some((8, 8)),
            UniformKind::Vec3 => Some((16, 12)),
            UniformKind::Vec4 => Some((16, 16)),
            UniformKind::Mat4 => Some((16, 64)),
            UniformKind::Texture => None,
        }
    }
}

/// A value held by a uniform slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Texture(TextureId),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
            UniformValue::Texture(_) => {}
        }
    }
}

impl From<crate::params::ParameterValue> for UniformValue {
    fn from(value: crate::params::ParameterValue) -> Self {
        use crate::params::ParameterValue;
        match value {
            ParameterValue::Float(v) => UniformValue::Float(v),
            ParameterValue::Vec2(v) => UniformValue::Vec2(v),
            ParameterValue::Vec3(v) => UniformValue::Vec3(v),
            ParameterValue::Mat4(m) => UniformValue::Mat4(m),
        }
    }
}

/// A uniform declared by a shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub const fn new(name: &'static str, kind: UniformKind) -> Self {
        Self { name, kind }
    }
}

/// Binding failure for one stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("uniform '{name}' is declared {expected:?} but was given {found:?}")]
    TypeMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
}

#[derive(Clone, Debug)]
struct UniformSlot {
    decl: UniformDecl,
    value: Option<UniformValue>,
}

/// Uniform state of one program. Values persist until overwritten.
#[derive(Clone, Debug)]
pub struct UniformScope {
    slots: Vec<UniformSlot>,
}

impl UniformScope {
    pub fn new(decls: &[UniformDecl]) -> Self {
        Self {
            slots: decls
                .iter()
                .map(|&decl| UniformSlot { decl, value: None })
                .collect(),
        }
    }

    /// Sets a uniform by name.
    ///
    /// Returns `Ok(false)` when the program declares no such uniform.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<bool, BindingError> {
        let Some(slot) = self.slots.iter_mut().find(|s| s.decl.name == name) else {
            return Ok(false);
        };
        if slot.decl.kind != value.kind() {
            return Err(BindingError::TypeMismatch {
                name: name.to_string(),
                expected: slot.decl.kind,
                found: value.kind(),
            });
        }
        slot.value = Some(value);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.slots
            .iter()
            .find(|s| s.decl.name == name)
            .and_then(|s| s.value)
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(UniformValue::Float(v)) => v,
            _ => 0.0,
        }
    }

    pub fn vec3(&self, name: &str) -> Vec3 {
        match self.get(name) {
            Some(UniformValue::Vec3(v)) => v,
            _ => Vec3::ZERO,
        }
    }

    pub fn vec4(&self, name: &str) -> Vec4 {
        match self.get(name) {
            Some(UniformValue::Vec4(v)) => v,
            _ => Vec4::ZERO,
        }
    }

    pub fn mat4(&self, name: &str) -> Mat4 {
        match self.get(name) {
            Some(UniformValue::Mat4(m)) => m,
            _ => Mat4::IDENTITY,
        }
    }

    pub fn texture(&self, name: &str) -> Option<TextureId> {
        match self.get(name) {
            Some(UniformValue::Texture(id)) => Some(id),
            _ => None,
        }
    }

    /// Declarations in program order.
    pub fn decls(&self) -> impl Iterator<Item = &UniformDecl> {
        self.slots.iter().map(|s| &s.decl)
    }

    /// Texture uniforms in declaration order with their bound value.
    pub fn textures(&self) -> impl Iterator<Item = (&'static str, Option<TextureId>)> + '_ {
        self.slots
            .iter()
            .filter(|s| s.decl.kind == UniformKind::Texture)
            .map(|s| match s.value {
                Some(UniformValue::Texture(id)) => (s.decl.name, Some(id)),
                _ => (s.decl.name, None),
            })
    }
}

/// Outcome of a successful bind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Parameters the program does not declare.
    pub ignored: Vec<&'static str>,
}

/// Pushes every parameter into `scope` by name.
pub fn bind_parameters(
    params: &ParameterSet,
    scope: &mut UniformScope,
) -> Result<BindReport, BindingError> {
    let mut report = BindReport::default();
    for param in params.iter() {
        if !scope.set(param.name, param.value.into())? {
            log::debug!("parameter '{}' has no matching uniform, ignored", param.name);
            report.ignored.push(param.name);
        }
    }
    Ok(report)
}

/// Byte layout of a program's non-texture uniforms as one WGSL struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    offsets: Vec<(&'static str, usize, usize)>,
    size: usize,
}

impl UniformLayout {
    /// Lays out declarations in order using WGSL uniform alignment rules.
    /// The struct size is rounded up to 16 bytes.
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offsets = Vec::new();
        let mut offset = 0usize;
        for decl in decls {
            let Some((align, size)) = decl.kind.layout() else {
                continue;
            };
            offset = offset.next_multiple_of(align);
            offsets.push((decl.name, offset, size));
            offset += size;
        }
        Self {
            offsets,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|&(_, offset, _)| offset)
    }

    /// Packs the current scope values; unset slots are zero.
    pub fn pack(&self, scope: &UniformScope) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for &(name, offset, size) in &self.offsets {
            if let Some(value) = scope.get(name) {
                value.write(&mut bytes[offset..offset + size]);
            }
        }
        bytes
    }
}
