//! Named uniform bookkeeping with change detection.
//!
//! The store remembers the last value written under every name together with
//! the location it resolved to in the current program. A write whose value is
//! component-for-component equal to the stored one is skipped, unless the
//! program was relinked since (see [`UniformStore::invalidate`]), in which case
//! every known uniform is dirty and uploads again exactly once.
//!
//! Sampler uniforms get texture units from an ordered list of names. The list
//! is append-only while one program stays linked, so a name keeps its unit
//! even if it is later overwritten. A relink compacts the list to the names
//! still holding a texture, in their original registration order.

use std::collections::BTreeMap;

use crate::error::{RenderReport, ReportKind, Reporter};

use super::backend::{Gl, UniformUpload};

/// Handle to a texture owned by a [`crate::ProgramLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u64);

/// Anything that can be assigned to a uniform name.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// More than four components, uploaded with `uniform1fv`.
    FloatArray(Vec<f32>),
    Texture(TextureId),
    /// A texture named by string that has not been bound to a GPU texture.
    TextureRef(String),
    Struct(Vec<(String, UniformValue)>),
    Array(Vec<UniformValue>),
}

impl UniformValue {
    /// Picks the numeric variant matching the component count.
    pub fn from_components(values: &[f32]) -> Option<Self> {
        Some(match values {
            [] => return None,
            [x] => UniformValue::Float(*x),
            [x, y] => UniformValue::Vec2([*x, *y]),
            [x, y, z] => UniformValue::Vec3([*x, *y, *z]),
            [x, y, z, w] => UniformValue::Vec4([*x, *y, *z, *w]),
            more => UniformValue::FloatArray(more.to_vec()),
        })
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bool(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<TextureId> for UniformValue {
    fn from(value: TextureId) -> Self {
        UniformValue::Texture(value)
    }
}

/// A leaf value after flattening; exactly one upload call shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Float(f32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    FloatArray(Vec<f32>),
    Texture(TextureId),
    TextureRef(String),
}

impl Primitive {
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Primitive::Texture(id) => Some(*id),
            _ => None,
        }
    }
}

/// Expands structs and arrays into `(name, primitive)` pairs.
///
/// Struct fields become `name.field`, array items `name[i]`. A float array
/// leaf is addressed through its first element (`name[0]`), which is the
/// location `uniform1fv` expects.
pub fn flatten(name: &str, value: &UniformValue) -> Vec<(String, Primitive)> {
    let mut out = Vec::new();
    flatten_into(name.to_string(), value, &mut out);
    out
}

fn flatten_into(name: String, value: &UniformValue, out: &mut Vec<(String, Primitive)>) {
    let leaf = match value {
        UniformValue::Float(v) => Primitive::Float(*v),
        UniformValue::Bool(v) => Primitive::Bool(*v),
        UniformValue::Vec2(v) => Primitive::Vec2(*v),
        UniformValue::Vec3(v) => Primitive::Vec3(*v),
        UniformValue::Vec4(v) => Primitive::Vec4(*v),
        UniformValue::Texture(id) => Primitive::Texture(*id),
        UniformValue::TextureRef(path) => Primitive::TextureRef(path.clone()),
        UniformValue::FloatArray(values) => {
            let name = if name.ends_with(']') {
                name
            } else {
                format!("{name}[0]")
            };
            out.push((name, Primitive::FloatArray(values.clone())));
            return;
        }
        UniformValue::Struct(fields) => {
            for (field, nested) in fields {
                flatten_into(format!("{name}.{field}"), nested, out);
            }
            return;
        }
        UniformValue::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(format!("{name}[{index}]"), nested, out);
            }
            return;
        }
    };
    out.push((name, leaf));
}

/// Result of a single [`UniformStore::set`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Same value as last time and nothing invalidated it.
    Unchanged,
    /// The current program has no such uniform.
    Missing,
    /// Stored; uploads once a program is linked.
    Deferred,
    /// Stored as a texture reference with nothing to bind.
    Unbound,
}

#[derive(Debug)]
struct UniformEntry<L> {
    value: Primitive,
    location: Option<L>,
    resolved: bool,
    dirty: bool,
    reported_missing: bool,
}

impl<L> UniformEntry<L> {
    fn new(value: Primitive) -> Self {
        Self {
            value,
            location: None,
            resolved: false,
            dirty: true,
            reported_missing: false,
        }
    }
}

pub struct UniformStore<G: Gl> {
    entries: BTreeMap<String, UniformEntry<G::Location>>,
    texture_units: Vec<String>,
    force_render: bool,
}

impl<G: Gl> Default for UniformStore<G> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            texture_units: Vec::new(),
            force_render: false,
        }
    }
}

impl<G: Gl> UniformStore<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name` and uploads it when it changed.
    ///
    /// `program` must already be bound with `use_program` when it is `Some`.
    pub fn set(
        &mut self,
        gl: &G,
        program: Option<G::Program>,
        name: &str,
        value: Primitive,
        reporter: &Reporter,
    ) -> UploadOutcome {
        if let Some(entry) = self.entries.get(name) {
            if entry.value == value && !entry.dirty {
                return UploadOutcome::Unchanged;
            }
        }
        let is_texture = matches!(value, Primitive::Texture(_));
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value;
                entry.dirty = true;
            }
            None => {
                self.entries
                    .insert(name.to_string(), UniformEntry::new(value));
            }
        }
        self.force_render = true;

        if is_texture && !self.texture_units.iter().any(|bound| bound == name) {
            self.texture_units.push(name.to_string());
        }

        let unit = self.unit_of(name);
        let Some(entry) = self.entries.get_mut(name) else {
            return UploadOutcome::Deferred;
        };
        Self::upload_entry(gl, program, name, entry, unit, reporter)
    }

    /// Uploads every dirty entry; used right before a draw after relinking.
    pub fn flush(&mut self, gl: &G, program: G::Program, reporter: &Reporter) -> usize {
        let units: BTreeMap<String, u32> = self
            .texture_units
            .iter()
            .enumerate()
            .map(|(unit, name)| (name.clone(), unit as u32))
            .collect();
        let mut uploaded = 0;
        for (name, entry) in self.entries.iter_mut().filter(|(_, entry)| entry.dirty) {
            let unit = units.get(name).copied();
            if Self::upload_entry(gl, Some(program), name, entry, unit, reporter)
                == UploadOutcome::Uploaded
            {
                uploaded += 1;
            }
        }
        uploaded
    }

    fn upload_entry(
        gl: &G,
        program: Option<G::Program>,
        name: &str,
        entry: &mut UniformEntry<G::Location>,
        unit: Option<u32>,
        reporter: &Reporter,
    ) -> UploadOutcome {
        if let Primitive::TextureRef(path) = &entry.value {
            entry.dirty = false;
            tracing::debug!(uniform = name, texture = %path, "texture reference has no bound texture");
            return UploadOutcome::Unbound;
        }
        let Some(program) = program else {
            return UploadOutcome::Deferred;
        };
        if !entry.resolved {
            entry.location = gl.uniform_location(program, name);
            entry.resolved = true;
        }
        entry.dirty = false;
        let Some(location) = entry.location.as_ref() else {
            if !entry.reported_missing {
                entry.reported_missing = true;
                reporter.report(RenderReport::new(
                    ReportKind::UniformNotFound,
                    format!("uniform `{name}` is not declared by the active program"),
                ));
            }
            return UploadOutcome::Missing;
        };
        let upload = match &entry.value {
            Primitive::Float(v) => UniformUpload::Float(*v),
            Primitive::Bool(v) => UniformUpload::Int(i32::from(*v)),
            Primitive::Vec2(v) => UniformUpload::Vec2(*v),
            Primitive::Vec3(v) => UniformUpload::Vec3(*v),
            Primitive::Vec4(v) => UniformUpload::Vec4(*v),
            Primitive::FloatArray(values) => UniformUpload::FloatArray(values),
            Primitive::Texture(_) => UniformUpload::Int(unit.unwrap_or(0) as i32),
            Primitive::TextureRef(_) => return UploadOutcome::Unbound,
        };
        gl.upload_uniform(location, upload);
        UploadOutcome::Uploaded
    }

    /// Drops cached locations and texture units after a relink.
    ///
    /// Values are kept and marked dirty so the next write or flush re-uploads
    /// them once. Missing-uniform warnings are re-armed for the new program.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.location = None;
            entry.resolved = false;
            entry.dirty = true;
            entry.reported_missing = false;
        }
        let entries = &self.entries;
        self.texture_units.retain(|name| {
            entries
                .get(name)
                .is_some_and(|entry| matches!(entry.value, Primitive::Texture(_)))
        });
        self.force_render = true;
    }

    /// Forgets everything, including values.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.texture_units.clear();
        self.force_render = false;
    }

    pub fn value(&self, name: &str) -> Option<&Primitive> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        self.unit_of(name)
    }

    fn unit_of(&self, name: &str) -> Option<u32> {
        self.texture_units
            .iter()
            .position(|bound| bound == name)
            .map(|unit| unit as u32)
    }

    /// `(unit, texture)` pairs to bind before drawing.
    pub fn texture_bindings(&self) -> Vec<(u32, TextureId)> {
        self.texture_units
            .iter()
            .enumerate()
            .filter_map(|(unit, name)| {
                let texture = self.entries.get(name)?.value.texture()?;
                Some((unit as u32, texture))
            })
            .collect()
    }

    pub fn needs_render(&self) -> bool {
        self.force_render
    }

    /// Reads and clears the force-render flag.
    pub fn take_force_render(&mut self) -> bool {
        std::mem::take(&mut self.force_render)
    }
}
