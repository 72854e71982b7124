//! A [`Gl`] fake that records calls instead of touching a GPU.
//!
//! Shader sources are scanned for `uniform <type> <name>;` declarations to
//! decide which uniform locations exist. Two markers simulate driver
//! failures: a line containing `FAIL_COMPILE` fails compilation of that
//! stage, and `FAIL_LINK` anywhere in either stage fails the link.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use crate::gpu::{Gl, Rect, ShaderStage, Size, UniformUpload};

/// Owned copy of a [`UniformUpload`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUpload {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    FloatArray(Vec<f32>),
}

impl From<UniformUpload<'_>> for RecordedUpload {
    fn from(upload: UniformUpload<'_>) -> Self {
        match upload {
            UniformUpload::Float(v) => RecordedUpload::Float(v),
            UniformUpload::Int(v) => RecordedUpload::Int(v),
            UniformUpload::Vec2(v) => RecordedUpload::Vec2(v),
            UniformUpload::Vec3(v) => RecordedUpload::Vec3(v),
            UniformUpload::Vec4(v) => RecordedUpload::Vec4(v),
            UniformUpload::FloatArray(v) => RecordedUpload::FloatArray(v.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLocation {
    pub program: u32,
    pub name: String,
}

#[derive(Debug, Default)]
struct Objects {
    shaders: BTreeMap<u32, String>,
    programs: BTreeMap<u32, BTreeSet<String>>,
    textures: BTreeSet<u32>,
    quads: BTreeSet<u32>,
    targets: BTreeSet<u32>,
}

#[derive(Debug, Default)]
pub struct RecordingGl {
    next_id: Cell<u32>,
    calls: Cell<usize>,
    draws: Cell<usize>,
    double_frees: Cell<usize>,
    fail_textures: Cell<bool>,
    objects: RefCell<Objects>,
    uploads: RefCell<Vec<(String, RecordedUpload)>>,
    bound_textures: RefCell<Vec<(u32, u32)>>,
    blits: RefCell<Vec<Rect>>,
}

impl RecordingGl {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> u32 {
        self.calls.set(self.calls.get() + 1);
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn touch(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn release(&self, present: bool) {
        self.touch();
        if !present {
            self.double_frees.set(self.double_frees.get() + 1);
        }
    }

    /// Makes every later `create_texture` fail.
    pub fn set_fail_textures(&self, fail: bool) {
        self.fail_textures.set(fail);
    }

    /// Total number of trait calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.get()
    }

    pub fn double_frees(&self) -> usize {
        self.double_frees.get()
    }

    pub fn upload_count(&self, name: &str) -> usize {
        self.uploads
            .borrow()
            .iter()
            .filter(|(uploaded, _)| uploaded == name)
            .count()
    }

    pub fn total_uploads(&self) -> usize {
        self.uploads.borrow().len()
    }

    pub fn last_upload(&self, name: &str) -> Option<RecordedUpload> {
        self.uploads
            .borrow()
            .iter()
            .rev()
            .find(|(uploaded, _)| uploaded == name)
            .map(|(_, upload)| upload.clone())
    }

    /// Upload log in call order.
    pub fn uploads(&self) -> Vec<(String, RecordedUpload)> {
        self.uploads.borrow().clone()
    }

    pub fn clear_uploads(&self) {
        self.uploads.borrow_mut().clear();
    }

    /// `(unit, texture)` pairs in bind order.
    pub fn bound_textures(&self) -> Vec<(u32, u32)> {
        self.bound_textures.borrow().clone()
    }

    pub fn blits(&self) -> Vec<Rect> {
        self.blits.borrow().clone()
    }

    pub fn live_shaders(&self) -> usize {
        self.objects.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.objects.borrow().programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.objects.borrow().textures.len()
    }

    pub fn live_quads(&self) -> usize {
        self.objects.borrow().quads.len()
    }

    pub fn live_targets(&self) -> usize {
        self.objects.borrow().targets.len()
    }

    pub fn live_objects(&self) -> usize {
        self.live_shaders()
            + self.live_programs()
            + self.live_textures()
            + self.live_quads()
            + self.live_targets()
    }
}

fn declared_uniforms(source: &str) -> impl Iterator<Item = String> + '_ {
    source.lines().filter_map(|line| {
        let declaration = line.trim().strip_prefix("uniform ")?;
        let declaration = declaration.split(';').next()?;
        let name = declaration.split_whitespace().last()?;
        Some(base_name(name).to_string())
    })
}

fn base_name(name: &str) -> &str {
    let end = name.find(['.', '[']).unwrap_or(name.len());
    &name[..end]
}

impl Gl for RecordingGl {
    type Shader = u32;
    type Program = u32;
    type Location = RecordedLocation;
    type Texture = u32;
    type Quad = u32;
    type Target = u32;

    fn create_shader(&self, _stage: ShaderStage) -> Result<u32, String> {
        let id = self.id();
        self.objects.borrow_mut().shaders.insert(id, String::new());
        Ok(id)
    }

    fn compile_shader(&self, shader: u32, source: &str) -> Result<(), String> {
        self.touch();
        if let Some(slot) = self.objects.borrow_mut().shaders.get_mut(&shader) {
            *slot = source.to_string();
        }
        match source
            .lines()
            .position(|line| line.contains("FAIL_COMPILE"))
        {
            Some(index) => Err(format!(
                "ERROR: 0:{}: 'FAIL_COMPILE' : undeclared identifier",
                index + 1
            )),
            None => Ok(()),
        }
    }

    fn delete_shader(&self, shader: u32) {
        let present = self.objects.borrow_mut().shaders.remove(&shader).is_some();
        self.release(present);
    }

    fn create_program(&self) -> Result<u32, String> {
        let id = self.id();
        self.objects.borrow_mut().programs.insert(id, BTreeSet::new());
        Ok(id)
    }

    fn link_program(&self, program: u32, vertex: u32, fragment: u32) -> Result<(), String> {
        self.touch();
        let mut objects = self.objects.borrow_mut();
        let mut declared = BTreeSet::new();
        let mut failed = false;
        for shader in [vertex, fragment] {
            let source = objects.shaders.get(&shader).cloned().unwrap_or_default();
            failed |= source.contains("FAIL_LINK");
            declared.extend(declared_uniforms(&source));
        }
        if failed {
            return Err("error: linking with uncompiled/unlinked shader".to_string());
        }
        if let Some(slot) = objects.programs.get_mut(&program) {
            *slot = declared;
        }
        Ok(())
    }

    fn delete_program(&self, program: u32) {
        let present = self.objects.borrow_mut().programs.remove(&program).is_some();
        self.release(present);
    }

    fn use_program(&self, _program: Option<u32>) {
        self.touch();
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<RecordedLocation> {
        self.touch();
        let objects = self.objects.borrow();
        let declared = objects.programs.get(&program)?;
        declared.contains(base_name(name)).then(|| RecordedLocation {
            program,
            name: name.to_string(),
        })
    }

    fn attrib_location(&self, _program: u32, name: &str) -> Option<u32> {
        self.touch();
        (name == crate::compile::POSITION_ATTRIBUTE).then_some(0)
    }

    fn upload_uniform(&self, location: &RecordedLocation, upload: UniformUpload<'_>) {
        self.touch();
        self.uploads
            .borrow_mut()
            .push((location.name.clone(), upload.into()));
    }

    fn create_texture(&self, _size: Size, _rgba: &[u8]) -> Result<u32, String> {
        if self.fail_textures.get() {
            self.touch();
            return Err("out of memory".to_string());
        }
        let id = self.id();
        self.objects.borrow_mut().textures.insert(id);
        Ok(id)
    }

    fn bind_texture(&self, unit: u32, texture: u32) {
        self.touch();
        self.bound_textures.borrow_mut().push((unit, texture));
    }

    fn delete_texture(&self, texture: u32) {
        let present = self.objects.borrow_mut().textures.remove(&texture);
        self.release(present);
    }

    fn create_quad(&self, _vertices: &[f32]) -> Result<u32, String> {
        let id = self.id();
        self.objects.borrow_mut().quads.insert(id);
        Ok(id)
    }

    fn draw_quad(&self, _quad: u32, _position: u32) {
        self.touch();
        self.draws.set(self.draws.get() + 1);
    }

    fn delete_quad(&self, quad: u32) {
        let present = self.objects.borrow_mut().quads.remove(&quad);
        self.release(present);
    }

    fn create_target(&self, _size: Size) -> Result<u32, String> {
        let id = self.id();
        self.objects.borrow_mut().targets.insert(id);
        Ok(id)
    }

    fn bind_target(&self, _target: Option<u32>) {
        self.touch();
    }

    fn blit_target(&self, _target: u32, _source: Size, dest: Rect) {
        self.touch();
        self.blits.borrow_mut().push(dest);
    }

    fn delete_target(&self, target: u32) {
        let present = self.objects.borrow_mut().targets.remove(&target);
        self.release(present);
    }

    fn viewport(&self, _size: Size) {
        self.touch();
    }

    fn clear(&self, _rgba: [f32; 4]) {
        self.touch();
    }
}
