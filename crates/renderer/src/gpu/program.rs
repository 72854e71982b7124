//! Compile, link, draw and tear down one shader program.
//!
//! New stages are compiled and linked into temporaries first. Only once the
//! new program links are the previous program and its shader objects deleted,
//! so a failed reload never leaks a shader object and never takes down a
//! program that was already rendering.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::compile::{self, POSITION_ATTRIBUTE, QUAD_VERTICES};
use crate::error::{ProgramError, RenderReport, ReportKind, Reporter};

use super::backend::{Gl, Rect, ShaderStage, Size};
use super::uniforms::{flatten, Primitive, TextureId, UniformStore, UniformValue};

/// Uniform carrying the render target size in pixels.
pub const RESOLUTION_UNIFORM: &str = "iResolution";

/// Outcome of the most recent load, plus the terminal `Disposed`.
///
/// `Failed` does not imply there is nothing to draw: a program linked by an
/// earlier load stays active. Use [`ProgramLifecycle::is_active`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Uninitialized,
    Compiling,
    Linked,
    Failed,
    Disposed,
}

struct LinkedProgram<G: Gl> {
    program: G::Program,
    vertex: G::Shader,
    fragment: G::Shader,
    position: Option<u32>,
}

pub struct ProgramLifecycle<G: Gl> {
    gl: Rc<G>,
    state: ProgramState,
    active: Option<LinkedProgram<G>>,
    uniforms: UniformStore<G>,
    textures: BTreeMap<TextureId, G::Texture>,
    next_texture: u64,
    quad: Option<G::Quad>,
    target: Option<G::Target>,
    size: Size,
    context_lost: bool,
    reporter: Reporter,
}

impl<G: Gl> ProgramLifecycle<G> {
    /// Creates the quad buffer and render target for a canvas of `size`.
    pub fn new(gl: Rc<G>, size: Size, reporter: Reporter) -> Result<Self, ProgramError> {
        let mut lifecycle = Self {
            gl,
            state: ProgramState::Uninitialized,
            active: None,
            uniforms: UniformStore::new(),
            textures: BTreeMap::new(),
            next_texture: 0,
            quad: None,
            target: None,
            size: size.at_least_one(),
            context_lost: false,
            reporter,
        };
        if let Err(err) = lifecycle.create_base_resources() {
            lifecycle.reporter.report_error(&err);
            return Err(err);
        }
        Ok(lifecycle)
    }

    fn create_base_resources(&mut self) -> Result<(), ProgramError> {
        let quad = self
            .gl
            .create_quad(&QUAD_VERTICES)
            .map_err(|err| ProgramError::resource(format!("vertex buffer: {err}")))?;
        let target = match self.gl.create_target(self.size) {
            Ok(target) => target,
            Err(err) => {
                self.gl.delete_quad(quad);
                return Err(ProgramError::resource(format!("render target: {err}")));
            }
        };
        self.quad = Some(quad);
        self.target = Some(target);
        self.gl.viewport(self.size);
        Ok(())
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// True while a linked program is available for drawing.
    pub fn is_active(&self) -> bool {
        self.active.is_some() && !self.context_lost
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn uniforms(&self) -> &UniformStore<G> {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&Primitive> {
        self.uniforms.value(name)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Compiles and links a new program, replacing the active one on success.
    pub fn load_shader(&mut self, vertex: &str, fragment: &str) -> Result<(), ProgramError> {
        let result = self.try_load(vertex, fragment);
        match &result {
            Ok(()) => self.reporter.report(RenderReport::new(
                ReportKind::Loaded,
                format!("program linked ({} fragment bytes)", fragment.len()),
            )),
            Err(err) => self.reporter.report_error(err),
        }
        result
    }

    fn try_load(&mut self, vertex: &str, fragment: &str) -> Result<(), ProgramError> {
        if self.state == ProgramState::Disposed {
            return Err(ProgramError::Disposed);
        }
        if self.context_lost {
            return Err(ProgramError::resource("GL context is lost"));
        }
        if vertex.trim().is_empty() {
            return Err(ProgramError::Validation(ShaderStage::Vertex));
        }
        if fragment.trim().is_empty() {
            return Err(ProgramError::Validation(ShaderStage::Fragment));
        }

        self.state = ProgramState::Compiling;
        let linked = match self.compile_and_link(vertex, fragment) {
            Ok(linked) => linked,
            Err(err) => {
                self.state = ProgramState::Failed;
                return Err(err);
            }
        };

        if let Some(previous) = self.active.take() {
            self.release_program(previous);
        }
        self.active = Some(linked);
        self.uniforms.invalidate();
        self.state = ProgramState::Linked;
        self.set_uniform(RESOLUTION_UNIFORM, self.resolution());
        Ok(())
    }

    fn compile_and_link(
        &self,
        vertex: &str,
        fragment: &str,
    ) -> Result<LinkedProgram<G>, ProgramError> {
        let vertex_shader = self.compile_stage(ShaderStage::Vertex, vertex)?;
        let fragment_shader = match self.compile_stage(ShaderStage::Fragment, fragment) {
            Ok(shader) => shader,
            Err(err) => {
                self.gl.delete_shader(vertex_shader);
                return Err(err);
            }
        };
        let program = match self.gl.create_program() {
            Ok(program) => program,
            Err(err) => {
                self.gl.delete_shader(vertex_shader);
                self.gl.delete_shader(fragment_shader);
                return Err(ProgramError::resource(format!("program object: {err}")));
            }
        };
        if let Err(log) = self.gl.link_program(program, vertex_shader, fragment_shader) {
            self.gl.delete_program(program);
            self.gl.delete_shader(vertex_shader);
            self.gl.delete_shader(fragment_shader);
            return Err(ProgramError::Link { log });
        }
        let position = self.gl.attrib_location(program, POSITION_ATTRIBUTE);
        if position.is_none() {
            tracing::warn!("vertex attribute `{POSITION_ATTRIBUTE}` not found; using slot 0");
        }
        Ok(LinkedProgram {
            program,
            vertex: vertex_shader,
            fragment: fragment_shader,
            position,
        })
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<G::Shader, ProgramError> {
        let shader = self
            .gl
            .create_shader(stage)
            .map_err(|err| ProgramError::resource(format!("{stage} shader object: {err}")))?;
        if let Err(log) = self.gl.compile_shader(shader, source) {
            self.gl.delete_shader(shader);
            let excerpt = compile::excerpt_for_log(source, &log);
            return Err(ProgramError::Compile {
                stage,
                log,
                shader_source: source.to_string(),
                excerpt,
            });
        }
        Ok(shader)
    }

    fn release_program(&self, linked: LinkedProgram<G>) {
        self.gl.delete_program(linked.program);
        self.gl.delete_shader(linked.vertex);
        self.gl.delete_shader(linked.fragment);
    }

    fn resolution(&self) -> [f32; 2] {
        [self.size.width as f32, self.size.height as f32]
    }

    /// Assigns a uniform, flattening structs and arrays into leaf names.
    ///
    /// Replacing one lifecycle-owned texture with another deletes the old one.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        if self.state == ProgramState::Disposed || self.context_lost {
            return;
        }
        let program = self.active.as_ref().map(|linked| linked.program);
        if let Some(program) = program {
            self.gl.use_program(Some(program));
        }
        for (leaf, primitive) in flatten(name, &value.into()) {
            let replaced = self
                .uniforms
                .value(&leaf)
                .and_then(Primitive::texture)
                .filter(|old| primitive.texture() != Some(*old));
            self.uniforms
                .set(&self.gl, program, &leaf, primitive, &self.reporter);
            if let Some(old) = replaced {
                if let Some(texture) = self.textures.remove(&old) {
                    self.gl.delete_texture(texture);
                }
            }
        }
    }

    pub fn set_uniforms<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a str, UniformValue)>,
    {
        for (name, value) in values {
            self.set_uniform(name, value);
        }
    }

    /// Uploads RGBA pixels as a new texture and assigns it to `name`.
    pub fn upload_texture(
        &mut self,
        name: &str,
        size: Size,
        rgba: &[u8],
    ) -> Result<TextureId, ProgramError> {
        if self.state == ProgramState::Disposed {
            return Err(ProgramError::Disposed);
        }
        if self.context_lost {
            return Err(ProgramError::resource("GL context is lost"));
        }
        let texture = match self.gl.create_texture(size, rgba) {
            Ok(texture) => texture,
            Err(err) => {
                let err = ProgramError::resource(format!("texture `{name}`: {err}"));
                self.reporter.report_error(&err);
                return Err(err);
            }
        };
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, texture);
        self.set_uniform(name, id);
        Ok(id)
    }

    /// Resizes the render target and refreshes the resolution uniform.
    pub fn resize(&mut self, size: Size) -> Result<(), ProgramError> {
        let size = size.at_least_one();
        if size == self.size || self.state == ProgramState::Disposed {
            return Ok(());
        }
        self.size = size;
        if self.context_lost {
            return Ok(());
        }
        if let Some(target) = self.target.take() {
            self.gl.delete_target(target);
        }
        let target = self.gl.create_target(size).map_err(|err| {
            let err = ProgramError::resource(format!("render target: {err}"));
            self.reporter.report_error(&err);
            err
        })?;
        self.target = Some(target);
        self.set_uniform(RESOLUTION_UNIFORM, self.resolution());
        Ok(())
    }

    /// Draws the quad into the render target. Returns false with nothing to draw.
    pub fn draw(&mut self) -> bool {
        let (Some(linked), Some(quad), Some(target)) = (self.active.as_ref(), self.quad, self.target)
        else {
            return false;
        };
        if self.context_lost {
            return false;
        }
        let program = linked.program;
        let position = linked.position.unwrap_or(0);

        self.gl.bind_target(Some(target));
        self.gl.viewport(self.size);
        self.gl.use_program(Some(program));
        self.uniforms.flush(&self.gl, program, &self.reporter);
        for (unit, id) in self.uniforms.texture_bindings() {
            if let Some(texture) = self.textures.get(&id) {
                self.gl.bind_texture(unit, *texture);
            }
        }
        self.gl.draw_quad(quad, position);
        self.gl.bind_target(None);
        self.uniforms.take_force_render();
        true
    }

    pub fn needs_render(&self) -> bool {
        self.uniforms.needs_render()
    }

    /// Copies the last drawn frame into `dest` on the default framebuffer.
    pub fn present(&self, dest: Rect) {
        if self.context_lost {
            return;
        }
        if let Some(target) = self.target {
            self.gl.blit_target(target, self.size, dest);
        }
    }

    /// Releases every GL object. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.state == ProgramState::Disposed {
            return;
        }
        if !self.context_lost {
            self.gl.use_program(None);
            if let Some(linked) = self.active.take() {
                self.release_program(linked);
            }
            for (_, texture) in std::mem::take(&mut self.textures) {
                self.gl.delete_texture(texture);
            }
            if let Some(quad) = self.quad.take() {
                self.gl.delete_quad(quad);
            }
            if let Some(target) = self.target.take() {
                self.gl.delete_target(target);
            }
        }
        self.forget_gl_state();
        self.state = ProgramState::Disposed;
    }

    /// Drops all GL handles without touching the (now invalid) context.
    pub fn context_lost(&mut self) {
        if self.state == ProgramState::Disposed {
            return;
        }
        self.context_lost = true;
        self.forget_gl_state();
        self.state = ProgramState::Uninitialized;
    }

    /// Rebuilds the quad and render target on a fresh context.
    ///
    /// The previous shader is not recompiled; the owner replays it.
    pub fn context_restored(&mut self, gl: Rc<G>) -> Result<(), ProgramError> {
        if self.state == ProgramState::Disposed {
            return Err(ProgramError::Disposed);
        }
        self.gl = gl;
        self.forget_gl_state();
        if let Err(err) = self.create_base_resources() {
            self.reporter.report_error(&err);
            return Err(err);
        }
        self.context_lost = false;
        self.state = ProgramState::Uninitialized;
        Ok(())
    }

    fn forget_gl_state(&mut self) {
        self.active = None;
        self.textures.clear();
        self.quad = None;
        self.target = None;
        self.uniforms.clear();
    }
}

impl<G: Gl> Drop for ProgramLifecycle<G> {
    fn drop(&mut self) {
        self.dispose();
    }
}
