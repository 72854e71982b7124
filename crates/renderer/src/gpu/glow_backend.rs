use glow::HasContext;

use super::backend::{Gl, Rect, ShaderStage, Size, UniformUpload};

/// Vertex array + buffer pair holding the full-viewport quad.
#[derive(Debug, Clone, Copy)]
pub struct GlowQuad {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
}

/// Offscreen colour target a player renders into before presentation.
#[derive(Debug, Clone, Copy)]
pub struct GlowTarget {
    fbo: glow::Framebuffer,
    texture: glow::Texture,
}

/// [`Gl`] implementation backed by a `glow` context.
///
/// Every call assumes the wrapped context is current on the calling thread.
/// That promise is made once, in [`GlowBackend::new`], so the trait methods
/// themselves stay safe to call.
pub struct GlowBackend {
    gl: glow::Context,
}

impl GlowBackend {
    /// Wraps a loaded context.
    ///
    /// # Safety
    ///
    /// The context must stay current on this thread for as long as the backend
    /// (or any lifecycle holding it) is used, and must not be destroyed first.
    pub unsafe fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn stage_kind(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn gl_dim(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl Gl for GlowBackend {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Location = glow::UniformLocation;
    type Texture = glow::Texture;
    type Quad = GlowQuad;
    type Target = GlowTarget;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        unsafe { self.gl.create_shader(stage_kind(stage)) }
    }

    fn compile_shader(&self, shader: Self::Shader, source: &str) -> Result<(), String> {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn link_program(
        &self,
        program: Self::Program,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<(), String> {
        unsafe {
            self.gl.attach_shader(program, vertex);
            self.gl.attach_shader(program, fragment);
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Location> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn upload_uniform(&self, location: &Self::Location, upload: UniformUpload<'_>) {
        let location = Some(location);
        unsafe {
            match upload {
                UniformUpload::Float(v) => self.gl.uniform_1_f32(location, v),
                UniformUpload::Int(v) => self.gl.uniform_1_i32(location, v),
                UniformUpload::Vec2([x, y]) => self.gl.uniform_2_f32(location, x, y),
                UniformUpload::Vec3([x, y, z]) => self.gl.uniform_3_f32(location, x, y, z),
                UniformUpload::Vec4([x, y, z, w]) => self.gl.uniform_4_f32(location, x, y, z, w),
                UniformUpload::FloatArray(values) => self.gl.uniform_1_f32_slice(location, values),
            }
        }
    }

    fn create_texture(&self, size: Size, rgba: &[u8]) -> Result<Self::Texture, String> {
        unsafe {
            let texture = self.gl.create_texture()?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                gl_dim(size.width),
                gl_dim(size.height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(rgba)),
            );
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn bind_texture(&self, unit: u32, texture: Self::Texture) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_quad(&self, vertices: &[f32]) -> Result<Self::Quad, String> {
        unsafe {
            let vao = self.gl.create_vertex_array()?;
            let vbo = match self.gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(err) => {
                    self.gl.delete_vertex_array(vao);
                    return Err(err);
                }
            };
            self.gl.bind_vertex_array(Some(vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );
            self.gl.bind_vertex_array(None);
            Ok(GlowQuad { vao, vbo })
        }
    }

    fn draw_quad(&self, quad: Self::Quad, position: u32) {
        unsafe {
            self.gl.bind_vertex_array(Some(quad.vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(quad.vbo));
            self.gl.enable_vertex_attrib_array(position);
            self.gl
                .vertex_attrib_pointer_f32(position, 2, glow::FLOAT, false, 0, 0);
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            self.gl.bind_vertex_array(None);
        }
    }

    fn delete_quad(&self, quad: Self::Quad) {
        unsafe {
            self.gl.delete_buffer(quad.vbo);
            self.gl.delete_vertex_array(quad.vao);
        }
    }

    fn create_target(&self, size: Size) -> Result<Self::Target, String> {
        let size = size.at_least_one();
        unsafe {
            let texture = self.gl.create_texture()?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                gl_dim(size.width),
                gl_dim(size.height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);

            let fbo = match self.gl.create_framebuffer() {
                Ok(fbo) => fbo,
                Err(err) => {
                    self.gl.delete_texture(texture);
                    return Err(err);
                }
            };
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                self.gl.delete_framebuffer(fbo);
                self.gl.delete_texture(texture);
                return Err(format!("framebuffer incomplete: 0x{status:x}"));
            }
            Ok(GlowTarget { fbo, texture })
        }
    }

    fn bind_target(&self, target: Option<Self::Target>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, target.map(|target| target.fbo));
        }
    }

    fn blit_target(&self, target: Self::Target, source: Size, dest: Rect) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::READ_FRAMEBUFFER, Some(target.fbo));
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            self.gl.blit_framebuffer(
                0,
                0,
                gl_dim(source.width),
                gl_dim(source.height),
                dest.x,
                dest.y,
                dest.x + gl_dim(dest.width),
                dest.y + gl_dim(dest.height),
                glow::COLOR_BUFFER_BIT,
                glow::NEAREST,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    fn delete_target(&self, target: Self::Target) {
        unsafe {
            self.gl.delete_framebuffer(target.fbo);
            self.gl.delete_texture(target.texture);
        }
    }

    fn viewport(&self, size: Size) {
        unsafe {
            self.gl
                .viewport(0, 0, gl_dim(size.width), gl_dim(size.height));
        }
    }

    fn clear(&self, rgba: [f32; 4]) {
        unsafe {
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }
}
