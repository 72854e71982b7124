use std::fmt;

/// Pipeline stage a shader object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Pixel dimensions of a render canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamps both axes to at least one pixel; GL rejects empty targets.
    pub fn at_least_one(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }
}

/// Destination rectangle in window pixels, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32
            && y >= self.y as f32
            && x < (self.x + self.width as i32) as f32
            && y < (self.y + self.height as i32) as f32
    }
}

/// A single typed uniform write, already resolved to its GL call shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformUpload<'a> {
    /// `uniform1f`
    Float(f32),
    /// `uniform1i` (booleans and sampler units)
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// `uniform1fv`
    FloatArray(&'a [f32]),
}

/// The narrow slice of OpenGL the shader pipeline needs.
///
/// One full-viewport triangle-strip quad, one active program per
/// `ProgramLifecycle`, a handful of named uniforms and sampler units, and an
/// offscreen render target per player. Implementations report creation
/// failures as strings the same way `glow` does; compile and link failures
/// carry the driver info log.
pub trait Gl {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug;
    type Location: Clone + fmt::Debug;
    type Texture: Copy + fmt::Debug;
    type Quad: Copy + fmt::Debug;
    type Target: Copy + fmt::Debug;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    /// Uploads `source` and compiles it. `Err` carries the shader info log.
    fn compile_shader(&self, shader: Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    /// Attaches both stages and links. `Err` carries the program info log.
    fn link_program(
        &self,
        program: Self::Program,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<(), String>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Location>;
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn upload_uniform(&self, location: &Self::Location, upload: UniformUpload<'_>);

    /// Creates an RGBA8 texture with clamp-to-edge wrapping and linear filtering.
    fn create_texture(&self, size: Size, rgba: &[u8]) -> Result<Self::Texture, String>;
    fn bind_texture(&self, unit: u32, texture: Self::Texture);
    fn delete_texture(&self, texture: Self::Texture);

    /// Uploads interleaved `vec2` clip-space positions into a static buffer.
    fn create_quad(&self, vertices: &[f32]) -> Result<Self::Quad, String>;
    /// Binds the quad, points `position` at it and draws 4 vertices as a strip.
    fn draw_quad(&self, quad: Self::Quad, position: u32);
    fn delete_quad(&self, quad: Self::Quad);

    fn create_target(&self, size: Size) -> Result<Self::Target, String>;
    /// `None` binds the default framebuffer.
    fn bind_target(&self, target: Option<Self::Target>);
    /// Copies the whole target into `dest` on the default framebuffer.
    fn blit_target(&self, target: Self::Target, source: Size, dest: Rect);
    fn delete_target(&self, target: Self::Target);

    fn viewport(&self, size: Size);
    fn clear(&self, rgba: [f32; 4]);
}
