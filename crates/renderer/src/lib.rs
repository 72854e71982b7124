//! Renderer crate for cursorshade.
//!
//! Each player draws one fragment shader over a full-viewport quad into its
//! own offscreen target, which the host then blits into a grid cell:
//!
//! ```text
//!   Player::play ──▶ wrap_fragment() ──▶ ProgramLifecycle::load_shader
//!                                              │ compile ▸ link ▸ swap
//!                                              ▼
//!   RenderLoop::frame ──▶ set_uniform("iTime") ──▶ draw() ──▶ present(cell)
//! ```
//!
//! All GL access goes through the [`Gl`] trait. [`GlowBackend`] is the real
//! implementation; the `testing` feature adds a recording fake so lifecycle
//! and uniform behaviour can be exercised without a GPU.

pub mod compile;
mod error;
mod gpu;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compile::{wrap_fragment, QUAD_VERTICES, VERTEX_SHADER, WRAPPER_MARKER};
pub use error::{ProgramError, RenderReport, ReportKind, Reporter};
pub use gpu::{
    flatten, load_decoration, BackgroundCanvas, FrameOutcome, Gl, GlowBackend, GlowQuad,
    GlowTarget, Primitive, ProgramLifecycle, ProgramState, Rect, RenderLoop, ShaderStage, Size,
    TextureId, UniformStore, UniformUpload, UniformValue, UploadOutcome, RESOLUTION_UNIFORM,
    TIME_UNIFORM,
};
pub use image::RgbaImage;
