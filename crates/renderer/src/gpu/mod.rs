//! GPU side of a player, from raw GL calls up to a drawn frame.
//!
//! - `backend` defines the narrow [`Gl`] trait every other module talks to.
//! - `glow_backend` implements it over a current `glow::Context`.
//! - `uniforms` caches uniform values and locations and skips redundant
//!   uploads.
//! - `program` owns one program plus its quad, render target and textures,
//!   and survives failed reloads and context loss.
//! - `frame_loop` is the start/stop state that pushes `iTime` and draws.
//! - `channels` paints the 2D background canvas uploaded as `iChannel0`.

mod backend;
mod channels;
mod frame_loop;
mod glow_backend;
mod program;
mod uniforms;

pub use backend::{Gl, Rect, ShaderStage, Size, UniformUpload};
pub use channels::{load_decoration, BackgroundCanvas};
pub use frame_loop::{FrameOutcome, RenderLoop, TIME_UNIFORM};
pub use glow_backend::{GlowBackend, GlowQuad, GlowTarget};
pub use program::{ProgramLifecycle, ProgramState, RESOLUTION_UNIFORM};
pub use uniforms::{flatten, Primitive, TextureId, UniformStore, UniformValue, UploadOutcome};
