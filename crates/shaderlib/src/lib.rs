//! Where shader text comes from.
//!
//! Players only see the [`ShaderSourceService`] trait. Two implementations
//! exist, picked from a `--source` string by [`SourceLocation::from_input`]:
//!
//! - [`HttpShaderSource`] talks to the playground file server
//!   (`shaders/{name}`, `shaders-list`, `misc/ghostty_wrapper.glsl`).
//! - [`LocalShaderSource`] reads the same layout from a directory.

mod http;
mod local;

pub use http::HttpShaderSource;
pub use local::LocalShaderSource;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const SHADERS_DIR: &str = "shaders";
pub const LIST_ENDPOINT: &str = "shaders-list";
pub const WRAPPER_PATH: &str = "misc/ghostty_wrapper.glsl";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("shader '{0}' not found")]
    NotFound(String),
    #[error("invalid shader name '{0}'")]
    InvalidName(String),
    #[error("{0} is empty")]
    Empty(String),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid source url '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to decode shader list: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches shader bodies, the shader list and the wrapper template.
///
/// Calls block; players run them on worker threads.
pub trait ShaderSourceService: Send + Sync {
    fn fetch_shader_source(&self, name: &str) -> Result<String, SourceError>;
    fn fetch_shader_list(&self) -> Result<Vec<String>, SourceError>;
    fn fetch_wrapper_template(&self) -> Result<String, SourceError>;
}

/// Rejects names that could address anything outside the shader directory.
pub fn validate_name(name: &str) -> Result<(), SourceError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed != name
        || name.contains(['/', '\\', '?', '#'])
        || name.starts_with('.');
    if bad {
        Err(SourceError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn non_empty(text: String, what: impl Into<String>) -> Result<String, SourceError> {
    if text.trim().is_empty() {
        Err(SourceError::Empty(what.into()))
    } else {
        Ok(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Http(String),
    Local(PathBuf),
}

impl SourceLocation {
    pub fn from_input(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Http(input.to_string())
        } else {
            Self::Local(PathBuf::from(input))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn open(&self) -> Result<Arc<dyn ShaderSourceService>, SourceError> {
        Ok(match self {
            Self::Http(base) => Arc::new(HttpShaderSource::new(base)?),
            Self::Local(root) => Arc::new(LocalShaderSource::new(root.clone())),
        })
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(base) => f.write_str(base),
            Self::Local(root) => write!(f, "{}", root.display()),
        }
    }
}
