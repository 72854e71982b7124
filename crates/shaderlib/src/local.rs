use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{non_empty, validate_name, ShaderSourceService, SourceError, SHADERS_DIR, WRAPPER_PATH};

/// Serves shaders from `{root}/shaders` and the wrapper from `{root}/misc`.
#[derive(Debug, Clone)]
pub struct LocalShaderSource {
    root: PathBuf,
}

impl LocalShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: PathBuf, name: &str) -> Result<String, SourceError> {
        match fs::read_to_string(&path) {
            Ok(text) => non_empty(text, path.display().to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

impl ShaderSourceService for LocalShaderSource {
    fn fetch_shader_source(&self, name: &str) -> Result<String, SourceError> {
        validate_name(name)?;
        self.read(self.root.join(SHADERS_DIR).join(name), name)
    }

    fn fetch_shader_list(&self) -> Result<Vec<String>, SourceError> {
        let dir = self.root.join(SHADERS_DIR);
        let entries = fs::read_dir(&dir).map_err(|source| SourceError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".glsl"))
            .collect();
        names.sort();
        Ok(names)
    }

    fn fetch_wrapper_template(&self) -> Result<String, SourceError> {
        self.read(self.root.join(WRAPPER_PATH), WRAPPER_PATH)
    }
}
