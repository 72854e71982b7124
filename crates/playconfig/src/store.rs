use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{ConfigError, Configuration};

/// Where the configuration document lives between runs.
pub trait ConfigStore {
    /// Reads and migrates the stored document; `None` when nothing is stored yet.
    fn load(&self) -> Result<Option<Configuration>, ConfigError>;
    fn persist(&self, config: &Configuration) -> Result<(), ConfigError>;
}

/// JSON file on disk. Writes go through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<Option<Configuration>, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let config = Configuration::from_json_str(&text)?;
        tracing::debug!(path = %self.path.display(), players = config.players.len(), "loaded configuration");
        Ok(Some(config))
    }

    fn persist(&self, config: &Configuration) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let json = config.to_json_string()?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))?;
        tracing::debug!(path = %self.path.display(), "persisted configuration");
        Ok(())
    }
}

/// Keeps the serialized document in memory.
///
/// Loads still go through parsing and migration, so a persist/load pair
/// exercises the same path a file round trip would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RefCell<Option<String>>,
    writes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with raw JSON of any supported version.
    pub fn with_document(json: impl Into<String>) -> Self {
        Self {
            document: RefCell::new(Some(json.into())),
            writes: Cell::new(0),
        }
    }

    pub fn document(&self) -> Option<String> {
        self.document.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<Configuration>, ConfigError> {
        match self.document.borrow().as_deref() {
            Some(json) => Configuration::from_json_str(json).map(Some),
            None => Ok(None),
        }
    }

    fn persist(&self, config: &Configuration) -> Result<(), ConfigError> {
        let json = config.to_json_string()?;
        *self.document.borrow_mut() = Some(json);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayerDescriptor;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn persist_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/config.json"));
        let mut config = Configuration::default();
        config.add_player(PlayerDescriptor::with_id("p1", "cursor_smear.glsl"));

        store.persist(&config).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), Some(config));
    }

    #[test]
    fn file_store_migrates_legacy_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"canvas":["a.glsl"],"magia":[1]}"#).unwrap();

        let config = FileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(config.players.len(), 1);
        assert_eq!(config.players[0].shader, "a.glsl");
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStore::new(&path).load(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.persist(&Configuration::default()).unwrap();
        store.persist(&Configuration::default()).unwrap();
        assert_eq!(store.writes(), 2);
        assert!(store.load().unwrap().is_some());
    }
}
