use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use playconfig::{ConfigError, ConfigStore, Configuration};
use renderer::{Reporter, RgbaImage};
use shaderlib::ShaderSourceService;

use crate::bus::EventBus;
use crate::loader::ShaderLoader;

/// Shared services handed to the player set at startup.
///
/// Created once by the host and torn down with it; nothing here is global.
pub struct AppContext {
    pub bus: EventBus,
    pub config: Rc<RefCell<Configuration>>,
    pub store: Rc<dyn ConfigStore>,
    pub loader: ShaderLoader,
    pub reporter: Reporter,
    pub decoration: Option<RgbaImage>,
}

impl AppContext {
    pub fn new(
        config: Configuration,
        store: Rc<dyn ConfigStore>,
        source: Arc<dyn ShaderSourceService>,
        reporter: Reporter,
    ) -> Self {
        Self {
            bus: EventBus::new(),
            config: Rc::new(RefCell::new(config)),
            store,
            loader: ShaderLoader::new(source),
            reporter,
            decoration: None,
        }
    }

    pub fn with_decoration(mut self, decoration: Option<RgbaImage>) -> Self {
        self.decoration = decoration;
        self
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        persist(self.store.as_ref(), &self.config)
    }
}

pub(crate) fn persist(
    store: &dyn ConfigStore,
    config: &RefCell<Configuration>,
) -> Result<(), ConfigError> {
    let config = config.borrow();
    config.validate()?;
    store.persist(&config)
}
