use std::rc::Rc;

use anyhow::{Context, Result};
use playconfig::{ConfigStore, FileStore};
use player::AppContext;
use shaderlib::SourceLocation;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{apply_overrides, load_configuration, window_size};
use crate::cli::RunArgs;
use crate::paths::AppPaths;
use crate::status::StatusLine;
use crate::window::{run_window, HostSetup};

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover(args.config.as_deref())?;
    let location = SourceLocation::from_input(&args.source);
    tracing::debug!(
        config = %paths.config_file().display(),
        source = %location,
        "resolved cursorshade paths"
    );

    let store: Rc<dyn ConfigStore> = Rc::new(FileStore::new(paths.config_file()));
    let mut config = load_configuration(store.as_ref())?;
    if apply_overrides(&mut config, &args) {
        store
            .persist(&config)
            .context("failed to persist command-line overrides")?;
    }
    let size = window_size(&args)?;

    let source = location
        .open()
        .with_context(|| format!("failed to open shader source {location}"))?;
    let decoration = match args.decoration.as_deref() {
        Some(path) => Some(renderer::load_decoration(path)?),
        None => None,
    };

    tracing::info!(
        players = config.players.len(),
        mode = %config.cursor_mode,
        tick_ms = config.tick_interval.as_millis() as u64,
        source = %location,
        "starting cursorshade"
    );
    let status = StatusLine::default();
    let context =
        AppContext::new(config, store, source, status.reporter()).with_decoration(decoration);
    run_window(HostSetup {
        size,
        context,
        status,
    })
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
