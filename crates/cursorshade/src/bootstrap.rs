use std::time::Duration;

use anyhow::{Context, Result};
use playconfig::{ConfigStore, Configuration};

use crate::cli::RunArgs;

pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1280x720"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("window dimensions must be greater than zero");
    }

    Ok((width, height))
}

/// Loads the stored document, seeding the starter players on first run.
pub fn load_configuration(store: &dyn ConfigStore) -> Result<Configuration> {
    if let Some(config) = store
        .load()
        .context("failed to load cursorshade configuration")?
    {
        tracing::debug!(players = config.players.len(), "loaded configuration");
        return Ok(config);
    }
    let config = Configuration::starter();
    store
        .persist(&config)
        .context("failed to write starter configuration")?;
    tracing::info!(players = config.players.len(), "seeded starter configuration");
    Ok(config)
}

/// Folds command-line overrides into `config`. Returns true when anything changed.
pub fn apply_overrides(config: &mut Configuration, args: &RunArgs) -> bool {
    let mut changed = false;
    if let Some(millis) = args.tick_ms {
        let interval = Duration::from_millis(millis);
        changed |= config.tick_interval != interval;
        config.tick_interval = interval;
    }
    if let Some(mode) = args.mode {
        changed |= config.cursor_mode != mode;
        config.cursor_mode = mode;
    }
    changed
}

pub fn window_size(args: &RunArgs) -> Result<(u32, u32)> {
    match args.size.as_deref() {
        Some(spec) => parse_surface_size(spec),
        None => Ok(DEFAULT_WINDOW_SIZE),
    }
}
