mod bootstrap;
mod cli;
mod controls;
mod paths;
mod run;
mod status;
mod window;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;
use playconfig::{ConfigStore, FileStore};
use shaderlib::SourceLocation;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::List) => run_list(&cli.run),
        Some(Command::Config(config_cmd)) => handle_config_command(&cli.run, config_cmd.action),
        None => run::run(cli.run),
    }
}

fn run_list(args: &RunArgs) -> Result<()> {
    let location = SourceLocation::from_input(&args.source);
    let shaders = location
        .open()
        .and_then(|source| source.fetch_shader_list())
        .with_context(|| format!("failed to list shaders from {location}"))?;
    if shaders.is_empty() {
        println!("No shaders found at {location}");
        return Ok(());
    }
    println!("Shaders at {location}:");
    for shader in shaders {
        println!("  {shader}");
    }
    Ok(())
}

fn handle_config_command(args: &RunArgs, action: ConfigAction) -> Result<()> {
    let paths = AppPaths::discover(args.config.as_deref())?;
    match action {
        ConfigAction::Where => {
            println!("Configuration:");
            println!("  dir:   {}", paths.config_dir().display());
            println!("  file:  {}", paths.config_file().display());
            Ok(())
        }
        ConfigAction::Show => {
            let store = FileStore::new(paths.config_file());
            match store.load()? {
                Some(config) => println!("{}", config.to_json_string()?),
                None => println!(
                    "No configuration at {}; the starter set is written on first run.",
                    paths.config_file().display()
                ),
            }
            Ok(())
        }
    }
}
