use std::path::PathBuf;

use clap::{Parser, Subcommand};
use playconfig::CursorMode;

#[derive(Parser, Debug)]
#[command(
    name = "cursorshade",
    author,
    version,
    about = "Grid of GLSL cursor-effect players",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Shader source: an `http(s)://` base URL or a local directory.
    #[arg(long, env = "CURSORSHADE_SOURCE", default_value = "assets")]
    pub source: String,

    /// Configuration file to load and persist instead of the default location.
    #[arg(long, env = "CURSORSHADE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the tick interval in milliseconds.
    #[arg(long, value_name = "MILLISECONDS", value_parser = parse_tick_ms)]
    pub tick_ms: Option<u64>,

    /// Cursor mode: `auto`, `click`, or `rnd`.
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    pub mode: Option<CursorMode>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Image composited over the background fill when a player shows its texture.
    #[arg(long, value_name = "PATH")]
    pub decoration: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the shaders available from the source.
    List,
    /// Inspect the persisted configuration.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print resolved directories and the configuration file path.
    Where,
    /// Print the configuration document after migration.
    Show,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_mode(value: &str) -> Result<CursorMode, String> {
    value.parse().map_err(|err| format!("{err}"))
}

pub fn parse_tick_ms(value: &str) -> Result<u64, String> {
    let millis: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid tick interval '{value}'; expected milliseconds"))?;
    if millis == 0 {
        return Err("tick interval must be greater than zero".to_string());
    }
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_accepts_random_alias() {
        assert_eq!(parse_mode("random").unwrap(), CursorMode::Rnd);
        assert_eq!(parse_mode(" Click ").unwrap(), CursorMode::Click);
        assert!(parse_mode("spin").is_err());
    }

    #[test]
    fn tick_ms_rejects_zero() {
        assert_eq!(parse_tick_ms("250").unwrap(), 250);
        assert!(parse_tick_ms("0").is_err());
        assert!(parse_tick_ms("fast").is_err());
    }

    #[test]
    fn config_where_parses() {
        let cli = Cli::try_parse_from(["cursorshade", "config", "where"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Where
            }))
        ));
        assert_eq!(cli.run.source, "assets");
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "cursorshade",
            "--source",
            "https://example.test/cursors",
            "--mode",
            "rnd",
            "--tick-ms",
            "500",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.mode, Some(CursorMode::Rnd));
        assert_eq!(cli.run.tick_ms, Some(500));
    }
}
