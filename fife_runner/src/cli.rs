use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use fife_bridge::ScriptSource;

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    about = "Runs a map and its Lua ruleset on a scripting thread and reports the outcome",
    version
)]
pub struct Args {
    /// JSON map describing elevations, layers and objects
    #[arg(long)]
    pub map: PathBuf,

    /// Lua ruleset to load (overrides the settings file)
    #[arg(long)]
    pub ruleset: Option<PathBuf>,

    /// Lua ruleset source given inline instead of a file
    #[arg(long, value_name = "LUA")]
    pub ruleset_inline: Option<String>,

    /// Optional JSON settings file
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Number of turns to run before stopping the scripting thread
    #[arg(long)]
    pub turns: Option<u32>,

    /// Milliseconds to wait between turns
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Elevation to activate after start-up
    #[arg(long)]
    pub elevation: Option<usize>,

    /// Path to write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunArgs {
    pub map: PathBuf,
    pub ruleset: ScriptSource,
    pub turns: u32,
    pub tick_ms: u64,
    pub elevation: usize,
    pub report_json: Option<PathBuf>,
    pub verbose: bool,
}

pub fn parse() -> Result<RunArgs> {
    let args = Args::parse();
    args.into_run_args()
}

impl Args {
    fn into_run_args(self) -> Result<RunArgs> {
        let settings = Settings::from_json_file(self.settings.as_deref())?;

        let ruleset = match (self.ruleset, self.ruleset_inline) {
            (Some(_), Some(_)) => bail!("--ruleset cannot be combined with --ruleset-inline"),
            (Some(path), None) => path_ruleset(path)?,
            (None, Some(source)) => ScriptSource::from_text(source),
            (None, None) => path_ruleset(settings.ruleset)?,
        };

        Ok(RunArgs {
            map: self.map,
            ruleset,
            turns: self.turns.unwrap_or(settings.turns),
            tick_ms: self.tick_ms.unwrap_or(settings.tick_ms),
            elevation: self.elevation.unwrap_or(settings.start_elevation),
            report_json: self.report_json,
            verbose: self.verbose,
        })
    }
}

fn path_ruleset(path: PathBuf) -> Result<ScriptSource> {
    if !path.is_file() {
        bail!("ruleset {} does not exist", path.display());
    }
    Ok(ScriptSource::from_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::parse_from([
            "fife_runner",
            "--map",
            "maps/town.json",
            "--ruleset-inline",
            "function AddObject(obj) end",
            "--turns",
            "3",
        ]);
        let run = args.into_run_args().expect("valid arguments");
        assert_eq!(run.turns, 3);
        assert_eq!(run.tick_ms, 16);
        assert_eq!(run.elevation, 0);
        assert!(matches!(run.ruleset, ScriptSource::Text(_)));
    }

    #[test]
    fn conflicting_ruleset_flags_are_rejected() {
        let args = Args::parse_from([
            "fife_runner",
            "--map",
            "maps/town.json",
            "--ruleset",
            "rules.lua",
            "--ruleset-inline",
            "x = 1",
        ]);
        assert!(args.into_run_args().is_err());
    }
}
