use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RULESET: &str = "content/scripts/demos/example_ruleset.lua";

/// Host settings read from an optional JSON file. Missing keys keep their
/// defaults and command-line flags override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ruleset: PathBuf,
    pub turns: u32,
    pub tick_ms: u64,
    pub start_elevation: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ruleset: PathBuf::from(DEFAULT_RULESET),
            turns: 120,
            tick_ms: 16,
            start_elevation: 0,
        }
    }
}

impl Settings {
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }
}
