//!
//! # Configuration
//!
//! Settings for the command-line front end, read from a `demosql.toml` file.
//! Every key is optional; anything left out takes its default.
//!
//! ## Example demosql.toml
//!
//! ```toml
//! [database]
//! location = "weather.sqlite"
//! read_only = false
//!
//! [plot]
//! width = 1000
//! height = 1000
//! bins = 10
//! ```
//!
//! Command-line flags are applied on top of the loaded file.
//!

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use demosql::{OpenFlags, MEMORY_LOCATION};

use crate::errors::CliError;

pub const CONFIG_FILE: &str = "demosql.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub plot: PlotConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub location: String,
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            location: MEMORY_LOCATION.to_string(),
            read_only: false,
        }
    }
}

impl DatabaseConfig {
    pub fn open_flags(&self) -> OpenFlags {
        if self.read_only {
            OpenFlags::READ_ONLY | OpenFlags::URI
        } else {
            OpenFlags::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlotConfig {
    pub width: f64,
    pub height: f64,
    pub bins: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            width: 1000.0,
            height: 1000.0,
            bins: demoplot::DEFAULT_BINS,
        }
    }
}

impl Config {
    /// Loads `explicit` if given (it must exist), otherwise `demosql.toml` in
    /// `dir` when present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(CliError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Config::default());
                }
                candidate
            }
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)?;
        parse_config_str(&content).map_err(|reason| CliError::ConfigParse {
            path: PathBuf::from(path),
            reason,
        })
    }
}

pub fn parse_config_str(content: &str) -> Result<Config, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}
