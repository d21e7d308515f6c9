//! Engine configuration.
//!
//! ```toml
//! sources = ["queries/", "overrides/users.json"]
//! format = "yaml"          # fallback when a file has no known extension
//! dialect = "mysql"        # skip detection
//! database_url = "mysql://localhost/app"
//! ```

use crate::dialect::Dialect;
use crate::error::{LurryError, LurryResult};
use crate::source::Format;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Definition files and directories, in load order. Later sources
    /// override earlier ones.
    pub sources: Vec<PathBuf>,

    /// Format for files whose extension says nothing.
    pub format: Option<Format>,

    /// Fixed dialect; detected from the connection when absent.
    pub dialect: Option<Dialect>,

    /// Database connection URL
    pub database_url: Option<String>,
}

impl EngineConfig {
    /// `<config dir>/lurry/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lurry").join("config.toml"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> LurryResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| LurryError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| LurryError::Config(format!("{}: {}", path.display(), e)))?;

        // relative sources are relative to the config file
        if let Some(base) = path.parent() {
            for source in &mut config.sources {
                if source.is_relative() {
                    *source = base.join(&*source);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> LurryResult<Self> {
        toml::from_str(text).map_err(|e| LurryError::Config(e.to_string()))
    }

    /// Load from `path`, or from the default location if it exists.
    pub fn load(path: Option<&Path>) -> LurryResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.is_file() => {
                    tracing::debug!("Using config {}", default.display());
                    Self::from_file(default)
                }
                _ => Ok(Self::default()),
            },
        }
    }
}
