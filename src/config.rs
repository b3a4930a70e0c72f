// User configuration loaded from YAML

use crate::models::Theme;
use crate::query::FilterMode;
use crate::storage::Backend;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from `config.yaml`; every field is optional in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that holds the `.todoflow` store
    pub store_path: PathBuf,
    pub backend: Backend,
    /// Filter used by `list` when none is given
    pub default_filter: FilterMode,
    /// Theme reported when none has been stored
    pub default_theme: Theme,
    /// Show the demo tasks when storage is empty or unreadable
    pub demo_seed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("."),
            backend: Backend::default(),
            default_filter: FilterMode::default(),
            default_theme: Theme::default(),
            demo_seed: true,
        }
    }
}

impl Config {
    /// `<config dir>/todoflow/config.yaml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("todoflow").join("config.yaml"))
    }

    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context(format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).context(format!("Failed to parse config file {}", path.display()))?;

        debug!(path = ?path, ?config, "Loaded config");
        Ok(config)
    }
}
