//! Config directory location.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Application directory name under the platform config root.
pub const APP_DIR: &str = "podshell";

/// Name of the config file inside [`Paths::config_dir`].
pub const CONFIG_FILE: &str = "config.toml";

/// Resolved config directory.
///
/// Computed once at startup and passed to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    config_dir: PathBuf,
}

impl Paths {
    /// Use an explicit directory.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve the platform directory, e.g. `~/.config/podshell` on Linux.
    pub fn from_platform() -> Result<Self> {
        let config_root = dirs::config_dir()
            .ok_or_else(|| Error::config("unable to determine the user config directory"))?;
        Ok(Self::new(config_root.join(APP_DIR)))
    }

    /// The config directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The default config file path. Not created.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}
