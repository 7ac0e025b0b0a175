//! User configuration stored in `~/.workstate/config.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::ArchiveOptions;
use crate::error::ConfigError;

const CONFIG_DIR: &str = ".workstate";
const CONFIG_FILE: &str = "config.json";
const STORE_DIR: &str = "store";

fn default_share_hours() -> u64 {
    24
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory used by the local store. Defaults to `~/.workstate/store`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkstateConfig {
    #[serde(default = "default_store")]
    pub store: StoreConfig,

    #[serde(default)]
    pub archive: ArchiveOptions,

    /// Lifetime of shared links.
    #[serde(default = "default_share_hours")]
    pub share_hours: u64,
}

fn default_store() -> StoreConfig {
    StoreConfig { dir: None }
}

impl Default for WorkstateConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            archive: ArchiveOptions::default(),
            share_hours: default_share_hours(),
        }
    }
}

impl WorkstateConfig {
    /// `~/.workstate`.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR))
            .ok_or(ConfigError::NoHome)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Directory for the local store, resolving the default.
    pub fn store_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.store.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::config_dir()?.join(STORE_DIR)),
        }
    }
}
