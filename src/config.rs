use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

pub const CONFIG_FILE_NAME: &str = "medview-ds.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub max_entry_bytes: Option<u64>,
}

/// Bounds on recursive archive expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_depth: usize,
    pub max_entries: usize,
    /// Largest decompressed size accepted for a single member.
    pub max_entry_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_entries: 10_000,
            max_entry_bytes: 1 << 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub schema_version: u32,
    pub archive: ArchiveLimits,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            archive: ArchiveLimits::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, the working directory and
    /// then the user config directory are searched; defaults apply when
    /// neither has a config file.
    pub fn resolve(path: Option<&str>) -> Result<StoreConfig, DatasetError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => match Self::discover() {
                Some(found) => found,
                None => return Ok(StoreConfig::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| DatasetError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| DatasetError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<StoreConfig, DatasetError> {
        let defaults = ArchiveLimits::default();
        let archive = ArchiveLimits {
            max_depth: config.archive.max_depth.unwrap_or(defaults.max_depth),
            max_entries: config.archive.max_entries.unwrap_or(defaults.max_entries),
            max_entry_bytes: config
                .archive
                .max_entry_bytes
                .unwrap_or(defaults.max_entry_bytes),
        };
        if archive.max_depth == 0 {
            return Err(DatasetError::ConfigParse(
                "archive.max_depth must be at least 1".to_string(),
            ));
        }
        if archive.max_entries == 0 {
            return Err(DatasetError::ConfigParse(
                "archive.max_entries must be at least 1".to_string(),
            ));
        }

        if archive.max_entry_bytes == 0 {
            return Err(DatasetError::ConfigParse(
                "archive.max_entry_bytes must be at least 1".to_string(),
            ));
        }

        Ok(StoreConfig {
            schema_version: config.schema_version.unwrap_or(1),
            archive,
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "medview", "medview-ds")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}
