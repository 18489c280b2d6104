//! # Config Loader
//!
//! Locates and parses the build configuration file (`kiln.toml` or `kiln.json`)
//! into a [`BuildConf`]: the configuration tree plus the path it came from, so
//! that validation errors can name the file.

use crate::constants::CONFIG_FILENAMES;
use crate::core::value::{ConfMap, ConfValue};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading a build configuration file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML in '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("The top level of '{0}' must be a table.")]
    NotATable(PathBuf),
}

/// A parsed build configuration and its source file.
#[derive(Debug, Clone)]
pub struct BuildConf {
    pub path: PathBuf,
    pub tree: ConfMap,
}

impl BuildConf {
    /// Looks up a top-level key.
    pub fn get(&self, key: &str) -> Option<&ConfValue> {
        self.tree.get(key)
    }

    /// The directory containing the configuration file.
    pub fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// Returns the first configuration file found directly in `dir`.
pub fn find_conf_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Reads and parses a configuration file. The format follows the extension:
/// `.json` is JSON, anything else is TOML.
pub fn load(path: &Path) -> Result<BuildConf, LoadError> {
    log::debug!("Loading build configuration from '{}'", path.display());

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let tree = if path.extension().is_some_and(|ext| ext == "json") {
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        ConfValue::from(value)
    } else {
        let table: toml::Table = toml::from_str(&content).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        ConfValue::from(toml::Value::Table(table))
    };

    match tree {
        ConfValue::Map(tree) => Ok(BuildConf {
            path: path.to_path_buf(),
            tree,
        }),
        _ => Err(LoadError::NotATable(path.to_path_buf())),
    }
}
