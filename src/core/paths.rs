// src/core/paths.rs

//! Project discovery and the directory layout derived from a build configuration.

use crate::constants::{
    CACHE_DIR_NAME, CONFIG_FILENAMES, DEFAULT_BUILDROOT, DEFAULT_BUILDTYPE, LOCK_FILENAME,
    META_FILENAME,
};
use crate::core::confscheme::buildtype_names;
use crate::core::loader::{self, BuildConf, LoadError};
use crate::core::value::ConfValue;
use crate::models::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("No build configuration ({names}) found in '{dir}' or any parent directory.")]
    ConfigNotFound { dir: PathBuf, names: String },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Could not expand path '{path}': {message}")]
    Expand { path: String, message: String },
    #[error("Could not resolve directory '{path}': {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Buildtype is not set and the configuration has no default buildtype.")]
    NoBuildtype,
    #[error("Unknown buildtype '{name}'. Declared buildtypes: {declared}")]
    UnknownBuildtype { name: String, declared: String },
    #[error("Buildtype '{name}' is not valid on platform '{platform}'. Valid buildtypes: {valid}")]
    InvalidForPlatform {
        name: String,
        platform: String,
        valid: String,
    },
}

/// Expands `~` and environment variables in `raw` and anchors a relative
/// result at `root`.
pub fn expand_path(root: &Path, raw: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(raw).map_err(|e| PathError::Expand {
        path: raw.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.into_owned());
    Ok(if path.is_absolute() { path } else { root.join(path) })
}

/// Like [`expand_path`], but canonicalizes paths that exist.
pub fn unfold_path(root: &Path, raw: &str) -> Result<PathBuf, PathError> {
    let path = expand_path(root, raw)?;
    Ok(dunce::canonicalize(&path).unwrap_or(path))
}

/// Finds the build configuration in `start_dir` or the nearest ancestor and
/// loads it.
pub fn find_project(start_dir: &Path) -> Result<BuildConf, PathError> {
    for dir in start_dir.ancestors() {
        if let Some(path) = loader::find_conf_file(dir) {
            log::debug!("Found build configuration '{}'", path.display());
            return Ok(loader::load(&path)?);
        }
    }
    Err(PathError::ConfigNotFound {
        dir: start_dir.to_path_buf(),
        names: CONFIG_FILENAMES.join(", "),
    })
}

/// Every location the tool reads or writes for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub conf_path: PathBuf,
    pub dirs: ProjectDirs,
    /// The build root as configured. When `realbuildroot` is set this is a
    /// symlink to `dirs.out_dir`.
    pub buildroot: PathBuf,
    pub cache_dir: PathBuf,
    pub lock_path: PathBuf,
    pub meta_path: PathBuf,
}

impl ProjectPaths {
    /// Derives the layout of the project a configuration belongs to.
    pub fn from_conf(conf: &BuildConf) -> Result<Self, PathError> {
        let conf_dir = conf.dir();
        let run_dir = dunce::canonicalize(conf_dir).map_err(|source| PathError::Resolve {
            path: conf_dir.to_path_buf(),
            source,
        })?;

        let str_param = |key: &str| conf.get(key).and_then(ConfValue::as_str);

        let top_dir = match str_param("startdir") {
            Some(raw) => unfold_path(&run_dir, raw)?,
            None => run_dir.clone(),
        };
        let raw_buildroot = str_param("buildroot").unwrap_or(DEFAULT_BUILDROOT);
        let (buildroot, out_dir) = match str_param("realbuildroot") {
            // the build root stays a link, never resolved to its target
            Some(raw) => (expand_path(&run_dir, raw_buildroot)?, unfold_path(&run_dir, raw)?),
            None => {
                let buildroot = unfold_path(&run_dir, raw_buildroot)?;
                (buildroot.clone(), buildroot)
            }
        };

        let cache_dir = out_dir.join(CACHE_DIR_NAME);
        Ok(Self {
            conf_path: conf.path.clone(),
            lock_path: run_dir.join(LOCK_FILENAME),
            meta_path: cache_dir.join(META_FILENAME),
            cache_dir,
            buildroot,
            dirs: ProjectDirs {
                run_dir,
                top_dir,
                out_dir,
            },
        })
    }

    /// Finds the project containing `start_dir`, loads its configuration and
    /// derives its layout.
    pub fn discover(start_dir: &Path) -> Result<(Self, BuildConf), PathError> {
        let conf = find_project(start_dir)?;
        let paths = Self::from_conf(&conf)?;
        Ok((paths, conf))
    }
}

/// Buildtypes a configuration declares, without the `default` selector.
pub fn declared_buildtypes(conf: &BuildConf) -> Vec<String> {
    let mut names = buildtype_names(&conf.tree);
    names.remove("default");
    names.into_iter().collect()
}

/// Picks the buildtype for this invocation on the current platform.
pub fn select_buildtype(conf: &BuildConf, requested: Option<&str>) -> Result<String, PathError> {
    select_buildtype_for(conf, requested, std::env::consts::OS)
}

/// Picks the buildtype, in order: the requested one, the platform default
/// (`platforms.<os>.default`), `buildtypes.default`, the only declared one.
/// The result must be declared and, when the platform restricts them, valid there.
pub fn select_buildtype_for(
    conf: &BuildConf,
    requested: Option<&str>,
    platform: &str,
) -> Result<String, PathError> {
    let declared = declared_buildtypes(conf);
    let platform_conf = conf.get("platforms").and_then(|p| p.get(platform));

    let candidate = requested
        .filter(|r| !r.is_empty())
        .or_else(|| platform_conf.and_then(|p| p.get("default")).and_then(ConfValue::as_str))
        .or_else(|| {
            conf.get("buildtypes")
                .and_then(|b| b.get("default"))
                .and_then(ConfValue::as_str)
        })
        .map(str::to_string);

    let selected = match (candidate, declared.as_slice()) {
        (Some(name), _) => name,
        (None, [only]) => only.clone(),
        (None, []) => DEFAULT_BUILDTYPE.to_string(),
        (None, _) => return Err(PathError::NoBuildtype),
    };

    if !declared.is_empty() && !declared.contains(&selected) {
        return Err(PathError::UnknownBuildtype {
            name: selected,
            declared: declared.join(", "),
        });
    }

    if let Some(valid) = platform_conf.and_then(|p| p.get("valid")) {
        let valid = valid.to_str_list();
        if !valid.contains(&selected) {
            return Err(PathError::InvalidForPlatform {
                name: selected,
                platform: platform.to_string(),
                valid: valid.join(", "),
            });
        }
    }

    log::debug!("Selected buildtype '{}'", selected);
    Ok(selected)
}
