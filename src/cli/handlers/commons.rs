// src/cli/handlers/commons.rs

// Shared helpers for the command handlers.

use crate::constants::ENV_BUILDTYPE;
use crate::core::loader::BuildConf;
use crate::core::paths::{self, ProjectPaths};
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// A discovered project: its layout and its loaded configuration.
#[derive(Debug)]
pub struct Project {
    pub paths: ProjectPaths,
    pub conf: BuildConf,
}

/// Finds the project containing `dir` (the current directory by default).
pub fn open_project(dir: Option<&Path>) -> Result<Project> {
    let start = match dir {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir().context("Could not read the current directory")?,
    };
    let (paths, conf) = ProjectPaths::discover(&start)?;
    log::debug!("Project root: '{}'", paths.dirs.run_dir.display());
    Ok(Project { paths, conf })
}

/// The buildtype for this invocation: the command line, then `KILN_BUILDTYPE`,
/// then the configuration's own selection rules.
pub fn resolve_buildtype(project: &Project, requested: Option<&str>) -> Result<String> {
    resolve_buildtype_with(project, requested, |name| env::var(name).ok())
}

pub fn resolve_buildtype_with<F>(project: &Project, requested: Option<&str>, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = lookup(ENV_BUILDTYPE);
    let requested = requested.or(from_env.as_deref());
    Ok(paths::select_buildtype(&project.conf, requested)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_buildtype_from_cli_env_and_default() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            "[buildtypes]\ndefault = 'debug'\ndebug = {}\nrelease = {}\n",
        )
        .unwrap();
        let project = open_project(Some(dir.path())).unwrap();
        let env_release = |name: &str| (name == ENV_BUILDTYPE).then(|| "release".to_string());

        // --- Execute & Assert ---
        assert_eq!(resolve_buildtype_with(&project, None, |_| None).unwrap(), "debug");
        assert_eq!(resolve_buildtype_with(&project, None, env_release).unwrap(), "release");
        assert_eq!(
            resolve_buildtype_with(&project, Some("debug"), env_release).unwrap(),
            "debug"
        );
        assert!(resolve_buildtype_with(&project, Some("nope"), |_| None).is_err());
    }
}
