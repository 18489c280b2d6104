// src/cli/handlers/distclean.rs

use crate::cli::args::ProjectArgs;
use crate::cli::handlers::commons;
use crate::core::task_cache;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

/// Removes the build root (and the directory it links to) and the lock file.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = ProjectArgs::try_parse_from(&args)?;
    let project = commons::open_project(args.project.as_deref())?;
    let paths = &project.paths;

    task_cache::distclean(&paths.buildroot, &paths.lock_path)
        .with_context(|| format!("Could not remove '{}'", paths.buildroot.display()))?;
    println!("{} '{}'", "Removed".green().bold(), paths.buildroot.display());
    Ok(())
}
