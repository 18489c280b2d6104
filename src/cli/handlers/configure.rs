// src/cli/handlers/configure.rs

use crate::cli::args::BuildArgs;
use crate::cli::engine;
use crate::cli::handlers::commons;
use anyhow::Result;
use clap::Parser;

/// Runs the configure step directly, whatever the project's state.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = BuildArgs::try_parse_from(&args)?;
    let project = commons::open_project(args.project.as_deref())?;
    let buildtype = commons::resolve_buildtype(&project, args.buildtype.as_deref())?;

    engine::configure_now(&project.paths, &project.conf, &buildtype)
}
