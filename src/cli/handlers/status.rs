// src/cli/handlers/status.rs

use crate::cli::args::BuildArgs;
use crate::cli::handlers::commons;
use crate::core::configure::{self, Settings};
use crate::core::reconcile::{self, ProjectState};
use anyhow::Result;
use clap::Parser;
use colored::*;

/// Prints what a build command would find: the selected buildtype and the
/// evaluated project state.
pub fn handle(args: Vec<String>) -> Result<()> {
    let args = BuildArgs::try_parse_from(&args)?;
    let project = commons::open_project(args.project.as_deref())?;
    let buildtype = commons::resolve_buildtype(&project, args.buildtype.as_deref())?;
    let settings = Settings::from_conf(&project.conf);
    let store = configure::task_store(&project.paths, &project.conf);

    let (state, lock) = reconcile::evaluate_state(&project.paths, &store, &buildtype);
    let state_text = match state {
        ProjectState::UpToDate => state.to_string().green(),
        ProjectState::NoProject => state.to_string().red(),
        _ => state.to_string().yellow(),
    };

    println!("  {:<12} {}", "project".blue(), project.paths.dirs.run_dir.display());
    println!("  {:<12} {}", "buildtype".blue(), buildtype);
    println!("  {:<12} {}", "out dir".blue(), project.paths.dirs.out_dir.display());
    println!("  {:<12} {}", "autoconfig".blue(), settings.autoconfig);
    println!("  {:<12} {:?}", "db format".blue(), store.db_format());
    if let Some(cmd) = lock.and_then(|l| l.config_cmd) {
        println!("  {:<12} {}", "configured by".blue(), cmd);
    }
    println!("  {:<12} {}", "state".blue(), state_text);
    Ok(())
}
