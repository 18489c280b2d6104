// src/cli/handlers/build.rs

//! Build-type commands. Each goes through the reconciliation controller, which
//! configures the project first when needed.

use crate::cli::args::BuildArgs;
use crate::cli::engine::LocalEngine;
use crate::cli::handlers::commons;
use crate::core::configure::{self, Settings};
use crate::core::reconcile::{Outcome, ReconciliationController};
use anyhow::Result;
use clap::Parser;
use colored::*;

pub fn build(args: Vec<String>) -> Result<()> {
    run_command("build", args)
}

pub fn test(args: Vec<String>) -> Result<()> {
    run_command("test", args)
}

pub fn clean(args: Vec<String>) -> Result<()> {
    run_command("clean", args)
}

pub fn install(args: Vec<String>) -> Result<()> {
    run_command("install", args)
}

pub fn uninstall(args: Vec<String>) -> Result<()> {
    run_command("uninstall", args)
}

fn run_command(cmd: &str, args: Vec<String>) -> Result<()> {
    let args = BuildArgs::try_parse_from(&args)?;
    let project = commons::open_project(args.project.as_deref())?;
    let buildtype = commons::resolve_buildtype(&project, args.buildtype.as_deref())?;

    let settings = Settings::from_conf(&project.conf);
    let store = configure::task_store(&project.paths, &project.conf);
    let mut engine = LocalEngine::new(&project.paths, &project.conf, buildtype.as_str());
    let mut controller =
        ReconciliationController::new(&project.paths, &store, buildtype.as_str(), settings.autoconfig);

    if controller.reconcile(cmd, &mut engine)? == Outcome::NothingToDo {
        println!("{}", "Nothing to clean".yellow());
    }
    Ok(())
}
