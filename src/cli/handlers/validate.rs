// src/cli/handlers/validate.rs

use crate::cli::args::ProjectArgs;
use crate::cli::handlers::commons;
use crate::core::validator;
use anyhow::Result;
use clap::Parser;
use colored::*;

pub fn handle(args: Vec<String>) -> Result<()> {
    let args = ProjectArgs::try_parse_from(&args)?;
    let project = commons::open_project(args.project.as_deref())?;

    validator::validate_conf(&project.conf)?;
    println!("'{}' {}", project.conf.path.display(), "is valid".green().bold());
    Ok(())
}
