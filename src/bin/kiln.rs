// src/bin/kiln.rs

use clap::Parser;
use colored::*;
use kiln::cli::{Cli, dispatcher};

/// The entry point of `kiln`: sets up logging, dispatches the command and
/// prints any error.
fn main() {
    let mut cli = Cli::parse();
    let verbose = cli.take_verbose();

    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = dispatcher::dispatch(cli.command.as_deref(), cli.args) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
