use clap::Parser;

pub mod args;
pub mod dispatcher;
pub mod engine;
pub mod handlers;

/// kiln: validates build configurations and keeps the build configured.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Print debug logs. Accepted before or after the command.
    #[arg(long, short)]
    pub verbose: bool,

    /// One of: configure, build, test, clean, install, uninstall, distclean,
    /// validate, status.
    pub command: Option<String>,

    /// Arguments for the command, e.g. `--buildtype release`.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Pulls `--verbose`/`-v` out of the command arguments and tells whether
    /// verbose output was asked for anywhere.
    pub fn take_verbose(&mut self) -> bool {
        let before = self.args.len();
        self.args.retain(|a| a != "--verbose" && a != "-v");
        self.verbose || self.args.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_and_trailing_args() {
        let mut cli = Cli::try_parse_from(["kiln", "build", "--buildtype", "release", "--verbose"]).unwrap();

        assert_eq!(cli.command.as_deref(), Some("build"));
        assert!(cli.take_verbose());
        assert_eq!(cli.args, vec!["--buildtype", "release"]);
    }

    #[test]
    fn test_verbose_before_command() {
        let mut cli = Cli::try_parse_from(["kiln", "-v", "status"]).unwrap();
        assert!(cli.take_verbose());
        assert!(cli.args.is_empty());

        let mut quiet = Cli::try_parse_from(["kiln", "validate"]).unwrap();
        assert!(!quiet.take_verbose());
    }
}
