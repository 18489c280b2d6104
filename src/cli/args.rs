// src/cli/args.rs
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // handlers receive the arguments after the command name
pub struct ProjectArgs {
    /// A directory inside the project. Defaults to the current directory.
    #[arg(long, short = 'C')]
    pub project: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct BuildArgs {
    /// The buildtype to use. Falls back to `KILN_BUILDTYPE`, then to the
    /// configuration's default.
    #[arg(long, short)]
    pub buildtype: Option<String>,

    /// A directory inside the project. Defaults to the current directory.
    #[arg(long, short = 'C')]
    pub project: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let args = BuildArgs::try_parse_from(["-b", "release", "--project", "/tmp/p"]).unwrap();
        assert_eq!(args.buildtype.as_deref(), Some("release"));
        assert_eq!(args.project, Some(PathBuf::from("/tmp/p")));

        assert!(ProjectArgs::try_parse_from(["--buildtype", "x"]).is_err());
    }
}
