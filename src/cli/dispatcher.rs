// src/cli/dispatcher.rs

use anyhow::{Result, anyhow};

use crate::cli::handlers;

// --- Command Definition and Registry ---

/// A command, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>) -> Result<()>,
}

/// Every command the binary knows.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "configure",
        aliases: &["conf"],
        handler: handlers::configure::handle,
    },
    CommandDefinition {
        name: "build",
        aliases: &[],
        handler: handlers::build::build,
    },
    CommandDefinition {
        name: "test",
        aliases: &[],
        handler: handlers::build::test,
    },
    CommandDefinition {
        name: "clean",
        aliases: &[],
        handler: handlers::build::clean,
    },
    CommandDefinition {
        name: "install",
        aliases: &[],
        handler: handlers::build::install,
    },
    CommandDefinition {
        name: "uninstall",
        aliases: &[],
        handler: handlers::build::uninstall,
    },
    CommandDefinition {
        name: "distclean",
        aliases: &[],
        handler: handlers::distclean::handle,
    },
    CommandDefinition {
        name: "validate",
        aliases: &["check"],
        handler: handlers::validate::handle,
    },
    CommandDefinition {
        name: "status",
        aliases: &["st"],
        handler: handlers::status::handle,
    },
];

/// Finds a command by name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Names of every command, in registry order.
pub fn command_names() -> Vec<&'static str> {
    COMMAND_REGISTRY.iter().map(|cmd| cmd.name).collect()
}

/// Routes `command` to its handler. No command means `build`.
pub fn dispatch(command: Option<&str>, args: Vec<String>) -> Result<()> {
    let name = command.unwrap_or("build");
    let definition = find_command(name).ok_or_else(|| {
        anyhow!(
            "Unknown command '{}'. Available commands: {}",
            name,
            command_names().join(", ")
        )
    })?;
    log::debug!("Dispatching '{}' with {:?}", definition.name, args);
    (definition.handler)(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("build").map(|c| c.name), Some("build"));
        assert_eq!(find_command("conf").map(|c| c.name), Some("configure"));
        assert!(find_command("deploy").is_none());
    }

    #[test]
    fn test_unknown_command_lists_available() {
        let err = dispatch(Some("deploy"), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("distclean"));
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(dispatch(Some("validate"), vec!["--buildtype".into(), "x".into()]).is_err());
    }
}
