//! # Build Configuration Scheme
//!
//! The structural scheme every `kiln.toml` is validated against. Each call to
//! [`conf_scheme`] builds a fresh, independently mutable copy, so the validator
//! can inject dynamic constraints without touching shared state.

use crate::core::scheme::{Scheme, SchemeNode, TypeName};
use crate::core::value::{ConfMap, ConfValue};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    // One to three dot separated numeric parts: "2", "1.0", "4.5.6".
    static ref VERSION_RE: Regex = Regex::new(r"^\d+(\.\d+){0,2}$").expect("valid version regex");
}

/// Actions accepted by the `do` key of a task's `configure` entries.
pub const KNOWN_CONF_ACTIONS: &[&str] = &[
    "check-headers",
    "check-libs",
    "check-programs",
    "check-code",
    "write-config-header",
    "parallel",
];

/// Kinds of artifacts an external dependency can export.
pub const DEP_TARGET_TYPES: &[&str] = &["shlib", "stlib", "program", "file"];

/// Rules an external dependency may define.
pub const DEP_RULE_NAMES: &[&str] = &["configure", "build", "test", "clean", "install", "uninstall"];

/// Serialized forms accepted by `general.db-format`.
pub const DB_FORMATS: &[&str] = &["bincode", "json"];

/// Parameters whose values are a string or a list of strings.
const STR_OR_LIST_PARAMS: &[&str] = &[
    "features",
    "libs",
    "libpath",
    "stlibs",
    "stlibpath",
    "rpath",
    "use",
    "includes",
    "export-includes",
    "cflags",
    "cxxflags",
    "cppflags",
    "linkflags",
    "defines",
    "toolchain",
];

fn version_allowed(value: &ConfValue, _full_key: &str) -> Vec<String> {
    match value.as_str() {
        Some(v) if VERSION_RE.is_match(v) => vec![v.to_string()],
        _ => Vec::new(),
    }
}

fn source_scheme() -> Scheme {
    Scheme::new()
        .with("include", SchemeNode::str_or_list_of_strs())
        .with("exclude", SchemeNode::str_or_list_of_strs())
        .with("ignorecase", SchemeNode::bool())
        .with("startdir", SchemeNode::str())
        .with("paths", SchemeNode::str_or_list_of_strs())
}

fn run_scheme() -> Scheme {
    Scheme::new()
        .with("cmd", SchemeNode::union([TypeName::Str, TypeName::Func]))
        .with("cwd", SchemeNode::str())
        .with("env", SchemeNode::any_str_keys(TypeName::Str))
        .with("repeat", SchemeNode::int())
        .with("timeout", SchemeNode::int())
        .with("shell", SchemeNode::bool())
}

fn conf_action_do_node() -> SchemeNode {
    SchemeNode::str().with_allowed(KNOWN_CONF_ACTIONS.iter().copied())
}

/// Computes the scheme of one `configure` entry from its `do` value.
fn conf_action_scheme(value: &ConfValue, _full_key: &str) -> Scheme {
    let base = Scheme::new().with("do", conf_action_do_node());
    let action = value.get("do").and_then(ConfValue::as_str).unwrap_or_default();
    let names = SchemeNode::str_or_list_of_strs();
    match action {
        "check-headers" => base
            .with("names", names)
            .with("defname", SchemeNode::str())
            .with("defines", SchemeNode::str_or_list_of_strs())
            .with("mandatory", SchemeNode::bool())
            .with("autodefine", SchemeNode::bool()),
        "check-libs" => base
            .with("names", names)
            .with("fromtask", SchemeNode::bool())
            .with("defines", SchemeNode::str_or_list_of_strs())
            .with("mandatory", SchemeNode::bool())
            .with("autodefine", SchemeNode::bool()),
        "check-programs" => base
            .with("names", names)
            .with("paths", SchemeNode::str_or_list_of_strs())
            .with("var", SchemeNode::str())
            .with("mandatory", SchemeNode::bool()),
        "check-code" => base
            .with("text", SchemeNode::str())
            .with("file", SchemeNode::str())
            .with("label", SchemeNode::str())
            .with("defines", SchemeNode::str_or_list_of_strs())
            .with("execute", SchemeNode::bool())
            .with("mandatory", SchemeNode::bool()),
        "write-config-header" => base
            .with("file", SchemeNode::str())
            .with("guard", SchemeNode::str())
            .with("remove-defines", SchemeNode::bool()),
        "parallel" => base
            .with(
                "actions",
                SchemeNode::list_of(TypeName::Dict).with_computed_vars(conf_action_scheme),
            )
            .with("tryall", SchemeNode::bool()),
        // Unknown or missing action: only `do` itself is checked.
        _ => base,
    }
}

/// Parameters a task (or a buildtype, or a `byfilter.set` block) may carry.
pub fn task_params_scheme() -> Scheme {
    let mut scheme = Scheme::new()
        .with("normalize-target-name", SchemeNode::bool())
        .with("target", SchemeNode::str())
        .with("ver-num", SchemeNode::str().with_computed_allowed(version_allowed));

    for name in STR_OR_LIST_PARAMS {
        scheme = scheme.with(name, SchemeNode::str_or_list_of_strs());
    }

    scheme
        .with(
            "source",
            SchemeNode::union([TypeName::Str, TypeName::ListOfStrs, TypeName::Dict])
                .with_vars(source_scheme()),
        )
        .with(
            "configure",
            SchemeNode::list_of(TypeName::Dict).with_computed_vars(conf_action_scheme),
        )
        .with("run", SchemeNode::dict(run_scheme()))
}

/// The scheme of an entry under `tasks`: task parameters plus a per-task
/// `buildtypes` block overriding parameters for selected buildtypes.
pub fn task_scheme() -> Scheme {
    let overrides = Scheme::new().with_any_strs(SchemeNode::dict(task_params_scheme()));
    task_params_scheme().with("buildtypes", SchemeNode::dict(overrides))
}

fn filter_scheme() -> Scheme {
    Scheme::new()
        .with("task", SchemeNode::str_or_list_of_strs())
        .with("buildtype", SchemeNode::str_or_list_of_strs())
        .with("platform", SchemeNode::str_or_list_of_strs())
}

fn byfilter_item_scheme() -> Scheme {
    Scheme::new()
        .with(
            "for",
            SchemeNode::union([TypeName::Str, TypeName::Dict])
                .with_allowed(["all"])
                .with_vars(filter_scheme()),
        )
        .with("not-for", SchemeNode::dict(filter_scheme()))
        .with("set", SchemeNode::dict(task_params_scheme()))
}

fn dependency_scheme() -> Scheme {
    let target = Scheme::new()
        .with("dir", SchemeNode::str())
        .with("type", SchemeNode::str().with_allowed(DEP_TARGET_TYPES.iter().copied()))
        .with("name", SchemeNode::str());

    let rule = Scheme::new()
        .with("cmd", SchemeNode::union([TypeName::Str, TypeName::Func]))
        .with("shell", SchemeNode::bool())
        .with("trigger", SchemeNode::dict(Scheme::new()).allowing_unknown_keys())
        .with("zm-commands", SchemeNode::str_or_list_of_strs());

    Scheme::new()
        .with("rootdir", SchemeNode::str())
        .with("export-includes", SchemeNode::str_or_list_of_strs())
        .with(
            "targets",
            SchemeNode::any_str_keys(TypeName::Dict).with_vars(target),
        )
        .with(
            "rules",
            SchemeNode::listed_keys(
                DEP_RULE_NAMES.iter().copied(),
                crate::core::scheme::SchemeType::Complex(vec![TypeName::Str, TypeName::Dict]),
            )
            .with_vars(rule),
        )
}

/// Every buildtype name a configuration mentions: the keys of the top-level
/// `buildtypes` block (including the `default` selector) and of each task's
/// `buildtypes` override block.
pub fn buildtype_names(tree: &ConfMap) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if let Some(buildtypes) = tree.get("buildtypes").and_then(ConfValue::as_map) {
        names.extend(buildtypes.str_keys().map(str::to_string));
    }
    if let Some(tasks) = tree.get("tasks").and_then(ConfValue::as_map) {
        for (_, task) in tasks.iter() {
            if let Some(overrides) = task.get("buildtypes").and_then(ConfValue::as_map) {
                names.extend(overrides.str_keys().map(str::to_string));
            }
        }
    }
    names
}

/// Builds the complete scheme of a build configuration file.
pub fn conf_scheme() -> Scheme {
    let general = Scheme::new()
        .with("autoconfig", SchemeNode::bool().with_default(ConfValue::Bool(true)))
        .with(
            "db-format",
            SchemeNode::str()
                .with_allowed(DB_FORMATS.iter().copied())
                .with_default(ConfValue::str("bincode")),
        );

    let project = Scheme::new()
        .with("name", SchemeNode::str())
        .with("version", SchemeNode::str());

    let buildtypes = Scheme::new()
        .with("default", SchemeNode::str())
        .with_any_strs(SchemeNode::dict(task_params_scheme()));

    let toolchain = Scheme::new()
        .with("kind", SchemeNode::str())
        .with_any_strs(SchemeNode::str());

    let platform = Scheme::new()
        .with("valid", SchemeNode::str_or_list_of_strs())
        .with("default", SchemeNode::str());

    Scheme::new()
        .with("startdir", SchemeNode::str())
        .with("buildroot", SchemeNode::str().with_default(ConfValue::str("build")))
        .with("realbuildroot", SchemeNode::str())
        .with("general", SchemeNode::dict(general))
        .with("project", SchemeNode::dict(project))
        .with("buildtypes", SchemeNode::dict(buildtypes))
        .with(
            "toolchains",
            SchemeNode::any_str_keys(TypeName::Dict).with_vars(toolchain),
        )
        .with(
            "platforms",
            SchemeNode::any_str_keys(TypeName::Dict).with_vars(platform),
        )
        .with(
            "tasks",
            SchemeNode::any_str_keys(TypeName::Dict).with_vars(task_scheme()),
        )
        .with(
            "byfilter",
            SchemeNode::list_of(TypeName::Dict).with_vars(byfilter_item_scheme()),
        )
        .with(
            "dependencies",
            SchemeNode::any_str_keys(TypeName::Dict).with_vars(dependency_scheme()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_allowed_accepts_dotted_numbers() {
        for v in ["2", "1.0", "4.5.6"] {
            assert_eq!(version_allowed(&ConfValue::str(v), "ver-num"), vec![v.to_string()]);
        }
        assert!(version_allowed(&ConfValue::str("2abc"), "ver-num").is_empty());
        assert!(version_allowed(&ConfValue::str("1.2.3.4"), "ver-num").is_empty());
    }

    #[test]
    fn test_conf_action_scheme_depends_on_do() {
        let headers = ConfValue::map([("do", ConfValue::str("check-headers"))]);
        let scheme = conf_action_scheme(&headers, "tasks.a.configure.[0]");
        assert!(scheme.node("names").is_some());
        assert!(scheme.node("fromtask").is_none());

        let libs = ConfValue::map([("do", ConfValue::str("check-libs"))]);
        assert!(conf_action_scheme(&libs, "x").node("fromtask").is_some());

        let unknown = ConfValue::map([("do", ConfValue::Int(1))]);
        assert_eq!(conf_action_scheme(&unknown, "x").sorted_names(), vec!["do"]);
    }

    #[test]
    fn test_buildtype_names_collects_overrides() {
        let tree: ConfMap = [
            (
                "buildtypes",
                ConfValue::map([("debug", ConfValue::map(Vec::<(&str, ConfValue)>::new()))]),
            ),
            (
                "tasks",
                ConfValue::map([(
                    "app",
                    ConfValue::map([(
                        "buildtypes",
                        ConfValue::map([("asan", ConfValue::map(Vec::<(&str, ConfValue)>::new()))]),
                    )]),
                )]),
            ),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = buildtype_names(&tree).into_iter().collect();
        assert_eq!(names, vec!["asan", "debug"]);
    }

    #[test]
    fn test_conf_scheme_has_default_buildtype_slot() {
        let scheme = conf_scheme();
        let buildtypes = scheme.node("buildtypes").and_then(|n| n.vars.as_ref());
        assert!(matches!(
            buildtypes,
            Some(crate::core::scheme::SubScheme::Static(s)) if s.node("default").is_some() && s.wildcard().is_some()
        ));
    }
}
