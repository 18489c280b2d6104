//! # Configure
//!
//! Turns a validated build configuration into the persisted state build
//! commands consume: the task cache of one buildtype, the project meta record
//! and the lock record.
//!
//! Task parameters are merged in a fixed order, later sources overriding
//! earlier ones:
//!
//! 1. the top-level `buildtypes.<buildtype>` block,
//! 2. the `set` block of every matching `byfilter` entry,
//! 3. the task's own parameters,
//! 4. the task's `buildtypes.<buildtype>` override block.

use crate::constants::{ENV_AUTOCONFIG, TOOLCHAIN_VARS};
use crate::core::hashing::HashError;
use crate::core::loader::BuildConf;
use crate::core::paths::{self, PathError, ProjectPaths};
use crate::core::task_cache::{self, CacheError, TaskCacheStore};
use crate::core::validator::{self, ValidationError};
use crate::core::value::{ConfMap, ConfValue};
use crate::models::{
    DbFormat, EnvTable, LockRecord, MetaRecord, ParamValue, TaskCacheRecord, TaskParams,
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

/// Task parameters exported into the task environment, with their variable names.
const ENV_FLAG_KEYS: &[(&str, &str)] = &[
    ("cflags", "CFLAGS"),
    ("cxxflags", "CXXFLAGS"),
    ("cppflags", "CPPFLAGS"),
    ("linkflags", "LINKFLAGS"),
    ("defines", "DEFINES"),
    ("includes", "INCLUDES"),
    ("libs", "LIBS"),
    ("stlibs", "STLIBS"),
    ("libpath", "LIBPATH"),
    ("stlibpath", "STLIBPATH"),
    ("rpath", "RPATH"),
];

#[derive(Error, Debug)]
pub enum ConfigureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("Could not link build root '{link}' to '{target}': {source}")]
    Symlink {
        link: std::path::PathBuf,
        target: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tool settings read from the `general` block and the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub autoconfig: bool,
    pub db_format: DbFormat,
}

impl Settings {
    pub fn from_conf(conf: &BuildConf) -> Self {
        Self::from_conf_with(conf, |name| env::var(name).ok())
    }

    fn from_conf_with<F>(conf: &BuildConf, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let general = conf.get("general");
        let configured = general
            .and_then(|g| g.get("autoconfig"))
            .and_then(ConfValue::as_bool)
            .unwrap_or(true);
        let autoconfig = match lookup(ENV_AUTOCONFIG).as_deref() {
            Some("0" | "false" | "no") => false,
            Some("1" | "true" | "yes") => true,
            _ => configured,
        };
        let db_format = general
            .and_then(|g| g.get("db-format"))
            .and_then(ConfValue::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Self {
            autoconfig,
            db_format,
        }
    }
}

/// The task cache store of a project.
pub fn task_store(paths: &ProjectPaths, conf: &BuildConf) -> TaskCacheStore {
    TaskCacheStore::new(&paths.cache_dir, Settings::from_conf(conf).db_format)
}

/// Names of the environment variables whose values are recorded at configure
/// time: the well-known toolchain variables plus every variable a declared
/// toolchain sets.
pub fn toolchain_var_names(conf: &BuildConf) -> Vec<String> {
    let mut names: Vec<String> = TOOLCHAIN_VARS.iter().map(|s| s.to_string()).collect();
    if let Some(toolchains) = conf.get("toolchains").and_then(ConfValue::as_map) {
        for (_, toolchain) in toolchains.iter() {
            if let Some(vars) = toolchain.as_map() {
                names.extend(vars.str_keys().filter(|k| *k != "kind").map(str::to_string));
            }
        }
    }
    names.sort();
    names.dedup();
    names
}

fn filter_matches(filter: &ConfValue, task: &str, buildtype: &str, platform: &str) -> bool {
    if filter.as_str() == Some("all") {
        return true;
    }
    let Some(filter) = filter.as_map() else {
        return false;
    };
    [("task", task), ("buildtype", buildtype), ("platform", platform)]
        .iter()
        .all(|(key, actual)| match filter.get(key) {
            Some(expected) => expected.to_str_list().iter().any(|e| e == actual),
            None => true,
        })
}

fn byfilter_applies(item: &ConfValue, task: &str, buildtype: &str, platform: &str) -> bool {
    let included = item
        .get("for")
        .is_none_or(|f| filter_matches(f, task, buildtype, platform));
    let excluded = item
        .get("not-for")
        .is_some_and(|f| filter_matches(f, task, buildtype, platform));
    included && !excluded
}

fn merge_into(target: &mut ConfMap, source: Option<&ConfValue>, skip: &[&str]) {
    let Some(source) = source.and_then(ConfValue::as_map) else {
        return;
    };
    for (key, value) in source.iter() {
        if key.as_str().is_some_and(|k| skip.contains(&k)) {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Resolves the parameters of one task for a buildtype on a platform.
pub fn resolve_task_params(
    conf: &BuildConf,
    task_name: &str,
    task: &ConfValue,
    buildtype: &str,
    platform: &str,
) -> ConfMap {
    let mut params = ConfMap::new();

    merge_into(
        &mut params,
        conf.get("buildtypes").and_then(|b| b.get(buildtype)),
        &[],
    );

    if let Some(filters) = conf.get("byfilter").and_then(ConfValue::as_list) {
        for item in filters {
            if byfilter_applies(item, task_name, buildtype, platform) {
                merge_into(&mut params, item.get("set"), &[]);
            }
        }
    }

    merge_into(&mut params, Some(task), &["buildtypes"]);
    merge_into(
        &mut params,
        task.get("buildtypes").and_then(|b| b.get(buildtype)),
        &[],
    );
    params
}

fn task_env(params: &ConfMap) -> EnvTable {
    ENV_FLAG_KEYS
        .iter()
        .filter_map(|(key, var)| {
            let value = params.get(key)?;
            Some((var.to_string(), ParamValue::strs(value.to_str_list())))
        })
        .collect()
}

/// Builds the task cache record of a buildtype without touching the disk
/// (apart from resolving dependency root directories).
pub fn build_task_record(
    conf: &BuildConf,
    paths: &ProjectPaths,
    buildtype: &str,
    platform: &str,
) -> Result<TaskCacheRecord, ConfigureError> {
    let mut record = TaskCacheRecord::default();

    if let Some(tasks) = conf.get("tasks").and_then(ConfValue::as_map) {
        for (key, task) in tasks.iter() {
            let Some(name) = key.as_str() else {
                continue;
            };
            let mut params = resolve_task_params(conf, name, task, buildtype, platform);
            let features = params
                .remove("features")
                .map(|f| f.to_str_list())
                .unwrap_or_default();
            let variant = task_cache::variant_id(buildtype, name);
            debug!("Resolved task '{}' as '{}' with features {:?}", name, variant, features);

            record.taskenvs.insert(variant.clone(), task_env(&params));
            record.tasks.insert(
                name.to_string(),
                TaskParams {
                    name: name.to_string(),
                    variant,
                    features,
                    params: params
                        .iter()
                        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), ParamValue::from_conf(v)?)))
                        .collect(),
                },
            );
        }
    }

    if let Some(deps) = conf.get("dependencies").and_then(ConfValue::as_map) {
        for (key, dep) in deps.iter() {
            let Some(name) = key.as_str() else {
                continue;
            };
            let mut resolved = match ParamValue::from_conf(dep) {
                Some(ParamValue::Map(map)) => map,
                _ => BTreeMap::new(),
            };
            if let Some(rootdir) = dep.get("rootdir").and_then(ConfValue::as_str) {
                let rootdir = paths::unfold_path(&paths.dirs.top_dir, rootdir)?;
                resolved.insert(
                    "rootdir".to_string(),
                    ParamValue::Str(rootdir.display().to_string()),
                );
            }
            record.depconfs.insert(name.to_string(), ParamValue::Map(resolved));
        }
    }

    Ok(record)
}

#[cfg(unix)]
fn link_buildroot(paths: &ProjectPaths) -> Result<(), ConfigureError> {
    let link = &paths.buildroot;
    let target = &paths.dirs.out_dir;
    if link == target || link.exists() || std::fs::symlink_metadata(link).is_ok() {
        return Ok(());
    }
    std::fs::create_dir_all(target).map_err(CacheError::Io)?;
    std::os::unix::fs::symlink(target, link).map_err(|source| ConfigureError::Symlink {
        link: link.clone(),
        target: target.clone(),
        source,
    })
}

#[cfg(not(unix))]
fn link_buildroot(_paths: &ProjectPaths) -> Result<(), ConfigureError> {
    Ok(())
}

/// What a configure run produced.
#[derive(Debug, Clone)]
pub struct ConfigureReport {
    pub buildtype: String,
    pub record: TaskCacheRecord,
}

/// Validates the configuration, then writes the task cache of `buildtype`,
/// the meta record and the lock record. The lock is written last, so an
/// interrupted configure leaves the project looking unconfigured.
pub fn configure(
    paths: &ProjectPaths,
    conf: &BuildConf,
    buildtype: &str,
    config_cmd: &str,
) -> Result<ConfigureReport, ConfigureError> {
    info!("Configuring '{}' for buildtype '{}'", paths.dirs.run_dir.display(), buildtype);
    validator::validate_conf(conf)?;

    let settings = Settings::from_conf(conf);
    let record = build_task_record(conf, paths, buildtype, env::consts::OS)?;

    let meta = MetaRecord::capture(
        &paths.dirs,
        vec![paths.conf_path.clone()],
        record.tasks.keys().cloned().collect(),
        &toolchain_var_names(conf),
    )?;

    let store = TaskCacheStore::new(&paths.cache_dir, settings.db_format);
    // Caches of other buildtypes were resolved from the previous sources.
    let previous = task_cache::load_meta(&paths.meta_path, settings.db_format).ok();
    if previous.is_none_or(|p| p.monithash != meta.monithash) {
        store.remove_others(buildtype)?;
    }
    store.save(buildtype, &record)?;
    link_buildroot(paths)?;

    task_cache::write_meta(&paths.meta_path, &meta, settings.db_format)?;
    task_cache::write_lock(&paths.lock_path, &LockRecord::new(&paths.dirs, config_cmd))?;

    Ok(ConfigureReport {
        buildtype: buildtype.to_string(),
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hashing;
    use crate::core::loader;
    use std::fs;
    use tempfile::tempdir;

    const CONF: &str = r#"
[general]
db-format = "json"

[buildtypes]
default = "debug"
debug = { cxxflags = "-O0 -g" }
release = { cxxflags = "-O2" }

[[byfilter]]
for = { task = "util" }
set = { defines = ["UTIL=1"] }

[[byfilter]]
for = "all"
not-for = { buildtype = "release" }
set = { includes = "include" }

[tasks."my app"]
features = "cxxprogram"
use = "util"
libs = ["m", "pthread"]

[tasks."my app".buildtypes.release]
cxxflags = "-O3"

[tasks.util]
features = ["cxxstlib"]

[toolchains.my-gcc]
kind = "g++"
MY_CXX = "g++-13"

[dependencies.zlib]
rootdir = "third_party/zlib"
"#;

    fn project() -> (tempfile::TempDir, ProjectPaths, BuildConf) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kiln.toml"), CONF).unwrap();
        let conf = loader::load(&dir.path().join("kiln.toml")).unwrap();
        let paths = ProjectPaths::from_conf(&conf).unwrap();
        (dir, paths, conf)
    }

    #[test]
    fn test_settings_from_conf_and_env() {
        let (_dir, _paths, conf) = project();

        let settings = Settings::from_conf_with(&conf, |_| None);
        assert!(settings.autoconfig);
        assert_eq!(settings.db_format, DbFormat::Json);

        let off = Settings::from_conf_with(&conf, |name| (name == ENV_AUTOCONFIG).then(|| "0".to_string()));
        assert!(!off.autoconfig);
    }

    #[test]
    fn test_resolve_merges_in_order() {
        let (_dir, paths, conf) = project();

        let debug = build_task_record(&conf, &paths, "debug", "linux").unwrap();
        let app = debug.tasks.get("my app").unwrap();
        assert_eq!(app.variant, "debug.my_app");
        assert_eq!(app.features, vec!["cxxprogram"]);

        let env = debug.taskenvs.get("debug.my_app").unwrap();
        assert_eq!(env.get("CXXFLAGS"), Some(&ParamValue::strs(["-O0", "-g"])));
        assert_eq!(env.get("LIBS"), Some(&ParamValue::strs(["m", "pthread"])));
        assert_eq!(env.get("INCLUDES"), Some(&ParamValue::strs(["include"])));
        assert!(env.get("DEFINES").is_none());

        let util_env = debug.taskenvs.get("debug.util").unwrap();
        assert_eq!(util_env.get("DEFINES"), Some(&ParamValue::strs(["UTIL=1"])));

        let release = build_task_record(&conf, &paths, "release", "linux").unwrap();
        let env = release.taskenvs.get("release.my_app").unwrap();
        assert_eq!(env.get("CXXFLAGS"), Some(&ParamValue::strs(["-O3"])));
        assert!(env.get("INCLUDES").is_none());
    }

    #[test]
    fn test_dependency_rootdir_is_resolved() {
        let (_dir, paths, conf) = project();
        let record = build_task_record(&conf, &paths, "debug", "linux").unwrap();

        let Some(ParamValue::Map(zlib)) = record.depconfs.get("zlib") else {
            panic!("zlib dependency missing");
        };
        let rootdir = zlib.get("rootdir").and_then(ParamValue::as_str).unwrap();
        assert!(rootdir.ends_with("third_party/zlib"));
        assert!(std::path::Path::new(rootdir).is_absolute());
    }

    #[test]
    fn test_toolchain_var_names_include_declared() {
        let (_dir, _paths, conf) = project();
        let names = toolchain_var_names(&conf);
        assert!(names.contains(&"MY_CXX".to_string()));
        assert!(names.contains(&"CC".to_string()));
        assert!(!names.contains(&"kind".to_string()));
    }

    #[test]
    fn test_configure_writes_cache_meta_and_lock() {
        // --- Setup ---
        let (_dir, paths, conf) = project();

        // --- Execute ---
        let report = configure(&paths, &conf, "debug", "configure").unwrap();

        // --- Assert ---
        assert_eq!(report.buildtype, "debug");
        let store = task_store(&paths, &conf);
        assert_eq!(store.db_format(), DbFormat::Json);
        assert_eq!(store.load("debug").unwrap(), report.record);
        assert!(!store.exists("release"));

        let lock = task_cache::load_lock(&paths.lock_path).unwrap();
        assert_eq!(lock.run_dir, paths.dirs.run_dir);

        let meta = task_cache::load_meta(&paths.meta_path, DbFormat::Json).unwrap();
        assert_eq!(meta.monitfiles, vec![paths.conf_path.clone()]);
        assert_eq!(meta.tasknames, vec!["my app", "util"]);
        assert!(!hashing::has_changed(Some(&meta)));
    }

    #[test]
    fn test_reconfigure_after_source_change_drops_other_buildtypes() {
        // --- Setup ---
        let (dir, paths, conf) = project();
        configure(&paths, &conf, "debug", "configure").unwrap();
        configure(&paths, &conf, "release", "configure").unwrap();
        let store = task_store(&paths, &conf);
        assert_eq!(store.cached_buildtypes().unwrap(), vec!["debug", "release"]);

        // --- Execute ---
        fs::write(dir.path().join("kiln.toml"), format!("{}\n# edited\n", CONF)).unwrap();
        let conf = loader::load(&dir.path().join("kiln.toml")).unwrap();
        configure(&paths, &conf, "debug", "configure").unwrap();

        // --- Assert ---
        assert_eq!(store.cached_buildtypes().unwrap(), vec!["debug"]);
        assert!(!store.exists("release"));
    }

    #[test]
    fn test_configure_rejects_invalid_conf_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        fs::write(&path, "[general]\nautoconfig = 'yes'\n").unwrap();
        let conf = loader::load(&path).unwrap();
        let paths = ProjectPaths::from_conf(&conf).unwrap();

        let err = configure(&paths, &conf, "debug", "configure").unwrap_err();
        assert!(matches!(err, ConfigureError::Validation(_)));
        assert!(err.to_string().starts_with("Error in the file"));
        assert!(!paths.lock_path.exists());
    }
}
