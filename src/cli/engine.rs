// src/cli/engine.rs

//! The local build engine: runs the configure pipeline in-process and, for
//! build-type commands, lists the cached tasks that a build-execution engine
//! would run.

use crate::constants::DEFAULT_CONFIG_CMD;
use crate::core::configure;
use crate::core::environment::Environment;
use crate::core::loader::BuildConf;
use crate::core::paths::ProjectPaths;
use crate::core::reconcile::{BuildContext, BuildEngine, CommandContext, TaskRunner};
use crate::models::{LockRecord, ProjectDirs, TaskCacheRecord};
use anyhow::{Context, Result};
use colored::*;
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct LocalEngine<'a> {
    paths: &'a ProjectPaths,
    conf: &'a BuildConf,
    buildtype: String,
    dirs: Option<ProjectDirs>,
}

impl<'a> LocalEngine<'a> {
    pub fn new(paths: &'a ProjectPaths, conf: &'a BuildConf, buildtype: impl Into<String>) -> Self {
        Self {
            paths,
            conf,
            buildtype: buildtype.into(),
            dirs: None,
        }
    }

    pub fn dirs(&self) -> Option<&ProjectDirs> {
        self.dirs.as_ref()
    }
}

impl BuildEngine for LocalEngine<'_> {
    fn has_resolved_dirs(&self) -> bool {
        self.dirs.is_some()
    }

    fn adopt_dirs(&mut self, lock: Option<&LockRecord>) -> Result<()> {
        let dirs = lock
            .map(LockRecord::dirs)
            .unwrap_or_else(|| self.paths.dirs.clone());
        debug!("Using out dir '{}'", dirs.out_dir.display());
        self.dirs = Some(dirs);
        Ok(())
    }

    fn configure(&mut self, config_cmd: &str) -> Result<()> {
        println!("{}", "Configuring the project".cyan().bold());
        let report = configure::configure(self.paths, self.conf, &self.buildtype, config_cmd)
            .with_context(|| format!("Step '{}' failed", config_cmd))?;
        println!(
            "  {} '{}': {} task(s)",
            "Configured".green(),
            report.buildtype,
            report.record.tasks.len()
        );
        self.dirs = Some(self.paths.dirs.clone());
        Ok(())
    }

    fn run(&mut self, cmd: &str) -> Result<()> {
        let store = configure::task_store(self.paths, self.conf);
        let context = CommandContext::new(cmd, Some(self.buildtype.clone()), &store);
        context.execute_build(&mut TaskLister::default())?;
        Ok(())
    }
}

/// Runs `configure` for `buildtype` outside of reconciliation.
pub fn configure_now(paths: &ProjectPaths, conf: &BuildConf, buildtype: &str) -> Result<()> {
    LocalEngine::new(paths, conf, buildtype).configure(DEFAULT_CONFIG_CMD)
}

/// Prints every task of a build step with its variant and features.
#[derive(Debug, Default)]
pub struct TaskLister {
    pub listed: usize,
}

impl TaskRunner for TaskLister {
    fn run_tasks(
        &mut self,
        _step: &str,
        record: &TaskCacheRecord,
        envs: &BTreeMap<String, Environment<'_>>,
    ) -> Result<()> {
        for task in record.tasks.values() {
            println!(
                "  {:<24} {} [{}]",
                task.name.bold(),
                task.variant.dimmed(),
                task.features.join(", ").cyan()
            );
            if let Some(env) = envs.get(&task.variant) {
                for key in env.keys() {
                    debug!("    {} = {}", key, env.get(&key).map(|v| v.to_string()).unwrap_or_default());
                }
            }
            self.listed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader;
    use crate::core::reconcile::{Outcome, ReconciliationController};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_local_engine_configures_then_builds() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            "[tasks.app]\nfeatures = 'cxxprogram'\n[tasks.lib]\nfeatures = ['cxxshlib']\n",
        )
        .unwrap();
        let conf = loader::load(&dir.path().join("kiln.toml")).unwrap();
        let paths = ProjectPaths::from_conf(&conf).unwrap();
        let store = configure::task_store(&paths, &conf);
        let mut engine = LocalEngine::new(&paths, &conf, "debug");

        // --- Execute ---
        let mut controller = ReconciliationController::new(&paths, &store, "debug", true);
        let outcome = controller.reconcile("build", &mut engine).unwrap();

        // --- Assert ---
        assert_eq!(outcome, Outcome::Executed);
        assert!(store.exists("debug"));
        assert!(paths.lock_path.exists());
        assert_eq!(engine.dirs(), Some(&paths.dirs));
    }

    #[test]
    fn test_adopt_dirs_without_lock_uses_project_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kiln.toml"), "buildroot = 'out'\n").unwrap();
        let conf = loader::load(&dir.path().join("kiln.toml")).unwrap();
        let paths = ProjectPaths::from_conf(&conf).unwrap();

        let mut engine = LocalEngine::new(&paths, &conf, "debug");
        assert!(!engine.has_resolved_dirs());
        engine.adopt_dirs(None).unwrap();

        assert_eq!(engine.dirs(), Some(&paths.dirs));
    }

    #[test]
    fn test_task_lister_counts_tasks() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            "[tasks.a]\nfeatures = 'c'\n[tasks.b]\nfeatures = 'c'\n",
        )
        .unwrap();
        let conf = loader::load(&dir.path().join("kiln.toml")).unwrap();
        let paths = ProjectPaths::from_conf(&conf).unwrap();
        configure_now(&paths, &conf, "debug").unwrap();

        let store = configure::task_store(&paths, &conf);
        let context = CommandContext::new("build", Some("debug".into()), &store);
        let mut lister = TaskLister::default();
        context.execute_build(&mut lister).unwrap();

        assert_eq!(lister.listed, 2);
    }
}
