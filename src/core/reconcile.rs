//! # Build Reconciliation
//!
//! Decides, on every build-type command, whether a configure pass must run
//! first. The decision is driven by the lock record, the fingerprint of the
//! monitored files and the presence of a task cache for the requested buildtype.
//!
//! The build engine itself is a collaborator behind [`BuildEngine`]; the
//! per-command behavior (loading tasks, checking the variant, running the build
//! step) sits behind [`BuildContext`].

use crate::constants::{CLEANUP_COMMANDS, DEFAULT_CONFIG_CMD, MAX_RECONCILE_DEPTH, TOOLCHAIN_VARS};
use crate::core::environment::Environment;
use crate::core::hashing;
use crate::core::paths::ProjectPaths;
use crate::core::task_cache::{self, CacheError, TaskCacheStore};
use crate::models::{LockRecord, ParamValue, TaskCacheRecord};
use colored::*;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(
        "The project was not configured: run \"configure\" first or enable general.autoconfig in the build configuration!"
    )]
    NotConfigured,
    #[error("Infinite recursion was detected: more than {limit} reconfigure attempts.")]
    Recursion { limit: u32 },
    #[error("Buildtype is not set.")]
    NoVariant,
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

type ReconcileResult<T> = Result<T, ReconcileError>;

/// The state of a project relative to the requested command. Variants are
/// listed in evaluation order; the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    /// No lock record: the project was never configured.
    NoProject,
    /// The lock record was written from another run directory.
    LockMismatch,
    /// Monitored files or toolchain variables changed since configure.
    SourcesChanged,
    /// No task cache exists for the requested buildtype.
    VariantUncached,
    UpToDate,
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoProject => "not configured",
            Self::LockMismatch => "configured from another directory",
            Self::SourcesChanged => "sources changed since configure",
            Self::VariantUncached => "buildtype not configured",
            Self::UpToDate => "up to date",
        };
        f.write_str(text)
    }
}

/// Evaluates the state of the project for `buildtype`. Also returns the lock
/// record, when there is one, since the actions need it.
pub fn evaluate_state(
    paths: &ProjectPaths,
    store: &TaskCacheStore,
    buildtype: &str,
) -> (ProjectState, Option<LockRecord>) {
    let Some(lock) = task_cache::load_lock(&paths.lock_path) else {
        return (ProjectState::NoProject, None);
    };

    let state = if lock.run_dir != paths.dirs.run_dir {
        ProjectState::LockMismatch
    } else if sources_changed(paths, store) {
        ProjectState::SourcesChanged
    } else if !store.exists(buildtype) {
        ProjectState::VariantUncached
    } else {
        ProjectState::UpToDate
    };
    (state, Some(lock))
}

fn sources_changed(paths: &ProjectPaths, store: &TaskCacheStore) -> bool {
    let meta = match task_cache::load_meta(&paths.meta_path, store.db_format()) {
        Ok(meta) => Some(meta),
        Err(e) => {
            debug!("Could not load meta record: {}", e);
            None
        }
    };
    hashing::has_changed(meta.as_ref()) || meta.as_ref().is_some_and(hashing::toolenvs_changed)
}

/// The external build-execution engine, reduced to what reconciliation needs.
pub trait BuildEngine {
    /// Whether the engine already knows its run, top and out directories.
    fn has_resolved_dirs(&self) -> bool;
    /// Takes the directories of `lock`. Without a lock the engine falls back to
    /// resolving them on its own.
    fn adopt_dirs(&mut self, lock: Option<&LockRecord>) -> anyhow::Result<()>;
    /// Runs a configure pass synchronously.
    fn configure(&mut self, config_cmd: &str) -> anyhow::Result<()>;
    /// Runs a build-type command.
    fn run(&mut self, cmd: &str) -> anyhow::Result<()>;
}

/// How a reconciled command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command was handed to the engine.
    Executed,
    /// A cleanup command on an unconfigured buildtype: nothing to do.
    NothingToDo,
}

/// Runs build-type commands, reconfiguring first when needed.
///
/// Every entry into [`reconcile`](Self::reconcile) counts against a fixed
/// bound, re-invocations after a configure included. A configure step that
/// never makes the project up to date therefore fails instead of looping.
#[derive(Debug)]
pub struct ReconciliationController<'a> {
    paths: &'a ProjectPaths,
    store: &'a TaskCacheStore,
    buildtype: String,
    autoconfig: bool,
    entries: u32,
}

impl<'a> ReconciliationController<'a> {
    pub fn new(
        paths: &'a ProjectPaths,
        store: &'a TaskCacheStore,
        buildtype: impl Into<String>,
        autoconfig: bool,
    ) -> Self {
        Self {
            paths,
            store,
            buildtype: buildtype.into(),
            autoconfig,
            entries: 0,
        }
    }

    pub fn buildtype(&self) -> &str {
        &self.buildtype
    }

    pub fn state(&self) -> ProjectState {
        evaluate_state(self.paths, self.store, &self.buildtype).0
    }

    pub fn reconcile(&mut self, cmd: &str, engine: &mut dyn BuildEngine) -> ReconcileResult<Outcome> {
        self.entries += 1;
        if self.entries > MAX_RECONCILE_DEPTH {
            return Err(ReconcileError::Recursion {
                limit: MAX_RECONCILE_DEPTH,
            });
        }

        let (state, lock) = evaluate_state(self.paths, self.store, &self.buildtype);
        debug!(
            "Reconcile #{} for '{}' ({}): {:?}",
            self.entries, cmd, self.buildtype, state
        );

        if self.autoconfig {
            self.reconcile_auto(cmd, state, lock, engine)
        } else {
            self.reconcile_manual(cmd, state, lock, engine)
        }
    }

    fn reconcile_manual(
        &mut self,
        cmd: &str,
        state: ProjectState,
        lock: Option<LockRecord>,
        engine: &mut dyn BuildEngine,
    ) -> ReconcileResult<Outcome> {
        if state == ProjectState::NoProject && cmd != "build" {
            return Err(ReconcileError::NotConfigured);
        }
        if !engine.has_resolved_dirs() {
            engine.adopt_dirs(lock.as_ref())?;
            return self.reconcile(cmd, engine);
        }
        self.execute(cmd, engine)
    }

    fn reconcile_auto(
        &mut self,
        cmd: &str,
        state: ProjectState,
        lock: Option<LockRecord>,
        engine: &mut dyn BuildEngine,
    ) -> ReconcileResult<Outcome> {
        match state {
            ProjectState::VariantUncached if CLEANUP_COMMANDS.contains(&cmd) => {
                info!("Buildtype '{}' not found. Nothing to clean", self.buildtype);
                Ok(Outcome::NothingToDo)
            }
            ProjectState::UpToDate => {
                if engine.has_resolved_dirs() {
                    self.execute(cmd, engine)
                } else {
                    engine.adopt_dirs(lock.as_ref())?;
                    self.reconcile(cmd, engine)
                }
            }
            _ => {
                if state == ProjectState::NoProject {
                    warn!("Configuring the project");
                } else {
                    info!("Reconfiguring the project: {}", state);
                }
                let config_cmd = lock
                    .as_ref()
                    .and_then(|l| l.config_cmd.clone())
                    .unwrap_or_else(|| DEFAULT_CONFIG_CMD.to_string());
                engine.configure(&config_cmd)?;
                self.reconcile(cmd, engine)
            }
        }
    }

    fn execute(&self, cmd: &str, engine: &mut dyn BuildEngine) -> ReconcileResult<Outcome> {
        engine.run(cmd)?;
        Ok(Outcome::Executed)
    }
}

/// Receives the tasks of a build step; the hand-off to the build engine.
pub trait TaskRunner {
    fn run_tasks(
        &mut self,
        step: &str,
        record: &TaskCacheRecord,
        envs: &BTreeMap<String, Environment<'_>>,
    ) -> anyhow::Result<()>;
}

/// Per-command behavior of build, clean, install and uninstall.
pub trait BuildContext {
    /// Loads the task cache of the current buildtype. A cleanup command on an
    /// unconfigured buildtype gets an empty record.
    fn load_tasks(&self) -> ReconcileResult<TaskCacheRecord>;
    /// The current buildtype. Fails when none is set.
    fn validate_variant(&self) -> ReconcileResult<&str>;
    /// Runs the command's build step through `runner`.
    fn execute_build(&self, runner: &mut dyn TaskRunner) -> ReconcileResult<()>;
}

/// The verb shown when a command's build step starts.
pub fn step_name(cmd: &str) -> &'static str {
    match cmd {
        "clean" => "Cleaning",
        "install" => "Installing",
        "uninstall" => "Uninstalling",
        "test" => "Testing",
        _ => "Building",
    }
}

/// [`BuildContext`] for one invocation of a build-type command.
#[derive(Debug)]
pub struct CommandContext<'a> {
    cmd: String,
    buildtype: Option<String>,
    store: &'a TaskCacheStore,
    root_env: Environment<'static>,
}

impl<'a> CommandContext<'a> {
    /// A context whose root environment holds the toolchain variables set in
    /// the process environment.
    pub fn new(cmd: impl Into<String>, buildtype: Option<String>, store: &'a TaskCacheStore) -> Self {
        let table = hashing::current_toolenvs(TOOLCHAIN_VARS)
            .into_iter()
            .filter_map(|(name, value)| Some((name, ParamValue::Str(value?))))
            .collect();
        Self::with_root_env(cmd, buildtype, store, Environment::from_table(table))
    }

    pub fn with_root_env(
        cmd: impl Into<String>,
        buildtype: Option<String>,
        store: &'a TaskCacheStore,
        root_env: Environment<'static>,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            buildtype,
            store,
            root_env,
        }
    }

    fn is_cleanup(&self) -> bool {
        CLEANUP_COMMANDS.contains(&self.cmd.as_str())
    }
}

impl BuildContext for CommandContext<'_> {
    fn load_tasks(&self) -> ReconcileResult<TaskCacheRecord> {
        let buildtype = self.validate_variant()?;
        match self.store.load(buildtype) {
            Ok(record) => Ok(record),
            Err(CacheError::NotFound { .. }) if self.is_cleanup() => {
                info!("Buildtype '{}' not found. Nothing to clean", buildtype);
                Ok(TaskCacheRecord::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate_variant(&self) -> ReconcileResult<&str> {
        self.buildtype
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(ReconcileError::NoVariant)
    }

    fn execute_build(&self, runner: &mut dyn TaskRunner) -> ReconcileResult<()> {
        let record = self.load_tasks()?;
        if record.tasks.is_empty() && self.is_cleanup() {
            println!("{}", "Nothing to clean".yellow());
            return Ok(());
        }

        let step = step_name(&self.cmd);
        println!("{} '{}'", step.green().bold(), self.validate_variant()?);
        let envs = task_cache::load_environments(&record, &self.root_env);
        runner.run_tasks(step, &record, &envs)?;
        Ok(())
    }
}
