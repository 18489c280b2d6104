// src/models.rs

//! Records persisted between invocations: the lock record, the project meta
//! record and the per-buildtype task cache, plus [`ParamValue`], the
//! serializable substitute for configuration values.

use crate::core::value::ConfValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A serializable configuration value. Unlike [`ConfValue`] it has no
/// callables and only string keys, so it survives both database formats.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Converts a configuration value. Callables have no serializable form
    /// and yield `None`; inside containers they are dropped, as are non-string keys.
    pub fn from_conf(value: &ConfValue) -> Option<Self> {
        Some(match value {
            ConfValue::Bool(b) => Self::Bool(*b),
            ConfValue::Int(i) => Self::Int(*i),
            ConfValue::Float(x) => Self::Float(*x),
            ConfValue::Str(s) => Self::Str(s.clone()),
            ConfValue::List(items) => Self::List(items.iter().filter_map(Self::from_conf).collect()),
            ConfValue::Map(map) => Self::Map(
                map.iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), Self::from_conf(v)?)))
                    .collect(),
            ),
            ConfValue::Func(_) => return None,
        })
    }

    /// Builds a list of strings.
    pub fn strs<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a list of strings: a string is split on whitespace and
    /// non-string list elements are skipped.
    pub fn to_str_list(&self) -> Vec<String> {
        match self {
            Self::Str(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::List(items) => items
                .iter()
                .filter_map(Self::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(" "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// A table of environment variables for one build variant.
pub type EnvTable = BTreeMap<String, ParamValue>;

/// Serialized form of task cache and meta files (`general.db-format`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbFormat {
    /// `bincode`, compressed with LZ4.
    #[default]
    Bincode,
    /// Pretty printed JSON.
    Json,
}

impl FromStr for DbFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bincode" => Ok(Self::Bincode),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown db-format '{}'", other)),
        }
    }
}

/// The three directories the build engine works with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    /// Where the tool was invoked (the project root holding the configuration).
    pub run_dir: PathBuf,
    /// The top source directory.
    pub top_dir: PathBuf,
    /// The build output directory.
    pub out_dir: PathBuf,
}

/// Written at the project root by every successful configure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub run_dir: PathBuf,
    pub top_dir: PathBuf,
    pub out_dir: PathBuf,
    /// The command that produced this lock; re-run on automatic reconfigure.
    pub config_cmd: Option<String>,
}

impl LockRecord {
    pub fn new(dirs: &ProjectDirs, config_cmd: impl Into<String>) -> Self {
        Self {
            run_dir: dirs.run_dir.clone(),
            top_dir: dirs.top_dir.clone(),
            out_dir: dirs.out_dir.clone(),
            config_cmd: Some(config_cmd.into()),
        }
    }

    pub fn dirs(&self) -> ProjectDirs {
        ProjectDirs {
            run_dir: self.run_dir.clone(),
            top_dir: self.top_dir.clone(),
            out_dir: self.out_dir.clone(),
        }
    }
}

/// Project-wide state captured at configure time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub rundir: PathBuf,
    pub topdir: PathBuf,
    pub outdir: PathBuf,
    /// Files whose contents are fingerprinted, in hashing order.
    pub monitfiles: Vec<PathBuf>,
    /// Hex fingerprint of `monitfiles`.
    pub monithash: String,
    pub tasknames: Vec<String>,
    /// Toolchain environment variables and their values (`None` when unset).
    pub toolenvs: BTreeMap<String, Option<String>>,
}

/// One task as resolved for a buildtype.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskParams {
    pub name: String,
    /// The task variant id (`<buildtype>.<sanitized name>`).
    pub variant: String,
    pub features: Vec<String>,
    /// Every other resolved parameter.
    pub params: BTreeMap<String, ParamValue>,
}

/// Everything a build command needs for one buildtype.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaskCacheRecord {
    pub tasks: BTreeMap<String, TaskParams>,
    /// Task environments keyed by variant id.
    pub taskenvs: BTreeMap<String, EnvTable>,
    pub depconfs: BTreeMap<String, ParamValue>,
}
