//! # Task Cache Store
//!
//! Persists what configure produced: one [`TaskCacheRecord`] per buildtype,
//! the project [`MetaRecord`] and the [`LockRecord`]. Every write goes to a
//! temporary file in the destination directory that is then renamed over the
//! target, so readers never see a half-written record.

use crate::constants::TASKS_FILE_EXT;
use crate::core::environment::Environment;
use crate::core::hashing::{self, HashError};
use crate::models::{DbFormat, LockRecord, MetaRecord, ProjectDirs, TaskCacheRecord};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
    static ref NON_WORD_RE: Regex = Regex::new(r"[^\w]").expect("valid non-word regex");
}

/// Errors raised by the task cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A filesystem I/O error occurred.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to replace '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode to binary format: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
    #[error("Failed to decode from binary format: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),
    #[error("Failed to decompress '{path}': {message}. It might be corrupt.")]
    Decompress { path: PathBuf, message: String },
    #[error("Invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to fingerprint monitored files: {0}")]
    Hash(#[from] HashError),
    /// No task cache exists for the buildtype.
    #[error("Buildtype '{buildtype}' not found! Was step 'configure' missed?")]
    NotFound { buildtype: String },
}

type CacheResult<T> = Result<T, CacheError>;

/// Replaces `path` with `bytes` in one rename, creating parent directories.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CacheError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    trace!("Wrote {} bytes to '{}'", bytes.len(), path.display());
    Ok(())
}

fn encode<T: Serialize>(value: &T, format: DbFormat) -> CacheResult<Vec<u8>> {
    match format {
        DbFormat::Bincode => {
            let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
            Ok(lz4_flex::compress_prepend_size(&raw))
        }
        DbFormat::Json => Ok(serde_json::to_vec_pretty(value)?),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8], format: DbFormat, path: &Path) -> CacheResult<T> {
    match format {
        DbFormat::Bincode => {
            let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|e| {
                CacheError::Decompress {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })?;
            let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
            Ok(value)
        }
        DbFormat::Json => Ok(serde_json::from_slice(bytes)?),
    }
}

/// Makes a task name safe for file and variant names: surrounding whitespace
/// is dropped, inner whitespace runs become `_` and every other character that
/// is not a word character becomes `.`.
pub fn sanitize(name: &str) -> String {
    let underscored = WHITESPACE_RE.replace_all(name.trim(), "_");
    NON_WORD_RE.replace_all(&underscored, ".").into_owned()
}

/// The variant id of a task within a buildtype.
pub fn variant_id(buildtype: &str, task: &str) -> String {
    format!("{}.{}", buildtype, sanitize(task))
}

/// Stores one task cache file per buildtype inside the cache directory.
#[derive(Debug, Clone)]
pub struct TaskCacheStore {
    cache_dir: PathBuf,
    db_format: DbFormat,
}

impl TaskCacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>, db_format: DbFormat) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            db_format,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn db_format(&self) -> DbFormat {
        self.db_format
    }

    pub fn path_for(&self, buildtype: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", buildtype, TASKS_FILE_EXT))
    }

    pub fn exists(&self, buildtype: &str) -> bool {
        self.path_for(buildtype).is_file()
    }

    pub fn save(&self, buildtype: &str, record: &TaskCacheRecord) -> CacheResult<()> {
        let path = self.path_for(buildtype);
        debug!(
            "Saving {} task(s) for buildtype '{}' to '{}'",
            record.tasks.len(),
            buildtype,
            path.display()
        );
        atomic_write(&path, &encode(record, self.db_format)?)
    }

    pub fn load(&self, buildtype: &str) -> CacheResult<TaskCacheRecord> {
        let path = self.path_for(buildtype);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    buildtype: buildtype.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loading task cache '{}'", path.display());
        decode(&bytes, self.db_format, &path)
    }

    /// Deletes the cache of a buildtype. Returns whether a file was removed.
    pub fn remove(&self, buildtype: &str) -> CacheResult<bool> {
        match fs::remove_file(self.path_for(buildtype)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Buildtypes with a cache file, sorted. A missing cache directory has none.
    pub fn cached_buildtypes(&self) -> CacheResult<Vec<String>> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == TASKS_FILE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes the cache of every buildtype but `keep` and returns the removed ones.
    pub fn remove_others(&self, keep: &str) -> CacheResult<Vec<String>> {
        let mut removed = Vec::new();
        for buildtype in self.cached_buildtypes()? {
            if buildtype != keep && self.remove(&buildtype)? {
                debug!("Dropped stale task cache of buildtype '{}'", buildtype);
                removed.push(buildtype);
            }
        }
        Ok(removed)
    }
}

/// Builds one environment per task variant, each a child of `root_env` whose
/// local table is the variant's stored environment.
pub fn load_environments<'p>(
    record: &TaskCacheRecord,
    root_env: &'p Environment<'p>,
) -> BTreeMap<String, Environment<'p>> {
    record
        .tasks
        .values()
        .map(|task| {
            let table = record.taskenvs.get(&task.variant).cloned().unwrap_or_default();
            (task.variant.clone(), Environment::with_parent(root_env, table))
        })
        .collect()
}

impl MetaRecord {
    /// Records the project state after a configure: its directories, the
    /// fingerprint of `monitfiles` and the current values of `toolvars`.
    pub fn capture<S: AsRef<str>>(
        dirs: &ProjectDirs,
        monitfiles: Vec<PathBuf>,
        tasknames: Vec<String>,
        toolvars: &[S],
    ) -> Result<Self, HashError> {
        let monithash = hashing::fingerprint_hex(&monitfiles)?;
        Ok(Self {
            rundir: dirs.run_dir.clone(),
            topdir: dirs.top_dir.clone(),
            outdir: dirs.out_dir.clone(),
            monitfiles,
            monithash,
            tasknames,
            toolenvs: hashing::current_toolenvs(toolvars),
        })
    }
}

pub fn write_meta(path: &Path, meta: &MetaRecord, format: DbFormat) -> CacheResult<()> {
    atomic_write(path, &encode(meta, format)?)
}

pub fn load_meta(path: &Path, format: DbFormat) -> CacheResult<MetaRecord> {
    let bytes = fs::read(path)?;
    decode(&bytes, format, path)
}

/// Writes the lock record as JSON.
pub fn write_lock(path: &Path, lock: &LockRecord) -> CacheResult<()> {
    atomic_write(path, &encode(lock, DbFormat::Json)?)
}

/// Reads the lock record. A missing or unreadable lock means the project was
/// never configured.
pub fn load_lock(path: &Path) -> Option<LockRecord> {
    let bytes = fs::read(path).ok()?;
    match decode(&bytes, DbFormat::Json, path) {
        Ok(lock) => Some(lock),
        Err(e) => {
            log::warn!("Ignoring unreadable lock file '{}': {}", path.display(), e);
            None
        }
    }
}

/// Removes the build root and the lock file. A symlinked build root is
/// followed and its real target removed along with the link.
pub fn distclean(buildroot: &Path, lock_path: &Path) -> CacheResult<()> {
    if let Ok(meta) = fs::symlink_metadata(buildroot) {
        if meta.file_type().is_symlink() {
            let target = fs::canonicalize(buildroot)?;
            debug!("Removing '{}' (linked from '{}')", target.display(), buildroot.display());
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            }
            fs::remove_file(buildroot)?;
        } else if meta.is_dir() {
            debug!("Removing '{}'", buildroot.display());
            fs::remove_dir_all(buildroot)?;
        }
    }

    match fs::remove_file(lock_path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParamValue, TaskParams};
    use tempfile::tempdir;

    fn sample_record() -> TaskCacheRecord {
        let mut record = TaskCacheRecord::default();
        let variant = variant_id("debug", "my app");
        record.tasks.insert(
            "my app".to_string(),
            TaskParams {
                name: "my app".to_string(),
                variant: variant.clone(),
                features: vec!["cxxprogram".to_string()],
                params: [("target".to_string(), ParamValue::Str("app".to_string()))]
                    .into_iter()
                    .collect(),
            },
        );
        record.taskenvs.insert(
            variant,
            [("CXXFLAGS".to_string(), ParamValue::strs(["-O0", "-g"]))]
                .into_iter()
                .collect(),
        );
        record
            .depconfs
            .insert("zlib".to_string(), ParamValue::Str("1.3".to_string()));
        record
    }

    #[test]
    fn test_sanitize_and_variant_id() {
        assert_eq!(sanitize(" bbb ^$ccc "), "bbb_..ccc");
        assert_eq!(sanitize("plain_name"), "plain_name");
        assert_eq!(sanitize("a\t\tb"), "a_b");
        assert_eq!(variant_id("debug", "my app"), "debug.my_app");
        assert_eq!(variant_id("release", "lib-x"), "release.lib.x");
    }

    #[test]
    fn test_save_load_round_trip_in_both_formats() {
        for format in [DbFormat::Bincode, DbFormat::Json] {
            // --- Setup ---
            let dir = tempdir().unwrap();
            let store = TaskCacheStore::new(dir.path().join(".kiln-cache"), format);
            let record = sample_record();

            // --- Execute ---
            store.save("debug", &record).unwrap();
            let loaded = store.load("debug").unwrap();

            // --- Assert ---
            assert!(store.exists("debug"));
            assert_eq!(store.path_for("debug"), dir.path().join(".kiln-cache/debug.tasks"));
            assert_eq!(loaded, record);
        }
    }

    #[test]
    fn test_load_missing_buildtype_is_not_found() {
        let dir = tempdir().unwrap();
        let store = TaskCacheStore::new(dir.path(), DbFormat::Bincode);

        let err = store.load("release").unwrap_err();
        assert!(matches!(err, CacheError::NotFound { ref buildtype } if buildtype == "release"));
        assert!(!store.exists("release"));
        assert!(!store.remove("release").unwrap());
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempdir().unwrap();
        let store = TaskCacheStore::new(dir.path(), DbFormat::Bincode);
        fs::write(store.path_for("debug"), b"garbage").unwrap();
        assert!(store.load("debug").is_err());

        store.save("debug", &sample_record()).unwrap();
        assert!(store.remove("debug").unwrap());
        assert!(!store.exists("debug"));
    }

    #[test]
    fn test_remove_others_keeps_one_buildtype() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let store = TaskCacheStore::new(dir.path().join("cache"), DbFormat::Bincode);
        assert!(store.cached_buildtypes().unwrap().is_empty());
        for buildtype in ["debug", "release", "profile"] {
            store.save(buildtype, &sample_record()).unwrap();
        }
        fs::write(dir.path().join("cache/project.meta"), b"meta").unwrap();

        // --- Execute ---
        let removed = store.remove_others("debug").unwrap();

        // --- Assert ---
        assert_eq!(removed, vec!["profile", "release"]);
        assert_eq!(store.cached_buildtypes().unwrap(), vec!["debug"]);
        assert!(dir.path().join("cache/project.meta").exists());
    }

    #[test]
    fn test_load_environments_chains_to_root() {
        let record = sample_record();
        let mut root = Environment::new();
        root.set("CXX", ParamValue::Str("g++".to_string()));

        let envs = load_environments(&record, &root);
        let env = envs.get("debug.my_app").unwrap();

        assert_eq!(env.get_list("CXXFLAGS"), vec!["-O0", "-g"]);
        assert_eq!(env.get("CXX"), Some(&ParamValue::Str("g++".to_string())));
        assert!(!root.contains("CXXFLAGS"));
    }

    #[test]
    fn test_lock_and_meta_round_trip() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let conf = dir.path().join("kiln.toml");
        fs::write(&conf, "[tasks]\n").unwrap();
        let dirs = ProjectDirs {
            run_dir: dir.path().to_path_buf(),
            top_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("build"),
        };

        // --- Execute ---
        let lock_path = dir.path().join(".lock-kiln");
        assert!(load_lock(&lock_path).is_none());
        write_lock(&lock_path, &LockRecord::new(&dirs, "configure")).unwrap();

        let meta = MetaRecord::capture(&dirs, vec![conf.clone()], vec!["app".into()], &["CC"]).unwrap();
        let meta_path = dir.path().join("build/.kiln-cache/project.meta");
        write_meta(&meta_path, &meta, DbFormat::Bincode).unwrap();

        // --- Assert ---
        let lock = load_lock(&lock_path).unwrap();
        assert_eq!(lock.dirs(), dirs);
        assert_eq!(lock.config_cmd.as_deref(), Some("configure"));
        assert!(String::from_utf8(fs::read(&lock_path).unwrap()).unwrap().contains("run_dir"));

        let loaded = load_meta(&meta_path, DbFormat::Bincode).unwrap();
        assert_eq!(loaded, meta);
        assert!(!hashing::has_changed(Some(&loaded)));
        assert!(loaded.toolenvs.contains_key("CC"));
    }

    #[test]
    fn test_unreadable_lock_is_ignored() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock-kiln");
        fs::write(&lock_path, "{ not json").unwrap();
        assert!(load_lock(&lock_path).is_none());
    }

    #[test]
    fn test_distclean_removes_build_root_and_lock() {
        let dir = tempdir().unwrap();
        let buildroot = dir.path().join("build");
        let lock_path = dir.path().join(".lock-kiln");
        fs::create_dir_all(buildroot.join(".kiln-cache")).unwrap();
        fs::write(&lock_path, "{}").unwrap();
        fs::write(dir.path().join("kiln.toml"), "").unwrap();

        distclean(&buildroot, &lock_path).unwrap();

        assert!(!buildroot.exists());
        assert!(!lock_path.exists());
        assert!(dir.path().join("kiln.toml").exists());

        // nothing left to remove
        distclean(&buildroot, &lock_path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_distclean_follows_symlinked_build_root() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real-build");
        let link = dir.path().join("build");
        fs::create_dir_all(&real).unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        distclean(&link, &dir.path().join(".lock-kiln")).unwrap();

        assert!(!real.exists());
        assert!(fs::symlink_metadata(&link).is_err());
    }
}
