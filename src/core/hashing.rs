//! # Change Detection
//!
//! Fingerprints the monitored input files of a project and compares the result
//! with the one recorded at configure time. Any failure to read counts as a
//! change, so a doubtful project is reconfigured rather than built stale.

use crate::constants::FINGERPRINT_LEN;
use crate::models::MetaRecord;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while fingerprinting files.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read monitored file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An order-sensitive digest of a sequence of files.
pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// Folds the contents of `paths`, in order, into one fingerprint.
///
/// Each step hashes the previous accumulator, the content length and the
/// content, so swapping two files or moving bytes between them changes the
/// result.
pub fn fingerprint<P: AsRef<Path>>(paths: &[P]) -> Result<Fingerprint, HashError> {
    let mut acc: Fingerprint = [0; FINGERPRINT_LEN];
    for path in paths {
        let path = path.as_ref();
        let contents = fs::read(path).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&acc);
        hasher.update(&(contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
        for (slot, byte) in acc.iter_mut().zip(hasher.finalize().as_bytes()) {
            *slot = *byte;
        }
        trace!("Folded '{}' ({} bytes)", path.display(), contents.len());
    }
    Ok(acc)
}

/// [`fingerprint`], hex encoded as stored in the meta record.
pub fn fingerprint_hex<P: AsRef<Path>>(paths: &[P]) -> Result<String, HashError> {
    fingerprint(paths).map(hex::encode)
}

/// Reports whether the monitored files differ from the recorded fingerprint.
/// A missing record or an unreadable file counts as changed.
pub fn has_changed(meta: Option<&MetaRecord>) -> bool {
    let Some(meta) = meta else {
        debug!("No meta record: treating sources as changed");
        return true;
    };

    match fingerprint_hex(&meta.monitfiles) {
        Ok(hash) => {
            let changed = hash != meta.monithash;
            debug!("Monitored files changed: {}", changed);
            changed
        }
        Err(e) => {
            debug!("{}; treating sources as changed", e);
            true
        }
    }
}

/// Snapshots the given variables from the process environment.
pub fn current_toolenvs<S: AsRef<str>>(names: &[S]) -> BTreeMap<String, Option<String>> {
    current_toolenvs_with(names, |name| env::var(name).ok())
}

fn current_toolenvs_with<S, F>(names: &[S], lookup: F) -> BTreeMap<String, Option<String>>
where
    S: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .map(|name| (name.as_ref().to_string(), lookup(name.as_ref())))
        .collect()
}

/// Reports whether any recorded toolchain variable was set, unset or altered
/// in the process environment since configure.
pub fn toolenvs_changed(meta: &MetaRecord) -> bool {
    toolenvs_changed_with(meta, |name| env::var(name).ok())
}

fn toolenvs_changed_with<F>(meta: &MetaRecord, lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    meta.toolenvs.iter().any(|(name, recorded)| {
        let current = lookup(name);
        if current != *recorded {
            debug!("Toolchain variable '{}' changed: {:?} -> {:?}", name, recorded, current);
            true
        } else {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta_for(files: Vec<PathBuf>, monithash: String) -> MetaRecord {
        MetaRecord {
            rundir: PathBuf::from("/p"),
            topdir: PathBuf::from("/p"),
            outdir: PathBuf::from("/p/build"),
            monitfiles: files,
            monithash,
            tasknames: Vec::new(),
            toolenvs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_order_sensitive() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();

        // --- Execute ---
        let ab = fingerprint(&[&a, &b]).unwrap();
        let ab_again = fingerprint(&[&a, &b]).unwrap();
        let ba = fingerprint(&[&b, &a]).unwrap();

        // --- Assert ---
        assert_eq!(ab, ab_again);
        assert_ne!(ab, ba);
        assert_eq!(fingerprint::<PathBuf>(&[]).unwrap(), [0; FINGERPRINT_LEN]);
        assert_eq!(fingerprint_hex(&[&a]).unwrap().len(), FINGERPRINT_LEN * 2);
    }

    #[test]
    fn test_fingerprint_separates_content_boundaries() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        fs::write(&a, b"ab").unwrap();
        fs::write(&b, b"c").unwrap();
        let first = fingerprint(&[&a, &b]).unwrap();

        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"bc").unwrap();
        let second = fingerprint(&[&a, &b]).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_fingerprint_unreadable_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = fingerprint(&[&missing]).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_has_changed() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let conf = dir.path().join("kiln.toml");
        fs::write(&conf, "[tasks]\n").unwrap();
        let hash = fingerprint_hex(&[&conf]).unwrap();
        let meta = meta_for(vec![conf.clone()], hash);

        // --- Execute & Assert ---
        assert!(has_changed(None));
        assert!(!has_changed(Some(&meta)));

        fs::write(&conf, "[tasks.app]\n").unwrap();
        assert!(has_changed(Some(&meta)));

        fs::remove_file(&conf).unwrap();
        assert!(has_changed(Some(&meta)));
    }

    #[test]
    fn test_toolenvs_changed() {
        let env: BTreeMap<&str, &str> = [("CC", "gcc")].into_iter().collect();
        let lookup = |name: &str| env.get(name).map(|v| v.to_string());

        let mut meta = meta_for(Vec::new(), String::new());
        meta.toolenvs = current_toolenvs_with(&["CC", "CXX"], lookup);
        assert_eq!(meta.toolenvs.get("CXX"), Some(&None));
        assert!(!toolenvs_changed_with(&meta, lookup));

        // altered
        let clang = |name: &str| (name == "CC").then(|| "clang".to_string());
        assert!(toolenvs_changed_with(&meta, clang));

        // added
        let added = |name: &str| match name {
            "CC" => Some("gcc".to_string()),
            "CXX" => Some("g++".to_string()),
            _ => None,
        };
        assert!(toolenvs_changed_with(&meta, added));

        // removed
        assert!(toolenvs_changed_with(&meta, |_| None));
    }
}
