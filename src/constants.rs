// src/constants.rs

/// Build configuration file names, in lookup order.
pub const CONFIG_FILENAMES: &[&str] = &["kiln.toml", "kiln.json"];

/// The lock file written at the project root by every successful configure.
pub const LOCK_FILENAME: &str = ".lock-kiln";

/// The tool's cache directory (inside the build root).
pub const CACHE_DIR_NAME: &str = ".kiln-cache";

/// The project meta file (inside the cache directory).
pub const META_FILENAME: &str = "project.meta";

/// Extension of per-buildtype task cache files.
pub const TASKS_FILE_EXT: &str = "tasks";

/// Build root used when the configuration does not set `buildroot`.
pub const DEFAULT_BUILDROOT: &str = "build";

/// Command run when the lock record names no configure command.
pub const DEFAULT_CONFIG_CMD: &str = "configure";

/// Reconciliation entries allowed per controller before giving up.
pub const MAX_RECONCILE_DEPTH: u32 = 10;

/// Length in bytes of a monitored-files fingerprint (160 bits).
pub const FINGERPRINT_LEN: usize = 20;

/// Overrides `general.autoconfig` (`0`/`1`, `false`/`true`).
pub const ENV_AUTOCONFIG: &str = "KILN_AUTOCONFIG";

/// Supplies the buildtype when none is given on the command line.
pub const ENV_BUILDTYPE: &str = "KILN_BUILDTYPE";

/// Environment variables that select or tune toolchains. Their values are
/// recorded at configure time; any drift forces a reconfigure.
pub const TOOLCHAIN_VARS: &[&str] = &[
    "AR", "AS", "CC", "CXX", "DC", "FC", "LINK_CC", "LINK_CXX", "CFLAGS", "CXXFLAGS", "CPPFLAGS",
    "LDFLAGS", "LINKFLAGS",
];

/// Commands that remove build artifacts. They never trigger a configure for
/// an unconfigured buildtype.
pub const CLEANUP_COMMANDS: &[&str] = &["clean", "uninstall"];

/// Buildtype used when a configuration declares none at all.
pub const DEFAULT_BUILDTYPE: &str = "debug";
