//! crates/base/src/options.rs
//!
//! Option storage with priority-guarded setters.
//!
//! The original design kept option values in process globals; here they are
//! an explicit [`Context`] threaded through every call. Each value records
//! the [`Priority`] that set it and refuses lower-priority writes, so the
//! precedence chain (`MustHave` > command line > environment > per-WC
//! config > system config > default) needs no re-evaluation at read time.

use crate::status::{FILTER_ALL, StatusBits};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where an option value came from. Higher wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Built-in default.
    Default,
    /// System-wide configuration file.
    SystemConfig,
    /// Per-working-copy configuration.
    WcConfig,
    /// Environment variable.
    Environment,
    /// Command-line argument.
    CommandLine,
    /// Forced by the program itself; nothing overrides it.
    MustHave,
}

/// A single option value plus the priority that set it.
#[derive(Clone, Debug)]
pub struct Opt<T> {
    value: T,
    priority: Priority,
}

impl<T> Opt<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            priority: Priority::Default,
        }
    }

    /// The current value.
    pub const fn get(&self) -> &T {
        &self.value
    }

    /// Stores `value` if `priority` is at least as high as the one that set
    /// the current value. Returns whether the write took effect.
    pub fn set(&mut self, priority: Priority, value: T) -> bool {
        if priority < self.priority {
            return false;
        }
        self.value = value;
        self.priority = priority;
        true
    }
}

impl<T: Copy> Opt<T> {
    /// The current value, copied.
    pub const fn value(&self) -> T {
        self.value
    }
}

/// What to do when an update would overwrite a locally-modified entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the whole operation.
    #[default]
    Stop,
    /// Keep the local version, skip the update for this entry.
    Local,
    /// Overwrite local modifications.
    Remote,
    /// Keep both versions under conflict names and flag the entry.
    Both,
    /// As `Both`, plus drive the external three-way merge program.
    Merge,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "both" => Ok(Self::Both),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown conflict policy \"{other}\"")),
        }
    }
}

/// All option values, threaded through the engine.
#[derive(Clone, Debug)]
pub struct Context {
    /// Root of the administrative area.
    pub waa_root: Opt<PathBuf>,
    /// Root of the per-machine configuration area.
    pub conf_root: Opt<PathBuf>,
    /// Prefix stripped from working-copy paths before hashing, for trees
    /// mounted somewhere other than their canonical place.
    pub softroot: Opt<Option<PathBuf>>,
    /// Status filter; [`FILTER_ALL`] passes everything.
    pub filter: Opt<StatusBits>,
    /// Conflict resolution policy.
    pub conflict: Opt<ConflictPolicy>,
    /// Whether to descend into subdirectories.
    pub recurse: Opt<bool>,
    /// Whether unchanged directories are re-enumerated for new entries.
    pub check_dirs: Opt<bool>,
    /// External three-way merge program.
    pub merge_prog: Opt<String>,
    /// Options passed to the merge program before the three file names.
    pub merge_opts: Opt<Vec<String>>,
    /// Output verbosity, 0 = quiet.
    pub verbosity: Opt<u8>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            waa_root: Opt::new(PathBuf::from("/var/spool/trackfs/waa")),
            conf_root: Opt::new(PathBuf::from("/etc/trackfs")),
            softroot: Opt::new(None),
            filter: Opt::new(FILTER_ALL),
            conflict: Opt::new(ConflictPolicy::Stop),
            recurse: Opt::new(true),
            check_dirs: Opt::new(false),
            merge_prog: Opt::new("diff3".to_owned()),
            merge_opts: Opt::new(vec!["-m".to_owned()]),
            verbosity: Opt::new(1),
        }
    }
}

impl Context {
    /// A context with defaults, then the `TRACKFS_WAA` / `TRACKFS_CONF`
    /// environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut ctx = Self::default();
        if let Some(waa) = std::env::var_os("TRACKFS_WAA") {
            ctx.waa_root.set(Priority::Environment, PathBuf::from(waa));
        }
        if let Some(conf) = std::env::var_os("TRACKFS_CONF") {
            ctx.conf_root.set(Priority::Environment, PathBuf::from(conf));
        }
        ctx
    }

    /// The softroot as a path, if configured.
    #[must_use]
    pub fn softroot_path(&self) -> Option<&Path> {
        self.softroot.get().as_deref()
    }
}
