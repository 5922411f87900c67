//! crates/waa/src/ext.rs
//!
//! The administrative file extensions and their scope rule.
//!
//! Files whose name starts with an upper-case letter are configuration and
//! should survive backups; lower-case names are volatile caches that a
//! repository sync can regenerate.

use crate::Scope;

/// Serialized entry tree (per WC).
pub const DIR: &str = "dir";
/// URL list, one record per line (per WC).
pub const URLS: &str = "Urls";
/// URL to current-revision map (per WC, volatile so the configuration stays
/// immutable across commit).
pub const REVS: &str = "revs";
/// Ignore/grouping patterns (per WC).
pub const IGN: &str = "Ign";
/// Copy-from relations, key=dest value=src (per WC).
pub const COPY: &str = "Copy";
/// Human-readable backpointer to the WC path.
pub const README: &str = "README.txt";
/// Manber block hashes (per file).
pub const MD5S: &str = "md5s";
/// User-defined properties (per entry).
pub const PROP: &str = "prop";
/// Conflict-artifact list (per entry).
pub const CFLCT: &str = "cflct";

/// Scope of a file, decided by the case of its first letter.
#[must_use]
pub fn scope_for(ext: &str) -> Scope {
    if ext.chars().next().is_some_and(char::is_uppercase) {
        Scope::Conf
    } else {
        Scope::Waa
    }
}
