#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The stateful operations over a walked tree: reverting entries to their
//! BASE text, applying repository deliveries with the configured conflict
//! policy, driving the external three-way merge, maintaining the conflict
//! artifact index, and committing local changes back.
//!
//! Everything here assumes the walker already ran: `entry_status` (or,
//! for updates, `remote_status`) is populated and selection marks are in
//! place. Repository access goes through the [`repos::Session`] trait,
//! never directly; the tree walker is never re-entered from a session
//! call.

pub mod commit;
pub mod conflict;
pub mod install;
pub mod merge;
pub mod pipe;
pub mod revert;
pub mod update;

use base::options::Context;
use std::path::Path;
use waa::Waa;

/// Shared handle for the engine operations.
pub struct Engine<'a> {
    /// Option values.
    pub ctx: &'a Context,
    /// The working copy's administrative area.
    pub waa: &'a Waa,
}

impl<'a> Engine<'a> {
    /// An engine over one working copy.
    #[must_use]
    pub fn new(ctx: &'a Context, waa: &'a Waa) -> Self {
        Self { ctx, waa }
    }

    /// Environment exported to child processes (merge program, content
    /// pipes).
    #[must_use]
    pub fn child_env(&self, entry_path: &Path, target_rev: Option<base::RevNum>) -> Vec<(String, String)> {
        let mut env = vec![
            (
                "TRACKFS_CURRENT_ENTRY".to_owned(),
                entry_path.display().to_string(),
            ),
            (
                "TRACKFS_WC_ROOT".to_owned(),
                self.waa.wc_path().display().to_string(),
            ),
            (
                "TRACKFS_WAA".to_owned(),
                self.waa.waa_base().display().to_string(),
            ),
            (
                "TRACKFS_CONF".to_owned(),
                self.waa.conf_base().display().to_string(),
            ),
        ];
        if let Some(rev) = target_rev {
            env.push(("TRACKFS_TARGET_REVISION".to_owned(), rev.to_string()));
        }
        env
    }
}

/// Which mtime treatment a directory has earned while its children were
/// processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirChange {
    /// Children were created or removed; restore the recorded mtime.
    pub revert_mtime: bool,
    /// An intentional content change (e.g. a merge); stamp the current
    /// time instead.
    pub set_current: bool,
}

impl DirChange {
    /// Nothing happened below this directory.
    #[must_use]
    pub fn unchanged(self) -> bool {
        self == Self::default()
    }
}
