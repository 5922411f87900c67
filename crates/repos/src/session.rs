//! crates/repos/src/session.rs
//!
//! The repository transport interface.

use base::{RevNum, Result};
use metadata::FileKind;
use std::io::{Read, Write};

/// Property list as delivered with repository data.
pub type PropList = Vec<(String, String)>;

/// One change reported by the repository between two revisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteDelta {
    /// Path relative to the session root, `/`-separated.
    pub path: String,
    /// What happened to it.
    pub action: DeltaAction,
}

/// Kind of a reported change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaAction {
    /// The path exists in the target revision but not in the base.
    Add(FileKind),
    /// The path is gone in the target revision.
    Delete,
    /// Content changed.
    Modify,
    /// Only properties/meta-data changed.
    MetaOnly,
}

/// One row of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, no separators.
    pub name: String,
    /// Node kind.
    pub kind: FileKind,
    /// Content size (files) or zero.
    pub size: u64,
}

/// A connection to one repository URL.
///
/// The tree walker must not be re-entered from these calls: a
/// `report_changes` drives the walker from the outside, so implementations
/// never call back into tree updates themselves.
pub trait Session {
    /// The youngest revision the repository has.
    fn head_rev(&mut self) -> Result<RevNum>;

    /// Streams the content of `path` at `rev` (or at HEAD when `rev` is
    /// `None`) into `sink`. Returns the delivered properties and the
    /// revision the data actually came from.
    fn get_file(
        &mut self,
        path: &str,
        rev: Option<RevNum>,
        sink: &mut dyn Write,
    ) -> Result<(PropList, RevNum)>;

    /// Lists a directory at `rev`, with its properties.
    fn get_dir(&mut self, path: &str, rev: Option<RevNum>)
    -> Result<(Vec<DirEntry>, PropList)>;

    /// Reports every change between `base` and `target` (HEAD when
    /// `None`) through `report`. Returns the resolved target revision.
    fn report_changes(
        &mut self,
        base: RevNum,
        target: Option<RevNum>,
        report: &mut dyn FnMut(RemoteDelta) -> Result<()>,
    ) -> Result<RevNum>;

    /// Opens a commit transaction. One at a time per session.
    fn begin_commit(&mut self, message: &str) -> Result<()>;

    /// Stages file content (already encoded by any commit-pipe) under the
    /// open transaction.
    fn put_file(&mut self, path: &str, content: &mut dyn Read, props: &PropList) -> Result<()>;

    /// Stages a directory under the open transaction.
    fn make_dir(&mut self, path: &str, props: &PropList) -> Result<()>;

    /// Stages a deletion under the open transaction.
    fn delete_entry(&mut self, path: &str) -> Result<()>;

    /// Stages a property-only change under the open transaction.
    fn change_props(&mut self, path: &str, props: &PropList) -> Result<()>;

    /// Commits the transaction; returns the new revision.
    fn finish_commit(&mut self) -> Result<RevNum>;

    /// Discards the open transaction.
    fn abort_commit(&mut self);
}
