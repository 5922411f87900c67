//! crates/engine/src/conflict.rs
//!
//! The per-entry conflict artifact index (`cflct` file): absolute
//! artifact paths, each terminated `\0\n`. `resolved` unlinks the
//! artifacts, removes the index, and clears the entry's conflict flag.

use crate::Engine;
use base::error::ResultExt;
use base::status::EntryFlags;
use base::{Error, ErrorKind, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tree::{EntryId, EntryStore};
use waa::ext;

impl Engine<'_> {
    /// Records conflict artifacts for an entry. Appends when the entry is
    /// already in conflict (an update over an unresolved conflict), else
    /// starts a fresh index.
    pub fn mark_conflict(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        artifacts: &[&Path],
    ) -> Result<()> {
        let abs = self.waa.wc_path().join(store.rel_path(id));
        let already = store.get(id).flags.contains(EntryFlags::CONFLICT);

        if already {
            let mut file = self.waa.open_append(&abs, ext::CFLCT)?;
            for artifact in artifacts {
                write!(file, "{}\0\n", artifact.display())
                    .context("appending to the conflict list")?;
            }
        } else {
            let mut writer = self.waa.start_write(&abs, ext::CFLCT)?;
            for artifact in artifacts {
                write!(writer, "{}\0\n", artifact.display())
                    .context("writing the conflict list")?;
            }
            writer.commit()?;
        }

        store.get_mut(id).flags |= EntryFlags::CONFLICT;
        debug!(entry = %abs.display(), count = artifacts.len(), "conflict recorded");
        Ok(())
    }

    /// The artifact paths currently recorded for an entry.
    pub fn conflict_artifacts(
        &self,
        store: &EntryStore,
        id: EntryId,
    ) -> Result<Vec<PathBuf>> {
        let abs = self.waa.wc_path().join(store.rel_path(id));
        let bytes = self.waa.read(&abs, ext::CFLCT)?;
        let mut paths = Vec::new();
        for record in bytes.split_inclusive(|&b| b == b'\n') {
            let record = record.strip_suffix(b"\0\n").ok_or_else(|| {
                Error::new(ErrorKind::Io, "unterminated conflict record")
            })?;
            let text = std::str::from_utf8(record)
                .map_err(|_| Error::new(ErrorKind::Io, "conflict record is not text"))?;
            paths.push(PathBuf::from(text));
        }
        Ok(paths)
    }

    /// Resolves an entry's conflict: unlinks every listed artifact
    /// (missing ones are fine), deletes the index, clears the flag.
    pub fn resolve_conflict(&self, store: &mut EntryStore, id: EntryId) -> Result<()> {
        let artifacts = match self.conflict_artifacts(store, id) {
            Ok(paths) => paths,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        for artifact in &artifacts {
            match std::fs::remove_file(artifact) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::io(
                        e,
                        format!("removing conflict artifact \"{}\"", artifact.display()),
                    ));
                }
            }
        }

        let abs = self.waa.wc_path().join(store.rel_path(id));
        self.waa.delete(&abs, ext::CFLCT, true)?;
        store.get_mut(id).flags -= EntryFlags::CONFLICT;
        debug!(entry = %abs.display(), removed = artifacts.len(), "conflict resolved");
        Ok(())
    }
}
