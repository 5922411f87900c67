//! crates/engine/src/merge.rs
//!
//! Driving the external three-way merge program.

use crate::{DirChange, Engine};
use base::error::ResultExt;
use base::status::StatusBits;
use base::{Error, ErrorKind, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;
use tree::{EntryId, EntryStore};

/// How the merge ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Exit 0: merged cleanly, temporaries removed.
    Clean,
    /// Exit 1: textual conflicts; the entry is flagged and the artifacts
    /// stay for `resolved`.
    Conflicts,
}

impl Engine<'_> {
    /// Merges `mine` and `remote` over `common` into the entry's working
    /// path. Exit code 0 is a clean merge, 1 leaves conflict markers and
    /// records the three artifacts, anything else is fatal.
    pub fn merge(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        mine: &Path,
        common: &Path,
        remote: &Path,
        dir_change: &mut DirChange,
    ) -> Result<MergeOutcome> {
        let abs = self.waa.wc_path().join(store.rel_path(id));
        let recorded = store.get(id).meta;

        let output = std::fs::File::create(&abs)
            .with_context(|| format!("creating merge output \"{}\"", abs.display()))?;

        let program = self.ctx.merge_prog.get().clone();
        let mut command = Command::new(&program);
        command
            .args(self.ctx.merge_opts.get())
            .arg(mine)
            .arg(common)
            .arg(remote)
            .envs(
                self.child_env(&abs, None)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            )
            .stdout(Stdio::from(output));

        debug!(program, entry = %abs.display(), "starting three-way merge");
        let status = command
            .status()
            .map_err(|e| Error::io(e, format!("starting the merge program \"{program}\"")))?;

        match status.code() {
            Some(0) => {
                for temp in [mine, common, remote] {
                    std::fs::remove_file(temp).with_context(|| {
                        format!("removing merge temporary \"{}\"", temp.display())
                    })?;
                }
                // The content was intentionally changed; stamp the
                // current time and restore the other meta-data.
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default();
                let mut meta = recorded;
                meta.mtime_sec = now.as_secs() as i64;
                meta.mtime_nsec = now.subsec_nanos();
                metadata::apply::apply_all(&abs, &meta)?;
                dir_change.set_current = true;

                let entry = store.get_mut(id);
                entry.meta.mtime_sec = meta.mtime_sec;
                entry.meta.mtime_nsec = meta.mtime_nsec;
                entry.local_meta = metadata::lstat_if_exists(&abs)?;
                Ok(MergeOutcome::Clean)
            }
            Some(1) => {
                self.mark_conflict(store, id, &[mine, common, remote])?;
                store.get_mut(id).entry_status |= StatusBits::CHANGED;
                Ok(MergeOutcome::Conflicts)
            }
            _ => Err(Error::new(
                ErrorKind::Io,
                format!("the merge program \"{program}\" failed with {status}"),
            )),
        }
    }
}
