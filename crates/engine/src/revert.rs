//! crates/engine/src/revert.rs
//!
//! Revert to BASE: put selected entries back into the state the recorded
//! revision describes, depth-first, restoring directory mtimes after the
//! children settled.

use crate::{DirChange, Engine};
use base::error::ResultExt;
use base::status::{EntryFlags, StatusBits};
use base::{Error, ErrorKind, Result};
use metadata::FileKind;
use repos::copy::CopyRelations;
use repos::session::Session;
use tracing::debug;
use tree::store::StatusField;
use tree::{EntryId, EntryStore};

impl Engine<'_> {
    /// Reverts every selected, locally-changed entry below (and
    /// including) the root back to its BASE state. Requires a prior walk:
    /// `entry_status` and the selection bits must be populated.
    /// `copies` resolves the base text of copy-derived entries.
    pub fn revert_tree(
        &self,
        store: &mut EntryStore,
        session: &mut dyn Session,
        copies: &CopyRelations,
    ) -> Result<()> {
        let mut dir_change = DirChange::default();

        // The root directory itself only ever needs meta repair.
        let root_status = store.get(EntryId::ROOT).entry_status;
        self.revert_children(store, EntryId::ROOT, session, copies)?;
        if root_status.intersects(StatusBits::META_CHANGED) {
            dir_change.revert_mtime = true;
        }
        self.finish_dir_meta(store, EntryId::ROOT, dir_change)
    }

    fn revert_children(
        &self,
        store: &mut EntryStore,
        dir: EntryId,
        session: &mut dyn Session,
        copies: &CopyRelations,
    ) -> Result<()> {
        let mut dir_change = DirChange::default();
        let children = store.children(dir).to_vec();

        for child in children {
            let entry = store.get(child);
            let do_undo = entry.do_this_entry
                && entry.entry_status.intersects(StatusBits::CHANGE_MASK)
                && entry.filter_computed()
                && entry.filter_allows();

            if do_undo {
                self.revert_entry(store, child, session, copies, &mut dir_change)?;
            }

            let descend = store.get(child).is_dir()
                && store
                    .get(child)
                    .entry_status
                    .contains(StatusBits::CHILD_CHANGED);
            if descend {
                self.revert_children(store, child, session, copies)?;
            }
        }

        store.sweep_ignored(dir);
        self.finish_dir_meta(store, dir, dir_change)
    }

    /// One entry back to BASE.
    fn revert_entry(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        session: &mut dyn Session,
        copies: &CopyRelations,
        dir_change: &mut DirChange,
    ) -> Result<()> {
        let abs = self.waa.wc_path().join(store.rel_path(id));
        let entry = store.get(id);

        if entry.flags.contains(EntryFlags::UNVERSION) {
            // Scheduled for unversioning - reverting just keeps it.
            store.get_mut(id).flags -= EntryFlags::UNVERSION;
            debug!(path = %abs.display(), "unversion mark dropped");
            return Ok(());
        }
        if entry.flags.contains(EntryFlags::ADD) {
            // Never committed; un-adding makes it unknown again.
            let entry = store.get_mut(id);
            entry.flags -= EntryFlags::ADD;
            entry.to_be_ignored = true;
            debug!(path = %abs.display(), "add mark dropped");
            return Ok(());
        }
        if entry.url_id.is_none() && !entry.flags.is_copy() {
            if self.ctx.verbosity.value() > 0 {
                println!("Cannot revert unknown entry \"{}\".", abs.display());
            }
            return Ok(());
        }

        if entry.flags.contains(EntryFlags::CONFLICT) {
            dir_change.revert_mtime = true;
            self.resolve_conflict(store, id)?;
        }

        if !store
            .get(id)
            .entry_status
            .intersects(StatusBits::CHANGE_MASK)
        {
            return Ok(());
        }

        let rev = store.get(id).repos_rev;
        let recorded_kind = store.get(id).meta.kind();
        if recorded_kind == FileKind::Directory {
            if store.get(id).entry_status.contains(StatusBits::REMOVED) {
                let mode = store.get(id).meta.perm_bits();
                std::fs::create_dir_all(&abs)
                    .with_context(|| format!("creating directory \"{}\"", abs.display()))?;
                std::fs::set_permissions(
                    &abs,
                    std::os::unix::fs::PermissionsExt::from_mode(mode),
                )
                .with_context(|| format!("chmod(\"{}\")", abs.display()))?;
                dir_change.revert_mtime = true;
                metadata::apply::apply_all(&abs, &store.get(id).meta)?;
                store.get_mut(id).local_meta = metadata::lstat_if_exists(&abs)?;
            } else {
                // Existing directory: only its meta-data is repaired
                // here; children go through their own revert.
                let which = store.get(id).entry_status & StatusBits::META_CHANGED;
                metadata::apply::apply(&abs, &store.get(id).meta, which)?;
            }
            if !store.get(id).entry_status.is_empty() {
                store.get_mut(id).flags |= EntryFlags::CHECK;
            }
        } else if store.get(id).url_id.is_some() {
            self.install_file(store, id, Some(rev), session)
                .with_context(|| format!("unable to revert entry \"{}\"", abs.display()))?;
            dir_change.revert_mtime = true;
        } else {
            // Copy-derived and never committed: the base text lives at
            // the copy source.
            let rel = store.rel_path(id);
            let source = copies.source_of(&rel).ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("no copy source recorded for \"{}\"", abs.display()),
                )
            })?;
            let source_rel = source.to_string_lossy().into_owned();
            let source_rev = self
                .lookup(store, &source_rel)
                .map(|src| store.get(src).repos_rev);
            self.install_from(store, id, source_rev, session, &source_rel)
                .with_context(|| format!("unable to revert entry \"{}\"", abs.display()))?;
            dir_change.revert_mtime = true;
        }

        let entry = store.get_mut(id);
        entry.flags |= EntryFlags::PRINT;
        entry.entry_status -= StatusBits::CHANGE_MASK | StatusBits::LIKELY;
        store.mark_parent_child_changed(id, StatusField::Local);
        Ok(())
    }

    /// After the children of `dir` settled, repair the directory's mtime:
    /// restore the recorded one, or stamp now after intentional changes,
    /// and re-read the result so later runs see no spurious change.
    pub(crate) fn finish_dir_meta(
        &self,
        store: &mut EntryStore,
        dir: EntryId,
        change: DirChange,
    ) -> Result<()> {
        if change.unchanged() {
            return Ok(());
        }
        let abs = self.waa.wc_path().join(store.rel_path(dir));

        let mut meta = store.get(dir).meta;
        if change.set_current {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();
            meta.mtime_sec = now.as_secs() as i64;
            meta.mtime_nsec = now.subsec_nanos();
        }
        metadata::apply::apply(&abs, &meta, StatusBits::META_MTIME)?;

        let fresh = metadata::lstat_if_exists(&abs)?;
        let entry = store.get_mut(dir);
        entry.local_meta = fresh;
        if let Some(fresh) = fresh {
            entry.meta.mtime_sec = fresh.mtime_sec;
            entry.meta.mtime_nsec = fresh.mtime_nsec;
        }
        Ok(())
    }
}
