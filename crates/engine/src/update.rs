//! crates/engine/src/update.rs
//!
//! Applying a repository delivery: populate `remote_status` through the
//! session's change report, then walk the tree and bring the working copy
//! to the target revision, mediating with local modifications according
//! to the configured conflict policy.

use crate::install::rename_to_unique;
use crate::{DirChange, Engine};
use base::error::ResultExt;
use base::options::ConflictPolicy;
use base::status::{EntryFlags, StatusBits};
use base::{Error, ErrorKind, Result, RevNum};
use metadata::FileKind;
use repos::session::{DeltaAction, Session};
use tracing::debug;
use tree::store::StatusField;
use tree::{Entry, EntryId, EntryStore};

impl Engine<'_> {
    /// Runs the repository's report-and-deliver protocol and applies the
    /// result. Returns the revision the working copy is now at.
    ///
    /// Local `entry_status` must already be populated (the walker ran);
    /// it decides whether an incoming change collides with local edits.
    pub fn apply_remote(
        &self,
        store: &mut EntryStore,
        session: &mut dyn Session,
        base_rev: RevNum,
        target: Option<RevNum>,
    ) -> Result<RevNum> {
        let target_rev = self.report_remote(store, session, base_rev, target)?;

        let mut dir_change = DirChange::default();
        self.apply_changed_children(store, EntryId::ROOT, session, target_rev, &mut dir_change)?;

        for id in store.ids().collect::<Vec<_>>() {
            let entry = store.get_mut(id);
            if !entry.to_be_ignored {
                entry.old_rev = entry.repos_rev;
                entry.repos_rev = target_rev;
            }
        }
        Ok(target_rev)
    }

    /// Drives the delta report and translates it into `remote_status`
    /// bits, creating entries for additions on the way.
    pub fn report_remote(
        &self,
        store: &mut EntryStore,
        session: &mut dyn Session,
        base_rev: RevNum,
        target: Option<RevNum>,
    ) -> Result<RevNum> {
        let mut deltas = Vec::new();
        let target_rev = session.report_changes(base_rev, target, &mut |delta| {
            deltas.push(delta);
            Ok(())
        })?;
        debug!(base_rev, target_rev, count = deltas.len(), "delta report finished");

        for delta in deltas {
            let status = match delta.action {
                DeltaAction::Add(_) => StatusBits::NEW,
                DeltaAction::Delete => StatusBits::REMOVED,
                DeltaAction::Modify => StatusBits::CHANGED,
                DeltaAction::MetaOnly => StatusBits::META_CHANGED | StatusBits::PROPERTIES,
            };

            let id = match self.lookup(store, &delta.path) {
                Some(id) => {
                    if delta.action == DeltaAction::Delete {
                        store.make_shadow(id);
                    }
                    if let DeltaAction::Add(kind) = delta.action {
                        // The entry comes back as a different kind; flip
                        // its payload so the application step treats it
                        // right.
                        let entry = store.get_mut(id);
                        let perm = entry.meta.perm_bits();
                        if kind == FileKind::Directory && !entry.is_dir() {
                            entry.meta.mode = 0o040_000 | perm;
                            entry.payload = tree::Payload::Dir(tree::DirPayload::default());
                        } else if kind != FileKind::Directory && entry.is_dir() {
                            entry.meta.mode = 0o100_000 | perm;
                            entry.payload =
                                tree::Payload::File(tree::FilePayload::default());
                        }
                    }
                    id
                }
                None => match delta.action {
                    DeltaAction::Add(kind) => self.create_for_delivery(store, &delta.path, kind)?,
                    // A delete for an unknown entry is stale info.
                    _ => continue,
                },
            };

            let entry = store.get_mut(id);
            entry.remote_status |= status;
            store.mark_parent_child_changed(id, StatusField::Remote);
        }
        Ok(target_rev)
    }

    pub(crate) fn lookup(&self, store: &EntryStore, rel: &str) -> Option<EntryId> {
        let mut cursor = EntryId::ROOT;
        for component in rel.split('/').filter(|c| !c.is_empty()) {
            cursor = store.find_child(cursor, component)?;
        }
        Some(cursor)
    }

    /// Creates a placeholder entry for a delivered addition. Parents are
    /// delivered before children, so the parent chain already exists.
    fn create_for_delivery(
        &self,
        store: &mut EntryStore,
        rel: &str,
        kind: FileKind,
    ) -> Result<EntryId> {
        let (parent_rel, name) = match rel.rsplit_once('/') {
            Some((p, n)) => (p, n),
            None => ("", rel),
        };
        let parent = self.lookup(store, parent_rel).ok_or_else(|| {
            Error::new(
                ErrorKind::Protocol,
                format!("delivery for \"{rel}\" arrived before its parent"),
            )
        })?;

        let meta = metadata::StatInfo {
            mode: match kind {
                FileKind::Directory => 0o040_755,
                FileKind::Symlink => 0o120_777,
                FileKind::BlockDev => 0o060_600,
                FileKind::CharDev => 0o020_600,
                _ => 0o100_644,
            },
            ..metadata::StatInfo::default()
        };
        let mut entry = Entry::new(name, meta);
        entry.set_filter_allows(true);
        entry.do_this_entry = true;
        Ok(store.add_child(parent, entry))
    }

    fn apply_changed_children(
        &self,
        store: &mut EntryStore,
        dir: EntryId,
        session: &mut dyn Session,
        target_rev: RevNum,
        parent_change: &mut DirChange,
    ) -> Result<()> {
        if !store
            .get(dir)
            .remote_status
            .contains(StatusBits::CHILD_CHANGED)
        {
            debug!(dir = %store.get(dir).name, "no remote child changes");
        } else {
            let mut dir_change = DirChange::default();
            let children = store.children(dir).to_vec();
            for child in children {
                if store
                    .get(child)
                    .remote_status
                    .intersects(StatusBits::CHANGE_MASK)
                {
                    self.undo_change(store, child, session, target_rev, &mut dir_change)?;
                }

                let descend = store.get(child).is_dir()
                    && (store.get(child).remote_status & StatusBits::REPLACED)
                        != StatusBits::REMOVED;
                if descend {
                    self.apply_changed_children(
                        store,
                        child,
                        session,
                        target_rev,
                        &mut dir_change,
                    )?;
                }
            }
            store.sweep_ignored(dir);
            if !dir_change.unchanged() {
                parent_change.revert_mtime = true;
            }
            // A locally-dirty directory keeps its check mark so the next
            // run re-reads it.
            if store
                .get(dir)
                .entry_status
                .intersects(StatusBits::CHANGE_MASK)
            {
                store.get_mut(dir).flags |= EntryFlags::CHECK;
            }
            self.finish_dir_meta(store, dir, dir_change)?;
        }
        Ok(())
    }

    /// Applies one reported change to one entry.
    fn undo_change(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        session: &mut dyn Session,
        target_rev: RevNum,
        dir_change: &mut DirChange,
    ) -> Result<()> {
        let abs = self.waa.wc_path().join(store.rel_path(id));
        let locally_changed = store
            .get(id)
            .entry_status
            .contains(StatusBits::CHANGED);

        let mut mine_name = None;
        if locally_changed {
            match self.ctx.conflict.value() {
                ConflictPolicy::Stop => {
                    return Err(Error::new(
                        ErrorKind::Busy,
                        format!("the entry \"{}\" has changed locally", abs.display()),
                    ));
                }
                ConflictPolicy::Local => {
                    if self.ctx.verbosity.value() > 0 {
                        println!("Conflict for \"{}\" skipped.", abs.display());
                    }
                    return Ok(());
                }
                ConflictPolicy::Remote => {}
                ConflictPolicy::Both | ConflictPolicy::Merge => {
                    mine_name = Some(rename_to_unique(&abs, ".mine")?);
                }
            }
        }

        let remote = store.get(id).remote_status;

        // Entry gone (or about to be replaced): take the local version
        // away unless it was already moved aside.
        if remote.contains(StatusBits::REMOVED) && mine_name.is_none() && abs.exists() {
            let local_is_dir = store
                .get(id)
                .local_meta
                .is_some_and(|m| m.is_dir());
            if local_is_dir {
                std::fs::remove_dir_all(&abs)
                    .with_context(|| format!("removing \"{}\"", abs.display()))?;
            } else {
                std::fs::remove_file(&abs)
                    .with_context(|| format!("removing \"{}\"", abs.display()))?;
            }
            dir_change.revert_mtime = true;
        }

        if let Some(parent) = store.get(id).parent {
            if let Some(d) = store.get_mut(parent).dir_mut() {
                d.to_be_sorted = true;
            }
        }

        if (remote & StatusBits::REPLACED) == StatusBits::REMOVED {
            mark_subtree_ignored(store, id);
            return Ok(());
        }

        let delivered_dir = store.get(id).is_dir();
        if delivered_dir {
            std::fs::create_dir_all(&abs)
                .with_context(|| format!("creating directory \"{}\"", abs.display()))?;
            dir_change.revert_mtime = true;
            if remote.intersects(StatusBits::META_CHANGED | StatusBits::PROPERTIES) {
                let rel = store.rel_str(id);
                let (_, props) = session.get_dir(&rel, Some(target_rev))?;
                let mut meta = store.get(id).meta;
                let provided = crate::install::apply_props_to_meta(&mut meta, &props);
                metadata::apply::apply(&abs, &meta, provided)?;
                let entry = store.get_mut(id);
                entry.meta = meta;
                // User-defined properties ride on the entry across a
                // directory replacement.
                entry.user_props = props
                    .iter()
                    .filter(|(k, _)| !k.starts_with("svn:") && !k.starts_with("trackfs:"))
                    .cloned()
                    .collect();
            }
            store.get_mut(id).local_meta = metadata::lstat_if_exists(&abs)?;
            // The mtime follows once the children are in.
        } else if remote
            .intersects(StatusBits::CHANGED | StatusBits::NEW | StatusBits::REMOVED)
        {
            self.install_file(store, id, Some(target_rev), session)?;
            dir_change.revert_mtime = true;

            if let Some(mine) = mine_name {
                dir_change.set_current = true;
                let fetched =
                    rename_to_unique(&abs, &format!(".r{target_rev}"))?;

                if store.get(id).flags.contains(EntryFlags::CONFLICT) {
                    if self.ctx.verbosity.value() > 0 {
                        println!("\"{}\" already marked as conflict.", abs.display());
                    }
                    self.mark_conflict(store, id, &[&mine, &fetched])?;
                } else if self.ctx.conflict.value() == ConflictPolicy::Both {
                    self.mark_conflict(store, id, &[&mine, &fetched])?;
                    // An empty placeholder keeps the name occupied and
                    // avoids a "deleted" status.
                    std::fs::File::create(&abs)
                        .with_context(|| format!("creating \"{}\"", abs.display()))?;
                    metadata::apply::apply_all(&abs, &store.get(id).meta)?;
                } else {
                    // Merge: fetch the common ancestor, then drive the
                    // external program.
                    let old_rev = store.get(id).old_rev;
                    self.install_file(store, id, Some(old_rev), session)?;
                    let common = rename_to_unique(&abs, &format!(".r{old_rev}"))?;
                    let outcome =
                        self.merge(store, id, &mine, &common, &fetched, dir_change)?;
                    debug!(entry = %abs.display(), ?outcome, "merge finished");
                }
            }
        } else if remote.intersects(StatusBits::META_CHANGED | StatusBits::PROPERTIES) {
            // Only properties/meta-data changed; fetch them and repair
            // the local state.
            let rel = store.rel_str(id);
            let mut sink = std::io::sink();
            let (props, _) = session.get_file(&rel, Some(target_rev), &mut sink)?;
            let mut meta = store.get(id).meta;
            let provided = crate::install::apply_props_to_meta(&mut meta, &props);
            metadata::apply::apply(&abs, &meta, provided)?;
            store.get_mut(id).meta = meta;
            store.get_mut(id).local_meta = metadata::lstat_if_exists(&abs)?;
        }

        Ok(())
    }
}

/// Marks an entry and its recorded descendants as purged from the list.
fn mark_subtree_ignored(store: &mut EntryStore, id: EntryId) {
    let mut stack = vec![id];
    while let Some(cur) = stack.pop() {
        store.get_mut(cur).to_be_ignored = true;
        stack.extend(store.children(cur).iter().copied());
    }
}
