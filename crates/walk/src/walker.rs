//! crates/walk/src/walker.rs
//!
//! The disk-order partial update.
//!
//! Input is the store's entry blocks (disk order) plus selection marks:
//! `do_userselected` on explicitly named entries, `do_child_wanted` on
//! their ancestors. With no marks at all the root is silently selected
//! and the whole tree is done.
//!
//! Directories close bottom-up: every entry bumps its parent's
//! `child_index`, every open child directory its parent's `unfinished`,
//! and a directory whose counters line up gets its late-arriving children
//! discovered, its callback dispatched, and its own parent notified.

use crate::correlate::correlate;
use crate::detect::detect_entry;
use base::Result;
use base::error::ResultExt;
use base::options::Context;
use base::status::{EntryFlags, StatusBits};
use filters::PatternList;
use metadata::StatInfo;
use std::path::PathBuf;
use tracing::{debug, trace};
use tree::{Entry, EntryId, EntryStore, Payload};
use tree::store::StatusField;
use waa::Waa;

/// Per-entry action callback; runs in walk order.
pub type Action<'cb> = dyn FnMut(&mut EntryStore, EntryId) -> Result<()> + 'cb;

/// The tree walker. Holds configuration only; all tree state lives in the
/// store it is handed.
pub struct Walker<'a> {
    ctx: &'a Context,
    waa: &'a Waa,
    patterns: &'a PatternList,
}

impl<'a> Walker<'a> {
    /// A walker over the given working copy.
    #[must_use]
    pub fn new(ctx: &'a Context, waa: &'a Waa, patterns: &'a PatternList) -> Self {
        Self { ctx, waa, patterns }
    }

    /// Absolute path of an entry.
    #[must_use]
    pub fn abs_path(&self, store: &EntryStore, id: EntryId) -> PathBuf {
        self.waa.wc_path().join(store.rel_path(id))
    }

    /// Marks the entries named by `rel_paths` as user-selected and their
    /// ancestors as wanted. Unknown paths report `NotFound`.
    pub fn select_paths(&self, store: &mut EntryStore, rel_paths: &[String]) -> Result<()> {
        for rel in rel_paths {
            let mut cursor = EntryId::ROOT;
            for component in rel.split('/').filter(|c| !c.is_empty() && *c != ".") {
                cursor = store.find_child(cursor, component).ok_or_else(|| {
                    base::Error::new(
                        base::ErrorKind::NotFound,
                        format!("\"{rel}\" is not a known entry"),
                    )
                })?;
            }
            store.get_mut(cursor).do_userselected = true;
            let mut up = store.get(cursor).parent;
            while let Some(ancestor) = up {
                store.get_mut(ancestor).do_child_wanted = true;
                up = store.get(ancestor).parent;
            }
        }
        Ok(())
    }

    /// Runs the partial update over the store's entry blocks, invoking
    /// `action` per processed entry.
    pub fn update_tree(&self, store: &mut EntryStore, action: &mut Action) -> Result<()> {
        let root = store.get(EntryId::ROOT);
        if !(root.do_userselected || root.do_child_wanted) {
            debug!("no selection marks, full-tree update");
            let root = store.get_mut(EntryId::ROOT);
            root.do_userselected = true;
            root.do_this_entry = true;
        }

        let blocks = store.blocks().to_vec();
        for block in blocks {
            for index in block.start..block.start + block.count {
                self.step(store, EntryId(index), action)?;
            }
        }
        Ok(())
    }

    /// Enumerates a directory that has no recorded children and builds
    /// its subtree as new entries (recursion permitting).
    pub fn build_tree(
        &self,
        store: &mut EntryStore,
        dir: EntryId,
        action: &mut Action,
    ) -> Result<()> {
        let entry = store.get_mut(dir);
        if !(entry.do_userselected || entry.do_this_entry) {
            entry.do_userselected = true;
            entry.do_this_entry = true;
        }
        self.discover_new(store, dir, action)
    }

    fn step(&self, store: &mut EntryStore, id: EntryId, action: &mut Action) -> Result<()> {
        if let Some(d) = store.get_mut(id).dir_mut() {
            d.child_index = 0;
            d.unfinished = 0;
            d.closed = false;
        }

        let is_new = store.get(id).flags.contains(EntryFlags::IS_NEW);
        if !is_new && store.get(id).parent.is_some() {
            self.set_todo_bits(store, id);
        }

        let parent_removed = store.get(id).parent.is_some_and(|p| {
            store.get(p).entry_status.contains(StatusBits::REMOVED)
        });

        if !is_new {
            if parent_removed {
                // The parent is gone, so this entry is too - no lstat.
                let entry = store.get_mut(id);
                entry.entry_status = StatusBits::REMOVED;
                entry.local_meta = None;
                entry.set_filter_allows(
                    StatusBits::REMOVED.allowed_by(self.ctx.filter.value()),
                );
            } else {
                self.detect(store, id)?;
            }
        }

        let (do_this, child_wanted) = {
            let e = store.get(id);
            (e.do_this_entry, e.do_child_wanted)
        };

        if do_this || child_wanted {
            if !store.get(id).entry_status.is_empty() {
                store.mark_parent_child_changed(id, StatusField::Local);
            }

            let recorded_dir = store.get(id).is_dir();
            let removed = store.get(id).entry_status.contains(StatusBits::REMOVED);
            if let Some(parent) = store.get(id).parent {
                if recorded_dir {
                    bump_unfinished(store, parent, 1);
                }
                if removed {
                    let p = store.get_mut(parent);
                    p.entry_status -= StatusBits::LIKELY;
                    p.entry_status |= StatusBits::CHANGED;
                    if recorded_dir {
                        bump_unfinished(store, parent, -1);
                    }
                }
            }

            // A non-directory that turned into a directory needs its
            // directory fields before children can be discovered.
            let is_dir_now = store
                .get(id)
                .local_meta
                .is_some_and(|m| m.is_dir());
            if is_dir_now
                && store.get(id).entry_status.is_replaced()
                && !store.get(id).is_dir()
            {
                store.get_mut(id).payload = Payload::Dir(tree::DirPayload::default());
            }
        }

        // From here on even unselected entries keep the bookkeeping
        // moving, so their parents can finish.
        let is_dir_now = store.get(id).local_meta.is_some_and(|m| m.is_dir());
        let no_children = store.get(id).dir().is_none_or(|d| d.entry_count == 0);
        if is_dir_now && no_children {
            self.finish_directory(store, id, action)?;
        }

        if !is_dir_now && do_this {
            self.dispatch(store, id, action)?;
        }

        if let Some(parent) = store.get(id).parent {
            let done = {
                let p = store.get_mut(parent);
                let d = p.dir_mut().expect("parents are directories");
                d.child_index += 1;
                d.child_index >= d.entry_count
            };
            if done && store.get(parent).do_this_entry {
                self.finish_directory(store, parent, action)?;
            } else {
                trace!(
                    parent = %store.get(parent).name,
                    "deferring parent"
                );
            }
        }
        Ok(())
    }

    /// Full detection for one recorded entry.
    fn detect(&self, store: &mut EntryStore, id: EntryId) -> Result<()> {
        let abs = self.abs_path(store, id);
        let current = metadata::lstat_if_exists(&abs)?;
        let link_target = match &current {
            Some(st) if st.kind() == metadata::FileKind::Symlink => {
                Some(metadata::special::read_link(&abs)?)
            }
            _ => None,
        };

        let mut status = detect_entry(store.get(id), current.as_ref(), link_target.as_deref());

        // A forced check re-reads content even with matching timestamps.
        if store.get(id).flags.contains(EntryFlags::CHECK)
            && current.is_some_and(|c| c.kind() == metadata::FileKind::File)
            && !status.contains(StatusBits::CHANGED)
        {
            status |= StatusBits::LIKELY;
        }

        if status.is_replaced() {
            store.make_shadow(id);
        }

        let entry = store.get_mut(id);
        entry.local_meta = current;
        entry.entry_status = status;
        let allowed = status.allowed_by(self.ctx.filter.value());
        entry.set_filter_allows(allowed);
        trace!(path = %abs.display(), ?status, "detected");
        Ok(())
    }

    fn set_todo_bits(&self, store: &mut EntryStore, id: EntryId) {
        let parent = store.get(id).parent.expect("called for non-roots");
        let (p_this, p_selected) = {
            let p = store.get(parent);
            (p.do_this_entry, p.do_userselected)
        };
        let recurse = self.ctx.recurse.value();
        let e = store.get_mut(id);
        // Direct children of an explicitly selected directory are always
        // done; deeper levels only when recursion is on.
        e.do_this_entry = e.do_userselected || p_selected || (p_this && recurse);
    }

    fn dispatch(&self, store: &mut EntryStore, id: EntryId, action: &mut Action) -> Result<()> {
        let wanted = {
            let e = store.get(id);
            e.do_this_entry && !e.was_output && e.filter_computed() && e.filter_allows()
        };
        if wanted {
            action(store, id)?;
            store.get_mut(id).was_output = true;
        }
        Ok(())
    }

    /// Closes `start` if its counters allow, then walks up closing
    /// parents that become complete.
    fn finish_directory(
        &self,
        store: &mut EntryStore,
        start: EntryId,
        action: &mut Action,
    ) -> Result<()> {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            {
                let e = store.get(id);
                let Some(d) = e.dir() else { break };
                if d.closed || d.unfinished > 0 {
                    break;
                }
                if d.entry_count > 0 && d.child_index < d.entry_count {
                    break;
                }
            }

            let is_dir_now = store.get(id).local_meta.is_some_and(|m| m.is_dir());
            let removed_only = (store.get(id).entry_status & StatusBits::REPLACED)
                == StatusBits::REMOVED;

            if is_dir_now && !removed_only {
                if self
                    .ctx
                    .filter
                    .value()
                    .contains(StatusBits::NEW)
                {
                    self.check_dir_for_update(store, id, action)?;
                }
                self.dispatch(store, id, action)?;
            }
            // Replaced or removed directories were already reported in
            // their non-directory role.

            if let Some(d) = store.get_mut(id).dir_mut() {
                d.closed = true;
            }

            let parent = store.get(id).parent;
            if let Some(p) = parent {
                bump_unfinished(store, p, -1);
                debug!(
                    parent = %store.get(p).name,
                    "child directory finished"
                );
            }
            cursor = parent;
        }
        Ok(())
    }

    /// Enumerates a finished directory for entries that are not recorded
    /// yet, when its state suggests there might be some.
    fn check_dir_for_update(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        action: &mut Action,
    ) -> Result<()> {
        let entry = store.get(id);
        if !entry.do_this_entry {
            return Ok(());
        }
        let worth_checking = !entry.entry_status.is_empty()
            || self.ctx.check_dirs.value()
            || entry.flags.intersects(EntryFlags::ADD | EntryFlags::CHECK);
        if !worth_checking {
            return Ok(());
        }

        self.discover_new(store, id, action)?;

        // New entries may have changed the directory's status, so the
        // filter decision is refreshed.
        let status = store.get(id).entry_status;
        let allowed = status.allowed_by(self.ctx.filter.value());
        store.get_mut(id).set_filter_allows(allowed);
        Ok(())
    }

    /// The directory enumerator: correlates the on-disk names against the
    /// recorded children and appends the extras as new entries.
    fn discover_new(
        &self,
        store: &mut EntryStore,
        dir: EntryId,
        action: &mut Action,
    ) -> Result<()> {
        let abs = self.abs_path(store, dir);
        let mut found: Vec<(String, StatInfo)> = Vec::new();
        let iter = match std::fs::read_dir(&abs) {
            Ok(iter) => iter,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                debug!(path = %abs.display(), "directory unreadable, skipping enumeration");
                return Ok(());
            }
            Err(e) => {
                return Err(base::Error::io(
                    e,
                    format!("enumerating \"{}\"", abs.display()),
                ));
            }
        };
        for dirent in iter {
            let dirent =
                dirent.with_context(|| format!("enumerating \"{}\"", abs.display()))?;
            let Ok(name) = dirent.file_name().into_string() else {
                debug!(path = %abs.display(), "skipping non-UTF-8 name");
                continue;
            };
            let st = metadata::lstat(&dirent.path())?;
            if self.waa.is_own_state(&st) {
                continue;
            }
            found.push((name, st));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let recorded: Vec<(String, EntryId)> = {
            let mut v: Vec<(String, EntryId)> = store
                .children(dir)
                .iter()
                .map(|c| (store.get(*c).name.clone(), *c))
                .collect();
            v.sort_by(|a, b| a.0.cmp(&b.0));
            v
        };

        let mut extras: Vec<(String, StatInfo)> = Vec::new();
        correlate(
            &found,
            &recorded,
            |f| f.0.as_str(),
            |r| r.0.as_str(),
            |f| extras.push(f.clone()),
            |_| {},
            |_, _| {},
        );

        let dir_rel = store.rel_str(dir);
        let mut added_any = false;
        for (name, st) in extras {
            let rel = if dir_rel.is_empty() {
                name.clone()
            } else {
                format!("{dir_rel}/{name}")
            };
            if st.kind() == metadata::FileKind::Garbage {
                trace!(rel, "not versionable, skipped");
                continue;
            }
            if self.patterns.is_ignored(&rel, &st) {
                trace!(rel, "ignored by pattern");
                continue;
            }

            let mut entry = Entry::new(name, st);
            entry.local_meta = Some(st);
            entry.flags |= EntryFlags::IS_NEW;
            entry.entry_status = StatusBits::NEW;
            let id = store.add_child(dir, entry);
            added_any = true;

            self.set_todo_bits(store, id);
            let allowed = StatusBits::NEW.allowed_by(self.ctx.filter.value());
            store.get_mut(id).set_filter_allows(allowed);
            store.mark_parent_child_changed(id, StatusField::Local);

            if st.is_dir() && self.ctx.recurse.value() && store.get(id).do_this_entry {
                self.discover_new(store, id, action)?;
            }
            self.dispatch(store, id, action)?;
        }

        let entry = store.get_mut(dir);
        entry.entry_status -= StatusBits::LIKELY;
        if added_any {
            entry.entry_status |= StatusBits::CHANGED;
            store.mark_parent_child_changed(dir, StatusField::Local);
        }
        Ok(())
    }
}

fn bump_unfinished(store: &mut EntryStore, id: EntryId, delta: i32) {
    if let Some(d) = store.get_mut(id).dir_mut() {
        if delta > 0 {
            d.unfinished += delta as u32;
        } else if d.unfinished > 0 {
            d.unfinished -= (-delta) as u32;
        }
    }
}
