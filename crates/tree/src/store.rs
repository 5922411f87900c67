//! crates/tree/src/store.rs
//!
//! The entry arena.

use crate::entry::{Entry, EntryId};
use base::status::StatusBits;
use std::path::PathBuf;

/// A contiguous run of entries in arena order, the walker's unit of work.
/// Reading the entry list produces blocks in disk order; the walker
/// consumes them front to back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryBlock {
    /// First arena index of the run.
    pub start: u32,
    /// Number of entries in the run.
    pub count: u32,
}

/// Which status word an operation updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusField {
    /// The local `entry_status`.
    Local,
    /// The delivery-driven `remote_status`.
    Remote,
}

/// Arena of entries plus the shadow arena for replaced/removed copies.
#[derive(Debug)]
pub struct EntryStore {
    entries: Vec<Entry>,
    shadows: Vec<Entry>,
    blocks: Vec<EntryBlock>,
}

impl EntryStore {
    /// A store holding just the given root entry.
    #[must_use]
    pub fn new(mut root: Entry) -> Self {
        debug_assert!(root.is_dir(), "the tree root must be a directory");
        root.parent = None;
        Self {
            entries: vec![root],
            shadows: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Number of entries (including the root).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a store holds at least the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Immutable entry access.
    #[must_use]
    pub fn get(&self, id: EntryId) -> &Entry {
        &self.entries[id.index()]
    }

    /// Mutable entry access.
    pub fn get_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.index()]
    }

    /// The root entry.
    #[must_use]
    pub fn root(&self) -> &Entry {
        &self.entries[0]
    }

    /// All ids in arena (insertion) order.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        (0..self.entries.len() as u32).map(EntryId)
    }

    /// Appends a bare entry without attaching it anywhere. The entry-list
    /// reader wires parents itself.
    pub fn push_entry(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    /// Appends `entry` as a child of `parent`. The child list is marked
    /// for re-sorting; the recorded child count grows.
    pub fn add_child(&mut self, parent: EntryId, mut entry: Entry) -> EntryId {
        entry.parent = Some(parent);
        let id = self.push_entry(entry);
        let dir = self.entries[parent.index()]
            .dir_mut()
            .expect("add_child parent must be a directory");
        dir.children.push(id);
        dir.entry_count += 1;
        dir.to_be_sorted = true;
        id
    }

    /// The child ids of a directory (empty slice for files).
    #[must_use]
    pub fn children(&self, id: EntryId) -> &[EntryId] {
        self.get(id).dir().map_or(&[], |d| &d.children[..])
    }

    /// Re-sorts a directory's children into `(device, inode, name)` order
    /// if they are marked dirty.
    pub fn sort_children_if_needed(&mut self, id: EntryId) {
        let needs = self.get(id).dir().is_some_and(|d| d.to_be_sorted);
        if !needs {
            return;
        }
        let mut children = std::mem::take(
            &mut self
                .entries[id.index()]
                .dir_mut()
                .expect("directory")
                .children,
        );
        children.sort_by(|a, b| {
            self.entries[a.index()]
                .inode_key()
                .cmp(&self.entries[b.index()].inode_key())
        });
        let dir = self.entries[id.index()].dir_mut().expect("directory");
        dir.children = children;
        dir.to_be_sorted = false;
    }

    /// Child ids sorted by name.
    #[must_use]
    pub fn children_by_name(&self, id: EntryId) -> Vec<EntryId> {
        let mut ids = self.children(id).to_vec();
        ids.sort_by(|a, b| self.get(*a).name.cmp(&self.get(*b).name));
        ids
    }

    /// Finds a direct child by name.
    #[must_use]
    pub fn find_child(&self, dir: EntryId, name: &str) -> Option<EntryId> {
        self.children(dir)
            .iter()
            .copied()
            .find(|c| self.get(*c).name == name)
    }

    /// The path of `id` relative to the WC root; empty for the root.
    #[must_use]
    pub fn rel_path(&self, id: EntryId) -> PathBuf {
        PathBuf::from(self.rel_str(id))
    }

    /// The relative path as a string, `/`-separated; empty for the root.
    #[must_use]
    pub fn rel_str(&self, id: EntryId) -> String {
        let mut components = Vec::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let entry = self.get(cur);
            if entry.parent.is_some() {
                components.push(entry.name.as_str());
            }
            cursor = entry.parent;
        }
        components.reverse();
        components.join("/")
    }

    /// Walks up from `id`'s parent setting `CHILD_CHANGED`, stopping at
    /// the first ancestor that already carries it.
    pub fn mark_parent_child_changed(&mut self, id: EntryId, field: StatusField) {
        let mut cursor = self.get(id).parent;
        while let Some(cur) = cursor {
            let entry = &mut self.entries[cur.index()];
            let status = match field {
                StatusField::Local => &mut entry.entry_status,
                StatusField::Remote => &mut entry.remote_status,
            };
            if status.contains(StatusBits::CHILD_CHANGED) {
                break;
            }
            *status |= StatusBits::CHILD_CHANGED;
            cursor = entry.parent;
        }
    }

    /// Copies the current state of `id` into the shadow arena and links
    /// it as the entry's `old`.
    pub fn make_shadow(&mut self, id: EntryId) {
        let mut copy = self.entries[id.index()].clone();
        copy.old = None;
        let shadow_id = EntryId(self.shadows.len() as u32);
        self.shadows.push(copy);
        self.entries[id.index()].old = Some(shadow_id);
    }

    /// The shadow copy of `id`, if one was taken.
    #[must_use]
    pub fn shadow_of(&self, id: EntryId) -> Option<&Entry> {
        self.get(id).old.map(|s| &self.shadows[s.index()])
    }

    /// Drops children marked `to_be_ignored` from a directory's child
    /// list. The arena slots stay (ids remain valid) but the entries are
    /// detached and will not serialize.
    pub fn sweep_ignored(&mut self, dir: EntryId) {
        let Some(d) = self.entries[dir.index()].dir_mut() else {
            return;
        };
        let mut children = std::mem::take(&mut d.children);
        children.retain(|c| !self.entries[c.index()].to_be_ignored);
        let d = self.entries[dir.index()].dir_mut().expect("directory");
        d.entry_count = children.len() as u32;
        d.children = children;
    }

    /// The walker's work queue.
    #[must_use]
    pub fn blocks(&self) -> &[EntryBlock] {
        &self.blocks
    }

    /// Appends a block to the work queue.
    pub fn push_block(&mut self, block: EntryBlock) {
        self.blocks.push(block);
    }

    /// Replaces the work queue with one block covering every entry.
    pub fn set_full_block(&mut self) {
        self.blocks = vec![EntryBlock {
            start: 0,
            count: self.entries.len() as u32,
        }];
    }
}
