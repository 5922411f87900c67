//! crates/tree/src/entry.rs
//!
//! One node of the tracked tree.

use base::RevNum;
use base::status::{ChangeFlag, EntryFlags, StatusBits};
use metadata::{FileKind, StatInfo};

/// Index of an entry in its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u32);

impl EntryId {
    /// The root entry's id; the root is always arena slot zero.
    pub const ROOT: Self = Self(0);

    /// The arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// File-entry specifics (regular files, symlinks, devices).
#[derive(Clone, Debug, Default)]
pub struct FilePayload {
    /// MD5 of the recorded content; for symlinks the MD5 of the target
    /// string; unused for devices.
    pub md5: [u8; 16],
    /// Cleartext shell command from the update-pipe property, if any.
    pub decoder: Option<String>,
    /// Content comparison result, sticky within a run.
    pub change_flag: ChangeFlag,
}

/// Directory-entry specifics.
#[derive(Clone, Debug, Default)]
pub struct DirPayload {
    /// Children in ascending `(device, inode, name)` order.
    pub children: Vec<EntryId>,
    /// Recorded child count. Matches `children.len()` once a read or
    /// enumeration is complete; during a read it is the expected count.
    pub entry_count: u32,
    /// Walk bookkeeping: children attached so far (read) or processed so
    /// far (walk).
    pub child_index: u32,
    /// Open descendant directories during a walk; the directory closes
    /// when this reaches zero and all children were processed.
    pub unfinished: u32,
    /// Set when new children arrived out of order; the list is re-sorted
    /// before serialization.
    pub to_be_sorted: bool,
    /// The walk finished this directory (late children discovered,
    /// callback dispatched); it must not be finished twice.
    pub closed: bool,
}

/// Type-specific part of an entry.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Regular file, symlink or device node.
    File(FilePayload),
    /// Directory.
    Dir(DirPayload),
}

impl Payload {
    /// Fresh payload appropriate for the stat kind.
    #[must_use]
    pub fn for_kind(kind: FileKind) -> Self {
        if kind == FileKind::Directory {
            Self::Dir(DirPayload::default())
        } else {
            Self::File(FilePayload::default())
        }
    }
}

/// One tracked entry.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Path component; no separators. The root is named `.`.
    pub name: String,
    /// Parent id; `None` exactly for the root.
    pub parent: Option<EntryId>,
    /// Recorded stat tuple.
    pub meta: StatInfo,
    /// Revision this entry is recorded at.
    pub repos_rev: RevNum,
    /// Revision before the running update.
    pub old_rev: RevNum,
    /// Id into the URL list, if the entry belongs to one.
    pub url_id: Option<u32>,
    /// Persistent and transient flags.
    pub flags: EntryFlags,
    /// Local status against the recorded state.
    pub entry_status: StatusBits,
    /// Status reported by the repository delivery.
    pub remote_status: StatusBits,
    /// File- or directory-specific data.
    pub payload: Payload,
    /// Shadow copy taken at replacement/removal time, in the shadow arena.
    pub old: Option<EntryId>,
    /// What `lstat` said during this run; `None` for an absent entry or
    /// before detection ran. The recorded [`Entry::meta`] stays untouched
    /// until a commit writes it back.
    pub local_meta: Option<StatInfo>,
    /// User-defined properties carried across a directory replacement.
    pub user_props: Vec<(String, String)>,

    /// Explicitly named on the command line.
    pub do_userselected: bool,
    /// Some descendant was named on the command line.
    pub do_child_wanted: bool,
    /// This entry is to be processed (derived from the selection marks).
    pub do_this_entry: bool,
    /// Excluded from serialization and further processing.
    pub to_be_ignored: bool,
    /// Already printed by the action callback.
    pub was_output: bool,

    do_filter_allows: bool,
    do_filter_computed: bool,

    /// 1-based position in the serialized file; valid during a write.
    pub(crate) file_index: u32,
}

impl Entry {
    /// A new entry with the given name, stat data and matching payload.
    #[must_use]
    pub fn new(name: impl Into<String>, meta: StatInfo) -> Self {
        Self {
            name: name.into(),
            parent: None,
            meta,
            repos_rev: 0,
            old_rev: 0,
            url_id: None,
            flags: EntryFlags::empty(),
            entry_status: StatusBits::empty(),
            remote_status: StatusBits::empty(),
            payload: Payload::for_kind(meta.kind()),
            old: None,
            local_meta: None,
            user_props: Vec::new(),
            do_userselected: false,
            do_child_wanted: false,
            do_this_entry: false,
            to_be_ignored: false,
            was_output: false,
            do_filter_allows: false,
            do_filter_computed: false,
            file_index: 0,
        }
    }

    /// The recorded file kind.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.meta.kind()
    }

    /// Is the recorded entry a directory?
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.payload, Payload::Dir(_))
    }

    /// Directory payload access; `None` for files.
    #[must_use]
    pub fn dir(&self) -> Option<&DirPayload> {
        match &self.payload {
            Payload::Dir(d) => Some(d),
            Payload::File(_) => None,
        }
    }

    /// Mutable directory payload access.
    pub fn dir_mut(&mut self) -> Option<&mut DirPayload> {
        match &mut self.payload {
            Payload::Dir(d) => Some(d),
            Payload::File(_) => None,
        }
    }

    /// File payload access; `None` for directories.
    #[must_use]
    pub fn file(&self) -> Option<&FilePayload> {
        match &self.payload {
            Payload::File(f) => Some(f),
            Payload::Dir(_) => None,
        }
    }

    /// Mutable file payload access.
    pub fn file_mut(&mut self) -> Option<&mut FilePayload> {
        match &mut self.payload {
            Payload::File(f) => Some(f),
            Payload::Dir(_) => None,
        }
    }

    /// Should this entry appear in the serialized entry list?
    #[must_use]
    pub fn should_be_written(&self) -> bool {
        !self.to_be_ignored && !self.flags.contains(EntryFlags::DONT_WRITE)
    }

    /// The memoized filter decision. Must not be read before
    /// [`Entry::set_filter_allows`] ran; that ordering bug is reported
    /// loudly.
    #[must_use]
    pub fn filter_allows(&self) -> bool {
        debug_assert!(
            self.do_filter_computed,
            "filter bit of \"{}\" read before being computed",
            self.name
        );
        self.do_filter_allows
    }

    /// Memoizes the filter decision.
    pub fn set_filter_allows(&mut self, allows: bool) {
        self.do_filter_allows = allows;
        self.do_filter_computed = true;
    }

    /// Has the filter decision been computed yet?
    #[must_use]
    pub const fn filter_computed(&self) -> bool {
        self.do_filter_computed
    }

    /// Sort key for child lists: device, inode, then name for hardlinks.
    #[must_use]
    pub fn inode_key(&self) -> (u64, u64, &str) {
        (self.meta.dev, self.meta.ino, self.name.as_str())
    }
}
