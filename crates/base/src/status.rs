//! crates/base/src/status.rs
//!
//! Entry status and flag bit sets.
//!
//! Two ten-bit words describe an entry: `entry_status` for the local
//! comparison against the recorded state, `remote_status` for what the
//! repository delivery reported. The persistent `EntryFlags` survive in the
//! serialized entry list; the transient ones exist only within a run.

use bitflags::bitflags;

bitflags! {
    /// Per-entry change status, local or remote.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StatusBits: u16 {
        /// No recorded data exists for this entry.
        const NEW = 1 << 0;
        /// Recorded but absent on disk (or in the delivery).
        const REMOVED = 1 << 1;
        /// Content differs.
        const CHANGED = 1 << 2;
        /// mtime changed but the content check has been deferred.
        const LIKELY = 1 << 3;
        /// User-defined properties differ.
        const PROPERTIES = 1 << 4;
        /// Modification time differs.
        const META_MTIME = 1 << 5;
        /// Owner differs.
        const META_OWNER = 1 << 6;
        /// Group differs.
        const META_GROUP = 1 << 7;
        /// Access mode differs.
        const META_UMODE = 1 << 8;
        /// Some descendant has a non-zero status.
        const CHILD_CHANGED = 1 << 9;

        /// Recorded as one type, present as another.
        const REPLACED = Self::NEW.bits() | Self::REMOVED.bits();
        /// Any of the four meta-data bits.
        const META_CHANGED = Self::META_MTIME.bits()
            | Self::META_OWNER.bits()
            | Self::META_GROUP.bits()
            | Self::META_UMODE.bits();
        /// Everything that makes an entry worth committing or reverting.
        const CHANGE_MASK = Self::NEW.bits()
            | Self::REMOVED.bits()
            | Self::CHANGED.bits()
            | Self::META_CHANGED.bits()
            | Self::PROPERTIES.bits();
    }
}

/// The all-pass filter sentinel: every entry is allowed.
pub const FILTER_ALL: StatusBits = StatusBits::all();

impl StatusBits {
    /// True when the entry was replaced by a different file type.
    #[must_use]
    pub fn is_replaced(self) -> bool {
        self.contains(Self::REPLACED)
    }

    /// True when `filter` lets this status through: the all-pass sentinel
    /// admits everything, otherwise any shared bit suffices.
    #[must_use]
    pub fn allowed_by(self, filter: Self) -> bool {
        filter == FILTER_ALL || self.intersects(filter)
    }
}

bitflags! {
    /// Per-entry flags. The low bits persist in the entry list; the high
    /// bits are transient within a run.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        /// Scheduled to be removed from version control at next commit.
        const UNVERSION = 1;
        /// Scheduled to be added at next commit.
        const ADD = 1 << 1;
        /// Content must be re-checked regardless of timestamps.
        const CHECK = 1 << 2;
        /// Properties must be sent at next commit.
        const PUSH_PROPS = 1 << 3;
        /// Root of a copied subtree.
        const COPY_BASE = 1 << 4;
        /// Implicit member of a copied subtree.
        const COPY_SUB = 1 << 5;
        /// Has unresolved conflict artifacts.
        const CONFLICT = 1 << 6;

        /// Discovered by directory enumeration during this run.
        const IS_NEW = 1 << 19;
        /// Must be shown even without a status.
        const PRINT = 1 << 20;
        /// Excluded from serialization.
        const DONT_WRITE = 1 << 21;
    }
}

impl EntryFlags {
    /// The subset written to the entry list.
    pub const SAVE_MASK: Self = Self::UNVERSION
        .union(Self::ADD)
        .union(Self::CHECK)
        .union(Self::PUSH_PROPS)
        .union(Self::COPY_BASE)
        .union(Self::COPY_SUB)
        .union(Self::CONFLICT);

    /// True when the entry belongs to a copied subtree.
    #[must_use]
    pub fn is_copy(self) -> bool {
        self.intersects(Self::COPY_BASE.union(Self::COPY_SUB))
    }

    /// The persistent subset of these flags.
    #[must_use]
    pub fn persistent(self) -> Self {
        self & Self::SAVE_MASK
    }
}

/// Result of the content comparison, sticky within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChangeFlag {
    /// Not yet compared.
    #[default]
    Unknown,
    /// Content differs from the recorded hash.
    Changed,
    /// Content matches the recorded hash.
    NotChanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaced_is_new_and_removed() {
        let st = StatusBits::NEW | StatusBits::REMOVED;
        assert!(st.is_replaced());
        assert!(!StatusBits::NEW.is_replaced());
    }

    #[test]
    fn filter_all_admits_everything() {
        assert!(StatusBits::empty().allowed_by(FILTER_ALL));
        assert!(StatusBits::CHANGED.allowed_by(FILTER_ALL));
    }

    #[test]
    fn narrow_filter_needs_an_intersection() {
        let filter = StatusBits::NEW | StatusBits::REMOVED;
        assert!((StatusBits::NEW | StatusBits::META_MTIME).allowed_by(filter));
        assert!(!StatusBits::CHANGED.allowed_by(filter));
        assert!(!StatusBits::empty().allowed_by(filter));
    }

    #[test]
    fn save_mask_excludes_transients() {
        let flags = EntryFlags::ADD | EntryFlags::IS_NEW | EntryFlags::PRINT;
        assert_eq!(flags.persistent(), EntryFlags::ADD);
    }
}
