#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The in-memory entry tree and its on-disk serialization.
//!
//! Entries live in an arena ([`EntryStore`]) and refer to each other by
//! [`EntryId`]; `parent` and the per-directory child lists are ids, not
//! pointers, and the shadow copy taken when an entry is replaced goes to a
//! separate shadow arena. Child lists are kept in ascending `(device,
//! inode)` order with the name as the hardlink tie-break, which is also
//! the order the serialized entry list uses - reading a tree back yields
//! the same shape that was written.
//!
//! # The `dir` file
//!
//! A fixed 64-byte header (space padded, ending `$\n`) followed by one
//! record per entry: root first, every child after its parent, ascending
//! inode within a directory. Records are space-separated fields with the
//! name last, terminated `\0\n`. Parent references are 1-based file
//! positions, so reconstruction is a single forward pass over one
//! contiguous allocation.
//!
//! Every structural violation on read - bad header, wrong version, a
//! parent reference pointing forward, too many children - reports
//! [`base::ErrorKind::TreeDamaged`]; such a file is only fixable by
//! re-synchronizing against the repository.

pub mod dir_file;
pub mod entry;
pub mod store;

pub use entry::{DirPayload, Entry, EntryId, FilePayload, Payload};
pub use store::{EntryBlock, EntryStore};
